//! Testable property: printing and re-parsing the IR reaches a fixed point
//! (spec §8: "structurally equal IR, variable identities may be
//! renumbered").

use pretty_assertions::assert_eq;
use venom::ir::builder::IrBuilder;
use venom::ir::instruction::Operand;
use venom::ir::literal::Literal;
use venom::ir::opcode::Opcode;
use venom::ir::parser::parse_function;
use venom::ir::printer::print_function;
use venom::ir::Function;

#[test]
fn diamond_merge_with_a_phi_round_trips_to_a_fixed_point() {
    let mut func = Function::new("f");
    let mut b = IrBuilder::new(&mut func);
    let entry = b.create_block();
    let left = b.create_block();
    let right = b.create_block();
    let join = b.create_block();
    let v = venom::ir::builder::SourceVar(0);

    b.switch_to_block(entry);
    let cond = b.emit(Opcode::Param, vec![]).unwrap().unwrap();
    b.terminate_block(Opcode::Jnz, vec![Operand::Var(cond), Operand::Label(left), Operand::Label(right)])
        .unwrap();
    b.seal_block(entry);

    b.switch_to_block(left);
    let left_val = b.emit(Opcode::Param, vec![]).unwrap().unwrap();
    b.def_var(v, left_val);
    b.terminate_block(Opcode::Jmp, vec![Operand::Label(join)]).unwrap();
    b.seal_block(left);

    b.switch_to_block(right);
    let right_val = b.emit(Opcode::Add, vec![Operand::Imm(Literal::ONE), Operand::Imm(Literal::from_u64(2))])
        .unwrap()
        .unwrap();
    b.def_var(v, right_val);
    b.terminate_block(Opcode::Jmp, vec![Operand::Label(join)]).unwrap();
    b.seal_block(right);

    b.switch_to_block(join);
    b.seal_block(join);
    let merged = b.use_var(v);
    b.terminate_block(Opcode::Ret, vec![Operand::Var(merged)]).unwrap();

    let first_text = print_function(&func);
    let reparsed = parse_function(&first_text).expect("printed IR must parse back");
    let second_text = print_function(&reparsed);

    assert_eq!(first_text, second_text);

    // A second round trip changes nothing further: the fixed point holds.
    let reparsed_again = parse_function(&second_text).expect("printed IR must parse back");
    assert_eq!(second_text, print_function(&reparsed_again));
}
