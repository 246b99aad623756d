//! Scenario 4: entry computes `%a = add %x, %y` then jumps to `B`, which
//! recomputes the same expression as `%b`. Since entry dominates `B`, CSE's
//! dominator-scoped table still has `%a` live when `B` is visited, so `%b`'s
//! use in the return is rewritten to `%a`.

use venom::analysis::AnalysisCache;
use venom::ir::builder::IrBuilder;
use venom::ir::instruction::Operand;
use venom::ir::literal::Literal;
use venom::ir::opcode::Opcode;
use venom::ir::Function;
use venom::pass::cse::Cse;
use venom::pass::dce::Dce;
use venom::pass::FunctionPass;

#[test]
fn duplicate_computed_in_a_dominated_block_is_replaced_by_the_dominating_one() {
    let mut func = Function::new("f");
    let mut b = IrBuilder::new(&mut func);
    let entry = b.create_block();
    let block_b = b.create_block();
    b.switch_to_block(entry);
    let x = b.emit(Opcode::Param, vec![]).unwrap().unwrap();
    let y = b.emit(Opcode::Param, vec![]).unwrap().unwrap();
    let a = b.emit(Opcode::Add, vec![Operand::Var(x), Operand::Var(y)]).unwrap().unwrap();
    b.terminate_block(Opcode::Jmp, vec![Operand::Label(block_b)]).unwrap();

    b.switch_to_block(block_b);
    let bvar = b.emit(Opcode::Add, vec![Operand::Var(x), Operand::Var(y)]).unwrap().unwrap();
    b.terminate_block(Opcode::Return, vec![Operand::Var(bvar), Operand::Imm(Literal::from_u64(32))])
        .unwrap();

    let mut cache = AnalysisCache::new();
    assert!(Cse.run(&mut func, &mut cache).unwrap());
    assert!(Dce.run(&mut func, &mut cache).unwrap());

    // The recomputed add in B is gone; only its terminator remains.
    assert_eq!(func.block_insts(block_b).len(), 1);
    let term = func.terminator(block_b).unwrap();
    assert_eq!(func.inst(term).args[0], Operand::Var(a));
}
