//! Scenario 1: `%a = add 1, 2; %b = mul %a, 0; return %b, 32` should fold
//! all the way down to `return 0, 32` once SCCP has propagated the constant
//! and DCE has swept the now-dead arithmetic chain.

use venom::analysis::AnalysisCache;
use venom::ir::builder::IrBuilder;
use venom::ir::instruction::Operand;
use venom::ir::literal::Literal;
use venom::ir::opcode::Opcode;
use venom::ir::Function;
use venom::pass::dce::Dce;
use venom::pass::sccp::Sccp;
use venom::pass::FunctionPass;

#[test]
fn constant_chain_folds_to_a_bare_return() {
    let mut func = Function::new("f");
    let mut b = IrBuilder::new(&mut func);
    let entry = b.create_block();
    b.switch_to_block(entry);
    let a = b
        .emit(Opcode::Add, vec![Operand::Imm(Literal::from_u64(1)), Operand::Imm(Literal::from_u64(2))])
        .unwrap()
        .unwrap();
    let bvar = b.emit(Opcode::Mul, vec![Operand::Var(a), Operand::Imm(Literal::ZERO)]).unwrap().unwrap();
    b.terminate_block(Opcode::Return, vec![Operand::Var(bvar), Operand::Imm(Literal::from_u64(32))])
        .unwrap();

    let mut cache = AnalysisCache::new();
    assert!(Sccp.run(&mut func, &mut cache).unwrap());
    assert!(Dce.run(&mut func, &mut cache).unwrap());

    assert_eq!(func.block_insts(entry).len(), 1);
    let term = func.terminator(entry).unwrap();
    let data = func.inst(term);
    assert_eq!(data.opcode, Opcode::Return);
    assert_eq!(data.args[0], Operand::Imm(Literal::ZERO));
    assert_eq!(data.args[1], Operand::Imm(Literal::from_u64(32)));
}
