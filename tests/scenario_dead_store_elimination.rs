//! Scenario 3: `mstore 0, %x; mstore 0, %y; %z = mload 0` drops the first
//! store (overwritten before any read) and forwards the second store's
//! value straight into `%z`'s uses. The load itself isn't flagged pure (it
//! reads memory), so DCE never removes it on its own; what matters for this
//! scenario is that every downstream use of `%z` now reads `%y` directly.

use venom::analysis::AnalysisCache;
use venom::ir::builder::IrBuilder;
use venom::ir::instruction::Operand;
use venom::ir::literal::Literal;
use venom::ir::opcode::Opcode;
use venom::ir::Function;
use venom::pass::dse::Dse;
use venom::pass::load_elim::LoadElim;
use venom::pass::FunctionPass;

#[test]
fn redundant_store_vanishes_and_the_load_forwards_the_surviving_value() {
    let mut func = Function::new("f");
    let mut b = IrBuilder::new(&mut func);
    let entry = b.create_block();
    b.switch_to_block(entry);
    let x = b.emit(Opcode::Param, vec![]).unwrap().unwrap();
    let y = b.emit(Opcode::Param, vec![]).unwrap().unwrap();
    b.emit(Opcode::MStore, vec![Operand::Imm(Literal::ZERO), Operand::Var(x)]).unwrap();
    b.emit(Opcode::MStore, vec![Operand::Imm(Literal::ZERO), Operand::Var(y)]).unwrap();
    let z = b.emit(Opcode::MLoad, vec![Operand::Imm(Literal::ZERO)]).unwrap().unwrap();
    b.terminate_block(Opcode::Ret, vec![Operand::Var(z)]).unwrap();

    let mut cache = AnalysisCache::new();
    assert!(Dse.run(&mut func, &mut cache).unwrap());
    assert!(LoadElim.run(&mut func, &mut cache).unwrap());

    // The first store is gone; the two params, the surviving store, the
    // (now unused) load, and the terminator remain.
    assert_eq!(func.block_insts(entry).len(), 5);
    let term = func.terminator(entry).unwrap();
    assert_eq!(func.inst(term).args[0], Operand::Var(y));
}
