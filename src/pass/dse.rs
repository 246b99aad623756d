//! Dead Store Elimination (spec §4.7 DSE): a store to an address is dead if
//! it is overwritten by a later store to the same address before any
//! intervening read, within one basic block.
//!
//! Grounded on spec §4.7's DSE paragraph directly; no teacher analog (the
//! retrieved `cranelift-codegen` subtree targets registers, which have no
//! store-to-store redundancy in this sense). Pessimistic exactly the way
//! spec §4.7 requires: an opaque instruction invalidates every pending store,
//! and nothing carries across a block boundary.

use crate::analysis::cache::AnalysisCache;
use crate::analysis::AnalysisKind;
use crate::error::CompilerError;
use crate::ir::entities::Inst;
use crate::ir::function::Function;
use crate::ir::instruction::Operand;
use crate::ir::opcode::Opcode;
use crate::pass::FunctionPass;
use rustc_hash::FxHashMap;

/// Removes a store whose value is never observed before the next store to
/// the same address (spec §4.7: "dead stores ... removed when a later store
/// to the same address is provably reached first").
#[derive(Default)]
pub struct Dse;

impl FunctionPass for Dse {
    fn name(&self) -> &'static str {
        "dse"
    }

    fn required_analyses(&self) -> &'static [AnalysisKind] {
        &[]
    }

    fn preserved_analyses(&self) -> &'static [AnalysisKind] {
        &[AnalysisKind::Cfg, AnalysisKind::DominatorTree, AnalysisKind::Loops]
    }

    fn run(&mut self, func: &mut Function, _cache: &mut AnalysisCache) -> Result<bool, CompilerError> {
        let mut dead: Vec<Inst> = Vec::new();

        for block in func.blocks_in_order() {
            // (store opcode, address operand) -> the most recent store to it
            // not yet proven observed.
            let mut pending: FxHashMap<(Opcode, Operand), Inst> = FxHashMap::default();

            for &inst in func.block_insts(block) {
                let data = func.inst(inst);
                match store_kind(data.opcode) {
                    Some(_) => {
                        let addr = data.args[0];
                        if let Some(&prev) = pending.get(&(data.opcode, addr)) {
                            dead.push(prev);
                        }
                        pending.insert((data.opcode, addr), inst);
                        continue;
                    }
                    None => {}
                }
                if let Some(store_op) = load_pairs(data.opcode) {
                    let addr = data.args[0];
                    pending.remove(&(store_op, addr));
                    continue;
                }
                if data.opcode.is_opaque() {
                    pending.clear();
                }
            }
        }

        let changed = !dead.is_empty();
        for inst in dead {
            func.remove_inst(inst);
        }
        Ok(changed)
    }
}

fn store_kind(opcode: Opcode) -> Option<Opcode> {
    matches!(opcode, Opcode::MStore | Opcode::SStore | Opcode::TStore).then_some(opcode)
}

fn load_pairs(opcode: Opcode) -> Option<Opcode> {
    match opcode {
        Opcode::MLoad => Some(Opcode::MStore),
        Opcode::SLoad => Some(Opcode::SStore),
        Opcode::TLoad => Some(Opcode::TStore),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::IrBuilder;
    use crate::ir::literal::Literal;

    #[test]
    fn removes_store_overwritten_before_any_read() {
        let mut func = Function::new("f");
        let mut b = IrBuilder::new(&mut func);
        let entry = b.create_block();
        b.switch_to_block(entry);
        b.emit(Opcode::MStore, vec![Operand::Imm(Literal::ZERO), Operand::Imm(Literal::ONE)]).unwrap();
        b.emit(Opcode::MStore, vec![Operand::Imm(Literal::ZERO), Operand::Imm(Literal::from_u64(2))]).unwrap();
        b.terminate_block(Opcode::Stop, vec![]).unwrap();

        let mut cache = AnalysisCache::new();
        let changed = Dse.run(&mut func, &mut cache).unwrap();
        assert!(changed);
        assert_eq!(func.block_insts(entry).len(), 2); // second store + stop
    }

    #[test]
    fn keeps_store_observed_by_an_intervening_load() {
        let mut func = Function::new("f");
        let mut b = IrBuilder::new(&mut func);
        let entry = b.create_block();
        b.switch_to_block(entry);
        b.emit(Opcode::MStore, vec![Operand::Imm(Literal::ZERO), Operand::Imm(Literal::ONE)]).unwrap();
        let _ = b.emit(Opcode::MLoad, vec![Operand::Imm(Literal::ZERO)]).unwrap();
        b.emit(Opcode::MStore, vec![Operand::Imm(Literal::ZERO), Operand::Imm(Literal::from_u64(2))]).unwrap();
        b.terminate_block(Opcode::Stop, vec![]).unwrap();

        let mut cache = AnalysisCache::new();
        let changed = Dse.run(&mut func, &mut cache).unwrap();
        assert!(!changed);
        assert_eq!(func.block_insts(entry).len(), 4);
    }

    #[test]
    fn opaque_instruction_clears_pending_stores() {
        let mut func = Function::new("f");
        let mut b = IrBuilder::new(&mut func);
        let entry = b.create_block();
        b.switch_to_block(entry);
        b.emit(Opcode::MStore, vec![Operand::Imm(Literal::ZERO), Operand::Imm(Literal::ONE)]).unwrap();
        b.emit(
            Opcode::Log0,
            vec![Operand::Imm(Literal::ZERO), Operand::Imm(Literal::from_u64(32))],
        )
        .unwrap();
        b.emit(Opcode::MStore, vec![Operand::Imm(Literal::ZERO), Operand::Imm(Literal::from_u64(2))]).unwrap();
        b.terminate_block(Opcode::Stop, vec![]).unwrap();

        let mut cache = AnalysisCache::new();
        let changed = Dse.run(&mut func, &mut cache).unwrap();
        assert!(!changed);
        assert_eq!(func.block_insts(entry).len(), 4);
    }
}
