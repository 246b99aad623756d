//! Load Elimination (spec §4.7): a load reads the value of a dominating
//! store or load to the same address when nothing in between could have
//! written it.
//!
//! Grounded on spec §4.7's load-elimination paragraph; scoped per-block like
//! [`crate::pass::dse`] rather than across the dominator tree, since the
//! spec's invariant ("no intervening aliasing write is reachable") is
//! trivially provable only within a single straight-line block without a
//! full alias-analysis lattice — cross-block forwarding is left to
//! `mem2var` for the `alloca` case the spec actually requires it for.

use crate::analysis::cache::AnalysisCache;
use crate::analysis::dfg::DataFlowGraph;
use crate::analysis::AnalysisKind;
use crate::error::CompilerError;
use crate::ir::entities::Variable;
use crate::ir::function::Function;
use crate::ir::instruction::Operand;
use crate::ir::opcode::Opcode;
use crate::pass::FunctionPass;
use rustc_hash::FxHashMap;

/// Replaces a load with the value already known to be at that address,
/// leaving the now-possibly-dead load for [`crate::pass::dce`] to sweep up.
#[derive(Default)]
pub struct LoadElim;

impl FunctionPass for LoadElim {
    fn name(&self) -> &'static str {
        "load_elim"
    }

    fn required_analyses(&self) -> &'static [AnalysisKind] {
        &[AnalysisKind::Dfg]
    }

    fn preserved_analyses(&self) -> &'static [AnalysisKind] {
        &[AnalysisKind::Cfg, AnalysisKind::DominatorTree, AnalysisKind::Loops]
    }

    fn run(&mut self, func: &mut Function, _cache: &mut AnalysisCache) -> Result<bool, CompilerError> {
        let mut dfg = DataFlowGraph::compute(func);
        let mut changed = false;

        for block in func.blocks_in_order() {
            // (kind, address) -> the variable currently known to hold that
            // slot's value (from a prior store or load in this block).
            let mut known: FxHashMap<(Opcode, Operand), Variable> = FxHashMap::default();
            let mut redundant: Vec<(Variable, Variable)> = Vec::new();

            for &inst in func.block_insts(block).to_vec().iter() {
                let data = func.inst(inst).clone();
                if let Some(store_op) = matching_store(data.opcode) {
                    let addr = data.args[0];
                    known.remove(&(store_op, addr));
                    if let Some(value) = data.args[1].as_var() {
                        known.insert((store_op, addr), value);
                    }
                    continue;
                }
                if let Some(store_op) = matching_load(data.opcode) {
                    let addr = data.args[0];
                    let result = data.result.expect("load always produces a result");
                    if let Some(&value) = known.get(&(store_op, addr)) {
                        redundant.push((result, value));
                        continue;
                    }
                    known.insert((store_op, addr), result);
                    continue;
                }
                if data.opcode.is_opaque() {
                    known.clear();
                }
            }

            for (old, new) in redundant {
                dfg.replace_all_uses_with(func, old, new);
                changed = true;
            }
        }

        Ok(changed)
    }
}

fn matching_store(opcode: Opcode) -> Option<Opcode> {
    match opcode {
        Opcode::MLoad => Some(Opcode::MStore),
        Opcode::SLoad => Some(Opcode::SStore),
        Opcode::TLoad => Some(Opcode::TStore),
        _ => None,
    }
}

fn matching_load(opcode: Opcode) -> Option<Opcode> {
    matching_store(opcode)
}
