//! Dead Code Elimination (spec §4.7 DCE).
//!
//! Grounded on `cranelift-codegen`'s `simple_gvn`/`dce`-style "unused pure
//! value" sweep combined with the CFG's own reachability to drop whole dead
//! blocks, run here as one pass since both conditions feed the same
//! fixed-point ("removing an instruction may make its operands unused too").

use crate::analysis::cache::AnalysisCache;
use crate::analysis::cfg::ControlFlowGraph;
use crate::analysis::dfg::DataFlowGraph;
use crate::analysis::AnalysisKind;
use crate::error::CompilerError;
use crate::ir::function::Function;
use crate::pass::FunctionPass;

/// Removes pure instructions with no remaining uses, and whole blocks
/// unreachable from the entry (spec §4.7: "Unreachable blocks ... are
/// removed wholesale").
#[derive(Default)]
pub struct Dce;

impl FunctionPass for Dce {
    fn name(&self) -> &'static str {
        "dce"
    }

    fn required_analyses(&self) -> &'static [AnalysisKind] {
        &[AnalysisKind::Cfg, AnalysisKind::Dfg]
    }

    fn preserved_analyses(&self) -> &'static [AnalysisKind] {
        &[]
    }

    fn run(&mut self, func: &mut Function, _cache: &mut AnalysisCache) -> Result<bool, CompilerError> {
        let mut any_change = false;

        // Unreachable blocks first: their instructions can never be live.
        let cfg = ControlFlowGraph::compute(func);
        let dead_blocks: Vec<_> = func
            .blocks_in_order()
            .filter(|&b| cfg.is_unreachable(b))
            .collect();
        for block in dead_blocks {
            log::debug!("dce: removing unreachable block {block}");
            func.remove_block(block);
            any_change = true;
        }

        // Pure-and-unused instructions, to a local fixed point: removing one
        // can make its own operands newly unused.
        loop {
            let dfg = DataFlowGraph::compute(func);
            let mut dead = Vec::new();
            for block in func.blocks_in_order() {
                for &inst in func.block_insts(block) {
                    let data = func.inst(inst);
                    if let Some(result) = data.result {
                        if data.opcode.is_pure() && dfg.is_unused(result) {
                            dead.push(inst);
                        }
                    }
                }
            }
            if dead.is_empty() {
                break;
            }
            for inst in dead {
                func.remove_inst(inst);
            }
            any_change = true;
        }

        Ok(any_change)
    }
}
