//! CFG Simplification (spec §4.7): merge a block into its sole predecessor
//! when that predecessor's only successor is this block, and drop now-empty
//! unreachable blocks. Complements [`crate::pass::branch_opt`]'s jmp-only
//! threading by collapsing the remaining straight-line chains it leaves
//! behind.
//!
//! Grounded on spec §4.7's CFG-simplification paragraph; block merging is
//! the architectural cousin of `cranelift-codegen/src/flowgraph.rs`'s
//! successor bookkeeping, reused here as the post-condition this pass must
//! maintain rather than a ported algorithm.

use crate::analysis::cache::AnalysisCache;
use crate::analysis::cfg::ControlFlowGraph;
use crate::analysis::AnalysisKind;
use crate::error::CompilerError;
use crate::ir::entities::Block;
use crate::ir::function::Function;
use crate::ir::opcode::Opcode;
use crate::pass::FunctionPass;

#[derive(Default)]
pub struct SimplifyCfg;

impl FunctionPass for SimplifyCfg {
    fn name(&self) -> &'static str {
        "simplify_cfg"
    }

    fn required_analyses(&self) -> &'static [AnalysisKind] {
        &[AnalysisKind::Cfg]
    }

    fn preserved_analyses(&self) -> &'static [AnalysisKind] {
        &[]
    }

    fn run(&mut self, func: &mut Function, _cache: &mut AnalysisCache) -> Result<bool, CompilerError> {
        let mut changed = false;
        loop {
            let cfg = ControlFlowGraph::compute(func);
            let Some(merge) = find_mergeable_pair(func, &cfg) else { break };
            merge_block_into_predecessor(func, merge.0, merge.1);
            changed = true;
        }
        Ok(changed)
    }
}

/// Find a `(pred, succ)` pair where `pred`'s only successor is `succ` and
/// `succ`'s only predecessor is `pred` (spec §4.7: "a block whose single
/// predecessor has it as its single successor is absorbed").
fn find_mergeable_pair(func: &Function, cfg: &ControlFlowGraph) -> Option<(Block, Block)> {
    for pred in func.blocks_in_order() {
        let succs = cfg.successors(pred);
        if succs.len() != 1 {
            continue;
        }
        let succ = succs[0];
        if succ == pred {
            continue;
        }
        let succ_preds = cfg.predecessors(succ);
        if succ_preds.len() == 1 && succ_preds[0] == pred {
            return Some((pred, succ));
        }
    }
    None
}

fn merge_block_into_predecessor(func: &mut Function, pred: Block, succ: Block) {
    // `succ` has exactly one predecessor, so every phi in it has exactly one
    // edge; fold it directly into a use of that edge's value before moving
    // the rest of its instructions up.
    let succ_insts = func.block_insts(succ).to_vec();
    let mut rewrites = Vec::new();
    for &inst in &succ_insts {
        let data = func.inst(inst).clone();
        if data.opcode == Opcode::Phi {
            let value = data.phi_edges[0].value;
            if let Some(result) = data.result {
                rewrites.push((result, value));
            }
        }
    }

    func.block_insts_mut(pred).pop(); // drop pred's `jmp succ` terminator
    for &inst in &succ_insts {
        if func.inst(inst).opcode != Opcode::Phi {
            func.inst_mut(inst).parent = pred;
            func.block_insts_mut(pred).push(inst);
        }
    }

    if !rewrites.is_empty() {
        let mut dfg = crate::analysis::dfg::DataFlowGraph::compute(func);
        for (old, value) in rewrites {
            match value {
                crate::ir::instruction::Operand::Var(new) => dfg.replace_all_uses_with(func, old, new),
                crate::ir::instruction::Operand::Imm(lit) => {
                    for &user in dfg.uses_of(old).to_vec().iter() {
                        let data = func.inst_mut(user);
                        for arg in data.args.iter_mut() {
                            if arg.as_var() == Some(old) {
                                *arg = crate::ir::instruction::Operand::Imm(lit);
                            }
                        }
                        for edge in data.phi_edges.iter_mut() {
                            if edge.value.as_var() == Some(old) {
                                edge.value = crate::ir::instruction::Operand::Imm(lit);
                            }
                        }
                    }
                }
                crate::ir::instruction::Operand::Label(_) => unreachable!("a phi value is never a label"),
            }
        }
    }

    // Any block downstream of `succ`'s own terminator still arrives via
    // `pred` now that `succ`'s instructions (including that terminator) live
    // there; retag the edge so its phi predecessor tags stay accurate.
    for block in func.blocks_in_order().collect::<Vec<_>>() {
        for &inst in func.block_insts(block).to_vec().iter() {
            let data = func.inst_mut(inst);
            if data.opcode == Opcode::Phi {
                for edge in data.phi_edges.iter_mut() {
                    if edge.from == succ {
                        edge.from = pred;
                    }
                }
            }
        }
    }

    func.remove_block(succ);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::IrBuilder;
    use crate::ir::instruction::Operand;

    #[test]
    fn merges_straight_line_chain() {
        let mut func = Function::new("f");
        let mut b = IrBuilder::new(&mut func);
        let entry = b.create_block();
        let next = b.create_block();
        b.switch_to_block(entry);
        b.emit(Opcode::Nop, vec![]).unwrap();
        b.terminate_block(Opcode::Jmp, vec![Operand::Label(next)]).unwrap();
        b.switch_to_block(next);
        b.terminate_block(Opcode::Stop, vec![]).unwrap();

        let mut cache = AnalysisCache::new();
        let changed = SimplifyCfg.run(&mut func, &mut cache).unwrap();
        assert!(changed);
        assert_eq!(func.blocks_in_order().count(), 1);
        assert_eq!(func.inst(func.terminator(entry).unwrap()).opcode, Opcode::Stop);
    }

    #[test]
    fn does_not_merge_when_successor_has_another_predecessor() {
        let mut func = Function::new("f");
        let mut b = IrBuilder::new(&mut func);
        let entry = b.create_block();
        let other = b.create_block();
        let join = b.create_block();
        b.switch_to_block(entry);
        b.terminate_block(Opcode::Jmp, vec![Operand::Label(join)]).unwrap();
        b.switch_to_block(other);
        b.terminate_block(Opcode::Jmp, vec![Operand::Label(join)]).unwrap();
        b.switch_to_block(join);
        b.terminate_block(Opcode::Stop, vec![]).unwrap();

        let mut cache = AnalysisCache::new();
        let changed = SimplifyCfg.run(&mut func, &mut cache).unwrap();
        assert!(!changed);
        assert_eq!(func.blocks_in_order().count(), 3);
    }
}
