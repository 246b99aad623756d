//! Branch Optimization (spec §4.7): `jnz` with identical targets folds to
//! `jmp`; `jnz` on a constant condition folds to `jmp` of the taken target;
//! a block whose only content is an unconditional `jmp` is threaded away by
//! redirecting its predecessors straight to its successor, with phi fix-up.
//!
//! Grounded on spec §4.7's branch-optimization paragraph; the "empty
//! jmp-only block" case is the control-flow analog of
//! `cranelift-codegen/src/flowgraph.rs`'s successor-rewriting helpers (not
//! retrieved in full in this pack, but the same "rewrite every predecessor's
//! terminator label operand" primitive as `analysis::cfg` already exposes).

use crate::analysis::cache::AnalysisCache;
use crate::analysis::cfg::ControlFlowGraph;
use crate::analysis::AnalysisKind;
use crate::error::CompilerError;
use crate::ir::entities::Block;
use crate::ir::function::Function;
use crate::ir::instruction::{Operand, PhiEdge};
use crate::ir::opcode::Opcode;
use crate::pass::FunctionPass;

#[derive(Default)]
pub struct BranchOpt;

impl FunctionPass for BranchOpt {
    fn name(&self) -> &'static str {
        "branch_opt"
    }

    fn required_analyses(&self) -> &'static [AnalysisKind] {
        &[AnalysisKind::Cfg]
    }

    fn preserved_analyses(&self) -> &'static [AnalysisKind] {
        &[]
    }

    fn run(&mut self, func: &mut Function, _cache: &mut AnalysisCache) -> Result<bool, CompilerError> {
        let mut changed = false;
        changed |= fold_jnz(func);
        changed |= thread_jmp_only_blocks(func);
        Ok(changed)
    }
}

/// Fold `jnz cond, L, L -> jmp L` and `jnz <const>, Lf, Lt -> jmp` of the
/// taken target.
fn fold_jnz(func: &mut Function) -> bool {
    let mut changed = false;
    for block in func.blocks_in_order().collect::<Vec<_>>() {
        let Some(term) = func.terminator(block) else { continue };
        let data = func.inst(term).clone();
        if data.opcode != Opcode::Jnz {
            continue;
        }
        let labels: Vec<Block> = data.args.iter().filter_map(|op| op.as_label()).collect();
        if labels.len() != 2 {
            continue;
        }
        let target = if labels[0] == labels[1] {
            Some(labels[0])
        } else {
            match data.args[0] {
                Operand::Imm(lit) => Some(if lit.is_zero() { labels[0] } else { labels[1] }),
                _ => None,
            }
        };
        if let Some(target) = target {
            func.replace_inst(
                term,
                crate::ir::instruction::InstructionData {
                    opcode: Opcode::Jmp,
                    args: vec![Operand::Label(target)].into(),
                    phi_edges: Default::default(),
                    result: None,
                    parent: block,
                    callee: None,
                },
            );
            changed = true;
        }
    }
    changed
}

/// Redirect every predecessor of a jmp-only block directly to its successor.
fn thread_jmp_only_blocks(func: &mut Function) -> bool {
    let mut changed = false;
    let cfg = ControlFlowGraph::compute(func);

    for block in func.blocks_in_order().collect::<Vec<_>>() {
        if Some(block) == func.entry {
            continue;
        }
        if func.block_insts(block).len() != 1 {
            continue;
        }
        let term = func.block_insts(block)[0];
        let data = func.inst(term).clone();
        if data.opcode != Opcode::Jmp {
            continue;
        }
        let Some(target) = data.args.first().and_then(|op| op.as_label()) else { continue };
        if target == block {
            continue; // an infinite self-loop jmp-only block is not threadable
        }

        let preds: Vec<Block> = cfg.predecessors(block).to_vec();
        for &pred in &preds {
            retarget_terminator(func, pred, block, target);
        }
        retarget_phi_edges(func, target, block, &preds);
        changed = true;
    }
    changed
}

fn retarget_terminator(func: &mut Function, pred: Block, old: Block, new: Block) {
    let Some(term) = func.terminator(pred) else { return };
    let data = func.inst_mut(term);
    for arg in data.args.iter_mut() {
        if arg.as_label() == Some(old) {
            *arg = Operand::Label(new);
        }
    }
}

/// `target`'s phi nodes had one edge tagged `@block`; after threading, that
/// edge must come from each of `block`'s own predecessors instead (spec
/// §4.2: "each predecessor block appears exactly once").
fn retarget_phi_edges(func: &mut Function, target: Block, old: Block, new_preds: &[Block]) {
    for &inst in func.block_insts(target).to_vec().iter() {
        let data = func.inst_mut(inst);
        if data.opcode != Opcode::Phi {
            continue;
        }
        let Some(pos) = data.phi_edges.iter().position(|e| e.from == old) else { continue };
        let value = data.phi_edges[pos].value;
        data.phi_edges.remove(pos);
        for &pred in new_preds {
            data.phi_edges.push(PhiEdge { from: pred, value });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::IrBuilder;
    use crate::ir::literal::Literal;

    #[test]
    fn folds_jnz_with_identical_targets() {
        let mut func = Function::new("f");
        let mut b = IrBuilder::new(&mut func);
        let entry = b.create_block();
        let target = b.create_block();
        b.switch_to_block(entry);
        let param = b.emit(Opcode::Param, vec![]).unwrap().unwrap();
        b.terminate_block(
            Opcode::Jnz,
            vec![Operand::Var(param), Operand::Label(target), Operand::Label(target)],
        )
        .unwrap();
        b.switch_to_block(target);
        b.terminate_block(Opcode::Stop, vec![]).unwrap();

        let mut cache = AnalysisCache::new();
        let changed = BranchOpt.run(&mut func, &mut cache).unwrap();
        assert!(changed);
        let term = func.terminator(entry).unwrap();
        assert_eq!(func.inst(term).opcode, Opcode::Jmp);
    }

    #[test]
    fn folds_jnz_on_constant_condition() {
        let mut func = Function::new("f");
        let mut b = IrBuilder::new(&mut func);
        let entry = b.create_block();
        let left = b.create_block();
        let right = b.create_block();
        b.switch_to_block(entry);
        b.terminate_block(
            Opcode::Jnz,
            vec![Operand::Imm(Literal::ZERO), Operand::Label(left), Operand::Label(right)],
        )
        .unwrap();
        b.switch_to_block(left);
        b.terminate_block(Opcode::Stop, vec![]).unwrap();
        b.switch_to_block(right);
        b.terminate_block(Opcode::Stop, vec![]).unwrap();

        let mut cache = AnalysisCache::new();
        let changed = BranchOpt.run(&mut func, &mut cache).unwrap();
        assert!(changed);
        let term = func.terminator(entry).unwrap();
        assert_eq!(func.inst(term).args[0], Operand::Label(left));
    }

    #[test]
    fn threads_jmp_only_block_away() {
        let mut func = Function::new("f");
        let mut b = IrBuilder::new(&mut func);
        let entry = b.create_block();
        let thru = b.create_block();
        let target = b.create_block();
        b.switch_to_block(entry);
        b.terminate_block(Opcode::Jmp, vec![Operand::Label(thru)]).unwrap();
        b.switch_to_block(thru);
        b.terminate_block(Opcode::Jmp, vec![Operand::Label(target)]).unwrap();
        b.switch_to_block(target);
        b.terminate_block(Opcode::Stop, vec![]).unwrap();

        let mut cache = AnalysisCache::new();
        let changed = BranchOpt.run(&mut func, &mut cache).unwrap();
        assert!(changed);
        let term = func.terminator(entry).unwrap();
        assert_eq!(func.inst(term).args[0], Operand::Label(target));
    }
}
