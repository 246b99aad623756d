//! Control-flow graph analysis (spec §4.2).
//!
//! Grounded on `cranelift-codegen/src/flowgraph.rs`'s `ControlFlowGraph`:
//! computed by scanning every block's terminator, stored as a
//! [`cranelift_entity::SecondaryMap`] from block to (predecessor set,
//! successor set), recomputable per-block without a full rebuild. This
//! version drops the teacher's `cranelift-bforest` storage (overkill at this
//! crate's per-function block counts) for plain `Vec`s that preserve
//! discovery order, which the stack scheduler's deterministic tie-breaking
//! (SPEC_FULL.md §12.2) depends on.

use crate::ir::entities::Block;
use crate::ir::function::Function;
use crate::ir::opcode::Opcode;
use cranelift_entity::SecondaryMap;

#[derive(Clone, Debug, Default)]
struct CfgNode {
    preds: Vec<Block>,
    succs: Vec<Block>,
}

/// Predecessor/successor sets for every block in a function (spec §4.2).
///
/// Unreachable blocks are exactly those with an empty predecessor set that
/// are not the entry block.
#[derive(Clone, Debug)]
pub struct ControlFlowGraph {
    nodes: SecondaryMap<Block, CfgNode>,
    entry: Option<Block>,
}

impl ControlFlowGraph {
    /// Compute the CFG of `func` from scratch.
    pub fn compute(func: &Function) -> Self {
        let mut cfg = ControlFlowGraph {
            nodes: SecondaryMap::new(),
            entry: func.entry,
        };
        for block in func.blocks_in_order() {
            cfg.compute_block(func, block);
        }
        cfg
    }

    fn compute_block(&mut self, func: &Function, block: Block) {
        let Some(term) = func.terminator(block) else {
            return;
        };
        let data = func.inst(term);
        for succ in successors_of(data.opcode, &data.args) {
            if !self.nodes[block].succs.contains(&succ) {
                self.nodes[block].succs.push(succ);
            }
            if !self.nodes[succ].preds.contains(&block) {
                self.nodes[succ].preds.push(block);
            }
        }
    }

    /// Recompute only `block`'s outgoing edges, after its terminator has
    /// changed (spec §4.2: "re-computed on demand").
    pub fn recompute_block(&mut self, func: &Function, block: Block) {
        let old_succs = std::mem::take(&mut self.nodes[block].succs);
        for succ in old_succs {
            self.nodes[succ].preds.retain(|&p| p != block);
        }
        self.compute_block(func, block);
    }

    /// Predecessors of `block`, in discovery order.
    pub fn predecessors(&self, block: Block) -> &[Block] {
        &self.nodes[block].preds
    }

    /// Successors of `block`, in discovery order.
    pub fn successors(&self, block: Block) -> &[Block] {
        &self.nodes[block].succs
    }

    /// `true` iff `block` has no predecessors and is not the entry block.
    pub fn is_unreachable(&self, block: Block) -> bool {
        Some(block) != self.entry && self.nodes[block].preds.is_empty()
    }

    /// Reverse post-order over reachable blocks from the entry, used by the
    /// dominator-tree computation and by the stack scheduler (spec §4.5,
    /// §4.9: "Operates per basic block in reverse post-order").
    pub fn reverse_post_order(&self) -> Vec<Block> {
        let Some(entry) = self.entry else {
            return Vec::new();
        };
        let mut visited = std::collections::HashSet::new();
        let mut post_order = Vec::new();
        let mut stack = vec![(entry, 0usize)];
        visited.insert(entry);
        while let Some((block, idx)) = stack.pop() {
            let succs = self.successors(block);
            if idx < succs.len() {
                stack.push((block, idx + 1));
                let next = succs[idx];
                if visited.insert(next) {
                    stack.push((next, 0));
                }
            } else {
                post_order.push(block);
            }
        }
        post_order.reverse();
        post_order
    }
}

/// The exact set of successor blocks for a terminator (spec §4.2 table).
/// `djmp`'s set is exact: every reachable target label the compiler
/// enumerated for it, passed in via `args` beyond the scrutinee.
fn successors_of(opcode: Opcode, args: &[crate::ir::instruction::Operand]) -> Vec<Block> {
    match opcode {
        Opcode::Jmp => args.iter().filter_map(|op| op.as_label()).collect(),
        Opcode::Jnz => {
            let mut labels: Vec<Block> = args.iter().filter_map(|op| op.as_label()).collect();
            labels.dedup();
            labels
        }
        Opcode::Djmp => {
            let mut labels: Vec<Block> = args.iter().filter_map(|op| op.as_label()).collect();
            labels.dedup();
            labels
        }
        Opcode::Ret
        | Opcode::Return
        | Opcode::Revert
        | Opcode::Stop
        | Opcode::Exit
        | Opcode::Invalid
        | Opcode::SelfDestruct => Vec::new(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::IrBuilder;
    use crate::ir::instruction::Operand;
    use crate::ir::literal::Literal;

    #[test]
    fn diamond_has_expected_edges() {
        let mut func = Function::new("f");
        let mut b = IrBuilder::new(&mut func);
        let entry = b.create_block();
        let left = b.create_block();
        let right = b.create_block();
        let join = b.create_block();

        b.switch_to_block(entry);
        b.terminate_block(
            Opcode::Jnz,
            vec![Operand::Imm(Literal::ONE), Operand::Label(left), Operand::Label(right)],
        )
        .unwrap();
        b.switch_to_block(left);
        b.terminate_block(Opcode::Jmp, vec![Operand::Label(join)]).unwrap();
        b.switch_to_block(right);
        b.terminate_block(Opcode::Jmp, vec![Operand::Label(join)]).unwrap();
        b.switch_to_block(join);
        b.terminate_block(Opcode::Stop, vec![]).unwrap();

        let cfg = ControlFlowGraph::compute(&func);
        assert_eq!(cfg.successors(entry), &[left, right]);
        assert_eq!(cfg.predecessors(join), &[left, right]);
        assert!(cfg.successors(join).is_empty());
        assert!(!cfg.is_unreachable(entry));
    }

    #[test]
    fn jnz_with_identical_targets_has_one_successor() {
        let mut func = Function::new("f");
        let mut b = IrBuilder::new(&mut func);
        let entry = b.create_block();
        let target = b.create_block();
        b.switch_to_block(entry);
        b.terminate_block(
            Opcode::Jnz,
            vec![Operand::Imm(Literal::ONE), Operand::Label(target), Operand::Label(target)],
        )
        .unwrap();
        b.switch_to_block(target);
        b.terminate_block(Opcode::Stop, vec![]).unwrap();

        let cfg = ControlFlowGraph::compute(&func);
        assert_eq!(cfg.successors(entry).len(), 1);
        assert_eq!(cfg.predecessors(target).len(), 1);
    }
}
