//! Dominator tree analysis (spec §4.5): immediate dominators via the
//! Cooper-Harvey-Kennedy algorithm over the CFG's reverse post-order.
//!
//! Grounded on `cranelift-codegen/src/dominator_tree.rs`, which computes the
//! same `idom`/children relation the same way (iterative RPO-number
//! intersection rather than the classic Lengauer-Tarjan data structure).

use crate::analysis::cfg::ControlFlowGraph;
use crate::ir::entities::Block;
use crate::ir::function::Function;
use cranelift_entity::SecondaryMap;
use rustc_hash::FxHashMap;

#[derive(Clone, Debug, Default)]
struct DomNode {
    idom: Option<Block>,
    children: Vec<Block>,
    rpo_number: u32,
}

/// Immediate-dominator map and dominator-tree children map for one function.
#[derive(Clone, Debug)]
pub struct DominatorTree {
    nodes: SecondaryMap<Block, DomNode>,
    entry: Option<Block>,
}

impl DominatorTree {
    /// Compute the dominator tree of `func` from its (already computed) CFG.
    pub fn compute(func: &Function, cfg: &ControlFlowGraph) -> Self {
        let rpo = cfg.reverse_post_order();
        let mut nodes: SecondaryMap<Block, DomNode> = SecondaryMap::new();
        let mut rpo_index: FxHashMap<Block, usize> = FxHashMap::default();
        for (i, &block) in rpo.iter().enumerate() {
            nodes[block].rpo_number = i as u32;
            rpo_index.insert(block, i);
        }

        let Some(&entry) = rpo.first() else {
            return DominatorTree { nodes, entry: func.entry };
        };
        nodes[entry].idom = Some(entry);

        let mut changed = true;
        while changed {
            changed = false;
            for &block in rpo.iter().skip(1) {
                let mut preds = cfg
                    .predecessors(block)
                    .iter()
                    .copied()
                    .filter(|p| nodes[*p].idom.is_some() || *p == entry);
                let Some(first_processed) = preds.next() else {
                    continue;
                };
                let mut new_idom = first_processed;
                for pred in preds {
                    if nodes[pred].idom.is_some() {
                        new_idom = intersect(&nodes, &rpo_index, new_idom, pred);
                    }
                }
                if nodes[block].idom != Some(new_idom) {
                    nodes[block].idom = Some(new_idom);
                    changed = true;
                }
            }
        }

        for &block in &rpo {
            if let Some(idom) = nodes[block].idom {
                if idom != block {
                    nodes[idom].children.push(block);
                }
            }
        }

        DominatorTree { nodes, entry: Some(entry) }
    }

    /// `block`'s immediate dominator, or `None` for the entry block or an
    /// unreachable block.
    pub fn idom(&self, block: Block) -> Option<Block> {
        self.nodes[block].idom.filter(|&idom| idom != block)
    }

    /// Direct children of `block` in the dominator tree.
    pub fn children(&self, block: Block) -> &[Block] {
        &self.nodes[block].children
    }

    /// `true` iff `a` dominates `b` (every path from the entry to `b` passes
    /// through `a`; a block dominates itself).
    pub fn dominates(&self, a: Block, b: Block) -> bool {
        if self.nodes[a].idom.is_none() && Some(a) != self.entry {
            return false;
        }
        let mut cur = b;
        loop {
            if cur == a {
                return true;
            }
            match self.nodes[cur].idom {
                Some(idom) if idom != cur => cur = idom,
                _ => return cur == a,
            }
        }
    }
}

fn intersect(
    nodes: &SecondaryMap<Block, DomNode>,
    rpo_index: &FxHashMap<Block, usize>,
    mut a: Block,
    mut b: Block,
) -> Block {
    while a != b {
        while rpo_index[&a] > rpo_index[&b] {
            a = nodes[a].idom.expect("processed block must have an idom");
        }
        while rpo_index[&b] > rpo_index[&a] {
            b = nodes[b].idom.expect("processed block must have an idom");
        }
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::IrBuilder;
    use crate::ir::instruction::Operand;
    use crate::ir::literal::Literal;
    use crate::ir::opcode::Opcode;

    #[test]
    fn diamond_idom_is_entry() {
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
        let domtree = DominatorTree::compute(&func, &cfg);
        assert_eq!(domtree.idom(join), Some(entry));
        assert_eq!(domtree.idom(left), Some(entry));
        assert!(domtree.dominates(entry, join));
        assert!(!domtree.dominates(left, right));
    }

    #[test]
    fn straight_line_chain_dominates_transitively() {
        let mut func = Function::new("f");
        let mut b = IrBuilder::new(&mut func);
        let a = b.create_block();
        let bb = b.create_block();
        let c = b.create_block();
        b.switch_to_block(a);
        b.terminate_block(Opcode::Jmp, vec![Operand::Label(bb)]).unwrap();
        b.switch_to_block(bb);
        b.terminate_block(Opcode::Jmp, vec![Operand::Label(c)]).unwrap();
        b.switch_to_block(c);
        b.terminate_block(Opcode::Stop, vec![]).unwrap();

        let cfg = ControlFlowGraph::compute(&func);
        let domtree = DominatorTree::compute(&func, &cfg);
        assert!(domtree.dominates(a, c));
        assert_eq!(domtree.idom(c), Some(bb));
    }
}
