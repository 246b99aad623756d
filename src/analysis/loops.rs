//! Natural-loop detection (SPEC_FULL.md §11 supplement), grounded on
//! `cranelift-codegen::loop_analysis` (named in its `lib.rs`; body not
//! retrieved in this pack, so rebuilt from the standard back-edge
//! definition: an edge `n -> h` is a back edge iff `h` dominates `n`, and the
//! natural loop of that back edge is `h` plus every block that can reach `n`
//! without passing through `h`).
//!
//! Kept to detection only, not loop-invariant code motion (out of scope; see
//! SPEC_FULL.md §11).

use crate::analysis::cfg::ControlFlowGraph;
use crate::analysis::dominator_tree::DominatorTree;
use crate::ir::entities::Block;
use crate::ir::function::Function;
use rustc_hash::FxHashSet;

/// One natural loop: its header and the full set of blocks it contains.
#[derive(Clone, Debug)]
pub struct Loop {
    pub header: Block,
    pub blocks: FxHashSet<Block>,
}

/// Every natural loop in a function, keyed by header block.
#[derive(Clone, Debug, Default)]
pub struct LoopForest {
    loops: Vec<Loop>,
}

impl LoopForest {
    /// Find every back edge in `func`'s CFG and compute its natural loop.
    pub fn compute(func: &Function, cfg: &ControlFlowGraph, domtree: &DominatorTree) -> Self {
        let mut loops = Vec::new();
        for block in func.blocks_in_order() {
            for &succ in cfg.successors(block) {
                if domtree.dominates(succ, block) {
                    loops.push(natural_loop(cfg, succ, block));
                }
            }
        }
        LoopForest { loops }
    }

    /// `true` iff `block` is the header of at least one natural loop.
    pub fn is_loop_header(&self, block: Block) -> bool {
        self.loops.iter().any(|l| l.header == block)
    }

    /// Every detected loop, header first.
    pub fn loops(&self) -> &[Loop] {
        &self.loops
    }
}

fn natural_loop(cfg: &ControlFlowGraph, header: Block, latch: Block) -> Loop {
    let mut blocks = FxHashSet::default();
    blocks.insert(header);
    let mut stack = vec![latch];
    blocks.insert(latch);
    while let Some(block) = stack.pop() {
        for &pred in cfg.predecessors(block) {
            if blocks.insert(pred) {
                stack.push(pred);
            }
        }
    }
    Loop { header, blocks }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::IrBuilder;
    use crate::ir::instruction::Operand;
    use crate::ir::literal::Literal;
    use crate::ir::opcode::Opcode;

    #[test]
    fn detects_single_block_self_loop() {
        let mut func = Function::new("f");
        let mut b = IrBuilder::new(&mut func);
        let header = b.create_block();
        let exit = b.create_block();
        b.switch_to_block(header);
        b.terminate_block(
            Opcode::Jnz,
            vec![Operand::Imm(Literal::ONE), Operand::Label(header), Operand::Label(exit)],
        )
        .unwrap();
        b.switch_to_block(exit);
        b.terminate_block(Opcode::Stop, vec![]).unwrap();

        let cfg = ControlFlowGraph::compute(&func);
        let domtree = DominatorTree::compute(&func, &cfg);
        let loops = LoopForest::compute(&func, &cfg, &domtree);
        assert!(loops.is_loop_header(header));
        assert_eq!(loops.loops().len(), 1);
    }

    #[test]
    fn straight_line_has_no_loops() {
        let mut func = Function::new("f");
        let mut b = IrBuilder::new(&mut func);
        let a = b.create_block();
        let bb = b.create_block();
        b.switch_to_block(a);
        b.terminate_block(Opcode::Jmp, vec![Operand::Label(bb)]).unwrap();
        b.switch_to_block(bb);
        b.terminate_block(Opcode::Stop, vec![]).unwrap();

        let cfg = ControlFlowGraph::compute(&func);
        let domtree = DominatorTree::compute(&func, &cfg);
        let loops = LoopForest::compute(&func, &cfg, &domtree);
        assert!(loops.loops().is_empty());
    }
}
