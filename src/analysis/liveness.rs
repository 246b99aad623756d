//! Liveness analysis (spec §4.4): backward fixed-point dataflow over the
//! reverse CFG, computing live-out variable sets per block.
//!
//! Grounded on `cranelift-codegen/src/regalloc/liveness.rs`'s worklist shape
//! (spec §9: "express the worklist as an ordinary bounded queue ... finite
//! monotone lattices"), simplified to block-granularity sets since this
//! crate's stack scheduler only needs liveness at block boundaries and at
//! per-instruction "is this the last use" queries (`is_live_after`), not a
//! full interval allocator.

use crate::analysis::cfg::ControlFlowGraph;
use crate::ir::entities::{Block, Inst, Variable};
use crate::ir::function::Function;
use cranelift_entity::SecondaryMap;
use rustc_hash::FxHashSet;
use std::collections::VecDeque;

#[derive(Clone, Debug, Default)]
struct BlockLiveness {
    live_in: FxHashSet<Variable>,
    live_out: FxHashSet<Variable>,
}

/// Per-block live-in/live-out sets (spec §4.4), plus the queries the stack
/// scheduler needs at instruction granularity.
#[derive(Clone, Debug)]
pub struct Liveness {
    blocks: SecondaryMap<Block, BlockLiveness>,
}

impl Liveness {
    /// Run the backward fixed-point computation over `func`'s current CFG.
    pub fn compute(func: &Function, cfg: &ControlFlowGraph) -> Self {
        let mut blocks: SecondaryMap<Block, BlockLiveness> = SecondaryMap::new();
        let order: Vec<Block> = func.blocks_in_order().collect();

        let mut worklist: VecDeque<Block> = order.iter().rev().copied().collect();
        let mut queued: FxHashSet<Block> = worklist.iter().copied().collect();

        while let Some(block) = worklist.pop_front() {
            queued.remove(&block);

            let mut live_out = FxHashSet::default();
            for &succ in cfg.successors(block) {
                live_out.extend(phi_aware_live_in(func, succ, block, &blocks[succ].live_in));
            }

            let live_in = transfer(func, block, &live_out);

            let changed = blocks[block].live_in != live_in || blocks[block].live_out != live_out;
            blocks[block].live_out = live_out;
            blocks[block].live_in = live_in;

            if changed {
                for &pred in cfg.predecessors(block) {
                    if queued.insert(pred) {
                        worklist.push_back(pred);
                    }
                }
            }
        }

        Liveness { blocks }
    }

    /// Variables live on entry to `block`.
    pub fn live_in(&self, block: Block) -> &FxHashSet<Variable> {
        &self.blocks[block].live_in
    }

    /// Variables live on exit from `block`.
    pub fn live_out(&self, block: Block) -> &FxHashSet<Variable> {
        &self.blocks[block].live_out
    }

    /// `true` iff `var` is live immediately after `inst` executes within its
    /// own block — i.e. some later instruction in the same block uses it, or
    /// it is in the block's live-out set. Used by the stack scheduler (spec
    /// §4.9) to decide whether an operand may be consumed in place instead of
    /// duplicated.
    pub fn is_live_after(&self, func: &Function, inst: Inst, var: Variable) -> bool {
        let block = func.inst(inst).parent;
        let insts = func.block_insts(block);
        let pos = insts.iter().position(|&i| i == inst).expect("inst must be in its own block");
        for &later in &insts[pos + 1..] {
            if func.inst(later).used_vars().any(|u| u == var) {
                return true;
            }
        }
        self.live_out(block).contains(&var)
    }
}

/// `use(I)` per spec §4.4: operand variables except phi-block-labels, with
/// phi operands attributed to the edge from their paired predecessor rather
/// than to the phi's own block.
fn transfer(func: &Function, block: Block, live_out: &FxHashSet<Variable>) -> FxHashSet<Variable> {
    let mut live = live_out.clone();
    for &inst in func.block_insts(block).iter().rev() {
        let data = func.inst(inst);
        if let Some(out) = data.result {
            live.remove(&out);
        }
        if data.opcode != crate::ir::opcode::Opcode::Phi {
            for var in data.args.iter().filter_map(|op| op.as_var()) {
                live.insert(var);
            }
        }
    }
    live
}

/// The portion of `succ`'s live-in set attributable to the edge from `pred`:
/// every non-phi live-in variable (edge-independent), plus each phi's
/// incoming value specifically paired with `pred` (spec §4.4: "considered
/// used on the incoming edge from its paired predecessor label").
fn phi_aware_live_in(
    func: &Function,
    succ: Block,
    pred: Block,
    succ_live_in: &FxHashSet<Variable>,
) -> Vec<Variable> {
    let mut out = Vec::new();
    for &inst in func.block_insts(succ) {
        let data = func.inst(inst);
        if data.opcode != crate::ir::opcode::Opcode::Phi {
            break;
        }
        for edge in &data.phi_edges {
            if edge.from == pred {
                if let Some(var) = edge.value.as_var() {
                    out.push(var);
                }
            }
        }
    }
    out.extend(succ_live_in.iter().copied());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::IrBuilder;
    use crate::ir::instruction::Operand;
    use crate::ir::literal::Literal;
    use crate::ir::opcode::Opcode;

    #[test]
    fn value_used_across_block_boundary_is_live_out() {
        let mut func = Function::new("f");
        let mut b = IrBuilder::new(&mut func);
        let entry = b.create_block();
        let exit = b.create_block();
        b.switch_to_block(entry);
        let a = b
            .emit(Opcode::Add, vec![Operand::Imm(Literal::from_u64(1)), Operand::Imm(Literal::from_u64(2))])
            .unwrap()
            .unwrap();
        b.terminate_block(Opcode::Jmp, vec![Operand::Label(exit)]).unwrap();
        b.switch_to_block(exit);
        b.terminate_block(Opcode::Ret, vec![Operand::Var(a)]).unwrap();

        let cfg = ControlFlowGraph::compute(&func);
        let liveness = Liveness::compute(&func, &cfg);
        assert!(liveness.live_out(entry).contains(&a));
        assert!(liveness.live_in(exit).contains(&a));
    }
}
