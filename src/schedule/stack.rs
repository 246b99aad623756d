//! Per-block stack layouts (spec §4.9's "stack-layout contract"): for every
//! block, which variables must be live on the physical stack on entry
//! (`layout_in`) and which remain on exit (`layout_out`).
//!
//! Grounded on `cranelift-codegen`'s register allocator tracking where each
//! value currently lives (`regalloc/diversion.rs`'s `RegDiversions`) and a
//! preferred location per value (`regalloc/affinity.rs`); here the "location"
//! is a stack depth instead of a register, and the affinity heuristic is
//! SPEC_FULL.md §12.2: the more a merged value is used after the join, the
//! closer to the top of the stack it should sit.

use crate::analysis::cfg::ControlFlowGraph;
use crate::analysis::liveness::Liveness;
use crate::ir::entities::{Block, Variable};
use crate::ir::function::Function;
use crate::ir::instruction::Operand;
use crate::ir::opcode::Opcode;
use rustc_hash::FxHashMap;

/// `layout_in`/`layout_out` per block, bottom-to-top (the last entry is the
/// value nearest the top of the physical stack).
#[derive(Clone, Debug, Default)]
pub struct BlockLayouts {
    layout_in: FxHashMap<Block, Vec<Variable>>,
    layout_out: FxHashMap<Block, Vec<Variable>>,
}

impl BlockLayouts {
    pub fn layout_in(&self, block: Block) -> &[Variable] {
        self.layout_in.get(&block).map_or(&[], Vec::as_slice)
    }

    pub fn layout_out(&self, block: Block) -> &[Variable] {
        self.layout_out.get(&block).map_or(&[], Vec::as_slice)
    }
}

/// Compute every block's layout in reverse post-order, so a block's
/// predecessor(s) are already assigned a `layout_out` by the time it is
/// reached (true for every forward edge; a loop header reached only via a
/// back edge instead derives its `layout_in` straight from its live-in set,
/// see [`single_pred_layout`]).
pub fn compute_layouts(func: &Function, cfg: &ControlFlowGraph, liveness: &Liveness) -> BlockLayouts {
    let mut layouts = BlockLayouts::default();

    for block in cfg.reverse_post_order() {
        let preds = cfg.predecessors(block);
        let in_layout = match preds {
            [] => Vec::new(),
            [pred] => single_pred_layout(func, cfg, liveness, block, *pred, &layouts),
            _ => join_layout(func, liveness, block),
        };
        let out_layout = block_out_layout(func, liveness, block, &in_layout);
        layouts.layout_in.insert(block, in_layout);
        layouts.layout_out.insert(block, out_layout);
    }

    layouts
}

/// A single predecessor reached by a plain `jmp` hands off exactly the
/// live-in subsequence of its own `layout_out` — nothing else could still be
/// needed. A predecessor reached as one arm of `jnz`/`djmp` cannot special-
/// case its handoff per target (the branch direction is a runtime fact, not
/// a compile-time one), so every such successor inherits the predecessor's
/// full, unfiltered `layout_out`; values that turn out dead here are popped
/// lazily by the ordinary per-instruction liveness check in
/// [`crate::schedule::select`]. A predecessor not yet visited (a loop back
/// edge) cannot be asked for its `layout_out` at all, so the header instead
/// falls back to its own live-in set in a canonical order.
fn single_pred_layout(
    func: &Function,
    cfg: &ControlFlowGraph,
    liveness: &Liveness,
    block: Block,
    pred: Block,
    layouts_so_far: &BlockLayouts,
) -> Vec<Variable> {
    let Some(pred_out) = layouts_so_far.layout_out.get(&pred) else {
        let mut live: Vec<Variable> = liveness.live_in(block).iter().copied().collect();
        live.sort();
        return live;
    };
    if cfg.successors(pred).len() <= 1 {
        pred_out.iter().copied().filter(|v| liveness.live_in(block).contains(v)).collect()
    } else {
        pred_out.clone()
    }
}

/// A block with multiple predecessors is, post-normalization, reached only
/// via plain `jmp`s (a critical edge into it would already have been split),
/// so each predecessor tailors its own handoff independently. The join's own
/// `layout_in` names the *shape* every predecessor must produce: its phis'
/// result variables (each one slot, regardless of which edge supplies the
/// value), in declaration order, followed by every other live-in variable —
/// which, by dominance, is defined above the join and so flows through every
/// predecessor unchanged — ordered so the most-used-after-the-join variable
/// ends up closest to the top (SPEC_FULL.md §12.2).
fn join_layout(func: &Function, liveness: &Liveness, block: Block) -> Vec<Variable> {
    let phis = phi_results(func, block);
    let mut rest: Vec<Variable> =
        liveness.live_in(block).iter().copied().filter(|v| !phis.contains(v)).collect();
    rest.sort_by_key(|&v| (use_count_in_block(func, block, v), v));

    let mut layout = phis;
    layout.extend(rest);
    layout
}

fn phi_results(func: &Function, block: Block) -> Vec<Variable> {
    func.block_insts(block)
        .iter()
        .map(|&i| func.inst(i))
        .take_while(|d| d.opcode == Opcode::Phi)
        .filter_map(|d| d.result)
        .collect()
}

fn use_count_in_block(func: &Function, block: Block, v: Variable) -> usize {
    func.block_insts(block).iter().map(|&i| func.inst(i).used_vars().filter(|&u| u == v).count()).sum()
}

/// What remains of `in_layout` after this block's own instructions run, plus
/// any new result this block defines that is still needed afterward. Does
/// not attempt to predict the scheduler's exact final ordering inside the
/// block — only which variables a successor may still assume are available.
fn block_out_layout(func: &Function, liveness: &Liveness, block: Block, in_layout: &[Variable]) -> Vec<Variable> {
    let live_out = liveness.live_out(block);
    let mut out: Vec<Variable> = in_layout.iter().copied().filter(|v| live_out.contains(v)).collect();
    for &inst in func.block_insts(block) {
        let data = func.inst(inst);
        if data.opcode == Opcode::Phi {
            continue;
        }
        if let Some(result) = data.result {
            if live_out.contains(&result) {
                out.push(result);
            }
        }
    }
    out
}

/// The concrete operand each of `target`'s `layout_in` slots resolves to on
/// the edge arriving from `from`: a phi's slot resolves to that phi's
/// edge value for `from`; every other slot passes the same variable through
/// unchanged.
pub fn edge_operands(func: &Function, layouts: &BlockLayouts, target: Block, from: Block) -> Vec<Operand> {
    layouts
        .layout_in(target)
        .iter()
        .map(|&v| {
            if let Some(def) = func.def_of(v) {
                let data = func.inst(def);
                if data.opcode == Opcode::Phi {
                    let edge = data
                        .phi_edges
                        .iter()
                        .find(|e| e.from == from)
                        .expect("a phi must carry an edge for every CFG predecessor");
                    return edge.value;
                }
            }
            Operand::Var(v)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::IrBuilder;
    use crate::ir::literal::Literal;

    #[test]
    fn single_successor_predecessor_filters_to_only_the_live_in_value() {
        let mut func = Function::new("f");
        let mut b = IrBuilder::new(&mut func);
        let entry = b.create_block();
        let exit = b.create_block();
        b.switch_to_block(entry);
        let kept = b.emit(Opcode::Param, vec![]).unwrap().unwrap();
        let dead = b.emit(Opcode::Param, vec![]).unwrap().unwrap();
        let _ = dead;
        b.terminate_block(Opcode::Jmp, vec![Operand::Label(exit)]).unwrap();
        b.switch_to_block(exit);
        b.terminate_block(Opcode::Ret, vec![Operand::Var(kept)]).unwrap();

        let cfg = ControlFlowGraph::compute(&func);
        let liveness = Liveness::compute(&func, &cfg);
        let layouts = compute_layouts(&func, &cfg, &liveness);

        assert_eq!(layouts.layout_in(exit), &[kept]);
    }

    #[test]
    fn join_layout_puts_phi_result_first_and_resolves_per_edge() {
        let mut func = Function::new("f");
        let mut b = IrBuilder::new(&mut func);
        let entry = b.create_block();
        let left = b.create_block();
        let right = b.create_block();
        let join = b.create_block();

        b.switch_to_block(entry);
        let cond = b.emit(Opcode::Param, vec![]).unwrap().unwrap();
        b.terminate_block(Opcode::Jnz, vec![Operand::Var(cond), Operand::Label(left), Operand::Label(right)])
            .unwrap();
        b.switch_to_block(left);
        b.terminate_block(Opcode::Jmp, vec![Operand::Label(join)]).unwrap();
        b.switch_to_block(right);
        b.terminate_block(Opcode::Jmp, vec![Operand::Label(join)]).unwrap();

        b.switch_to_block(join);
        let merged = b.create_variable(None);
        b.terminate_block(Opcode::Ret, vec![Operand::Var(merged)]).unwrap();

        // `b`'s last use was the terminator above; build and insert the phi
        // through `func` directly now that its borrow is free.
        let phi = func.make_inst(crate::ir::instruction::InstructionData {
            opcode: Opcode::Phi,
            args: Default::default(),
            phi_edges: vec![
                crate::ir::instruction::PhiEdge { from: left, value: Operand::Imm(Literal::ONE) },
                crate::ir::instruction::PhiEdge { from: right, value: Operand::Imm(Literal::ZERO) },
            ]
            .into(),
            result: Some(merged),
            parent: join,
            callee: None,
        });
        func.block_insts_mut(join).insert(0, phi);

        let cfg = ControlFlowGraph::compute(&func);
        let liveness = Liveness::compute(&func, &cfg);
        let layouts = compute_layouts(&func, &cfg, &liveness);

        assert_eq!(layouts.layout_in(join), &[merged]);
        let from_left = edge_operands(&func, &layouts, join, left);
        assert_eq!(from_left, vec![Operand::Imm(Literal::ONE)]);
        let from_right = edge_operands(&func, &layouts, join, right);
        assert_eq!(from_right, vec![Operand::Imm(Literal::ZERO)]);
    }
}
