//! The CFG normalizer (spec §4.8): rewrites critical edges so no block has
//! both multiple predecessors and multiple successors. Runs once, after the
//! optimization loop has reached its fixed point and before the stack
//! scheduler, which depends on every block's layout-in being determined by
//! either a single predecessor or a phi-merge over same-shape inputs.
//!
//! Grounded on spec §4.8's algorithm paragraph directly; no teacher file
//! splits critical edges (`cranelift-codegen` never needs to, since its
//! register allocator tolerates them), so this mirrors the shape of the
//! other context-free per-function rewrites in `crate::pass` (a compute,
//! find, mutate, repeat loop, same as `crate::pass::simplify_cfg`).

use crate::analysis::cfg::ControlFlowGraph;
use crate::error::CompilerError;
use crate::ir::entities::Block;
use crate::ir::function::Function;
use crate::ir::instruction::{InstructionData, Operand};
use crate::ir::opcode::Opcode;
use crate::ir::verify::verify_function;

#[derive(Default)]
pub struct Normalizer;

impl Normalizer {
    /// Split every critical edge in `func`, fixing up phi operands to name
    /// the freshly inserted block instead of the original predecessor.
    /// Returns whether any edge was split.
    pub fn run(&mut self, func: &mut Function) -> Result<bool, CompilerError> {
        let mut changed = false;
        loop {
            let cfg = ControlFlowGraph::compute(func);
            let Some((a, b)) = find_critical_edge(func, &cfg) else { break };
            split_edge(func, a, b);
            changed = true;
        }

        if cfg!(debug_assertions) {
            verify_function("normalize", func, true)?;
        }

        Ok(changed)
    }
}

/// The first critical edge found in block-layout order: an edge `a -> b`
/// where `a` has more than one successor and `b` has more than one
/// predecessor (spec §4.8).
fn find_critical_edge(func: &Function, cfg: &ControlFlowGraph) -> Option<(Block, Block)> {
    for a in func.blocks_in_order() {
        let succs = cfg.successors(a);
        if succs.len() < 2 {
            continue;
        }
        for &b in succs {
            if cfg.predecessors(b).len() >= 2 {
                return Some((a, b));
            }
        }
    }
    None
}

/// Insert a fresh single-pred/single-succ block on the edge `a -> b`: every
/// label operand in `a`'s terminator that names `b` is retargeted to the new
/// block, which unconditionally jumps on to `b`; every phi in `b` that took
/// its value from `a` now takes it from the new block instead (spec §4.8:
/// "fixes phi operands to reference the new block instead of the original
/// predecessor").
fn split_edge(func: &mut Function, a: Block, b: Block) -> Block {
    let e = func.make_block();

    let term = func.terminator(a).expect("a has >=2 successors, so it has a terminator");
    let data = func.inst_mut(term);
    for arg in data.args.iter_mut() {
        if *arg == Operand::Label(b) {
            *arg = Operand::Label(e);
        }
    }

    for &inst in func.block_insts(b).to_vec().iter() {
        if func.inst(inst).opcode != Opcode::Phi {
            continue;
        }
        for edge in func.inst_mut(inst).phi_edges.iter_mut() {
            if edge.from == a {
                edge.from = e;
            }
        }
    }

    let jmp = func.make_inst(InstructionData {
        opcode: Opcode::Jmp,
        args: vec![Operand::Label(b)].into(),
        phi_edges: Default::default(),
        result: None,
        parent: e,
        callee: None,
    });
    func.append_inst(e, jmp);

    e
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::IrBuilder;
    use crate::ir::instruction::PhiEdge;
    use crate::ir::literal::Literal;

    #[test]
    fn splits_both_edges_into_a_join_with_a_branching_predecessor() {
        // P1 and P2 both `jnz ..., @q, @r`; Q has predecessors {P1, P2} and
        // successors {S1, S2} via a further jnz of its own (spec §8 Scenario
        // 5). Both P1->Q and P2->Q are critical.
        let mut func = Function::new("f");
        let mut b = IrBuilder::new(&mut func);
        let p1 = b.create_block();
        let p2 = b.create_block();
        let q = b.create_block();
        let r = b.create_block();
        let s1 = b.create_block();
        let s2 = b.create_block();

        b.switch_to_block(p1);
        let c1 = b.emit(Opcode::Param, vec![]).unwrap().unwrap();
        b.terminate_block(Opcode::Jnz, vec![Operand::Var(c1), Operand::Label(q), Operand::Label(r)]).unwrap();

        b.switch_to_block(p2);
        let c2 = b.emit(Opcode::Param, vec![]).unwrap().unwrap();
        b.terminate_block(Opcode::Jnz, vec![Operand::Var(c2), Operand::Label(q), Operand::Label(r)]).unwrap();

        b.switch_to_block(r);
        b.terminate_block(Opcode::Stop, vec![]).unwrap();

        b.switch_to_block(q);
        let cq = b.emit(Opcode::Param, vec![]).unwrap().unwrap();
        b.terminate_block(Opcode::Jnz, vec![Operand::Var(cq), Operand::Label(s1), Operand::Label(s2)]).unwrap();

        b.switch_to_block(s1);
        b.terminate_block(Opcode::Stop, vec![]).unwrap();
        b.switch_to_block(s2);
        b.terminate_block(Opcode::Stop, vec![]).unwrap();

        let merged = func.make_variable(None);
        let phi = func.make_inst(InstructionData {
            opcode: Opcode::Phi,
            args: Default::default(),
            phi_edges: vec![
                PhiEdge { from: p1, value: Operand::Imm(Literal::ONE) },
                PhiEdge { from: p2, value: Operand::Imm(Literal::ZERO) },
            ]
            .into(),
            result: Some(merged),
            parent: q,
            callee: None,
        });
        func.block_insts_mut(q).insert(0, phi);

        let changed = Normalizer.run(&mut func).unwrap();
        assert!(changed);

        // Q still legitimately has multiple predecessors and multiple
        // successors; only each incoming edge gained a fresh hop.
        let cfg = ControlFlowGraph::compute(&func);
        assert_eq!(cfg.predecessors(q).len(), 2);
        assert_eq!(cfg.successors(q).len(), 2);
        for &pred in cfg.predecessors(q) {
            assert_eq!(cfg.predecessors(pred).len(), 1);
            assert_eq!(cfg.successors(pred).len(), 1);
        }

        let phi_edges = &func.inst(phi).phi_edges;
        assert_eq!(phi_edges.len(), 2);
        for edge in phi_edges {
            assert_ne!(edge.from, p1);
            assert_ne!(edge.from, p2);
        }
    }

    #[test]
    fn leaves_an_already_normalized_cfg_untouched() {
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
        b.terminate_block(Opcode::Stop, vec![]).unwrap();

        let before = func.num_blocks();
        let changed = Normalizer.run(&mut func).unwrap();
        assert!(!changed);
        assert_eq!(func.num_blocks(), before);
    }
}
