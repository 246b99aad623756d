//! IR verifier: checks every invariant in spec §3/§8 directly, rather than
//! trusting that each pass maintains them by construction alone.
//!
//! Grounded on `cranelift-codegen::verifier`, named in `lib.rs` but not
//! retrieved in full in this pack; rebuilt from the invariant list spec §3
//! and §8 already spell out verbatim. Run by
//! [`crate::pass::manager::PassManager`] after every pass in debug
//! configurations (spec §7: a verifier failure is an `InvariantViolation`,
//! always fatal, never partially applied).

use crate::error::CompilerError;
use crate::ir::entities::{Block, Variable};
use crate::ir::function::Function;
use crate::ir::instruction::Operand;
use crate::ir::opcode::Opcode;
use rustc_hash::{FxHashMap, FxHashSet};

/// Check every universal invariant from spec §3/§8 against `func`.
///
/// `after_normalization` gates the two invariants that only hold once the
/// CFG has been normalized (spec §4.8, spec §8): every use is dominated by
/// its definition (before normalization, phi-uses are exempt per spec §8),
/// and no critical edge remains.
pub fn verify_function(
    pass_name: &str,
    func: &Function,
    after_normalization: bool,
) -> Result<(), CompilerError> {
    verify_one_terminator_per_block(pass_name, func)?;
    verify_single_def_per_variable(pass_name, func)?;
    verify_phi_shape(pass_name, func)?;
    if after_normalization {
        verify_no_critical_edges(pass_name, func)?;
        verify_def_dominates_every_use(pass_name, func)?;
    }
    Ok(())
}

fn violation(pass: &str, description: impl Into<String>) -> CompilerError {
    CompilerError::InvariantViolation {
        pass: pass.to_string(),
        description: description.into(),
    }
}

fn verify_one_terminator_per_block(pass: &str, func: &Function) -> Result<(), CompilerError> {
    for block in func.blocks_in_order() {
        let insts = func.block_insts(block);
        if insts.is_empty() {
            return Err(violation(pass, format!("block {block} has no instructions")));
        }
        for (i, &inst) in insts.iter().enumerate() {
            let is_term = func.inst(inst).opcode.is_terminator();
            let is_last = i == insts.len() - 1;
            if is_term && !is_last {
                return Err(violation(
                    pass,
                    format!("block {block} has a non-terminal terminator at position {i}"),
                ));
            }
            if !is_term && is_last {
                return Err(violation(
                    pass,
                    format!("block {block} does not end with a terminator"),
                ));
            }
        }
    }
    Ok(())
}

fn verify_single_def_per_variable(pass: &str, func: &Function) -> Result<(), CompilerError> {
    let mut seen: FxHashMap<Variable, ()> = FxHashMap::default();
    for block in func.blocks_in_order() {
        for &inst in func.block_insts(block) {
            if let Some(out) = func.inst(inst).result {
                if seen.insert(out, ()).is_some() {
                    return Err(violation(
                        pass,
                        format!("variable %{out} has more than one defining instruction"),
                    ));
                }
            }
        }
    }
    Ok(())
}

fn verify_phi_shape(pass: &str, func: &Function) -> Result<(), CompilerError> {
    for block in func.blocks_in_order() {
        let insts = func.block_insts(block);
        let mut past_phis = false;
        for &inst in insts {
            let data = func.inst(inst);
            let is_phi = data.opcode == crate::ir::opcode::Opcode::Phi;
            if is_phi && past_phis {
                return Err(violation(
                    pass,
                    format!("phi in block {block} does not appear at the top of the block"),
                ));
            }
            if !is_phi {
                past_phis = true;
            }
            if is_phi {
                let mut seen_preds = FxHashSet::default();
                for edge in &data.phi_edges {
                    if !seen_preds.insert(edge.from) {
                        return Err(violation(
                            pass,
                            format!("phi in block {block} lists predecessor {} twice", edge.from),
                        ));
                    }
                }
            }
        }
    }
    Ok(())
}

/// An edge `a -> b` is critical iff `a` has more than one successor and `b`
/// has more than one predecessor (spec §4.8): the normalizer's job is to
/// insert a fresh single-pred/single-succ block on every such edge, not to
/// change either endpoint's own degree, which is a structural fact about the
/// program's control flow and not something edge-splitting can remove.
fn verify_no_critical_edges(pass: &str, func: &Function) -> Result<(), CompilerError> {
    let cfg = crate::analysis::cfg::ControlFlowGraph::compute(func);
    for block in func.blocks_in_order() {
        let succs = cfg.successors(block);
        if succs.len() < 2 {
            continue;
        }
        for &succ in succs {
            if cfg.predecessors(succ).len() >= 2 {
                return Err(violation(pass, format!("critical edge {block} -> {succ} was not split")));
            }
        }
    }
    Ok(())
}

/// Every non-phi use of a variable must be dominated by its definition, and
/// every phi operand's value must dominate the edge's predecessor block
/// (spec §8: "Every Variable use is dominated by its definition").
fn verify_def_dominates_every_use(pass: &str, func: &Function) -> Result<(), CompilerError> {
    let cfg = crate::analysis::cfg::ControlFlowGraph::compute(func);
    let domtree = crate::analysis::dominator_tree::DominatorTree::compute(func, &cfg);

    let mut def_pos: FxHashMap<Variable, (Block, usize)> = FxHashMap::default();
    for block in func.blocks_in_order() {
        for (i, &inst) in func.block_insts(block).iter().enumerate() {
            if let Some(v) = func.inst(inst).result {
                def_pos.insert(v, (block, i));
            }
        }
    }

    for block in func.blocks_in_order() {
        for (i, &inst) in func.block_insts(block).iter().enumerate() {
            let data = func.inst(inst);

            for edge in &data.phi_edges {
                if let Operand::Var(v) = edge.value {
                    let Some(&(def_block, _)) = def_pos.get(&v) else { continue };
                    if !domtree.dominates(def_block, edge.from) {
                        return Err(violation(
                            pass,
                            format!("phi operand %{v} does not dominate predecessor {}", edge.from),
                        ));
                    }
                }
            }

            if data.opcode == Opcode::Phi {
                continue;
            }
            for &arg in &data.args {
                if let Operand::Var(v) = arg {
                    let Some(&(def_block, def_pos_in_block)) = def_pos.get(&v) else { continue };
                    let ok = if def_block == block {
                        def_pos_in_block < i
                    } else {
                        domtree.dominates(def_block, block)
                    };
                    if !ok {
                        return Err(violation(
                            pass,
                            format!("use of %{v} in block {block} is not dominated by its definition"),
                        ));
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::IrBuilder;

    #[test]
    fn accepts_a_diamond_join_with_a_correctly_dominated_phi() {
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
        let lv = b.emit(Opcode::Param, vec![]).unwrap().unwrap();
        b.terminate_block(Opcode::Jmp, vec![Operand::Label(join)]).unwrap();

        b.switch_to_block(right);
        let rv = b.emit(Opcode::Param, vec![]).unwrap().unwrap();
        b.terminate_block(Opcode::Jmp, vec![Operand::Label(join)]).unwrap();

        b.switch_to_block(join);
        b.terminate_block(Opcode::Stop, vec![]).unwrap();

        let merged = func.make_variable(None);
        let phi = func.make_inst(crate::ir::instruction::InstructionData {
            opcode: Opcode::Phi,
            args: Default::default(),
            phi_edges: vec![
                crate::ir::instruction::PhiEdge { from: left, value: Operand::Var(lv) },
                crate::ir::instruction::PhiEdge { from: right, value: Operand::Var(rv) },
            ]
            .into(),
            result: Some(merged),
            parent: join,
            callee: None,
        });
        func.block_insts_mut(join).insert(0, phi);

        assert!(verify_function("test", &func, true).is_ok());
    }

    #[test]
    fn rejects_a_critical_edge_left_unsplit() {
        let mut func = Function::new("f");
        let mut b = IrBuilder::new(&mut func);
        let entry = b.create_block();
        let via = b.create_block();
        let other = b.create_block();
        let join = b.create_block();
        let tail = b.create_block();

        b.switch_to_block(entry);
        let cond = b.emit(Opcode::Param, vec![]).unwrap().unwrap();
        // `entry` has two successors; `join` already has `via` as a second
        // predecessor, so the entry -> join edge is critical.
        b.terminate_block(Opcode::Jnz, vec![Operand::Var(cond), Operand::Label(join), Operand::Label(other)])
            .unwrap();

        b.switch_to_block(other);
        b.terminate_block(Opcode::Jmp, vec![Operand::Label(via)]).unwrap();

        b.switch_to_block(via);
        b.terminate_block(Opcode::Jmp, vec![Operand::Label(join)]).unwrap();

        b.switch_to_block(join);
        b.terminate_block(Opcode::Jmp, vec![Operand::Label(tail)]).unwrap();

        b.switch_to_block(tail);
        b.terminate_block(Opcode::Stop, vec![]).unwrap();

        assert!(verify_function("test", &func, true).is_err());
    }
}
