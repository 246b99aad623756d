//! Algebraic Simplification (spec §4.7): peephole identities applied to a
//! fixed point — `x+0 -> x`, `x*1 -> x`, `x*0 -> 0`, `x&x -> x`, `x|x -> x`,
//! `x^x -> 0`, `iszero(iszero(x)) -> x` where every use of the outer result
//! only cares about zero-vs-nonzero, and folding a shift by `>= 256`.
//!
//! Grounded on spec §4.7's identity list directly; `cranelift-codegen` does
//! this kind of rewrite in its per-ISA legalizer rather than a standalone IR
//! pass (not retrieved in this pack), so the pass shape here follows the
//! worklist-to-fixed-point convention the rest of this crate's optimization
//! passes already use ([`crate::pass::dce`], [`crate::pass::sccp`]).

use crate::analysis::cache::AnalysisCache;
use crate::analysis::dfg::DataFlowGraph;
use crate::analysis::AnalysisKind;
use crate::error::CompilerError;
use crate::ir::entities::{Inst, Variable};
use crate::ir::function::Function;
use crate::ir::instruction::Operand;
use crate::ir::literal::Literal;
use crate::ir::opcode::Opcode;
use crate::pass::FunctionPass;

/// Rewrites an instruction's result to an existing operand or a constant
/// wherever an algebraic identity applies, leaving the original instruction
/// for DCE to remove once its result is unused.
#[derive(Default)]
pub struct Algebraic;

impl FunctionPass for Algebraic {
    fn name(&self) -> &'static str {
        "algebraic"
    }

    fn required_analyses(&self) -> &'static [AnalysisKind] {
        &[AnalysisKind::Dfg]
    }

    fn preserved_analyses(&self) -> &'static [AnalysisKind] {
        &[AnalysisKind::Cfg, AnalysisKind::DominatorTree, AnalysisKind::Loops]
    }

    fn run(&mut self, func: &mut Function, _cache: &mut AnalysisCache) -> Result<bool, CompilerError> {
        let mut changed = false;
        loop {
            let mut dfg = DataFlowGraph::compute(func);
            let mut rewrites: Vec<(Variable, Operand)> = Vec::new();
            for block in func.blocks_in_order() {
                for &inst in func.block_insts(block) {
                    if let Some((result, replacement)) = simplify(func, &dfg, inst) {
                        rewrites.push((result, replacement));
                    }
                }
            }
            if rewrites.is_empty() {
                break;
            }
            for (old, replacement) in rewrites {
                match replacement {
                    Operand::Var(new) => dfg.replace_all_uses_with(func, old, new),
                    Operand::Imm(lit) => replace_with_imm(func, &dfg, old, lit),
                    Operand::Label(_) => unreachable!("algebraic identities never produce a label"),
                }
            }
            changed = true;
        }
        Ok(changed)
    }
}

fn replace_with_imm(func: &mut Function, dfg: &DataFlowGraph, old: Variable, lit: Literal) {
    for &user in dfg.uses_of(old) {
        let data = func.inst_mut(user);
        for arg in data.args.iter_mut() {
            if arg.as_var() == Some(old) {
                *arg = Operand::Imm(lit);
            }
        }
        for edge in data.phi_edges.iter_mut() {
            if edge.value.as_var() == Some(old) {
                edge.value = Operand::Imm(lit);
            }
        }
    }
}

/// Try to simplify one instruction; returns its result variable plus the
/// operand it should be replaced by, if an identity matches.
fn simplify(func: &Function, dfg: &DataFlowGraph, inst: Inst) -> Option<(Variable, Operand)> {
    let data = func.inst(inst);
    let result = data.result?;
    let args = &data.args;
    match data.opcode {
        Opcode::Add => {
            if is_zero(args[0]) {
                return Some((result, args[1]));
            }
            if is_zero(args[1]) {
                return Some((result, args[0]));
            }
        }
        Opcode::Mul => {
            if is_one(args[0]) {
                return Some((result, args[1]));
            }
            if is_one(args[1]) {
                return Some((result, args[0]));
            }
            if is_zero(args[0]) || is_zero(args[1]) {
                return Some((result, Operand::Imm(Literal::ZERO)));
            }
        }
        Opcode::Sub => {
            if is_zero(args[1]) {
                return Some((result, args[0]));
            }
            if same_var(args[0], args[1]) {
                return Some((result, Operand::Imm(Literal::ZERO)));
            }
        }
        Opcode::Div | Opcode::SDiv => {
            if is_one(args[1]) {
                return Some((result, args[0]));
            }
        }
        Opcode::And => {
            if same_var(args[0], args[1]) {
                return Some((result, args[0]));
            }
            if is_zero(args[0]) || is_zero(args[1]) {
                return Some((result, Operand::Imm(Literal::ZERO)));
            }
        }
        Opcode::Or => {
            if same_var(args[0], args[1]) {
                return Some((result, args[0]));
            }
            if is_zero(args[0]) {
                return Some((result, args[1]));
            }
            if is_zero(args[1]) {
                return Some((result, args[0]));
            }
        }
        Opcode::Xor => {
            if same_var(args[0], args[1]) {
                return Some((result, Operand::Imm(Literal::ZERO)));
            }
            if is_zero(args[0]) {
                return Some((result, args[1]));
            }
            if is_zero(args[1]) {
                return Some((result, args[0]));
            }
        }
        Opcode::IsZero => {
            if let Operand::Var(inner) = args[0] {
                if let Some(inner_inst) = func.def_of(inner) {
                    let inner_data = func.inst(inner_inst);
                    // `iszero(iszero(x))` normalizes any nonzero `x` to `1`,
                    // so this is only value-preserving where the result is
                    // itself only ever tested for zero-vs-nonzero.
                    if inner_data.opcode == Opcode::IsZero && only_feeds_boolean_sinks(func, dfg, result) {
                        return Some((result, inner_data.args[0]));
                    }
                }
            }
        }
        Opcode::Shl | Opcode::Shr => {
            if let Operand::Imm(shift) = args[0] {
                if shift.0 >= ethnum::U256::from(256u16) {
                    return Some((result, Operand::Imm(Literal::ZERO)));
                }
            }
        }
        _ => {}
    }
    None
}

/// `true` iff every direct use of `var` only distinguishes zero from
/// nonzero: a `jnz` condition, an `assert`/`assert_unreachable` operand, or
/// another `iszero`'s operand. A use through a phi is conservatively treated
/// as not boolean, since that would require following the phi's own uses in
/// turn.
fn only_feeds_boolean_sinks(func: &Function, dfg: &DataFlowGraph, var: Variable) -> bool {
    dfg.uses_of(var).iter().all(|&user| {
        let data = func.inst(user);
        matches!(data.opcode, Opcode::Jnz | Opcode::Assert | Opcode::AssertUnreachable | Opcode::IsZero)
            && data.args.first().and_then(|op| op.as_var()) == Some(var)
    })
}

fn is_zero(op: Operand) -> bool {
    matches!(op, Operand::Imm(l) if l.is_zero())
}

fn is_one(op: Operand) -> bool {
    matches!(op, Operand::Imm(l) if l.is_one())
}

fn same_var(a: Operand, b: Operand) -> bool {
    matches!((a, b), (Operand::Var(x), Operand::Var(y)) if x == y)
}
