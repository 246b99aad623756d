//! The stack scheduler / instruction selector (spec §4.9): walks every block
//! in reverse post-order, maintaining a simulated model of the physical
//! stack, and emits the `DUP`/`SWAP`/`POP` shuffles needed to present each
//! instruction's operands on top before emitting the instruction itself.
//!
//! Grounded on spec §4.9's per-instruction algorithm directly: "for each
//! operand, if it is already on top, use it; otherwise bring it to the top
//! with `DUP` (if it has further uses) or a `SWAP` (if this is its last use,
//! consuming it in place)." The DUP-vs-SWAP choice is driven by
//! [`crate::analysis::liveness::Liveness::is_live_after`].

use crate::analysis::liveness::Liveness;
use crate::ir::entities::{Block, Inst, Variable};
use crate::ir::function::Function;
use crate::ir::instruction::{InstructionData, Operand};
use crate::ir::literal::Literal;
use crate::ir::opcode::Opcode;
use crate::schedule::stack::{edge_operands, BlockLayouts};

/// One item of the symbolic assembly stream the assembler lowers to bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AsmItem {
    /// Marks the start of a block; becomes a `JUMPDEST` at assembly time.
    Label(Block),
    /// An opcode whose operands already sit on top of the stack.
    Op(Opcode),
    /// An unresolved internal call (spec §4.9 Non-goals: the calling
    /// convention below `invoke` — frame setup, return-address handling —
    /// is not lowered here; every `invoke` left after inlining is emitted as
    /// this marker instead).
    Invoke(String),
    PushLiteral(Literal),
    PushLabel(Block),
    /// Duplicate the `n`th item from the top (1 = the current top).
    Dup(u8),
    /// Swap the top item with the `n`th item below it (1 = the second item).
    Swap(u8),
    Pop,
    /// Unconditional jump to the label pushed immediately before it.
    Jump,
    /// Conditional jump: pops a condition, then the two labels pushed before
    /// it, and jumps to whichever the condition selects.
    JumpI,
}

/// Lower one function's normalized SSA form to its symbolic assembly stream.
pub fn select_function(func: &Function, liveness: &Liveness, layouts: &BlockLayouts, order: &[Block]) -> Vec<AsmItem> {
    let mut out = Vec::new();

    for &block in order {
        out.push(AsmItem::Label(block));
        let mut stack: Vec<Option<Variable>> = layouts.layout_in(block).iter().copied().map(Some).collect();

        for &inst in func.block_insts(block) {
            let data = func.inst(inst);
            if data.opcode == Opcode::Phi {
                continue;
            }
            if data.opcode.is_terminator() {
                emit_terminator(func, layouts, liveness, block, inst, data, &mut stack, &mut out);
                continue;
            }

            let n = data.args.len();
            for i in 0..n {
                let consume = is_last_use(data, inst, i, func, liveness);
                place_operand(&mut stack, data.args[i], consume, &mut out);
            }
            for _ in 0..n {
                stack.pop();
            }

            if data.opcode == Opcode::Invoke {
                out.push(AsmItem::Invoke(data.callee.clone().unwrap_or_default()));
            } else {
                out.push(AsmItem::Op(data.opcode));
            }

            if let Some(result) = data.result {
                stack.push(Some(result));
                if !liveness.is_live_after(func, inst, result) {
                    out.push(AsmItem::Pop);
                    stack.pop();
                }
            }
        }
    }

    out
}

fn is_last_use(data: &InstructionData, inst: Inst, idx: usize, func: &Function, liveness: &Liveness) -> bool {
    match data.args[idx] {
        Operand::Var(v) => {
            let used_again_in_this_inst = data.args[idx + 1..].iter().any(|a| a.as_var() == Some(v));
            !used_again_in_this_inst && !liveness.is_live_after(func, inst, v)
        }
        _ => false,
    }
}

/// Bring `op`'s value to the current top of `stack`. `consume` picks `DUP`
/// (value needed again, so leave the original in place and copy it) versus
/// `SWAP` (this is the value's last use, so move it up in place instead of
/// leaving a dead duplicate behind).
fn place_operand(stack: &mut Vec<Option<Variable>>, op: Operand, consume: bool, out: &mut Vec<AsmItem>) {
    match op {
        Operand::Var(v) => {
            let depth = stack
                .iter()
                .rev()
                .position(|slot| *slot == Some(v))
                .map(|p| p + 1)
                .expect("an operand variable must already be materialized on this block's stack");
            if consume {
                swap_to_top(stack, depth, out);
            } else {
                if depth > 0 {
                    out.push(AsmItem::Dup(depth as u8));
                }
                stack.push(Some(v));
            }
        }
        Operand::Imm(lit) => {
            out.push(AsmItem::PushLiteral(lit));
            stack.push(None);
        }
        Operand::Label(_) => unreachable!("a value operand is never a label"),
    }
}

fn swap_to_top(stack: &mut Vec<Option<Variable>>, depth: usize, out: &mut Vec<AsmItem>) {
    if depth <= 1 {
        return;
    }
    out.push(AsmItem::Swap((depth - 1) as u8));
    let len = stack.len();
    stack.swap(len - 1, len - depth);
}

/// Transform `stack` into exactly `target` (bottom-to-top), discarding
/// everything else. Every needed value is first duplicated on top (so the
/// original, still-intact region below is untouched while we read from it),
/// then the whole original region is stripped out from underneath the
/// freshly built one: each iteration swaps the boundary between the two
/// regions to the top and pops it, which never disturbs the new region's
/// internal order since the boundary depth relative to the current top never
/// changes while it shrinks.
fn arrange_for_target(stack: &mut Vec<Option<Variable>>, target: &[Operand], out: &mut Vec<AsmItem>) {
    let old_len = stack.len();
    for &op in target {
        place_operand(stack, op, false, out);
    }

    let new_region_len = target.len();
    let boundary_depth = new_region_len + 1;
    for _ in 0..old_len {
        if boundary_depth > 1 {
            out.push(AsmItem::Swap((boundary_depth - 1) as u8));
            let len = stack.len();
            stack.swap(len - 1, len - boundary_depth);
        }
        out.push(AsmItem::Pop);
        stack.pop();
    }
}

fn emit_terminator(
    func: &Function,
    layouts: &BlockLayouts,
    liveness: &Liveness,
    block: Block,
    inst: Inst,
    data: &InstructionData,
    stack: &mut Vec<Option<Variable>>,
    out: &mut Vec<AsmItem>,
) {
    match data.opcode {
        Opcode::Jmp => {
            let target = data.args[0].as_label().expect("jmp's sole operand is its target label");
            let target_ops = edge_operands(func, layouts, target, block);
            arrange_for_target(stack, &target_ops, out);
            out.push(AsmItem::PushLabel(target));
            out.push(AsmItem::Jump);
        }
        Opcode::Jnz => {
            let consume = is_last_use(data, inst, 0, func, liveness);
            place_operand(stack, data.args[0], consume, out);
            stack.pop();
            let lfalse = data.args[1].as_label().expect("jnz's second operand is a label");
            let ltrue = data.args[2].as_label().expect("jnz's third operand is a label");
            out.push(AsmItem::PushLabel(lfalse));
            out.push(AsmItem::PushLabel(ltrue));
            out.push(AsmItem::JumpI);
        }
        Opcode::Djmp => {
            let consume = is_last_use(data, inst, 0, func, liveness);
            place_operand(stack, data.args[0], consume, out);
            stack.pop();
            out.push(AsmItem::Jump);
        }
        Opcode::Ret | Opcode::SelfDestruct | Opcode::Return | Opcode::Revert => {
            let n = data.args.len();
            for i in 0..n {
                let consume = is_last_use(data, inst, i, func, liveness);
                place_operand(stack, data.args[i], consume, out);
            }
            for _ in 0..n {
                stack.pop();
            }
            out.push(AsmItem::Op(data.opcode));
        }
        Opcode::Stop | Opcode::Invalid | Opcode::Exit => {
            out.push(AsmItem::Op(data.opcode));
        }
        other => unreachable!("{other} is not a recognized terminator"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::cfg::ControlFlowGraph;
    use crate::ir::builder::IrBuilder;
    use crate::schedule::stack::compute_layouts;

    #[test]
    fn straight_line_add_then_ret_dups_nothing_it_does_not_need() {
        let mut func = Function::new("f");
        let mut b = IrBuilder::new(&mut func);
        let entry = b.create_block();
        b.switch_to_block(entry);
        let sum = b.emit(Opcode::Add, vec![Operand::Imm(Literal::ONE), Operand::Imm(Literal::from_u64(2))]).unwrap().unwrap();
        b.terminate_block(Opcode::Ret, vec![Operand::Var(sum)]).unwrap();

        let cfg = ControlFlowGraph::compute(&func);
        let liveness = Liveness::compute(&func, &cfg);
        let layouts = compute_layouts(&func, &cfg, &liveness);
        let order = cfg.reverse_post_order();
        let asm = select_function(&func, &liveness, &layouts, &order);

        assert_eq!(
            asm,
            vec![
                AsmItem::Label(entry),
                AsmItem::PushLiteral(Literal::ONE),
                AsmItem::PushLiteral(Literal::from_u64(2)),
                AsmItem::Op(Opcode::Add),
                AsmItem::Op(Opcode::Ret),
            ]
        );
    }

    #[test]
    fn repeated_operand_is_duped_on_its_first_use_and_consumed_on_its_last() {
        let mut func = Function::new("f");
        let mut b = IrBuilder::new(&mut func);
        let entry = b.create_block();
        b.switch_to_block(entry);
        let x = b.emit(Opcode::Param, vec![]).unwrap().unwrap();
        let doubled = b.emit(Opcode::Add, vec![Operand::Var(x), Operand::Var(x)]).unwrap().unwrap();
        b.terminate_block(Opcode::Ret, vec![Operand::Var(doubled)]).unwrap();

        let cfg = ControlFlowGraph::compute(&func);
        let liveness = Liveness::compute(&func, &cfg);
        let layouts = compute_layouts(&func, &cfg, &liveness);
        let order = cfg.reverse_post_order();
        let asm = select_function(&func, &liveness, &layouts, &order);

        assert_eq!(
            asm,
            vec![
                AsmItem::Label(entry),
                AsmItem::Op(Opcode::Param),
                AsmItem::Dup(1),
                AsmItem::Op(Opcode::Add),
                AsmItem::Op(Opcode::Ret),
            ]
        );
    }
}
