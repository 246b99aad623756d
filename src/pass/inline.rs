//! Function Inlining (spec §4.7, spec §6 `inline_threshold`): substitute a
//! callee's body at an `invoke` call site when the callee is small enough or
//! has only one caller.
//!
//! Context-scope rather than [`crate::pass::FunctionPass`] (spec §4.6: this
//! pass rewrites two functions — the callee's call-site count and the
//! caller's body — so it cannot see enough from inside one function). Runs
//! once between `mem2var` and the main fixed-point loop; the loop then runs
//! again to clean up the inlined code.
//!
//! Grounded on spec §4.7's inlining paragraph directly; the alpha-renaming
//! deep copy follows the same "fresh entity per copied definition" idea as
//! [`crate::ir::builder::IrBuilder`]'s own variable allocation.

use crate::error::CompilerError;
use crate::ir::context::Context;
use crate::ir::entities::{Block, Inst, Variable};
use crate::ir::function::Function;
use crate::ir::instruction::{InstructionData, Operand, PhiEdge};
use crate::ir::opcode::Opcode;
use rustc_hash::{FxHashMap, FxHashSet};

pub struct Inline {
    threshold: usize,
}

impl Inline {
    pub fn new(threshold: usize) -> Self {
        Inline { threshold }
    }

    pub fn run(&mut self, ctx: &mut Context) -> Result<bool, CompilerError> {
        let mut changed = false;
        let names: Vec<String> = ctx.functions().map(|f| f.name.clone()).collect();

        for name in names {
            loop {
                let Some((block, inst, callee_name)) = find_inlinable_call_site(ctx, &name, self.threshold) else {
                    break;
                };
                let callee = ctx
                    .function(&callee_name)
                    .expect("callee_name was just looked up in this context")
                    .clone();
                let caller = ctx.function_mut(&name).expect("name collected from this context");
                inline_call_site(caller, &callee, block, inst);
                changed = true;
            }
        }

        Ok(changed)
    }
}

fn find_inlinable_call_site(ctx: &Context, caller_name: &str, threshold: usize) -> Option<(Block, Inst, String)> {
    let caller = ctx.function(caller_name)?;
    for block in caller.blocks_in_order() {
        for &inst in caller.block_insts(block) {
            let data = caller.inst(inst);
            if data.opcode != Opcode::Invoke {
                continue;
            }
            let Some(callee_name) = data.callee.clone() else { continue };
            if callee_name == caller_name {
                continue; // direct self-recursion: never inlined (spec §4.7)
            }
            let Some(callee) = ctx.function(&callee_name) else { continue };
            if !has_any_ret(callee) {
                continue; // nothing sound to wire the call's result up to
            }
            if is_recursive(ctx, &callee_name) {
                continue;
            }
            let size = non_phi_non_terminator_count(callee);
            let call_sites = count_call_sites(ctx, &callee_name);
            if size < threshold || call_sites == 1 {
                return Some((block, inst, callee_name));
            }
        }
    }
    None
}

fn has_any_ret(func: &Function) -> bool {
    func.blocks_in_order()
        .any(|b| func.terminator(b).map(|t| func.inst(t).opcode == Opcode::Ret).unwrap_or(false))
}

/// `inline_threshold` counts the callee's non-phi, non-terminator
/// instructions (spec §6): the cost of the body actually substituted, not a
/// cost-weighted estimate.
fn non_phi_non_terminator_count(func: &Function) -> usize {
    func.blocks_in_order()
        .flat_map(|b| func.block_insts(b).iter())
        .filter(|&&inst| {
            let op = func.inst(inst).opcode;
            op != Opcode::Phi && !op.is_terminator()
        })
        .count()
}

fn count_call_sites(ctx: &Context, callee_name: &str) -> usize {
    ctx.functions()
        .flat_map(|f| f.blocks_in_order().collect::<Vec<_>>().into_iter().map(move |b| (f, b)))
        .flat_map(|(f, b)| f.block_insts(b).iter().map(move |&inst| f.inst(inst)))
        .filter(|data| data.opcode == Opcode::Invoke && data.callee.as_deref() == Some(callee_name))
        .count()
}

fn direct_callees(func: &Function) -> FxHashSet<String> {
    func.blocks_in_order()
        .flat_map(|b| func.block_insts(b).iter().map(|&inst| func.inst(inst)))
        .filter(|data| data.opcode == Opcode::Invoke)
        .filter_map(|data| data.callee.clone())
        .collect()
}

/// `true` if `name` can reach itself through the static call graph, directly
/// or through any cycle (spec §4.7: "a recursive callee is never inlined").
fn is_recursive(ctx: &Context, name: &str) -> bool {
    let Some(start) = ctx.function(name) else { return false };
    let mut stack: Vec<String> = direct_callees(start).into_iter().collect();
    let mut visited: FxHashSet<String> = FxHashSet::default();
    while let Some(callee) = stack.pop() {
        if callee == name {
            return true;
        }
        if !visited.insert(callee.clone()) {
            continue;
        }
        if let Some(f) = ctx.function(&callee) {
            stack.extend(direct_callees(f));
        }
    }
    false
}

fn remap_operand(
    op: Operand,
    param_subst: &FxHashMap<Variable, Operand>,
    var_map: &FxHashMap<Variable, Variable>,
    block_map: &FxHashMap<Block, Block>,
) -> Operand {
    match op {
        Operand::Var(v) => param_subst.get(&v).copied().unwrap_or_else(|| Operand::Var(var_map[&v])),
        Operand::Imm(lit) => Operand::Imm(lit),
        Operand::Label(b) => Operand::Label(block_map[&b]),
    }
}

/// Substitute `callee`'s body at `call_inst` inside `call_block` of `caller`.
/// Splits `call_block` at the call, deep-copies the callee with fresh blocks
/// and variables, threads the call's arguments in as the callee's parameter
/// values, and merges every `ret` into a phi at a new return block (spec
/// §4.7: "converting ret into jmp to a newly created return block with
/// phi-merged return values").
fn inline_call_site(caller: &mut Function, callee: &Function, call_block: Block, call_inst: Inst) {
    let call_data = caller.inst(call_inst).clone();

    let insts = caller.block_insts(call_block).to_vec();
    let split_at = insts.iter().position(|&i| i == call_inst).expect("call_inst is in call_block");
    let before = insts[..split_at].to_vec();
    let after = insts[split_at + 1..].to_vec();

    let cont_block = caller.make_block();
    for &inst in &after {
        caller.inst_mut(inst).parent = cont_block;
    }
    *caller.block_insts_mut(cont_block) = after;

    let mut block_map: FxHashMap<Block, Block> = FxHashMap::default();
    for block in callee.blocks_in_order() {
        block_map.insert(block, caller.make_block());
    }

    let mut param_subst: FxHashMap<Variable, Operand> = FxHashMap::default();
    for (&param_var, &arg) in callee.params.iter().zip(call_data.args.iter()) {
        param_subst.insert(param_var, arg);
    }

    let mut var_map: FxHashMap<Variable, Variable> = FxHashMap::default();
    for block in callee.blocks_in_order() {
        for &inst in callee.block_insts(block) {
            let data = callee.inst(inst);
            if data.opcode == Opcode::Param {
                continue;
            }
            if let Some(result) = data.result {
                var_map.insert(result, caller.make_variable(None));
            }
        }
    }

    let return_block = caller.make_block();
    let mut ret_edges: Vec<(Block, Operand)> = Vec::new();

    for block in callee.blocks_in_order() {
        let new_block = block_map[&block];
        for &inst in callee.block_insts(block) {
            let data = callee.inst(inst);
            if data.opcode == Opcode::Param {
                continue;
            }
            if data.opcode == Opcode::Ret {
                let value = remap_operand(data.args[0], &param_subst, &var_map, &block_map);
                ret_edges.push((new_block, value));
                continue;
            }
            let new_args: Vec<Operand> = data.args.iter().map(|&op| remap_operand(op, &param_subst, &var_map, &block_map)).collect();
            let new_phi_edges: Vec<PhiEdge> = data
                .phi_edges
                .iter()
                .map(|e| PhiEdge {
                    from: block_map[&e.from],
                    value: remap_operand(e.value, &param_subst, &var_map, &block_map),
                })
                .collect();
            let new_result = data.result.map(|v| var_map[&v]);
            let new_inst = caller.make_inst(InstructionData {
                opcode: data.opcode,
                args: new_args.into(),
                phi_edges: new_phi_edges.into(),
                result: new_result,
                parent: new_block,
                callee: data.callee.clone(),
            });
            caller.append_inst(new_block, new_inst);
        }
    }

    for &(blk, _) in &ret_edges {
        let jmp = caller.make_inst(InstructionData {
            opcode: Opcode::Jmp,
            args: vec![Operand::Label(return_block)].into(),
            phi_edges: Default::default(),
            result: None,
            parent: blk,
            callee: None,
        });
        caller.append_inst(blk, jmp);
    }

    let merged_return = call_data.result.map(|_| caller.make_variable(None));
    if let Some(merged) = merged_return {
        let edges: Vec<PhiEdge> = ret_edges.iter().map(|&(b, v)| PhiEdge { from: b, value: v }).collect();
        let phi_inst = caller.make_inst(InstructionData {
            opcode: Opcode::Phi,
            args: Default::default(),
            phi_edges: edges.into(),
            result: Some(merged),
            parent: return_block,
            callee: None,
        });
        caller.append_inst(return_block, phi_inst);
    }
    let jmp_cont = caller.make_inst(InstructionData {
        opcode: Opcode::Jmp,
        args: vec![Operand::Label(cont_block)].into(),
        phi_edges: Default::default(),
        result: None,
        parent: return_block,
        callee: None,
    });
    caller.append_inst(return_block, jmp_cont);

    *caller.block_insts_mut(call_block) = before;
    let callee_entry = block_map[&callee.entry.expect("a valid callee has an entry block")];
    let jmp_entry = caller.make_inst(InstructionData {
        opcode: Opcode::Jmp,
        args: vec![Operand::Label(callee_entry)].into(),
        phi_edges: Default::default(),
        result: None,
        parent: call_block,
        callee: None,
    });
    caller.append_inst(call_block, jmp_entry);

    if let (Some(old), Some(merged)) = (call_data.result, merged_return) {
        let mut dfg = crate::analysis::dfg::DataFlowGraph::compute(caller);
        dfg.replace_all_uses_with(caller, old, merged);
    }
}
