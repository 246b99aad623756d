//! Unused-parameter removal (spec §4.7, spec §6
//! `disable_remove_unused_variables`): drop a function parameter nothing in
//! its body reads, and the matching argument at every `invoke` call site.
//!
//! Context-scope rather than [`crate::pass::FunctionPass`] (spec §4.6: a
//! pass that must see every caller to stay consistent with one callee's
//! signature cannot be a per-function pass) — driven directly by
//! [`crate::pass::manager::PassManager`].

use crate::analysis::dfg::DataFlowGraph;
use crate::error::CompilerError;
use crate::ir::context::Context;
use crate::ir::entities::Variable;
use crate::ir::function::Function;
use crate::ir::opcode::Opcode;

#[derive(Default)]
pub struct RemoveUnused;

impl RemoveUnused {
    pub fn run(&mut self, ctx: &mut Context) -> Result<bool, CompilerError> {
        let mut changed = false;
        let names: Vec<String> = ctx.functions().map(|f| f.name.clone()).collect();

        for name in names {
            let indices = {
                let func = ctx.function(&name).expect("name collected from this context");
                let dfg = DataFlowGraph::compute(func);
                unused_param_indices(func, &dfg)
            };
            if indices.is_empty() {
                continue;
            }
            remove_params(ctx.function_mut(&name).unwrap(), &indices);
            remove_call_site_args(ctx, &name, &indices);
            changed = true;
        }

        Ok(changed)
    }
}

fn unused_param_indices(func: &Function, dfg: &DataFlowGraph) -> Vec<usize> {
    func.params
        .iter()
        .enumerate()
        .filter(|&(_, &v)| dfg.is_unused(v))
        .map(|(i, _)| i)
        .collect()
}

fn remove_params(func: &mut Function, indices: &[usize]) {
    let removed_vars: Vec<Variable> = indices.iter().map(|&i| func.params[i]).collect();
    let mut kept = Vec::with_capacity(func.params.len() - indices.len());
    for (i, &v) in func.params.iter().enumerate() {
        if !indices.contains(&i) {
            kept.push(v);
        }
    }
    func.params = kept;
    for var in removed_vars {
        if let Some(inst) = func.def_of(var) {
            func.remove_inst(inst);
        }
    }
}

fn remove_call_site_args(ctx: &mut Context, callee_name: &str, indices: &[usize]) {
    for func in ctx.functions_mut() {
        for block in func.blocks_in_order().collect::<Vec<_>>() {
            for &inst in func.block_insts(block).to_vec().iter() {
                let data = func.inst_mut(inst);
                if data.opcode != Opcode::Invoke || data.callee.as_deref() != Some(callee_name) {
                    continue;
                }
                let kept: smallvec::SmallVec<[_; 4]> = data
                    .args
                    .iter()
                    .enumerate()
                    .filter(|&(i, _)| !indices.contains(&i))
                    .map(|(_, &arg)| arg)
                    .collect();
                data.args = kept;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::IrBuilder;
    use crate::ir::instruction::Operand;
    use crate::ir::literal::Literal;

    #[test]
    fn drops_unused_param_and_its_call_site_argument() {
        let mut callee = Function::new("callee");
        let mut cb = IrBuilder::new(&mut callee);
        let entry = cb.create_block();
        cb.switch_to_block(entry);
        let used = cb.emit(Opcode::Param, vec![]).unwrap().unwrap();
        let unused = cb.emit(Opcode::Param, vec![]).unwrap().unwrap();
        cb.terminate_block(Opcode::Ret, vec![Operand::Var(used)]).unwrap();
        callee.params = vec![used, unused];

        let mut caller = Function::new("caller");
        let mut b = IrBuilder::new(&mut caller);
        let caller_entry = b.create_block();
        b.switch_to_block(caller_entry);
        let result = b
            .emit_invoke("callee", vec![Operand::Imm(Literal::ONE), Operand::Imm(Literal::from_u64(2))])
            .unwrap()
            .unwrap();
        b.terminate_block(Opcode::Ret, vec![Operand::Var(result)]).unwrap();

        let mut ctx = Context::new();
        ctx.insert_function(callee);
        ctx.insert_function(caller);

        let changed = RemoveUnused.run(&mut ctx).unwrap();
        assert!(changed);

        let callee = ctx.function("callee").unwrap();
        assert_eq!(callee.params.len(), 1);

        let caller = ctx.function("caller").unwrap();
        let invoke = caller.block_insts(caller_entry)[0];
        assert_eq!(caller.inst(invoke).args.len(), 1);
        assert_eq!(caller.inst(invoke).args[0], Operand::Imm(Literal::ONE));
    }
}
