//! The compiler session (spec §5): the single entry point that drives a
//! [`Context`] through every stage — optimization, normalization, scheduling,
//! assembly — and returns either a finished [`Bytecode`] or the first fatal
//! error.
//!
//! Grounded on `cranelift-codegen::Context::compile`'s role as the one
//! function a caller needs: it owns per-function analysis caches the same way
//! the teacher's `Context` owns a `ControlFlowGraph`/`DominatorTree` pair, and
//! drives the same "optimize, then lower, then emit" sequence, just with this
//! crate's own pass manager, normalizer, and stack-based lowering in place of
//! Cranelift's register allocator and MachInst emission.

use crate::analysis::cfg::ControlFlowGraph;
use crate::analysis::liveness::Liveness;
use crate::asm::{assemble_function, Bytecode};
use crate::error::CompilerError;
use crate::ir::context::Context;
use crate::normalize::Normalizer;
use crate::pass::manager::{PassManager, PassOptions, PassStats};
use crate::schedule::{compute_layouts, select_function};

/// Per-compilation telemetry (spec §11 supplement): pass-manager stats plus
/// how many functions needed at least one critical edge split before
/// scheduling.
#[derive(Clone, Debug, Default)]
pub struct CompileStats {
    pub pass_stats: PassStats,
    pub functions_normalized: u64,
}

/// Owns the single [`Context`] a compilation mutates in place (spec §5: "all
/// state is owned by a single `CompilerSession`... passes mutate the context
/// in place"). The per-function analysis cache itself lives inside
/// [`PassManager::run`] rather than on this struct, since nothing outside a
/// single pipeline run needs it to survive past the [`compile`] call that
/// produced it.
pub struct CompilerSession {
    ctx: Context,
}

impl CompilerSession {
    pub fn new(ctx: Context) -> Self {
        CompilerSession { ctx }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }

    /// Run the full pipeline over this session's context (spec §5: "a
    /// compilation is either completed or discarded; partial results are
    /// never surfaced").
    pub fn compile(&mut self, options: PassOptions) -> Result<(Bytecode, CompileStats), CompilerError> {
        compile(&mut self.ctx, options)
    }
}

/// Compile every function in `ctx` to one linear [`Bytecode`] image, laid out
/// in `ctx`'s declaration order (spec §5: "deterministic, given the same
/// input and the same `PassOptions`").
pub fn compile(ctx: &mut Context, options: PassOptions) -> Result<(Bytecode, CompileStats), CompilerError> {
    let mut stats = CompileStats::default();
    stats.pass_stats = PassManager::new(options).run(ctx)?;

    let names: Vec<String> = ctx.functions().map(|f| f.name.clone()).collect();

    let mut bytes = Vec::new();
    let mut source_map = Vec::new();
    let mut jumpdest_map = Vec::new();

    for name in &names {
        let func = ctx.function_mut(name).expect("name collected from this context");
        if Normalizer.run(func)? {
            stats.functions_normalized += 1;
        }

        let cfg = ControlFlowGraph::compute(func);
        let liveness = Liveness::compute(func, &cfg);
        let layouts = compute_layouts(func, &cfg, &liveness);
        let order = cfg.reverse_post_order();
        let asm = select_function(func, &liveness, &layouts, &order);

        let func = ctx.function(name).expect("name collected from this context");
        let code = assemble_function(func, &asm, bytes.len())?;

        bytes.extend(code.bytes);
        source_map.extend(code.source_map);
        jumpdest_map.extend(code.jumpdest_map);
    }

    Ok((Bytecode { bytes, source_map, jumpdest_map }, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::IrBuilder;
    use crate::ir::function::Function;
    use crate::ir::instruction::Operand;
    use crate::ir::literal::Literal;
    use crate::ir::opcode::Opcode;
    use crate::pass::manager::OptimizationLevel;

    #[test]
    fn compiles_a_constant_fold_to_a_single_push_ret() {
        let mut func = Function::new("f");
        let mut b = IrBuilder::new(&mut func);
        let entry = b.create_block();
        b.switch_to_block(entry);
        let sum = b.emit(Opcode::Add, vec![Operand::Imm(Literal::ONE), Operand::Imm(Literal::from_u64(2))]).unwrap().unwrap();
        b.terminate_block(Opcode::Ret, vec![Operand::Var(sum)]).unwrap();

        let mut ctx = Context::new();
        ctx.insert_function(func);

        let (code, stats) = compile(&mut ctx, PassOptions::for_level(OptimizationLevel::Gas)).unwrap();
        assert!(!code.bytes.is_empty());
        assert_eq!(stats.functions_normalized, 0);
    }

    #[test]
    fn session_wraps_its_context_and_compiles_through_it() {
        let mut func = Function::new("f");
        let mut b = IrBuilder::new(&mut func);
        let entry = b.create_block();
        b.switch_to_block(entry);
        b.terminate_block(Opcode::Stop, vec![]).unwrap();

        let mut ctx = Context::new();
        ctx.insert_function(func);

        let mut session = CompilerSession::new(ctx);
        let (code, _stats) = session.compile(PassOptions::for_level(OptimizationLevel::None)).unwrap();
        assert_eq!(code.bytes, vec![0x5B, 0x00]);
        assert_eq!(session.context().len(), 1);
    }

    #[test]
    fn optimization_level_none_still_produces_runnable_bytecode() {
        let mut func = Function::new("f");
        let mut b = IrBuilder::new(&mut func);
        let entry = b.create_block();
        b.switch_to_block(entry);
        b.terminate_block(Opcode::Stop, vec![]).unwrap();

        let mut ctx = Context::new();
        ctx.insert_function(func);

        let (code, _stats) = compile(&mut ctx, PassOptions::for_level(OptimizationLevel::None)).unwrap();
        assert_eq!(code.bytes, vec![0x5B, 0x00]);
    }
}
