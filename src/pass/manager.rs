//! The pass manager (spec §4.6): runs every pass in the declared order,
//! tracking the `required_analyses`/`preserved_analyses` cache contract and
//! verifying every universal invariant after each pass in debug builds.
//!
//! Grounded on `cranelift-codegen::Context::compile`'s "legalize once, then
//! iterate optimization to a fixed point" shape; `PassOptions` is this
//! crate's analog of `cranelift-codegen::settings::Flags`, and `PassStats` is
//! the `cranelift-codegen::timing` module's counters, narrowed to what this
//! crate's passes can cheaply report.

use crate::analysis::cache::{AnalysisCache, ALL_KINDS};
use crate::error::CompilerError;
use crate::ir::context::Context;
use crate::ir::function::Function;
use crate::ir::verify::verify_function;
use crate::pass::{algebraic, branch_opt, cse, dce, dse, inline, load_elim, mem2var, remove_unused, sccp, simplify_cfg};
use crate::pass::FunctionPass;
use rustc_hash::FxHashMap;

/// Selects the enabled pass set and the fixed-point iteration bound (spec
/// §6). `Gas` and `Codesize` run the same pipeline but tune `inline_threshold`
/// and `max_iterations` toward runtime cost or bytecode size respectively
/// (spec §9: no numeric cost model is specified, so this crate picks the one
/// knob that actually trades code growth for call overhead — inlining).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OptimizationLevel {
    /// No pass runs at all; the IR returned is exactly the IR given.
    None,
    /// Favor fewer dynamic instructions, more aggressive inlining.
    Gas,
    /// Favor smaller bytecode, conservative inlining.
    Codesize,
}

/// Pass-manager configuration (spec §6 table), constructed by the
/// out-of-scope driver and passed into `compile`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PassOptions {
    pub optimization_level: OptimizationLevel,
    pub disable_inlining: bool,
    pub disable_cse: bool,
    pub disable_sccp: bool,
    pub disable_load_elimination: bool,
    pub disable_dead_store_elimination: bool,
    pub disable_algebraic_optimization: bool,
    pub disable_branch_optimization: bool,
    pub disable_mem2var: bool,
    pub disable_simplify_cfg: bool,
    pub disable_remove_unused_variables: bool,
    /// Callee instruction-count ceiling for inlining (spec §6).
    pub inline_threshold: usize,
    /// Bound on the main optimization loop's fixed-point iteration count.
    pub max_iterations: usize,
}

impl PassOptions {
    pub fn for_level(level: OptimizationLevel) -> Self {
        let (inline_threshold, max_iterations) = match level {
            OptimizationLevel::None => (0, 0),
            OptimizationLevel::Gas => (50, 8),
            OptimizationLevel::Codesize => (8, 8),
        };
        PassOptions {
            optimization_level: level,
            disable_inlining: false,
            disable_cse: false,
            disable_sccp: false,
            disable_load_elimination: false,
            disable_dead_store_elimination: false,
            disable_algebraic_optimization: false,
            disable_branch_optimization: false,
            disable_mem2var: false,
            disable_simplify_cfg: false,
            disable_remove_unused_variables: false,
            inline_threshold,
            max_iterations,
        }
    }
}

impl Default for PassOptions {
    fn default() -> Self {
        Self::for_level(OptimizationLevel::Gas)
    }
}

/// Per-pass telemetry (spec §11 supplement "session::timing"): how many
/// instructions and blocks each run of the pipeline actually removed, plus
/// how many times each named pass reported a change.
#[derive(Clone, Debug, Default)]
pub struct PassStats {
    pub instructions_removed: u64,
    pub blocks_merged: u64,
    pub iterations_run: u64,
    pub changes_by_pass: FxHashMap<&'static str, u64>,
}

impl PassStats {
    fn record_change(&mut self, pass_name: &'static str) {
        *self.changes_by_pass.entry(pass_name).or_insert(0) += 1;
    }
}

pub struct PassManager {
    options: PassOptions,
}

impl PassManager {
    pub fn new(options: PassOptions) -> Self {
        PassManager { options }
    }

    /// Run the whole pipeline over every function in `ctx` (spec §12.1):
    /// mem2var once, then inlining once, then the per-function optimization
    /// set plus context-scope unused-variable removal to a fixed point.
    pub fn run(&mut self, ctx: &mut Context) -> Result<PassStats, CompilerError> {
        let mut stats = PassStats::default();
        if self.options.optimization_level == OptimizationLevel::None {
            return Ok(stats);
        }

        let names: Vec<String> = ctx.functions().map(|f| f.name.clone()).collect();

        if !self.options.disable_mem2var {
            for name in &names {
                let func = ctx.function_mut(name).expect("name collected from this context");
                let mut cache = AnalysisCache::new();
                self.run_one(func, &mut cache, &mut mem2var::Mem2Var, &mut stats)?;
            }
        }

        if !self.options.disable_inlining {
            let mut inliner = inline::Inline::new(self.options.inline_threshold);
            if inliner.run(ctx)? {
                stats.record_change("inline");
            }
        }

        for _ in 0..self.options.max_iterations {
            let mut changed = false;
            for name in &names {
                if let Some(func) = ctx.function_mut(name) {
                    changed |= self.run_loop_passes(func, &mut stats)?;
                }
            }
            if !self.options.disable_remove_unused_variables {
                let mut ru = remove_unused::RemoveUnused;
                if ru.run(ctx)? {
                    changed = true;
                    stats.record_change("remove_unused");
                }
            }
            stats.iterations_run += 1;
            if !changed {
                break;
            }
        }

        Ok(stats)
    }

    /// Run the declared in-loop pass order (spec §12.1) once for `func`,
    /// sharing one analysis cache across all eight passes.
    fn run_loop_passes(&mut self, func: &mut Function, stats: &mut PassStats) -> Result<bool, CompilerError> {
        let mut cache = AnalysisCache::new();
        let mut changed = false;

        if !self.options.disable_sccp {
            changed |= self.run_one(func, &mut cache, &mut sccp::Sccp::default(), stats)?;
        }
        if !self.options.disable_algebraic_optimization {
            changed |= self.run_one(func, &mut cache, &mut algebraic::Algebraic, stats)?;
        }
        if !self.options.disable_branch_optimization {
            changed |= self.run_one(func, &mut cache, &mut branch_opt::BranchOpt, stats)?;
        }
        if !self.options.disable_cse {
            changed |= self.run_one(func, &mut cache, &mut cse::Cse::default(), stats)?;
        }
        if !self.options.disable_load_elimination {
            changed |= self.run_one(func, &mut cache, &mut load_elim::LoadElim, stats)?;
        }
        if !self.options.disable_dead_store_elimination {
            changed |= self.run_one(func, &mut cache, &mut dse::Dse, stats)?;
        }
        changed |= self.run_one(func, &mut cache, &mut dce::Dce, stats)?;
        if !self.options.disable_simplify_cfg {
            changed |= self.run_one(func, &mut cache, &mut simplify_cfg::SimplifyCfg, stats)?;
        }

        Ok(changed)
    }

    fn run_one<P: FunctionPass>(
        &self,
        func: &mut Function,
        cache: &mut AnalysisCache,
        pass: &mut P,
        stats: &mut PassStats,
    ) -> Result<bool, CompilerError> {
        let insts_before = count_instructions(func);
        let blocks_before = func.blocks_in_order().count();

        log::trace!("running pass `{}` on function `{}`", pass.name(), func.name);
        let changed = pass.run(func, cache)?;

        if cfg!(debug_assertions) {
            verify_function(pass.name(), func, false)?;
        }

        if changed {
            let preserved = pass.preserved_analyses();
            let to_invalidate: Vec<_> = ALL_KINDS.iter().copied().filter(|k| !preserved.contains(k)).collect();
            cache.invalidate(&to_invalidate);

            let insts_after = count_instructions(func);
            let blocks_after = func.blocks_in_order().count();
            stats.instructions_removed += insts_before.saturating_sub(insts_after) as u64;
            stats.blocks_merged += blocks_before.saturating_sub(blocks_after) as u64;
            stats.record_change(pass.name());
            log::debug!("pass `{}` changed function `{}`", pass.name(), func.name);
        }

        Ok(changed)
    }
}

fn count_instructions(func: &Function) -> usize {
    func.blocks_in_order().map(|b| func.block_insts(b).len()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::IrBuilder;
    use crate::ir::instruction::Operand;
    use crate::ir::literal::Literal;
    use crate::ir::opcode::Opcode;

    #[test]
    fn none_level_leaves_the_ir_untouched() {
        let mut func = Function::new("f");
        let mut b = IrBuilder::new(&mut func);
        let entry = b.create_block();
        b.switch_to_block(entry);
        let sum = b.emit(Opcode::Add, vec![Operand::Imm(Literal::ONE), Operand::Imm(Literal::ZERO)]).unwrap().unwrap();
        b.terminate_block(Opcode::Ret, vec![Operand::Var(sum)]).unwrap();

        let mut ctx = Context::new();
        ctx.insert_function(func);

        let stats = PassManager::new(PassOptions::for_level(OptimizationLevel::None)).run(&mut ctx).unwrap();
        assert_eq!(stats.iterations_run, 0);
        let f = ctx.function("f").unwrap();
        assert_eq!(f.blocks_in_order().flat_map(|b| f.block_insts(b).iter().copied()).count(), 2);
    }

    #[test]
    fn gas_level_folds_and_then_removes_the_dead_add() {
        let mut func = Function::new("f");
        let mut b = IrBuilder::new(&mut func);
        let entry = b.create_block();
        b.switch_to_block(entry);
        let sum = b.emit(Opcode::Add, vec![Operand::Imm(Literal::ONE), Operand::Imm(Literal::ZERO)]).unwrap().unwrap();
        b.terminate_block(Opcode::Ret, vec![Operand::Imm(Literal::ONE)]).unwrap();
        let _ = sum; // its result becomes unused once the ret stops reading it

        let mut ctx = Context::new();
        ctx.insert_function(func);

        let stats = PassManager::new(PassOptions::default()).run(&mut ctx).unwrap();
        assert!(stats.instructions_removed >= 1);
        let f = ctx.function("f").unwrap();
        let has_add = f.blocks_in_order().flat_map(|b| f.block_insts(b).iter().map(|&i| f.inst(i))).any(|d| d.opcode == Opcode::Add);
        assert!(!has_add, "the now-dead add should have been swept by dce");
    }
}
