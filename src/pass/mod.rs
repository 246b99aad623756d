//! The pass manager (spec §4.6) and every optimization pass (spec §4.7).
//!
//! Grounded on `cranelift-codegen`'s legalize-then-iterate pipeline shape
//! (`Context::compile` runs a fixed legalization pass then hands off to
//! per-ISA optimization) and spec §4.6's explicit `required_analyses` /
//! `preserved_analyses` / `scope` contract per pass.

pub mod algebraic;
pub mod branch_opt;
pub mod cse;
pub mod dce;
pub mod dse;
pub mod inline;
pub mod load_elim;
pub mod manager;
pub mod mem2var;
pub mod remove_unused;
pub mod sccp;
pub mod simplify_cfg;

pub use manager::{OptimizationLevel, PassManager, PassOptions, PassStats};

use crate::analysis::AnalysisCache;
use crate::error::CompilerError;
use crate::ir::function::Function;

/// A single-function optimization pass (spec §4.6: "scope: per-function").
/// Context-scope passes (inlining, unused-parameter removal across call
/// sites) are driven directly by [`PassManager`] instead of implementing
/// this trait, since they need the whole [`crate::ir::context::Context`]
/// rather than one function at a time.
pub trait FunctionPass {
    /// Stable name used in `InvariantViolation` diagnostics and logging.
    fn name(&self) -> &'static str;

    /// Analyses this pass reads, computed on demand if not already cached.
    fn required_analyses(&self) -> &'static [crate::analysis::AnalysisKind];

    /// Analyses this pass leaves valid; every other cached analysis is
    /// invalidated after `run` returns (spec §4.6).
    fn preserved_analyses(&self) -> &'static [crate::analysis::AnalysisKind];

    /// Apply the pass to `func`, returning whether it changed the IR.
    fn run(&mut self, func: &mut Function, cache: &mut AnalysisCache) -> Result<bool, CompilerError>;
}
