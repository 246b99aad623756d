//! Error kinds surfaced by the compiler core (spec §7).
//!
//! Every error is fatal to the current compilation; none are retried, and no
//! partial IR is ever handed back to a caller.

use thiserror::Error;

/// Errors raised by the IR builder while lowering HIR into SSA (spec §4.1).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IrError {
    /// An instruction was emitted into a block that already has a terminator.
    #[error("cannot emit into block {0}: already terminated")]
    BlockClosed(String),

    /// A variable was referenced from a function it does not belong to, or
    /// from a block unreachable from that variable's definition.
    #[error("variable {0} is out of scope here")]
    ScopeViolation(String),
}

/// Errors raised by the assembler during label resolution and bytecode
/// emission (spec §4.10).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssemblerError {
    /// A label was referenced but never defined.
    #[error("unresolved label `{0}`")]
    UnresolvedSymbol(String),

    /// The push-size / label-offset fixed point did not converge within the
    /// iteration bound.
    #[error("assembler encoding did not converge after {0} iterations")]
    NonConvergent(usize),

    /// A jump target offset has no `JUMPDEST` marker.
    #[error("jump target at offset {0} has no JUMPDEST")]
    UnresolvedJumpDest(usize),
}

/// Errors raised when the pass manager cannot satisfy a pass's declared
/// analysis requirements (spec §4.6, §7).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PassError {
    /// The named analysis could not be computed for the named pass.
    #[error("pass `{pass}` requires analysis `{analysis}`, which could not be produced")]
    MissingAnalysis { pass: String, analysis: String },
}

/// The top-level error type returned by [`crate::session::compile`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompilerError {
    /// An internal invariant (spec §3, §8) was violated after a pass ran.
    #[error("invariant violated in pass `{pass}`: {description}")]
    InvariantViolation {
        /// Name of the pass that left the IR inconsistent.
        pass: String,
        /// Human-readable description of the violated invariant.
        description: String,
    },

    /// An IR-builder-time error (spec §4.1).
    #[error(transparent)]
    Ir(#[from] IrError),

    /// An assembler-time error (spec §4.10).
    #[error(transparent)]
    Assembler(#[from] AssemblerError),

    /// A pass-manager error (spec §4.6).
    #[error(transparent)]
    Pass(#[from] PassError),
}

/// Convenience alias for fallible compiler-core operations.
pub type Result<T> = std::result::Result<T, CompilerError>;
