//! `venom`: an SSA intermediate representation, an optimizing pass pipeline,
//! and a stack-machine bytecode backend for a statically typed contract
//! language (spec §1).
//!
//! [`session::compile`] is the single entry point: it takes an [`ir::Context`]
//! built by an external HIR lowering (out of scope for this crate) and an
//! [`pass::PassOptions`] configuration, and returns assembled [`asm::Bytecode`]
//! or the first fatal [`error::CompilerError`].

pub mod analysis;
pub mod asm;
mod cursor;
pub mod error;
pub mod ir;
mod normalize;
pub mod pass;
pub mod schedule;
pub mod session;

pub use asm::Bytecode;
pub use cursor::{CursorPosition, FuncCursor};
pub use error::{AssemblerError, CompilerError, IrError, PassError};
pub use normalize::Normalizer;
pub use pass::{OptimizationLevel, PassManager, PassOptions, PassStats};
pub use session::{compile, CompileStats, CompilerSession};
