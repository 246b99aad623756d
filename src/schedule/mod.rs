//! The stack scheduler and instruction selector (spec §4.9): turns a
//! normalized SSA function into a linear stream of symbolic stack-machine
//! operations, ready for the assembler.

pub mod select;
pub mod stack;

pub use select::{select_function, AsmItem};
pub use stack::{compute_layouts, BlockLayouts};
