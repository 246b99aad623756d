//! Opaque entity references used throughout the IR.
//!
//! Instructions, blocks and variables never reference each other through Rust
//! references or raw pointers. Each is a 32-bit index into a table owned by
//! [`crate::ir::Function`], wrapped in its own zero-cost newtype so the
//! borrow checker and the type checker both stay out of the way. This mirrors
//! how Cranelift represents `Ebb`/`Value`/`Inst` (see
//! `cranelift-codegen/src/ir/entities.rs`).

use cranelift_entity::entity_impl;
use std::fmt;

/// A basic block handle.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block(u32);
entity_impl!(Block, "block");

/// An SSA variable handle. Identity only; the defining instruction and all
/// uses are looked up through [`crate::analysis::dfg::DataFlowGraph`], never
/// stored on the handle itself (spec §3, §9).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variable(u32);
entity_impl!(Variable, "v");

/// An instruction handle.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Inst(u32);
entity_impl!(Inst, "inst");

/// A debug name attached to a variable or block for IR printing. Never
/// load-bearing: two variables that differ only in debug name are the same
/// variable, and printing/parsing discards or reinvents it as needed (spec §8
/// "variable identities may be renumbered").
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct DebugName(pub Option<String>);

impl fmt::Display for DebugName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(name) => write!(f, "{name}"),
            None => Ok(()),
        }
    }
}
