//! The SSA data model (spec §3): entities, literals, opcodes, instructions,
//! functions, and the top-level context, plus the builder that produces them
//! and the printer/parser pair used for debugging and round-trip testing.

pub mod builder;
pub mod context;
pub mod entities;
pub mod function;
pub mod instruction;
pub mod literal;
pub mod opcode;
pub mod parser;
pub mod printer;
pub mod verify;

pub use builder::{IrBuilder, SourceVar};
pub use context::Context;
pub use entities::{Block, DebugName, Inst, Variable};
pub use function::{BlockData, Function, SourceLoc};
pub use instruction::{InstructionData, Operand, PhiEdge};
pub use literal::Literal;
pub use opcode::{Arity, OpFlags, Opcode, Signature};
