//! Instructions: an opcode, an ordered operand list, and an optional output
//! variable (spec §3).

use crate::ir::entities::{Block, Variable};
use crate::ir::literal::Literal;
use crate::ir::opcode::Opcode;
use smallvec::SmallVec;
use std::fmt;

/// A tagged-union operand: an SSA value, an immediate constant, or a block
/// label (spec §3).
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Operand {
    /// A use of another instruction's result.
    Var(Variable),
    /// A constant value.
    Imm(Literal),
    /// A reference to a basic block (branch target or phi predecessor tag).
    Label(Block),
}

impl Operand {
    /// The variable this operand reads, if it is a [`Operand::Var`].
    pub fn as_var(self) -> Option<Variable> {
        match self {
            Operand::Var(v) => Some(v),
            _ => None,
        }
    }

    /// The block this operand names, if it is a [`Operand::Label`].
    pub fn as_label(self) -> Option<Block> {
        match self {
            Operand::Label(b) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Var(v) => write!(f, "%{v}"),
            Operand::Imm(l) => write!(f, "{l}"),
            Operand::Label(b) => write!(f, "@{b}"),
        }
    }
}

/// For a `phi`, each incoming value is paired with the predecessor block it
/// arrives from (spec §3: "each predecessor block appears exactly once").
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PhiEdge {
    /// The CFG predecessor this value flows from.
    pub from: Block,
    /// The incoming value.
    pub value: Operand,
}

/// An instruction: opcode, operand list, and optional output (spec §3).
///
/// Source-location annotations are intentionally omitted from the core data
/// model — they are carried out-of-band in
/// [`crate::ir::function::Function::source_locs`] so that instruction
/// equality (used by CSE's value numbering) never accidentally depends on
/// where a contract author wrote the code.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct InstructionData {
    /// The opcode.
    pub opcode: Opcode,
    /// Ordered non-label operands.
    pub args: SmallVec<[Operand; 4]>,
    /// `phi` incoming edges; empty for every other opcode.
    pub phi_edges: SmallVec<[PhiEdge; 4]>,
    /// The variable this instruction defines, if any.
    pub result: Option<Variable>,
    /// The block that owns this instruction. Maintained as an invariant by
    /// every mutation (spec §3: "weak; maintained as an invariant").
    pub parent: Block,
    /// The callee function name, set only on `invoke` (an internal call to
    /// another function in the same [`crate::ir::context::Context`] — the
    /// inliner's substitution target; distinct from the EVM `call` family,
    /// which targets external contracts and never names a local function).
    pub callee: Option<String>,
}

impl InstructionData {
    /// All operand variables this instruction uses — value-operand uses plus
    /// phi incoming values, but never label operands (spec §4.4 `use(I)`).
    pub fn used_vars(&self) -> impl Iterator<Item = Variable> + '_ {
        self.args
            .iter()
            .filter_map(|op| op.as_var())
            .chain(self.phi_edges.iter().filter_map(|e| e.value.as_var()))
    }

    /// Label operands this instruction branches to (terminators) or, for
    /// `phi`, the predecessor tags.
    pub fn label_operands(&self) -> impl Iterator<Item = Block> + '_ {
        self.args
            .iter()
            .filter_map(|op| op.as_label())
            .chain(self.phi_edges.iter().map(|e| e.from))
    }
}
