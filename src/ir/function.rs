//! `Function`: a named collection of basic blocks with a designated entry
//! (spec §3). Owns every instruction and variable transitively; blocks never
//! appear in two functions.
//!
//! This merges what Cranelift splits into `DataFlowGraph` + `Layout`
//! (`cranelift-codegen/src/ir/function.rs`) into one structure, since this
//! IR uses classic phi nodes rather than Cranelift's EBB-argument SSA form
//! and has no need for the incremental `Layout` edit-list machinery a
//! register-allocating backend wants.

use crate::ir::entities::{Block, DebugName, Inst, Variable};
use crate::ir::instruction::InstructionData;
use cranelift_entity::{PrimaryMap, SecondaryMap};
use std::fmt;

/// A source location, carried purely for diagnostics (spec §3: "never
/// load-bearing").
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct SourceLoc {
    /// Byte offset into the originating source file, if known.
    pub offset: Option<u32>,
}

/// A basic block: a label plus an ordered instruction list (spec §3).
#[derive(Clone, Debug, Default)]
pub struct BlockData {
    /// Instructions in program order. Invariant: at most the last element is
    /// a terminator, and if the block is well-formed, exactly the last
    /// element is.
    pub insts: Vec<Inst>,
}

#[derive(Clone, Debug, Default)]
struct VariableData {
    def: Option<Inst>,
    name: DebugName,
}

/// A function: name, entry block, and every block/instruction/variable it
/// owns (spec §3).
#[derive(Clone, Debug)]
pub struct Function {
    /// The function's name, unique within its [`crate::ir::context::Context`].
    pub name: String,
    /// The entry block. `None` only for a function under construction that
    /// has not yet created its first block.
    pub entry: Option<Block>,
    /// Parameters, in declaration order (spec §6 "Interface consumed from
    /// HIR": "parameter list with passing convention").
    pub params: Vec<Variable>,
    blocks: PrimaryMap<Block, BlockData>,
    /// Layout order of blocks (insertion order by default; the normalizer and
    /// CFG-simplification passes may reorder or remove entries).
    pub block_order: Vec<Block>,
    insts: PrimaryMap<Inst, InstructionData>,
    variables: PrimaryMap<Variable, VariableData>,
    /// Optional per-instruction diagnostics, never load-bearing.
    pub source_locs: SecondaryMap<Inst, SourceLoc>,
}

impl Function {
    /// An empty function under construction.
    pub fn new(name: impl Into<String>) -> Self {
        Function {
            name: name.into(),
            entry: None,
            params: Vec::new(),
            blocks: PrimaryMap::new(),
            block_order: Vec::new(),
            insts: PrimaryMap::new(),
            variables: PrimaryMap::new(),
            source_locs: SecondaryMap::new(),
        }
    }

    /// Create a new, empty block and append it to the layout order. Does not
    /// change `entry`; the builder sets that explicitly for the first block.
    pub fn make_block(&mut self) -> Block {
        let block = self.blocks.push(BlockData::default());
        self.block_order.push(block);
        block
    }

    /// Allocate a fresh variable with no defining instruction yet (the
    /// builder fills `result` in on the instruction once it is built).
    pub fn make_variable(&mut self, name: Option<String>) -> Variable {
        self.variables.push(VariableData {
            def: None,
            name: DebugName(name),
        })
    }

    /// Record `inst` as the defining instruction of `var`. Called once per
    /// variable by the builder/normalizer; panics (invariant violation) if
    /// called twice with different instructions (spec §3: "exactly one
    /// defining instruction").
    pub fn set_def(&mut self, var: Variable, inst: Inst) {
        let data = &mut self.variables[var];
        assert!(
            data.def.is_none() || data.def == Some(inst),
            "variable {var} redefined: had {:?}, got {inst}",
            data.def
        );
        data.def = Some(inst);
    }

    /// The defining instruction of `var`, if it has been built yet.
    pub fn def_of(&self, var: Variable) -> Option<Inst> {
        self.variables[var].def
    }

    /// The debug name attached to `var`, if any.
    pub fn debug_name(&self, var: Variable) -> &DebugName {
        &self.variables[var].name
    }

    /// Append `inst` to `block`'s instruction list.
    pub fn append_inst(&mut self, block: Block, inst: Inst) {
        self.blocks[block].insts.push(inst);
    }

    /// Insert an already-allocated [`InstructionData`], returning its handle.
    pub fn make_inst(&mut self, data: InstructionData) -> Inst {
        let result = data.result;
        let inst = self.insts.push(data);
        if let Some(var) = result {
            self.set_def(var, inst);
        }
        inst
    }

    /// Borrow an instruction's data.
    pub fn inst(&self, inst: Inst) -> &InstructionData {
        &self.insts[inst]
    }

    /// Mutably borrow an instruction's data.
    pub fn inst_mut(&mut self, inst: Inst) -> &mut InstructionData {
        &mut self.insts[inst]
    }

    /// Replace an instruction's data wholesale (used by algebraic
    /// simplification and SCCP to fold an instruction into a simpler one in
    /// place, preserving its handle so existing uses keep resolving).
    pub fn replace_inst(&mut self, inst: Inst, data: InstructionData) {
        self.insts[inst] = data;
    }

    /// All instructions currently in `block`, in program order.
    pub fn block_insts(&self, block: Block) -> &[Inst] {
        &self.blocks[block].insts
    }

    /// Mutable access to the instruction list of `block`, for passes that
    /// reorder, insert, or remove instructions directly.
    pub fn block_insts_mut(&mut self, block: Block) -> &mut Vec<Inst> {
        &mut self.blocks[block].insts
    }

    /// The block's terminator, if the block is non-empty.
    pub fn terminator(&self, block: Block) -> Option<Inst> {
        self.blocks[block].insts.last().copied()
    }

    /// Remove `block` entirely (its instructions become unreachable garbage;
    /// callers must have already ensured nothing still references it).
    pub fn remove_block(&mut self, block: Block) {
        self.block_order.retain(|&b| b != block);
        self.blocks[block].insts.clear();
    }

    /// Remove a single instruction from its parent block's instruction list.
    /// Does not touch the variable table; DCE is responsible for knowing the
    /// output is dead before calling this.
    pub fn remove_inst(&mut self, inst: Inst) {
        let block = self.insts[inst].parent;
        self.blocks[block].insts.retain(|&i| i != inst);
    }

    /// Iterate blocks in layout order.
    pub fn blocks_in_order(&self) -> impl Iterator<Item = Block> + '_ {
        self.block_order.iter().copied()
    }

    /// Total number of blocks ever allocated (including any later removed;
    /// used to size [`SecondaryMap`]s for analyses).
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Total number of variables ever allocated.
    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    /// `true` iff `block` currently ends in a terminator instruction, i.e. is
    /// well-formed per spec §3.
    pub fn is_terminated(&self, block: Block) -> bool {
        self.terminator(block)
            .map(|i| self.insts[i].opcode.is_terminator())
            .unwrap_or(false)
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::ir::printer::write_function(f, self)
    }
}
