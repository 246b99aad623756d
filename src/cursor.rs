//! Cursor for inserting/removing instructions after IR construction (used by
//! every optimization pass and by the normalizer).
//!
//! Grounded on `cranelift-codegen/src/cursor.rs`'s `Cursor`/`FuncCursor`:
//! same position states and navigation vocabulary (`goto_top`/`next_inst`/
//! `insert_inst`/`remove_inst`), adapted to this crate's `Function`, which
//! stores each block's instructions as a plain `Vec<Inst>` rather than
//! Cranelift's intrusive linked-list `Layout` (see `ir::function` module
//! doc), so navigation is index arithmetic instead of pointer-chasing.

use crate::ir::entities::{Block, Inst};
use crate::ir::function::Function;
use crate::ir::instruction::InstructionData;

/// The cursor's current position within a function.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CursorPosition {
    /// Not pointing anywhere; no instructions can be inserted.
    Nowhere,
    /// Pointing at an existing instruction. New instructions are inserted
    /// *before* it.
    At(Block, usize),
    /// Before the first instruction of a block (no instructions inserted
    /// yet). `next_inst` moves to the first instruction.
    Before(Block),
    /// After the last instruction of a block. New instructions are appended.
    After(Block),
}

/// A cursor over one function's instructions, used by passes to insert,
/// remove, or replace instructions in place without hand-managing `Vec`
/// indices at every call site.
pub struct FuncCursor<'f> {
    pos: CursorPosition,
    pub func: &'f mut Function,
}

impl<'f> FuncCursor<'f> {
    /// A cursor pointing nowhere.
    pub fn new(func: &'f mut Function) -> Self {
        FuncCursor { pos: CursorPosition::Nowhere, func }
    }

    pub fn position(&self) -> CursorPosition {
        self.pos
    }

    pub fn set_position(&mut self, pos: CursorPosition) {
        self.pos = pos;
    }

    /// Move to the top of `block` (builder-style).
    pub fn at_top(mut self, block: Block) -> Self {
        self.goto_top(block);
        self
    }

    /// Move to the bottom of `block`, where instructions are appended
    /// (builder-style).
    pub fn at_bottom(mut self, block: Block) -> Self {
        self.goto_bottom(block);
        self
    }

    /// Move to point at `inst` directly (builder-style).
    pub fn at_inst(mut self, inst: Inst) -> Self {
        self.goto_inst(inst);
        self
    }

    pub fn goto_top(&mut self, block: Block) {
        self.pos = CursorPosition::Before(block);
    }

    pub fn goto_bottom(&mut self, block: Block) {
        self.pos = CursorPosition::After(block);
    }

    pub fn goto_inst(&mut self, inst: Inst) {
        let block = self.func.inst(inst).parent;
        let idx = self.index_of(block, inst);
        self.pos = CursorPosition::At(block, idx);
    }

    fn index_of(&self, block: Block, inst: Inst) -> usize {
        self.func
            .block_insts(block)
            .iter()
            .position(|&i| i == inst)
            .expect("instruction must belong to its recorded parent block")
    }

    /// The block the cursor is currently positioned within, if any.
    pub fn current_block(&self) -> Option<Block> {
        match self.pos {
            CursorPosition::Nowhere => None,
            CursorPosition::At(block, _) => Some(block),
            CursorPosition::Before(block) | CursorPosition::After(block) => Some(block),
        }
    }

    /// The instruction the cursor currently points at, if any.
    pub fn current_inst(&self) -> Option<Inst> {
        match self.pos {
            CursorPosition::At(block, idx) => self.func.block_insts(block).get(idx).copied(),
            _ => None,
        }
    }

    /// Move to the next instruction in the same block, returning it.
    pub fn next_inst(&mut self) -> Option<Inst> {
        match self.pos {
            CursorPosition::Nowhere | CursorPosition::After(_) => None,
            CursorPosition::At(block, idx) => {
                let next_idx = idx + 1;
                let insts = self.func.block_insts(block);
                if next_idx < insts.len() {
                    let inst = insts[next_idx];
                    self.pos = CursorPosition::At(block, next_idx);
                    Some(inst)
                } else {
                    self.pos = CursorPosition::After(block);
                    None
                }
            }
            CursorPosition::Before(block) => {
                let insts = self.func.block_insts(block);
                if insts.is_empty() {
                    self.pos = CursorPosition::After(block);
                    None
                } else {
                    self.pos = CursorPosition::At(block, 0);
                    Some(insts[0])
                }
            }
        }
    }

    /// Insert `data` at the current position, returning the new
    /// instruction's handle. The cursor does not move, so repeated calls
    /// insert in program order (matches `cranelift-codegen`'s contract).
    pub fn insert_inst(&mut self, data: InstructionData) -> Inst {
        let inst = self.func.make_inst(data);
        match self.pos {
            CursorPosition::Nowhere | CursorPosition::Before(_) => {
                panic!("cannot insert at a position with no insertion point")
            }
            CursorPosition::At(block, idx) => {
                self.func.block_insts_mut(block).insert(idx, inst);
                self.pos = CursorPosition::At(block, idx + 1);
            }
            CursorPosition::After(block) => {
                self.func.append_inst(block, inst);
            }
        }
        inst
    }

    /// Remove the instruction under the cursor, leaving it positioned at the
    /// instruction that followed it.
    pub fn remove_inst(&mut self) -> Inst {
        let inst = self.current_inst().expect("no instruction to remove");
        let block = self.func.inst(inst).parent;
        let idx = self.index_of(block, inst);
        self.func.block_insts_mut(block).remove(idx);
        self.pos = if idx < self.func.block_insts(block).len() {
            CursorPosition::At(block, idx)
        } else {
            CursorPosition::After(block)
        };
        inst
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::IrBuilder;
    use crate::ir::instruction::Operand;
    use crate::ir::literal::Literal;
    use crate::ir::opcode::Opcode;

    #[test]
    fn insert_at_top_prepends() {
        let mut func = Function::new("f");
        let mut b = IrBuilder::new(&mut func);
        let entry = b.create_block();
        b.switch_to_block(entry);
        b.terminate_block(Opcode::Stop, vec![]).unwrap();

        let mut cursor = FuncCursor::new(&mut func).at_top(entry);
        cursor.insert_inst(InstructionData {
            opcode: Opcode::Nop,
            args: Default::default(),
            phi_edges: Default::default(),
            result: None,
            parent: entry,
            callee: None,
        });
        assert_eq!(func.inst(func.block_insts(entry)[0]).opcode, Opcode::Nop);
        assert_eq!(func.block_insts(entry).len(), 2);
    }

    #[test]
    fn remove_inst_advances_cursor() {
        let mut func = Function::new("f");
        let mut b = IrBuilder::new(&mut func);
        let entry = b.create_block();
        b.switch_to_block(entry);
        let a = b
            .emit(Opcode::Add, vec![Operand::Imm(Literal::ONE), Operand::Imm(Literal::ONE)])
            .unwrap()
            .unwrap();
        b.terminate_block(Opcode::Ret, vec![Operand::Var(a)]).unwrap();

        let def = func.def_of(a).unwrap();
        let mut cursor = FuncCursor::new(&mut func).at_inst(def);
        let removed = cursor.remove_inst();
        assert_eq!(removed, def);
        assert_eq!(func.block_insts(entry).len(), 1);
    }
}
