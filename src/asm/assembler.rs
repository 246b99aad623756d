//! The assembler (spec §4.10): lowers one function's symbolic
//! [`AsmItem`](crate::schedule::AsmItem) stream to concrete bytes.
//!
//! A label push's width depends on the byte offset of the label it names,
//! which depends on the width of every push between here and there (and
//! before it, if a backward jump). Grounded on
//! `cranelift-codegen/src/binemit/relaxation.rs`'s `relax_branches`: start
//! every label push at its minimum width, lay the stream out, then grow any
//! push that turns out too narrow for its target's resolved offset and lay
//! out again, repeating until nothing grows (a fixed point) or the iteration
//! bound is hit.

use crate::error::{AssemblerError, CompilerError};
use crate::ir::entities::Block;
use crate::ir::function::{Function, SourceLoc};
use crate::ir::literal::Literal;
use crate::ir::opcode::Opcode;
use crate::schedule::AsmItem;
use rustc_hash::FxHashMap;

use super::bytecode::Bytecode;

const JUMPDEST: u8 = 0x5B;
const PUSH0: u8 = 0x5F;
const POP: u8 = 0x50;
const JUMP: u8 = 0x56;
const JUMPI: u8 = 0x57;
const DUP1: u8 = 0x80;
const SWAP1: u8 = 0x90;

const MAX_ITERATIONS: usize = 64;

/// Assemble one function's selected instruction stream into bytes, appended
/// starting at `base_offset` (so a multi-function program can lay out its
/// functions back to back before resolving any cross-function label).
pub fn assemble_function(func: &Function, asm: &[AsmItem], base_offset: usize) -> Result<Bytecode, CompilerError> {
    let mut push_label_width: FxHashMap<usize, usize> = asm
        .iter()
        .enumerate()
        .filter(|(_, item)| matches!(item, AsmItem::PushLabel(_)))
        .map(|(i, _)| (i, 1))
        .collect();

    let mut converged = false;
    let mut offsets = Vec::new();
    for _ in 0..MAX_ITERATIONS {
        offsets = compute_offsets(asm, &push_label_width, base_offset);
        let label_offset = label_offsets(asm, &offsets);

        let mut grew = false;
        for (i, item) in asm.iter().enumerate() {
            let AsmItem::PushLabel(target) = item else { continue };
            let target_off = *label_offset
                .get(target)
                .ok_or_else(|| AssemblerError::UnresolvedSymbol(format!("{target}")))?;
            let needed = width_for_offset(target_off);
            let width = push_label_width.get_mut(&i).expect("recorded above for every PushLabel index");
            if needed > *width {
                *width = needed;
                grew = true;
            }
        }

        if !grew {
            converged = true;
            break;
        }
    }
    if !converged {
        return Err(AssemblerError::NonConvergent(MAX_ITERATIONS).into());
    }

    let label_offset = label_offsets(asm, &offsets);
    let mut bytes = Vec::new();
    let mut jumpdest_map = Vec::new();
    let mut source_map = Vec::new();

    for (i, item) in asm.iter().enumerate() {
        match item {
            AsmItem::Label(block) => {
                jumpdest_map.push(offsets[i]);
                bytes.push(JUMPDEST);
                if let Some(loc) = first_source_loc(func, *block) {
                    source_map.push((loc, offsets[i]));
                }
            }
            AsmItem::PushLiteral(lit) => push_literal(&mut bytes, *lit),
            AsmItem::PushLabel(target) => {
                let target_off = label_offset[target];
                let width = push_label_width[&i];
                push_bytes(&mut bytes, width, target_off as u128);
            }
            AsmItem::Dup(n) => bytes.push(DUP1 + (n - 1)),
            AsmItem::Swap(n) => bytes.push(SWAP1 + (n - 1)),
            AsmItem::Pop => bytes.push(POP),
            AsmItem::Jump => bytes.push(JUMP),
            AsmItem::JumpI => bytes.push(JUMPI),
            AsmItem::Op(op) => bytes.push(opcode_byte(*op)),
            // The calling convention below `invoke` (frame setup,
            // return-address handling) is out of scope; every surviving
            // invoke becomes this single placeholder byte (spec §4.9
            // Non-goals).
            AsmItem::Invoke(_) => bytes.push(opcode_byte(Opcode::Invalid)),
        }
    }

    for item in asm {
        if let AsmItem::PushLabel(target) = item {
            let off = label_offset[target];
            if jumpdest_map.binary_search(&off).is_err() {
                return Err(AssemblerError::UnresolvedJumpDest(off).into());
            }
        }
    }

    Ok(Bytecode { bytes, source_map, jumpdest_map })
}

fn first_source_loc(func: &Function, block: Block) -> Option<SourceLoc> {
    let inst = *func.block_insts(block).first()?;
    Some(func.source_locs[inst])
}

fn compute_offsets(asm: &[AsmItem], push_label_width: &FxHashMap<usize, usize>, base_offset: usize) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(asm.len());
    let mut pos = base_offset;
    for (i, item) in asm.iter().enumerate() {
        offsets.push(pos);
        pos += item_size(item, push_label_width.get(&i).copied().unwrap_or(0));
    }
    offsets
}

fn label_offsets(asm: &[AsmItem], offsets: &[usize]) -> FxHashMap<Block, usize> {
    asm.iter()
        .zip(offsets)
        .filter_map(|(item, &off)| match item {
            AsmItem::Label(b) => Some((*b, off)),
            _ => None,
        })
        .collect()
}

fn item_size(item: &AsmItem, push_label_width: usize) -> usize {
    match item {
        AsmItem::Label(_) => 1,
        AsmItem::Op(_) | AsmItem::Invoke(_) => 1,
        AsmItem::Dup(_) | AsmItem::Swap(_) | AsmItem::Pop | AsmItem::Jump | AsmItem::JumpI => 1,
        AsmItem::PushLiteral(lit) => 1 + literal_width(*lit),
        AsmItem::PushLabel(_) => 1 + push_label_width,
    }
}

/// Minimal big-endian byte width for `offset`; at least 1 (there is no
/// `PUSH0`-for-offset-zero case: offset 0 only ever names the very first
/// byte of the program, never a value worth special-casing here).
fn width_for_offset(offset: usize) -> usize {
    let bytes = offset.to_be_bytes();
    let first_nonzero = bytes.iter().position(|&b| b != 0);
    match first_nonzero {
        Some(i) => bytes.len() - i,
        None => 1,
    }
}

fn literal_width(lit: Literal) -> usize {
    if lit.is_zero() {
        return 0;
    }
    let bytes = lit.0.to_be_bytes();
    let first_nonzero = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len() - 1);
    bytes.len() - first_nonzero
}

fn push_literal(bytes: &mut Vec<u8>, lit: Literal) {
    if lit.is_zero() {
        bytes.push(PUSH0);
        return;
    }
    let width = literal_width(lit);
    let be = lit.0.to_be_bytes();
    bytes.push(0x60 + (width - 1) as u8);
    bytes.extend_from_slice(&be[be.len() - width..]);
}

fn push_bytes(bytes: &mut Vec<u8>, width: usize, value: u128) {
    bytes.push(0x60 + (width - 1) as u8);
    let be = value.to_be_bytes();
    bytes.extend_from_slice(&be[be.len() - width..]);
}

/// Concrete byte for every opcode with a direct EVM-style encoding. Pseudo-
/// and memory-model instructions that a complete typed-address lowering pass
/// would need (`alloca`/`iload`/`istore`/`offset`/`store`/`db*`) have no such
/// encoding here — that lowering is out of scope (spec §4.9 Non-goals, same
/// "interface only" treatment as the IR builder's call-argument marshalling)
/// and they fall back to `INVALID`, matching the real trap a stack machine
/// gives an opcode it doesn't recognize.
fn opcode_byte(op: Opcode) -> u8 {
    use Opcode::*;
    match op {
        Add => 0x01,
        Mul => 0x02,
        Sub => 0x03,
        Div => 0x04,
        SDiv => 0x05,
        Mod => 0x06,
        SMod => 0x07,
        AddMod => 0x08,
        MulMod => 0x09,
        Exp => 0x0A,
        SignExtend => 0x0B,
        Lt => 0x10,
        Gt => 0x11,
        Slt => 0x12,
        Sgt => 0x13,
        Eq => 0x14,
        IsZero => 0x15,
        And => 0x16,
        Or => 0x17,
        Xor => 0x18,
        Not => 0x19,
        Shl => 0x1B,
        Shr => 0x1C,
        Sar => 0x1D,
        Sha3 | Sha3_64 => 0x20,
        Address => 0x30,
        Balance => 0x31,
        Origin => 0x32,
        Caller => 0x33,
        CallValue => 0x34,
        CalldataLoad => 0x35,
        CalldataSize => 0x36,
        CalldataCopy => 0x37,
        CodeSize => 0x38,
        CodeCopy => 0x39,
        GasPrice => 0x3A,
        ExtCodeSize => 0x3B,
        ExtCodeCopy => 0x3C,
        ReturndataSize => 0x3D,
        ReturndataCopy => 0x3E,
        ExtCodeHash => 0x3F,
        BlockHash => 0x40,
        Coinbase => 0x41,
        Timestamp => 0x42,
        Number => 0x43,
        PrevRandao | Difficulty => 0x44,
        GasLimit => 0x45,
        ChainId => 0x46,
        SelfBalance => 0x47,
        BaseFee => 0x48,
        BlobHash => 0x49,
        BlobBaseFee => 0x4A,
        MLoad => 0x51,
        MStore => 0x52,
        SLoad => 0x54,
        SStore => 0x55,
        MSize => 0x59,
        Gas => 0x5A,
        TLoad => 0x5C,
        TStore => 0x5D,
        MCopy => 0x5E,
        Log0 => 0xA0,
        Log1 | LogN => 0xA1,
        Log2 => 0xA2,
        Log3 => 0xA3,
        Log4 => 0xA4,
        Create => 0xF0,
        Call => 0xF1,
        Return => 0xF3,
        DelegateCall => 0xF4,
        Create2 => 0xF5,
        StaticCall => 0xFA,
        Revert => 0xFD,
        SelfDestruct => 0xFF,
        Stop | Exit => 0x00,
        Invalid | Assert | AssertUnreachable | Ret | Invoke | Alloca | PAlloca | CAlloca | ILoad
        | IStore | Store | Offset | Param | Nop | DLoadBytes | DbName | Db | Phi | Jmp | Jnz
        | Djmp => 0xFE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::cfg::ControlFlowGraph;
    use crate::analysis::liveness::Liveness;
    use crate::ir::builder::IrBuilder;
    use crate::ir::instruction::Operand;
    use crate::schedule::{compute_layouts, select_function};

    #[test]
    fn straight_line_function_assembles_to_push_push_add_ret() {
        let mut func = Function::new("f");
        let mut b = IrBuilder::new(&mut func);
        let entry = b.create_block();
        b.switch_to_block(entry);
        let sum = b.emit(Opcode::Add, vec![Operand::Imm(Literal::ONE), Operand::Imm(Literal::from_u64(2))]).unwrap().unwrap();
        b.terminate_block(Opcode::Ret, vec![Operand::Var(sum)]).unwrap();

        let cfg = ControlFlowGraph::compute(&func);
        let liveness = Liveness::compute(&func, &cfg);
        let layouts = compute_layouts(&func, &cfg, &liveness);
        let order = cfg.reverse_post_order();
        let asm = select_function(&func, &liveness, &layouts, &order);

        let code = assemble_function(&func, &asm, 0).unwrap();
        assert_eq!(code.bytes, vec![JUMPDEST, 0x60, 0x01, 0x60, 0x02, 0x01, opcode_byte(Opcode::Ret)]);
        assert_eq!(code.jumpdest_map, vec![0]);
    }

    #[test]
    fn forward_jump_resolves_to_its_targets_jumpdest() {
        let mut func = Function::new("f");
        let mut b = IrBuilder::new(&mut func);
        let entry = b.create_block();
        let exit = b.create_block();
        b.switch_to_block(entry);
        b.terminate_block(Opcode::Jmp, vec![Operand::Label(exit)]).unwrap();
        b.switch_to_block(exit);
        b.terminate_block(Opcode::Stop, vec![]).unwrap();

        let cfg = ControlFlowGraph::compute(&func);
        let liveness = Liveness::compute(&func, &cfg);
        let layouts = compute_layouts(&func, &cfg, &liveness);
        let order = cfg.reverse_post_order();
        let asm = select_function(&func, &liveness, &layouts, &order);

        let code = assemble_function(&func, &asm, 0).unwrap();
        // JUMPDEST, PUSH1 <exit>, JUMP, JUMPDEST, STOP
        assert_eq!(code.bytes, vec![JUMPDEST, 0x60, 0x04, JUMP, JUMPDEST, 0x00]);
        assert!(code.is_jumpdest(4));
    }

    #[test]
    fn zero_literal_uses_push0_with_no_data_bytes() {
        let mut func = Function::new("f");
        let mut b = IrBuilder::new(&mut func);
        let entry = b.create_block();
        b.switch_to_block(entry);
        b.terminate_block(Opcode::Ret, vec![Operand::Imm(Literal::ZERO)]).unwrap();

        let cfg = ControlFlowGraph::compute(&func);
        let liveness = Liveness::compute(&func, &cfg);
        let layouts = compute_layouts(&func, &cfg, &liveness);
        let order = cfg.reverse_post_order();
        let asm = select_function(&func, &liveness, &layouts, &order);

        let code = assemble_function(&func, &asm, 0).unwrap();
        assert_eq!(code.bytes, vec![JUMPDEST, PUSH0, opcode_byte(Opcode::Ret)]);
    }
}
