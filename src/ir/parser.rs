//! Textual IR parser: the inverse of [`crate::ir::printer`]. Two passes over
//! the source text: the first allocates every block and every output
//! variable (so forward references — a loop header's phi reading a value
//! defined in the not-yet-parsed latch block — resolve correctly), and the
//! second fills in operand lists once every name is known.

use crate::ir::entities::{Block, Variable};
use crate::ir::function::Function;
use crate::ir::instruction::{InstructionData, Operand, PhiEdge};
use crate::ir::literal::Literal;
use crate::ir::opcode::Opcode;
use rustc_hash::FxHashMap;
use std::fmt;

/// A parse failure, with a one-line description (spec §6 is a debug format,
/// not a user-facing surface, so diagnostics stay simple).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(pub String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IR parse error: {}", self.0)
    }
}
impl std::error::Error for ParseError {}

fn err(msg: impl Into<String>) -> ParseError {
    ParseError(msg.into())
}

fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(i) => &line[..i],
        None => line,
    }
}

fn opcode_from_mnemonic(s: &str) -> Option<Opcode> {
    use Opcode::*;
    // Exhaustive match against `Opcode::mnemonic`, kept in lock-step with it.
    const ALL: &[Opcode] = &[
        Add, Sub, Mul, Div, SDiv, Mod, SMod, Exp, AddMod, MulMod, SignExtend, Shl, Shr, Sar, And,
        Or, Xor, Not, IsZero, Eq, Lt, Gt, Slt, Sgt, MLoad, MStore, MCopy, SLoad, SStore, TLoad,
        TStore, CalldataCopy, CodeCopy, ReturndataCopy, Sha3, Log0, Log1, Log2, Log3, Log4, Call,
        StaticCall, DelegateCall, Create, Create2, SelfDestruct, Return, Revert, Stop, Invalid,
        Address, Caller, CallValue, CalldataSize, CalldataLoad, Gas, GasPrice, Origin, Coinbase,
        Number, Timestamp, ChainId, Balance, SelfBalance, BlockHash, BaseFee, BlobBaseFee,
        BlobHash, PrevRandao, Difficulty, GasLimit, ExtCodeSize, ExtCodeHash, ExtCodeCopy,
        ReturndataSize, CodeSize, MSize, Jmp, Jnz, Djmp, Ret, Exit, Phi, Invoke, Assert,
        AssertUnreachable, Alloca, PAlloca, CAlloca, ILoad, IStore, Store, Offset, Param, Nop,
        Sha3_64, LogN, DLoadBytes, DbName, Db,
    ];
    ALL.iter().copied().find(|op| op.mnemonic() == s)
}

struct RawInst {
    block: Block,
    out_name: Option<String>,
    opcode: Opcode,
    is_phi: bool,
    callee: Option<String>,
    raw_args: Vec<String>,
}

fn parse_operand(
    token: &str,
    vars: &FxHashMap<String, Variable>,
    blocks: &FxHashMap<String, Block>,
) -> Result<Operand, ParseError> {
    let token = token.trim();
    if let Some(name) = token.strip_prefix('%') {
        vars.get(name)
            .copied()
            .map(Operand::Var)
            .ok_or_else(|| err(format!("undefined variable %{name}")))
    } else if let Some(name) = token.strip_prefix('@') {
        blocks
            .get(name)
            .copied()
            .map(Operand::Label)
            .ok_or_else(|| err(format!("undefined label @{name}")))
    } else {
        let value: ethnum::U256 = token
            .parse()
            .map_err(|_| err(format!("invalid literal `{token}`")))?;
        Ok(Operand::Imm(Literal(value)))
    }
}

/// Parse a single function in the spec §6 textual format.
pub fn parse_function(text: &str) -> Result<Function, ParseError> {
    let mut lines = text.lines().map(strip_comment);

    let header = lines
        .next()
        .ok_or_else(|| err("empty input"))?
        .trim();
    let name = header
        .strip_prefix("function ")
        .and_then(|rest| rest.trim_end().strip_suffix('{'))
        .map(str::trim)
        .ok_or_else(|| err(format!("expected `function <name> {{`, got `{header}`")))?;

    let mut func = Function::new(name);
    let mut blocks: FxHashMap<String, Block> = FxHashMap::default();
    let mut vars: FxHashMap<String, Variable> = FxHashMap::default();
    let mut raw_insts: Vec<RawInst> = Vec::new();
    let mut current_block: Option<Block> = None;

    for raw_line in lines {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "}" {
            break;
        }
        if let Some(label) = line.strip_suffix(':') {
            let block = func.make_block();
            if func.entry.is_none() {
                func.entry = Some(block);
            }
            blocks.insert(label.trim().to_string(), block);
            current_block = Some(block);
            continue;
        }

        let block = current_block.ok_or_else(|| err("instruction before any label"))?;
        let (lhs, rhs) = match line.split_once('=') {
            Some((l, r)) => (Some(l.trim().to_string()), r.trim()),
            None => (None, line),
        };
        let out_name = lhs.map(|l| {
            l.strip_prefix('%')
                .map(str::to_string)
                .unwrap_or(l)
        });

        let mut tokens = rhs.splitn(2, ' ');
        let mnemonic = tokens.next().unwrap_or("").trim();
        let opcode = opcode_from_mnemonic(mnemonic)
            .ok_or_else(|| err(format!("unknown opcode `{mnemonic}`")))?;
        let mut rest = tokens.next().unwrap_or("").trim();
        let callee = if opcode == Opcode::Invoke {
            let (name, tail) = rest.split_once(',').unwrap_or((rest, ""));
            rest = tail.trim();
            Some(name.trim().to_string())
        } else {
            None
        };
        let raw_args: Vec<String> = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split(',').map(|s| s.trim().to_string()).collect()
        };

        if let Some(name) = &out_name {
            if !vars.contains_key(name) {
                let v = func.make_variable(None);
                vars.insert(name.clone(), v);
            }
        }

        raw_insts.push(RawInst {
            block,
            out_name,
            opcode,
            is_phi: opcode == Opcode::Phi,
            callee,
            raw_args,
        });
    }

    for raw in raw_insts {
        let result = raw
            .out_name
            .as_ref()
            .map(|name| *vars.get(name).expect("pre-allocated in first pass"));

        let (args, phi_edges) = if raw.is_phi {
            let mut edges = Vec::new();
            for pair in &raw.raw_args {
                let (label_tok, value_tok) = pair
                    .split_once(' ')
                    .ok_or_else(|| err(format!("malformed phi edge `{pair}`")))?;
                let label_tok = label_tok.trim();
                let label_name = label_tok
                    .strip_prefix('@')
                    .ok_or_else(|| err(format!("phi edge must start with @label, got `{label_tok}`")))?;
                let from = *blocks
                    .get(label_name)
                    .ok_or_else(|| err(format!("undefined label @{label_name}")))?;
                let value = parse_operand(value_tok, &vars, &blocks)?;
                edges.push(PhiEdge { from, value });
            }
            (Default::default(), edges.into())
        } else {
            let mut args = smallvec::SmallVec::new();
            for tok in &raw.raw_args {
                args.push(parse_operand(tok, &vars, &blocks)?);
            }
            (args, Default::default())
        };

        let inst = func.make_inst(InstructionData {
            opcode: raw.opcode,
            args,
            phi_edges,
            result,
            parent: raw.block,
            callee: raw.callee,
        });
        func.append_inst(raw.block, inst);
    }

    Ok(func)
}
