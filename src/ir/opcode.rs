//! The closed opcode set (spec §6) and the fixed per-opcode signature every
//! IR builder call and every pass must respect.

use bitflags::bitflags;

bitflags! {
    /// Static properties of an opcode, consulted by DCE, CSE, SCCP and the
    /// normalizer instead of re-deriving them from a `match` at every call
    /// site.
    #[derive(Copy, Clone, PartialEq, Eq, Debug)]
    pub struct OpFlags: u8 {
        /// Folding/removing this instruction cannot change observable
        /// behavior as long as its output is otherwise unused (spec §4.7 DCE,
        /// §4.11).
        const PURE = 0b0000_0001;
        /// Ends a basic block; no further instructions may follow it in the
        /// same block (spec §3).
        const TERMINATOR = 0b0000_0010;
        /// Branches to one or more blocks (a subset of terminators).
        const BRANCH = 0b0000_0100;
        /// Reads memory or storage.
        const READS_MEM = 0b0000_1000;
        /// Writes memory or storage.
        const WRITES_MEM = 0b0001_0000;
        /// Opaque to alias analysis: may read or write anything (external
        /// calls, `sha3`, variable-length copies — spec §4.7 DSE/load-elim).
        const OPAQUE = 0b0010_0000;
        /// Commutative: operand order may be canonicalized (spec §4.7 CSE).
        const COMMUTATIVE = 0b0100_0000;
    }
}

/// The closed opcode set from spec §6.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[non_exhaustive]
pub enum Opcode {
    // Pure arithmetic / bitwise.
    Add, Sub, Mul, Div, SDiv, Mod, SMod, Exp, AddMod, MulMod, SignExtend,
    Shl, Shr, Sar, And, Or, Xor, Not, IsZero, Eq, Lt, Gt, Slt, Sgt,
    // Side-effectful target ops.
    MLoad, MStore, MCopy, SLoad, SStore, TLoad, TStore,
    CalldataCopy, CodeCopy, ReturndataCopy, Sha3,
    Log0, Log1, Log2, Log3, Log4,
    Call, StaticCall, DelegateCall, Create, Create2, SelfDestruct,
    Return, Revert, Stop, Invalid,
    // Environment reads.
    Address, Caller, CallValue, CalldataSize, CalldataLoad, Gas, GasPrice,
    Origin, Coinbase, Number, Timestamp, ChainId, Balance, SelfBalance,
    BlockHash, BaseFee, BlobBaseFee, BlobHash, PrevRandao, Difficulty,
    GasLimit, ExtCodeSize, ExtCodeHash, ExtCodeCopy, ReturndataSize,
    CodeSize, MSize,
    // Control.
    Jmp, Jnz, Djmp, Ret, Exit, Phi, Invoke,
    // Pseudo.
    Assert, AssertUnreachable, Alloca, PAlloca, CAlloca, ILoad, IStore,
    Store, Offset, Param, Nop, Sha3_64, LogN, DLoadBytes, DbName, Db,
}

/// Arity/output shape for an opcode: how many value operands it takes and
/// whether it produces a result. Label operands (for `jmp`/`jnz`/`djmp`) are
/// tracked separately since their count is variable for `djmp`.
#[derive(Copy, Clone, Debug)]
pub struct Signature {
    /// Number of `Variable`/`Literal` value operands (not counting labels).
    pub value_operands: Arity,
    /// `true` if the opcode has a variable-length label-operand list
    /// (`djmp`); only `djmp` sets this.
    pub variadic_labels: bool,
    /// `true` iff this instruction, when executed, produces an output value.
    pub produces_output: bool,
    /// Static flags (purity, terminator-ness, aliasing behavior, ...).
    pub flags: OpFlags,
}

/// Fixed or variable operand-count contract.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Arity {
    /// Exactly `n` value operands.
    Fixed(u8),
    /// At least `min` value operands (e.g. `call`'s argument list).
    AtLeast(u8),
}

impl Opcode {
    /// Look up this opcode's fixed signature.
    pub fn signature(self) -> Signature {
        use Opcode::*;
        let pure_binop = Signature {
            value_operands: Arity::Fixed(2),
            variadic_labels: false,
            produces_output: true,
            flags: OpFlags::PURE,
        };
        let pure_binop_comm = Signature {
            flags: OpFlags::PURE | OpFlags::COMMUTATIVE,
            ..pure_binop
        };
        let pure_unop = Signature {
            value_operands: Arity::Fixed(1),
            variadic_labels: false,
            produces_output: true,
            flags: OpFlags::PURE,
        };
        let env_read = Signature {
            value_operands: Arity::Fixed(0),
            variadic_labels: false,
            produces_output: true,
            flags: OpFlags::READS_MEM,
        };
        let terminator_no_succ = Signature {
            value_operands: Arity::AtLeast(0),
            variadic_labels: false,
            produces_output: false,
            flags: OpFlags::TERMINATOR,
        };
        match self {
            Add | Sub | Mul | Div | SDiv | Mod | SMod | And | Or | Xor | Eq | Lt | Gt | Slt
            | Sgt => {
                let commutative = matches!(self, Add | Mul | And | Or | Xor | Eq);
                if commutative {
                    pure_binop_comm
                } else {
                    pure_binop
                }
            }
            Exp | AddMod | MulMod | SignExtend | Shl | Shr | Sar => Signature {
                value_operands: Arity::Fixed(if matches!(self, AddMod | MulMod) { 3 } else { 2 }),
                variadic_labels: false,
                produces_output: true,
                flags: OpFlags::PURE,
            },
            Not | IsZero => pure_unop,

            MLoad | SLoad | TLoad => Signature {
                value_operands: Arity::Fixed(1),
                variadic_labels: false,
                produces_output: true,
                flags: OpFlags::READS_MEM,
            },
            MStore | SStore | TStore => Signature {
                value_operands: Arity::Fixed(2),
                variadic_labels: false,
                produces_output: false,
                flags: OpFlags::WRITES_MEM,
            },
            MCopy => Signature {
                value_operands: Arity::Fixed(3),
                variadic_labels: false,
                produces_output: false,
                flags: OpFlags::WRITES_MEM.union(OpFlags::READS_MEM),
            },
            CalldataCopy | CodeCopy | ReturndataCopy => Signature {
                value_operands: Arity::Fixed(3),
                variadic_labels: false,
                produces_output: false,
                flags: OpFlags::WRITES_MEM.union(OpFlags::OPAQUE),
            },
            Sha3 | Sha3_64 => Signature {
                value_operands: Arity::Fixed(2),
                variadic_labels: false,
                produces_output: true,
                flags: OpFlags::READS_MEM.union(OpFlags::OPAQUE),
            },
            Log0 | Log1 | Log2 | Log3 | Log4 | LogN => Signature {
                value_operands: Arity::AtLeast(2),
                variadic_labels: false,
                produces_output: false,
                flags: OpFlags::OPAQUE,
            },
            Call | StaticCall | DelegateCall => Signature {
                value_operands: Arity::AtLeast(6),
                variadic_labels: false,
                produces_output: true,
                flags: OpFlags::OPAQUE,
            },
            Create | Create2 => Signature {
                value_operands: Arity::AtLeast(3),
                variadic_labels: false,
                produces_output: true,
                flags: OpFlags::OPAQUE,
            },
            SelfDestruct => Signature {
                value_operands: Arity::Fixed(1),
                variadic_labels: false,
                produces_output: false,
                flags: OpFlags::TERMINATOR.union(OpFlags::OPAQUE),
            },
            Return | Revert => Signature {
                value_operands: Arity::Fixed(2),
                variadic_labels: false,
                produces_output: false,
                flags: OpFlags::TERMINATOR.union(OpFlags::READS_MEM),
            },
            Stop | Invalid | Exit => terminator_no_succ,

            Address | Caller | CallValue | CalldataSize | Gas | GasPrice | Origin | Coinbase
            | Number | Timestamp | ChainId | SelfBalance | BaseFee | BlobBaseFee | PrevRandao
            | Difficulty | GasLimit | ReturndataSize | CodeSize | MSize => env_read,
            CalldataLoad => Signature {
                value_operands: Arity::Fixed(1),
                ..env_read
            },
            Balance | ExtCodeSize | ExtCodeHash | BlockHash | BlobHash => Signature {
                value_operands: Arity::Fixed(1),
                ..env_read
            },
            ExtCodeCopy => Signature {
                value_operands: Arity::Fixed(4),
                variadic_labels: false,
                produces_output: false,
                flags: OpFlags::WRITES_MEM.union(OpFlags::OPAQUE),
            },

            Jmp => Signature {
                value_operands: Arity::Fixed(0),
                variadic_labels: false,
                produces_output: false,
                flags: OpFlags::TERMINATOR | OpFlags::BRANCH,
            },
            Jnz => Signature {
                value_operands: Arity::Fixed(1),
                variadic_labels: false,
                produces_output: false,
                flags: OpFlags::TERMINATOR | OpFlags::BRANCH,
            },
            Djmp => Signature {
                value_operands: Arity::Fixed(1),
                variadic_labels: true,
                produces_output: false,
                flags: OpFlags::TERMINATOR | OpFlags::BRANCH,
            },
            Ret => Signature {
                value_operands: Arity::Fixed(1),
                variadic_labels: false,
                produces_output: false,
                flags: OpFlags::TERMINATOR,
            },
            Phi => Signature {
                value_operands: Arity::AtLeast(0),
                variadic_labels: false,
                produces_output: true,
                flags: OpFlags::empty(),
            },
            Invoke => Signature {
                value_operands: Arity::AtLeast(0),
                variadic_labels: false,
                produces_output: true,
                flags: OpFlags::OPAQUE,
            },

            Assert | AssertUnreachable => Signature {
                value_operands: Arity::Fixed(1),
                variadic_labels: false,
                produces_output: false,
                flags: OpFlags::OPAQUE,
            },
            Alloca | PAlloca | CAlloca => Signature {
                value_operands: Arity::AtLeast(0),
                variadic_labels: false,
                produces_output: true,
                flags: OpFlags::PURE,
            },
            ILoad => Signature {
                value_operands: Arity::Fixed(1),
                variadic_labels: false,
                produces_output: true,
                flags: OpFlags::READS_MEM,
            },
            IStore => Signature {
                value_operands: Arity::Fixed(2),
                variadic_labels: false,
                produces_output: false,
                flags: OpFlags::WRITES_MEM,
            },
            Store => Signature {
                value_operands: Arity::Fixed(1),
                variadic_labels: false,
                produces_output: true,
                flags: OpFlags::PURE,
            },
            Offset => Signature {
                value_operands: Arity::Fixed(2),
                variadic_labels: false,
                produces_output: true,
                flags: OpFlags::PURE,
            },
            Param => Signature {
                value_operands: Arity::Fixed(0),
                variadic_labels: false,
                produces_output: true,
                flags: OpFlags::empty(),
            },
            Nop => Signature {
                value_operands: Arity::Fixed(0),
                variadic_labels: false,
                produces_output: false,
                flags: OpFlags::PURE,
            },
            DLoadBytes => Signature {
                value_operands: Arity::Fixed(1),
                variadic_labels: false,
                produces_output: true,
                flags: OpFlags::READS_MEM,
            },
            DbName | Db => Signature {
                value_operands: Arity::AtLeast(0),
                variadic_labels: false,
                produces_output: false,
                flags: OpFlags::empty(),
            },
        }
    }

    /// `true` iff this opcode's result (if any) may be deduplicated,
    /// constant-folded, or dropped when unused (spec §4.7 DCE/CSE/SCCP).
    pub fn is_pure(self) -> bool {
        self.signature().flags.contains(OpFlags::PURE)
    }

    /// `true` iff this opcode ends its basic block.
    pub fn is_terminator(self) -> bool {
        self.signature().flags.contains(OpFlags::TERMINATOR)
    }

    /// `true` iff this opcode branches to one or more successor blocks.
    pub fn is_branch(self) -> bool {
        self.signature().flags.contains(OpFlags::BRANCH)
    }

    /// `true` iff this opcode's aliasing behavior cannot be statically
    /// resolved (spec §4.7 "pessimistic in the presence of opaque ops").
    pub fn is_opaque(self) -> bool {
        self.signature().flags.contains(OpFlags::OPAQUE)
    }

    /// `true` for the binary opcodes whose operand order may be
    /// canonicalized by CSE.
    pub fn is_commutative(self) -> bool {
        self.signature().flags.contains(OpFlags::COMMUTATIVE)
    }

    /// Mnemonic used by the textual printer/parser (spec §6).
    pub fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            Add => "add", Sub => "sub", Mul => "mul", Div => "div", SDiv => "sdiv",
            Mod => "mod", SMod => "smod", Exp => "exp", AddMod => "addmod",
            MulMod => "mulmod", SignExtend => "signextend", Shl => "shl", Shr => "shr",
            Sar => "sar", And => "and", Or => "or", Xor => "xor", Not => "not",
            IsZero => "iszero", Eq => "eq", Lt => "lt", Gt => "gt", Slt => "slt", Sgt => "sgt",
            MLoad => "mload", MStore => "mstore", MCopy => "mcopy", SLoad => "sload",
            SStore => "sstore", TLoad => "tload", TStore => "tstore",
            CalldataCopy => "calldatacopy", CodeCopy => "codecopy",
            ReturndataCopy => "returndatacopy", Sha3 => "sha3",
            Log0 => "log0", Log1 => "log1", Log2 => "log2", Log3 => "log3", Log4 => "log4",
            Call => "call", StaticCall => "staticcall", DelegateCall => "delegatecall",
            Create => "create", Create2 => "create2", SelfDestruct => "selfdestruct",
            Return => "return", Revert => "revert", Stop => "stop", Invalid => "invalid",
            Address => "address", Caller => "caller", CallValue => "callvalue",
            CalldataSize => "calldatasize", CalldataLoad => "calldataload", Gas => "gas",
            GasPrice => "gasprice", Origin => "origin", Coinbase => "coinbase",
            Number => "number", Timestamp => "timestamp", ChainId => "chainid",
            Balance => "balance", SelfBalance => "selfbalance", BlockHash => "blockhash",
            BaseFee => "basefee", BlobBaseFee => "blobbasefee", BlobHash => "blobhash",
            PrevRandao => "prevrandao", Difficulty => "difficulty", GasLimit => "gaslimit",
            ExtCodeSize => "extcodesize", ExtCodeHash => "extcodehash",
            ExtCodeCopy => "extcodecopy", ReturndataSize => "returndatasize",
            CodeSize => "codesize", MSize => "msize",
            Jmp => "jmp", Jnz => "jnz", Djmp => "djmp", Ret => "ret", Exit => "exit",
            Phi => "phi", Invoke => "invoke",
            Assert => "assert", AssertUnreachable => "assert_unreachable", Alloca => "alloca",
            PAlloca => "palloca", CAlloca => "calloca", ILoad => "iload", IStore => "istore",
            Store => "store", Offset => "offset", Param => "param", Nop => "nop",
            Sha3_64 => "sha3_64", LogN => "log", DLoadBytes => "dloadbytes",
            DbName => "dbname", Db => "db",
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}
