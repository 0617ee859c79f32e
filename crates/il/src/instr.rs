//! IL instructions and opcodes
//!
//! The opcode set is closed: the dispatch table in the VM and the typing
//! table in the verifier are both indexed by this enum, and both must
//! cover every variant. `Opcode::ALL` exists so table builders can assert
//! full coverage at startup.

use crate::types::Type;
use crate::value::Value;
use serde::Serialize;
use std::fmt;

/// Source position trivia attached to an instruction (`.loc file line col`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SourceLoc {
    pub file_id: u32,
    pub line: u32,
    pub col: u32,
}

impl SourceLoc {
    pub fn new(file_id: u32, line: u32, col: u32) -> SourceLoc {
        SourceLoc { file_id, line, col }
    }

    /// An all-zero location means "no trivia recorded".
    pub fn is_known(self) -> bool {
        self.line != 0
    }
}

/// Trap classification shared by the VM, the runtime bridge, and the
/// `trap` instruction's textual form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TrapKind {
    Overflow,
    DivideByZero,
    DomainError,
    InvalidCast,
    Bounds,
    Null,
    Eof,
    IoError,
    FileNotFound,
    RuntimeError,
}

impl TrapKind {
    /// Stable numeric code carried in the `Error` payload.
    pub fn code(self) -> i64 {
        match self {
            TrapKind::Overflow => 1,
            TrapKind::DivideByZero => 2,
            TrapKind::DomainError => 3,
            TrapKind::InvalidCast => 4,
            TrapKind::Bounds => 5,
            TrapKind::Null => 6,
            TrapKind::Eof => 7,
            TrapKind::IoError => 8,
            TrapKind::FileNotFound => 9,
            TrapKind::RuntimeError => 10,
        }
    }

    /// Lower-case token used in the textual form of `trap`.
    pub fn token(self) -> &'static str {
        match self {
            TrapKind::Overflow => "overflow",
            TrapKind::DivideByZero => "divide_by_zero",
            TrapKind::DomainError => "domain_error",
            TrapKind::InvalidCast => "invalid_cast",
            TrapKind::Bounds => "bounds",
            TrapKind::Null => "null",
            TrapKind::Eof => "eof",
            TrapKind::IoError => "io_error",
            TrapKind::FileNotFound => "file_not_found",
            TrapKind::RuntimeError => "runtime_error",
        }
    }

    pub fn parse(token: &str) -> Option<TrapKind> {
        Some(match token {
            "overflow" => TrapKind::Overflow,
            "divide_by_zero" => TrapKind::DivideByZero,
            "domain_error" => TrapKind::DomainError,
            "invalid_cast" => TrapKind::InvalidCast,
            "bounds" => TrapKind::Bounds,
            "null" => TrapKind::Null,
            "eof" => TrapKind::Eof,
            "io_error" => TrapKind::IoError,
            "file_not_found" => TrapKind::FileNotFound,
            "runtime_error" => TrapKind::RuntimeError,
            _ => return None,
        })
    }
}

impl fmt::Display for TrapKind {
    /// Stable identifier used in diagnostics (`Overflow`, `DivideByZero`, ...).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrapKind::Overflow => "Overflow",
            TrapKind::DivideByZero => "DivideByZero",
            TrapKind::DomainError => "DomainError",
            TrapKind::InvalidCast => "InvalidCast",
            TrapKind::Bounds => "Bounds",
            TrapKind::Null => "Null",
            TrapKind::Eof => "EOF",
            TrapKind::IoError => "IOError",
            TrapKind::FileNotFound => "FileNotFound",
            TrapKind::RuntimeError => "RuntimeError",
        };
        f.write_str(name)
    }
}

/// The closed opcode set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // Constants
    ConstI64,
    ConstF64,
    ConstStr,
    NullPtr,
    // Integer arithmetic, wrapping
    Add,
    Sub,
    Mul,
    // Integer arithmetic, checked
    IAddOvf,
    ISubOvf,
    IMulOvf,
    SDivChk0,
    UDivChk0,
    SRemChk0,
    URemChk0,
    CastSiNarrowChk,
    // Bitwise and shifts
    And,
    Or,
    Xor,
    Shl,
    Shr,
    // Float arithmetic
    FAdd,
    FSub,
    FMul,
    FDiv,
    // Conversions
    Sitofp,
    Fptosi,
    Trunc1,
    Zext1,
    // Comparisons
    ICmpEq,
    ICmpNe,
    SCmpLt,
    SCmpLe,
    SCmpGt,
    SCmpGe,
    UCmpLt,
    UCmpLe,
    UCmpGt,
    UCmpGe,
    FCmpEq,
    FCmpNe,
    FCmpLt,
    FCmpLe,
    FCmpGt,
    FCmpGe,
    // Memory
    Alloca,
    Load,
    Store,
    AddrOf,
    // Control flow
    Br,
    CBr,
    SwitchI32,
    Ret,
    Trap,
    // Calls
    Call,
    // Exception handling
    EhPush,
    EhPop,
    ResumeSame,
    ResumeNext,
    ResumeLabel,
}

impl Opcode {
    /// Every opcode, in enum order. The VM asserts its dispatch coverage
    /// against this list at startup.
    pub const ALL: &'static [Opcode] = &[
        Opcode::ConstI64,
        Opcode::ConstF64,
        Opcode::ConstStr,
        Opcode::NullPtr,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::IAddOvf,
        Opcode::ISubOvf,
        Opcode::IMulOvf,
        Opcode::SDivChk0,
        Opcode::UDivChk0,
        Opcode::SRemChk0,
        Opcode::URemChk0,
        Opcode::CastSiNarrowChk,
        Opcode::And,
        Opcode::Or,
        Opcode::Xor,
        Opcode::Shl,
        Opcode::Shr,
        Opcode::FAdd,
        Opcode::FSub,
        Opcode::FMul,
        Opcode::FDiv,
        Opcode::Sitofp,
        Opcode::Fptosi,
        Opcode::Trunc1,
        Opcode::Zext1,
        Opcode::ICmpEq,
        Opcode::ICmpNe,
        Opcode::SCmpLt,
        Opcode::SCmpLe,
        Opcode::SCmpGt,
        Opcode::SCmpGe,
        Opcode::UCmpLt,
        Opcode::UCmpLe,
        Opcode::UCmpGt,
        Opcode::UCmpGe,
        Opcode::FCmpEq,
        Opcode::FCmpNe,
        Opcode::FCmpLt,
        Opcode::FCmpLe,
        Opcode::FCmpGt,
        Opcode::FCmpGe,
        Opcode::Alloca,
        Opcode::Load,
        Opcode::Store,
        Opcode::AddrOf,
        Opcode::Br,
        Opcode::CBr,
        Opcode::SwitchI32,
        Opcode::Ret,
        Opcode::Trap,
        Opcode::Call,
        Opcode::EhPush,
        Opcode::EhPop,
        Opcode::ResumeSame,
        Opcode::ResumeNext,
        Opcode::ResumeLabel,
    ];

    /// Number of opcodes; dispatch tables must have exactly this size.
    pub const COUNT: usize = Opcode::ALL.len();

    /// Textual mnemonic.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::ConstI64 => "const.i64",
            Opcode::ConstF64 => "const.f64",
            Opcode::ConstStr => "const.str",
            Opcode::NullPtr => "null.ptr",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::IAddOvf => "iadd.ovf",
            Opcode::ISubOvf => "isub.ovf",
            Opcode::IMulOvf => "imul.ovf",
            Opcode::SDivChk0 => "sdiv.chk0",
            Opcode::UDivChk0 => "udiv.chk0",
            Opcode::SRemChk0 => "srem.chk0",
            Opcode::URemChk0 => "urem.chk0",
            Opcode::CastSiNarrowChk => "cast.si.narrow.chk",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Xor => "xor",
            Opcode::Shl => "shl",
            Opcode::Shr => "shr",
            Opcode::FAdd => "fadd",
            Opcode::FSub => "fsub",
            Opcode::FMul => "fmul",
            Opcode::FDiv => "fdiv",
            Opcode::Sitofp => "sitofp",
            Opcode::Fptosi => "fptosi",
            Opcode::Trunc1 => "trunc1",
            Opcode::Zext1 => "zext1",
            Opcode::ICmpEq => "icmp.eq",
            Opcode::ICmpNe => "icmp.ne",
            Opcode::SCmpLt => "scmp.lt",
            Opcode::SCmpLe => "scmp.le",
            Opcode::SCmpGt => "scmp.gt",
            Opcode::SCmpGe => "scmp.ge",
            Opcode::UCmpLt => "ucmp.lt",
            Opcode::UCmpLe => "ucmp.le",
            Opcode::UCmpGt => "ucmp.gt",
            Opcode::UCmpGe => "ucmp.ge",
            Opcode::FCmpEq => "fcmp.eq",
            Opcode::FCmpNe => "fcmp.ne",
            Opcode::FCmpLt => "fcmp.lt",
            Opcode::FCmpLe => "fcmp.le",
            Opcode::FCmpGt => "fcmp.gt",
            Opcode::FCmpGe => "fcmp.ge",
            Opcode::Alloca => "alloca",
            Opcode::Load => "load",
            Opcode::Store => "store",
            Opcode::AddrOf => "addrof",
            Opcode::Br => "br",
            Opcode::CBr => "cbr",
            Opcode::SwitchI32 => "switch.i32",
            Opcode::Ret => "ret",
            Opcode::Trap => "trap",
            Opcode::Call => "call",
            Opcode::EhPush => "eh.push",
            Opcode::EhPop => "eh.pop",
            Opcode::ResumeSame => "resume.same",
            Opcode::ResumeNext => "resume.next",
            Opcode::ResumeLabel => "resume.label",
        }
    }

    /// Reverse of [`Opcode::mnemonic`].
    pub fn from_mnemonic(token: &str) -> Option<Opcode> {
        Opcode::ALL
            .iter()
            .copied()
            .find(|op| op.mnemonic() == token)
    }

    /// True when this opcode must appear only as a block's last instruction.
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            Opcode::Br
                | Opcode::CBr
                | Opcode::SwitchI32
                | Opcode::Ret
                | Opcode::Trap
                | Opcode::ResumeSame
                | Opcode::ResumeNext
                | Opcode::ResumeLabel
        )
    }

    /// Load and store spell their accessed type as a separate token
    /// (`load i64 %p`, `store i64 %p, %v`).
    pub fn has_type_token(self) -> bool {
        matches!(self, Opcode::Load | Opcode::Store)
    }

    /// True for instructions the optimizer may delete when the result is
    /// unused: no side effects, no traps, no control flow.
    pub fn is_pure(self) -> bool {
        matches!(
            self,
            Opcode::ConstI64
                | Opcode::ConstF64
                | Opcode::ConstStr
                | Opcode::NullPtr
                | Opcode::Add
                | Opcode::Sub
                | Opcode::Mul
                | Opcode::And
                | Opcode::Or
                | Opcode::Xor
                | Opcode::Shl
                | Opcode::Shr
                | Opcode::FAdd
                | Opcode::FSub
                | Opcode::FMul
                | Opcode::FDiv
                | Opcode::Sitofp
                | Opcode::Fptosi
                | Opcode::Trunc1
                | Opcode::Zext1
                | Opcode::ICmpEq
                | Opcode::ICmpNe
                | Opcode::SCmpLt
                | Opcode::SCmpLe
                | Opcode::SCmpGt
                | Opcode::SCmpGe
                | Opcode::UCmpLt
                | Opcode::UCmpLe
                | Opcode::UCmpGt
                | Opcode::UCmpGe
                | Opcode::FCmpEq
                | Opcode::FCmpNe
                | Opcode::FCmpLt
                | Opcode::FCmpLe
                | Opcode::FCmpGt
                | Opcode::FCmpGe
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// A single IL instruction.
///
/// `labels` and `br_args` are parallel: `br_args[i]` is the argument list
/// passed to the block named by `labels[i]`, and must match that block's
/// parameters pairwise (verified, not enforced here).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Instr {
    /// Result temporary, when the opcode produces a value.
    pub result: Option<u32>,
    pub op: Opcode,
    /// Result type; for `load`/`store` the accessed type; `void` otherwise.
    pub ty: Type,
    pub operands: Vec<Value>,
    /// Callee symbol for `call`.
    pub callee: Option<String>,
    /// Successor labels for branches, `switch.i32`, and `resume.label`.
    pub labels: Vec<String>,
    /// Per-successor branch arguments, aligned with `labels`.
    pub br_args: Vec<Vec<Value>>,
    /// Trap classification for `trap`.
    pub trap_kind: Option<TrapKind>,
    /// Optional user message for `trap`.
    pub trap_msg: Option<String>,
    pub loc: SourceLoc,
}

impl Default for Opcode {
    fn default() -> Opcode {
        Opcode::Ret
    }
}

impl Instr {
    pub fn is_terminator(&self) -> bool {
        self.op.is_terminator()
    }

    /// Iterate over every value this instruction reads, including branch
    /// arguments.
    pub fn all_uses(&self) -> impl Iterator<Item = &Value> {
        self.operands
            .iter()
            .chain(self.br_args.iter().flat_map(|args| args.iter()))
    }

    /// Mutable variant of [`Instr::all_uses`].
    pub fn all_uses_mut(&mut self) -> impl Iterator<Item = &mut Value> {
        self.operands
            .iter_mut()
            .chain(self.br_args.iter_mut().flat_map(|args| args.iter_mut()))
    }
}
