//! Textual IL serialization
//!
//! The writer emits a canonical, deterministic form; the reader accepts
//! that form plus a few tolerated variants (standalone `.loc` lines,
//! capitalised `Error`/`ResumeTok` type tokens). `parse(print(m))` is
//! structurally equivalent to `m` up to temp-id renaming.

pub mod parser;
pub mod printer;

pub use parser::parse_module;
pub use printer::{instr_to_string, print_module};

use crate::instr::Opcode;
use crate::types::Type;

/// Result type implied by a mnemonic when no `.type` suffix is written.
/// The writer only adds a suffix when the instruction's type differs.
pub fn default_result_type(op: Opcode) -> Type {
    match op {
        Opcode::ConstI64 => Type::I64,
        Opcode::ConstF64 => Type::F64,
        Opcode::ConstStr => Type::Str,
        Opcode::NullPtr => Type::Ptr,
        Opcode::Add
        | Opcode::Sub
        | Opcode::Mul
        | Opcode::IAddOvf
        | Opcode::ISubOvf
        | Opcode::IMulOvf
        | Opcode::SDivChk0
        | Opcode::UDivChk0
        | Opcode::SRemChk0
        | Opcode::URemChk0
        | Opcode::And
        | Opcode::Or
        | Opcode::Xor
        | Opcode::Shl
        | Opcode::Shr => Type::I64,
        Opcode::CastSiNarrowChk => Type::I32,
        Opcode::FAdd | Opcode::FSub | Opcode::FMul | Opcode::FDiv => Type::F64,
        Opcode::Sitofp => Type::F64,
        Opcode::Fptosi => Type::I64,
        Opcode::Trunc1 => Type::I1,
        Opcode::Zext1 => Type::I64,
        Opcode::ICmpEq
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
        | Opcode::FCmpGe => Type::I1,
        Opcode::Alloca | Opcode::AddrOf => Type::Ptr,
        // Load/store carry an explicit type token; calls resolve from the
        // callee signature; the rest produce nothing.
        _ => Type::Void,
    }
}

/// Escape a byte string for emission between double quotes.
pub fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 2);
    for &b in bytes {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            b'\r' => out.push_str("\\r"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\x{b:02x}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_bytes() {
        assert_eq!(escape_bytes(b"hi"), "hi");
        assert_eq!(escape_bytes(b"a\"b"), "a\\\"b");
        assert_eq!(escape_bytes(b"\n\t"), "\\n\\t");
        assert_eq!(escape_bytes(&[0x01]), "\\x01");
    }

    #[test]
    fn test_default_result_types() {
        assert_eq!(default_result_type(Opcode::Add), Type::I64);
        assert_eq!(default_result_type(Opcode::ICmpEq), Type::I1);
        assert_eq!(default_result_type(Opcode::Alloca), Type::Ptr);
        assert_eq!(default_result_type(Opcode::Br), Type::Void);
    }
}
