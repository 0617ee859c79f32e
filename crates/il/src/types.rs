//! Primitive IL types
//!
//! The IL type system is a finite tagged set. `Str` is an opaque handle
//! into the runtime string table; `Ptr` is a machine-word address into
//! VM-managed memory; `Error` and `ResumeTok` are first-class values
//! produced by the exception-handling opcodes.

use std::fmt;

/// Primitive IL value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Type {
    #[default]
    Void,
    I1,
    I16,
    I32,
    I64,
    F32,
    F64,
    Ptr,
    Str,
    Error,
    ResumeTok,
}

impl Type {
    /// Parse a textual type token.
    ///
    /// The two capitalised spellings (`Error`, `ResumeTok`) are accepted
    /// alongside the canonical lower-case forms.
    pub fn parse(token: &str) -> Option<Type> {
        Some(match token {
            "void" => Type::Void,
            "i1" => Type::I1,
            "i16" => Type::I16,
            "i32" => Type::I32,
            "i64" => Type::I64,
            "f32" => Type::F32,
            "f64" => Type::F64,
            "ptr" => Type::Ptr,
            "str" => Type::Str,
            "error" | "Error" => Type::Error,
            "resume_tok" | "ResumeTok" => Type::ResumeTok,
            _ => return None,
        })
    }

    /// True for the integer family (including `i1`).
    pub fn is_integer(self) -> bool {
        matches!(self, Type::I1 | Type::I16 | Type::I32 | Type::I64)
    }

    /// True for `f32` and `f64`.
    pub fn is_float(self) -> bool {
        matches!(self, Type::F32 | Type::F64)
    }

    /// Canonical lower-case token, as emitted by the writer.
    pub fn token(self) -> &'static str {
        match self {
            Type::Void => "void",
            Type::I1 => "i1",
            Type::I16 => "i16",
            Type::I32 => "i32",
            Type::I64 => "i64",
            Type::F32 => "f32",
            Type::F64 => "f64",
            Type::Ptr => "ptr",
            Type::Str => "str",
            Type::Error => "error",
            Type::ResumeTok => "resume_tok",
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_tokens() {
        for ty in [
            Type::Void,
            Type::I1,
            Type::I16,
            Type::I32,
            Type::I64,
            Type::F32,
            Type::F64,
            Type::Ptr,
            Type::Str,
            Type::Error,
            Type::ResumeTok,
        ] {
            assert_eq!(Type::parse(ty.token()), Some(ty));
        }
    }

    #[test]
    fn test_parse_capitalised_variants() {
        assert_eq!(Type::parse("Error"), Some(Type::Error));
        assert_eq!(Type::parse("ResumeTok"), Some(Type::ResumeTok));
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert_eq!(Type::parse("i8"), None);
        assert_eq!(Type::parse(""), None);
        assert_eq!(Type::parse("int"), None);
    }

    #[test]
    fn test_families() {
        assert!(Type::I1.is_integer());
        assert!(Type::I64.is_integer());
        assert!(!Type::F64.is_integer());
        assert!(Type::F32.is_float());
        assert!(!Type::Ptr.is_float());
    }
}
