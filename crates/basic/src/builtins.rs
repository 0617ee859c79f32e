//! Builtin intrinsic table
//!
//! One row per intrinsic: argument count, result classification, and
//! the runtime helpers the lowering emits. The scan pass consults this
//! table both to classify call expressions and to predeclare externs.

use crate::lower::ExprType;
use viper_il::Type;

/// Runtime helper signature used when predeclaring externs.
pub struct HelperSig {
    pub name: &'static str,
    pub ret: Type,
    pub params: &'static [Type],
}

pub struct Builtin {
    pub name: &'static str,
    pub arity: usize,
    pub result: ExprType,
    /// Helpers this builtin may call, declared up front by the scan.
    pub helpers: &'static [&'static str],
}

pub const BUILTINS: &[Builtin] = &[
    Builtin {
        name: "LEN",
        arity: 1,
        result: ExprType::Long,
        helpers: &["rt_len"],
    },
    Builtin {
        name: "CHR$",
        arity: 1,
        result: ExprType::Str,
        helpers: &["rt_chr"],
    },
    Builtin {
        name: "ABS",
        arity: 1,
        result: ExprType::Long,
        helpers: &["rt_abs_i64_chk", "rt_abs_f64"],
    },
    Builtin {
        name: "SQR",
        arity: 1,
        result: ExprType::Double,
        helpers: &["rt_sqrt_chk_f64"],
    },
    Builtin {
        name: "RND",
        arity: 0,
        result: ExprType::Double,
        helpers: &["rt_rnd"],
    },
    Builtin {
        name: "INT",
        arity: 1,
        result: ExprType::Double,
        helpers: &["rt_floor_f64"],
    },
    Builtin {
        name: "STR$",
        arity: 1,
        result: ExprType::Str,
        helpers: &["rt_int_to_str", "rt_f64_to_str"],
    },
    Builtin {
        name: "VAL",
        arity: 1,
        result: ExprType::Double,
        helpers: &["rt_to_f64"],
    },
    Builtin {
        name: "MID$",
        arity: 3,
        result: ExprType::Str,
        helpers: &["rt_substr"],
    },
];

pub fn builtin(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|b| b.name == name)
}

/// Signatures for every runtime helper the frontend can reference.
pub const HELPER_SIGS: &[HelperSig] = &[
    HelperSig {
        name: "rt_print_i64",
        ret: Type::Void,
        params: &[Type::I64],
    },
    HelperSig {
        name: "rt_print_f64",
        ret: Type::Void,
        params: &[Type::F64],
    },
    HelperSig {
        name: "rt_print_str",
        ret: Type::Void,
        params: &[Type::Str],
    },
    HelperSig {
        name: "rt_print_nl",
        ret: Type::Void,
        params: &[],
    },
    HelperSig {
        name: "rt_input_str",
        ret: Type::Str,
        params: &[],
    },
    HelperSig {
        name: "rt_len",
        ret: Type::I64,
        params: &[Type::Str],
    },
    HelperSig {
        name: "rt_concat",
        ret: Type::Str,
        params: &[Type::Str, Type::Str],
    },
    HelperSig {
        name: "rt_substr",
        ret: Type::Str,
        params: &[Type::Str, Type::I64, Type::I64],
    },
    HelperSig {
        name: "rt_str_eq",
        ret: Type::I1,
        params: &[Type::Str, Type::Str],
    },
    HelperSig {
        name: "rt_to_int",
        ret: Type::I64,
        params: &[Type::Str],
    },
    HelperSig {
        name: "rt_to_f64",
        ret: Type::F64,
        params: &[Type::Str],
    },
    HelperSig {
        name: "rt_int_to_str",
        ret: Type::Str,
        params: &[Type::I64],
    },
    HelperSig {
        name: "rt_f64_to_str",
        ret: Type::Str,
        params: &[Type::F64],
    },
    HelperSig {
        name: "rt_chr",
        ret: Type::Str,
        params: &[Type::I64],
    },
    HelperSig {
        name: "rt_str_retain",
        ret: Type::Void,
        params: &[Type::Str],
    },
    HelperSig {
        name: "rt_str_release",
        ret: Type::Void,
        params: &[Type::Str],
    },
    HelperSig {
        name: "rt_abs_i64_chk",
        ret: Type::I64,
        params: &[Type::I64],
    },
    HelperSig {
        name: "rt_abs_f64",
        ret: Type::F64,
        params: &[Type::F64],
    },
    HelperSig {
        name: "rt_sqrt_chk_f64",
        ret: Type::F64,
        params: &[Type::F64],
    },
    HelperSig {
        name: "rt_floor_f64",
        ret: Type::F64,
        params: &[Type::F64],
    },
    HelperSig {
        name: "rt_pow_f64_chkdom",
        ret: Type::F64,
        params: &[Type::F64, Type::F64],
    },
    HelperSig {
        name: "rt_rnd",
        ret: Type::F64,
        params: &[],
    },
    HelperSig {
        name: "rt_rand_int",
        ret: Type::I64,
        params: &[Type::I64],
    },
    HelperSig {
        name: "rt_randomize_i64",
        ret: Type::Void,
        params: &[Type::I64],
    },
];

pub fn helper_sig(name: &str) -> Option<&'static HelperSig> {
    HELPER_SIGS.iter().find(|h| h.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert!(builtin("LEN").is_some());
        assert!(builtin("CHR$").is_some());
        assert!(builtin("NOPE").is_none());
        assert_eq!(builtin("RND").unwrap().arity, 0);
    }

    #[test]
    fn test_every_builtin_helper_has_a_signature() {
        for b in BUILTINS {
            for helper in b.helpers {
                assert!(
                    helper_sig(helper).is_some(),
                    "{} references unknown helper {helper}",
                    b.name
                );
            }
        }
    }
}
