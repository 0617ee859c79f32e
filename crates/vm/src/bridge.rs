//! Runtime bridge
//!
//! Marshals IL values between register slots and the runtime helper
//! registry. Lookup is name-keyed because the helper set is open at
//! module boundaries; failures are deterministic single-line messages
//! that surface as `RuntimeError` traps (or the helper's own class).

use crate::slot::Slot;
use viper_il::{TrapKind, Type};
use viper_runtime::{RtError, RtKind, RtValue, lookup};
use viper_runtime::trap::TrapClass;

/// A bridge failure, pre-classified for the VM's trap machinery.
#[derive(Debug, Clone)]
pub struct BridgeError {
    pub kind: TrapKind,
    pub message: String,
}

impl BridgeError {
    fn runtime(message: String) -> BridgeError {
        BridgeError {
            kind: TrapKind::RuntimeError,
            message,
        }
    }
}

/// `runtime bridge does not support <operation> kind '<kind>'`
pub fn format_unsupported_kind(operation: &str, ty: Type) -> String {
    format!("runtime bridge does not support {operation} kind '{ty}'")
}

/// `attempted to call unknown runtime helper '<name>'`
pub fn format_unknown_helper(name: &str) -> String {
    format!("attempted to call unknown runtime helper '{name}'")
}

/// `argument count mismatch for function <name>: expected N argument(s), received M`
pub fn format_arg_count_mismatch(name: &str, expected: usize, received: usize) -> String {
    format!(
        "argument count mismatch for function {name}: expected {expected} {}, received {received}",
        if expected == 1 { "argument" } else { "arguments" }
    )
}

pub fn trap_class_to_kind(class: TrapClass) -> TrapKind {
    match class {
        TrapClass::DivideByZero => TrapKind::DivideByZero,
        TrapClass::DomainError => TrapKind::DomainError,
        TrapClass::Overflow => TrapKind::Overflow,
        TrapClass::Bounds => TrapKind::Bounds,
        TrapClass::Eof => TrapKind::Eof,
        TrapClass::IoError => TrapKind::IoError,
        TrapClass::FileNotFound => TrapKind::FileNotFound,
        TrapClass::RuntimeError => TrapKind::RuntimeError,
    }
}

fn marshal_arg(slot: Slot, ty: Type, expected: RtKind, name: &str) -> Result<RtValue, BridgeError> {
    let value = match ty {
        Type::I1 => RtValue::Bool(slot.as_bool()),
        Type::I16 | Type::I32 | Type::I64 => RtValue::I64(slot.as_i64()),
        Type::F32 | Type::F64 => RtValue::F64(slot.as_f64()),
        Type::Str => RtValue::Str(slot.raw()),
        Type::Ptr => RtValue::Ptr(slot.raw()),
        Type::Void | Type::Error | Type::ResumeTok => {
            return Err(BridgeError::runtime(format_unsupported_kind("argument", ty)));
        }
    };
    // Integer widths collapse to I64 at the ABI boundary; everything else
    // must match the registered kind exactly.
    let matches = matches!(
        (&value, expected),
        (RtValue::Bool(_), RtKind::I1)
            | (RtValue::Bool(_), RtKind::I64)
            | (RtValue::I64(_), RtKind::I64)
            | (RtValue::I64(_), RtKind::I1)
            | (RtValue::F64(_), RtKind::F64)
            | (RtValue::Str(_), RtKind::Str)
            | (RtValue::Ptr(_), RtKind::Ptr)
    );
    if !matches {
        return Err(BridgeError::runtime(format!(
            "{name}: argument kind mismatch (declared {ty})"
        )));
    }
    Ok(value)
}

/// Result of a bridged call: the slot payload plus whether it is a
/// string handle whose ownership transfers to the destination.
#[derive(Debug)]
pub struct BridgedResult {
    pub slot: Slot,
    pub is_str: bool,
}

/// Call a runtime helper by name.
///
/// `args` pairs each evaluated slot with its declared IL type. The
/// result is marshalled back for the destination slot; `None` for void
/// helpers.
pub fn call_helper(
    name: &str,
    args: &[(Slot, Type)],
    ret: Type,
) -> Result<Option<BridgedResult>, BridgeError> {
    let Some(helper) = lookup(name) else {
        return Err(BridgeError::runtime(format_unknown_helper(name)));
    };
    if args.len() != helper.params.len() {
        return Err(BridgeError::runtime(format_arg_count_mismatch(
            name,
            helper.params.len(),
            args.len(),
        )));
    }
    let mut marshalled = Vec::with_capacity(args.len());
    for ((slot, ty), expected) in args.iter().zip(helper.params) {
        marshalled.push(marshal_arg(*slot, *ty, *expected, name)?);
    }

    let result = (helper.run)(&marshalled).map_err(|RtError { class, message }| BridgeError {
        kind: trap_class_to_kind(class),
        message,
    })?;

    match (ret, result) {
        (Type::Void, _) => Ok(None),
        (Type::I1, RtValue::Bool(b)) => Ok(Some(BridgedResult {
            slot: Slot::from_bool(b),
            is_str: false,
        })),
        (Type::I1, RtValue::I64(v)) => Ok(Some(BridgedResult {
            slot: Slot::from_bool(v != 0),
            is_str: false,
        })),
        (Type::I16 | Type::I32 | Type::I64, RtValue::I64(v)) => Ok(Some(BridgedResult {
            slot: Slot::from_i64(v),
            is_str: false,
        })),
        (Type::F32 | Type::F64, RtValue::F64(v)) => Ok(Some(BridgedResult {
            slot: Slot::from_f64(v),
            is_str: false,
        })),
        (Type::Str, RtValue::Str(h)) => Ok(Some(BridgedResult {
            slot: Slot(h),
            is_str: true,
        })),
        (Type::Ptr, RtValue::Ptr(p)) => Ok(Some(BridgedResult {
            slot: Slot(p),
            is_str: false,
        })),
        (Type::Error | Type::ResumeTok, _) => Err(BridgeError::runtime(
            format_unsupported_kind("return", ret),
        )),
        (_, got) => Err(BridgeError::runtime(format!(
            "{name}: returned {got:?} but the IL declares {ret}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use viper_runtime::{string_intern, string_value};

    #[test]
    fn test_unknown_helper_message() {
        let err = call_helper("rt_nope", &[], Type::Void).unwrap_err();
        assert_eq!(err.kind, TrapKind::RuntimeError);
        assert_eq!(
            err.message,
            "attempted to call unknown runtime helper 'rt_nope'"
        );
    }

    #[test]
    fn test_arg_count_mismatch_message() {
        let err = call_helper("rt_len", &[], Type::I64).unwrap_err();
        assert_eq!(
            err.message,
            "argument count mismatch for function rt_len: expected 1 argument, received 0"
        );
    }

    #[test]
    fn test_unsupported_kind_message() {
        let err = call_helper(
            "rt_print_i64",
            &[(Slot::from_i64(1), Type::Error)],
            Type::Void,
        )
        .unwrap_err();
        assert_eq!(
            err.message,
            "runtime bridge does not support argument kind 'error'"
        );
    }

    #[test]
    #[serial]
    fn test_string_round_trip_through_bridge() {
        let a = string_intern("bridge");
        let b = string_intern(" test");
        let result = call_helper(
            "rt_concat",
            &[(Slot(a), Type::Str), (Slot(b), Type::Str)],
            Type::Str,
        )
        .unwrap()
        .unwrap();
        assert!(result.is_str);
        assert_eq!(string_value(result.slot.raw()), "bridge test");
    }

    #[test]
    fn test_domain_error_classification() {
        let err = call_helper(
            "rt_pow_f64_chkdom",
            &[(Slot::from_f64(-2.0), Type::F64), (Slot::from_f64(0.5), Type::F64)],
            Type::F64,
        )
        .unwrap_err();
        assert_eq!(err.kind, TrapKind::DomainError);
    }
}
