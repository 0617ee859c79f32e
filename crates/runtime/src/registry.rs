//! Name-keyed runtime helper registry
//!
//! The VM's bridge resolves extern calls against this table: each entry
//! carries the helper's typed signature and a safe implementation.
//! Failures come back as [`RtError`] values so the VM can convert them
//! into IL traps instead of aborting the process.

use crate::io;
use crate::math;
use crate::memory;
use crate::random;
use crate::strings;
use crate::trap::TrapClass;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Marshalling-level type of a helper argument or result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtKind {
    Void,
    I1,
    I64,
    F64,
    Str,
    Ptr,
}

/// A value crossing the bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum RtValue {
    Unit,
    Bool(bool),
    I64(i64),
    F64(f64),
    /// Owned string handle; the caller takes over the reference.
    Str(u64),
    Ptr(u64),
}

/// A runtime failure the VM converts into a trap.
#[derive(Debug, Clone, PartialEq)]
pub struct RtError {
    pub class: TrapClass,
    pub message: String,
}

impl RtError {
    pub fn new(class: TrapClass, message: impl Into<String>) -> RtError {
        RtError {
            class,
            message: message.into(),
        }
    }
}

type RtImpl = fn(&[RtValue]) -> Result<RtValue, RtError>;

/// One registered helper.
pub struct RtFn {
    pub name: &'static str,
    pub params: &'static [RtKind],
    pub ret: RtKind,
    pub run: RtImpl,
}

fn bad_arg(name: &str) -> RtError {
    RtError::new(TrapClass::RuntimeError, format!("{name}: malformed argument"))
}

fn arg_i64(args: &[RtValue], i: usize, name: &str) -> Result<i64, RtError> {
    match args.get(i) {
        Some(RtValue::I64(v)) => Ok(*v),
        Some(RtValue::Bool(b)) => Ok(i64::from(*b)),
        _ => Err(bad_arg(name)),
    }
}

fn arg_f64(args: &[RtValue], i: usize, name: &str) -> Result<f64, RtError> {
    match args.get(i) {
        Some(RtValue::F64(v)) => Ok(*v),
        _ => Err(bad_arg(name)),
    }
}

fn arg_str(args: &[RtValue], i: usize, name: &str) -> Result<u64, RtError> {
    match args.get(i) {
        Some(RtValue::Str(h)) => Ok(*h),
        _ => Err(bad_arg(name)),
    }
}

fn arg_ptr(args: &[RtValue], i: usize, name: &str) -> Result<u64, RtError> {
    match args.get(i) {
        Some(RtValue::Ptr(p)) => Ok(*p),
        _ => Err(bad_arg(name)),
    }
}

macro_rules! rt_fn {
    ($name:literal, [$($param:ident),*], $ret:ident, $body:expr) => {
        RtFn {
            name: $name,
            params: &[$(RtKind::$param),*],
            ret: RtKind::$ret,
            run: $body,
        }
    };
}

/// The full helper table. Order is stable for diagnostics.
pub fn registry() -> &'static [RtFn] {
    static TABLE: OnceLock<Vec<RtFn>> = OnceLock::new();
    TABLE.get_or_init(build_table).as_slice()
}

fn build_table() -> Vec<RtFn> {
    vec![
        // I/O
        rt_fn!("rt_print_i64", [I64], Void, |args| {
            io::rt_print_i64(arg_i64(args, 0, "rt_print_i64")?);
            Ok(RtValue::Unit)
        }),
        rt_fn!("rt_print_f64", [F64], Void, |args| {
            io::rt_print_f64(arg_f64(args, 0, "rt_print_f64")?);
            Ok(RtValue::Unit)
        }),
        rt_fn!("rt_print_bool", [I1], Void, |args| {
            io::rt_print_bool(arg_i64(args, 0, "rt_print_bool")? != 0);
            Ok(RtValue::Unit)
        }),
        rt_fn!("rt_print_str", [Str], Void, |args| {
            io::rt_print_str(arg_str(args, 0, "rt_print_str")?);
            Ok(RtValue::Unit)
        }),
        rt_fn!("rt_print_nl", [], Void, |_| {
            io::rt_print_nl();
            Ok(RtValue::Unit)
        }),
        rt_fn!("rt_input_str", [], Str, |_| match io::input_line() {
            Ok(Some(line)) => Ok(RtValue::Str(strings::string_intern(line))),
            Ok(None) => Err(RtError::new(TrapClass::Eof, "input past end of stream")),
            Err(msg) => Err(RtError::new(TrapClass::IoError, msg)),
        }),
        // Strings
        rt_fn!("rt_len", [Str], I64, |args| {
            Ok(RtValue::I64(strings::string_len(arg_str(args, 0, "rt_len")?)))
        }),
        rt_fn!("rt_concat", [Str, Str], Str, |args| {
            let a = arg_str(args, 0, "rt_concat")?;
            let b = arg_str(args, 1, "rt_concat")?;
            Ok(RtValue::Str(strings::string_concat(a, b)))
        }),
        rt_fn!("rt_substr", [Str, I64, I64], Str, |args| {
            let h = arg_str(args, 0, "rt_substr")?;
            let start = arg_i64(args, 1, "rt_substr")?;
            let len = arg_i64(args, 2, "rt_substr")?;
            Ok(RtValue::Str(strings::string_substr(h, start, len)))
        }),
        rt_fn!("rt_str_eq", [Str, Str], I1, |args| {
            let a = arg_str(args, 0, "rt_str_eq")?;
            let b = arg_str(args, 1, "rt_str_eq")?;
            Ok(RtValue::Bool(strings::string_eq(a, b)))
        }),
        rt_fn!("rt_to_int", [Str], I64, |args| {
            Ok(RtValue::I64(strings::string_to_int(arg_str(args, 0, "rt_to_int")?)))
        }),
        rt_fn!("rt_to_f64", [Str], F64, |args| {
            Ok(RtValue::F64(strings::string_to_f64(arg_str(args, 0, "rt_to_f64")?)))
        }),
        rt_fn!("rt_int_to_str", [I64], Str, |args| {
            let v = arg_i64(args, 0, "rt_int_to_str")?;
            Ok(RtValue::Str(strings::string_intern(v.to_string())))
        }),
        rt_fn!("rt_f64_to_str", [F64], Str, |args| {
            let v = arg_f64(args, 0, "rt_f64_to_str")?;
            Ok(RtValue::Str(strings::string_intern(v.to_string())))
        }),
        rt_fn!("rt_chr", [I64], Str, |args| {
            let code = arg_i64(args, 0, "rt_chr")?;
            let c = u32::try_from(code)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| {
                    RtError::new(TrapClass::DomainError, "CHR$ code out of range")
                })?;
            Ok(RtValue::Str(strings::string_intern(c.to_string())))
        }),
        rt_fn!("rt_str_retain", [Str], Void, |args| {
            strings::string_retain(arg_str(args, 0, "rt_str_retain")?);
            Ok(RtValue::Unit)
        }),
        rt_fn!("rt_str_release", [Str], Void, |args| {
            strings::string_release(arg_str(args, 0, "rt_str_release")?);
            Ok(RtValue::Unit)
        }),
        // Math
        rt_fn!("rt_abs_i64", [I64], I64, |args| {
            Ok(RtValue::I64(math::rt_abs_i64(arg_i64(args, 0, "rt_abs_i64")?)))
        }),
        rt_fn!("rt_abs_i64_chk", [I64], I64, |args| {
            let v = arg_i64(args, 0, "rt_abs_i64_chk")?;
            v.checked_abs().map(RtValue::I64).ok_or_else(|| {
                RtError::new(TrapClass::Overflow, "ABS overflow on minimum integer")
            })
        }),
        rt_fn!("rt_sqrt_chk_f64", [F64], F64, |args| {
            let (result, ok) = math::sqrt_checked(arg_f64(args, 0, "rt_sqrt_chk_f64")?);
            if ok {
                Ok(RtValue::F64(result))
            } else {
                Err(RtError::new(TrapClass::DomainError, "SQR of negative value"))
            }
        }),
        rt_fn!("rt_pow_f64_chkdom", [F64, F64], F64, |args| {
            let base = arg_f64(args, 0, "rt_pow_f64_chkdom")?;
            let exp = arg_f64(args, 1, "rt_pow_f64_chkdom")?;
            let (result, ok) = math::pow_checked(base, exp);
            if ok {
                Ok(RtValue::F64(result))
            } else {
                Err(RtError::new(
                    TrapClass::DomainError,
                    "power result out of domain",
                ))
            }
        }),
        // RNG
        rt_fn!("rt_rnd", [], F64, |_| Ok(RtValue::F64(random::rt_rnd()))),
        rt_fn!("rt_rand_int", [I64], I64, |args| {
            let max = arg_i64(args, 0, "rt_rand_int")?;
            if max <= 0 {
                return Err(RtError::new(
                    TrapClass::DomainError,
                    "RND upper bound must be positive",
                ));
            }
            Ok(RtValue::I64(random::rt_rand_int(max)))
        }),
        rt_fn!("rt_randomize_u64", [I64], Void, |args| {
            random::rt_randomize_u64(arg_i64(args, 0, "rt_randomize_u64")? as u64);
            Ok(RtValue::Unit)
        }),
        rt_fn!("rt_randomize_i64", [I64], Void, |args| {
            random::rt_randomize_i64(arg_i64(args, 0, "rt_randomize_i64")?);
            Ok(RtValue::Unit)
        }),
        // Memory
        rt_fn!("rt_alloc", [I64], Ptr, |args| {
            let size = arg_i64(args, 0, "rt_alloc")?;
            Ok(RtValue::Ptr(memory::rt_alloc(size) as u64))
        }),
        rt_fn!("rt_heap_release", [Ptr], Void, |args| {
            let ptr = arg_ptr(args, 0, "rt_heap_release")?;
            unsafe { memory::rt_heap_release(ptr as *mut u8) };
            Ok(RtValue::Unit)
        }),
    ]
}

/// Look up a helper by extern name.
pub fn lookup(name: &str) -> Option<&'static RtFn> {
    static INDEX: OnceLock<HashMap<&'static str, usize>> = OnceLock::new();
    let index = INDEX.get_or_init(|| {
        registry()
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name, i))
            .collect()
    });
    index.get(name).map(|&i| &registry()[i])
}
