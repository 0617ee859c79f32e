//! Checked math helpers
//!
//! The `_chkdom`/`_chk` family reports domain violations through an
//! out-parameter so the VM bridge can turn them into `DomainError`
//! traps while the plain helpers keep C-ABI simplicity.

use crate::trap::{TrapClass, rt_trap, rt_trap_class};

/// `pow(base, exp)` under the source language's domain rules: a negative
/// base with a non-integral exponent is a domain error, as is any
/// non-finite result. `*ok` reports success.
///
/// # Safety
/// `ok` must be a valid writable pointer; null traps.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rt_pow_f64_chkdom(base: f64, exp: f64, ok: *mut bool) -> f64 {
    if ok.is_null() {
        rt_trap("rt_pow_f64_chkdom: null ok");
        return f64::NAN;
    }
    let (result, valid) = pow_checked(base, exp);
    unsafe { *ok = valid };
    result
}

/// Safe core of [`rt_pow_f64_chkdom`]: `(result, ok)`.
pub fn pow_checked(base: f64, exp: f64) -> (f64, bool) {
    let exponent_integral = exp.is_finite() && exp == exp.trunc();
    if base < 0.0 && !exponent_integral {
        return (f64::NAN, false);
    }
    let result = base.powf(exp);
    if !result.is_finite() {
        return (result, false);
    }
    (result, true)
}

/// Square root; negative input is a domain error.
///
/// # Safety
/// `ok` must be a valid writable pointer; null traps.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rt_sqrt_chk_f64(value: f64, ok: *mut bool) -> f64 {
    if ok.is_null() {
        rt_trap("rt_sqrt_chk_f64: null ok");
        return f64::NAN;
    }
    let (result, valid) = sqrt_checked(value);
    unsafe { *ok = valid };
    result
}

pub fn sqrt_checked(value: f64) -> (f64, bool) {
    if value < 0.0 {
        (f64::NAN, false)
    } else {
        (value.sqrt(), true)
    }
}

/// Absolute value; `i64::MIN` has no positive counterpart and traps
/// `Overflow`.
#[unsafe(no_mangle)]
pub extern "C" fn rt_abs_i64_chk(value: i64) -> i64 {
    match value.checked_abs() {
        Some(v) => v,
        None => {
            rt_trap_class(TrapClass::Overflow, "ABS overflow on minimum integer");
            value
        }
    }
}

/// Wrapping absolute value for contexts that tolerate the `i64::MIN`
/// edge.
#[unsafe(no_mangle)]
pub extern "C" fn rt_abs_i64(value: i64) -> i64 {
    value.wrapping_abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_pow_domain_violation() {
        let (result, ok) = pow_checked(-2.0, 0.5);
        assert!(!ok);
        assert!(result.is_nan());
    }

    #[test]
    fn test_pow_success() {
        let (result, ok) = pow_checked(2.0, 10.0);
        assert!(ok);
        assert_eq!(result, 1024.0);
        // A negative base is fine with an integral exponent.
        let (result, ok) = pow_checked(-2.0, 3.0);
        assert!(ok);
        assert_eq!(result, -8.0);
    }

    #[test]
    fn test_pow_overflow_is_domain_failure() {
        let (result, ok) = pow_checked(1e308, 2.0);
        assert!(!ok);
        assert!(result.is_infinite());
    }

    #[test]
    fn test_pow_abi_wrapper() {
        let mut ok = true;
        let result = unsafe { rt_pow_f64_chkdom(-2.0, 0.5, &mut ok) };
        assert!(!ok);
        assert!(result.is_nan());
        let result = unsafe { rt_pow_f64_chkdom(2.0, 10.0, &mut ok) };
        assert!(ok);
        assert_eq!(result, 1024.0);
    }

    #[test]
    fn test_sqrt_checked() {
        assert_eq!(sqrt_checked(9.0), (3.0, true));
        let (nan, ok) = sqrt_checked(-1.0);
        assert!(!ok);
        assert!(nan.is_nan());
    }

    #[test]
    #[serial]
    fn test_abs_overflow_traps() {
        let seen = std::sync::Arc::new(std::sync::Mutex::new(None));
        let sink = seen.clone();
        crate::trap::set_trap_hook(Box::new(move |class, _| {
            *sink.lock().unwrap() = Some(class);
        }));
        let _ = rt_abs_i64_chk(i64::MIN);
        crate::trap::clear_trap_hook();
        assert_eq!(*seen.lock().unwrap(), Some(TrapClass::Overflow));
        assert_eq!(rt_abs_i64_chk(-9), 9);
        assert_eq!(rt_abs_i64(i64::MIN), i64::MIN);
    }
}
