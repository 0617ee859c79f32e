//! Fatal trap plumbing
//!
//! `rt_trap` prints one deterministic line to stderr, flushes, and exits
//! with status 1 — unless a trap hook is installed, in which case the
//! hook observes the failure instead. The VM installs a hook so runtime
//! failures surface as IL traps rather than process aborts.

use std::io::Write as _;
use std::sync::Mutex;

/// Classification a runtime failure carries into the trap hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapClass {
    DivideByZero,
    DomainError,
    Overflow,
    Bounds,
    Eof,
    IoError,
    FileNotFound,
    RuntimeError,
}

type TrapHook = Box<dyn Fn(TrapClass, &str) + Send>;

static TRAP_HOOK: Mutex<Option<TrapHook>> = Mutex::new(None);

/// Install a process-wide trap hook. The hook receives the class and
/// message of every runtime trap until cleared.
pub fn set_trap_hook(hook: TrapHook) {
    *TRAP_HOOK.lock().unwrap() = Some(hook);
}

pub fn clear_trap_hook() {
    *TRAP_HOOK.lock().unwrap() = None;
}

/// Report a fatal runtime failure.
///
/// With no hook installed this never returns: the diagnostic goes to
/// stderr and the process exits 1, matching the VM's uncaught-trap
/// behavior so both execution modes fail identically.
pub fn rt_trap_class(class: TrapClass, msg: &str) {
    if let Some(hook) = TRAP_HOOK.lock().unwrap().as_ref() {
        hook(class, msg);
        return;
    }
    let mut err = std::io::stderr();
    let _ = writeln!(err, "Viper runtime trap: {msg}");
    let _ = err.flush();
    std::process::exit(1);
}

/// Catch-all trap used by helpers with no better classification.
pub fn rt_trap(msg: &str) {
    rt_trap_class(TrapClass::RuntimeError, msg);
}

/// Division-by-zero trap kept as a dedicated entry point for generated
/// code.
#[unsafe(no_mangle)]
pub extern "C" fn rt_trap_div0() {
    rt_trap_class(TrapClass::DivideByZero, "division by zero");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::mpsc;

    #[test]
    #[serial]
    fn test_hook_intercepts_trap() {
        let (tx, rx) = mpsc::channel();
        set_trap_hook(Box::new(move |class, msg| {
            tx.send((class, msg.to_string())).unwrap();
        }));
        rt_trap_div0();
        clear_trap_hook();
        let (class, msg) = rx.try_recv().unwrap();
        assert_eq!(class, TrapClass::DivideByZero);
        assert_eq!(msg, "division by zero");
    }
}
