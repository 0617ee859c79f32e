//! Viper runtime: C-callable helpers backing IL programs
//!
//! Key design principles:
//! - Every helper has a stable `rt_`-prefixed extern name; the IL
//!   declares them as externs and the VM bridges to them by name.
//! - Process-wide state (string table, RNG, input source, trap hook) is
//!   deliberate: RANDOMIZE and friends are global in the source language.
//! - The safe registry layer reports failures as typed errors; the
//!   `extern "C"` surface converts them into fatal traps for native
//!   callers.

pub mod io;
pub mod math;
pub mod memory;
pub mod random;
pub mod registry;
pub mod strings;
pub mod trap;

pub use registry::{RtError, RtFn, RtKind, RtValue, lookup, registry};
pub use strings::{
    string_concat, string_eq, string_intern, string_len, string_release, string_retain,
    string_value,
};
pub use trap::{TrapClass, clear_trap_hook, rt_trap, set_trap_hook};
