//! Viper bytecode VM
//!
//! Executes verified IL modules on a frame/register model:
//! - one `Frame` per activation with an untyped 64-bit register file,
//!   a bump-allocated alloca arena, and a per-frame handler stack;
//! - a `match`-based dispatch loop (the switch strategy) that covers the
//!   whole opcode set statically;
//! - typed traps that unwind to handlers carrying `Error` and
//!   `ResumeTok` payloads, or terminate with one deterministic line;
//! - optional tail-call frame reuse, instruction tracing, scripted
//!   debugging, and a poll-callback pause protocol.

pub mod bridge;
pub mod debug;
pub mod frame;
pub mod slot;
pub mod trace;
pub mod traps;
pub mod vm;

pub use debug::{Breakpoint, DebugAction, DebugScript};
pub use frame::Frame;
pub use slot::Slot;
pub use trace::TraceMode;
pub use traps::TrapInfo;
pub use vm::{RunStatus, Vm, VmOptions};
