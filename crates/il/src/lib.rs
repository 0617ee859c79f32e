//! Viper IL: a typed, SSA-form intermediate language
//!
//! Key design principles:
//! - Instructions and blocks reference each other by label and temp id,
//!   never by pointer, so structural edits cannot dangle.
//! - Analyses are pure views over a `CfgContext`; mutating a module
//!   invalidates the context and it must be rebuilt.
//! - The verifier, not the builder, is responsible for typing invariants.

pub mod analysis;
pub mod block;
pub mod builder;
pub mod func;
pub mod instr;
pub mod io;
pub mod module;
pub mod pass;
pub mod transform;
pub mod types;
pub mod value;
pub mod verify;

pub use block::{BasicBlock, Param};
pub use builder::IrBuilder;
pub use func::{FuncParam, Function};
pub use instr::{Instr, Opcode, SourceLoc, TrapKind};
pub use module::{Extern, Global, Module};
pub use types::Type;
pub use value::Value;

/// Version stamp emitted in the textual module header.
pub const IL_VERSION: (u32, u32, u32) = (0, 2, 0);
