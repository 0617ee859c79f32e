//! Analyses over the IL
//!
//! Every analysis here is a pure view over a [`CfgContext`]. Mutating a
//! module structurally (adding/removing blocks or rewriting terminators)
//! invalidates the context; rebuild it before querying again.

pub mod cfg;
pub mod dominators;
pub mod loops;

pub use cfg::{CfgContext, FuncCfg};
pub use dominators::DomTree;
pub use loops::{Loop, LoopInfo};
