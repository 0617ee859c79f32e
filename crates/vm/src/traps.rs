//! Trap payloads and diagnostics
//!
//! A trap either transfers to an exception handler (carrying an `Error`
//! payload plus a resume token) or terminates the run with exactly one
//! formatted line. `TrapInfo` serializes so the driver's `--dump-trap`
//! can emit a machine-readable record.

use serde::Serialize;
use std::fmt;
use viper_il::TrapKind;

/// Everything known about a trap at the point it fired.
#[derive(Debug, Clone, Serialize)]
pub struct TrapInfo {
    pub kind: TrapKind,
    pub code: i64,
    /// User message from a `trap` instruction or bridge failure. Carried
    /// both into handlers and into the top-level diagnostic.
    pub message: Option<String>,
    pub function: String,
    pub block: String,
    pub instr_index: usize,
    /// Source line from `.loc` trivia; 0 when unknown.
    pub line: u32,
}

impl TrapInfo {
    pub fn new(kind: TrapKind) -> TrapInfo {
        TrapInfo {
            kind,
            code: kind.code(),
            message: None,
            function: String::new(),
            block: String::new(),
            instr_index: 0,
            line: 0,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> TrapInfo {
        self.message = Some(message.into());
        self
    }
}

impl fmt::Display for TrapInfo {
    /// `Trap @fn:block#idx line N: Kind (code=K)[: message]`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Trap @{}:{}#{} line {}: {} (code={})",
            self.function, self.block, self.instr_index, self.line, self.kind, self.code
        )?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

/// Resume token payload: where the faulting instruction lives, so
/// `resume.same`/`resume.next` can transfer back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumePoint {
    pub block: usize,
    pub instr_index: usize,
}
