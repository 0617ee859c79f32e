//! Verifier diagnostics
//!
//! Failures accumulate in a `DiagSink` so one verification pass can
//! report many problems. Message formatting follows the single-line
//! `function 'F' block 'L' [instr '<snippet>']: <reason>` shape.

use crate::block::BasicBlock;
use crate::func::Function;
use crate::instr::Instr;
use crate::io::instr_to_string;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct Diag {
    pub severity: Severity,
    pub message: String,
}

impl fmt::Display for Diag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity {
            Severity::Warning => write!(f, "warning: {}", self.message),
            Severity::Error => write!(f, "error: {}", self.message),
        }
    }
}

/// Accumulates diagnostics across a verification traversal.
#[derive(Debug, Default)]
pub struct DiagSink {
    diags: Vec<Diag>,
}

impl DiagSink {
    pub fn new() -> DiagSink {
        DiagSink::default()
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.diags.push(Diag {
            severity: Severity::Error,
            message: message.into(),
        });
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.diags.push(Diag {
            severity: Severity::Warning,
            message: message.into(),
        });
    }

    pub fn has_errors(&self) -> bool {
        self.diags.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.diags.is_empty()
    }

    pub fn diags(&self) -> &[Diag] {
        &self.diags
    }

    /// Drain accumulated diagnostics, leaving the sink empty.
    pub fn take(&mut self) -> Vec<Diag> {
        std::mem::take(&mut self.diags)
    }

    /// Join all error messages into one newline-separated string.
    pub fn error_summary(&self) -> String {
        self.diags
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .map(|d| d.message.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// `function 'F' block 'L': <message>`
pub fn format_block_diag(function: &Function, block: &BasicBlock, message: &str) -> String {
    format!(
        "function '{}' block '{}': {message}",
        function.name, block.label
    )
}

/// `function 'F' block 'L' instr '<snippet>': <message>`
pub fn format_instr_diag(
    function: &Function,
    block: &BasicBlock,
    instr: &Instr,
    message: &str,
) -> String {
    format!(
        "function '{}' block '{}' instr '{}': {message}",
        function.name,
        block.label,
        instr_to_string(function, instr)
    )
}
