//! Deterministic execution tracing
//!
//! One line per executed instruction on stderr, either at IL level
//! (`[IL] @fn:block#idx op=<mnemonic>`) or source level
//! (`[SRC] file:line:col`, skipped when no `.loc` is attached). Program
//! output on stdout is unaffected, so traced and untraced runs produce
//! identical stdout.

use std::collections::HashMap;
use viper_il::{Function, Instr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraceMode {
    #[default]
    Off,
    Il,
    Src,
}

impl TraceMode {
    /// Parse the `--trace=` argument value. A bare `--trace` means IL.
    pub fn parse(value: Option<&str>) -> Result<TraceMode, String> {
        match value {
            None | Some("il") => Ok(TraceMode::Il),
            Some("src") => Ok(TraceMode::Src),
            Some(other) => Err(format!("unknown trace mode '{other}'")),
        }
    }
}

/// Maps `.loc` file ids to display names for source-level tracing.
#[derive(Debug, Default)]
pub struct FileTable {
    names: HashMap<u32, String>,
    /// Fallback for ids with no explicit entry (usually the module path).
    default: Option<String>,
}

impl FileTable {
    pub fn new() -> FileTable {
        FileTable::default()
    }

    pub fn set(&mut self, id: u32, name: impl Into<String>) {
        self.names.insert(id, name.into());
    }

    pub fn set_default(&mut self, name: impl Into<String>) {
        self.default = Some(name.into());
    }

    pub fn name(&self, id: u32) -> String {
        self.names
            .get(&id)
            .cloned()
            .or_else(|| self.default.clone())
            .unwrap_or_else(|| id.to_string())
    }
}

/// Emit the trace line for one instruction about to execute.
pub fn trace_step(
    mode: TraceMode,
    files: &FileTable,
    function: &Function,
    block_label: &str,
    instr_index: usize,
    instr: &Instr,
) {
    match mode {
        TraceMode::Off => {}
        TraceMode::Il => {
            eprintln!(
                "[IL] @{}:{}#{} op={}",
                function.name,
                block_label,
                instr_index,
                instr.op.mnemonic()
            );
        }
        TraceMode::Src => {
            if instr.loc.is_known() {
                eprintln!(
                    "[SRC] {}:{}:{}",
                    files.name(instr.loc.file_id),
                    instr.loc.line,
                    instr.loc.col
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trace_mode() {
        assert_eq!(TraceMode::parse(None).unwrap(), TraceMode::Il);
        assert_eq!(TraceMode::parse(Some("il")).unwrap(), TraceMode::Il);
        assert_eq!(TraceMode::parse(Some("src")).unwrap(), TraceMode::Src);
        assert!(TraceMode::parse(Some("asm")).is_err());
    }

    #[test]
    fn test_file_table_fallback() {
        let mut files = FileTable::new();
        files.set(1, "prog.bas");
        assert_eq!(files.name(1), "prog.bas");
        assert_eq!(files.name(9), "9");
        files.set_default("module.il");
        assert_eq!(files.name(9), "module.il");
        assert_eq!(files.name(1), "prog.bas");
    }
}
