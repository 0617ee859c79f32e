//! Scripted debugger support
//!
//! Breakpoint specs come from the CLI (`label`, `fn:label`, `file:line`)
//! and the scripted command queue drives break handling without an
//! interactive session. Unknown script lines warn and are skipped so a
//! half-written script still runs.

use std::collections::VecDeque;
use std::fs;

/// One breakpoint, parsed from a `--break`/`--break-src` spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Breakpoint {
    /// Any block with this label, in any function.
    Label(String),
    /// A block label within a named function (`fn:label`).
    FnLabel { function: String, label: String },
    /// A source position (`file:line`).
    Src { file: String, line: u32 },
}

impl Breakpoint {
    /// Parse a `--break` spec. Three accepted shapes: bare label
    /// (trailing colon tolerated), `path:line`, and `fn:label`.
    pub fn parse(spec: &str) -> Result<Breakpoint, String> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err("empty breakpoint spec".to_string());
        }
        match spec.rsplit_once(':') {
            None => Ok(Breakpoint::Label(spec.to_string())),
            Some((head, tail)) if tail.is_empty() => {
                // "entry:" is a bare label with a stray colon.
                Ok(Breakpoint::Label(head.to_string()))
            }
            Some((head, tail)) => match tail.parse::<u32>() {
                Ok(line) => Ok(Breakpoint::Src {
                    file: head.to_string(),
                    line,
                }),
                Err(_) => Ok(Breakpoint::FnLabel {
                    function: head.to_string(),
                    label: tail.to_string(),
                }),
            },
        }
    }

    /// Parse a `--break-src` spec, which must be `file:line`.
    pub fn parse_src(spec: &str) -> Result<Breakpoint, String> {
        let (file, line) = spec
            .rsplit_once(':')
            .ok_or_else(|| format!("malformed source breakpoint '{spec}'"))?;
        let line = line
            .parse::<u32>()
            .map_err(|_| format!("malformed source breakpoint '{spec}'"))?;
        Ok(Breakpoint::Src {
            file: file.to_string(),
            line,
        })
    }
}

/// Parsed debugger action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugAction {
    Continue,
    /// Execute N instructions, then break with reason=step.
    Step(u64),
    StepOver,
    StepOut,
}

/// FIFO queue of scripted debugger actions.
///
/// Leading/trailing whitespace is trimmed, blank lines are skipped, and
/// unrecognised lines emit `[DEBUG] ignored: <line>` on stderr without
/// aborting the parse.
#[derive(Debug, Default)]
pub struct DebugScript {
    actions: VecDeque<DebugAction>,
}

impl DebugScript {
    pub fn new() -> DebugScript {
        DebugScript::default()
    }

    /// Load a script file; unreadable files yield an empty script with a
    /// warning, matching the tolerant CLI behavior.
    pub fn from_file(path: &str) -> DebugScript {
        match fs::read_to_string(path) {
            Ok(text) => DebugScript::from_text(&text),
            Err(_) => {
                eprintln!("[DEBUG] unable to open {path}");
                DebugScript::new()
            }
        }
    }

    pub fn from_text(text: &str) -> DebugScript {
        let mut script = DebugScript::new();
        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            match line {
                "continue" => script.actions.push_back(DebugAction::Continue),
                "step" => script.actions.push_back(DebugAction::Step(1)),
                "step-over" => script.actions.push_back(DebugAction::StepOver),
                "step-out" => script.actions.push_back(DebugAction::StepOut),
                _ => {
                    if let Some(rest) = line.strip_prefix("step ") {
                        match rest.trim().parse::<u64>() {
                            Ok(n) => script.actions.push_back(DebugAction::Step(n)),
                            Err(_) => eprintln!("[DEBUG] ignored: {line}"),
                        }
                    } else {
                        eprintln!("[DEBUG] ignored: {line}");
                    }
                }
            }
        }
        script
    }

    /// Append a step action after construction.
    pub fn add_step(&mut self, count: u64) {
        self.actions.push_back(DebugAction::Step(count));
    }

    /// Next action; an empty queue means resume normally.
    pub fn next_action(&mut self) -> DebugAction {
        self.actions.pop_front().unwrap_or(DebugAction::Continue)
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
