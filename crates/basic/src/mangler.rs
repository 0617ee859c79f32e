//! Deterministic name generation
//!
//! `NameMangler` hands out `t0, t1, ...` temp names and suffixes block
//! hints on reuse (`then`, `then_1`, `then_2`). `BlockNamer` keeps an
//! independent counter per control-flow shape within one procedure so
//! labels stay stable across runs; golden IL tests depend on that.

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct NameMangler {
    temp_counter: u32,
    block_counters: HashMap<String, u32>,
}

impl NameMangler {
    pub fn new() -> NameMangler {
        NameMangler::default()
    }

    /// Next temp name: `t0`, `t1`, ...
    pub fn next_temp(&mut self) -> String {
        let name = format!("t{}", self.temp_counter);
        self.temp_counter += 1;
        name
    }

    /// A block label from `hint`; reused hints gain `_1`, `_2`, ...
    pub fn block(&mut self, hint: &str) -> String {
        let count = self.block_counters.entry(hint.to_string()).or_insert(0);
        let name = if *count == 0 {
            hint.to_string()
        } else {
            format!("{hint}_{count}")
        };
        *count += 1;
        name
    }
}

/// Labels for one IF/ELSE construct.
pub struct IfNames {
    pub then_bb: String,
    pub else_bb: String,
    pub end_bb: String,
}

/// Labels for one WHILE loop.
pub struct WhileNames {
    pub head: String,
    pub body: String,
    pub end: String,
}

/// Labels for one FOR loop.
pub struct ForNames {
    pub head: String,
    pub body: String,
    pub inc: String,
    pub end: String,
}

/// Per-procedure block labels; counters reset with each new namer.
#[derive(Debug)]
pub struct BlockNamer {
    proc_name: String,
    if_counter: u32,
    while_counter: u32,
    for_counter: u32,
    other_counters: HashMap<String, u32>,
}

impl BlockNamer {
    pub fn new(proc_name: impl Into<String>) -> BlockNamer {
        BlockNamer {
            proc_name: proc_name.into(),
            if_counter: 0,
            while_counter: 0,
            for_counter: 0,
            other_counters: HashMap::new(),
        }
    }

    pub fn entry(&self) -> String {
        format!("entry_{}", self.proc_name)
    }

    pub fn ret(&self) -> String {
        format!("ret_{}", self.proc_name)
    }

    /// Label for a numbered source line.
    pub fn line(&self, line: u32) -> String {
        format!("L{line}_{}", self.proc_name)
    }

    pub fn next_if(&mut self) -> IfNames {
        let k = self.if_counter;
        self.if_counter += 1;
        IfNames {
            then_bb: format!("if_then_{k}_{}", self.proc_name),
            else_bb: format!("if_else_{k}_{}", self.proc_name),
            end_bb: format!("if_end_{k}_{}", self.proc_name),
        }
    }

    pub fn next_while(&mut self) -> WhileNames {
        let k = self.while_counter;
        self.while_counter += 1;
        WhileNames {
            head: format!("while_head_{k}_{}", self.proc_name),
            body: format!("while_body_{k}_{}", self.proc_name),
            end: format!("while_end_{k}_{}", self.proc_name),
        }
    }

    pub fn next_for(&mut self) -> ForNames {
        let k = self.for_counter;
        self.for_counter += 1;
        ForNames {
            head: format!("for_head_{k}_{}", self.proc_name),
            body: format!("for_body_{k}_{}", self.proc_name),
            inc: format!("for_inc_{k}_{}", self.proc_name),
            end: format!("for_end_{k}_{}", self.proc_name),
        }
    }

    /// Unique label for anything without a dedicated shape.
    pub fn unique(&mut self, hint: &str) -> String {
        let count = self.other_counters.entry(hint.to_string()).or_insert(0);
        let name = format!("{hint}_{count}_{}", self.proc_name);
        *count += 1;
        name
    }
}
