//! Basic blocks and block parameters
//!
//! Block parameters play the role of phi nodes: a predecessor's branch
//! passes one argument per parameter. The entry block of a function
//! carries the function's own parameters.

use crate::instr::Instr;
use crate::types::Type;

/// A typed block parameter `(name, temp id, type)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub id: u32,
    pub ty: Type,
}

/// A basic block: label, parameters, instructions, and a `terminated`
/// flag maintained by builders once a terminator has been appended.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BasicBlock {
    /// Unique within the owning function.
    pub label: String,
    pub params: Vec<Param>,
    pub instructions: Vec<Instr>,
    pub terminated: bool,
}

impl BasicBlock {
    pub fn new(label: impl Into<String>) -> BasicBlock {
        BasicBlock {
            label: label.into(),
            params: Vec::new(),
            instructions: Vec::new(),
            terminated: false,
        }
    }

    /// The terminator instruction, when the block has one.
    pub fn terminator(&self) -> Option<&Instr> {
        self.instructions.last().filter(|i| i.is_terminator())
    }

    /// Successor labels read from the terminator.
    pub fn successor_labels(&self) -> &[String] {
        self.terminator().map_or(&[], |term| term.labels.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instr::Opcode;

    #[test]
    fn test_terminator_query() {
        let mut bb = BasicBlock::new("entry");
        assert!(bb.terminator().is_none());

        bb.instructions.push(Instr {
            op: Opcode::Br,
            labels: vec!["exit".to_string()],
            br_args: vec![vec![]],
            ..Instr::default()
        });
        bb.terminated = true;
        assert!(bb.terminator().is_some());
        assert_eq!(bb.successor_labels(), ["exit".to_string()]);
    }

    #[test]
    fn test_non_terminator_tail_is_not_terminator() {
        let mut bb = BasicBlock::new("entry");
        bb.instructions.push(Instr {
            op: Opcode::EhPop,
            ..Instr::default()
        });
        assert!(bb.terminator().is_none());
        assert!(bb.successor_labels().is_empty());
    }
}
