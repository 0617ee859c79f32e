//! IL functions
//!
//! A function owns its blocks; the first block is the entry. Temp ids are
//! dense unsigned integers unique within the function, and `value_names`
//! optionally maps ids back to source-level names for diagnostics and
//! serialization.

use crate::block::BasicBlock;
use crate::types::Type;
use crate::value::Value;

/// A function parameter `(name, type)`. The entry block mirrors these as
/// block parameters with ids `0..n`.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncParam {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Function {
    /// Module-unique symbol name (without the `@` sigil).
    pub name: String,
    pub ret: Type,
    pub params: Vec<FuncParam>,
    /// Blocks in layout order; `blocks[0]` is the entry.
    pub blocks: Vec<BasicBlock>,
    /// Temp id -> display name; entries may be empty strings.
    pub value_names: Vec<String>,
}

impl Function {
    pub fn new(name: impl Into<String>, ret: Type, params: Vec<FuncParam>) -> Function {
        Function {
            name: name.into(),
            ret,
            params,
            blocks: Vec::new(),
            value_names: Vec::new(),
        }
    }

    pub fn entry(&self) -> Option<&BasicBlock> {
        self.blocks.first()
    }

    /// Find a block by its label.
    pub fn find_block(&self, label: &str) -> Option<&BasicBlock> {
        self.blocks.iter().find(|b| b.label == label)
    }

    pub fn find_block_mut(&mut self, label: &str) -> Option<&mut BasicBlock> {
        self.blocks.iter_mut().find(|b| b.label == label)
    }

    /// Index of a block by label.
    pub fn block_index(&self, label: &str) -> Option<usize> {
        self.blocks.iter().position(|b| b.label == label)
    }

    /// Record a display name for a temp id, growing the table as needed.
    pub fn set_value_name(&mut self, id: u32, name: impl Into<String>) {
        let idx = id as usize;
        if self.value_names.len() <= idx {
            self.value_names.resize(idx + 1, String::new());
        }
        self.value_names[idx] = name.into();
    }

    /// Display name for a temp id, when one was recorded.
    pub fn value_name(&self, id: u32) -> Option<&str> {
        self.value_names
            .get(id as usize)
            .map(String::as_str)
            .filter(|n| !n.is_empty())
    }

    /// First unused temporary id: one past the maximum id appearing in any
    /// parameter, result, operand, or branch argument.
    pub fn next_temp_id(&self) -> u32 {
        let mut max: Option<u32> = None;
        let mut note = |id: u32| {
            max = Some(max.map_or(id, |m| m.max(id)));
        };
        for block in &self.blocks {
            for param in &block.params {
                note(param.id);
            }
            for instr in &block.instructions {
                if let Some(id) = instr.result {
                    note(id);
                }
                for value in instr.all_uses() {
                    if let Some(id) = value.as_temp() {
                        note(id);
                    }
                }
            }
        }
        max.map_or(0, |m| m + 1)
    }

    /// Replace every use of `temp_id` (operands and branch arguments)
    /// with `replacement`. Definitions are left alone.
    pub fn replace_all_uses(&mut self, temp_id: u32, replacement: &Value) {
        for block in &mut self.blocks {
            for instr in &mut block.instructions {
                for value in instr.all_uses_mut() {
                    if value.as_temp() == Some(temp_id) {
                        *value = replacement.clone();
                    }
                }
            }
        }
    }

    /// Highest temp id in use plus one; the VM sizes register files with
    /// this.
    pub fn register_count(&self) -> usize {
        self.next_temp_id() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instr::{Instr, Opcode};

    fn sample() -> Function {
        let mut f = Function::new("f", Type::I64, vec![]);
        let mut bb = BasicBlock::new("entry");
        bb.instructions.push(Instr {
            result: Some(0),
            op: Opcode::Add,
            ty: Type::I64,
            operands: vec![Value::const_int(1), Value::const_int(2)],
            ..Instr::default()
        });
        bb.instructions.push(Instr {
            op: Opcode::Ret,
            operands: vec![Value::temp(0)],
            ..Instr::default()
        });
        bb.terminated = true;
        f.blocks.push(bb);
        f
    }

    #[test]
    fn test_next_temp_id() {
        let f = sample();
        assert_eq!(f.next_temp_id(), 1);
        assert_eq!(Function::new("g", Type::Void, vec![]).next_temp_id(), 0);
    }

    #[test]
    fn test_replace_all_uses() {
        let mut f = sample();
        f.replace_all_uses(0, &Value::const_int(3));
        let ret = &f.blocks[0].instructions[1];
        assert_eq!(ret.operands[0], Value::const_int(3));
        // The definition itself is untouched.
        assert_eq!(f.blocks[0].instructions[0].result, Some(0));
    }

    #[test]
    fn test_value_names() {
        let mut f = sample();
        f.set_value_name(5, "acc");
        assert_eq!(f.value_name(5), Some("acc"));
        assert_eq!(f.value_name(0), None);
        assert_eq!(f.next_temp_id(), 1);
    }
}
