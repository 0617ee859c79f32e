//! IR builder
//!
//! The canonical non-textual construction path: reserves temp ids, adds
//! blocks, tracks an insertion point, and appends instructions carrying
//! the current source location. The builder enforces arity-level shape
//! only; typing invariants are the verifier's responsibility.

use crate::block::{BasicBlock, Param};
use crate::func::{FuncParam, Function};
use crate::instr::{Instr, Opcode, SourceLoc};
use crate::module::Module;
use crate::types::Type;
use crate::value::Value;

pub struct IrBuilder<'m> {
    module: &'m mut Module,
    /// Index of the function under construction.
    func: Option<usize>,
    /// Index of the block receiving instructions.
    insert: Option<usize>,
    next_temp: u32,
    cur_loc: SourceLoc,
}

impl<'m> IrBuilder<'m> {
    pub fn new(module: &'m mut Module) -> IrBuilder<'m> {
        IrBuilder {
            module,
            func: None,
            insert: None,
            next_temp: 0,
            cur_loc: SourceLoc::default(),
        }
    }

    pub fn module(&mut self) -> &mut Module {
        self.module
    }

    /// Begin a new function; subsequent blocks and instructions go here.
    pub fn start_function(&mut self, name: impl Into<String>, ret: Type, params: Vec<FuncParam>) {
        let function = Function::new(name, ret, params);
        self.module.functions.push(function);
        self.func = Some(self.module.functions.len() - 1);
        self.insert = None;
        self.next_temp = 0;
        self.cur_loc = SourceLoc::default();
    }

    fn current_function_mut(&mut self) -> &mut Function {
        let idx = self.func.expect("no function under construction");
        &mut self.module.functions[idx]
    }

    pub fn current_function(&self) -> &Function {
        let idx = self.func.expect("no function under construction");
        &self.module.functions[idx]
    }

    /// Append a block. The first block becomes the entry and receives the
    /// function's parameters as block parameters with fresh temp ids.
    pub fn add_block(&mut self, label: impl Into<String>) -> String {
        let label = label.into();
        let is_entry = self.current_function().blocks.is_empty();
        let mut block = BasicBlock::new(label.clone());
        if is_entry {
            let params: Vec<(String, Type)> = self
                .current_function()
                .params
                .iter()
                .map(|p| (p.name.clone(), p.ty))
                .collect();
            for (name, ty) in params {
                let id = self.reserve_temp_id();
                self.current_function_mut().set_value_name(id, name.clone());
                block.params.push(Param { name, id, ty });
            }
        }
        self.current_function_mut().blocks.push(block);
        label
    }

    /// Add a parameter to an existing block, returning its temp id.
    pub fn add_block_param(&mut self, label: &str, name: impl Into<String>, ty: Type) -> u32 {
        let id = self.reserve_temp_id();
        let name = name.into();
        let function = self.current_function_mut();
        function.set_value_name(id, name.clone());
        let block = function
            .find_block_mut(label)
            .expect("add_block_param: unknown block");
        block.params.push(Param { name, id, ty });
        id
    }

    /// Direct subsequent instructions into `label`.
    pub fn set_insert_point(&mut self, label: &str) {
        let idx = self
            .current_function()
            .block_index(label)
            .expect("set_insert_point: unknown block");
        self.insert = Some(idx);
    }

    pub fn insert_label(&self) -> Option<&str> {
        self.insert
            .map(|idx| self.current_function().blocks[idx].label.as_str())
    }

    /// True once the insertion block has a terminator.
    pub fn block_terminated(&self) -> bool {
        self.insert
            .is_some_and(|idx| self.current_function().blocks[idx].terminated)
    }

    /// Hand out the next dense temp id.
    pub fn reserve_temp_id(&mut self) -> u32 {
        let id = self.next_temp;
        self.next_temp += 1;
        id
    }

    /// Set the source location stamped on subsequently emitted instructions.
    pub fn set_loc(&mut self, loc: SourceLoc) {
        self.cur_loc = loc;
    }

    /// Append an instruction at the insertion point. Terminators flip the
    /// block's `terminated` flag; nothing may be appended after that.
    pub fn emit(&mut self, mut instr: Instr) {
        if !instr.loc.is_known() {
            instr.loc = self.cur_loc;
        }
        let is_term = instr.is_terminator();
        let idx = self.insert.expect("emit: no insertion point");
        let block = &mut self.current_function_mut().blocks[idx];
        assert!(
            !block.terminated,
            "emit into terminated block '{}'",
            block.label
        );
        block.instructions.push(instr);
        if is_term {
            block.terminated = true;
        }
    }

    /// Emit a value-producing instruction and return the result temp.
    pub fn emit_value(&mut self, mut instr: Instr) -> Value {
        let id = self.reserve_temp_id();
        instr.result = Some(id);
        self.emit(instr);
        Value::temp(id)
    }

    pub fn emit_bin(&mut self, op: Opcode, ty: Type, lhs: Value, rhs: Value) -> Value {
        self.emit_value(Instr {
            op,
            ty,
            operands: vec![lhs, rhs],
            ..Instr::default()
        })
    }

    pub fn emit_un(&mut self, op: Opcode, ty: Type, operand: Value) -> Value {
        self.emit_value(Instr {
            op,
            ty,
            operands: vec![operand],
            ..Instr::default()
        })
    }

    pub fn emit_alloca(&mut self, size: i64) -> Value {
        self.emit_value(Instr {
            op: Opcode::Alloca,
            ty: Type::Ptr,
            operands: vec![Value::const_int(size)],
            ..Instr::default()
        })
    }

    pub fn emit_load(&mut self, ty: Type, ptr: Value) -> Value {
        self.emit_value(Instr {
            op: Opcode::Load,
            ty,
            operands: vec![ptr],
            ..Instr::default()
        })
    }

    pub fn emit_store(&mut self, ty: Type, ptr: Value, value: Value) {
        self.emit(Instr {
            op: Opcode::Store,
            ty,
            operands: vec![ptr, value],
            ..Instr::default()
        });
    }

    /// Emit a call; `ret` of `void` produces no result temp.
    pub fn emit_call(&mut self, callee: impl Into<String>, ret: Type, args: Vec<Value>) -> Option<Value> {
        let instr = Instr {
            op: Opcode::Call,
            ty: ret,
            operands: args,
            callee: Some(callee.into()),
            ..Instr::default()
        };
        if ret == Type::Void {
            self.emit(instr);
            None
        } else {
            Some(self.emit_value(instr))
        }
    }

    pub fn emit_br(&mut self, target: &str, args: Vec<Value>) {
        self.emit(Instr {
            op: Opcode::Br,
            labels: vec![target.to_string()],
            br_args: vec![args],
            ..Instr::default()
        });
    }

    pub fn emit_cbr(
        &mut self,
        cond: Value,
        true_target: &str,
        true_args: Vec<Value>,
        false_target: &str,
        false_args: Vec<Value>,
    ) {
        self.emit(Instr {
            op: Opcode::CBr,
            operands: vec![cond],
            labels: vec![true_target.to_string(), false_target.to_string()],
            br_args: vec![true_args, false_args],
            ..Instr::default()
        });
    }

    pub fn emit_ret(&mut self, value: Option<Value>) {
        self.emit(Instr {
            op: Opcode::Ret,
            operands: value.into_iter().collect(),
            ..Instr::default()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_block_mirrors_function_params() {
        let mut module = Module::new();
        let mut b = IrBuilder::new(&mut module);
        b.start_function(
            "f",
            Type::I64,
            vec![FuncParam {
                name: "x".to_string(),
                ty: Type::I64,
            }],
        );
        b.add_block("entry");
        b.set_insert_point("entry");
        b.emit_ret(Some(Value::temp(0)));

        let f = module.find_function("f").unwrap();
        assert_eq!(f.blocks[0].params.len(), 1);
        assert_eq!(f.blocks[0].params[0].id, 0);
        assert_eq!(f.blocks[0].params[0].ty, Type::I64);
        assert!(f.blocks[0].terminated);
        assert_eq!(f.value_name(0), Some("x"));
    }

    #[test]
    fn test_temp_ids_are_dense() {
        let mut module = Module::new();
        let mut b = IrBuilder::new(&mut module);
        b.start_function("f", Type::I64, vec![]);
        b.add_block("entry");
        b.set_insert_point("entry");
        let a = b.emit_bin(
            Opcode::Add,
            Type::I64,
            Value::const_int(1),
            Value::const_int(2),
        );
        let c = b.emit_bin(Opcode::Mul, Type::I64, a.clone(), Value::const_int(3));
        b.emit_ret(Some(c));

        let f = module.find_function("f").unwrap();
        assert_eq!(f.next_temp_id(), 2);
        assert_eq!(f.blocks[0].instructions[0].result, Some(0));
        assert_eq!(f.blocks[0].instructions[1].result, Some(1));
    }

    #[test]
    #[should_panic(expected = "terminated block")]
    fn test_emit_after_terminator_panics() {
        let mut module = Module::new();
        let mut b = IrBuilder::new(&mut module);
        b.start_function("f", Type::Void, vec![]);
        b.add_block("entry");
        b.set_insert_point("entry");
        b.emit_ret(None);
        b.emit_ret(None);
    }
}
