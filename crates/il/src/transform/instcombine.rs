//! Algebraic instruction combining
//!
//! Peephole identities that rewrite an instruction into one of its
//! operands or a constant: `x+0`, `x-0`, `x*1`, `x*0`, `x|0`, `x^0`,
//! shifts by zero, and double `xor` negation.

use crate::func::Function;
use crate::instr::{Instr, Opcode};
use crate::module::Module;
use crate::value::Value;

pub fn run(module: &mut Module) {
    for function in &mut module.functions {
        while combine_one(function) {}
    }
}

fn combine_one(function: &mut Function) -> bool {
    for block_idx in 0..function.blocks.len() {
        for instr_idx in 0..function.blocks[block_idx].instructions.len() {
            let instr = &function.blocks[block_idx].instructions[instr_idx];
            let Some(result) = instr.result else { continue };
            let Some(simplified) = simplify(instr) else {
                continue;
            };
            function.blocks[block_idx].instructions.remove(instr_idx);
            function.replace_all_uses(result, &simplified);
            return true;
        }
    }
    false
}

fn is_zero(value: &Value) -> bool {
    value.as_const_int() == Some(0)
}

fn is_one(value: &Value) -> bool {
    value.as_const_int() == Some(1)
}

fn simplify(instr: &Instr) -> Option<Value> {
    let (a, b) = match instr.operands.as_slice() {
        [a, b] => (a, b),
        _ => return None,
    };
    match instr.op {
        Opcode::Add | Opcode::IAddOvf => {
            if is_zero(b) {
                Some(a.clone())
            } else if is_zero(a) {
                Some(b.clone())
            } else {
                None
            }
        }
        Opcode::Sub | Opcode::ISubOvf => is_zero(b).then(|| a.clone()),
        Opcode::Mul | Opcode::IMulOvf => {
            if is_one(b) {
                Some(a.clone())
            } else if is_one(a) {
                Some(b.clone())
            } else if is_zero(a) || is_zero(b) {
                Some(Value::const_int(0))
            } else {
                None
            }
        }
        Opcode::Or | Opcode::Xor => {
            if is_zero(b) {
                Some(a.clone())
            } else if is_zero(a) {
                Some(b.clone())
            } else {
                None
            }
        }
        Opcode::And => {
            if is_zero(a) || is_zero(b) {
                Some(Value::const_int(0))
            } else {
                None
            }
        }
        Opcode::Shl | Opcode::Shr => is_zero(b).then(|| a.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{parse_module, print_module};

    #[test]
    fn test_add_zero_identity() {
        let mut module = parse_module(
            "il 0.2.0\n\
             func @f(%x: i64) -> i64 {\n\
             entry(%x: i64):\n\
             \x20 %a = add %x, 0\n\
             \x20 ret %a\n\
             }\n",
        )
        .unwrap();
        run(&mut module);
        let text = print_module(&module);
        assert!(!text.contains("add"));
        assert!(text.contains("ret %x"));
    }

    #[test]
    fn test_mul_zero_collapses() {
        let mut module = parse_module(
            "il 0.2.0\n\
             func @f(%x: i64) -> i64 {\n\
             entry(%x: i64):\n\
             \x20 %a = mul %x, 0\n\
             \x20 ret %a\n\
             }\n",
        )
        .unwrap();
        run(&mut module);
        assert!(print_module(&module).contains("ret 0"));
    }

    #[test]
    fn test_leaves_real_arithmetic() {
        let original = "il 0.2.0\n\
             func @f(%x: i64) -> i64 {\n\
             entry(%x: i64):\n\
             \x20 %a = add %x, 2\n\
             \x20 ret %a\n\
             }\n";
        let mut module = parse_module(original).unwrap();
        run(&mut module);
        assert!(print_module(&module).contains("add %x, 2"));
    }
}
