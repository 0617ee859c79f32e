//! Value numbering
//!
//! Block-scoped: within one block, a pure instruction whose opcode, type,
//! and operands match an earlier one is replaced by the earlier result.

use crate::func::Function;
use crate::instr::Instr;
use crate::module::Module;
use crate::value::Value;
use std::collections::HashMap;

pub fn run(module: &mut Module) {
    for function in &mut module.functions {
        number_function(function);
    }
}

fn key_of(instr: &Instr) -> String {
    // Operands render unambiguously via Debug; commutativity is not
    // exploited.
    format!("{:?}|{:?}|{:?}", instr.op, instr.ty, instr.operands)
}

fn number_function(function: &mut Function) {
    let mut replacements: Vec<(u32, Value)> = Vec::new();
    for block in &mut function.blocks {
        let mut seen: HashMap<String, u32> = HashMap::new();
        block.instructions.retain(|instr| {
            if !instr.op.is_pure() {
                return true;
            }
            let Some(result) = instr.result else {
                return true;
            };
            let key = key_of(instr);
            match seen.get(&key) {
                Some(&prior) => {
                    replacements.push((result, Value::temp(prior)));
                    false
                }
                None => {
                    seen.insert(key, result);
                    true
                }
            }
        });
    }
    for (from, to) in replacements {
        function.replace_all_uses(from, &to);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instr::Opcode;
    use crate::io::{parse_module, print_module};
    use crate::verify::verify_module;

    #[test]
    fn test_reuses_identical_computation() {
        let mut module = parse_module(
            "il 0.2.0\n\
             func @f(%x: i64) -> i64 {\n\
             entry(%x: i64):\n\
             \x20 %a = mul %x, %x\n\
             \x20 %b = mul %x, %x\n\
             \x20 %s = add %a, %b\n\
             \x20 ret %s\n\
             }\n",
        )
        .unwrap();
        run(&mut module);
        let entry = &module.functions[0].blocks[0];
        let muls = entry
            .instructions
            .iter()
            .filter(|i| i.op == Opcode::Mul)
            .count();
        assert_eq!(muls, 1);
        assert!(!verify_module(&module).has_errors());
        let _ = print_module(&module);
    }

    #[test]
    fn test_does_not_merge_across_blocks() {
        let mut module = parse_module(
            "il 0.2.0\n\
             func @f(%x: i64) -> i64 {\n\
             entry(%x: i64):\n\
             \x20 %a = mul %x, %x\n\
             \x20 br next\n\
             next:\n\
             \x20 %b = mul %x, %x\n\
             \x20 ret %b\n\
             }\n",
        )
        .unwrap();
        run(&mut module);
        let total: usize = module.functions[0]
            .blocks
            .iter()
            .map(|b| b.instructions.iter().filter(|i| i.op == Opcode::Mul).count())
            .sum();
        assert_eq!(total, 2);
    }

    #[test]
    fn test_never_merges_impure_ops() {
        let mut module = parse_module(
            "il 0.2.0\n\
             extern @rt_rnd() -> f64\n\
             func @f() -> f64 {\n\
             entry:\n\
             \x20 %a = call @rt_rnd()\n\
             \x20 %b = call @rt_rnd()\n\
             \x20 %s = fadd %a, %b\n\
             \x20 ret %s\n\
             }\n",
        )
        .unwrap();
        run(&mut module);
        let calls = module.functions[0].blocks[0]
            .instructions
            .iter()
            .filter(|i| i.op == Opcode::Call)
            .count();
        assert_eq!(calls, 2);
    }
}
