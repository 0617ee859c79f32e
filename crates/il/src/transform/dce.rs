//! Dead code elimination
//!
//! Removes pure instructions whose results are never used, and alloca
//! cells that are only ever stored to (the stores die with the cell).
//! Runs to a fixpoint so chains of dead values unravel in one pass.

use crate::func::Function;
use crate::instr::Opcode;
use crate::module::Module;
use std::collections::HashSet;

pub fn run(module: &mut Module) {
    for function in &mut module.functions {
        while sweep(function) {}
    }
}

/// Every use of `id` is a store *address* (never a loaded or escaping
/// value).
fn is_write_only(function: &Function, id: u32) -> bool {
    for block in &function.blocks {
        for instr in &block.instructions {
            if !instr.all_uses().any(|v| v.as_temp() == Some(id)) {
                continue;
            }
            let store_address = instr.op == Opcode::Store
                && instr.operands[0].as_temp() == Some(id)
                && instr.operands[1].as_temp() != Some(id);
            if !store_address {
                return false;
            }
        }
    }
    true
}

fn used_temps(function: &Function) -> HashSet<u32> {
    let mut used = HashSet::new();
    for block in &function.blocks {
        for instr in &block.instructions {
            for value in instr.all_uses() {
                if let Some(id) = value.as_temp() {
                    used.insert(id);
                }
            }
        }
    }
    used
}

fn sweep(function: &mut Function) -> bool {
    let used = used_temps(function);
    let mut changed = false;

    // Pure instructions with unused results.
    for block in &mut function.blocks {
        let before = block.instructions.len();
        block.instructions.retain(|instr| {
            let removable = instr.op.is_pure()
                && instr
                    .result
                    .is_some_and(|id| !used.contains(&id));
            !removable
        });
        changed |= block.instructions.len() != before;
    }
    if changed {
        return true;
    }

    // Write-only allocas: every use is a store address.
    let alloca_ids: Vec<u32> = function
        .blocks
        .iter()
        .flat_map(|b| b.instructions.iter())
        .filter(|i| i.op == Opcode::Alloca)
        .filter_map(|i| i.result)
        .collect();
    let dead_allocas: Vec<u32> = alloca_ids
        .into_iter()
        .filter(|&id| is_write_only(function, id))
        .collect();
    for id in dead_allocas {
        for block in &mut function.blocks {
            let before = block.instructions.len();
            block.instructions.retain(|instr| {
                let is_cell = instr.op == Opcode::Alloca && instr.result == Some(id);
                let is_store = instr.op == Opcode::Store
                    && instr.operands[0].as_temp() == Some(id);
                !(is_cell || is_store)
            });
            changed |= block.instructions.len() != before;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{parse_module, print_module};

    #[test]
    fn test_removes_unused_pure_chain() {
        let mut module = parse_module(
            "il 0.2.0\n\
             func @main() -> i64 {\n\
             entry:\n\
             \x20 %a = add 1, 2\n\
             \x20 %b = mul %a, 3\n\
             \x20 ret 0\n\
             }\n",
        )
        .unwrap();
        run(&mut module);
        let text = print_module(&module);
        assert!(!text.contains("add"));
        assert!(!text.contains("mul"));
    }

    #[test]
    fn test_removes_write_only_alloca() {
        let mut module = parse_module(
            "il 0.2.0\n\
             func @main() -> i64 {\n\
             entry:\n\
             \x20 %ptr = alloca 8\n\
             \x20 store i64 %ptr, 0\n\
             \x20 ret 5\n\
             }\n",
        )
        .unwrap();
        run(&mut module);
        let text = print_module(&module);
        assert!(!text.contains("alloca"));
        assert!(!text.contains("store"));
        assert!(text.contains("ret 5"));
    }

    #[test]
    fn test_keeps_calls_with_unused_results() {
        let mut module = parse_module(
            "il 0.2.0\n\
             extern @rt_rnd() -> f64\n\
             func @main() -> i64 {\n\
             entry:\n\
             \x20 %r = call @rt_rnd()\n\
             \x20 ret 0\n\
             }\n",
        )
        .unwrap();
        run(&mut module);
        assert!(print_module(&module).contains("call @rt_rnd"));
    }

    #[test]
    fn test_keeps_loaded_alloca() {
        let mut module = parse_module(
            "il 0.2.0\n\
             func @main() -> i64 {\n\
             entry:\n\
             \x20 %ptr = alloca 8\n\
             \x20 store i64 %ptr, 1\n\
             \x20 %v = load i64 %ptr\n\
             \x20 ret %v\n\
             }\n",
        )
        .unwrap();
        run(&mut module);
        assert!(print_module(&module).contains("alloca"));
    }
}
