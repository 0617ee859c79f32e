//! Promote alloca/store/load cells to SSA temps
//!
//! Block-local promotion: an alloca qualifies when its pointer is used
//! exclusively as a load/store address within the alloca's own block and
//! every load is preceded by a store. Each load result is replaced by
//! the most recently stored value; the alloca and its stores disappear.

use crate::func::Function;
use crate::instr::Opcode;
use crate::module::Module;
use crate::value::Value;
use std::collections::HashMap;

pub fn run(module: &mut Module) {
    for function in &mut module.functions {
        while promote_one(function) {}
    }
}

/// Attempt one promotion; true when the function changed.
fn promote_one(function: &mut Function) -> bool {
    let Some((block_idx, alloca_id)) = find_candidate(function) else {
        return false;
    };

    // Forward scan: replace loads with the running stored value.
    let mut current: Option<Value> = None;
    let mut replacements: HashMap<u32, Value> = HashMap::new();
    let mut dead: Vec<usize> = Vec::new();
    for (i, instr) in function.blocks[block_idx].instructions.iter().enumerate() {
        match instr.op {
            Opcode::Store if instr.operands[0].as_temp() == Some(alloca_id) => {
                current = Some(instr.operands[1].clone());
                dead.push(i);
            }
            Opcode::Load if instr.operands[0].as_temp() == Some(alloca_id) => {
                let value = current.clone().expect("candidate load without prior store");
                if let Some(result) = instr.result {
                    replacements.insert(result, value);
                }
                dead.push(i);
            }
            Opcode::Alloca if instr.result == Some(alloca_id) => dead.push(i),
            _ => {}
        }
    }

    let block = &mut function.blocks[block_idx];
    for &i in dead.iter().rev() {
        block.instructions.remove(i);
    }
    for (result, value) in replacements {
        function.replace_all_uses(result, &value);
    }
    true
}

/// A promotable alloca: pointer used only as a same-block load/store
/// address, with no load before the first store.
fn find_candidate(function: &Function) -> Option<(usize, u32)> {
    for (block_idx, block) in function.blocks.iter().enumerate() {
        for instr in &block.instructions {
            if instr.op != Opcode::Alloca {
                continue;
            }
            let Some(alloca_id) = instr.result else {
                continue;
            };
            if promotable(function, block_idx, alloca_id) {
                return Some((block_idx, alloca_id));
            }
        }
    }
    None
}

fn promotable(function: &Function, block_idx: usize, alloca_id: u32) -> bool {
    // All uses must stay in the alloca's block as plain load/store
    // addresses; anything else means the pointer escapes.
    for (b, block) in function.blocks.iter().enumerate() {
        for instr in &block.instructions {
            if !instr.all_uses().any(|v| v.as_temp() == Some(alloca_id)) {
                continue;
            }
            let same_block_address_use = b == block_idx
                && match instr.op {
                    Opcode::Load => instr.operands[0].as_temp() == Some(alloca_id),
                    Opcode::Store => {
                        instr.operands[0].as_temp() == Some(alloca_id)
                            && instr.operands[1].as_temp() != Some(alloca_id)
                    }
                    _ => false,
                };
            if !same_block_address_use {
                return false;
            }
        }
    }
    // Order check: no load may precede the first store, and the cell
    // must actually be accessed (write-only cells belong to dce).
    let mut stored = false;
    let mut any_access = false;
    for instr in &function.blocks[block_idx].instructions {
        match instr.op {
            Opcode::Store if instr.operands[0].as_temp() == Some(alloca_id) => {
                stored = true;
                any_access = true;
            }
            Opcode::Load if instr.operands[0].as_temp() == Some(alloca_id) => {
                if !stored {
                    return false;
                }
                any_access = true;
            }
            _ => {}
        }
    }
    any_access
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{parse_module, print_module};
    use crate::verify::verify_module;

    #[test]
    fn test_promotes_store_load_triple() {
        let mut module = parse_module(
            "il 0.2.0\n\
             func @main() -> i64 {\n\
             entry:\n\
             \x20 %ptr = alloca 8\n\
             \x20 store i64 %ptr, 5\n\
             \x20 %v = load i64 %ptr\n\
             \x20 ret %v\n\
             }\n",
        )
        .unwrap();
        run(&mut module);
        let text = print_module(&module);
        assert!(!text.contains("alloca"));
        assert!(!text.contains("store"));
        assert!(!text.contains("load"));
        assert!(text.contains("ret 5"));
        assert!(!verify_module(&module).has_errors());
    }

    #[test]
    fn test_keeps_alloca_with_escaping_pointer() {
        let original = "il 0.2.0\n\
             func @main() -> i64 {\n\
             entry:\n\
             \x20 %ptr = alloca 8\n\
             \x20 store i64 %ptr, 42\n\
             \x20 %q = addrof %ptr\n\
             \x20 %v = load i64 %q\n\
             \x20 ret %v\n\
             }\n";
        let mut module = parse_module(original).unwrap();
        run(&mut module);
        let text = print_module(&module);
        assert!(text.contains("alloca"));
        assert!(text.contains("addrof"));
    }

    #[test]
    fn test_keeps_load_before_store() {
        let mut module = parse_module(
            "il 0.2.0\n\
             func @main() -> i64 {\n\
             entry:\n\
             \x20 %ptr = alloca 8\n\
             \x20 %v = load i64 %ptr\n\
             \x20 store i64 %ptr, 5\n\
             \x20 ret %v\n\
             }\n",
        )
        .unwrap();
        run(&mut module);
        let text = print_module(&module);
        assert!(text.contains("alloca"));
    }

    #[test]
    fn test_chained_promotions() {
        let mut module = parse_module(
            "il 0.2.0\n\
             func @main() -> i64 {\n\
             entry:\n\
             \x20 %p = alloca 8\n\
             \x20 store i64 %p, 7\n\
             \x20 %a = load i64 %p\n\
             \x20 %q = alloca 8\n\
             \x20 store i64 %q, %a\n\
             \x20 %b = load i64 %q\n\
             \x20 ret %b\n\
             }\n",
        )
        .unwrap();
        run(&mut module);
        let text = print_module(&module);
        assert!(!text.contains("alloca"));
        assert!(text.contains("ret 7"));
    }
}
