//! Loop-invariant code motion
//!
//! Hoists pure instructions whose operands are all defined outside the
//! loop into the preheader. Only loops with a unique out-of-loop
//! predecessor branching unconditionally to the header are touched;
//! trapping or side-effecting instructions never move.

use crate::analysis::{DomTree, FuncCfg, LoopInfo};
use crate::func::Function;
use crate::instr::Opcode;
use crate::module::Module;
use std::collections::HashSet;

pub fn run(module: &mut Module) {
    for function in &mut module.functions {
        while hoist_one(function) {}
    }
}

fn hoist_one(function: &mut Function) -> bool {
    let cfg = FuncCfg::build(function);
    let dom = DomTree::compute(&cfg);
    let loops = LoopInfo::compute(&cfg, &dom);

    for lp in &loops.loops {
        // Preheader: the single predecessor of the header outside the loop,
        // ending in an unconditional branch.
        let outside: Vec<usize> = cfg.predecessors[lp.header]
            .iter()
            .copied()
            .filter(|p| !lp.contains(*p))
            .collect();
        let [preheader] = outside.as_slice() else {
            continue;
        };
        let preheader = *preheader;
        if function.blocks[preheader]
            .terminator()
            .is_none_or(|t| t.op != Opcode::Br)
        {
            continue;
        }

        // Temps defined inside the loop (params and results).
        let mut inside: HashSet<u32> = HashSet::new();
        for &b in &lp.blocks {
            for param in &function.blocks[b].params {
                inside.insert(param.id);
            }
            for instr in &function.blocks[b].instructions {
                if let Some(id) = instr.result {
                    inside.insert(id);
                }
            }
        }

        for &b in &lp.blocks {
            let candidate = function.blocks[b].instructions.iter().position(|instr| {
                instr.op.is_pure()
                    && instr.result.is_some()
                    && instr
                        .all_uses()
                        .all(|v| v.as_temp().is_none_or(|id| !inside.contains(&id)))
            });
            if let Some(i) = candidate {
                let hoisted = function.blocks[b].instructions.remove(i);
                let pre = &mut function.blocks[preheader];
                let at = pre.instructions.len() - 1;
                pre.instructions.insert(at, hoisted);
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{parse_module, print_module};
    use crate::verify::verify_module;

    #[test]
    fn test_hoists_invariant_multiply() {
        let mut module = parse_module(
            "il 0.2.0\n\
             func @f(%n: i64) -> i64 {\n\
             entry(%n: i64):\n\
             \x20 br head(0, 0)\n\
             head(%i: i64, %acc: i64):\n\
             \x20 %c = scmp.lt %i, 10\n\
             \x20 cbr %c, body, done\n\
             body:\n\
             \x20 %k = mul %n, 3\n\
             \x20 %acc2 = add %acc, %k\n\
             \x20 %i2 = add %i, 1\n\
             \x20 br head(%i2, %acc2)\n\
             done:\n\
             \x20 ret %acc\n\
             }\n",
        )
        .unwrap();
        run(&mut module);
        let f = &module.functions[0];
        let entry = f.find_block("entry").unwrap();
        // The invariant multiply moved to the preheader.
        assert!(
            entry
                .instructions
                .iter()
                .any(|i| i.op == Opcode::Mul)
        );
        let body = f.find_block("body").unwrap();
        assert!(!body.instructions.iter().any(|i| i.op == Opcode::Mul));
        assert!(
            !verify_module(&module).has_errors(),
            "{}",
            verify_module(&module).error_summary()
        );
        let _ = print_module(&module);
    }

    #[test]
    fn test_leaves_variant_instructions() {
        let original = "il 0.2.0\n\
             func @f() -> i64 {\n\
             entry:\n\
             \x20 br head(0)\n\
             head(%i: i64):\n\
             \x20 %c = scmp.lt %i, 10\n\
             \x20 cbr %c, body, done\n\
             body:\n\
             \x20 %i2 = add %i, 1\n\
             \x20 br head(%i2)\n\
             done:\n\
             \x20 ret %i\n\
             }\n";
        let mut module = parse_module(original).unwrap();
        run(&mut module);
        let body = module.functions[0].find_block("body").unwrap();
        assert!(body.instructions.iter().any(|i| i.op == Opcode::Add));
    }

    #[test]
    fn test_never_hoists_side_effects() {
        let mut module = parse_module(
            "il 0.2.0\n\
             extern @rt_print_i64(i64) -> void\n\
             func @f(%n: i64) -> i64 {\n\
             entry(%n: i64):\n\
             \x20 br head(0)\n\
             head(%i: i64):\n\
             \x20 %c = scmp.lt %i, 10\n\
             \x20 cbr %c, body, done\n\
             body:\n\
             \x20 call @rt_print_i64(%n)\n\
             \x20 %i2 = add %i, 1\n\
             \x20 br head(%i2)\n\
             done:\n\
             \x20 ret %i\n\
             }\n",
        )
        .unwrap();
        run(&mut module);
        let body = module.functions[0].find_block("body").unwrap();
        assert!(body.instructions.iter().any(|i| i.op == Opcode::Call));
    }
}
