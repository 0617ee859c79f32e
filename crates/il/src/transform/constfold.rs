//! Constant folding
//!
//! Folds pure instructions whose operands are all literals, plus calls to
//! a short list of runtime helpers known to be pure (`rt_abs_i64`,
//! `rt_len` on literal strings). Checked arithmetic folds only when it
//! provably does not trap; a folding that would trap is left for the VM.

use crate::func::Function;
use crate::instr::{Instr, Opcode};
use crate::module::Module;
use crate::value::Value;

pub fn run(module: &mut Module) {
    for function in &mut module.functions {
        while fold_one(function) {}
    }
}

fn fold_one(function: &mut Function) -> bool {
    for block_idx in 0..function.blocks.len() {
        for instr_idx in 0..function.blocks[block_idx].instructions.len() {
            let instr = &function.blocks[block_idx].instructions[instr_idx];
            let Some(result) = instr.result else { continue };
            let Some(folded) = fold_instr(instr) else {
                continue;
            };
            function.blocks[block_idx].instructions.remove(instr_idx);
            function.replace_all_uses(result, &folded);
            return true;
        }
    }
    false
}

fn int_operands(instr: &Instr) -> Option<(i64, i64)> {
    match instr.operands.as_slice() {
        [a, b] => Some((a.as_const_int()?, b.as_const_int()?)),
        _ => None,
    }
}

fn float_operands(instr: &Instr) -> Option<(f64, f64)> {
    match instr.operands.as_slice() {
        [a, b] => Some((a.as_const_float()?, b.as_const_float()?)),
        _ => None,
    }
}

fn fold_instr(instr: &Instr) -> Option<Value> {
    match instr.op {
        Opcode::Add => int_operands(instr).map(|(a, b)| Value::const_int(a.wrapping_add(b))),
        Opcode::Sub => int_operands(instr).map(|(a, b)| Value::const_int(a.wrapping_sub(b))),
        Opcode::Mul => int_operands(instr).map(|(a, b)| Value::const_int(a.wrapping_mul(b))),
        Opcode::IAddOvf => {
            let (a, b) = int_operands(instr)?;
            a.checked_add(b).map(Value::const_int)
        }
        Opcode::ISubOvf => {
            let (a, b) = int_operands(instr)?;
            a.checked_sub(b).map(Value::const_int)
        }
        Opcode::IMulOvf => {
            let (a, b) = int_operands(instr)?;
            a.checked_mul(b).map(Value::const_int)
        }
        Opcode::SDivChk0 => {
            let (a, b) = int_operands(instr)?;
            a.checked_div(b).map(Value::const_int)
        }
        Opcode::SRemChk0 => {
            let (a, b) = int_operands(instr)?;
            a.checked_rem(b).map(Value::const_int)
        }
        Opcode::UDivChk0 => {
            let (a, b) = int_operands(instr)?;
            if b == 0 {
                None
            } else {
                Some(Value::const_int(((a as u64) / (b as u64)) as i64))
            }
        }
        Opcode::URemChk0 => {
            let (a, b) = int_operands(instr)?;
            if b == 0 {
                None
            } else {
                Some(Value::const_int(((a as u64) % (b as u64)) as i64))
            }
        }
        Opcode::And => int_operands(instr).map(|(a, b)| Value::const_int(a & b)),
        Opcode::Or => int_operands(instr).map(|(a, b)| Value::const_int(a | b)),
        Opcode::Xor => int_operands(instr).map(|(a, b)| Value::const_int(a ^ b)),
        Opcode::Shl => {
            int_operands(instr).map(|(a, b)| Value::const_int(a.wrapping_shl(b as u32 & 63)))
        }
        Opcode::Shr => {
            int_operands(instr).map(|(a, b)| Value::const_int(a.wrapping_shr(b as u32 & 63)))
        }
        Opcode::FAdd => float_operands(instr).map(|(a, b)| Value::const_float(a + b)),
        Opcode::FSub => float_operands(instr).map(|(a, b)| Value::const_float(a - b)),
        Opcode::FMul => float_operands(instr).map(|(a, b)| Value::const_float(a * b)),
        Opcode::FDiv => float_operands(instr).map(|(a, b)| Value::const_float(a / b)),
        Opcode::ICmpEq => int_operands(instr).map(|(a, b)| Value::const_bool(a == b)),
        Opcode::ICmpNe => int_operands(instr).map(|(a, b)| Value::const_bool(a != b)),
        Opcode::SCmpLt => int_operands(instr).map(|(a, b)| Value::const_bool(a < b)),
        Opcode::SCmpLe => int_operands(instr).map(|(a, b)| Value::const_bool(a <= b)),
        Opcode::SCmpGt => int_operands(instr).map(|(a, b)| Value::const_bool(a > b)),
        Opcode::SCmpGe => int_operands(instr).map(|(a, b)| Value::const_bool(a >= b)),
        Opcode::UCmpLt => {
            int_operands(instr).map(|(a, b)| Value::const_bool((a as u64) < (b as u64)))
        }
        Opcode::UCmpLe => {
            int_operands(instr).map(|(a, b)| Value::const_bool((a as u64) <= (b as u64)))
        }
        Opcode::UCmpGt => {
            int_operands(instr).map(|(a, b)| Value::const_bool((a as u64) > (b as u64)))
        }
        Opcode::UCmpGe => {
            int_operands(instr).map(|(a, b)| Value::const_bool((a as u64) >= (b as u64)))
        }
        Opcode::FCmpEq => float_operands(instr).map(|(a, b)| Value::const_bool(a == b)),
        Opcode::FCmpNe => float_operands(instr).map(|(a, b)| Value::const_bool(a != b)),
        Opcode::FCmpLt => float_operands(instr).map(|(a, b)| Value::const_bool(a < b)),
        Opcode::FCmpLe => float_operands(instr).map(|(a, b)| Value::const_bool(a <= b)),
        Opcode::FCmpGt => float_operands(instr).map(|(a, b)| Value::const_bool(a > b)),
        Opcode::FCmpGe => float_operands(instr).map(|(a, b)| Value::const_bool(a >= b)),
        Opcode::Sitofp => instr.operands[0]
            .as_const_int()
            .map(|a| Value::const_float(a as f64)),
        Opcode::Fptosi => {
            let f = instr.operands[0].as_const_float()?;
            if f.is_finite() && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                Some(Value::const_int(f.trunc() as i64))
            } else {
                None
            }
        }
        Opcode::Trunc1 => instr.operands[0]
            .as_const_int()
            .map(|a| Value::const_bool(a & 1 != 0)),
        Opcode::Zext1 => instr.operands[0]
            .as_const_int()
            .map(|a| Value::const_int(a & 1)),
        Opcode::ConstI64 => instr.operands[0].as_const_int().map(Value::const_int),
        Opcode::Call => fold_pure_call(instr),
        _ => None,
    }
}

/// Runtime helpers safe to evaluate at compile time.
fn fold_pure_call(instr: &Instr) -> Option<Value> {
    match instr.callee.as_deref()? {
        "rt_abs_i64" => {
            let a = instr.operands.first()?.as_const_int()?;
            a.checked_abs().map(Value::const_int)
        }
        "rt_len" => match instr.operands.first()? {
            Value::ConstStr(s) => Some(Value::const_int(s.len() as i64)),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{parse_module, print_module};

    #[test]
    fn test_folds_arithmetic_chain() {
        let mut module = parse_module(
            "il 0.2.0\n\
             func @main() -> i64 {\n\
             entry:\n\
             \x20 %a = add 2, 3\n\
             \x20 %b = mul %a, 4\n\
             \x20 ret %b\n\
             }\n",
        )
        .unwrap();
        run(&mut module);
        assert!(print_module(&module).contains("ret 20"));
    }

    #[test]
    fn test_folds_known_runtime_helper() {
        let mut module = parse_module(
            "il 0.2.0\n\
             extern @rt_abs_i64(i64) -> i64\n\
             func @main() -> i64 {\n\
             \x20entry:\n\
             \x20 %abs = call @rt_abs_i64(-5)\n\
             \x20 ret %abs\n\
             }\n",
        )
        .unwrap();
        run(&mut module);
        let text = print_module(&module);
        assert!(!text.contains("call @rt_abs_i64"));
        assert!(text.contains("ret 5"));
    }

    #[test]
    fn test_leaves_trapping_fold_alone() {
        let mut module = parse_module(
            "il 0.2.0\n\
             func @main() -> i64 {\n\
             entry:\n\
             \x20 %q = sdiv.chk0 5, 0\n\
             \x20 ret %q\n\
             }\n",
        )
        .unwrap();
        run(&mut module);
        assert!(print_module(&module).contains("sdiv.chk0"));
    }

    #[test]
    fn test_wrapping_and_checked_differ() {
        let mut module = parse_module(&format!(
            "il 0.2.0\n\
             func @main() -> i64 {{\n\
             entry:\n\
             \x20 %w = add {}, 1\n\
             \x20 %c = iadd.ovf {}, 1\n\
             \x20 ret %w\n\
             }}\n",
            i64::MAX,
            i64::MAX
        ))
        .unwrap();
        run(&mut module);
        let text = print_module(&module);
        // The wrapping add folds to INT64_MIN; the checked one stays.
        assert!(text.contains(&format!("ret {}", i64::MIN)));
        assert!(text.contains("iadd.ovf"));
    }
}
