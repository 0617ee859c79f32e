//! Textual IL writer
//!
//! Emits modules deterministically: lower-case opcode and type tokens,
//! shortest round-trip float literals, temp names where the function
//! recorded them (`t<id>` otherwise), `.loc` trivia in trailing-comment
//! form.

use crate::block::BasicBlock;
use crate::func::Function;
use crate::instr::{Instr, Opcode};
use crate::io::{default_result_type, escape_bytes};
use crate::module::Module;
use crate::types::Type;
use crate::value::{Value, format_float};
use std::fmt::Write as _;

fn temp_str(function: &Function, id: u32) -> String {
    match function.value_name(id) {
        Some(name) => format!("%{name}"),
        None => format!("%t{id}"),
    }
}

fn value_str(function: &Function, value: &Value) -> String {
    match value {
        Value::Temp(id) => temp_str(function, *id),
        Value::ConstInt { value, .. } => value.to_string(),
        Value::ConstFloat(v) => format_float(*v),
        Value::ConstStr(s) => format!("\"{}\"", escape_bytes(s.as_bytes())),
        Value::GlobalAddr(name) => format!("@{name}"),
        Value::NullPtr => "null".to_string(),
    }
}

fn args_str(function: &Function, args: &[Value]) -> String {
    args.iter()
        .map(|a| value_str(function, a))
        .collect::<Vec<_>>()
        .join(", ")
}

fn target_str(function: &Function, label: &str, args: &[Value]) -> String {
    if args.is_empty() {
        label.to_string()
    } else {
        format!("{label}({})", args_str(function, args))
    }
}

/// Render a single instruction without indentation or `.loc` trivia.
/// Shared with the verifier's diagnostic snippets.
pub fn instr_to_string(function: &Function, instr: &Instr) -> String {
    let mut out = String::new();
    if let Some(id) = instr.result {
        let _ = write!(out, "{} = ", temp_str(function, id));
    }
    match instr.op {
        Opcode::Call => {
            let callee = instr.callee.as_deref().unwrap_or("?");
            let _ = write!(out, "call @{callee}({})", args_str(function, &instr.operands));
        }
        Opcode::Load => {
            let _ = write!(
                out,
                "load {} {}",
                instr.ty,
                value_str(function, &instr.operands[0])
            );
        }
        Opcode::Store => {
            let _ = write!(
                out,
                "store {} {}, {}",
                instr.ty,
                value_str(function, &instr.operands[0]),
                value_str(function, &instr.operands[1])
            );
        }
        Opcode::Br => {
            let args: &[Value] = instr.br_args.first().map_or(&[], |a| a.as_slice());
            let _ = write!(out, "br {}", target_str(function, &instr.labels[0], args));
        }
        Opcode::CBr => {
            let t_args: &[Value] = instr.br_args.first().map_or(&[], |a| a.as_slice());
            let f_args: &[Value] = instr.br_args.get(1).map_or(&[], |a| a.as_slice());
            let _ = write!(
                out,
                "cbr {}, {}, {}",
                value_str(function, &instr.operands[0]),
                target_str(function, &instr.labels[0], t_args),
                target_str(function, &instr.labels[1], f_args)
            );
        }
        Opcode::SwitchI32 => {
            let default_args: &[Value] = instr.br_args.first().map_or(&[], |a| a.as_slice());
            let _ = write!(
                out,
                "switch.i32 {}, {}",
                value_str(function, &instr.operands[0]),
                target_str(function, &instr.labels[0], default_args)
            );
            // operands[1..] are the case constants, labels[1..] the targets.
            for (i, case) in instr.operands[1..].iter().enumerate() {
                let args: &[Value] = instr.br_args.get(i + 1).map_or(&[], |a| a.as_slice());
                let _ = write!(
                    out,
                    ", {}, {}",
                    value_str(function, case),
                    target_str(function, &instr.labels[i + 1], args)
                );
            }
        }
        Opcode::Ret => {
            out.push_str("ret");
            if let Some(v) = instr.operands.first() {
                let _ = write!(out, " {}", value_str(function, v));
            }
        }
        Opcode::Trap => {
            let kind = instr.trap_kind.unwrap_or(crate::instr::TrapKind::RuntimeError);
            let _ = write!(out, "trap {}", kind.token());
            if let Some(msg) = &instr.trap_msg {
                let _ = write!(out, " \"{}\"", escape_bytes(msg.as_bytes()));
            }
        }
        Opcode::EhPush => {
            let _ = write!(out, "eh.push {}", instr.labels[0]);
        }
        Opcode::EhPop => out.push_str("eh.pop"),
        Opcode::ResumeLabel => {
            let _ = write!(
                out,
                "resume.label {}, {}",
                value_str(function, &instr.operands[0]),
                instr.labels[0]
            );
        }
        _ => {
            out.push_str(instr.op.mnemonic());
            if instr.result.is_some() && instr.ty != default_result_type(instr.op) {
                let _ = write!(out, ".{}", instr.ty);
            }
            if !instr.operands.is_empty() {
                let _ = write!(out, " {}", args_str(function, &instr.operands));
            }
        }
    }
    out
}

fn write_block(out: &mut String, function: &Function, block: &BasicBlock) {
    if block.params.is_empty() {
        let _ = writeln!(out, "{}:", block.label);
    } else {
        let params = block
            .params
            .iter()
            .map(|p| format!("{}: {}", temp_str(function, p.id), p.ty))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(out, "{}({params}):", block.label);
    }
    for instr in &block.instructions {
        let text = instr_to_string(function, instr);
        if instr.loc.is_known() {
            let _ = writeln!(
                out,
                "  {text} ; .loc {} {} {}",
                instr.loc.file_id, instr.loc.line, instr.loc.col
            );
        } else {
            let _ = writeln!(out, "  {text}");
        }
    }
}

fn write_function(out: &mut String, function: &Function) {
    let params = function
        .params
        .iter()
        .enumerate()
        .map(|(i, p)| {
            // Entry params share ids 0..n with the function params.
            let name = function
                .value_name(i as u32)
                .map_or_else(|| format!("%t{i}"), |n| format!("%{n}"));
            format!("{name}: {}", p.ty)
        })
        .collect::<Vec<_>>()
        .join(", ");
    let _ = writeln!(out, "func @{}({params}) -> {} {{", function.name, function.ret);
    for block in &function.blocks {
        write_block(out, function, block);
    }
    let _ = writeln!(out, "}}");
}

/// Serialize a module to canonical text.
pub fn print_module(module: &Module) -> String {
    let mut out = String::new();
    let (maj, min, pat) = module.version;
    let _ = writeln!(out, "il {maj}.{min}.{pat}");
    if !module.externs.is_empty() {
        out.push('\n');
        for ext in &module.externs {
            let params = ext
                .params
                .iter()
                .map(Type::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(out, "extern @{}({params}) -> {}", ext.name, ext.ret);
        }
    }
    if !module.globals.is_empty() {
        out.push('\n');
        for global in &module.globals {
            let _ = writeln!(
                out,
                "global @{} = \"{}\"",
                global.name,
                escape_bytes(&global.bytes)
            );
        }
    }
    for function in &module.functions {
        out.push('\n');
        write_function(&mut out, function);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::IrBuilder;
    use crate::instr::TrapKind;

    #[test]
    fn test_print_simple_function() {
        let mut module = Module::new();
        let mut b = IrBuilder::new(&mut module);
        b.start_function("main", Type::I64, vec![]);
        b.add_block("entry");
        b.set_insert_point("entry");
        let sum = b.emit_bin(
            Opcode::Add,
            Type::I64,
            Value::const_int(1),
            Value::const_int(2),
        );
        b.emit_ret(Some(sum));

        let text = print_module(&module);
        assert!(text.starts_with("il 0.2.0\n"));
        assert!(text.contains("func @main() -> i64 {"));
        assert!(text.contains("entry:\n"));
        assert!(text.contains("%t0 = add 1, 2"));
        assert!(text.contains("ret %t0"));
    }

    #[test]
    fn test_trap_with_message() {
        let mut function = Function::new("f", Type::Void, vec![]);
        let instr = Instr {
            op: Opcode::Trap,
            trap_kind: Some(TrapKind::DomainError),
            trap_msg: Some("bad base".to_string()),
            ..Instr::default()
        };
        function.blocks.push(BasicBlock::new("entry"));
        assert_eq!(
            instr_to_string(&function, &instr),
            "trap domain_error \"bad base\""
        );
    }

    #[test]
    fn test_type_suffix_only_when_non_default() {
        let function = Function::new("f", Type::Void, vec![]);
        let default_add = Instr {
            result: Some(0),
            op: Opcode::Add,
            ty: Type::I64,
            operands: vec![Value::const_int(1), Value::const_int(2)],
            ..Instr::default()
        };
        assert_eq!(instr_to_string(&function, &default_add), "%t0 = add 1, 2");

        let narrow_add = Instr {
            ty: Type::I16,
            ..default_add
        };
        assert_eq!(instr_to_string(&function, &narrow_add), "%t0 = add.i16 1, 2");
    }
}
