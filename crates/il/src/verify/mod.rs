//! IL verifier
//!
//! One traversal per function checking block invariants, SSA form,
//! table-driven typing, and control-flow integrity. Verification is
//! idempotent and never mutates the module; findings accumulate in a
//! [`DiagSink`] the caller drains.

pub mod diag;

pub use diag::{Diag, DiagSink, Severity, format_block_diag, format_instr_diag};

use crate::analysis::{DomTree, FuncCfg};
use crate::block::BasicBlock;
use crate::func::Function;
use crate::instr::{Instr, Opcode};
use crate::module::Module;
use crate::types::Type;
use crate::value::Value;
use std::collections::HashMap;

/// Verify a whole module, returning the accumulated diagnostics.
pub fn verify_module(module: &Module) -> DiagSink {
    let mut sink = DiagSink::new();

    let mut externs: HashMap<&str, (&Type, &[Type])> = HashMap::new();
    for ext in &module.externs {
        if externs
            .insert(ext.name.as_str(), (&ext.ret, ext.params.as_slice()))
            .is_some()
        {
            sink.error(format!("duplicate extern '@{}'", ext.name));
        }
    }
    let mut functions: HashMap<&str, &Function> = HashMap::new();
    for function in &module.functions {
        if functions.insert(function.name.as_str(), function).is_some() {
            sink.error(format!("duplicate function '@{}'", function.name));
        }
    }

    for function in &module.functions {
        verify_function(function, &externs, &functions, &mut sink);
    }
    sink
}

/// Convenience wrapper: `Err` with a joined summary when any error was
/// reported.
pub fn verify_module_ok(module: &Module) -> Result<(), String> {
    let sink = verify_module(module);
    if sink.has_errors() {
        Err(sink.error_summary())
    } else {
        Ok(())
    }
}

/// Where a temp is defined: a block parameter (`order == -1`) or the
/// instruction at `order` within `block`.
#[derive(Clone, Copy)]
struct DefSite {
    block: usize,
    order: isize,
    ty: Type,
    def_op: Option<Opcode>,
}

fn verify_function(
    function: &Function,
    externs: &HashMap<&str, (&Type, &[Type])>,
    functions: &HashMap<&str, &Function>,
    sink: &mut DiagSink,
) {
    if function.blocks.is_empty() {
        sink.error(format!("function '{}': has no blocks", function.name));
        return;
    }

    // Block invariants: unique labels, terminated, terminator placement.
    let mut labels: HashMap<&str, usize> = HashMap::new();
    for (i, block) in function.blocks.iter().enumerate() {
        if labels.insert(block.label.as_str(), i).is_some() {
            sink.error(format_block_diag(function, block, "duplicate block label"));
        }
        match block.instructions.last() {
            Some(last) if last.is_terminator() => {}
            _ => sink.error(format_block_diag(
                function,
                block,
                "block is not terminated",
            )),
        }
        if !block.terminated && block.terminator().is_some() {
            sink.error(format_block_diag(
                function,
                block,
                "terminated flag not set on terminated block",
            ));
        }
        for instr in block.instructions.iter().rev().skip(1) {
            if instr.is_terminator() {
                sink.error(format_instr_diag(
                    function,
                    block,
                    instr,
                    "terminator in the middle of a block",
                ));
            }
        }
    }

    // SSA: single definition per temp; collect def sites and types.
    let mut defs: HashMap<u32, DefSite> = HashMap::new();
    for (b, block) in function.blocks.iter().enumerate() {
        for param in &block.params {
            if defs
                .insert(
                    param.id,
                    DefSite {
                        block: b,
                        order: -1,
                        ty: param.ty,
                        def_op: None,
                    },
                )
                .is_some()
            {
                sink.error(format_block_diag(
                    function,
                    block,
                    &format!("temp %{} defined more than once", param.id),
                ));
            }
        }
        for (i, instr) in block.instructions.iter().enumerate() {
            if let Some(id) = instr.result
                && defs
                    .insert(
                        id,
                        DefSite {
                            block: b,
                            order: i as isize,
                            ty: instr.ty,
                            def_op: Some(instr.op),
                        },
                    )
                    .is_some()
            {
                sink.error(format_instr_diag(
                    function,
                    block,
                    instr,
                    &format!("temp %{id} defined more than once"),
                ));
            }
        }
    }

    let cfg = FuncCfg::build(function);
    let dom = DomTree::compute(&cfg);

    // Successor resolution and unreachable-block warnings.
    for (b, block) in function.blocks.iter().enumerate() {
        if let Some(term) = block.terminator() {
            for label in &term.labels {
                if !labels.contains_key(label.as_str()) {
                    sink.error(format_instr_diag(
                        function,
                        block,
                        term,
                        &format!("unknown successor label '{label}'"),
                    ));
                }
            }
        }
        // Non-terminator label references (eh.push) must also resolve.
        for instr in &block.instructions {
            if instr.op == Opcode::EhPush
                && let Some(label) = instr.labels.first()
                && !labels.contains_key(label.as_str())
            {
                sink.error(format_instr_diag(
                    function,
                    block,
                    instr,
                    &format!("unknown handler label '{label}'"),
                ));
            }
        }
        if b != 0 && !dom.is_reachable(b) {
            sink.warning(format_block_diag(function, block, "block is unreachable"));
        }
    }

    // Per-instruction checks: dominance of uses, typing, signatures,
    // branch argument compatibility.
    let ctx = TypeCtx {
        function,
        externs,
        functions,
        defs: &defs,
        labels: &labels,
    };
    for (b, block) in function.blocks.iter().enumerate() {
        if b != 0 && !dom.is_reachable(b) {
            continue;
        }
        for (i, instr) in block.instructions.iter().enumerate() {
            check_dominance(&ctx, &dom, b, i, block, instr, sink);
            check_instr(&ctx, b, block, instr, sink);
        }
    }
}

struct TypeCtx<'a> {
    function: &'a Function,
    externs: &'a HashMap<&'a str, (&'a Type, &'a [Type])>,
    functions: &'a HashMap<&'a str, &'a Function>,
    defs: &'a HashMap<u32, DefSite>,
    labels: &'a HashMap<&'a str, usize>,
}

impl TypeCtx<'_> {
    /// Static type of a value, when determinable. Integer literals are
    /// polymorphic over the integer family, float literals over the
    /// float family.
    fn value_type(&self, value: &Value) -> ValType {
        match value {
            Value::Temp(id) => match self.defs.get(id) {
                Some(site) => ValType::Exact(site.ty),
                None => ValType::Unknown,
            },
            Value::ConstInt { is_bool: true, .. } => ValType::Exact(Type::I1),
            Value::ConstInt { .. } => ValType::IntLit,
            Value::ConstFloat(_) => ValType::FloatLit,
            Value::ConstStr(_) => ValType::Exact(Type::Str),
            Value::GlobalAddr(_) | Value::NullPtr => ValType::Exact(Type::Ptr),
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum ValType {
    Exact(Type),
    IntLit,
    FloatLit,
    Unknown,
}

fn compatible(actual: ValType, expected: Type) -> bool {
    match actual {
        ValType::Exact(ty) => ty == expected,
        ValType::IntLit => expected.is_integer(),
        ValType::FloatLit => expected.is_float(),
        ValType::Unknown => true,
    }
}

/// Memory addresses may be `ptr` values or machine-word integers
/// (pointer offset arithmetic happens in the integer domain).
fn address_compatible(actual: ValType) -> bool {
    match actual {
        ValType::Exact(ty) => ty == Type::Ptr || ty == Type::I64,
        ValType::IntLit | ValType::Unknown => true,
        ValType::FloatLit => false,
    }
}

fn check_dominance(
    ctx: &TypeCtx<'_>,
    dom: &DomTree,
    block_idx: usize,
    instr_idx: usize,
    block: &BasicBlock,
    instr: &Instr,
    sink: &mut DiagSink,
) {
    for value in instr.all_uses() {
        let Some(id) = value.as_temp() else { continue };
        let Some(site) = ctx.defs.get(&id) else {
            sink.error(format_instr_diag(
                ctx.function,
                block,
                instr,
                &format!("use of undefined temp %{id}"),
            ));
            continue;
        };
        let dominated = if site.block == block_idx {
            site.order < instr_idx as isize
        } else {
            dom.dominates(site.block, block_idx)
        };
        if !dominated {
            sink.error(format_instr_diag(
                ctx.function,
                block,
                instr,
                &format!("use of %{id} is not dominated by its definition"),
            ));
        }
    }
}

fn check_branch_args(
    ctx: &TypeCtx<'_>,
    block: &BasicBlock,
    instr: &Instr,
    sink: &mut DiagSink,
) {
    for (i, label) in instr.labels.iter().enumerate() {
        let Some(&target_idx) = ctx.labels.get(label.as_str()) else {
            continue; // already reported as unknown label
        };
        let target = &ctx.function.blocks[target_idx];
        let args: &[Value] = instr.br_args.get(i).map_or(&[], |a| a.as_slice());
        if args.len() != target.params.len() {
            sink.error(format_instr_diag(
                ctx.function,
                block,
                instr,
                &format!(
                    "branch argument count mismatch targeting '{label}': expected {}, got {}",
                    target.params.len(),
                    args.len()
                ),
            ));
            continue;
        }
        for (arg, param) in args.iter().zip(&target.params) {
            if !compatible(ctx.value_type(arg), param.ty) {
                sink.error(format_instr_diag(
                    ctx.function,
                    block,
                    instr,
                    &format!(
                        "branch argument for '%{}' of '{label}' has wrong type (expected {})",
                        param.name, param.ty
                    ),
                ));
            }
        }
    }
}

fn expect_operands(
    ctx: &TypeCtx<'_>,
    block: &BasicBlock,
    instr: &Instr,
    count: usize,
    sink: &mut DiagSink,
) -> bool {
    if instr.operands.len() != count {
        sink.error(format_instr_diag(
            ctx.function,
            block,
            instr,
            &format!("expected {count} operand(s), got {}", instr.operands.len()),
        ));
        false
    } else {
        true
    }
}

fn check_instr(
    ctx: &TypeCtx<'_>,
    _block_idx: usize,
    block: &BasicBlock,
    instr: &Instr,
    sink: &mut DiagSink,
) {
    let type_error = |sink: &mut DiagSink, what: &str| {
        sink.error(format_instr_diag(ctx.function, block, instr, what));
    };

    match instr.op {
        Opcode::ConstI64 => {
            if expect_operands(ctx, block, instr, 1, sink)
                && !compatible(ctx.value_type(&instr.operands[0]), Type::I64)
            {
                type_error(sink, "const.i64 operand must be an integer literal");
            }
        }
        Opcode::ConstF64 => {
            if expect_operands(ctx, block, instr, 1, sink) {
                // Accepts a float literal or raw i64 bits.
                let ok = matches!(
                    ctx.value_type(&instr.operands[0]),
                    ValType::FloatLit | ValType::IntLit
                );
                if !ok {
                    type_error(sink, "const.f64 operand must be a literal");
                }
            }
        }
        Opcode::ConstStr => {
            if expect_operands(ctx, block, instr, 1, sink) {
                let ok = matches!(
                    instr.operands[0],
                    Value::ConstStr(_) | Value::GlobalAddr(_)
                );
                if !ok {
                    type_error(sink, "const.str operand must be a string or global");
                }
            }
        }
        Opcode::NullPtr => {
            let _ = expect_operands(ctx, block, instr, 0, sink);
        }
        Opcode::Add
        | Opcode::Sub
        | Opcode::Mul
        | Opcode::IAddOvf
        | Opcode::ISubOvf
        | Opcode::IMulOvf
        | Opcode::SDivChk0
        | Opcode::UDivChk0
        | Opcode::SRemChk0
        | Opcode::URemChk0
        | Opcode::And
        | Opcode::Or
        | Opcode::Xor
        | Opcode::Shl
        | Opcode::Shr => {
            if expect_operands(ctx, block, instr, 2, sink) {
                // `add`/`sub` double as pointer offset arithmetic.
                let ptr_ok = matches!(instr.op, Opcode::Add | Opcode::Sub);
                for operand in &instr.operands {
                    let actual = ctx.value_type(operand);
                    let fits = compatible(actual, instr.ty)
                        || (ptr_ok && actual == ValType::Exact(Type::Ptr));
                    if !fits {
                        type_error(sink, "integer operand type mismatch");
                    }
                }
                if !instr.ty.is_integer() {
                    type_error(sink, "result type must be integer");
                }
            }
        }
        Opcode::CastSiNarrowChk => {
            if expect_operands(ctx, block, instr, 1, sink) {
                let int_in = match ctx.value_type(&instr.operands[0]) {
                    ValType::Exact(ty) => ty.is_integer(),
                    ValType::IntLit => true,
                    ValType::Unknown => true,
                    ValType::FloatLit => false,
                };
                if !int_in || !instr.ty.is_integer() {
                    type_error(sink, "narrowing cast requires integer operand and result");
                }
            }
        }
        Opcode::FAdd | Opcode::FSub | Opcode::FMul | Opcode::FDiv => {
            if expect_operands(ctx, block, instr, 2, sink) {
                for operand in &instr.operands {
                    if !compatible(ctx.value_type(operand), instr.ty) {
                        type_error(sink, "float operand type mismatch");
                    }
                }
                if !instr.ty.is_float() {
                    type_error(sink, "result type must be float");
                }
            }
        }
        Opcode::Sitofp => {
            if expect_operands(ctx, block, instr, 1, sink) {
                let ok = match ctx.value_type(&instr.operands[0]) {
                    ValType::Exact(ty) => ty.is_integer(),
                    ValType::IntLit | ValType::Unknown => true,
                    ValType::FloatLit => false,
                };
                if !ok || !instr.ty.is_float() {
                    type_error(sink, "sitofp converts integer to float");
                }
            }
        }
        Opcode::Fptosi => {
            if expect_operands(ctx, block, instr, 1, sink) {
                let ok = match ctx.value_type(&instr.operands[0]) {
                    ValType::Exact(ty) => ty.is_float(),
                    ValType::FloatLit | ValType::Unknown => true,
                    ValType::IntLit => false,
                };
                if !ok || !instr.ty.is_integer() {
                    type_error(sink, "fptosi converts float to integer");
                }
            }
        }
        Opcode::Trunc1 => {
            if expect_operands(ctx, block, instr, 1, sink) && instr.ty != Type::I1 {
                type_error(sink, "trunc1 result must be i1");
            }
        }
        Opcode::Zext1 => {
            if expect_operands(ctx, block, instr, 1, sink) {
                if !compatible(ctx.value_type(&instr.operands[0]), Type::I1) {
                    type_error(sink, "zext1 operand must be i1");
                }
                if !instr.ty.is_integer() {
                    type_error(sink, "zext1 result must be integer");
                }
            }
        }
        Opcode::ICmpEq
        | Opcode::ICmpNe
        | Opcode::SCmpLt
        | Opcode::SCmpLe
        | Opcode::SCmpGt
        | Opcode::SCmpGe
        | Opcode::UCmpLt
        | Opcode::UCmpLe
        | Opcode::UCmpGt
        | Opcode::UCmpGe => {
            if expect_operands(ctx, block, instr, 2, sink) {
                for operand in &instr.operands {
                    let ok = match ctx.value_type(operand) {
                        ValType::Exact(ty) => ty.is_integer() || ty == Type::Ptr,
                        ValType::IntLit | ValType::Unknown => true,
                        ValType::FloatLit => false,
                    };
                    if !ok {
                        type_error(sink, "integer comparison operand must be integer");
                    }
                }
                if instr.ty != Type::I1 {
                    type_error(sink, "comparison result must be i1");
                }
            }
        }
        Opcode::FCmpEq
        | Opcode::FCmpNe
        | Opcode::FCmpLt
        | Opcode::FCmpLe
        | Opcode::FCmpGt
        | Opcode::FCmpGe => {
            if expect_operands(ctx, block, instr, 2, sink) {
                for operand in &instr.operands {
                    let ok = match ctx.value_type(operand) {
                        ValType::Exact(ty) => ty.is_float(),
                        ValType::FloatLit | ValType::Unknown => true,
                        ValType::IntLit => false,
                    };
                    if !ok {
                        type_error(sink, "float comparison operand must be float");
                    }
                }
                if instr.ty != Type::I1 {
                    type_error(sink, "comparison result must be i1");
                }
            }
        }
        Opcode::Alloca => {
            if expect_operands(ctx, block, instr, 1, sink) {
                if !compatible(ctx.value_type(&instr.operands[0]), Type::I64) {
                    type_error(sink, "alloca size must be integer");
                }
                if instr.ty != Type::Ptr {
                    type_error(sink, "alloca result must be ptr");
                }
            }
        }
        Opcode::Load => {
            if expect_operands(ctx, block, instr, 1, sink) {
                if !address_compatible(ctx.value_type(&instr.operands[0])) {
                    type_error(sink, "load address must be ptr");
                }
                if instr.ty == Type::Void {
                    type_error(sink, "load requires a value type");
                }
            }
        }
        Opcode::Store => {
            if expect_operands(ctx, block, instr, 2, sink) {
                if !address_compatible(ctx.value_type(&instr.operands[0])) {
                    type_error(sink, "store address must be ptr");
                }
                if !compatible(ctx.value_type(&instr.operands[1]), instr.ty) {
                    type_error(sink, "stored value does not match the access type");
                }
            }
        }
        Opcode::AddrOf => {
            if expect_operands(ctx, block, instr, 1, sink) {
                let ok = instr.operands[0]
                    .as_temp()
                    .and_then(|id| ctx.defs.get(&id))
                    .is_some_and(|site| site.def_op == Some(Opcode::Alloca));
                if !ok {
                    type_error(sink, "addrof operand must be an alloca result");
                }
                if instr.ty != Type::Ptr {
                    type_error(sink, "addrof result must be ptr");
                }
            }
        }
        Opcode::Br => {
            if instr.labels.len() != 1 {
                type_error(sink, "br requires exactly one target");
            }
            check_branch_args(ctx, block, instr, sink);
        }
        Opcode::CBr => {
            if expect_operands(ctx, block, instr, 1, sink)
                && !compatible(ctx.value_type(&instr.operands[0]), Type::I1)
            {
                type_error(sink, "cbr condition must be i1");
            }
            if instr.labels.len() != 2 {
                type_error(sink, "cbr requires two targets");
            }
            check_branch_args(ctx, block, instr, sink);
        }
        Opcode::SwitchI32 => {
            if instr.operands.is_empty() {
                type_error(sink, "switch.i32 requires a scrutinee");
            } else {
                if !compatible(ctx.value_type(&instr.operands[0]), Type::I32)
                    && !compatible(ctx.value_type(&instr.operands[0]), Type::I64)
                {
                    type_error(sink, "switch.i32 scrutinee must be integer");
                }
                for case in &instr.operands[1..] {
                    if case.as_const_int().is_none() {
                        type_error(sink, "switch.i32 case labels must be integer constants");
                    }
                }
                if instr.labels.len() != instr.operands.len() {
                    type_error(sink, "switch.i32 case/target count mismatch");
                }
            }
            check_branch_args(ctx, block, instr, sink);
        }
        Opcode::Ret => {
            let ret = ctx.function.ret;
            match (ret, instr.operands.first()) {
                (Type::Void, None) => {}
                (Type::Void, Some(_)) => {
                    type_error(sink, "void function cannot return a value")
                }
                (_, None) => type_error(sink, "missing return value"),
                (_, Some(value)) => {
                    if !compatible(ctx.value_type(value), ret) {
                        type_error(sink, "return value type mismatch");
                    }
                }
            }
        }
        Opcode::Trap => {
            if instr.trap_kind.is_none() {
                type_error(sink, "trap requires a kind");
            }
        }
        Opcode::Call => {
            let Some(callee) = instr.callee.as_deref() else {
                type_error(sink, "call without callee");
                return;
            };
            let sig: Option<(Type, Vec<Type>)> = ctx
                .externs
                .get(callee)
                .map(|(ret, params)| (**ret, params.to_vec()))
                .or_else(|| {
                    ctx.functions.get(callee).map(|f| {
                        (f.ret, f.params.iter().map(|p| p.ty).collect::<Vec<_>>())
                    })
                });
            let Some((ret, params)) = sig else {
                type_error(sink, &format!("call to unknown symbol '@{callee}'"));
                return;
            };
            if instr.operands.len() != params.len() {
                type_error(
                    sink,
                    &format!(
                        "argument count mismatch for function {callee}: expected {} {}, received {}",
                        params.len(),
                        if params.len() == 1 { "argument" } else { "arguments" },
                        instr.operands.len()
                    ),
                );
            } else {
                for (arg, param_ty) in instr.operands.iter().zip(&params) {
                    if !compatible(ctx.value_type(arg), *param_ty) {
                        type_error(sink, &format!("call argument type mismatch (expected {param_ty})"));
                    }
                }
            }
            if ret == Type::Void && instr.result.is_some() {
                type_error(sink, "void call cannot produce a result");
            }
        }
        Opcode::EhPush => {
            if instr.labels.len() != 1 {
                type_error(sink, "eh.push requires a handler label");
            }
        }
        Opcode::EhPop => {}
        Opcode::ResumeSame | Opcode::ResumeNext => {
            if expect_operands(ctx, block, instr, 1, sink)
                && !compatible(ctx.value_type(&instr.operands[0]), Type::ResumeTok)
            {
                type_error(sink, "resume token operand must be resume_tok");
            }
        }
        Opcode::ResumeLabel => {
            if expect_operands(ctx, block, instr, 1, sink)
                && !compatible(ctx.value_type(&instr.operands[0]), Type::ResumeTok)
            {
                type_error(sink, "resume token operand must be resume_tok");
            }
            if instr.labels.len() != 1 {
                type_error(sink, "resume.label requires a target label");
            }
        }
    }
}
