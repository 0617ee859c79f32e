//! Scan-then-emit lowering to Viper IL
//!
//! The scan pass walks the AST without emitting IL: it classifies
//! expression types over the numeric promotion lattice and records
//! every runtime helper the program will need, so the emit pass can
//! declare all externs up front and never retrofit declarations.
//!
//! The emit pass lowers procedures one at a time with deterministic
//! naming: `%t0, %t1, ...` temps from the mangler, per-shape block
//! labels from the `BlockNamer`, and one `L<line>_<proc>` block per
//! numbered source line so GOTO/GOSUB/ON ERROR targets resolve.

pub mod expr;
pub mod scan;
pub mod stmt;

use crate::ast::{ProcKind, Procedure, Program, Stmt};
use crate::builtins;
use crate::mangler::{BlockNamer, NameMangler};
use crate::scope::ScopeTracker;
use std::collections::{BTreeSet, HashMap};
use viper_il::{FuncParam, IrBuilder, Module, Opcode, SourceLoc, Type, Value};

/// Stack depth of the per-procedure GOSUB return-site array.
pub(crate) const GOSUB_STACK_DEPTH: i64 = 256;

/// Semantic classification of a BASIC expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprType {
    Integer,
    Long,
    Single,
    Double,
    Boolean,
    Str,
}

impl ExprType {
    pub fn is_numeric(self) -> bool {
        !matches!(self, ExprType::Str)
    }

    pub fn is_integral(self) -> bool {
        matches!(self, ExprType::Integer | ExprType::Long | ExprType::Boolean)
    }

    pub fn is_float(self) -> bool {
        matches!(self, ExprType::Single | ExprType::Double)
    }

    /// IL type of a computed value of this classification.
    pub fn value_type(self) -> Type {
        match self {
            ExprType::Boolean => Type::I1,
            ExprType::Integer | ExprType::Long => Type::I64,
            ExprType::Single | ExprType::Double => Type::F64,
            ExprType::Str => Type::Str,
        }
    }

    /// IL type of a variable cell holding this classification.
    /// Booleans widen to i64 in memory.
    pub fn storage_type(self) -> Type {
        match self {
            ExprType::Boolean | ExprType::Integer | ExprType::Long => Type::I64,
            ExprType::Single | ExprType::Double => Type::F64,
            ExprType::Str => Type::Str,
        }
    }
}

/// Variable type implied by a canonical name's suffix.
pub(crate) fn suffix_type(name: &str) -> ExprType {
    match name.chars().last() {
        Some('%') => ExprType::Integer,
        Some('&') => ExprType::Long,
        Some('!') => ExprType::Single,
        Some('#') => ExprType::Double,
        Some('$') => ExprType::Str,
        _ => ExprType::Double,
    }
}

/// IL symbol for a BASIC procedure name: suffix stripped, lower-cased.
pub(crate) fn proc_symbol(name: &str) -> String {
    name.trim_end_matches(['%', '&', '!', '#', '$']).to_lowercase()
}

#[derive(Debug, Clone)]
pub(crate) struct ProcSig {
    pub symbol: String,
    pub kind: ProcKind,
    pub params: Vec<ExprType>,
    pub ret: ExprType,
}

/// A variable's alloca cell.
#[derive(Debug, Clone)]
pub(crate) struct VarCell {
    pub cell: Value,
    pub ty: ExprType,
}

pub(crate) struct GosubCells {
    pub sp_cell: Value,
    pub arr_cell: Value,
}

/// Cells the synthesized error handler writes and RESUME reads.
pub(crate) struct EhCells {
    pub err_cell: Value,
    pub tok_cell: Value,
}

pub(crate) struct Lowerer {
    /// Runtime helpers collected by the scan pass, sorted for stable
    /// extern ordering.
    pub(crate) helpers: BTreeSet<&'static str>,
    /// CONST name -> literal value expression.
    pub(crate) consts: HashMap<String, crate::ast::Expr>,
    pub(crate) proc_sigs: HashMap<String, ProcSig>,
    /// Variable classifications for the procedure being lowered.
    pub(crate) var_types: HashMap<String, ExprType>,
    pub(crate) errors: Vec<String>,
}

/// Emission state for one procedure.
pub(crate) struct EmitCtx<'m> {
    pub builder: IrBuilder<'m>,
    pub namer: BlockNamer,
    pub mangler: NameMangler,
    pub scopes: ScopeTracker,
    pub vars: HashMap<String, VarCell>,
    pub line_blocks: HashMap<u32, String>,
    /// Function return-value cell, when lowering a FUNCTION.
    pub ret_cell: Option<VarCell>,
    /// Canonical name of the FUNCTION (assignments to it set the return).
    pub func_name: Option<String>,
    pub exit_label: String,
    pub gosub: Option<GosubCells>,
    /// Labels of the blocks GOSUB returns to, indexed by site id.
    pub gosub_sites: Vec<String>,
    pub gosub_dispatch: Option<String>,
    /// Shared GOSUB depth-overflow trap block.
    pub gosub_overflow: Option<String>,
    pub eh: Option<EhCells>,
    /// Source line -> synthesized handler block label.
    pub handlers: HashMap<u32, String>,
}

impl EmitCtx<'_> {
    /// Name the result temp of the newest emitted instruction in the
    /// mangler's `t<N>` scheme.
    pub fn name_result(&mut self, value: &Value) {
        if let Some(id) = value.as_temp() {
            let name = self.mangler.next_temp();
            self.set_temp_name(id, name);
        }
    }

    fn set_temp_name(&mut self, id: u32, name: String) {
        // The builder exposes the module; write the name through it.
        let fname = self.builder.current_function().name.clone();
        if let Some(function) = self.builder.module().find_function_mut(&fname) {
            function.set_value_name(id, name);
        }
    }

    /// Terminate the current block with a branch if it is still open.
    pub fn seal_with_br(&mut self, target: &str) {
        if !self.builder.block_terminated() {
            self.builder.emit_br(target, vec![]);
        }
    }
}

/// Lower a parsed program to an IL module.
pub fn compile_program(program: &Program) -> Result<Module, String> {
    let mut lowerer = Lowerer {
        helpers: BTreeSet::new(),
        consts: HashMap::new(),
        proc_sigs: HashMap::new(),
        var_types: HashMap::new(),
        errors: Vec::new(),
    };

    // Scan: signatures first so call classification works everywhere.
    for proc in &program.procs {
        let sig = ProcSig {
            symbol: proc_symbol(&proc.name),
            kind: proc.kind,
            params: proc.params.iter().map(|p| suffix_type(p)).collect(),
            ret: suffix_type(&proc.name),
        };
        lowerer.proc_sigs.insert(proc.name.clone(), sig);
    }
    lowerer.scan_program(program);

    let mut module = Module::new();
    // Externs for every helper the scan recorded.
    for helper in &lowerer.helpers {
        if let Some(sig) = builtins::helper_sig(helper) {
            module.declare_extern(sig.name, sig.ret, sig.params.to_vec());
        }
    }

    for proc in &program.procs {
        lowerer.emit_procedure(&mut module, proc);
    }
    lowerer.emit_main(&mut module, &program.main);

    if lowerer.errors.is_empty() {
        Ok(module)
    } else {
        Err(lowerer.errors.join("\n"))
    }
}

impl Lowerer {
    pub(crate) fn error(&mut self, line: u32, message: impl Into<String>) {
        self.errors.push(format!("line {line}: {}", message.into()));
    }

    fn emit_main(&mut self, module: &mut Module, body: &[Stmt]) {
        self.var_types = self.collect_var_types(body, &[]);
        let builder = IrBuilder::new(module);
        let mut ctx = self.open_procedure(builder, "main", ExprType::Long, &[], body, None);
        self.emit_body(&mut ctx, body);
        self.close_procedure(&mut ctx, None);
    }

    fn emit_procedure(&mut self, module: &mut Module, proc: &Procedure) {
        self.var_types = self.collect_var_types(&proc.body, &proc.params);
        let sig = self.proc_sigs[&proc.name].clone();
        let builder = IrBuilder::new(module);
        let func_ret = match sig.kind {
            ProcKind::Function => Some(sig.ret),
            ProcKind::Sub => None,
        };
        let mut ctx = self.open_procedure(
            builder,
            &sig.symbol,
            sig.ret,
            &proc.params,
            &proc.body,
            func_ret.map(|_| proc.name.clone()),
        );
        self.emit_body(&mut ctx, &proc.body);
        self.close_procedure(&mut ctx, func_ret);
    }

    /// Start a function: entry block, variable cells, parameter spill,
    /// GOSUB/EH prologues when the scan saw a need, and line blocks for
    /// every numbered top-level statement.
    fn open_procedure<'m>(
        &mut self,
        mut builder: IrBuilder<'m>,
        symbol: &str,
        ret: ExprType,
        params: &[String],
        body: &[Stmt],
        func_name: Option<String>,
    ) -> EmitCtx<'m> {
        let namer = BlockNamer::new(symbol);
        let is_main = symbol == "main";
        let il_ret = if is_main {
            Type::I64
        } else if func_name.is_some() {
            ret.value_type()
        } else {
            Type::Void
        };
        let il_params: Vec<FuncParam> = params
            .iter()
            .map(|p| FuncParam {
                name: p.to_lowercase(),
                ty: suffix_type(p).value_type(),
            })
            .collect();
        builder.start_function(symbol, il_ret, il_params);
        let entry = namer.entry();
        builder.add_block(entry.clone());
        builder.set_insert_point(&entry);

        let mut ctx = EmitCtx {
            builder,
            namer,
            mangler: NameMangler::new(),
            scopes: ScopeTracker::new(),
            vars: HashMap::new(),
            line_blocks: HashMap::new(),
            ret_cell: None,
            func_name,
            exit_label: String::new(),
            gosub: None,
            gosub_sites: Vec::new(),
            gosub_dispatch: None,
            gosub_overflow: None,
            eh: None,
            handlers: HashMap::new(),
        };
        ctx.scopes.push_scope();

        // Variable cells, parameters first in declaration order.
        let mut ordered: Vec<String> = params.to_vec();
        for name in self.var_order(body) {
            if !ordered.contains(&name) {
                ordered.push(name);
            }
        }
        for name in &ordered {
            let ty = self.var_types.get(name).copied().unwrap_or(ExprType::Double);
            let cell = ctx.builder.emit_alloca(8);
            ctx.name_result(&cell);
            ctx.scopes.bind(name, name.clone());
            ctx.vars.insert(name.clone(), VarCell { cell, ty });
        }
        // Zero-initialise, then overwrite parameter cells with the
        // incoming values (strings retained: the cell owns a reference).
        for name in &ordered {
            let VarCell { cell, ty } = ctx.vars[name].clone();
            let init: Value = match ty.storage_type() {
                Type::F64 => Value::const_float(0.0),
                Type::Str => Value::const_str(""),
                _ => Value::const_int(0),
            };
            ctx.builder.emit_store(ty.storage_type(), cell, init);
        }
        for (i, name) in params.iter().enumerate() {
            let VarCell { cell, ty } = ctx.vars[name].clone();
            let incoming = Value::temp(i as u32);
            if ty == ExprType::Str {
                self.call_helper(&mut ctx, "rt_str_retain", vec![incoming.clone()], Type::Void);
            }
            ctx.builder.emit_store(ty.storage_type(), cell, incoming);
        }

        // FUNCTION return cell.
        if ctx.func_name.is_some() {
            let cell = ctx.builder.emit_alloca(8);
            ctx.name_result(&cell);
            let init: Value = match ret.storage_type() {
                Type::F64 => Value::const_float(0.0),
                Type::Str => Value::const_str(""),
                _ => Value::const_int(0),
            };
            ctx.builder.emit_store(ret.storage_type(), cell.clone(), init);
            ctx.ret_cell = Some(VarCell { cell, ty: ret });
        }

        // GOSUB shadow stack: one stack-pointer cell plus the
        // return-site array, created at most once per procedure.
        if self.body_uses_gosub(body) {
            let sp_cell = ctx.builder.emit_alloca(8);
            ctx.name_result(&sp_cell);
            let arr_cell = ctx.builder.emit_alloca(GOSUB_STACK_DEPTH * 8);
            ctx.name_result(&arr_cell);
            ctx.builder
                .emit_store(Type::I64, sp_cell.clone(), Value::const_int(0));
            ctx.gosub = Some(GosubCells { sp_cell, arr_cell });
        }

        // Error-handler cells when ON ERROR appears.
        if self.body_uses_on_error(body) {
            let err_cell = ctx.builder.emit_alloca(8);
            ctx.name_result(&err_cell);
            let tok_cell = ctx.builder.emit_alloca(8);
            ctx.name_result(&tok_cell);
            ctx.eh = Some(EhCells { err_cell, tok_cell });
        }

        // One block per numbered top-level line, in source order.
        for stmt in body {
            let line = stmt.line();
            if line != 0 && !ctx.line_blocks.contains_key(&line) {
                let label = ctx.namer.line(line);
                ctx.builder.add_block(label.clone());
                ctx.line_blocks.insert(line, label);
            }
        }

        ctx.exit_label = ctx.namer.ret();
        let exit = ctx.exit_label.clone();
        ctx.builder.add_block(exit);
        ctx
    }

    /// Finish a function: seal the fallthrough into the exit block,
    /// release string locals, return, and emit the deferred GOSUB
    /// dispatch when RETURN was used.
    fn close_procedure(&mut self, ctx: &mut EmitCtx<'_>, func_ret: Option<ExprType>) {
        let exit = ctx.exit_label.clone();
        ctx.seal_with_br(&exit);
        ctx.builder.set_insert_point(&exit);
        ctx.builder.set_loc(SourceLoc::default());

        // Release every string cell the procedure owns.
        let mut str_vars: Vec<(String, VarCell)> = ctx
            .vars
            .iter()
            .filter(|(_, v)| v.ty == ExprType::Str)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        str_vars.sort_by(|a, b| a.0.cmp(&b.0));
        for (_, var) in str_vars {
            let value = ctx.builder.emit_load(Type::Str, var.cell.clone());
            ctx.name_result(&value);
            self.call_helper(ctx, "rt_str_release", vec![value], Type::Void);
        }

        match (ctx.ret_cell.clone(), func_ret) {
            (Some(cell), Some(ret)) => {
                let value = ctx.builder.emit_load(ret.storage_type(), cell.cell.clone());
                ctx.name_result(&value);
                if ret == ExprType::Str {
                    // Balance the cell's reference; the loaded value's
                    // own reference travels to the caller.
                    self.call_helper(ctx, "rt_str_release", vec![value.clone()], Type::Void);
                }
                let value = self.coerce_storage_to_value(ctx, value, ret);
                ctx.builder.emit_ret(Some(value));
            }
            _ if ctx.builder.current_function().ret == Type::I64 => {
                ctx.builder.emit_ret(Some(Value::const_int(0)));
            }
            _ => ctx.builder.emit_ret(None),
        }

        self.emit_gosub_dispatch(ctx);
    }

    /// Declare a helper as needed and emit the call. The scan pass
    /// should already have recorded it; late additions are still
    /// declared so the module stays well-formed.
    pub(crate) fn call_helper(
        &mut self,
        ctx: &mut EmitCtx<'_>,
        name: &'static str,
        args: Vec<Value>,
        ret: Type,
    ) -> Option<Value> {
        if self.helpers.insert(name)
            && let Some(sig) = builtins::helper_sig(name)
        {
            ctx.builder
                .module()
                .declare_extern(sig.name, sig.ret, sig.params.to_vec());
        }
        let result = ctx.builder.emit_call(name, ret, args);
        if let Some(value) = &result {
            ctx.name_result(value);
        }
        result
    }

    /// Widen a loaded storage value back to its value classification
    /// (booleans were stored as i64).
    pub(crate) fn coerce_storage_to_value(
        &mut self,
        ctx: &mut EmitCtx<'_>,
        value: Value,
        ty: ExprType,
    ) -> Value {
        if ty == ExprType::Boolean {
            let out = ctx
                .builder
                .emit_un(Opcode::Trunc1, Type::I1, value);
            ctx.name_result(&out);
            out
        } else {
            value
        }
    }
}
