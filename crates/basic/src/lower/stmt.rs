//! Statement emission
//!
//! Control flow follows the per-shape labels from the `BlockNamer`;
//! numbered top-level lines open their `L<line>_<proc>` blocks so
//! GOTO/GOSUB/ON ERROR/RESUME targets resolve. Terminating statements
//! (GOTO, RETURN, RESUME, END) are followed by a fresh fallback block
//! so later statements still have somewhere to land.

use crate::ast::{CaseArm, CaseLabel, Expr, PrintItem, ResumeMode, Stmt};
use crate::lower::{EmitCtx, ExprType, GOSUB_STACK_DEPTH, Lowerer};
use crate::options::FrontendOptions;
use viper_il::{Instr, Opcode, SourceLoc, TrapKind, Type, Value};

/// A SELECT CASE label after constant resolution.
#[derive(Debug, Clone, PartialEq)]
enum ResolvedLabel {
    Int(i64),
    Str(String),
}

impl Lowerer {
    /// Emit the top-level statements of a procedure, switching into the
    /// per-line blocks as numbered lines begin.
    pub(crate) fn emit_body(&mut self, ctx: &mut EmitCtx<'_>, body: &[Stmt]) {
        let mut last_line = 0u32;
        for stmt in body {
            let line = stmt.line();
            if line != 0 && line != last_line {
                if let Some(label) = ctx.line_blocks.get(&line).cloned() {
                    ctx.seal_with_br(&label);
                    ctx.builder.set_insert_point(&label);
                }
                last_line = line;
            }
            self.set_stmt_loc(ctx, line);
            self.emit_stmt(ctx, stmt);
        }
    }

    /// Emit a nested statement list (no line-block switching).
    fn emit_stmt_list(&mut self, ctx: &mut EmitCtx<'_>, body: &[Stmt]) {
        for stmt in body {
            self.set_stmt_loc(ctx, stmt.line());
            self.emit_stmt(ctx, stmt);
        }
    }

    fn set_stmt_loc(&self, ctx: &mut EmitCtx<'_>, line: u32) {
        if line != 0 {
            ctx.builder.set_loc(SourceLoc::new(1, line, 1));
        } else {
            ctx.builder.set_loc(SourceLoc::default());
        }
    }

    /// Open a fresh unreachable-looking block after a terminator so any
    /// following statements have a home.
    fn open_fallback_block(&mut self, ctx: &mut EmitCtx<'_>) {
        let label = ctx.namer.unique("bb");
        ctx.builder.add_block(label.clone());
        ctx.builder.set_insert_point(&label);
    }

    fn emit_stmt(&mut self, ctx: &mut EmitCtx<'_>, stmt: &Stmt) {
        match stmt {
            Stmt::Assign {
                target,
                value,
                line,
            } => self.emit_assign(ctx, target, value, *line),
            Stmt::Print {
                items,
                trailing_newline,
                line,
            } => self.emit_print(ctx, items, *trailing_newline, *line),
            Stmt::Input {
                prompt,
                target,
                line,
            } => self.emit_input(ctx, prompt.as_deref(), target, *line),
            Stmt::If {
                cond,
                then_body,
                elseifs,
                else_body,
                line,
            } => self.emit_if(ctx, cond, then_body, elseifs, else_body.as_deref(), *line),
            Stmt::While { cond, body, line } => self.emit_while(ctx, cond, body, *line),
            Stmt::For {
                var,
                from,
                to,
                step,
                body,
                line,
            } => self.emit_for(ctx, var, from, to, step.as_ref(), body, *line),
            Stmt::Goto { target, line } => {
                match ctx.line_blocks.get(target).cloned() {
                    Some(label) => ctx.seal_with_br(&label),
                    None => self.error(*line, format!("GOTO target line {target} not found")),
                }
                self.open_fallback_block(ctx);
            }
            Stmt::Gosub { target, line } => self.emit_gosub(ctx, *target, *line),
            Stmt::Return { line } => self.emit_gosub_return(ctx, *line),
            Stmt::OnErrorGoto { target, line } => self.emit_on_error(ctx, *target, *line),
            Stmt::Resume { mode, line } => self.emit_resume(ctx, *mode, *line),
            Stmt::SelectCase {
                scrutinee,
                arms,
                else_body,
                line,
            } => self.emit_select(ctx, scrutinee, arms, else_body.as_deref(), *line),
            Stmt::Dim { .. } | Stmt::Const { .. } => {}
            Stmt::Randomize { seed, line } => {
                let seed_value = match seed {
                    Some(expr) => {
                        let (value, ty) = self.lower_expr(ctx, expr, *line);
                        self.coerce(ctx, value, ty, ExprType::Long, *line)
                    }
                    None => Value::const_int(0),
                };
                self.call_helper(ctx, "rt_randomize_i64", vec![seed_value], Type::Void);
            }
            Stmt::Call { name, args, line } => {
                let Some(sig) = self.proc_sigs.get(name).cloned() else {
                    self.error(*line, format!("CALL to unknown SUB {name}"));
                    return;
                };
                if args.len() != sig.params.len() {
                    self.error(
                        *line,
                        format!(
                            "SUB {name} expects {} argument(s), got {}",
                            sig.params.len(),
                            args.len()
                        ),
                    );
                }
                let mut lowered = Vec::with_capacity(args.len());
                for (arg, param_ty) in args.iter().zip(&sig.params) {
                    let (value, ty) = self.lower_expr(ctx, arg, *line);
                    lowered.push(self.coerce(ctx, value, ty, *param_ty, *line));
                }
                ctx.builder.emit_call(sig.symbol.clone(), Type::Void, lowered);
            }
            Stmt::End { .. } => {
                let exit = ctx.exit_label.clone();
                ctx.seal_with_br(&exit);
                self.open_fallback_block(ctx);
            }
        }
    }

    fn emit_assign(&mut self, ctx: &mut EmitCtx<'_>, target: &str, value: &Expr, line: u32) {
        // Assigning to the FUNCTION's own name sets the return value.
        let cell = if ctx.func_name.as_deref() == Some(target) {
            ctx.ret_cell.clone().expect("function return cell exists")
        } else {
            match ctx.vars.get(target).cloned() {
                Some(var) => var,
                None => {
                    self.error(line, format!("unknown variable {target}"));
                    return;
                }
            }
        };
        let (mut lowered, ty) = self.lower_expr(ctx, value, line);
        if cell.ty == ExprType::Str {
            if ty != ExprType::Str {
                self.error(line, "cannot assign a number to a string variable");
                return;
            }
            let old = ctx.builder.emit_load(Type::Str, cell.cell.clone());
            ctx.name_result(&old);
            self.call_helper(ctx, "rt_str_release", vec![old], Type::Void);
            self.call_helper(ctx, "rt_str_retain", vec![lowered.clone()], Type::Void);
            ctx.builder.emit_store(Type::Str, cell.cell, lowered);
            return;
        }
        // Numeric cell: booleans widen to i64 in storage.
        let target_ty = cell.ty;
        lowered = self.coerce(ctx, lowered, ty, target_ty, line);
        let stored = if target_ty == ExprType::Boolean {
            let wide = ctx.builder.emit_un(Opcode::Zext1, Type::I64, lowered);
            ctx.name_result(&wide);
            wide
        } else {
            lowered
        };
        ctx.builder.emit_store(target_ty.storage_type(), cell.cell, stored);
    }

    fn emit_print(
        &mut self,
        ctx: &mut EmitCtx<'_>,
        items: &[PrintItem],
        trailing_newline: bool,
        line: u32,
    ) {
        for item in items {
            match item {
                PrintItem::Expr(expr) => {
                    let (value, ty) = self.lower_expr(ctx, expr, line);
                    match ty {
                        ExprType::Str => {
                            self.call_helper(ctx, "rt_print_str", vec![value], Type::Void);
                        }
                        ExprType::Single | ExprType::Double => {
                            self.call_helper(ctx, "rt_print_f64", vec![value], Type::Void);
                        }
                        ExprType::Boolean => {
                            let wide = self.coerce(ctx, value, ty, ExprType::Long, line);
                            self.call_helper(ctx, "rt_print_i64", vec![wide], Type::Void);
                        }
                        _ => {
                            self.call_helper(ctx, "rt_print_i64", vec![value], Type::Void);
                        }
                    }
                }
                PrintItem::Comma => {
                    // Next print zone approximated by a tab.
                    self.call_helper(
                        ctx,
                        "rt_print_str",
                        vec![Value::const_str("\t")],
                        Type::Void,
                    );
                }
                PrintItem::Semicolon => {}
            }
        }
        if trailing_newline {
            self.call_helper(ctx, "rt_print_nl", vec![], Type::Void);
        }
    }

    fn emit_input(
        &mut self,
        ctx: &mut EmitCtx<'_>,
        prompt: Option<&str>,
        target: &str,
        line: u32,
    ) {
        if let Some(text) = prompt {
            self.call_helper(
                ctx,
                "rt_print_str",
                vec![Value::const_str(text)],
                Type::Void,
            );
        }
        let Some(cell) = ctx.vars.get(target).cloned() else {
            self.error(line, format!("unknown variable {target}"));
            return;
        };
        let input = self
            .call_helper(ctx, "rt_input_str", vec![], Type::Str)
            .expect("rt_input_str returns a value");
        match cell.ty {
            ExprType::Str => {
                let old = ctx.builder.emit_load(Type::Str, cell.cell.clone());
                ctx.name_result(&old);
                self.call_helper(ctx, "rt_str_release", vec![old], Type::Void);
                self.call_helper(ctx, "rt_str_retain", vec![input.clone()], Type::Void);
                ctx.builder.emit_store(Type::Str, cell.cell, input);
            }
            ty if ty.is_integral() => {
                let parsed = self
                    .call_helper(ctx, "rt_to_int", vec![input], Type::I64)
                    .expect("rt_to_int returns a value");
                ctx.builder.emit_store(ty.storage_type(), cell.cell, parsed);
            }
            ty => {
                let parsed = self
                    .call_helper(ctx, "rt_to_f64", vec![input], Type::F64)
                    .expect("rt_to_f64 returns a value");
                ctx.builder.emit_store(ty.storage_type(), cell.cell, parsed);
            }
        }
    }

    fn emit_if(
        &mut self,
        ctx: &mut EmitCtx<'_>,
        cond: &Expr,
        then_body: &[Stmt],
        elseifs: &[(Expr, Vec<Stmt>)],
        else_body: Option<&[Stmt]>,
        line: u32,
    ) {
        let names = ctx.namer.next_if();
        let has_else = !elseifs.is_empty() || else_body.is_some();

        ctx.builder.add_block(names.then_bb.clone());
        if has_else {
            ctx.builder.add_block(names.else_bb.clone());
        }
        ctx.builder.add_block(names.end_bb.clone());

        let cond_value = self.lower_condition(ctx, cond, line);
        let false_target = if has_else {
            names.else_bb.clone()
        } else {
            names.end_bb.clone()
        };
        ctx.builder
            .emit_cbr(cond_value, &names.then_bb, vec![], &false_target, vec![]);

        ctx.builder.set_insert_point(&names.then_bb);
        self.emit_stmt_list(ctx, then_body);
        ctx.seal_with_br(&names.end_bb);

        if has_else {
            ctx.builder.set_insert_point(&names.else_bb);
            if let Some((first, rest)) = elseifs.split_first() {
                self.emit_if(ctx, &first.0, &first.1, rest, else_body, line);
            } else if let Some(body) = else_body {
                self.emit_stmt_list(ctx, body);
            }
            ctx.seal_with_br(&names.end_bb);
        }

        ctx.builder.set_insert_point(&names.end_bb);
    }

    fn emit_while(&mut self, ctx: &mut EmitCtx<'_>, cond: &Expr, body: &[Stmt], line: u32) {
        let names = ctx.namer.next_while();
        ctx.builder.add_block(names.head.clone());
        ctx.builder.add_block(names.body.clone());
        ctx.builder.add_block(names.end.clone());

        ctx.seal_with_br(&names.head);
        ctx.builder.set_insert_point(&names.head);
        let cond_value = self.lower_condition(ctx, cond, line);
        ctx.builder
            .emit_cbr(cond_value, &names.body, vec![], &names.end, vec![]);

        ctx.builder.set_insert_point(&names.body);
        self.emit_stmt_list(ctx, body);
        ctx.seal_with_br(&names.head);

        ctx.builder.set_insert_point(&names.end);
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_for(
        &mut self,
        ctx: &mut EmitCtx<'_>,
        var: &str,
        from: &Expr,
        to: &Expr,
        step: Option<&Expr>,
        body: &[Stmt],
        line: u32,
    ) {
        let Some(cell) = ctx.vars.get(var).cloned() else {
            self.error(line, format!("unknown loop variable {var}"));
            return;
        };
        if cell.ty == ExprType::Str {
            self.error(line, "FOR loop variable cannot be a string");
            return;
        }
        let names = ctx.namer.next_for();
        ctx.builder.add_block(names.head.clone());
        ctx.builder.add_block(names.body.clone());
        ctx.builder.add_block(names.inc.clone());
        ctx.builder.add_block(names.end.clone());

        // Initial value, limit, and step evaluate once, before the head.
        let (init, init_ty) = self.lower_expr(ctx, from, line);
        let init = self.coerce(ctx, init, init_ty, cell.ty, line);
        ctx.builder
            .emit_store(cell.ty.storage_type(), cell.cell.clone(), init);
        let (limit, limit_ty) = self.lower_expr(ctx, to, line);
        let limit = self.coerce(ctx, limit, limit_ty, cell.ty, line);
        let step_value = match step {
            Some(expr) => {
                let (value, ty) = self.lower_expr(ctx, expr, line);
                self.coerce(ctx, value, ty, cell.ty, line)
            }
            None => match cell.ty {
                ExprType::Single | ExprType::Double => Value::const_float(1.0),
                _ => Value::const_int(1),
            },
        };
        ctx.seal_with_br(&names.head);

        // head: continue while (step >= 0 and var <= limit) or
        //       (step < 0 and var >= limit).
        ctx.builder.set_insert_point(&names.head);
        let current = ctx
            .builder
            .emit_load(cell.ty.storage_type(), cell.cell.clone());
        ctx.name_result(&current);
        let float = cell.ty.is_float();
        let (le_op, ge_op, zero): (Opcode, Opcode, Value) = if float {
            (Opcode::FCmpLe, Opcode::FCmpGe, Value::const_float(0.0))
        } else {
            (Opcode::SCmpLe, Opcode::SCmpGe, Value::const_int(0))
        };
        let le = ctx
            .builder
            .emit_bin(le_op, Type::I1, current.clone(), limit.clone());
        ctx.name_result(&le);
        let ge = ctx.builder.emit_bin(ge_op, Type::I1, current, limit);
        ctx.name_result(&ge);
        let step_pos = ctx
            .builder
            .emit_bin(ge_op, Type::I1, step_value.clone(), zero);
        ctx.name_result(&step_pos);
        let step_neg = ctx.builder.emit_bin(
            Opcode::Xor,
            Type::I1,
            step_pos.clone(),
            Value::const_bool(true),
        );
        ctx.name_result(&step_neg);
        let up = ctx.builder.emit_bin(Opcode::And, Type::I1, step_pos, le);
        ctx.name_result(&up);
        let down = ctx.builder.emit_bin(Opcode::And, Type::I1, step_neg, ge);
        ctx.name_result(&down);
        let go = ctx.builder.emit_bin(Opcode::Or, Type::I1, up, down);
        ctx.name_result(&go);
        ctx.builder
            .emit_cbr(go, &names.body, vec![], &names.end, vec![]);

        ctx.builder.set_insert_point(&names.body);
        self.emit_stmt_list(ctx, body);
        ctx.seal_with_br(&names.inc);

        ctx.builder.set_insert_point(&names.inc);
        let current = ctx
            .builder
            .emit_load(cell.ty.storage_type(), cell.cell.clone());
        ctx.name_result(&current);
        let next = if float {
            ctx.builder
                .emit_bin(Opcode::FAdd, Type::F64, current, step_value)
        } else {
            ctx.builder
                .emit_bin(Opcode::IAddOvf, Type::I64, current, step_value)
        };
        ctx.name_result(&next);
        ctx.builder
            .emit_store(cell.ty.storage_type(), cell.cell, next);
        ctx.builder.emit_br(&names.head, vec![]);

        ctx.builder.set_insert_point(&names.end);
    }

    // ------------------------------------------------------------------
    // GOSUB / RETURN

    fn emit_gosub(&mut self, ctx: &mut EmitCtx<'_>, target: u32, line: u32) {
        let Some(cells) = ctx.gosub.as_ref().map(|g| (g.sp_cell.clone(), g.arr_cell.clone()))
        else {
            self.error(line, "internal error: GOSUB without shadow stack");
            return;
        };
        let (sp_cell, arr_cell) = cells;
        let Some(target_label) = ctx.line_blocks.get(&target).cloned() else {
            self.error(line, format!("GOSUB target line {target} not found"));
            return;
        };

        let site_index = ctx.gosub_sites.len() as i64;
        let ret_label = ctx.namer.unique("gosub_ret");
        ctx.builder.add_block(ret_label.clone());
        ctx.gosub_sites.push(ret_label.clone());

        // Depth check against the fixed stack size.
        let sp = ctx.builder.emit_load(Type::I64, sp_cell.clone());
        ctx.name_result(&sp);
        let full = ctx.builder.emit_bin(
            Opcode::SCmpGe,
            Type::I1,
            sp.clone(),
            Value::const_int(GOSUB_STACK_DEPTH),
        );
        ctx.name_result(&full);
        let overflow_label = self.gosub_overflow_block(ctx);
        let push_label = ctx.namer.unique("gosub_push");
        ctx.builder.add_block(push_label.clone());
        ctx.builder
            .emit_cbr(full, &overflow_label, vec![], &push_label, vec![]);

        ctx.builder.set_insert_point(&push_label);
        let offset = ctx
            .builder
            .emit_bin(Opcode::Mul, Type::I64, sp.clone(), Value::const_int(8));
        ctx.name_result(&offset);
        let addr = ctx
            .builder
            .emit_bin(Opcode::Add, Type::I64, arr_cell, offset);
        ctx.name_result(&addr);
        ctx.builder
            .emit_store(Type::I64, addr, Value::const_int(site_index));
        let bumped = ctx
            .builder
            .emit_bin(Opcode::Add, Type::I64, sp, Value::const_int(1));
        ctx.name_result(&bumped);
        ctx.builder.emit_store(Type::I64, sp_cell, bumped);
        ctx.builder.emit_br(&target_label, vec![]);

        ctx.builder.set_insert_point(&ret_label);
    }

    fn emit_gosub_return(&mut self, ctx: &mut EmitCtx<'_>, line: u32) {
        if ctx.gosub.is_none() {
            self.error(line, "RETURN without any GOSUB in this procedure");
            return;
        }
        let dispatch = match &ctx.gosub_dispatch {
            Some(label) => label.clone(),
            None => {
                let label = ctx.namer.unique("gosub_dispatch");
                ctx.builder.add_block(label.clone());
                ctx.gosub_dispatch = Some(label.clone());
                label
            }
        };
        ctx.seal_with_br(&dispatch);
        self.open_fallback_block(ctx);
    }

    fn gosub_overflow_block(&mut self, ctx: &mut EmitCtx<'_>) -> String {
        // One shared trap block per procedure.
        if let Some(label) = ctx.gosub_overflow.clone() {
            return label;
        }
        let label = ctx.namer.unique("gosub_overflow");
        ctx.builder.add_block(label.clone());
        let saved = ctx.builder.insert_label().map(str::to_string);
        ctx.builder.set_insert_point(&label);
        ctx.builder.emit(Instr {
            op: Opcode::Trap,
            trap_kind: Some(TrapKind::Bounds),
            trap_msg: Some("GOSUB stack overflow".to_string()),
            ..Instr::default()
        });
        if let Some(back) = saved {
            ctx.builder.set_insert_point(&back);
        }
        ctx.gosub_overflow = Some(label.clone());
        label
    }

    /// Deferred at procedure close: the computed-table dispatch every
    /// RETURN branches to.
    pub(crate) fn emit_gosub_dispatch(&mut self, ctx: &mut EmitCtx<'_>) {
        let Some(dispatch) = ctx.gosub_dispatch.clone() else {
            return;
        };
        let Some((sp_cell, arr_cell)) = ctx
            .gosub
            .as_ref()
            .map(|g| (g.sp_cell.clone(), g.arr_cell.clone()))
        else {
            return;
        };
        let underflow = ctx.namer.unique("gosub_underflow");
        let pop = ctx.namer.unique("gosub_pop");
        let bad = ctx.namer.unique("gosub_bad");
        ctx.builder.add_block(underflow.clone());
        ctx.builder.add_block(pop.clone());
        ctx.builder.add_block(bad.clone());
        ctx.builder.set_loc(SourceLoc::default());

        ctx.builder.set_insert_point(&dispatch);
        let sp = ctx.builder.emit_load(Type::I64, sp_cell.clone());
        ctx.name_result(&sp);
        let empty = ctx
            .builder
            .emit_bin(Opcode::SCmpLe, Type::I1, sp.clone(), Value::const_int(0));
        ctx.name_result(&empty);
        ctx.builder.emit_cbr(empty, &underflow, vec![], &pop, vec![]);

        ctx.builder.set_insert_point(&underflow);
        ctx.builder.emit(Instr {
            op: Opcode::Trap,
            trap_kind: Some(TrapKind::Bounds),
            trap_msg: Some("RETURN without GOSUB".to_string()),
            ..Instr::default()
        });

        ctx.builder.set_insert_point(&pop);
        let top = ctx
            .builder
            .emit_bin(Opcode::Sub, Type::I64, sp, Value::const_int(1));
        ctx.name_result(&top);
        ctx.builder
            .emit_store(Type::I64, sp_cell, top.clone());
        let offset = ctx
            .builder
            .emit_bin(Opcode::Mul, Type::I64, top, Value::const_int(8));
        ctx.name_result(&offset);
        let addr = ctx
            .builder
            .emit_bin(Opcode::Add, Type::I64, arr_cell, offset);
        ctx.name_result(&addr);
        let site = ctx.builder.emit_load(Type::I64, addr);
        ctx.name_result(&site);

        let mut switch = Instr {
            op: Opcode::SwitchI32,
            operands: vec![site],
            labels: vec![bad.clone()],
            br_args: vec![vec![]],
            ..Instr::default()
        };
        for (i, label) in ctx.gosub_sites.iter().enumerate() {
            switch.operands.push(Value::const_int(i as i64));
            switch.labels.push(label.clone());
            switch.br_args.push(vec![]);
        }
        ctx.builder.emit(switch);

        ctx.builder.set_insert_point(&bad);
        ctx.builder.emit(Instr {
            op: Opcode::Trap,
            trap_kind: Some(TrapKind::RuntimeError),
            trap_msg: Some("corrupt GOSUB stack".to_string()),
            ..Instr::default()
        });
    }

    // ------------------------------------------------------------------
    // ON ERROR / RESUME

    fn emit_on_error(&mut self, ctx: &mut EmitCtx<'_>, target: u32, line: u32) {
        if target == 0 {
            // ON ERROR GOTO 0 uninstalls the active handler.
            ctx.builder.emit(Instr {
                op: Opcode::EhPop,
                ..Instr::default()
            });
            return;
        }
        let handler = self.ensure_error_handler(ctx, target, line);
        ctx.builder.emit(Instr {
            op: Opcode::EhPush,
            labels: vec![handler],
            ..Instr::default()
        });
    }

    /// Synthesize (once) the handler block bound to source line
    /// `target`: parameters `(%err: error, %tok: resume_tok)`, payload
    /// spill into the EH cells, branch to the target line.
    fn ensure_error_handler(&mut self, ctx: &mut EmitCtx<'_>, target: u32, line: u32) -> String {
        if let Some(label) = ctx.handlers.get(&target) {
            return label.clone();
        }
        let Some(cells) = ctx
            .eh
            .as_ref()
            .map(|e| (e.err_cell.clone(), e.tok_cell.clone()))
        else {
            self.error(line, "internal error: ON ERROR without handler cells");
            return ctx.exit_label.clone();
        };
        let (err_cell, tok_cell) = cells;
        let Some(target_label) = ctx.line_blocks.get(&target).cloned() else {
            self.error(line, format!("ON ERROR GOTO target line {target} not found"));
            return ctx.exit_label.clone();
        };

        let label = ctx.namer.unique("eh_handler");
        ctx.builder.add_block(label.clone());
        let err_id = ctx.builder.add_block_param(&label, "err", Type::Error);
        let tok_id = ctx.builder.add_block_param(&label, "tok", Type::ResumeTok);

        let saved = ctx.builder.insert_label().map(str::to_string);
        ctx.builder.set_insert_point(&label);
        ctx.builder
            .emit_store(Type::Error, err_cell, Value::temp(err_id));
        ctx.builder
            .emit_store(Type::ResumeTok, tok_cell, Value::temp(tok_id));
        ctx.builder.emit_br(&target_label, vec![]);
        if let Some(back) = saved {
            ctx.builder.set_insert_point(&back);
        }

        ctx.handlers.insert(target, label.clone());
        label
    }

    fn emit_resume(&mut self, ctx: &mut EmitCtx<'_>, mode: ResumeMode, line: u32) {
        let Some(tok_cell) = ctx.eh.as_ref().map(|e| e.tok_cell.clone()) else {
            self.error(line, "RESUME without ON ERROR in this procedure");
            return;
        };
        let token = ctx.builder.emit_load(Type::ResumeTok, tok_cell);
        ctx.name_result(&token);
        match mode {
            ResumeMode::Same => ctx.builder.emit(Instr {
                op: Opcode::ResumeSame,
                operands: vec![token],
                ..Instr::default()
            }),
            ResumeMode::Next => ctx.builder.emit(Instr {
                op: Opcode::ResumeNext,
                operands: vec![token],
                ..Instr::default()
            }),
            ResumeMode::Line(target) => {
                let Some(target_label) = ctx.line_blocks.get(&target).cloned() else {
                    self.error(line, format!("RESUME target line {target} not found"));
                    return;
                };
                ctx.builder.emit(Instr {
                    op: Opcode::ResumeLabel,
                    operands: vec![token],
                    labels: vec![target_label],
                    ..Instr::default()
                });
            }
        }
        self.open_fallback_block(ctx);
    }

    // ------------------------------------------------------------------
    // SELECT CASE

    fn emit_select(
        &mut self,
        ctx: &mut EmitCtx<'_>,
        scrutinee: &Expr,
        arms: &[CaseArm],
        else_body: Option<&[Stmt]>,
        line: u32,
    ) {
        let scrutinee_ty = self.classify_expr(scrutinee);
        let resolved: Vec<Vec<ResolvedLabel>> = arms
            .iter()
            .map(|arm| {
                arm.labels
                    .iter()
                    .filter_map(|label| self.resolve_case_label(label, line))
                    .collect()
            })
            .collect();

        let end_label = ctx.namer.unique("select_end");
        ctx.builder.add_block(end_label.clone());

        let (value, value_ty) = self.lower_expr(ctx, scrutinee, line);

        if scrutinee_ty != ExprType::Str && switchable(&resolved) {
            self.emit_select_switch(ctx, value, value_ty, arms, &resolved, else_body, &end_label, line);
        } else {
            self.emit_select_chain(ctx, value, value_ty, arms, &resolved, else_body, &end_label, line);
        }
        ctx.builder.set_insert_point(&end_label);
    }

    fn resolve_case_label(&mut self, label: &CaseLabel, line: u32) -> Option<ResolvedLabel> {
        match label {
            CaseLabel::Int(v) => Some(ResolvedLabel::Int(*v)),
            CaseLabel::Str(s) => Some(ResolvedLabel::Str(s.clone())),
            CaseLabel::ConstRef(name) => {
                if !FrontendOptions::enable_select_case_const_labels() {
                    self.error(line, "CONST labels in SELECT CASE are disabled");
                    return None;
                }
                match self.consts.get(name) {
                    Some(Expr::IntLit(v)) => Some(ResolvedLabel::Int(*v)),
                    Some(Expr::StrLit(s)) => Some(ResolvedLabel::Str(s.clone())),
                    _ => {
                        self.error(line, format!("CASE label {name} is not a literal CONST"));
                        None
                    }
                }
            }
            CaseLabel::Chr(code) => {
                if !FrontendOptions::enable_select_case_const_labels() {
                    self.error(line, "CHR$ labels in SELECT CASE are disabled");
                    return None;
                }
                match u32::try_from(*code).ok().and_then(char::from_u32) {
                    Some(c) => Some(ResolvedLabel::Str(c.to_string())),
                    None => {
                        self.error(line, "CHR$ label code out of range");
                        None
                    }
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_select_switch(
        &mut self,
        ctx: &mut EmitCtx<'_>,
        value: Value,
        value_ty: ExprType,
        arms: &[CaseArm],
        resolved: &[Vec<ResolvedLabel>],
        else_body: Option<&[Stmt]>,
        end_label: &str,
        line: u32,
    ) {
        let scrutinee = self.coerce(ctx, value, value_ty, ExprType::Long, line);
        let default_label = match else_body {
            Some(_) => {
                let label = ctx.namer.unique("case_else");
                ctx.builder.add_block(label.clone());
                label
            }
            None => end_label.to_string(),
        };

        let mut switch = Instr {
            op: Opcode::SwitchI32,
            operands: vec![scrutinee],
            labels: vec![default_label.clone()],
            br_args: vec![vec![]],
            ..Instr::default()
        };
        let mut arm_labels = Vec::with_capacity(arms.len());
        for labels in resolved {
            let body_label = ctx.namer.unique("case_body");
            ctx.builder.add_block(body_label.clone());
            arm_labels.push(body_label.clone());
            for label in labels {
                let ResolvedLabel::Int(v) = label else { continue };
                switch.operands.push(Value::const_int(*v));
                switch.labels.push(body_label.clone());
                switch.br_args.push(vec![]);
            }
        }
        ctx.builder.emit(switch);

        for (arm, body_label) in arms.iter().zip(&arm_labels) {
            ctx.builder.set_insert_point(body_label);
            self.emit_stmt_list(ctx, &arm.body);
            ctx.seal_with_br(end_label);
        }
        if let Some(body) = else_body {
            ctx.builder.set_insert_point(&default_label);
            self.emit_stmt_list(ctx, body);
            ctx.seal_with_br(end_label);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_select_chain(
        &mut self,
        ctx: &mut EmitCtx<'_>,
        value: Value,
        value_ty: ExprType,
        arms: &[CaseArm],
        resolved: &[Vec<ResolvedLabel>],
        else_body: Option<&[Stmt]>,
        end_label: &str,
        line: u32,
    ) {
        for (arm, labels) in arms.iter().zip(resolved) {
            let body_label = ctx.namer.unique("case_body");
            ctx.builder.add_block(body_label.clone());
            for label in labels {
                let next_test = ctx.namer.unique("case_test");
                ctx.builder.add_block(next_test.clone());
                let matched = match label {
                    ResolvedLabel::Int(v) => {
                        let scrutinee = self.coerce(
                            ctx,
                            value.clone(),
                            value_ty,
                            ExprType::Long,
                            line,
                        );
                        let out = ctx.builder.emit_bin(
                            Opcode::ICmpEq,
                            Type::I1,
                            scrutinee,
                            Value::const_int(*v),
                        );
                        ctx.name_result(&out);
                        out
                    }
                    ResolvedLabel::Str(s) => {
                        if value_ty != ExprType::Str {
                            self.error(line, "string CASE label on a numeric SELECT");
                        }
                        self.call_helper(
                            ctx,
                            "rt_str_eq",
                            vec![value.clone(), Value::const_str(s.clone())],
                            Type::I1,
                        )
                        .expect("rt_str_eq returns a value")
                    }
                };
                ctx.builder
                    .emit_cbr(matched, &body_label, vec![], &next_test, vec![]);
                ctx.builder.set_insert_point(&next_test);
            }
            // Fill the body now; the chain continues from the last test
            // block, which is the current insertion point.
            let chain_continue = ctx
                .builder
                .insert_label()
                .map(str::to_string)
                .expect("chain block exists");
            ctx.builder.set_insert_point(&body_label);
            self.emit_stmt_list(ctx, &arm.body);
            ctx.seal_with_br(end_label);
            ctx.builder.set_insert_point(&chain_continue);
        }
        if let Some(body) = else_body {
            self.emit_stmt_list(ctx, body);
        }
        ctx.seal_with_br(end_label);
    }
}

/// SELECT CASE lowers to `switch.i32` when every label is an integer
/// and the set is small and dense.
fn switchable(resolved: &[Vec<ResolvedLabel>]) -> bool {
    let mut values = Vec::new();
    for labels in resolved {
        for label in labels {
            match label {
                ResolvedLabel::Int(v) => values.push(*v),
                ResolvedLabel::Str(_) => return false,
            }
        }
    }
    if values.len() < 2 {
        return false;
    }
    let min = values.iter().min().copied().unwrap_or(0);
    let max = values.iter().max().copied().unwrap_or(0);
    max.saturating_sub(min) <= 64
}
