//! Expression emission
//!
//! Integer arithmetic lowers to the checked opcodes so overflow traps
//! like the source language demands; float arithmetic uses the IEEE
//! opcodes; `^` and the string operators go through runtime helpers.
//! Conversions funnel through one `coerce` helper so boolean/int/float
//! normalisation stays consistent everywhere.

use crate::ast::{BinOp, Expr, UnaryOp};
use crate::lower::{EmitCtx, ExprType, Lowerer};
use viper_il::{Opcode, Type, Value};

impl Lowerer {
    /// Lower an expression, returning the computed value and its
    /// classification.
    pub(crate) fn lower_expr(
        &mut self,
        ctx: &mut EmitCtx<'_>,
        expr: &Expr,
        line: u32,
    ) -> (Value, ExprType) {
        match expr {
            Expr::IntLit(v) => (Value::const_int(*v), self.classify_expr(expr)),
            Expr::FloatLit(v) => (Value::const_float(*v), ExprType::Double),
            Expr::StrLit(s) => (Value::const_str(s.clone()), ExprType::Str),
            Expr::Var(name) => {
                if let Some(value) = self.consts.get(name).cloned() {
                    return self.lower_expr(ctx, &value, line);
                }
                match ctx.vars.get(name).cloned() {
                    Some(var) => {
                        let loaded = ctx
                            .builder
                            .emit_load(var.ty.storage_type(), var.cell.clone());
                        ctx.name_result(&loaded);
                        let value = self.coerce_storage_to_value(ctx, loaded, var.ty);
                        (value, var.ty)
                    }
                    None => {
                        self.error(line, format!("unknown variable {name}"));
                        (Value::const_int(0), ExprType::Long)
                    }
                }
            }
            Expr::Unary { op, operand } => self.lower_unary(ctx, *op, operand, line),
            Expr::Binary { op, lhs, rhs } => self.lower_binary(ctx, *op, lhs, rhs, line),
            Expr::Builtin { name, args } => self.lower_builtin(ctx, name, args, line),
            Expr::CallFn { name, args } => self.lower_call_fn(ctx, name, args, line),
        }
    }

    /// Lower an expression used as a branch condition, yielding an `i1`.
    pub(crate) fn lower_condition(
        &mut self,
        ctx: &mut EmitCtx<'_>,
        expr: &Expr,
        line: u32,
    ) -> Value {
        let (value, ty) = self.lower_expr(ctx, expr, line);
        self.coerce(ctx, value, ty, ExprType::Boolean, line)
    }

    fn lower_unary(
        &mut self,
        ctx: &mut EmitCtx<'_>,
        op: UnaryOp,
        operand: &Expr,
        line: u32,
    ) -> (Value, ExprType) {
        match op {
            UnaryOp::Not => {
                let value = self.lower_condition(ctx, operand, line);
                let out = ctx.builder.emit_bin(
                    Opcode::Xor,
                    Type::I1,
                    value,
                    Value::const_bool(true),
                );
                ctx.name_result(&out);
                (out, ExprType::Boolean)
            }
            UnaryOp::Neg => {
                let (value, ty) = self.lower_expr(ctx, operand, line);
                if ty.is_float() {
                    let out = ctx.builder.emit_bin(
                        Opcode::FSub,
                        Type::F64,
                        Value::const_float(0.0),
                        value,
                    );
                    ctx.name_result(&out);
                    (out, ty)
                } else {
                    let value = self.coerce(ctx, value, ty, ExprType::Long, line);
                    let out = ctx.builder.emit_bin(
                        Opcode::ISubOvf,
                        Type::I64,
                        Value::const_int(0),
                        value,
                    );
                    ctx.name_result(&out);
                    (out, ExprType::Long)
                }
            }
        }
    }

    fn lower_binary(
        &mut self,
        ctx: &mut EmitCtx<'_>,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        line: u32,
    ) -> (Value, ExprType) {
        let lhs_ty = self.classify_expr(lhs);
        let rhs_ty = self.classify_expr(rhs);

        if op.is_logical() {
            let a = self.lower_condition(ctx, lhs, line);
            let b = self.lower_condition(ctx, rhs, line);
            let opcode = if op == BinOp::And { Opcode::And } else { Opcode::Or };
            let out = ctx.builder.emit_bin(opcode, Type::I1, a, b);
            ctx.name_result(&out);
            return (out, ExprType::Boolean);
        }

        // String operators bridge to the runtime.
        if lhs_ty == ExprType::Str || rhs_ty == ExprType::Str {
            return self.lower_string_binary(ctx, op, lhs, rhs, line);
        }

        if op.is_comparison() {
            let (a, b, common) = self.promote_pair(ctx, lhs, rhs, line);
            let opcode = comparison_opcode(op, common.is_float());
            let out = ctx.builder.emit_bin(opcode, Type::I1, a, b);
            ctx.name_result(&out);
            return (out, ExprType::Boolean);
        }

        match op {
            BinOp::Pow => {
                let (a, at) = self.lower_expr(ctx, lhs, line);
                let a = self.coerce(ctx, a, at, ExprType::Double, line);
                let (b, bt) = self.lower_expr(ctx, rhs, line);
                let b = self.coerce(ctx, b, bt, ExprType::Double, line);
                let out = self
                    .call_helper(ctx, "rt_pow_f64_chkdom", vec![a, b], Type::F64)
                    .expect("rt_pow_f64_chkdom returns a value");
                (out, ExprType::Double)
            }
            BinOp::IntDiv | BinOp::Mod => {
                let (a, at) = self.lower_expr(ctx, lhs, line);
                let a = self.coerce(ctx, a, at, ExprType::Long, line);
                let (b, bt) = self.lower_expr(ctx, rhs, line);
                let b = self.coerce(ctx, b, bt, ExprType::Long, line);
                let opcode = if op == BinOp::IntDiv {
                    Opcode::SDivChk0
                } else {
                    Opcode::SRemChk0
                };
                let out = ctx.builder.emit_bin(opcode, Type::I64, a, b);
                ctx.name_result(&out);
                (out, ExprType::Long)
            }
            BinOp::Div => {
                let (a, at) = self.lower_expr(ctx, lhs, line);
                let a = self.coerce(ctx, a, at, ExprType::Double, line);
                let (b, bt) = self.lower_expr(ctx, rhs, line);
                let b = self.coerce(ctx, b, bt, ExprType::Double, line);
                let out = ctx.builder.emit_bin(Opcode::FDiv, Type::F64, a, b);
                ctx.name_result(&out);
                (out, ExprType::Double)
            }
            BinOp::Add | BinOp::Sub | BinOp::Mul => {
                let (a, b, common) = self.promote_pair(ctx, lhs, rhs, line);
                let (opcode, ty, result) = if common.is_float() {
                    let opcode = match op {
                        BinOp::Add => Opcode::FAdd,
                        BinOp::Sub => Opcode::FSub,
                        _ => Opcode::FMul,
                    };
                    (opcode, Type::F64, ExprType::Double)
                } else {
                    // Checked integer arithmetic: overflow traps.
                    let opcode = match op {
                        BinOp::Add => Opcode::IAddOvf,
                        BinOp::Sub => Opcode::ISubOvf,
                        _ => Opcode::IMulOvf,
                    };
                    (opcode, Type::I64, ExprType::Long)
                };
                let out = ctx.builder.emit_bin(opcode, ty, a, b);
                ctx.name_result(&out);
                (out, result)
            }
            _ => unreachable!("comparison and logical ops handled above"),
        }
    }

    fn lower_string_binary(
        &mut self,
        ctx: &mut EmitCtx<'_>,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        line: u32,
    ) -> (Value, ExprType) {
        let (a, at) = self.lower_expr(ctx, lhs, line);
        let (b, bt) = self.lower_expr(ctx, rhs, line);
        if at != ExprType::Str || bt != ExprType::Str {
            self.error(line, "cannot mix strings and numbers in this expression");
            return (Value::const_int(0), ExprType::Long);
        }
        match op {
            BinOp::Add => {
                let out = self
                    .call_helper(ctx, "rt_concat", vec![a, b], Type::Str)
                    .expect("rt_concat returns a value");
                (out, ExprType::Str)
            }
            BinOp::Eq | BinOp::Ne => {
                let eq = self
                    .call_helper(ctx, "rt_str_eq", vec![a, b], Type::I1)
                    .expect("rt_str_eq returns a value");
                if op == BinOp::Eq {
                    (eq, ExprType::Boolean)
                } else {
                    let out = ctx.builder.emit_bin(
                        Opcode::Xor,
                        Type::I1,
                        eq,
                        Value::const_bool(true),
                    );
                    ctx.name_result(&out);
                    (out, ExprType::Boolean)
                }
            }
            _ => {
                self.error(line, format!("operator {} is not defined for strings", op.symbol()));
                (Value::const_int(0), ExprType::Long)
            }
        }
    }

    fn lower_builtin(
        &mut self,
        ctx: &mut EmitCtx<'_>,
        name: &str,
        args: &[Expr],
        line: u32,
    ) -> (Value, ExprType) {
        let arg = |lowerer: &mut Lowerer, ctx: &mut EmitCtx<'_>, i: usize, to: ExprType| {
            let (value, ty) = lowerer.lower_expr(ctx, &args[i], line);
            lowerer.coerce(ctx, value, ty, to, line)
        };
        match name {
            "LEN" => {
                let s = arg(self, ctx, 0, ExprType::Str);
                let out = self
                    .call_helper(ctx, "rt_len", vec![s], Type::I64)
                    .expect("rt_len returns a value");
                (out, ExprType::Long)
            }
            "CHR$" => {
                let code = arg(self, ctx, 0, ExprType::Long);
                let out = self
                    .call_helper(ctx, "rt_chr", vec![code], Type::Str)
                    .expect("rt_chr returns a value");
                (out, ExprType::Str)
            }
            "ABS" => {
                let float = self.classify_expr(&args[0]).is_float();
                if float {
                    let v = arg(self, ctx, 0, ExprType::Double);
                    let out = self
                        .call_helper(ctx, "rt_abs_f64", vec![v], Type::F64)
                        .expect("rt_abs_f64 returns a value");
                    (out, ExprType::Double)
                } else {
                    let v = arg(self, ctx, 0, ExprType::Long);
                    let out = self
                        .call_helper(ctx, "rt_abs_i64_chk", vec![v], Type::I64)
                        .expect("rt_abs_i64_chk returns a value");
                    (out, ExprType::Long)
                }
            }
            "SQR" => {
                let v = arg(self, ctx, 0, ExprType::Double);
                let out = self
                    .call_helper(ctx, "rt_sqrt_chk_f64", vec![v], Type::F64)
                    .expect("rt_sqrt_chk_f64 returns a value");
                (out, ExprType::Double)
            }
            "RND" => {
                let out = self
                    .call_helper(ctx, "rt_rnd", vec![], Type::F64)
                    .expect("rt_rnd returns a value");
                (out, ExprType::Double)
            }
            "INT" => {
                let v = arg(self, ctx, 0, ExprType::Double);
                let out = self
                    .call_helper(ctx, "rt_floor_f64", vec![v], Type::F64)
                    .expect("rt_floor_f64 returns a value");
                (out, ExprType::Double)
            }
            "STR$" => {
                if self.classify_expr(&args[0]).is_float() {
                    let v = arg(self, ctx, 0, ExprType::Double);
                    let out = self
                        .call_helper(ctx, "rt_f64_to_str", vec![v], Type::Str)
                        .expect("rt_f64_to_str returns a value");
                    (out, ExprType::Str)
                } else {
                    let v = arg(self, ctx, 0, ExprType::Long);
                    let out = self
                        .call_helper(ctx, "rt_int_to_str", vec![v], Type::Str)
                        .expect("rt_int_to_str returns a value");
                    (out, ExprType::Str)
                }
            }
            "VAL" => {
                let s = arg(self, ctx, 0, ExprType::Str);
                let out = self
                    .call_helper(ctx, "rt_to_f64", vec![s], Type::F64)
                    .expect("rt_to_f64 returns a value");
                (out, ExprType::Double)
            }
            "MID$" => {
                let s = arg(self, ctx, 0, ExprType::Str);
                let start = arg(self, ctx, 1, ExprType::Long);
                let len = arg(self, ctx, 2, ExprType::Long);
                let out = self
                    .call_helper(ctx, "rt_substr", vec![s, start, len], Type::Str)
                    .expect("rt_substr returns a value");
                (out, ExprType::Str)
            }
            _ => {
                self.error(line, format!("unknown builtin {name}"));
                (Value::const_int(0), ExprType::Long)
            }
        }
    }

    fn lower_call_fn(
        &mut self,
        ctx: &mut EmitCtx<'_>,
        name: &str,
        args: &[Expr],
        line: u32,
    ) -> (Value, ExprType) {
        let Some(sig) = self.proc_sigs.get(name).cloned() else {
            self.error(line, format!("call to unknown FUNCTION {name}"));
            return (Value::const_int(0), ExprType::Long);
        };
        if args.len() != sig.params.len() {
            self.error(
                line,
                format!(
                    "FUNCTION {name} expects {} argument(s), got {}",
                    sig.params.len(),
                    args.len()
                ),
            );
        }
        let mut lowered = Vec::with_capacity(args.len());
        for (arg_expr, param_ty) in args.iter().zip(&sig.params) {
            let (value, ty) = self.lower_expr(ctx, arg_expr, line);
            lowered.push(self.coerce(ctx, value, ty, *param_ty, line));
        }
        let out = ctx
            .builder
            .emit_call(sig.symbol.clone(), sig.ret.value_type(), lowered);
        let out = out.unwrap_or_else(|| Value::const_int(0));
        ctx.name_result(&out);
        (out, sig.ret)
    }

    /// Lower both operands and promote them to a common numeric
    /// classification (Double when either side is float, Long
    /// otherwise).
    fn promote_pair(
        &mut self,
        ctx: &mut EmitCtx<'_>,
        lhs: &Expr,
        rhs: &Expr,
        line: u32,
    ) -> (Value, Value, ExprType) {
        let lhs_ty = self.classify_expr(lhs);
        let rhs_ty = self.classify_expr(rhs);
        let common = if lhs_ty.is_float() || rhs_ty.is_float() {
            ExprType::Double
        } else {
            ExprType::Long
        };
        let (a, at) = self.lower_expr(ctx, lhs, line);
        let a = self.coerce(ctx, a, at, common, line);
        let (b, bt) = self.lower_expr(ctx, rhs, line);
        let b = self.coerce(ctx, b, bt, common, line);
        (a, b, common)
    }

    /// Convert a value between classifications, emitting conversion
    /// instructions as needed.
    pub(crate) fn coerce(
        &mut self,
        ctx: &mut EmitCtx<'_>,
        value: Value,
        from: ExprType,
        to: ExprType,
        line: u32,
    ) -> Value {
        use ExprType::*;
        if from == to {
            return value;
        }
        match (from, to) {
            // Integer widths share the i64 representation.
            (Integer, Long) | (Long, Integer) => value,
            (Single, Double) | (Double, Single) => value,
            (Integer | Long, Single | Double) => {
                let out = ctx.builder.emit_un(Opcode::Sitofp, Type::F64, value);
                ctx.name_result(&out);
                out
            }
            (Single | Double, Integer | Long) => {
                let out = ctx.builder.emit_un(Opcode::Fptosi, Type::I64, value);
                ctx.name_result(&out);
                out
            }
            (Boolean, Integer | Long) => {
                let out = ctx.builder.emit_un(Opcode::Zext1, Type::I64, value);
                ctx.name_result(&out);
                out
            }
            (Boolean, Single | Double) => {
                let wide = ctx.builder.emit_un(Opcode::Zext1, Type::I64, value);
                ctx.name_result(&wide);
                let out = ctx.builder.emit_un(Opcode::Sitofp, Type::F64, wide);
                ctx.name_result(&out);
                out
            }
            (Integer | Long, Boolean) => {
                let out = ctx.builder.emit_bin(
                    Opcode::ICmpNe,
                    Type::I1,
                    value,
                    Value::const_int(0),
                );
                ctx.name_result(&out);
                out
            }
            (Single | Double, Boolean) => {
                let out = ctx.builder.emit_bin(
                    Opcode::FCmpNe,
                    Type::I1,
                    value,
                    Value::const_float(0.0),
                );
                ctx.name_result(&out);
                out
            }
            (Str, _) | (_, Str) => {
                self.error(line, "string value used where a number is required");
                value
            }
            // Identical classifications were handled by the early return.
            _ => value,
        }
    }

}

fn comparison_opcode(op: BinOp, float: bool) -> Opcode {
    if float {
        match op {
            BinOp::Eq => Opcode::FCmpEq,
            BinOp::Ne => Opcode::FCmpNe,
            BinOp::Lt => Opcode::FCmpLt,
            BinOp::Le => Opcode::FCmpLe,
            BinOp::Gt => Opcode::FCmpGt,
            BinOp::Ge => Opcode::FCmpGe,
            _ => unreachable!("not a comparison"),
        }
    } else {
        match op {
            BinOp::Eq => Opcode::ICmpEq,
            BinOp::Ne => Opcode::ICmpNe,
            BinOp::Lt => Opcode::SCmpLt,
            BinOp::Le => Opcode::SCmpLe,
            BinOp::Gt => Opcode::SCmpGt,
            BinOp::Ge => Opcode::SCmpGe,
            _ => unreachable!("not a comparison"),
        }
    }
}
