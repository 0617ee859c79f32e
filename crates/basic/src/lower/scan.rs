//! Scan pass: type classification and runtime-need detection
//!
//! Walks the AST without emitting IL. Classification runs over the
//! numeric promotion lattice; helper collection is deliberately
//! conservative (recording a helper that ends up unused only costs an
//! extern declaration).

use crate::ast::{BinOp, CaseLabel, Expr, PrintItem, Procedure, Program, Stmt, UnaryOp};
use crate::builtins;
use crate::lower::{ExprType, Lowerer, suffix_type};
use crate::types::{NumericType, TypeRules};
use std::collections::HashMap;

fn to_numeric(ty: ExprType) -> NumericType {
    match ty {
        ExprType::Integer | ExprType::Boolean => NumericType::Integer,
        ExprType::Long => NumericType::Long,
        ExprType::Single => NumericType::Single,
        ExprType::Double => NumericType::Double,
        // Strings never reach the numeric rules; degrade quietly.
        ExprType::Str => NumericType::Long,
    }
}

fn from_numeric(ty: NumericType) -> ExprType {
    match ty {
        NumericType::Integer => ExprType::Integer,
        NumericType::Long => ExprType::Long,
        NumericType::Single => ExprType::Single,
        NumericType::Double => ExprType::Double,
    }
}

impl Lowerer {
    /// Classify the semantic type of an expression.
    pub(crate) fn classify_expr(&self, expr: &Expr) -> ExprType {
        match expr {
            Expr::IntLit(v) => {
                if i16::try_from(*v).is_ok() {
                    ExprType::Integer
                } else {
                    ExprType::Long
                }
            }
            Expr::FloatLit(_) => ExprType::Double,
            Expr::StrLit(_) => ExprType::Str,
            Expr::Var(name) => match self.consts.get(name) {
                Some(value) => self.classify_expr(&value.clone()),
                None => self
                    .var_types
                    .get(name)
                    .copied()
                    .unwrap_or_else(|| suffix_type(name)),
            },
            Expr::Unary { op, operand } => match op {
                UnaryOp::Not => ExprType::Boolean,
                UnaryOp::Neg => {
                    let inner = self.classify_expr(operand);
                    if inner.is_numeric() {
                        from_numeric(TypeRules::unary_result_type('-', to_numeric(inner)))
                    } else {
                        inner
                    }
                }
            },
            Expr::Binary { op, lhs, rhs } => {
                if op.is_comparison() || op.is_logical() {
                    return ExprType::Boolean;
                }
                let lt = self.classify_expr(lhs);
                let rt = self.classify_expr(rhs);
                if *op == BinOp::Add && (lt == ExprType::Str || rt == ExprType::Str) {
                    return ExprType::Str;
                }
                from_numeric(TypeRules::result_type(
                    op.symbol(),
                    to_numeric(lt),
                    to_numeric(rt),
                ))
            }
            Expr::Builtin { name, args } => match name.as_str() {
                // ABS keeps its operand's domain.
                "ABS" => {
                    let inner = args.first().map_or(ExprType::Long, |a| self.classify_expr(a));
                    if inner.is_float() {
                        ExprType::Double
                    } else {
                        ExprType::Long
                    }
                }
                _ => builtins::builtin(name).map_or(ExprType::Double, |b| b.result),
            },
            Expr::CallFn { name, .. } => self
                .proc_sigs
                .get(name)
                .map(|sig| sig.ret)
                .unwrap_or_else(|| suffix_type(name)),
        }
    }

    /// Record every runtime helper the program will need.
    pub(crate) fn scan_program(&mut self, program: &Program) {
        // CONST values first: they affect classification.
        for stmt in program
            .main
            .iter()
            .chain(program.procs.iter().flat_map(|p| p.body.iter()))
        {
            if let Stmt::Const { name, value, .. } = stmt {
                self.consts.insert(name.clone(), value.clone());
            }
        }
        for proc in &program.procs {
            let fresh = self.collect_var_types(&proc.body, &proc.params);
            let saved = std::mem::replace(&mut self.var_types, fresh);
            self.scan_stmts(&proc.body);
            self.var_types = saved;
        }
        self.var_types = self.collect_var_types(&program.main, &[]);
        self.scan_stmts(&program.main);
    }

    fn scan_stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.scan_stmt(stmt);
        }
    }

    fn scan_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Assign { target, value, .. } => {
                self.scan_expr(value);
                if self.target_type(target) == ExprType::Str {
                    self.helpers.insert("rt_str_retain");
                    self.helpers.insert("rt_str_release");
                }
            }
            Stmt::Print { items, .. } => {
                for item in items {
                    match item {
                        PrintItem::Expr(expr) => {
                            self.scan_expr(expr);
                            match self.classify_expr(expr) {
                                ExprType::Str => self.helpers.insert("rt_print_str"),
                                ty if ty.is_float() => self.helpers.insert("rt_print_f64"),
                                _ => self.helpers.insert("rt_print_i64"),
                            };
                        }
                        PrintItem::Comma => {
                            self.helpers.insert("rt_print_str");
                        }
                        PrintItem::Semicolon => {}
                    }
                }
                self.helpers.insert("rt_print_nl");
            }
            Stmt::Input { prompt, target, .. } => {
                if prompt.is_some() {
                    self.helpers.insert("rt_print_str");
                }
                self.helpers.insert("rt_input_str");
                match self.target_type(target) {
                    ExprType::Str => {
                        self.helpers.insert("rt_str_retain");
                        self.helpers.insert("rt_str_release");
                    }
                    ty if ty.is_integral() => {
                        self.helpers.insert("rt_to_int");
                    }
                    _ => {
                        self.helpers.insert("rt_to_f64");
                    }
                }
            }
            Stmt::If {
                cond,
                then_body,
                elseifs,
                else_body,
                ..
            } => {
                self.scan_expr(cond);
                self.scan_stmts(then_body);
                for (elif_cond, body) in elseifs {
                    self.scan_expr(elif_cond);
                    self.scan_stmts(body);
                }
                if let Some(body) = else_body {
                    self.scan_stmts(body);
                }
            }
            Stmt::While { cond, body, .. } => {
                self.scan_expr(cond);
                self.scan_stmts(body);
            }
            Stmt::For {
                from, to, step, body, ..
            } => {
                self.scan_expr(from);
                self.scan_expr(to);
                if let Some(step) = step {
                    self.scan_expr(step);
                }
                self.scan_stmts(body);
            }
            Stmt::SelectCase {
                scrutinee,
                arms,
                else_body,
                ..
            } => {
                self.scan_expr(scrutinee);
                let scrutinee_is_str = self.classify_expr(scrutinee) == ExprType::Str;
                for arm in arms {
                    if scrutinee_is_str
                        || arm
                            .labels
                            .iter()
                            .any(|l| matches!(l, CaseLabel::Str(_) | CaseLabel::Chr(_)))
                    {
                        self.helpers.insert("rt_str_eq");
                    }
                    self.scan_stmts(&arm.body);
                }
                if let Some(body) = else_body {
                    self.scan_stmts(body);
                }
            }
            Stmt::Randomize { seed, .. } => {
                if let Some(seed) = seed {
                    self.scan_expr(seed);
                }
                self.helpers.insert("rt_randomize_i64");
            }
            Stmt::Call { args, .. } => {
                for arg in args {
                    self.scan_expr(arg);
                }
            }
            Stmt::Const { value, .. } => self.scan_expr(value),
            Stmt::Resume { .. }
            | Stmt::OnErrorGoto { .. }
            | Stmt::Goto { .. }
            | Stmt::Gosub { .. }
            | Stmt::Return { .. }
            | Stmt::Dim { .. }
            | Stmt::End { .. } => {}
        }
    }

    pub(crate) fn scan_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::IntLit(_) | Expr::FloatLit(_) | Expr::StrLit(_) | Expr::Var(_) => {}
            Expr::Unary { operand, .. } => self.scan_expr(operand),
            Expr::Binary { op, lhs, rhs } => {
                self.scan_expr(lhs);
                self.scan_expr(rhs);
                let lt = self.classify_expr(lhs);
                let rt = self.classify_expr(rhs);
                if lt == ExprType::Str || rt == ExprType::Str {
                    match op {
                        BinOp::Add => {
                            self.helpers.insert("rt_concat");
                        }
                        BinOp::Eq | BinOp::Ne => {
                            self.helpers.insert("rt_str_eq");
                        }
                        _ => {}
                    }
                }
                if *op == BinOp::Pow {
                    self.helpers.insert("rt_pow_f64_chkdom");
                }
            }
            Expr::Builtin { name, args } => {
                for arg in args {
                    self.scan_expr(arg);
                }
                if let Some(b) = builtins::builtin(name) {
                    match name.as_str() {
                        // ABS and STR$ pick their helper by operand type.
                        "ABS" => {
                            let float = args
                                .first()
                                .is_some_and(|a| self.classify_expr(a).is_float());
                            self.helpers
                                .insert(if float { "rt_abs_f64" } else { "rt_abs_i64_chk" });
                        }
                        "STR$" => {
                            let float = args
                                .first()
                                .is_some_and(|a| self.classify_expr(a).is_float());
                            self.helpers
                                .insert(if float { "rt_f64_to_str" } else { "rt_int_to_str" });
                        }
                        _ => {
                            for helper in b.helpers {
                                self.helpers.insert(helper);
                            }
                        }
                    }
                }
            }
            Expr::CallFn { args, .. } => {
                for arg in args {
                    self.scan_expr(arg);
                }
            }
        }
    }

    fn target_type(&self, name: &str) -> ExprType {
        self.var_types
            .get(name)
            .copied()
            .unwrap_or_else(|| suffix_type(name))
    }

    /// Classify every variable a body can touch, keyed by canonical
    /// name. Suffixes decide the type; unsuffixed names default to
    /// Double.
    pub(crate) fn collect_var_types(
        &self,
        body: &[Stmt],
        params: &[String],
    ) -> HashMap<String, ExprType> {
        let mut types = HashMap::new();
        for param in params {
            types.insert(param.clone(), suffix_type(param));
        }
        for name in self.var_order(body) {
            types.entry(name.clone()).or_insert_with(|| suffix_type(&name));
        }
        types
    }

    /// Variable names in first-touch order, for deterministic cell
    /// layout.
    pub(crate) fn var_order(&self, body: &[Stmt]) -> Vec<String> {
        let mut order = Vec::new();
        collect_targets(body, &mut order);
        order
    }

    pub(crate) fn body_uses_gosub(&self, body: &[Stmt]) -> bool {
        stmt_tree_any(body, &|s| matches!(s, Stmt::Gosub { .. } | Stmt::Return { .. }))
    }

    pub(crate) fn body_uses_on_error(&self, body: &[Stmt]) -> bool {
        stmt_tree_any(body, &|s| {
            matches!(s, Stmt::OnErrorGoto { .. } | Stmt::Resume { .. })
        })
    }
}

fn collect_targets(body: &[Stmt], order: &mut Vec<String>) {
    let mut push = |name: &str, order: &mut Vec<String>| {
        if !order.iter().any(|n| n == name) {
            order.push(name.to_string());
        }
    };
    for stmt in body {
        match stmt {
            Stmt::Assign { target, .. } => push(target, order),
            Stmt::Input { target, .. } => push(target, order),
            Stmt::Dim { name, .. } => push(name, order),
            Stmt::For { var, body, .. } => {
                push(var, order);
                collect_targets(body, order);
            }
            Stmt::If {
                then_body,
                elseifs,
                else_body,
                ..
            } => {
                collect_targets(then_body, order);
                for (_, body) in elseifs {
                    collect_targets(body, order);
                }
                if let Some(body) = else_body {
                    collect_targets(body, order);
                }
            }
            Stmt::While { body, .. } => collect_targets(body, order),
            Stmt::SelectCase {
                arms, else_body, ..
            } => {
                for arm in arms {
                    collect_targets(&arm.body, order);
                }
                if let Some(body) = else_body {
                    collect_targets(body, order);
                }
            }
            _ => {}
        }
    }
}

fn stmt_tree_any(body: &[Stmt], pred: &dyn Fn(&Stmt) -> bool) -> bool {
    body.iter().any(|stmt| {
        if pred(stmt) {
            return true;
        }
        match stmt {
            Stmt::If {
                then_body,
                elseifs,
                else_body,
                ..
            } => {
                stmt_tree_any(then_body, pred)
                    || elseifs.iter().any(|(_, b)| stmt_tree_any(b, pred))
                    || else_body.as_ref().is_some_and(|b| stmt_tree_any(b, pred))
            }
            Stmt::While { body, .. } | Stmt::For { body, .. } => stmt_tree_any(body, pred),
            Stmt::SelectCase {
                arms, else_body, ..
            } => {
                arms.iter().any(|a| stmt_tree_any(&a.body, pred))
                    || else_body.as_ref().is_some_and(|b| stmt_tree_any(b, pred))
            }
            _ => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use std::collections::BTreeSet;

    fn scanned(source: &str) -> Lowerer {
        let program = Parser::new(source).parse().unwrap();
        let mut lowerer = Lowerer {
            helpers: BTreeSet::new(),
            consts: HashMap::new(),
            proc_sigs: HashMap::new(),
            var_types: HashMap::new(),
            errors: Vec::new(),
        };
        lowerer.scan_program(&program);
        lowerer
    }

    #[test]
    fn test_classifies_literals_and_suffixes() {
        let lowerer = scanned("x = 1\n");
        assert_eq!(lowerer.classify_expr(&Expr::IntLit(5)), ExprType::Integer);
        assert_eq!(
            lowerer.classify_expr(&Expr::IntLit(100_000)),
            ExprType::Long
        );
        assert_eq!(lowerer.classify_expr(&Expr::FloatLit(1.5)), ExprType::Double);
        assert_eq!(
            lowerer.classify_expr(&Expr::Var("N%".to_string())),
            ExprType::Integer
        );
        assert_eq!(
            lowerer.classify_expr(&Expr::Var("S$".to_string())),
            ExprType::Str
        );
        assert_eq!(
            lowerer.classify_expr(&Expr::Var("D".to_string())),
            ExprType::Double
        );
    }

    #[test]
    fn test_promotion_through_binary() {
        let lowerer = scanned("x = 1\n");
        let mixed = Expr::Binary {
            op: BinOp::Add,
            lhs: Box::new(Expr::Var("N%".to_string())),
            rhs: Box::new(Expr::FloatLit(0.5)),
        };
        assert_eq!(lowerer.classify_expr(&mixed), ExprType::Double);

        let cmp = Expr::Binary {
            op: BinOp::Lt,
            lhs: Box::new(Expr::IntLit(1)),
            rhs: Box::new(Expr::IntLit(2)),
        };
        assert_eq!(lowerer.classify_expr(&cmp), ExprType::Boolean);
    }

    #[test]
    fn test_print_records_helpers() {
        let lowerer = scanned("PRINT \"hi\"; 42\n");
        assert!(lowerer.helpers.contains("rt_print_str"));
        assert!(lowerer.helpers.contains("rt_print_i64"));
        assert!(lowerer.helpers.contains("rt_print_nl"));
    }

    #[test]
    fn test_pow_and_string_ops_record_helpers() {
        let lowerer = scanned("x = 2 ^ 3\ns$ = \"a\" + \"b\"\nIF s$ = \"ab\" THEN PRINT 1\n");
        assert!(lowerer.helpers.contains("rt_pow_f64_chkdom"));
        assert!(lowerer.helpers.contains("rt_concat"));
        assert!(lowerer.helpers.contains("rt_str_eq"));
    }

    #[test]
    fn test_builtin_helpers_by_operand_type() {
        let lowerer = scanned("a = ABS(x#)\nb = ABS(n%)\n");
        assert!(lowerer.helpers.contains("rt_abs_f64"));
        assert!(lowerer.helpers.contains("rt_abs_i64_chk"));
    }

    #[test]
    fn test_gosub_and_on_error_detection() {
        let program = Parser::new("10 GOSUB 100\n100 RETURN\n").parse().unwrap();
        let lowerer = scanned("x = 1\n");
        assert!(lowerer.body_uses_gosub(&program.main));
        assert!(!lowerer.body_uses_on_error(&program.main));

        let program = Parser::new("10 ON ERROR GOTO 99\n99 RESUME NEXT\n")
            .parse()
            .unwrap();
        assert!(lowerer.body_uses_on_error(&program.main));
    }

    #[test]
    fn test_var_order_is_first_touch() {
        let program = Parser::new("b = 1\na = 2\nb = 3\nFOR i = 1 TO 2\nc = 4\nNEXT\n")
            .parse()
            .unwrap();
        let lowerer = scanned("x = 1\n");
        assert_eq!(
            lowerer.var_order(&program.main),
            vec!["B", "A", "I", "C"]
        );
    }
}
