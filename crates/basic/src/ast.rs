//! BASIC abstract syntax
//!
//! Produced by the parser, consumed by the scan and emit passes. Every
//! statement carries its 1-based source line for `.loc` trivia and for
//! GOTO/GOSUB/ON ERROR targets.

/// A whole program: the top-level (main) statements plus procedures.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub main: Vec<Stmt>,
    pub procs: Vec<Procedure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcKind {
    Function,
    Sub,
}

#[derive(Debug, Clone)]
pub struct Procedure {
    /// Canonical (upper-cased) name, suffix included for functions.
    pub name: String,
    pub kind: ProcKind,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
    pub line: u32,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    /// `[LET] var = expr`; also `name = expr` for a function's return
    /// value inside that function.
    Assign {
        target: String,
        value: Expr,
        line: u32,
    },
    Print {
        items: Vec<PrintItem>,
        /// False when the list ends with `;` or `,`.
        trailing_newline: bool,
        line: u32,
    },
    Input {
        prompt: Option<String>,
        target: String,
        line: u32,
    },
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        elseifs: Vec<(Expr, Vec<Stmt>)>,
        else_body: Option<Vec<Stmt>>,
        line: u32,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
        line: u32,
    },
    For {
        var: String,
        from: Expr,
        to: Expr,
        step: Option<Expr>,
        body: Vec<Stmt>,
        line: u32,
    },
    Goto {
        target: u32,
        line: u32,
    },
    Gosub {
        target: u32,
        line: u32,
    },
    /// RETURN from a GOSUB.
    Return {
        line: u32,
    },
    /// `ON ERROR GOTO n`; `target == 0` clears the handler.
    OnErrorGoto {
        target: u32,
        line: u32,
    },
    Resume {
        mode: ResumeMode,
        line: u32,
    },
    SelectCase {
        scrutinee: Expr,
        arms: Vec<CaseArm>,
        else_body: Option<Vec<Stmt>>,
        line: u32,
    },
    Dim {
        name: String,
        line: u32,
    },
    Const {
        name: String,
        value: Expr,
        line: u32,
    },
    Randomize {
        seed: Option<Expr>,
        line: u32,
    },
    /// `CALL name(args)` - a SUB invocation.
    Call {
        name: String,
        args: Vec<Expr>,
        line: u32,
    },
    End {
        line: u32,
    },
}

impl Stmt {
    pub fn line(&self) -> u32 {
        match self {
            Stmt::Assign { line, .. }
            | Stmt::Print { line, .. }
            | Stmt::Input { line, .. }
            | Stmt::If { line, .. }
            | Stmt::While { line, .. }
            | Stmt::For { line, .. }
            | Stmt::Goto { line, .. }
            | Stmt::Gosub { line, .. }
            | Stmt::Return { line }
            | Stmt::OnErrorGoto { line, .. }
            | Stmt::Resume { line, .. }
            | Stmt::SelectCase { line, .. }
            | Stmt::Dim { line, .. }
            | Stmt::Const { line, .. }
            | Stmt::Randomize { line, .. }
            | Stmt::Call { line, .. }
            | Stmt::End { line } => *line,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeMode {
    /// Retry the faulting statement.
    Same,
    /// Continue after the faulting statement.
    Next,
    /// Jump to a numbered line.
    Line(u32),
}

#[derive(Debug, Clone)]
pub enum PrintItem {
    Expr(Expr),
    /// `,` - advance to the next print zone.
    Comma,
    /// `;` - no separation.
    Semicolon,
}

#[derive(Debug, Clone)]
pub struct CaseArm {
    pub labels: Vec<CaseLabel>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaseLabel {
    Int(i64),
    Str(String),
    /// A CONST name (admitted by the const-labels feature flag).
    ConstRef(String),
    /// `CHR$(n)` with a literal code (admitted by the same flag).
    Chr(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    IntLit(i64),
    FloatLit(f64),
    StrLit(String),
    /// Canonical (upper-cased) variable reference, type suffix included.
    Var(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Intrinsic call (LEN, CHR$, ABS, ...).
    Builtin {
        name: String,
        args: Vec<Expr>,
    },
    /// User FUNCTION call.
    CallFn {
        name: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    /// `/` floating-point division.
    Div,
    /// `\` integer division.
    IntDiv,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    /// Operator spelling used by the type rules.
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::IntDiv => "\\",
            BinOp::Mod => "MOD",
            BinOp::Pow => "^",
            BinOp::Eq => "=",
            BinOp::Ne => "<>",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "AND",
            BinOp::Or => "OR",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }
}
