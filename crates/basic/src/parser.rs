//! BASIC parser
//!
//! Recursive descent over the token stream. Statements end at end of
//! line (or `:`); block constructs (IF/WHILE/FOR/SELECT, procedures)
//! span lines until their closing keyword. A leading integer literal on
//! a line is its BASIC line number and becomes the line recorded on the
//! statements it carries.

use crate::ast::{
    BinOp, CaseArm, CaseLabel, Expr, PrintItem, ProcKind, Procedure, Program, ResumeMode, Stmt,
    UnaryOp,
};
use crate::builtins;
use crate::lexer::{Token, TokenKind, tokenize};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// BASIC line number of the current source line, when present.
    current_line: u32,
}

impl Parser {
    pub fn new(source: &str) -> Parser {
        let tokens = tokenize(source).unwrap_or_else(|err| {
            // Surface the lexer error through parse() with a poisoned
            // stream rather than panicking here.
            vec![Token {
                kind: TokenKind::StrLit(format!("<<<LEX_ERROR>>>{err}")),
                line: 0,
                col: 0,
            }]
        });
        Parser {
            tokens,
            pos: 0,
            current_line: 0,
        }
    }

    pub fn parse(&mut self) -> Result<Program, String> {
        if let Some(Token {
            kind: TokenKind::StrLit(s),
            ..
        }) = self.tokens.first()
            && let Some(err) = s.strip_prefix("<<<LEX_ERROR>>>")
        {
            return Err(err.to_string());
        }

        let mut program = Program::default();
        loop {
            self.skip_eols();
            if self.at_eof() {
                break;
            }
            if self.check_ident("FUNCTION") {
                program.procs.push(self.parse_procedure(ProcKind::Function)?);
            } else if self.check_ident("SUB") {
                program.procs.push(self.parse_procedure(ProcKind::Sub)?);
            } else {
                self.parse_line_into(&mut program.main)?;
            }
        }
        Ok(program)
    }

    // ------------------------------------------------------------------
    // Token plumbing

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn peek_token(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.tokens[self.pos.min(self.tokens.len() - 1)].kind.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        kind
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    fn at_eol(&self) -> bool {
        matches!(self.peek(), TokenKind::Eol | TokenKind::Eof)
    }

    fn skip_eols(&mut self) {
        while matches!(self.peek(), TokenKind::Eol) {
            self.pos += 1;
        }
    }

    fn err(&self, message: impl Into<String>) -> String {
        let token = self.peek_token();
        format!("line {}: {}", token.line.max(self.current_line), message.into())
    }

    fn check_ident(&self, word: &str) -> bool {
        matches!(self.peek(), TokenKind::Ident(w) if w == word)
    }

    fn eat_ident(&mut self, word: &str) -> bool {
        if self.check_ident(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_ident(&mut self, word: &str) -> Result<(), String> {
        if self.eat_ident(word) {
            Ok(())
        } else {
            Err(self.err(format!("expected {word}")))
        }
    }

    fn check_sym(&self, sym: &str) -> bool {
        matches!(self.peek(), TokenKind::Sym(s) if *s == sym)
    }

    fn eat_sym(&mut self, sym: &str) -> bool {
        if self.check_sym(sym) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_sym(&mut self, sym: &str) -> Result<(), String> {
        if self.eat_sym(sym) {
            Ok(())
        } else {
            Err(self.err(format!("expected '{sym}'")))
        }
    }

    fn expect_any_ident(&mut self) -> Result<String, String> {
        match self.advance() {
            TokenKind::Ident(word) => Ok(word),
            other => Err(self.err(format!("expected identifier, found {other:?}"))),
        }
    }

    fn expect_int(&mut self) -> Result<i64, String> {
        match self.advance() {
            TokenKind::IntLit(v) => Ok(v),
            other => Err(self.err(format!("expected integer, found {other:?}"))),
        }
    }

    fn expect_eol(&mut self) -> Result<(), String> {
        if self.at_eol() {
            if !self.at_eof() {
                self.advance();
            }
            Ok(())
        } else {
            Err(self.err("expected end of line"))
        }
    }

    /// Peek whether the current line starts with `first` (and optionally
    /// `second`) without consuming anything.
    fn line_starts_with(&self, first: &str, second: Option<&str>) -> bool {
        if !self.check_ident(first) {
            return false;
        }
        match second {
            None => true,
            Some(word) => {
                matches!(self.tokens.get(self.pos + 1).map(|t| &t.kind),
                    Some(TokenKind::Ident(w)) if w == word)
            }
        }
    }

    // ------------------------------------------------------------------
    // Statements

    /// Parse one source line (with optional BASIC line number) into a
    /// statement list.
    fn parse_line_into(&mut self, out: &mut Vec<Stmt>) -> Result<(), String> {
        if let TokenKind::IntLit(n) = self.peek() {
            self.current_line = *n as u32;
            self.advance();
        } else {
            self.current_line = self.peek_token().line;
        }
        if self.at_eol() {
            // A bare line number labels the next statement's line.
            self.expect_eol()?;
            return Ok(());
        }
        loop {
            let stmt = self.parse_stmt()?;
            out.push(stmt);
            if self.eat_sym(":") {
                continue;
            }
            break;
        }
        self.expect_eol()
    }

    /// Statement lines until one of `terminators` begins a line. The
    /// terminator is not consumed.
    fn parse_body_until(&mut self, terminators: &[(&str, Option<&str>)]) -> Result<Vec<Stmt>, String> {
        let mut body = Vec::new();
        loop {
            self.skip_eols();
            if self.at_eof() {
                return Err(self.err("unexpected end of input inside block"));
            }
            // A numbered line inside a block keeps its number.
            if let TokenKind::IntLit(n) = self.peek() {
                let saved = self.pos;
                let n = *n as u32;
                self.advance();
                if terminators
                    .iter()
                    .any(|(a, b)| self.line_starts_with(a, *b))
                {
                    self.pos = saved;
                    return Ok(body);
                }
                self.current_line = n;
                if self.at_eol() {
                    self.expect_eol()?;
                    continue;
                }
            } else if terminators
                .iter()
                .any(|(a, b)| self.line_starts_with(a, *b))
            {
                return Ok(body);
            } else {
                self.current_line = self.peek_token().line;
            }
            loop {
                body.push(self.parse_stmt()?);
                if self.eat_sym(":") {
                    continue;
                }
                break;
            }
            self.expect_eol()?;
        }
    }

    fn parse_stmt(&mut self) -> Result<Stmt, String> {
        let line = self.current_line;
        let TokenKind::Ident(word) = self.peek().clone() else {
            return Err(self.err("expected a statement"));
        };
        match word.as_str() {
            "LET" => {
                self.advance();
                self.parse_assignment(line)
            }
            "PRINT" => {
                self.advance();
                self.parse_print(line)
            }
            "INPUT" => {
                self.advance();
                let prompt = if let TokenKind::StrLit(p) = self.peek().clone() {
                    self.advance();
                    if !self.eat_sym(",") {
                        self.expect_sym(";")?;
                    }
                    Some(p)
                } else {
                    None
                };
                let target = self.expect_any_ident()?;
                Ok(Stmt::Input {
                    prompt,
                    target,
                    line,
                })
            }
            "IF" => {
                self.advance();
                self.parse_if(line)
            }
            "WHILE" => {
                self.advance();
                let cond = self.parse_expr()?;
                self.expect_eol()?;
                let body = self.parse_body_until(&[("WEND", None)])?;
                self.expect_ident("WEND")?;
                Ok(Stmt::While { cond, body, line })
            }
            "FOR" => {
                self.advance();
                let var = self.expect_any_ident()?;
                self.expect_sym("=")?;
                let from = self.parse_expr()?;
                self.expect_ident("TO")?;
                let to = self.parse_expr()?;
                let step = if self.eat_ident("STEP") {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                self.expect_eol()?;
                let body = self.parse_body_until(&[("NEXT", None)])?;
                self.expect_ident("NEXT")?;
                // Optional loop variable after NEXT.
                if let TokenKind::Ident(_) = self.peek() {
                    self.advance();
                }
                Ok(Stmt::For {
                    var,
                    from,
                    to,
                    step,
                    body,
                    line,
                })
            }
            "GOTO" => {
                self.advance();
                let target = self.expect_int()? as u32;
                Ok(Stmt::Goto { target, line })
            }
            "GOSUB" => {
                self.advance();
                let target = self.expect_int()? as u32;
                Ok(Stmt::Gosub { target, line })
            }
            "RETURN" => {
                self.advance();
                Ok(Stmt::Return { line })
            }
            "ON" => {
                self.advance();
                self.expect_ident("ERROR")?;
                self.expect_ident("GOTO")?;
                let target = self.expect_int()? as u32;
                Ok(Stmt::OnErrorGoto { target, line })
            }
            "RESUME" => {
                self.advance();
                let mode = if self.eat_ident("NEXT") {
                    ResumeMode::Next
                } else if let TokenKind::IntLit(n) = self.peek().clone() {
                    self.advance();
                    ResumeMode::Line(n as u32)
                } else {
                    ResumeMode::Same
                };
                Ok(Stmt::Resume { mode, line })
            }
            "SELECT" => {
                self.advance();
                self.expect_ident("CASE")?;
                self.parse_select(line)
            }
            "DIM" => {
                self.advance();
                let name = self.expect_any_ident()?;
                // Tolerate an `AS <type>` tail.
                if self.eat_ident("AS") {
                    let _ = self.expect_any_ident()?;
                }
                Ok(Stmt::Dim { name, line })
            }
            "CONST" => {
                self.advance();
                let name = self.expect_any_ident()?;
                self.expect_sym("=")?;
                let value = self.parse_expr()?;
                Ok(Stmt::Const { name, value, line })
            }
            "RANDOMIZE" => {
                self.advance();
                let seed = if self.at_eol() || self.check_sym(":") {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                Ok(Stmt::Randomize { seed, line })
            }
            "CALL" => {
                self.advance();
                let name = self.expect_any_ident()?;
                let mut args = Vec::new();
                if self.eat_sym("(") {
                    if !self.eat_sym(")") {
                        loop {
                            args.push(self.parse_expr()?);
                            if self.eat_sym(",") {
                                continue;
                            }
                            self.expect_sym(")")?;
                            break;
                        }
                    }
                }
                Ok(Stmt::Call { name, args, line })
            }
            "END" => {
                self.advance();
                Ok(Stmt::End { line })
            }
            _ => self.parse_assignment(line),
        }
    }

    fn parse_assignment(&mut self, line: u32) -> Result<Stmt, String> {
        let target = self.expect_any_ident()?;
        self.expect_sym("=")?;
        let value = self.parse_expr()?;
        Ok(Stmt::Assign {
            target,
            value,
            line,
        })
    }

    fn parse_print(&mut self, line: u32) -> Result<Stmt, String> {
        let mut items = Vec::new();
        let mut trailing_newline = true;
        while !self.at_eol() && !self.check_sym(":") {
            if self.eat_sym(";") {
                items.push(PrintItem::Semicolon);
                trailing_newline = false;
                continue;
            }
            if self.eat_sym(",") {
                items.push(PrintItem::Comma);
                trailing_newline = false;
                continue;
            }
            items.push(PrintItem::Expr(self.parse_expr()?));
            trailing_newline = true;
        }
        Ok(Stmt::Print {
            items,
            trailing_newline,
            line,
        })
    }

    fn parse_if(&mut self, line: u32) -> Result<Stmt, String> {
        let cond = self.parse_expr()?;
        self.expect_ident("THEN")?;
        if self.at_eol() {
            // Block form.
            self.expect_eol()?;
            let then_body = self.parse_body_until(&[
                ("ELSEIF", None),
                ("ELSE", None),
                ("END", Some("IF")),
            ])?;
            let mut elseifs = Vec::new();
            let mut else_body = None;
            loop {
                self.skip_eols();
                if self.eat_ident("ELSEIF") {
                    let elif_cond = self.parse_expr()?;
                    self.expect_ident("THEN")?;
                    self.expect_eol()?;
                    let body = self.parse_body_until(&[
                        ("ELSEIF", None),
                        ("ELSE", None),
                        ("END", Some("IF")),
                    ])?;
                    elseifs.push((elif_cond, body));
                    continue;
                }
                if self.eat_ident("ELSE") {
                    self.expect_eol()?;
                    else_body = Some(self.parse_body_until(&[("END", Some("IF"))])?);
                }
                break;
            }
            self.expect_ident("END")?;
            self.expect_ident("IF")?;
            Ok(Stmt::If {
                cond,
                then_body,
                elseifs,
                else_body,
                line,
            })
        } else {
            // Single-line form: IF c THEN stmt [ELSE stmt]
            let then_stmt = self.parse_stmt()?;
            let else_body = if self.eat_ident("ELSE") {
                Some(vec![self.parse_stmt()?])
            } else {
                None
            };
            Ok(Stmt::If {
                cond,
                then_body: vec![then_stmt],
                elseifs: Vec::new(),
                else_body,
                line,
            })
        }
    }

    fn parse_select(&mut self, line: u32) -> Result<Stmt, String> {
        let scrutinee = self.parse_expr()?;
        self.expect_eol()?;
        let mut arms = Vec::new();
        let mut else_body = None;
        loop {
            self.skip_eols();
            if self.line_starts_with("END", Some("SELECT")) {
                break;
            }
            self.expect_ident("CASE")?;
            if self.eat_ident("ELSE") {
                self.expect_eol()?;
                else_body = Some(self.parse_body_until(&[
                    ("CASE", None),
                    ("END", Some("SELECT")),
                ])?);
                continue;
            }
            let mut labels = vec![self.parse_case_label()?];
            while self.eat_sym(",") {
                labels.push(self.parse_case_label()?);
            }
            self.expect_eol()?;
            let body =
                self.parse_body_until(&[("CASE", None), ("END", Some("SELECT"))])?;
            arms.push(CaseArm { labels, body });
        }
        self.expect_ident("END")?;
        self.expect_ident("SELECT")?;
        Ok(Stmt::SelectCase {
            scrutinee,
            arms,
            else_body,
            line,
        })
    }

    fn parse_case_label(&mut self) -> Result<CaseLabel, String> {
        match self.peek().clone() {
            TokenKind::IntLit(v) => {
                self.advance();
                Ok(CaseLabel::Int(v))
            }
            TokenKind::Sym("-") => {
                self.advance();
                let v = self.expect_int()?;
                Ok(CaseLabel::Int(-v))
            }
            TokenKind::StrLit(s) => {
                self.advance();
                Ok(CaseLabel::Str(s))
            }
            TokenKind::Ident(word) if word == "CHR$" => {
                self.advance();
                self.expect_sym("(")?;
                let code = self.expect_int()?;
                self.expect_sym(")")?;
                Ok(CaseLabel::Chr(code))
            }
            TokenKind::Ident(word) => {
                self.advance();
                Ok(CaseLabel::ConstRef(word))
            }
            other => Err(self.err(format!("invalid CASE label {other:?}"))),
        }
    }

    fn parse_procedure(&mut self, kind: ProcKind) -> Result<Procedure, String> {
        let line = self.peek_token().line;
        self.advance(); // FUNCTION / SUB
        let name = self.expect_any_ident()?;
        let mut params = Vec::new();
        if self.eat_sym("(") {
            if !self.eat_sym(")") {
                loop {
                    params.push(self.expect_any_ident()?);
                    if self.eat_sym(",") {
                        continue;
                    }
                    self.expect_sym(")")?;
                    break;
                }
            }
        }
        self.expect_eol()?;
        let closer = match kind {
            ProcKind::Function => "FUNCTION",
            ProcKind::Sub => "SUB",
        };
        let body = self.parse_body_until(&[("END", Some(closer))])?;
        self.expect_ident("END")?;
        self.expect_ident(closer)?;
        Ok(Procedure {
            name,
            kind,
            params,
            body,
            line,
        })
    }

    // ------------------------------------------------------------------
    // Expressions, loosest to tightest binding.

    pub fn parse_expr(&mut self) -> Result<Expr, String> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_and()?;
        while self.eat_ident("OR") {
            let rhs = self.parse_and()?;
            lhs = Expr::Binary {
                op: BinOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_not()?;
        while self.eat_ident("AND") {
            let rhs = self.parse_not()?;
            lhs = Expr::Binary {
                op: BinOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, String> {
        if self.eat_ident("NOT") {
            let operand = self.parse_not()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, String> {
        let lhs = self.parse_additive()?;
        let op = if self.eat_sym("=") {
            BinOp::Eq
        } else if self.eat_sym("<>") {
            BinOp::Ne
        } else if self.eat_sym("<=") {
            BinOp::Le
        } else if self.eat_sym(">=") {
            BinOp::Ge
        } else if self.eat_sym("<") {
            BinOp::Lt
        } else if self.eat_sym(">") {
            BinOp::Gt
        } else {
            return Ok(lhs);
        };
        let rhs = self.parse_additive()?;
        Ok(Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn parse_additive(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_mod()?;
        loop {
            let op = if self.eat_sym("+") {
                BinOp::Add
            } else if self.eat_sym("-") {
                BinOp::Sub
            } else {
                return Ok(lhs);
            };
            let rhs = self.parse_mod()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_mod(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_int_div()?;
        while self.eat_ident("MOD") {
            let rhs = self.parse_int_div()?;
            lhs = Expr::Binary {
                op: BinOp::Mod,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_int_div(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_multiplicative()?;
        while self.eat_sym("\\") {
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary {
                op: BinOp::IntDiv,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = if self.eat_sym("*") {
                BinOp::Mul
            } else if self.eat_sym("/") {
                BinOp::Div
            } else {
                return Ok(lhs);
            };
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        if self.eat_sym("-") {
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        if self.eat_sym("+") {
            return self.parse_unary();
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr, String> {
        let base = self.parse_primary()?;
        if self.eat_sym("^") {
            // Right-associative.
            let exp = self.parse_unary()?;
            return Ok(Expr::Binary {
                op: BinOp::Pow,
                lhs: Box::new(base),
                rhs: Box::new(exp),
            });
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.peek().clone() {
            TokenKind::IntLit(v) => {
                self.advance();
                Ok(Expr::IntLit(v))
            }
            TokenKind::FloatLit(v) => {
                self.advance();
                Ok(Expr::FloatLit(v))
            }
            TokenKind::StrLit(s) => {
                self.advance();
                Ok(Expr::StrLit(s))
            }
            TokenKind::Sym("(") => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect_sym(")")?;
                Ok(inner)
            }
            TokenKind::Ident(word) => {
                self.advance();
                if self.check_sym("(") {
                    self.advance();
                    let mut args = Vec::new();
                    if !self.eat_sym(")") {
                        loop {
                            args.push(self.parse_expr()?);
                            if self.eat_sym(",") {
                                continue;
                            }
                            self.expect_sym(")")?;
                            break;
                        }
                    }
                    if builtins::builtin(&word).is_some() {
                        Ok(Expr::Builtin { name: word, args })
                    } else {
                        Ok(Expr::CallFn { name: word, args })
                    }
                } else if builtins::builtin(&word).is_some_and(|b| b.arity == 0) {
                    Ok(Expr::Builtin {
                        name: word,
                        args: Vec::new(),
                    })
                } else {
                    Ok(Expr::Var(word))
                }
            }
            other => Err(self.err(format!("unexpected token {other:?} in expression"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Program {
        Parser::new(source).parse().expect("program must parse")
    }

    #[test]
    fn test_numbered_lines_and_assignment() {
        let program = parse("10 LET x = 5\n20 y = x + 1\n");
        assert_eq!(program.main.len(), 2);
        match &program.main[0] {
            Stmt::Assign { target, line, .. } => {
                assert_eq!(target, "X");
                assert_eq!(*line, 10);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(program.main[1].line(), 20);
    }

    #[test]
    fn test_print_with_separators() {
        let program = parse("PRINT \"A\"; 1, 2\n");
        let Stmt::Print { items, .. } = &program.main[0] else {
            panic!("expected PRINT");
        };
        assert_eq!(items.len(), 5);
        assert!(matches!(items[1], PrintItem::Semicolon));
        assert!(matches!(items[3], PrintItem::Comma));
    }

    #[test]
    fn test_single_line_if_else() {
        let program = parse("IF x > 0 THEN PRINT 1 ELSE PRINT 2\n");
        let Stmt::If {
            then_body,
            else_body,
            ..
        } = &program.main[0]
        else {
            panic!("expected IF");
        };
        assert_eq!(then_body.len(), 1);
        assert_eq!(else_body.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_block_if_with_elseif() {
        let program = parse(
            "IF x = 1 THEN\n\
             PRINT 1\n\
             ELSEIF x = 2 THEN\n\
             PRINT 2\n\
             ELSE\n\
             PRINT 3\n\
             END IF\n",
        );
        let Stmt::If {
            elseifs, else_body, ..
        } = &program.main[0]
        else {
            panic!("expected IF");
        };
        assert_eq!(elseifs.len(), 1);
        assert!(else_body.is_some());
    }

    #[test]
    fn test_while_and_for() {
        let program = parse(
            "WHILE n < 10\n\
             n = n + 1\n\
             WEND\n\
             FOR i = 1 TO 5 STEP 2\n\
             PRINT i\n\
             NEXT i\n",
        );
        assert!(matches!(program.main[0], Stmt::While { .. }));
        let Stmt::For { step, .. } = &program.main[1] else {
            panic!("expected FOR");
        };
        assert!(step.is_some());
    }

    #[test]
    fn test_on_error_and_resume() {
        let program = parse(
            "10 ON ERROR GOTO 100\n\
             20 RESUME NEXT\n\
             30 RESUME 10\n\
             40 RESUME\n\
             50 ON ERROR GOTO 0\n",
        );
        assert!(matches!(
            program.main[0],
            Stmt::OnErrorGoto { target: 100, .. }
        ));
        assert!(matches!(
            program.main[1],
            Stmt::Resume {
                mode: ResumeMode::Next,
                ..
            }
        ));
        assert!(matches!(
            program.main[2],
            Stmt::Resume {
                mode: ResumeMode::Line(10),
                ..
            }
        ));
        assert!(matches!(
            program.main[3],
            Stmt::Resume {
                mode: ResumeMode::Same,
                ..
            }
        ));
        assert!(matches!(
            program.main[4],
            Stmt::OnErrorGoto { target: 0, .. }
        ));
    }

    #[test]
    fn test_select_case() {
        let program = parse(
            "SELECT CASE n\n\
             CASE 1, 2\n\
             PRINT \"low\"\n\
             CASE 3\n\
             PRINT \"three\"\n\
             CASE ELSE\n\
             PRINT \"other\"\n\
             END SELECT\n",
        );
        let Stmt::SelectCase {
            arms, else_body, ..
        } = &program.main[0]
        else {
            panic!("expected SELECT CASE");
        };
        assert_eq!(arms.len(), 2);
        assert_eq!(arms[0].labels, vec![CaseLabel::Int(1), CaseLabel::Int(2)]);
        assert!(else_body.is_some());
    }

    #[test]
    fn test_select_case_chr_label() {
        let program = parse(
            "SELECT CASE c\n\
             CASE CHR$(65)\n\
             PRINT \"A\"\n\
             END SELECT\n",
        );
        let Stmt::SelectCase { arms, .. } = &program.main[0] else {
            panic!("expected SELECT CASE");
        };
        assert_eq!(arms[0].labels, vec![CaseLabel::Chr(65)]);
    }

    #[test]
    fn test_procedures() {
        let program = parse(
            "FUNCTION ADDONE(n)\n\
             ADDONE = n + 1\n\
             END FUNCTION\n\
             SUB GREET(name$)\n\
             PRINT name$\n\
             END SUB\n\
             10 PRINT ADDONE(4)\n\
             20 CALL GREET(\"hi\")\n",
        );
        assert_eq!(program.procs.len(), 2);
        assert_eq!(program.procs[0].kind, ProcKind::Function);
        assert_eq!(program.procs[1].params, vec!["NAME$".to_string()]);
        assert_eq!(program.main.len(), 2);
    }

    #[test]
    fn test_operator_precedence() {
        let program = parse("x = 1 + 2 * 3\n");
        let Stmt::Assign { value, .. } = &program.main[0] else {
            panic!();
        };
        // The addition is at the root.
        let Expr::Binary { op: BinOp::Add, rhs, .. } = value else {
            panic!("expected + at root, got {value:?}");
        };
        assert!(matches!(**rhs, Expr::Binary { op: BinOp::Mul, .. }));
    }

    #[test]
    fn test_power_is_right_associative_and_tight() {
        let program = parse("x = -2 ^ 2\n");
        let Stmt::Assign { value, .. } = &program.main[0] else {
            panic!();
        };
        // Parses as -(2^2).
        assert!(matches!(
            value,
            Expr::Unary {
                op: UnaryOp::Neg,
                ..
            }
        ));
    }

    #[test]
    fn test_builtin_vs_user_call() {
        let program = parse("x = LEN(a$) + F(3)\n");
        let Stmt::Assign { value, .. } = &program.main[0] else {
            panic!();
        };
        let Expr::Binary { lhs, rhs, .. } = value else {
            panic!();
        };
        assert!(matches!(**lhs, Expr::Builtin { .. }));
        assert!(matches!(**rhs, Expr::CallFn { .. }));
    }

    #[test]
    fn test_gosub_return() {
        let program = parse("10 GOSUB 100\n20 END\n100 PRINT 1\n110 RETURN\n");
        assert!(matches!(program.main[0], Stmt::Gosub { target: 100, .. }));
        assert!(matches!(program.main[3], Stmt::Return { .. }));
    }
}
