//! Textual IL reader
//!
//! Line-oriented: every extern, global, block header, and instruction
//! occupies one line. `.loc` trivia is accepted both as a trailing
//! `; .loc f l c` comment and as a standalone `.loc f l c` line that
//! attaches to the next instruction. `%name` operands are interned to
//! dense temp ids per function; call return types are resolved from the
//! callee's signature once the whole module has been read.

use crate::block::{BasicBlock, Param};
use crate::func::{FuncParam, Function};
use crate::instr::{Instr, Opcode, SourceLoc, TrapKind};
use crate::module::{Extern, Global, Module};
use crate::types::Type;
use crate::value::{Value, parse_float};
use std::collections::HashMap;

/// Parse a textual module. Errors carry the 1-based source line.
pub fn parse_module(text: &str) -> Result<Module, String> {
    ParserState::new().parse(text)
}

struct FuncState {
    function: Function,
    /// Interned temp names for this function.
    names: HashMap<String, u32>,
    next_temp: u32,
    current_block: Option<usize>,
    pending_loc: Option<SourceLoc>,
}

impl FuncState {
    fn intern(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.names.get(name) {
            return id;
        }
        let id = self.next_temp;
        self.next_temp += 1;
        self.names.insert(name.to_string(), id);
        self.function.set_value_name(id, name);
        id
    }
}

struct ParserState {
    module: Module,
    func: Option<FuncState>,
    saw_version: bool,
}

impl ParserState {
    fn new() -> ParserState {
        ParserState {
            module: Module::default(),
            func: None,
            saw_version: false,
        }
    }

    fn parse(mut self, text: &str) -> Result<Module, String> {
        for (idx, raw) in text.lines().enumerate() {
            let lineno = idx + 1;
            self.parse_line(raw, lineno)
                .map_err(|e| format!("line {lineno}: {e}"))?;
        }
        if self.func.is_some() {
            return Err("unexpected end of input inside function body".to_string());
        }
        self.resolve_call_types();
        Ok(self.module)
    }

    fn parse_line(&mut self, raw: &str, _lineno: usize) -> Result<(), String> {
        // Split off the comment, honouring string literals; a `; .loc`
        // comment becomes the instruction's location.
        let (content, trailing_loc) = split_comment(raw)?;
        let line = content.trim();
        if line.is_empty() {
            return Ok(());
        }

        if let Some(rest) = line.strip_prefix("il ") {
            if self.saw_version {
                return Err("duplicate version header".to_string());
            }
            self.module.version = parse_version(rest.trim())?;
            self.saw_version = true;
            return Ok(());
        }
        if let Some(rest) = line.strip_prefix("extern ") {
            self.module.externs.push(parse_extern(rest.trim())?);
            return Ok(());
        }
        if let Some(rest) = line.strip_prefix("global ") {
            self.module.globals.push(parse_global(rest.trim())?);
            return Ok(());
        }
        if let Some(rest) = line.strip_prefix("func ") {
            if self.func.is_some() {
                return Err("nested function definition".to_string());
            }
            self.func = Some(parse_func_header(rest.trim())?);
            return Ok(());
        }
        if line == "}" {
            let state = self
                .func
                .take()
                .ok_or_else(|| "stray '}' outside function".to_string())?;
            self.module.functions.push(state.function);
            return Ok(());
        }

        let func = self
            .func
            .as_mut()
            .ok_or_else(|| format!("unexpected top-level content '{line}'"))?;

        if let Some(rest) = line.strip_prefix(".loc ") {
            func.pending_loc = Some(parse_loc(rest.trim())?);
            return Ok(());
        }

        if is_block_header(line) {
            let block = parse_block_header(line, func)?;
            func.function.blocks.push(block);
            func.current_block = Some(func.function.blocks.len() - 1);
            // The entry block without explicit params inherits the
            // function's parameters.
            if func.function.blocks.len() == 1 && func.function.blocks[0].params.is_empty() {
                let params: Vec<(String, Type)> = func
                    .function
                    .params
                    .iter()
                    .map(|p| (p.name.clone(), p.ty))
                    .collect();
                for (name, ty) in params {
                    let id = func.intern(&name);
                    func.function.blocks[0].params.push(Param { name, id, ty });
                }
            }
            return Ok(());
        }

        // Anything else is an instruction.
        let mut instr = parse_instr(line, func)?;
        if let Some(loc) = trailing_loc.or(func.pending_loc.take()) {
            instr.loc = loc;
        }
        let block_idx = func
            .current_block
            .ok_or_else(|| "instruction outside of a block".to_string())?;
        let is_term = instr.is_terminator();
        let block = &mut func.function.blocks[block_idx];
        if block.terminated {
            return Err(format!(
                "instruction after terminator in block '{}'",
                block.label
            ));
        }
        block.instructions.push(instr);
        if is_term {
            block.terminated = true;
        }
        Ok(())
    }

    /// Patch call instructions with the return type declared by their
    /// callee (extern or function).
    fn resolve_call_types(&mut self) {
        let mut rets: HashMap<String, Type> = HashMap::new();
        for ext in &self.module.externs {
            rets.insert(ext.name.clone(), ext.ret);
        }
        for f in &self.module.functions {
            rets.insert(f.name.clone(), f.ret);
        }
        for function in &mut self.module.functions {
            for block in &mut function.blocks {
                for instr in &mut block.instructions {
                    if instr.op == Opcode::Call
                        && let Some(callee) = &instr.callee
                        && let Some(ret) = rets.get(callee)
                    {
                        instr.ty = *ret;
                    }
                }
            }
        }
    }
}

/// Split a line at the first `;` outside a string literal. A comment of
/// the form `.loc f l c` is returned as a parsed location.
fn split_comment(raw: &str) -> Result<(&str, Option<SourceLoc>), String> {
    let bytes = raw.as_bytes();
    let mut in_str = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'\\' if in_str && !escaped => {
                escaped = true;
                continue;
            }
            b'"' if !escaped => in_str = !in_str,
            b';' if !in_str => {
                let comment = raw[i + 1..].trim();
                let loc = match comment.strip_prefix(".loc ") {
                    Some(rest) => Some(parse_loc(rest.trim())?),
                    None => None,
                };
                return Ok((&raw[..i], loc));
            }
            _ => {}
        }
        escaped = false;
    }
    Ok((raw, None))
}

fn parse_version(text: &str) -> Result<(u32, u32, u32), String> {
    let parts: Vec<&str> = text.split('.').collect();
    if parts.len() != 3 {
        return Err(format!("malformed version '{text}'"));
    }
    let nums: Vec<u32> = parts
        .iter()
        .map(|p| p.parse().map_err(|_| format!("malformed version '{text}'")))
        .collect::<Result<_, _>>()?;
    Ok((nums[0], nums[1], nums[2]))
}

fn parse_loc(text: &str) -> Result<SourceLoc, String> {
    let parts: Vec<&str> = text.split_whitespace().collect();
    if parts.len() != 3 {
        return Err(format!("malformed .loc '{text}'"));
    }
    let parse = |s: &str| {
        s.parse::<u32>()
            .map_err(|_| format!("malformed .loc field '{s}'"))
    };
    Ok(SourceLoc::new(
        parse(parts[0])?,
        parse(parts[1])?,
        parse(parts[2])?,
    ))
}

/// `@name(i64, str) -> void`
fn parse_extern(text: &str) -> Result<Extern, String> {
    let mut cur = Cursor::new(text);
    cur.expect_char('@')?;
    let name = cur.ident()?;
    cur.expect_char('(')?;
    let mut params = Vec::new();
    cur.skip_ws();
    if !cur.eat_char(')') {
        loop {
            let tok = cur.ident()?;
            let ty = Type::parse(&tok).ok_or_else(|| format!("unknown type '{tok}'"))?;
            params.push(ty);
            cur.skip_ws();
            if cur.eat_char(',') {
                cur.skip_ws();
                continue;
            }
            cur.expect_char(')')?;
            break;
        }
    }
    cur.expect_arrow()?;
    let tok = cur.ident()?;
    let ret = Type::parse(&tok).ok_or_else(|| format!("unknown type '{tok}'"))?;
    Ok(Extern { name, ret, params })
}

/// `@name = "bytes"`
fn parse_global(text: &str) -> Result<Global, String> {
    let mut cur = Cursor::new(text);
    cur.expect_char('@')?;
    let name = cur.ident()?;
    cur.skip_ws();
    cur.expect_char('=')?;
    cur.skip_ws();
    let bytes = cur.string_literal()?;
    Ok(Global { name, bytes })
}

/// `@name(%a: i64, %b: str) -> i64 {`
fn parse_func_header(text: &str) -> Result<FuncState, String> {
    let text = text
        .strip_suffix('{')
        .ok_or_else(|| "missing '{' on func line".to_string())?
        .trim();
    let mut cur = Cursor::new(text);
    cur.expect_char('@')?;
    let name = cur.ident()?;
    cur.expect_char('(')?;
    let mut params = Vec::new();
    cur.skip_ws();
    if !cur.eat_char(')') {
        loop {
            cur.expect_char('%')?;
            let pname = cur.ident()?;
            cur.skip_ws();
            cur.expect_char(':')?;
            cur.skip_ws();
            let tok = cur.ident()?;
            let ty = Type::parse(&tok).ok_or_else(|| format!("unknown type '{tok}'"))?;
            params.push(FuncParam { name: pname, ty });
            cur.skip_ws();
            if cur.eat_char(',') {
                cur.skip_ws();
                continue;
            }
            cur.expect_char(')')?;
            break;
        }
    }
    cur.expect_arrow()?;
    let tok = cur.ident()?;
    let ret = Type::parse(&tok).ok_or_else(|| format!("unknown type '{tok}'"))?;

    let mut state = FuncState {
        function: Function::new(name, ret, params.clone()),
        names: HashMap::new(),
        next_temp: 0,
        current_block: None,
        pending_loc: None,
    };
    // Reserve ids 0..n for the parameters so the entry block's params
    // land on the same temps whether or not they are spelled explicitly.
    for p in &params {
        state.intern(&p.name);
    }
    Ok(state)
}

/// A block header is `label:` or `label(%p: ty, ...):`.
fn is_block_header(line: &str) -> bool {
    if !line.ends_with(':') {
        return false;
    }
    let first = line.chars().next().unwrap_or(' ');
    first.is_ascii_alphabetic() || first == '_' || first == '.'
}

fn parse_block_header(line: &str, func: &mut FuncState) -> Result<BasicBlock, String> {
    let body = &line[..line.len() - 1];
    let mut cur = Cursor::new(body);
    let label = cur.ident()?;
    let mut block = BasicBlock::new(label);
    cur.skip_ws();
    if cur.eat_char('(') {
        cur.skip_ws();
        if !cur.eat_char(')') {
            loop {
                cur.expect_char('%')?;
                let name = cur.ident()?;
                cur.skip_ws();
                cur.expect_char(':')?;
                cur.skip_ws();
                let tok = cur.ident()?;
                let ty = Type::parse(&tok).ok_or_else(|| format!("unknown type '{tok}'"))?;
                let id = func.intern(&name);
                block.params.push(Param { name, id, ty });
                cur.skip_ws();
                if cur.eat_char(',') {
                    cur.skip_ws();
                    continue;
                }
                cur.expect_char(')')?;
                break;
            }
        }
    }
    cur.skip_ws();
    if !cur.at_end() {
        return Err(format!("trailing content on block header '{line}'"));
    }
    Ok(block)
}

fn parse_instr(line: &str, func: &mut FuncState) -> Result<Instr, String> {
    let mut cur = Cursor::new(line);
    let mut instr = Instr::default();

    cur.skip_ws();
    if cur.peek() == Some('%') {
        // `%name = ...`
        let save = cur.pos;
        cur.expect_char('%')?;
        let name = cur.ident()?;
        cur.skip_ws();
        if cur.eat_char('=') {
            instr.result = Some(func.intern(&name));
            cur.skip_ws();
        } else {
            cur.pos = save;
        }
    }

    let mnemonic = cur.mnemonic()?;
    let (op, suffix) = match Opcode::from_mnemonic(&mnemonic) {
        Some(op) => (op, None),
        None => match mnemonic.rsplit_once('.') {
            Some((head, tail)) => {
                let op = Opcode::from_mnemonic(head)
                    .ok_or_else(|| format!("unknown opcode '{mnemonic}'"))?;
                let ty =
                    Type::parse(tail).ok_or_else(|| format!("unknown type suffix '{tail}'"))?;
                (op, Some(ty))
            }
            None => return Err(format!("unknown opcode '{mnemonic}'")),
        },
    };
    instr.op = op;
    instr.ty = suffix.unwrap_or_else(|| crate::io::default_result_type(op));
    cur.skip_ws();

    match op {
        Opcode::Call => {
            cur.expect_char('@')?;
            instr.callee = Some(cur.ident()?);
            cur.expect_char('(')?;
            cur.skip_ws();
            if !cur.eat_char(')') {
                loop {
                    instr.operands.push(cur.value(func)?);
                    cur.skip_ws();
                    if cur.eat_char(',') {
                        cur.skip_ws();
                        continue;
                    }
                    cur.expect_char(')')?;
                    break;
                }
            }
            // Return type resolved against the callee signature later.
            instr.ty = Type::Void;
        }
        Opcode::Load => {
            let tok = cur.ident()?;
            instr.ty = Type::parse(&tok).ok_or_else(|| format!("unknown type '{tok}'"))?;
            cur.skip_ws();
            instr.operands.push(cur.value(func)?);
        }
        Opcode::Store => {
            let tok = cur.ident()?;
            instr.ty = Type::parse(&tok).ok_or_else(|| format!("unknown type '{tok}'"))?;
            cur.skip_ws();
            instr.operands.push(cur.value(func)?);
            cur.skip_ws();
            cur.expect_char(',')?;
            cur.skip_ws();
            instr.operands.push(cur.value(func)?);
        }
        Opcode::Br => {
            let (label, args) = cur.target(func)?;
            instr.labels.push(label);
            instr.br_args.push(args);
        }
        Opcode::CBr => {
            instr.operands.push(cur.value(func)?);
            for _ in 0..2 {
                cur.skip_ws();
                cur.expect_char(',')?;
                cur.skip_ws();
                let (label, args) = cur.target(func)?;
                instr.labels.push(label);
                instr.br_args.push(args);
            }
        }
        Opcode::SwitchI32 => {
            instr.operands.push(cur.value(func)?);
            cur.skip_ws();
            cur.expect_char(',')?;
            cur.skip_ws();
            let (label, args) = cur.target(func)?;
            instr.labels.push(label);
            instr.br_args.push(args);
            loop {
                cur.skip_ws();
                if !cur.eat_char(',') {
                    break;
                }
                cur.skip_ws();
                instr.operands.push(cur.value(func)?);
                cur.skip_ws();
                cur.expect_char(',')?;
                cur.skip_ws();
                let (label, args) = cur.target(func)?;
                instr.labels.push(label);
                instr.br_args.push(args);
            }
        }
        Opcode::Ret => {
            cur.skip_ws();
            if !cur.at_end() {
                instr.operands.push(cur.value(func)?);
            }
        }
        Opcode::Trap => {
            let tok = cur.ident()?;
            instr.trap_kind =
                Some(TrapKind::parse(&tok).ok_or_else(|| format!("unknown trap kind '{tok}'"))?);
            cur.skip_ws();
            if cur.peek() == Some('"') {
                let bytes = cur.string_literal()?;
                instr.trap_msg = Some(String::from_utf8_lossy(&bytes).into_owned());
            }
        }
        Opcode::EhPush => {
            instr.labels.push(cur.ident()?);
        }
        Opcode::EhPop => {}
        Opcode::ResumeSame | Opcode::ResumeNext => {
            instr.operands.push(cur.value(func)?);
        }
        Opcode::ResumeLabel => {
            instr.operands.push(cur.value(func)?);
            cur.skip_ws();
            cur.expect_char(',')?;
            cur.skip_ws();
            instr.labels.push(cur.ident()?);
        }
        _ => {
            cur.skip_ws();
            if !cur.at_end() {
                loop {
                    instr.operands.push(cur.value(func)?);
                    cur.skip_ws();
                    if cur.eat_char(',') {
                        cur.skip_ws();
                        continue;
                    }
                    break;
                }
            }
        }
    }

    cur.skip_ws();
    if !cur.at_end() {
        return Err(format!("trailing content in instruction '{line}'"));
    }
    Ok(instr)
}

/// Character cursor over one line.
struct Cursor<'a> {
    text: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Cursor<'a> {
        Cursor {
            text,
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn eat_char(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_char(&mut self, c: char) -> Result<(), String> {
        if self.eat_char(c) {
            Ok(())
        } else {
            Err(format!("expected '{c}' in '{}'", self.text))
        }
    }

    fn expect_arrow(&mut self) -> Result<(), String> {
        self.skip_ws();
        if self.eat_char('-') && self.eat_char('>') {
            self.skip_ws();
            Ok(())
        } else {
            Err(format!("expected '->' in '{}'", self.text))
        }
    }

    /// Identifier: letters, digits, `_`, `.`, `$`.
    fn ident(&mut self) -> Result<String, String> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$'))
        {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(format!("expected identifier in '{}'", self.text));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    /// Opcode mnemonic: same charset as identifiers.
    fn mnemonic(&mut self) -> Result<String, String> {
        self.ident()
    }

    /// A branch target `label` or `label(arg, ...)`.
    fn target(&mut self, func: &mut FuncState) -> Result<(String, Vec<Value>), String> {
        let label = self.ident()?;
        let mut args = Vec::new();
        if self.eat_char('(') {
            self.skip_ws();
            if !self.eat_char(')') {
                loop {
                    args.push(self.value(func)?);
                    self.skip_ws();
                    if self.eat_char(',') {
                        self.skip_ws();
                        continue;
                    }
                    self.expect_char(')')?;
                    break;
                }
            }
        }
        Ok((label, args))
    }

    /// Double-quoted string with escapes, returned as raw bytes.
    fn string_literal(&mut self) -> Result<Vec<u8>, String> {
        self.expect_char('"')?;
        let mut out = Vec::new();
        loop {
            let c = self
                .peek()
                .ok_or_else(|| format!("unterminated string in '{}'", self.text))?;
            self.pos += 1;
            match c {
                '"' => return Ok(out),
                '\\' => {
                    let esc = self
                        .peek()
                        .ok_or_else(|| format!("dangling escape in '{}'", self.text))?;
                    self.pos += 1;
                    match esc {
                        'n' => out.push(b'\n'),
                        't' => out.push(b'\t'),
                        'r' => out.push(b'\r'),
                        '\\' => out.push(b'\\'),
                        '"' => out.push(b'"'),
                        '0' => out.push(0),
                        'x' => {
                            let hi = self.hex_digit()?;
                            let lo = self.hex_digit()?;
                            out.push(hi * 16 + lo);
                        }
                        other => return Err(format!("unknown escape '\\{other}'")),
                    }
                }
                other => {
                    let mut buf = [0u8; 4];
                    out.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
                }
            }
        }
    }

    fn hex_digit(&mut self) -> Result<u8, String> {
        let c = self
            .peek()
            .ok_or_else(|| "truncated hex escape".to_string())?;
        self.pos += 1;
        c.to_digit(16)
            .map(|d| d as u8)
            .ok_or_else(|| format!("bad hex digit '{c}'"))
    }

    /// One operand value.
    fn value(&mut self, func: &mut FuncState) -> Result<Value, String> {
        self.skip_ws();
        match self.peek() {
            Some('%') => {
                self.pos += 1;
                let name = self.ident()?;
                Ok(Value::temp(func.intern(&name)))
            }
            Some('@') => {
                self.pos += 1;
                Ok(Value::global(self.ident()?))
            }
            Some('"') => {
                let bytes = self.string_literal()?;
                Ok(Value::const_str(String::from_utf8_lossy(&bytes).into_owned()))
            }
            Some(c) if c.is_ascii_digit() || c == '-' || c == '+' || c == 'n' || c == 'i' || c == 't' || c == 'f' => {
                let start = self.pos;
                while self.peek().is_some_and(|c| {
                    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+' | '_')
                }) {
                    self.pos += 1;
                }
                let token: String = self.chars[start..self.pos].iter().collect();
                match token.as_str() {
                    "null" => Ok(Value::null()),
                    "true" => Ok(Value::const_bool(true)),
                    "false" => Ok(Value::const_bool(false)),
                    _ => {
                        if let Ok(i) = token.parse::<i64>() {
                            Ok(Value::const_int(i))
                        } else if let Some(f) = parse_float(&token) {
                            Ok(Value::const_float(f))
                        } else {
                            Err(format!("malformed value '{token}'"))
                        }
                    }
                }
            }
            other => Err(format!("expected value, found {other:?} in '{}'", self.text)),
        }
    }
}
