//! VM execution engine
//!
//! The dispatch loop fetches the instruction at the top frame's
//! block/ip, emits trace and debugger events, and executes it through a
//! single exhaustive `match` (the switch dispatch strategy). Control
//! transfers rewrite the frame's block/ip; calls push frames or, when
//! tail-call reuse applies, recycle the current one.

use crate::bridge::{self, BridgeError};
use crate::debug::{Breakpoint, DebugAction, DebugScript};
use crate::frame::Frame;
use crate::slot::Slot;
use crate::trace::{FileTable, TraceMode, trace_step};
use crate::traps::{ResumePoint, TrapInfo};
use std::collections::HashMap;
use viper_il::{Function, Instr, Module, Opcode, TrapKind, Type, Value};
use viper_runtime::strings::string_retain;

/// Size the switch dispatch covers; asserted against the opcode set at
/// startup so the two cannot drift apart.
const DISPATCH_TABLE_SIZE: usize = 59;

#[derive(Debug, Clone, Copy, Default)]
pub struct VmOptions {
    /// Reuse the current frame for `call` immediately followed by `ret`
    /// of the call's result.
    pub enable_tail_calls: bool,
    pub trace: TraceMode,
    /// Trap with `RuntimeError` after this many executed instructions.
    pub max_steps: Option<u64>,
}

/// Terminal (or suspended) state of a run.
#[derive(Debug)]
pub enum RunStatus {
    /// `@main` returned; payload is its return value (0 for void).
    Completed(i64),
    /// An uncaught trap; the driver prints the line and exits 1.
    Trapped(TrapInfo),
    /// A breakpoint stopped execution; the driver exits 10.
    Breakpoint,
    /// The poll callback requested suspension; resume with
    /// [`Vm::continue_run`].
    Paused,
}

enum Flow {
    /// Fall through to the next instruction.
    Next,
    /// Control moved (branch, call, ret, resume); block/ip already set.
    Jump,
    /// Dispatch must stop with this status.
    Stop(RunStatus),
}

type PollCallback<'m> = Box<dyn FnMut() -> bool + 'm>;

pub struct Vm<'m> {
    module: &'m Module,
    options: VmOptions,
    func_index: HashMap<&'m str, usize>,
    /// Per-function label -> block index.
    block_index: Vec<HashMap<&'m str, usize>>,
    /// Cached register file sizes.
    reg_counts: Vec<usize>,
    frames: Vec<Frame>,
    /// Error payloads referenced by `error` slots.
    errors: Vec<TrapInfo>,
    /// Resume points referenced by `resume_tok` slots.
    tokens: Vec<ResumePoint>,
    /// Interned constants live for the whole run.
    const_strs: HashMap<String, u64>,
    pub files: FileTable,
    steps: u64,
    opcode_counts: Vec<u64>,
    max_depth: usize,
    exit_requested: bool,
    exit_value: i64,
    // Debugger state.
    breakpoints: Vec<Breakpoint>,
    script: Option<DebugScript>,
    auto_continue: bool,
    /// Remaining instructions before a reason=step break.
    step_budget: Option<u64>,
    /// Suppress the entry breakpoint once when resuming on it.
    skip_break_once: bool,
    last_src_line: Option<u32>,
    watches: Vec<String>,
    poll: Option<(u64, PollCallback<'m>)>,
}

impl<'m> Vm<'m> {
    pub fn new(module: &'m Module, options: VmOptions) -> Vm<'m> {
        debug_assert_eq!(
            Opcode::COUNT,
            DISPATCH_TABLE_SIZE,
            "dispatch table out of sync with the opcode set"
        );
        let mut func_index = HashMap::new();
        let mut block_index = Vec::with_capacity(module.functions.len());
        let mut reg_counts = Vec::with_capacity(module.functions.len());
        for (i, function) in module.functions.iter().enumerate() {
            func_index.insert(function.name.as_str(), i);
            let labels = function
                .blocks
                .iter()
                .enumerate()
                .map(|(b, blk)| (blk.label.as_str(), b))
                .collect();
            block_index.push(labels);
            reg_counts.push(function.register_count());
        }
        Vm {
            module,
            options,
            func_index,
            block_index,
            reg_counts,
            frames: Vec::new(),
            errors: Vec::new(),
            tokens: Vec::new(),
            const_strs: HashMap::new(),
            files: FileTable::new(),
            steps: 0,
            opcode_counts: vec![0; Opcode::COUNT],
            max_depth: 0,
            exit_requested: false,
            exit_value: 0,
            breakpoints: Vec::new(),
            script: None,
            auto_continue: false,
            step_budget: None,
            skip_break_once: false,
            last_src_line: None,
            watches: Vec::new(),
            poll: None,
        }
    }

    pub fn set_breakpoints(&mut self, breakpoints: Vec<Breakpoint>) {
        self.breakpoints = breakpoints;
    }

    pub fn set_debug_script(&mut self, script: DebugScript) {
        self.script = Some(script);
    }

    /// Auto-resume silently at breakpoints (`--continue`).
    pub fn set_auto_continue(&mut self, on: bool) {
        self.auto_continue = on;
    }

    /// Break before the first instruction with reason=step (`--step`).
    pub fn set_initial_step(&mut self) {
        self.step_budget = Some(0);
    }

    pub fn add_watch(&mut self, name: impl Into<String>) {
        self.watches.push(name.into());
    }

    /// Install a poll callback checked every `every_n` instructions;
    /// returning `false` suspends the VM with [`RunStatus::Paused`].
    pub fn set_poll(&mut self, every_n: u64, callback: PollCallback<'m>) {
        self.poll = Some((every_n.max(1), callback));
    }

    pub fn request_exit(&mut self) {
        self.exit_requested = true;
    }

    pub fn steps_executed(&self) -> u64 {
        self.steps
    }

    /// Executed-instruction counts indexed like `Opcode::ALL`.
    pub fn opcode_counts(&self) -> &[u64] {
        &self.opcode_counts
    }

    /// Deepest frame stack observed; tail calls keep this flat.
    pub fn max_frame_depth(&self) -> usize {
        self.max_depth
    }

    /// Execute `@main` to completion (or breakpoint/pause/trap).
    pub fn run(&mut self) -> RunStatus {
        let Some(&main) = self.func_index.get("main") else {
            return RunStatus::Trapped(
                TrapInfo::new(TrapKind::RuntimeError).with_message("module has no @main function"),
            );
        };
        tracing::debug!(registers = self.reg_counts[main], "entering @main");
        let frame = Frame::new(main, self.reg_counts[main], None);
        self.frames.push(frame);
        self.max_depth = self.max_depth.max(1);
        self.dispatch()
    }

    /// Resume after [`RunStatus::Paused`] or a breakpoint stop.
    pub fn continue_run(&mut self) -> RunStatus {
        if self.frames.is_empty() {
            return RunStatus::Completed(self.exit_value);
        }
        self.skip_break_once = true;
        self.dispatch()
    }

    fn current_function(&self) -> &'m Function {
        let frame = self.frames.last().expect("no active frame");
        &self.module.functions[frame.func]
    }

    fn dispatch(&mut self) -> RunStatus {
        loop {
            if self.exit_requested {
                return RunStatus::Completed(self.exit_value);
            }
            if self.frames.is_empty() {
                return RunStatus::Completed(self.exit_value);
            }
            if let Some((every, callback)) = &mut self.poll
                && self.steps % *every == 0
                && self.steps > 0
                && !callback()
            {
                return RunStatus::Paused;
            }

            let module = self.module;
            let frame = self.frames.last().expect("no active frame");
            let (func, block, ip) = (frame.func, frame.block, frame.ip);
            let function = &module.functions[func];
            let block_ref = &function.blocks[block];
            let Some(instr) = block_ref.instructions.get(ip) else {
                let info = self.trap_info(
                    TrapKind::RuntimeError,
                    Some("fell off the end of a block".to_string()),
                    func,
                    block,
                    ip,
                );
                return RunStatus::Trapped(info);
            };

            if let Some(status) = self.debugger_gate(function, &block_ref.label, ip, instr) {
                return status;
            }

            if let Some(limit) = self.options.max_steps
                && self.steps >= limit
            {
                match self.raise(
                    TrapKind::RuntimeError,
                    Some("maximum step count exceeded".to_string()),
                ) {
                    Some(status) => return status,
                    None => continue,
                }
            }

            trace_step(
                self.options.trace,
                &self.files,
                function,
                &block_ref.label,
                ip,
                instr,
            );
            self.steps += 1;
            self.opcode_counts[instr.op as usize] += 1;
            if let Some(budget) = &mut self.step_budget
                && *budget > 0
            {
                *budget -= 1;
            }

            match self.exec(function, instr) {
                Flow::Next => {
                    let frame = self.frames.last_mut().expect("frame vanished");
                    frame.ip += 1;
                    self.watch_hook(function, instr);
                }
                Flow::Jump => {}
                Flow::Stop(status) => return status,
            }
        }
    }

    /// Breakpoint and scripted-step handling for the instruction about
    /// to execute. Returns a status when the run must stop.
    fn debugger_gate(
        &mut self,
        function: &Function,
        block_label: &str,
        ip: usize,
        instr: &Instr,
    ) -> Option<RunStatus> {
        if self.skip_break_once {
            self.skip_break_once = false;
            return None;
        }

        // A pending `step N` that has counted down breaks here.
        if self.step_budget == Some(0) {
            self.step_budget = None;
            eprintln!("[BREAK] fn=@{} blk={} reason=step", function.name, block_label);
            return self.after_break();
        }

        let mut hit: Option<String> = None;
        for bp in &self.breakpoints {
            match bp {
                Breakpoint::Label(label) => {
                    if ip == 0 && label == block_label {
                        hit = Some(format!(
                            "[BREAK] fn=@{} blk={} reason=label",
                            function.name, block_label
                        ));
                        break;
                    }
                }
                Breakpoint::FnLabel { function: f, label } => {
                    if ip == 0 && f == &function.name && label == block_label {
                        hit = Some(format!(
                            "[BREAK] fn=@{} blk={} reason=label",
                            function.name, block_label
                        ));
                        break;
                    }
                }
                Breakpoint::Src { file, line } => {
                    if instr.loc.is_known()
                        && instr.loc.line == *line
                        && self.last_src_line != Some(*line)
                        && self.src_file_matches(file, instr.loc.file_id)
                    {
                        hit = Some(format!("[BREAK] src={file}:{line}"));
                        break;
                    }
                }
            }
        }
        if instr.loc.is_known() {
            self.last_src_line = Some(instr.loc.line);
        }

        let message = hit?;
        if self.auto_continue {
            return None;
        }
        eprintln!("{message}");
        self.after_break()
    }

    /// Consume the next scripted action after a break was reported.
    fn after_break(&mut self) -> Option<RunStatus> {
        let Some(script) = &mut self.script else {
            return Some(RunStatus::Breakpoint);
        };
        match script.next_action() {
            DebugAction::Continue => None,
            DebugAction::Step(n) => {
                self.step_budget = Some(n);
                None
            }
            // Over/out degrade to a single step in the scripted debugger.
            DebugAction::StepOver | DebugAction::StepOut => {
                self.step_budget = Some(1);
                None
            }
        }
    }

    fn src_file_matches(&self, wanted: &str, file_id: u32) -> bool {
        let name = self.files.name(file_id);
        if name == wanted {
            return true;
        }
        let path = std::path::Path::new(&name);
        path.file_name().and_then(|s| s.to_str()) == Some(wanted)
            || path.file_stem().and_then(|s| s.to_str()) == Some(wanted)
    }

    fn watch_hook(&self, function: &Function, instr: &Instr) {
        if self.watches.is_empty() {
            return;
        }
        let Some(result) = instr.result else { return };
        let Some(name) = function.value_name(result) else {
            return;
        };
        if !self.watches.iter().any(|w| w == name) {
            return;
        }
        let frame = self.frames.last().expect("no active frame");
        let slot = frame.get(result);
        let rendered = match instr.ty {
            Type::F32 | Type::F64 => slot.as_f64().to_string(),
            Type::Str => viper_runtime::string_value(slot.raw()),
            _ => slot.as_i64().to_string(),
        };
        eprintln!("[WATCH] {name}={rendered}");
    }

    /// Interned handle for a string constant; cached handles live for
    /// the whole run so slot ownership can treat them like any other.
    fn const_str_handle(&mut self, text: &str) -> u64 {
        if let Some(&h) = self.const_strs.get(text) {
            return h;
        }
        let h = viper_runtime::string_intern(text.to_string());
        self.const_strs.insert(text.to_string(), h);
        h
    }

    fn global_handle(&mut self, name: &str) -> u64 {
        let text = self
            .module
            .find_global(name)
            .map(|g| String::from_utf8_lossy(&g.bytes).into_owned())
            .unwrap_or_default();
        self.const_str_handle(&text)
    }

    fn eval(&mut self, value: &Value) -> Slot {
        match value {
            Value::Temp(id) => self.frames.last().expect("no active frame").get(*id),
            Value::ConstInt { value, .. } => Slot::from_i64(*value),
            Value::ConstFloat(v) => Slot::from_f64(*v),
            Value::ConstStr(s) => {
                let text = s.clone();
                Slot(self.const_str_handle(&text))
            }
            Value::GlobalAddr(name) => {
                let name = name.clone();
                Slot(self.global_handle(&name))
            }
            Value::NullPtr => Slot(0),
        }
    }

    fn trap_info(
        &self,
        kind: TrapKind,
        message: Option<String>,
        func: usize,
        block: usize,
        ip: usize,
    ) -> TrapInfo {
        let function = &self.module.functions[func];
        let line = function.blocks[block]
            .instructions
            .get(ip)
            .map_or(0, |i| i.loc.line);
        TrapInfo {
            kind,
            code: kind.code(),
            message,
            function: function.name.clone(),
            block: function.blocks[block].label.clone(),
            instr_index: ip,
            line,
        }
    }

    /// Raise a trap at the current position. Returns `None` when a
    /// handler took over, otherwise the terminal status.
    fn raise(&mut self, kind: TrapKind, message: Option<String>) -> Option<RunStatus> {
        let frame = self.frames.last().expect("no active frame");
        let (func, block, ip) = (frame.func, frame.block, frame.ip);
        let info = self.trap_info(kind, message, func, block, ip);

        let frame = self.frames.last_mut().expect("no active frame");
        let Some(handler_label) = frame.eh_stack.pop() else {
            return Some(RunStatus::Trapped(info));
        };
        let Some(&handler_idx) = self.block_index[func].get(handler_label.as_str()) else {
            // A handler that no longer resolves (possible after a tail
            // call into another function) cannot catch anything.
            return Some(RunStatus::Trapped(info));
        };

        let err_slot = Slot::from_i64(self.errors.len() as i64);
        self.errors.push(info);
        let tok_slot = Slot::from_i64(self.tokens.len() as i64);
        self.tokens.push(ResumePoint {
            block,
            instr_index: ip,
        });

        let handler = &self.module.functions[func].blocks[handler_idx];
        let params: Vec<u32> = handler.params.iter().map(|p| p.id).collect();
        let frame = self.frames.last_mut().expect("no active frame");
        if params.len() >= 2 {
            frame.set(params[0], err_slot);
            frame.set(params[1], tok_slot);
        }
        frame.block = handler_idx;
        frame.ip = 0;
        None
    }

    /// Resolve a resume token operand into its recorded point.
    fn resume_point(&mut self, value: &Value) -> Result<ResumePoint, Option<RunStatus>> {
        let idx = self.eval(value).as_i64();
        match self.tokens.get(idx as usize) {
            Some(point) => Ok(*point),
            None => Err(self.raise(
                TrapKind::RuntimeError,
                Some("invalid resume token".to_string()),
            )),
        }
    }

    /// Transfer control to `label`, binding branch arguments to the
    /// target block's parameters.
    fn transfer(&mut self, function: &'m Function, label: &str, args: &[Value]) -> Flow {
        let frame = self.frames.last().expect("no active frame");
        let func = frame.func;
        let Some(&target) = self.block_index[func].get(label) else {
            return match self.raise(
                TrapKind::RuntimeError,
                Some(format!("branch to unknown label '{label}'")),
            ) {
                Some(status) => Flow::Stop(status),
                None => Flow::Jump,
            };
        };
        let params = &function.blocks[target].params;
        // Evaluate everything before writing: arguments may read the very
        // slots the parameters overwrite (loop-carried values).
        let evaluated: Vec<Slot> = args.iter().map(|a| self.eval(a)).collect();
        let frame = self.frames.last_mut().expect("no active frame");
        for (param, slot) in params.iter().zip(&evaluated) {
            if param.ty == Type::Str {
                frame.set_str_copy(param.id, slot.raw());
            } else {
                frame.set(param.id, *slot);
            }
        }
        frame.block = target;
        frame.ip = 0;
        Flow::Jump
    }

    fn exec(&mut self, function: &'m Function, instr: &'m Instr) -> Flow {
        // Shorthand for traps raised mid-instruction.
        macro_rules! trap {
            ($kind:expr) => {
                return match self.raise($kind, None) {
                    Some(status) => Flow::Stop(status),
                    None => Flow::Jump,
                }
            };
            ($kind:expr, $msg:expr) => {
                return match self.raise($kind, Some($msg)) {
                    Some(status) => Flow::Stop(status),
                    None => Flow::Jump,
                }
            };
        }

        macro_rules! set_result {
            ($slot:expr) => {{
                if let Some(result) = instr.result {
                    let slot = $slot;
                    self.frames
                        .last_mut()
                        .expect("no active frame")
                        .set(result, slot);
                }
            }};
        }

        macro_rules! int_bin {
            ($f:expr) => {{
                let a = self.eval(&instr.operands[0]).as_i64();
                let b = self.eval(&instr.operands[1]).as_i64();
                let f: fn(i64, i64) -> i64 = $f;
                set_result!(Slot::from_i64(f(a, b)));
                Flow::Next
            }};
        }

        macro_rules! int_cmp {
            ($f:expr) => {{
                let a = self.eval(&instr.operands[0]).as_i64();
                let b = self.eval(&instr.operands[1]).as_i64();
                let f: fn(i64, i64) -> bool = $f;
                set_result!(Slot::from_bool(f(a, b)));
                Flow::Next
            }};
        }

        macro_rules! float_bin {
            ($f:expr) => {{
                let a = self.eval(&instr.operands[0]).as_f64();
                let b = self.eval(&instr.operands[1]).as_f64();
                let f: fn(f64, f64) -> f64 = $f;
                set_result!(Slot::from_f64(f(a, b)));
                Flow::Next
            }};
        }

        macro_rules! float_cmp {
            ($f:expr) => {{
                let a = self.eval(&instr.operands[0]).as_f64();
                let b = self.eval(&instr.operands[1]).as_f64();
                let f: fn(f64, f64) -> bool = $f;
                set_result!(Slot::from_bool(f(a, b)));
                Flow::Next
            }};
        }

        macro_rules! checked_bin {
            ($f:ident) => {{
                let a = self.eval(&instr.operands[0]).as_i64();
                let b = self.eval(&instr.operands[1]).as_i64();
                match a.$f(b) {
                    Some(v) => {
                        set_result!(Slot::from_i64(v));
                        Flow::Next
                    }
                    None => trap!(TrapKind::Overflow),
                }
            }};
        }

        match instr.op {
            // Constants ------------------------------------------------
            Opcode::ConstI64 => {
                let v = self.eval(&instr.operands[0]);
                set_result!(v);
                Flow::Next
            }
            Opcode::ConstF64 => {
                // Accepts a float literal or raw bit pattern.
                let slot = match &instr.operands[0] {
                    Value::ConstFloat(f) => Slot::from_f64(*f),
                    Value::ConstInt { value, .. } => Slot(*value as u64),
                    other => {
                        let v = self.eval(other);
                        Slot(v.raw())
                    }
                };
                set_result!(slot);
                Flow::Next
            }
            Opcode::ConstStr => {
                let handle = self.eval(&instr.operands[0]).raw();
                if let Some(result) = instr.result {
                    self.frames
                        .last_mut()
                        .expect("no active frame")
                        .set_str_copy(result, handle);
                }
                Flow::Next
            }
            Opcode::NullPtr => {
                set_result!(Slot(0));
                Flow::Next
            }

            // Wrapping integer arithmetic -------------------------------
            Opcode::Add => int_bin!(i64::wrapping_add),
            Opcode::Sub => int_bin!(i64::wrapping_sub),
            Opcode::Mul => int_bin!(i64::wrapping_mul),

            // Checked integer arithmetic --------------------------------
            Opcode::IAddOvf => checked_bin!(checked_add),
            Opcode::ISubOvf => checked_bin!(checked_sub),
            Opcode::IMulOvf => checked_bin!(checked_mul),
            Opcode::SDivChk0 => {
                let a = self.eval(&instr.operands[0]).as_i64();
                let b = self.eval(&instr.operands[1]).as_i64();
                if b == 0 {
                    trap!(TrapKind::DivideByZero);
                }
                match a.checked_div(b) {
                    Some(v) => {
                        set_result!(Slot::from_i64(v));
                        Flow::Next
                    }
                    None => trap!(TrapKind::Overflow),
                }
            }
            Opcode::UDivChk0 => {
                let a = self.eval(&instr.operands[0]).as_i64() as u64;
                let b = self.eval(&instr.operands[1]).as_i64() as u64;
                if b == 0 {
                    trap!(TrapKind::DivideByZero);
                }
                set_result!(Slot((a / b) as i64 as u64));
                Flow::Next
            }
            Opcode::SRemChk0 => {
                let a = self.eval(&instr.operands[0]).as_i64();
                let b = self.eval(&instr.operands[1]).as_i64();
                if b == 0 {
                    trap!(TrapKind::DivideByZero);
                }
                match a.checked_rem(b) {
                    Some(v) => {
                        set_result!(Slot::from_i64(v));
                        Flow::Next
                    }
                    None => trap!(TrapKind::Overflow),
                }
            }
            Opcode::URemChk0 => {
                let a = self.eval(&instr.operands[0]).as_i64() as u64;
                let b = self.eval(&instr.operands[1]).as_i64() as u64;
                if b == 0 {
                    trap!(TrapKind::DivideByZero);
                }
                set_result!(Slot((a % b) as i64 as u64));
                Flow::Next
            }
            Opcode::CastSiNarrowChk => {
                let v = self.eval(&instr.operands[0]).as_i64();
                let fits = match instr.ty {
                    Type::I1 => v == 0 || v == 1,
                    Type::I16 => i16::try_from(v).is_ok(),
                    Type::I32 => i32::try_from(v).is_ok(),
                    _ => true,
                };
                if !fits {
                    trap!(TrapKind::InvalidCast);
                }
                set_result!(Slot::from_i64(v));
                Flow::Next
            }

            // Bitwise & shifts ------------------------------------------
            Opcode::And => int_bin!(|a, b| a & b),
            Opcode::Or => int_bin!(|a, b| a | b),
            Opcode::Xor => int_bin!(|a, b| a ^ b),
            Opcode::Shl => int_bin!(|a, b| a.wrapping_shl(b as u32 & 63)),
            Opcode::Shr => int_bin!(|a, b| a.wrapping_shr(b as u32 & 63)),

            // Float arithmetic (IEEE-754, never traps) ------------------
            Opcode::FAdd => float_bin!(|a, b| a + b),
            Opcode::FSub => float_bin!(|a, b| a - b),
            Opcode::FMul => float_bin!(|a, b| a * b),
            Opcode::FDiv => float_bin!(|a, b| a / b),

            // Conversions ----------------------------------------------
            Opcode::Sitofp => {
                let v = self.eval(&instr.operands[0]).as_i64();
                set_result!(Slot::from_f64(v as f64));
                Flow::Next
            }
            Opcode::Fptosi => {
                let v = self.eval(&instr.operands[0]).as_f64();
                set_result!(Slot::from_i64(v as i64));
                Flow::Next
            }
            Opcode::Trunc1 => {
                let v = self.eval(&instr.operands[0]).as_i64();
                set_result!(Slot::from_bool(v & 1 != 0));
                Flow::Next
            }
            Opcode::Zext1 => {
                let v = self.eval(&instr.operands[0]);
                set_result!(Slot::from_i64(i64::from(v.as_bool())));
                Flow::Next
            }

            // Comparisons ----------------------------------------------
            Opcode::ICmpEq => int_cmp!(|a, b| a == b),
            Opcode::ICmpNe => int_cmp!(|a, b| a != b),
            Opcode::SCmpLt => int_cmp!(|a, b| a < b),
            Opcode::SCmpLe => int_cmp!(|a, b| a <= b),
            Opcode::SCmpGt => int_cmp!(|a, b| a > b),
            Opcode::SCmpGe => int_cmp!(|a, b| a >= b),
            Opcode::UCmpLt => int_cmp!(|a, b| (a as u64) < (b as u64)),
            Opcode::UCmpLe => int_cmp!(|a, b| (a as u64) <= (b as u64)),
            Opcode::UCmpGt => int_cmp!(|a, b| (a as u64) > (b as u64)),
            Opcode::UCmpGe => int_cmp!(|a, b| (a as u64) >= (b as u64)),
            Opcode::FCmpEq => float_cmp!(|a, b| a == b),
            Opcode::FCmpNe => float_cmp!(|a, b| a != b),
            Opcode::FCmpLt => float_cmp!(|a, b| a < b),
            Opcode::FCmpLe => float_cmp!(|a, b| a <= b),
            Opcode::FCmpGt => float_cmp!(|a, b| a > b),
            Opcode::FCmpGe => float_cmp!(|a, b| a >= b),

            // Memory ---------------------------------------------------
            Opcode::Alloca => {
                let size = self.eval(&instr.operands[0]).as_i64();
                if size < 0 {
                    trap!(TrapKind::RuntimeError, "negative alloca size".to_string());
                }
                let Some(result) = instr.result else {
                    return Flow::Next; // result-less alloca allocates nothing observable
                };
                let frame = self.frames.last_mut().expect("no active frame");
                let addr = frame.alloca(result, size as usize);
                frame.set(result, Slot(addr));
                Flow::Next
            }
            Opcode::Load => {
                let addr = self.eval(&instr.operands[0]).raw();
                if addr == 0 {
                    trap!(TrapKind::Null);
                }
                let slot = unsafe { load_typed(addr, instr.ty) };
                if instr.ty == Type::Str {
                    if let Some(result) = instr.result {
                        self.frames
                            .last_mut()
                            .expect("no active frame")
                            .set_str_copy(result, slot.raw());
                    }
                } else {
                    set_result!(slot);
                }
                Flow::Next
            }
            Opcode::Store => {
                let addr = self.eval(&instr.operands[0]).raw();
                if addr == 0 {
                    trap!(TrapKind::Null);
                }
                let value = self.eval(&instr.operands[1]);
                unsafe { store_typed(addr, instr.ty, value) };
                Flow::Next
            }
            Opcode::AddrOf => {
                let Some(id) = instr.operands[0].as_temp() else {
                    trap!(
                        TrapKind::RuntimeError,
                        "addrof of a non-temporary".to_string()
                    );
                };
                let frame = self.frames.last().expect("no active frame");
                let Some(&addr) = frame.allocas.get(&id) else {
                    trap!(
                        TrapKind::RuntimeError,
                        "addrof of a non-alloca temporary".to_string()
                    );
                };
                set_result!(Slot(addr));
                Flow::Next
            }

            // Control flow ---------------------------------------------
            Opcode::Br => {
                let args: &[Value] = instr.br_args.first().map_or(&[], |a| a.as_slice());
                self.transfer(function, &instr.labels[0], args)
            }
            Opcode::CBr => {
                let cond = self.eval(&instr.operands[0]).as_bool();
                let pick = if cond { 0 } else { 1 };
                let args: &[Value] = instr.br_args.get(pick).map_or(&[], |a| a.as_slice());
                let label = instr.labels[pick].clone();
                self.transfer(function, &label, args)
            }
            Opcode::SwitchI32 => {
                let scrutinee = self.eval(&instr.operands[0]).as_i64() as i32;
                let mut pick = 0usize; // default target
                for (k, case) in instr.operands[1..].iter().enumerate() {
                    if case.as_const_int().map(|v| v as i32) == Some(scrutinee) {
                        pick = k + 1;
                        break;
                    }
                }
                let args: &[Value] = instr.br_args.get(pick).map_or(&[], |a| a.as_slice());
                let label = instr.labels[pick].clone();
                self.transfer(function, &label, args)
            }
            Opcode::Ret => self.exec_ret(function, instr),
            Opcode::Trap => {
                let kind = instr.trap_kind.unwrap_or(TrapKind::RuntimeError);
                match self.raise(kind, instr.trap_msg.clone()) {
                    Some(status) => Flow::Stop(status),
                    None => Flow::Jump,
                }
            }

            // Calls ----------------------------------------------------
            Opcode::Call => self.exec_call(function, instr),

            // Exception handling ---------------------------------------
            Opcode::EhPush => {
                let label = instr.labels[0].clone();
                self.frames
                    .last_mut()
                    .expect("no active frame")
                    .eh_stack
                    .push(label);
                Flow::Next
            }
            Opcode::EhPop => {
                let frame = self.frames.last_mut().expect("no active frame");
                let _ = frame.eh_stack.pop();
                Flow::Next
            }
            Opcode::ResumeSame => match self.resume_point(&instr.operands[0]) {
                Ok(point) => {
                    let frame = self.frames.last_mut().expect("no active frame");
                    frame.block = point.block;
                    frame.ip = point.instr_index;
                    Flow::Jump
                }
                Err(handled) => match handled {
                    Some(status) => Flow::Stop(status),
                    None => Flow::Jump,
                },
            },
            Opcode::ResumeNext => match self.resume_point(&instr.operands[0]) {
                Ok(point) => {
                    let len = function.blocks[point.block].instructions.len();
                    if point.instr_index + 1 >= len {
                        trap!(
                            TrapKind::RuntimeError,
                            "resume.next past end of block".to_string()
                        );
                    }
                    let frame = self.frames.last_mut().expect("no active frame");
                    frame.block = point.block;
                    frame.ip = point.instr_index + 1;
                    Flow::Jump
                }
                Err(handled) => match handled {
                    Some(status) => Flow::Stop(status),
                    None => Flow::Jump,
                },
            },
            Opcode::ResumeLabel => match self.resume_point(&instr.operands[0]) {
                Ok(_) => self.transfer(function, &instr.labels[0].clone(), &[]),
                Err(handled) => match handled {
                    Some(status) => Flow::Stop(status),
                    None => Flow::Jump,
                },
            },
        }
    }

    fn exec_ret(&mut self, function: &'m Function, instr: &'m Instr) -> Flow {
        // Evaluate the return payload before tearing the frame down.
        let payload: Option<(Slot, bool)> = match instr.operands.first() {
            None => None,
            Some(value) => {
                if function.ret == Type::Str {
                    let handle = match value.as_temp() {
                        Some(id) => self
                            .frames
                            .last_mut()
                            .expect("no active frame")
                            .take_str(id),
                        None => {
                            let h = self.eval(value).raw();
                            string_retain(h);
                            h
                        }
                    };
                    Some((Slot(handle), true))
                } else {
                    Some((self.eval(value), false))
                }
            }
        };

        let finished = self.frames.pop().expect("no active frame");
        if self.frames.is_empty() {
            self.exit_value = payload.map_or(0, |(slot, _)| slot.as_i64());
            return Flow::Stop(RunStatus::Completed(self.exit_value));
        }
        if let Some(dst) = finished.ret_dst {
            let caller = self.frames.last_mut().expect("caller frame missing");
            match payload {
                Some((slot, true)) => caller.set_str(dst, slot.raw()),
                Some((slot, false)) => caller.set(dst, slot),
                None => {}
            }
        } else if let Some((slot, true)) = payload {
            // Returned string nobody receives.
            viper_runtime::string_release(slot.raw());
        }
        Flow::Jump
    }

    fn exec_call(&mut self, function: &'m Function, instr: &'m Instr) -> Flow {
        let callee_name = instr.callee.as_deref().unwrap_or_default();

        if let Some(&callee_idx) = self.func_index.get(callee_name) {
            let callee = &self.module.functions[callee_idx];
            let entry_params: Vec<(u32, Type)> = callee
                .entry()
                .map(|b| b.params.iter().map(|p| (p.id, p.ty)).collect())
                .unwrap_or_default();

            if self.options.enable_tail_calls
                && self.is_tail_position(function, instr)
                && !callee.blocks.is_empty()
                && instr.operands.len() == entry_params.len()
            {
                return self.tail_call(callee_idx, &entry_params, &instr.operands);
            }

            if callee.blocks.is_empty() || instr.operands.len() != entry_params.len() {
                return match self.raise(
                    TrapKind::RuntimeError,
                    Some(bridge::format_arg_count_mismatch(
                        callee_name,
                        entry_params.len(),
                        instr.operands.len(),
                    )),
                ) {
                    Some(status) => Flow::Stop(status),
                    None => Flow::Jump,
                };
            }

            // Evaluate arguments in the caller, then resume address.
            let args: Vec<Slot> = instr.operands.iter().map(|a| self.eval(a)).collect();
            {
                let frame = self.frames.last_mut().expect("no active frame");
                frame.ip += 1;
            }
            let mut callee_frame =
                Frame::new(callee_idx, self.reg_counts[callee_idx], instr.result);
            for ((id, ty), slot) in entry_params.iter().zip(&args) {
                if *ty == Type::Str {
                    callee_frame.set_str_copy(*id, slot.raw());
                } else {
                    callee_frame.set(*id, *slot);
                }
            }
            self.frames.push(callee_frame);
            self.max_depth = self.max_depth.max(self.frames.len());
            return Flow::Jump;
        }

        // Extern: dispatch through the runtime bridge.
        let arg_types: Vec<Type> = match self.module.find_extern(callee_name) {
            Some(ext) => ext.params.clone(),
            None => match viper_runtime::lookup(callee_name) {
                Some(helper) => helper.params.iter().map(|k| rt_kind_type(*k)).collect(),
                None => {
                    return match self.raise(
                        TrapKind::RuntimeError,
                        Some(bridge::format_unknown_helper(callee_name)),
                    ) {
                        Some(status) => Flow::Stop(status),
                        None => Flow::Jump,
                    };
                }
            },
        };
        let mut args: Vec<(Slot, Type)> = Vec::with_capacity(instr.operands.len());
        for (i, operand) in instr.operands.iter().enumerate() {
            let ty = arg_types.get(i).copied().unwrap_or(Type::I64);
            args.push((self.eval(operand), ty));
        }
        match bridge::call_helper(callee_name, &args, instr.ty) {
            Ok(Some(result)) => {
                if let Some(dst) = instr.result {
                    let frame = self.frames.last_mut().expect("no active frame");
                    if result.is_str {
                        frame.set_str(dst, result.slot.raw());
                    } else {
                        frame.set(dst, result.slot);
                    }
                } else if result.is_str {
                    viper_runtime::string_release(result.slot.raw());
                }
                Flow::Next
            }
            Ok(None) => Flow::Next,
            Err(BridgeError { kind, message }) => match self.raise(kind, Some(message)) {
                Some(status) => Flow::Stop(status),
                None => Flow::Jump,
            },
        }
    }

    /// A call is in tail position when the instruction after it returns
    /// the call's result (or returns void after a void call).
    fn is_tail_position(&self, function: &'m Function, instr: &'m Instr) -> bool {
        let frame = self.frames.last().expect("no active frame");
        let block = &function.blocks[frame.block];
        let Some(next) = block.instructions.get(frame.ip + 1) else {
            return false;
        };
        if next.op != Opcode::Ret {
            return false;
        }
        match (instr.result, next.operands.first()) {
            (None, None) => true,
            (Some(result), Some(value)) => value.as_temp() == Some(result),
            _ => false,
        }
    }

    fn tail_call(
        &mut self,
        callee_idx: usize,
        entry_params: &[(u32, Type)],
        operands: &[Value],
    ) -> Flow {
        // Retain string arguments before the reuse releases the frame's
        // owned handles out from under them.
        let args: Vec<(Slot, bool)> = operands
            .iter()
            .zip(entry_params)
            .map(|(operand, (_, ty))| {
                let slot = self.eval(operand);
                let is_str = *ty == Type::Str;
                if is_str {
                    string_retain(slot.raw());
                }
                (slot, is_str)
            })
            .collect();

        let reg_count = self.reg_counts[callee_idx];
        let frame = self.frames.last_mut().expect("no active frame");
        frame.reuse_for(callee_idx, reg_count);
        for ((id, _), (slot, is_str)) in entry_params.iter().zip(args) {
            if is_str {
                frame.set_str(*id, slot.raw());
            } else {
                frame.set(*id, slot);
            }
        }
        Flow::Jump
    }
}

/// Typed memory access into arena or heap storage. Addresses come from
/// `alloca`/`rt_alloc`; the verifier and null checks gate the pointers.
unsafe fn load_typed(addr: u64, ty: Type) -> Slot {
    unsafe {
        match ty {
            Type::I1 => Slot::from_bool((addr as *const u8).read() & 1 != 0),
            Type::I16 => Slot::from_i64((addr as *const i16).read_unaligned() as i64),
            Type::I32 => Slot::from_i64((addr as *const i32).read_unaligned() as i64),
            Type::F32 => Slot::from_f64((addr as *const f32).read_unaligned() as f64),
            Type::F64 => Slot::from_f64((addr as *const f64).read_unaligned()),
            _ => Slot((addr as *const u64).read_unaligned()),
        }
    }
}

unsafe fn store_typed(addr: u64, ty: Type, value: Slot) {
    unsafe {
        match ty {
            Type::I1 => (addr as *mut u8).write(u8::from(value.as_bool())),
            Type::I16 => (addr as *mut i16).write_unaligned(value.as_i64() as i16),
            Type::I32 => (addr as *mut i32).write_unaligned(value.as_i64() as i32),
            Type::F32 => (addr as *mut f32).write_unaligned(value.as_f64() as f32),
            Type::F64 => (addr as *mut f64).write_unaligned(value.as_f64()),
            _ => (addr as *mut u64).write_unaligned(value.raw()),
        }
    }
}

fn rt_kind_type(kind: viper_runtime::RtKind) -> Type {
    match kind {
        viper_runtime::RtKind::Void => Type::Void,
        viper_runtime::RtKind::I1 => Type::I1,
        viper_runtime::RtKind::I64 => Type::I64,
        viper_runtime::RtKind::F64 => Type::F64,
        viper_runtime::RtKind::Str => Type::Str,
        viper_runtime::RtKind::Ptr => Type::Ptr,
    }
}
