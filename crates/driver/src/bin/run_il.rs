//! run-il: execute a textual IL module on the VM
//!
//! Exit codes: the `@main` return value clamped to 0..=255, 10 when a
//! breakpoint stops the run, 1 on an uncaught trap or load error.

use clap::Parser as ClapParser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use viper_driver::{EXIT_BREAK, EXIT_TRAP, clamp_exit_code, load_module, module_display_name};
use viper_il::Opcode;
use viper_il::verify::verify_module;
use viper_vm::{Breakpoint, DebugScript, RunStatus, TraceMode, Vm, VmOptions};

#[derive(ClapParser)]
#[command(name = "run-il")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run a Viper IL module on the bytecode VM", long_about = None)]
struct Cli {
    /// Input .il module; must define func @main.
    file: PathBuf,

    /// Enable execution tracing (il or src level).
    #[arg(long, value_name = "MODE", num_args = 0..=1, default_missing_value = "il")]
    trace: Option<String>,

    /// Redirect runtime input from a file.
    #[arg(long = "stdin-from", value_name = "FILE")]
    stdin_from: Option<PathBuf>,

    /// Trap after N executed instructions.
    #[arg(long = "max-steps", value_name = "N")]
    max_steps: Option<u64>,

    /// Breakpoint: label, fn:label, or file:line.
    #[arg(long = "break", value_name = "SPEC")]
    breaks: Vec<String>,

    /// Source breakpoint: file:line.
    #[arg(long = "break-src", value_name = "FILE:LINE")]
    break_srcs: Vec<String>,

    /// Report writes to a named temporary.
    #[arg(long, value_name = "NAME")]
    watch: Vec<String>,

    /// Print executed-instruction counts after the run.
    #[arg(long)]
    count: bool,

    /// Print wall-clock execution time after the run.
    #[arg(long)]
    time: bool,

    /// Print a machine-readable trap record on failure.
    #[arg(long = "dump-trap")]
    dump_trap: bool,

    /// Scripted debugger commands consumed at breakpoints.
    #[arg(long = "debug-cmds", value_name = "FILE")]
    debug_cmds: Option<PathBuf>,

    /// Break before the first instruction.
    #[arg(long)]
    step: bool,

    /// Resume automatically (and silently) at breakpoints.
    #[arg(long = "continue")]
    auto_continue: bool,

    /// Disable tail-call frame reuse.
    #[arg(long = "no-tail-calls")]
    no_tail_calls: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => ExitCode::from(code as u8),
        Err(message) => {
            eprintln!("{message}");
            ExitCode::from(EXIT_TRAP as u8)
        }
    }
}

fn run(cli: Cli) -> Result<i32, String> {
    let module = load_module(&cli.file)?;
    let sink = verify_module(&module);
    if sink.has_errors() {
        return Err(sink.error_summary());
    }

    if let Some(path) = &cli.stdin_from {
        viper_runtime::io::set_input_file(&path.display().to_string())?;
    }

    let trace = match &cli.trace {
        Some(mode) => TraceMode::parse(Some(mode.as_str()))?,
        None => TraceMode::Off,
    };
    let options = VmOptions {
        enable_tail_calls: !cli.no_tail_calls,
        trace,
        max_steps: cli.max_steps,
    };

    let mut vm = Vm::new(&module, options);
    let display = module_display_name(&cli.file);
    vm.files.set_default(display);

    let mut breakpoints = Vec::new();
    for spec in &cli.breaks {
        breakpoints.push(Breakpoint::parse(spec)?);
    }
    for spec in &cli.break_srcs {
        breakpoints.push(Breakpoint::parse_src(spec)?);
    }
    vm.set_breakpoints(breakpoints);
    if let Some(path) = &cli.debug_cmds {
        vm.set_debug_script(DebugScript::from_file(&path.display().to_string()));
    }
    if cli.step {
        vm.set_initial_step();
    }
    vm.set_auto_continue(cli.auto_continue);
    for name in &cli.watch {
        vm.add_watch(name);
    }

    let started = Instant::now();
    let status = vm.run();
    let elapsed = started.elapsed();

    if cli.count {
        eprintln!("[COUNT] total={}", vm.steps_executed());
        for (op, &n) in Opcode::ALL.iter().zip(vm.opcode_counts()) {
            if n > 0 {
                eprintln!("[COUNT] op={} n={n}", op.mnemonic());
            }
        }
    }
    if cli.time {
        eprintln!("[TIME] wall_ms={}", elapsed.as_millis());
    }

    match status {
        RunStatus::Completed(value) => Ok(clamp_exit_code(value)),
        RunStatus::Breakpoint => Ok(EXIT_BREAK),
        RunStatus::Paused => {
            // No poll callback is installed here; treat as a stop.
            Ok(EXIT_BREAK)
        }
        RunStatus::Trapped(info) => {
            eprintln!("{info}");
            if cli.dump_trap {
                match serde_json::to_string(&info) {
                    Ok(json) => eprintln!("{json}"),
                    Err(e) => eprintln!("cannot serialize trap record: {e}"),
                }
            }
            Ok(EXIT_TRAP)
        }
    }
}
