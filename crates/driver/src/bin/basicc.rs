//! basicc: compile a BASIC source file to textual IL
//!
//! `basicc <in.bas> -o <out.il> [--run]`. With `--run` the lowered
//! module executes immediately on the VM instead of being written out.

use clap::Parser as ClapParser;
use std::path::PathBuf;
use std::process::ExitCode;
use viper_driver::{EXIT_TRAP, clamp_exit_code};
use viper_il::io::print_module;
use viper_il::verify::verify_module;
use viper_vm::{RunStatus, Vm, VmOptions};

#[derive(ClapParser)]
#[command(name = "basicc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Compile BASIC source to Viper IL", long_about = None)]
struct Cli {
    /// Input BASIC source file.
    input: PathBuf,

    /// Output path for the lowered IL module.
    #[arg(short = 'o', value_name = "FILE", required_unless_present = "run")]
    output: Option<PathBuf>,

    /// Execute the lowered module instead of writing it.
    #[arg(long)]
    run: bool,
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
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<i32, String> {
    let source = std::fs::read_to_string(&cli.input)
        .map_err(|e| format!("{}: {e}", cli.input.display()))?;
    let module = viper_basic::compile_source(&source)
        .map_err(|e| format!("{}: {e}", cli.input.display()))?;
    let sink = verify_module(&module);
    if sink.has_errors() {
        return Err(format!(
            "{}: lowered module does not verify:\n{}",
            cli.input.display(),
            sink.error_summary()
        ));
    }

    if cli.run {
        let mut vm = Vm::new(&module, VmOptions::default());
        vm.files.set_default(cli.input.display().to_string());
        return Ok(match vm.run() {
            RunStatus::Completed(value) => clamp_exit_code(value),
            RunStatus::Trapped(info) => {
                eprintln!("{info}");
                EXIT_TRAP
            }
            _ => EXIT_TRAP,
        });
    }

    let output = cli.output.expect("clap enforces -o without --run");
    std::fs::write(&output, print_module(&module))
        .map_err(|e| format!("{}: {e}", output.display()))?;
    Ok(0)
}
