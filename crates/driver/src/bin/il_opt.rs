//! il-opt: run transform pipelines over a textual IL module
//!
//! `il-opt <in.il> -o <out.il> [--pipeline O0|O1|O2 | --passes "a, b"]
//! [-verify-each]`. The output is the canonical textual serialization
//! of the transformed module.

use clap::Parser as ClapParser;
use std::path::PathBuf;
use std::process::ExitCode;
use viper_driver::{load_module, resolve_pipeline, run_passes};
use viper_il::io::print_module;
use viper_il::verify::verify_module;

#[derive(ClapParser)]
#[command(name = "il-opt")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Optimize a Viper IL module through the pass manager", long_about = None)]
struct Cli {
    /// Input .il module.
    input: PathBuf,

    /// Output path for the transformed module.
    #[arg(short = 'o', value_name = "FILE")]
    output: PathBuf,

    /// Preset pipeline (O0, O1, O2). Defaults to O1.
    #[arg(long, value_name = "NAME", conflicts_with = "passes")]
    pipeline: Option<String>,

    /// Explicit comma-separated pass list; whitespace is trimmed.
    #[arg(long, value_name = "LIST")]
    passes: Option<String>,

    /// Re-verify the module after every pass.
    #[arg(long = "verify-each")]
    verify_each: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    // The historical spelling `-verify-each` is accepted alongside the
    // conventional `--verify-each`.
    let args = std::env::args().map(|arg| {
        if arg == "-verify-each" {
            "--verify-each".to_string()
        } else {
            arg
        }
    });
    let cli = Cli::parse_from(args);
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let mut module = load_module(&cli.input)?;
    let sink = verify_module(&module);
    if sink.has_errors() {
        return Err(format!(
            "{}: input does not verify:\n{}",
            cli.input.display(),
            sink.error_summary()
        ));
    }

    let ids = resolve_pipeline(cli.pipeline.as_deref(), cli.passes.as_deref())?;
    tracing::debug!(pipeline = ?ids, "running pass pipeline");
    run_passes(&mut module, &ids, cli.verify_each)?;

    let text = print_module(&module);
    std::fs::write(&cli.output, text).map_err(|e| format!("{}: {e}", cli.output.display()))?;
    Ok(())
}
