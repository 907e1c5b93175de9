//! dumc — command-line entry point.
//!
//! `dumc <source-file>` compiles a single source file to a relocatable
//! ELF64 object `<basename>.o` in the current directory. Usage is printed
//! and the process exits non-zero if anything other than exactly one
//! positional argument is given.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};

fn main() {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    if let Err(err) = real_main(cli) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn real_main(cli: Cli) -> Result<()> {
    debug!("args = {:?}", std::env::args().collect::<Vec<_>>());
    let source_path = cli.source;
    let source = std::fs::read_to_string(&source_path)
        .with_context(|| format!("failed to read '{}'", source_path.display()))?;

    let object_input = dumc::compile_to_object_input(&source)?;
    let out_path = dumc::output_path_for(&source_path);
    dumc_object::write_object_file(&out_path, &object_input).context("failed to write object file")?;
    info!("wrote {}", out_path.display());
    Ok(())
}

#[derive(Debug, Parser)]
#[command(name = "dumc", author, version, about = "Ahead-of-time compiler for a minimal procedural language")]
struct Cli {
    /// Source file to compile
    source: PathBuf,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logger(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .try_init()
        .ok();
}
