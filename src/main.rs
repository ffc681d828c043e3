//! grid-residual: difference two elevation grids
//!
//! Usage: grid-residual <GRID_A> <GRID_B>

use clap::Parser;
use std::io;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::{fmt, EnvFilter};

use grid_residual::commands::ResidualCommand;
use grid_residual::error::ResidualError;

#[derive(Parser)]
#[command(name = "grid-residual")]
#[command(version)]
#[command(
    about = "Compare two co-registered elevation grids and write a residual surface",
    long_about = "GRID_B is subtracted from GRID_A. A CHRTR2 residual surface is written \
                  next to GRID_A, named after it with its last four characters replaced \
                  by .ch2, and a summary is printed to stdout. Both grids must share \
                  extent and bin size."
)]
struct Cli {
    /// Reference grid (ESRI ASCII grid)
    grid_a: PathBuf,

    /// Grid subtracted from the reference
    grid_b: PathBuf,

    /// Do not print progress to stderr
    #[arg(short, long)]
    quiet: bool,

    /// Log level for diagnostics (overridden by RUST_LOG)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Placeholder, accepted and ignored
    #[arg(short = 'b', hide = true)]
    placeholder: bool,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn main() {
    eprintln!("\n\n grid-residual V{} \n", grid_residual::VERSION);

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            process::exit(-1);
        }
        // --help and --version
        Err(e) => e.exit(),
    };

    init_tracing(&cli.log_level);

    // Must be set before the scan starts
    if cli.quiet {
        grid_residual::config::set_progress_enabled(false);
    }

    let stdout = io::stdout();
    let mut handle = stdout.lock();

    let result = ResidualCommand::new().run(&cli.grid_a, &cli.grid_b, &mut handle);

    if let Err(e) = result {
        if let ResidualError::Usage(_) = e {
            eprintln!("Usage: grid-residual <GRID_A> <GRID_B>");
        }
        eprintln!("\nError: {}\n", e);
        process::exit(-1);
    }
}
