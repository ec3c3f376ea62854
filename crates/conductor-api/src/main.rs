//! Conductor command-line entry point.
//!
//! Binary name: `conductor`
//!
//! Parses CLI arguments, sets up tracing, then dispatches to the command
//! handler. All state lives in in-memory stores for the duration of a run.

mod cli;

use clap::Parser;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,conductor=debug",
        _ => "trace",
    };
    conductor_observe::init_tracing(filter, cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = match cli.command {
        Commands::Assemble(args) => cli::assemble::assemble(args, cli.json).await,
        Commands::Run(args) => cli::run::run(args, cli.json).await,
    };

    conductor_observe::shutdown_tracing();
    result
}
