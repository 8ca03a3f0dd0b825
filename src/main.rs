//! mverse-loadgen: load generator for sharded MerkleVerse services

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::prelude::*;

mod commands;

/// Load generator for sharded MerkleVerse transaction services
#[derive(Parser)]
#[command(name = "mverse-loadgen")]
#[command(about = "Drive a sharded MerkleVerse gRPC service with paced virtual users", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: commands::LoadtestCommand,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.command.logs_payloads());
    cli.command.execute()
}

/// Logs go to stderr so the summary on stdout stays clean.
fn init_logging(verbose: bool, log_payloads: bool) {
    let default_filter = if verbose {
        "mverse_loadgen=debug,warn"
    } else if log_payloads {
        "mverse_loadgen=info,warn"
    } else {
        "warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
