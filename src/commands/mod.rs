//! `mverse-loadgen` CLI subcommands.
//!
//! Provides `run` (execute a load test) and `init` (generate starter config).

mod init;
mod run;

use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Load generator commands.
#[derive(Debug, Subcommand)]
pub enum LoadtestCommand {
    /// Run a load test against the shard pool
    ///
    /// Uses the run definition in .mverse/loadtest.toml (or a custom config
    /// path, or the built-in transaction workload when neither exists).
    /// Prints a summary to the terminal and writes a JSON report to
    /// .mverse/reports/.
    Run(RunArgs),

    /// Generate a starter loadtest config file
    ///
    /// Creates .mverse/loadtest.toml reproducing the default transaction
    /// workload, with the root-read mix commented in.
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

/// Options for `run`. Every override beats the config file.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to config file (default: auto-discover .mverse/loadtest.toml)
    #[arg(long, env = "MVERSE_LOADTEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Number of virtual users
    #[arg(long)]
    pub vus: Option<u32>,

    /// Test duration in seconds
    #[arg(long)]
    pub duration: Option<u64>,

    /// Delay between iterations of one virtual user, in milliseconds
    #[arg(long)]
    pub pacing: Option<u64>,

    /// Number of shards in the pool
    #[arg(long)]
    pub pool_size: Option<u16>,

    /// Port of shard 0
    #[arg(long)]
    pub base_port: Option<u16>,

    /// Host serving every shard
    #[arg(long)]
    pub host: Option<String>,

    /// Use TLS instead of plaintext HTTP/2
    #[arg(long)]
    pub secure: bool,

    /// Stop after this many iterations across all virtual users
    #[arg(long)]
    pub iterations: Option<u64>,

    /// Seed every virtual user's generator for a reproducible payload stream
    #[arg(long)]
    pub seed: Option<u64>,

    /// Log every synthesized request as JSON
    #[arg(long)]
    pub log_payloads: bool,

    /// Exit non-zero when any iteration failed
    #[arg(long)]
    pub fail_on_error: bool,

    /// Disable JSON report output
    #[arg(long)]
    pub no_report: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

impl LoadtestCommand {
    /// Execute the selected subcommand.
    pub fn execute(self) -> Result<()> {
        match self {
            LoadtestCommand::Run(args) => {
                let runtime = tokio::runtime::Runtime::new()?;
                runtime.block_on(run::execute_run(args))
            },
            LoadtestCommand::Init { force } => {
                let cwd = std::env::current_dir()?;
                init::execute_init(&cwd, force).map(|_| ())
            },
        }
    }

    /// Whether this invocation asked for per-request payload logging.
    pub fn logs_payloads(&self) -> bool {
        matches!(self, LoadtestCommand::Run(args) if args.log_payloads)
    }
}
