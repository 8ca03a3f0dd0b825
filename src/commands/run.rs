//! `mverse-loadgen run` command implementation.

use anyhow::Result;
use std::io::IsTerminal;
use std::path::PathBuf;

use mverse_loadgen::loadtest::config::LoadTestConfig;
use mverse_loadgen::loadtest::engine::LoadTestEngine;
use mverse_loadgen::loadtest::report::{write_report, LoadTestReport};
use mverse_loadgen::loadtest::summary::render_summary;

use super::RunArgs;

/// Execute the `run` command.
///
/// Loads config (explicit path, auto-discovery, or built-in defaults),
/// applies CLI overrides, runs the engine and prints the summary.
pub async fn execute_run(args: RunArgs) -> Result<()> {
    let config_file = match args.config.clone() {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: {}\nUse `mverse-loadgen init` to create one.",
                    path.display()
                );
            }
            Some(path)
        },
        None => discover_config(),
    };

    let mut config = match config_file {
        Some(path) => {
            eprintln!("Loading config from: {}", path.display());
            LoadTestConfig::load(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config '{}': {}", path.display(), e))?
        },
        None => {
            eprintln!("No .mverse/loadtest.toml found, using the default transaction workload.");
            LoadTestConfig::default()
        },
    };

    apply_overrides(&mut config, &args);

    let mut engine = LoadTestEngine::new(config)
        .with_no_color(args.no_color)
        .with_log_payloads(args.log_payloads);
    if let Some(n) = args.iterations {
        engine = engine.with_iterations(n);
    }
    if let Some(seed) = args.seed {
        engine = engine.with_seed(seed);
    }

    let result = engine
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Load test failed: {}", e))?;

    if stdout_colors(args.no_color, std::io::stdout().is_terminal()) {
        colored::control::unset_override();
    } else {
        colored::control::set_override(false);
    }
    println!("{}", render_summary(&result, engine.config()));

    if !args.no_report {
        let report = LoadTestReport::from_result(&result, engine.config());
        let cwd = std::env::current_dir()?;
        match write_report(&report, &cwd) {
            Ok(path) => {
                eprintln!();
                eprintln!("Report written to: {}", path.display());
            },
            Err(e) => {
                eprintln!();
                eprintln!("Warning: Failed to write report: {}", e);
            },
        }
    }

    if args.fail_on_error && result.has_failures() {
        anyhow::bail!(
            "{} of {} iterations failed",
            result.snapshot.error_count,
            result.snapshot.total_requests
        );
    }

    Ok(())
}

/// Apply CLI flag overrides to a loaded config.
fn apply_overrides(config: &mut LoadTestConfig, args: &RunArgs) {
    if let Some(v) = args.vus {
        config.settings.virtual_users = v;
    }
    if let Some(d) = args.duration {
        config.settings.duration_secs = d;
    }
    if let Some(p) = args.pacing {
        config.settings.pacing_ms = p;
    }
    if let Some(n) = args.pool_size {
        config.target.pool_size = n;
    }
    if let Some(port) = args.base_port {
        config.target.base_port = port;
    }
    if let Some(ref host) = args.host {
        config.target.host = host.clone();
    }
    if args.secure {
        config.target.plaintext = false;
    }
}

/// Whether the stdout summary may use colors. `NO_COLOR` and `CLICOLOR`
/// still apply when this returns `true`.
fn stdout_colors(no_color: bool, stdout_is_terminal: bool) -> bool {
    !no_color && stdout_is_terminal
}

/// Discover `.mverse/loadtest.toml` by walking parent directories, the way
/// `.git` is found.
fn discover_config() -> Option<PathBuf> {
    let mut dir = std::env::current_dir().ok()?;
    loop {
        let candidate = dir.join(".mverse").join("loadtest.toml");
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: RunArgs,
    }

    fn parse(argv: &[&str]) -> RunArgs {
        let mut full = vec!["run"];
        full.extend_from_slice(argv);
        TestCli::parse_from(full).args
    }

    #[test]
    fn test_discover_config_does_not_panic() {
        let _ = discover_config();
    }

    #[test]
    fn test_no_overrides_keep_config() {
        let mut config = LoadTestConfig::default();
        apply_overrides(&mut config, &parse(&[]));
        assert_eq!(config, LoadTestConfig::default());
    }

    #[test]
    fn test_settings_overrides() {
        let mut config = LoadTestConfig::default();
        apply_overrides(
            &mut config,
            &parse(&["--vus", "10", "--duration", "30", "--pacing", "1000"]),
        );
        assert_eq!(config.settings.virtual_users, 10);
        assert_eq!(config.settings.duration_secs, 30);
        assert_eq!(config.settings.pacing_ms, 1000);
    }

    #[test]
    fn test_target_overrides() {
        let mut config = LoadTestConfig::default();
        apply_overrides(
            &mut config,
            &parse(&[
                "--pool-size",
                "1",
                "--base-port",
                "9000",
                "--host",
                "shard.internal",
                "--secure",
            ]),
        );
        assert_eq!(config.target.pool_size, 1);
        assert_eq!(config.target.base_port, 9000);
        assert_eq!(config.target.host, "shard.internal");
        assert!(!config.target.plaintext);
    }

    #[test]
    fn test_stdout_colors_follow_stdout_only() {
        assert!(stdout_colors(false, true));
        assert!(!stdout_colors(false, false));
        assert!(!stdout_colors(true, true));
    }

    #[test]
    fn test_zero_vus_override_fails_validation() {
        let mut config = LoadTestConfig::default();
        apply_overrides(&mut config, &parse(&["--vus", "0"]));
        assert!(config.validate().is_err());
    }
}
