//! `mverse-loadgen init` command implementation.

use anyhow::Result;
use std::path::{Path, PathBuf};

/// Write `.mverse/loadtest.toml` under `root`. Returns the written path.
pub fn execute_init(root: &Path, force: bool) -> Result<PathBuf> {
    let config_dir = root.join(".mverse");
    let config_path = config_dir.join("loadtest.toml");

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}\n\
             Use `--force` to overwrite.",
            config_path.display()
        );
    }

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    std::fs::write(&config_path, generate_default_template())?;
    eprintln!("Created {}", config_path.display());
    eprintln!("Edit the file to customize the workload.");

    Ok(config_path)
}

/// Starter config reproducing the default transaction workload.
fn generate_default_template() -> String {
    r#"# mverse-loadgen configuration
# Docs: run `mverse-loadgen run --help` for CLI overrides.

[settings]
# Concurrent virtual users (must be >= 1)
virtual_users = 8
# Run duration in seconds; no iteration starts after it elapses
duration_secs = 60
# Delay between iterations of one virtual user, in milliseconds
pacing_ms = 500
# Per-call timeout in milliseconds
timeout_ms = 5000

[target]
host = "localhost"
# Shards listen on base_port .. base_port + pool_size - 1
base_port = 8000
pool_size = 10
# false switches to TLS
plaintext = true
# "random" or "round-robin"
selection = "random"
# "per-call" opens a connection per call, "per-vu" reuses one per shard
connection = "per-call"

[payload]
# Sizes in bytes of the random key and value
key_length = 4
value_length = 5
# Base64 auxiliary token sent with every transaction
auxiliary = "6OWjvfz3RRkoQ7O7RdoPm1O5"
# "update" or "delete"
transaction_type = "update"
wait = true

[[scenario]]
type = "transaction"
weight = 100

# Uncomment to mix in root reads:
# [[scenario]]
# type = "root-read"
# weight = 10
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mverse_loadgen::loadtest::config::LoadTestConfig;

    #[test]
    fn test_default_template_matches_defaults() {
        let config = LoadTestConfig::from_toml(&generate_default_template()).unwrap();
        config.validate().unwrap();
        assert_eq!(config, LoadTestConfig::default());
    }

    #[test]
    fn test_init_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = execute_init(dir.path(), false).unwrap();
        assert_eq!(path, dir.path().join(".mverse").join("loadtest.toml"));
        assert!(LoadTestConfig::load(&path).is_ok());
    }

    #[test]
    fn test_init_refuses_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = execute_init(dir.path(), false).unwrap();
        std::fs::write(&path, "# custom").unwrap();

        let err = execute_init(dir.path(), false).unwrap_err();
        assert!(err.to_string().contains("--force"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# custom");

        execute_init(dir.path(), true).unwrap();
        assert!(LoadTestConfig::load(&path).is_ok());
    }
}
