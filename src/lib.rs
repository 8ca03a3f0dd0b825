//! # mverse-loadgen
//!
//! A load-generation harness for a sharded key-value transaction service
//! exposed over gRPC. Each shard is a separate endpoint at
//! `host:base_port + i`; the harness drives them with concurrent, paced
//! virtual users and reports latency and outcome breakdowns.
//!
//! ```rust,no_run
//! use mverse_loadgen::loadtest::config::LoadTestConfig;
//! use mverse_loadgen::loadtest::engine::LoadTestEngine;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = LoadTestConfig::default();
//! config.settings.virtual_users = 2;
//! config.settings.duration_secs = 5;
//!
//! let result = LoadTestEngine::new(config).run().await?;
//! println!("{} iterations", result.snapshot.total_requests);
//! # Ok(())
//! # }
//! ```

pub mod loadtest;
