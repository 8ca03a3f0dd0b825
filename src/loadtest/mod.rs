//! Load generation for sharded MerkleVerse transaction services.
//!
//! Synthesizes randomized transaction and root-read calls, spreads them over
//! a pool of shard endpoints from a configurable number of paced virtual
//! users, classifies every outcome and aggregates HdrHistogram-based
//! latency metrics into a terminal summary and a JSON report.

pub mod client;
pub mod config;
pub mod display;
pub mod engine;
pub mod entropy;
pub mod error;
pub mod metrics;
pub mod mock;
pub mod payload;
pub mod report;
pub mod shard;
pub mod summary;
pub mod verify;
pub mod vu;
pub mod wire;
