//! TOML-based load test configuration.
//!
//! Defines typed structs for parsing a run definition: concurrency and
//! timing (`[settings]`), the shard pool (`[target]`), payload synthesis
//! (`[payload]`), and a weighted mix of operations (`[[scenario]]`).
//!
//! # Example TOML
//!
//! ```toml
//! [settings]
//! virtual_users = 8
//! duration_secs = 60
//! pacing_ms = 500
//!
//! [target]
//! host = "localhost"
//! base_port = 8000
//! pool_size = 10
//!
//! [payload]
//! key_length = 4
//! value_length = 5
//! auxiliary = "6OWjvfz3RRkoQ7O7RdoPm1O5"
//!
//! [[scenario]]
//! type = "transaction"
//! weight = 90
//!
//! [[scenario]]
//! type = "root-read"
//! weight = 10
//! ```
//!
//! Only `[settings]` is required. Omitted sections take the defaults of the
//! original transaction workload.

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::loadtest::error::LoadTestError;

/// Upper bound for `key_length` and `value_length`, in bytes.
pub const MAX_FIELD_LENGTH: usize = 4096;

/// Auxiliary token sent with every transaction unless configured otherwise.
pub const DEFAULT_AUXILIARY: &str = "6OWjvfz3RRkoQ7O7RdoPm1O5";

/// Top-level load test configuration parsed from a TOML file.
///
/// Fixed for the lifetime of one run: the engine clones it into an `Arc`
/// at start and never mutates it afterwards.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoadTestConfig {
    /// Concurrency and timing.
    pub settings: Settings,
    /// Shard pool and transport options.
    #[serde(default)]
    pub target: TargetConfig,
    /// Request synthesis options.
    #[serde(default)]
    pub payload: PayloadConfig,
    /// Weighted operation mix. Defaults to a single transaction step.
    #[serde(default = "default_scenario")]
    pub scenario: Vec<ScenarioStep>,
}

/// Concurrency and timing settings for one run.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Number of concurrent virtual users.
    pub virtual_users: u32,
    /// Wall-clock run duration in seconds.
    pub duration_secs: u64,
    /// Delay between iterations of one virtual user, in milliseconds.
    #[serde(default = "default_pacing")]
    pub pacing_ms: u64,
    /// Per-call timeout in milliseconds.
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    /// Expected interval between consecutive calls from one virtual user (ms).
    ///
    /// Used for coordinated omission correction. Falls back to `pacing_ms`
    /// when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_interval_ms: Option<u64>,
}

fn default_pacing() -> u64 {
    500
}

fn default_timeout() -> u64 {
    5000
}

/// How a virtual user picks a shard for each call.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionMode {
    /// Uniformly random shard per call.
    #[default]
    Random,
    /// Cycle through the pool, each virtual user starting at its own offset.
    RoundRobin,
}

/// Connection lifecycle policy for the invoker.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionPolicy {
    /// Open a fresh connection for every call and drop it afterwards.
    #[default]
    PerCall,
    /// Each virtual user keeps one connection per shard it has used.
    PerVu,
}

/// The shard pool: `pool_size` replicas on contiguous ports from `base_port`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct TargetConfig {
    /// Host shared by every shard.
    pub host: String,
    /// Port of shard 0.
    pub base_port: u16,
    /// Number of shards (N).
    pub pool_size: u16,
    /// `true` for plaintext HTTP/2, `false` for TLS.
    pub plaintext: bool,
    /// Shard selection strategy.
    pub selection: SelectionMode,
    /// Connection lifecycle policy.
    pub connection: ConnectionPolicy,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            base_port: 8000,
            pool_size: 10,
            plaintext: true,
            selection: SelectionMode::Random,
            connection: ConnectionPolicy::PerCall,
        }
    }
}

/// Transaction kind carried by synthesized update requests.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionKind {
    /// Write `value` under `key`.
    #[default]
    Update,
    /// Remove `key`; no value is sent.
    Delete,
}

/// Payload synthesis options.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct PayloadConfig {
    /// Length of generated keys in bytes.
    pub key_length: usize,
    /// Length of generated values in bytes.
    pub value_length: usize,
    /// Base64-encoded auxiliary token.
    pub auxiliary: String,
    /// Transaction kind for every transaction step.
    pub transaction_type: TransactionKind,
    /// Ask the service to wait for the transaction to be committed.
    pub wait: bool,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            key_length: 4,
            value_length: 5,
            auxiliary: DEFAULT_AUXILIARY.to_string(),
            transaction_type: TransactionKind::Update,
            wait: true,
        }
    }
}

/// A single scenario step with a scheduling weight.
///
/// The `type` field in TOML determines the variant.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ScenarioStep {
    /// A keyed `ClientTransaction` call with a synthesized payload.
    #[serde(rename = "transaction")]
    Transaction {
        /// Scheduling weight relative to other steps.
        weight: u32,
    },
    /// A `GetCurrentRoot` call with an empty payload.
    #[serde(rename = "root-read")]
    RootRead {
        /// Scheduling weight relative to other steps.
        weight: u32,
    },
}

impl ScenarioStep {
    /// Returns the scheduling weight of this step, regardless of variant.
    pub fn weight(&self) -> u32 {
        match self {
            Self::Transaction { weight } | Self::RootRead { weight } => *weight,
        }
    }
}

fn default_scenario() -> Vec<ScenarioStep> {
    vec![ScenarioStep::Transaction { weight: 100 }]
}

impl Default for LoadTestConfig {
    /// The original transaction workload: 8 virtual users for 60 seconds,
    /// pacing 500 ms, random shard out of 10 starting at port 8000.
    fn default() -> Self {
        Self {
            settings: Settings {
                virtual_users: 8,
                duration_secs: 60,
                pacing_ms: default_pacing(),
                timeout_ms: default_timeout(),
                expected_interval_ms: None,
            },
            target: TargetConfig::default(),
            payload: PayloadConfig::default(),
            scenario: default_scenario(),
        }
    }
}

impl LoadTestConfig {
    /// Parse a TOML string into a validated [`LoadTestConfig`].
    pub fn from_toml(content: &str) -> Result<Self, LoadTestError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a [`LoadTestConfig`] from a file path.
    ///
    /// Returns [`LoadTestError::ConfigIo`] if the file cannot be read,
    /// [`LoadTestError::ConfigParse`] if the TOML is malformed, or
    /// [`LoadTestError::ConfigValidation`] if validation fails.
    pub fn load(path: &Path) -> Result<Self, LoadTestError> {
        let content = std::fs::read_to_string(path).map_err(|source| LoadTestError::ConfigIo {
            source,
            path: path.display().to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Validate that the config is semantically correct.
    ///
    /// Called again by the engine before any virtual user is spawned, so
    /// programmatically built configs get the same checks as parsed ones.
    pub fn validate(&self) -> Result<(), LoadTestError> {
        let settings = &self.settings;
        if settings.virtual_users == 0 {
            return Err(LoadTestError::validation(
                "settings.virtual_users must be at least 1",
            ));
        }
        if settings.duration_secs == 0 {
            return Err(LoadTestError::validation(
                "settings.duration_secs must be greater than 0",
            ));
        }
        if settings.timeout_ms == 0 {
            return Err(LoadTestError::validation(
                "settings.timeout_ms must be greater than 0",
            ));
        }

        let target = &self.target;
        if target.pool_size == 0 {
            return Err(LoadTestError::validation(
                "target.pool_size must be at least 1 (empty shard pool)",
            ));
        }
        if target.host.trim().is_empty() {
            return Err(LoadTestError::validation("target.host must not be empty"));
        }
        let last_port = u32::from(target.base_port) + u32::from(target.pool_size) - 1;
        if last_port > u32::from(u16::MAX) {
            return Err(LoadTestError::validation(format!(
                "target port range {}..{} exceeds 65535",
                target.base_port,
                last_port + 1
            )));
        }

        let payload = &self.payload;
        for (name, len) in [
            ("key_length", payload.key_length),
            ("value_length", payload.value_length),
        ] {
            if len == 0 || len > MAX_FIELD_LENGTH {
                return Err(LoadTestError::validation(format!(
                    "payload.{name}={len} must be between 1 and {MAX_FIELD_LENGTH}"
                )));
            }
        }
        payload.auxiliary_bytes()?;

        if self.scenario.is_empty() {
            return Err(LoadTestError::validation(
                "Config must contain at least one [[scenario]] step",
            ));
        }
        let total_weight: u64 = self.scenario.iter().map(|s| u64::from(s.weight())).sum();
        if total_weight == 0 {
            return Err(LoadTestError::validation(
                "Total scenario weights must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl Settings {
    /// Run duration as a [`Duration`].
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    /// Pacing delay as a [`Duration`].
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    /// Convert the `timeout_ms` field to a [`Duration`].
    pub fn timeout_as_duration(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Interval used for coordinated omission correction, never zero.
    pub fn effective_expected_interval_ms(&self) -> u64 {
        self.expected_interval_ms.unwrap_or(self.pacing_ms).max(1)
    }
}

impl PayloadConfig {
    /// Decode the base64 auxiliary token into raw bytes.
    pub fn auxiliary_bytes(&self) -> Result<Vec<u8>, LoadTestError> {
        general_purpose::STANDARD
            .decode(self.auxiliary.trim())
            .map_err(|e| {
                LoadTestError::validation(format!("payload.auxiliary is not valid base64: {e}"))
            })
    }
}
