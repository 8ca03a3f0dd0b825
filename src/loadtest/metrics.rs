//! Latency and outcome accounting for a run.
//!
//! [`MetricsRecorder`] ingests one [`RequestSample`] per iteration into
//! separate pass/fail latency histograms, with per-operation, per-failure-kind
//! and per-shard breakdowns.
//!
//! # Design
//!
//! - **Single-owner**: no locking. Virtual users send samples over an mpsc
//!   channel and one aggregator task owns the recorder.
//! - **Separate buckets**: pass and fail latencies live in independent
//!   histograms so a burst of refused connections (which fail in
//!   microseconds) does not drag pass percentiles down.
//! - **Coordinated omission correction**: applied at recording time via
//!   `record_correct()`. Synthetic fill-ins only shape percentiles; every
//!   count reported here is logical, one per recorded iteration.
//! - **Millisecond resolution**.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use hdrhistogram::Histogram;

use crate::loadtest::verify::{FailureKind, Outcome};

/// Which remote call an iteration issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    /// `ClientTransaction`.
    Transaction,
    /// `GetCurrentRoot`.
    RootRead,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Transaction => "transaction",
            Self::RootRead => "root-read",
        };
        f.write_str(s)
    }
}

/// A single iteration measurement.
#[derive(Debug, Clone)]
pub struct RequestSample {
    /// The call that was issued.
    pub operation: OperationType,
    /// Wall-clock latency of the call, timeout included.
    pub duration: Duration,
    /// Verifier verdict.
    pub outcome: Outcome,
    /// Shard endpoint label (`host:port`) the call went to.
    pub shard: Option<String>,
}

impl RequestSample {
    /// Sample for a passing iteration.
    pub fn success(operation: OperationType, duration: Duration, shard: Option<String>) -> Self {
        Self {
            operation,
            duration,
            outcome: Outcome::Pass,
            shard,
        }
    }

    /// Sample for a failed iteration.
    pub fn failure(
        operation: OperationType,
        duration: Duration,
        kind: FailureKind,
        shard: Option<String>,
    ) -> Self {
        Self {
            operation,
            duration,
            outcome: Outcome::Fail(kind),
            shard,
        }
    }
}

/// Per-shard counts, sorted by endpoint label in snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct ShardSnapshot {
    /// Endpoint label, `host:port`.
    pub name: String,
    /// Pass latency P50 (milliseconds).
    pub p50: u64,
    /// Pass latency P99 (milliseconds).
    pub p99: u64,
    /// Iterations sent to this shard.
    pub total_requests: u64,
    /// Passing iterations.
    pub success_count: u64,
    /// Failed iterations.
    pub error_count: u64,
    /// Failure counts by category for this shard.
    pub error_categories: HashMap<String, u64>,
}

/// Point-in-time snapshot of all metrics state. Latencies in milliseconds.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Pass latency P50.
    pub p50: u64,
    /// Pass latency P95.
    pub p95: u64,
    /// Pass latency P99.
    pub p99: u64,
    /// Fail latency P50.
    pub error_p50: u64,
    /// Fail latency P95.
    pub error_p95: u64,
    /// Fail latency P99.
    pub error_p99: u64,
    /// Smallest observed latency across all iterations.
    pub min: u64,
    /// Largest observed latency across all iterations.
    pub max: u64,
    /// Passing iterations.
    pub success_count: u64,
    /// Failed iterations.
    pub error_count: u64,
    /// All iterations (pass + fail).
    pub total_requests: u64,
    /// Fraction of iterations that failed (0.0..=1.0).
    pub error_rate: f64,
    /// Iterations per operation.
    pub operation_counts: HashMap<OperationType, u64>,
    /// Failures per operation.
    pub per_operation_errors: HashMap<OperationType, u64>,
    /// Failures by category (connection, timeout, protocol, verification).
    pub error_category_counts: HashMap<String, u64>,
    /// Verification failures by gRPC status code name.
    pub rejection_codes: HashMap<String, u64>,
    /// Per-shard breakdown, sorted by endpoint label.
    pub per_shard: Vec<ShardSnapshot>,
}

struct ShardMetrics {
    success_histogram: Histogram<u64>,
    total_success: u64,
    total_errors: u64,
    error_category_counts: HashMap<String, u64>,
}

impl ShardMetrics {
    fn new() -> Self {
        Self {
            success_histogram: new_histogram(),
            total_success: 0,
            total_errors: 0,
            error_category_counts: HashMap::new(),
        }
    }
}

fn new_histogram() -> Histogram<u64> {
    let mut histogram = Histogram::<u64>::new(3).expect("3 sigfigs is always valid");
    histogram.auto(true);
    histogram
}

fn quantile(histogram: &Histogram<u64>, q: f64) -> u64 {
    if histogram.is_empty() {
        return 0;
    }
    histogram.value_at_quantile(q)
}

/// Owned by the aggregator task; one [`RequestSample`] per iteration.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use mverse_loadgen::loadtest::metrics::{MetricsRecorder, OperationType, RequestSample};
///
/// let mut recorder = MetricsRecorder::new(500);
/// recorder.record(&RequestSample::success(
///     OperationType::Transaction,
///     Duration::from_millis(42),
///     None,
/// ));
///
/// assert_eq!(recorder.success_count(), 1);
/// assert_eq!(recorder.p50(), 42);
/// ```
pub struct MetricsRecorder {
    success_histogram: Histogram<u64>,
    error_histogram: Histogram<u64>,
    /// Expected interval between iterations of one virtual user, for
    /// `record_correct()`.
    expected_interval_ms: u64,
    operation_counts: HashMap<OperationType, u64>,
    error_counts: HashMap<OperationType, u64>,
    total_success: u64,
    total_errors: u64,
    min_ms: Option<u64>,
    max_ms: u64,
    error_category_counts: HashMap<String, u64>,
    rejection_codes: HashMap<String, u64>,
    per_shard: HashMap<String, ShardMetrics>,
}

impl MetricsRecorder {
    /// Create a recorder with the given expected iteration interval.
    ///
    /// Histograms use 3 significant figures with auto-resize.
    pub fn new(expected_interval_ms: u64) -> Self {
        Self {
            success_histogram: new_histogram(),
            error_histogram: new_histogram(),
            expected_interval_ms,
            operation_counts: HashMap::new(),
            error_counts: HashMap::new(),
            total_success: 0,
            total_errors: 0,
            min_ms: None,
            max_ms: 0,
            error_category_counts: HashMap::new(),
            rejection_codes: HashMap::new(),
            per_shard: HashMap::new(),
        }
    }

    /// Record one iteration.
    pub fn record(&mut self, sample: &RequestSample) {
        let ms = sample.duration.as_millis() as u64;
        *self.operation_counts.entry(sample.operation).or_insert(0) += 1;
        self.min_ms = Some(self.min_ms.map_or(ms, |min| min.min(ms)));
        self.max_ms = self.max_ms.max(ms);

        match sample.outcome {
            Outcome::Pass => {
                let _ = self
                    .success_histogram
                    .record_correct(ms, self.expected_interval_ms);
                self.total_success += 1;
            }
            Outcome::Fail(kind) => {
                let _ = self
                    .error_histogram
                    .record_correct(ms, self.expected_interval_ms);
                self.total_errors += 1;
                *self.error_counts.entry(sample.operation).or_insert(0) += 1;
                *self
                    .error_category_counts
                    .entry(kind.category().to_owned())
                    .or_insert(0) += 1;
                if let FailureKind::Verification(code) = kind {
                    *self
                        .rejection_codes
                        .entry(format!("{code:?}"))
                        .or_insert(0) += 1;
                }
            }
        }

        if let Some(ref name) = sample.shard {
            let shard = self
                .per_shard
                .entry(name.clone())
                .or_insert_with(ShardMetrics::new);
            match sample.outcome {
                Outcome::Pass => {
                    let _ = shard
                        .success_histogram
                        .record_correct(ms, self.expected_interval_ms);
                    shard.total_success += 1;
                }
                Outcome::Fail(kind) => {
                    shard.total_errors += 1;
                    *shard
                        .error_category_counts
                        .entry(kind.category().to_owned())
                        .or_insert(0) += 1;
                }
            }
        }
    }

    /// Pass latency P50 in milliseconds; 0 when nothing passed.
    pub fn p50(&self) -> u64 {
        quantile(&self.success_histogram, 0.50)
    }

    /// Pass latency P95 in milliseconds.
    pub fn p95(&self) -> u64 {
        quantile(&self.success_histogram, 0.95)
    }

    /// Pass latency P99 in milliseconds.
    pub fn p99(&self) -> u64 {
        quantile(&self.success_histogram, 0.99)
    }

    /// Fail latency P99 in milliseconds.
    pub fn error_p99(&self) -> u64 {
        quantile(&self.error_histogram, 0.99)
    }

    /// Passing iterations recorded.
    pub fn success_count(&self) -> u64 {
        self.total_success
    }

    /// Failed iterations recorded.
    pub fn error_count(&self) -> u64 {
        self.total_errors
    }

    /// All iterations recorded.
    pub fn total_requests(&self) -> u64 {
        self.total_success + self.total_errors
    }

    /// Failed fraction (0.0..=1.0); 0.0 before anything is recorded.
    pub fn error_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            return 0.0;
        }
        self.total_errors as f64 / total as f64
    }

    /// Iterations recorded for `op`.
    pub fn operation_count(&self, op: OperationType) -> u64 {
        self.operation_counts.get(&op).copied().unwrap_or(0)
    }

    /// Histogram entries including coordinated omission fill-ins.
    #[cfg(test)]
    fn corrected_sample_count(&self) -> u64 {
        self.success_histogram.len() + self.error_histogram.len()
    }

    /// Capture a self-contained snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut per_shard: Vec<ShardSnapshot> = self
            .per_shard
            .iter()
            .map(|(name, shard)| ShardSnapshot {
                name: name.clone(),
                p50: quantile(&shard.success_histogram, 0.50),
                p99: quantile(&shard.success_histogram, 0.99),
                total_requests: shard.total_success + shard.total_errors,
                success_count: shard.total_success,
                error_count: shard.total_errors,
                error_categories: shard.error_category_counts.clone(),
            })
            .collect();
        per_shard.sort_by(|a, b| a.name.cmp(&b.name));

        MetricsSnapshot {
            p50: self.p50(),
            p95: self.p95(),
            p99: self.p99(),
            error_p50: quantile(&self.error_histogram, 0.50),
            error_p95: quantile(&self.error_histogram, 0.95),
            error_p99: self.error_p99(),
            min: self.min_ms.unwrap_or(0),
            max: self.max_ms,
            success_count: self.total_success,
            error_count: self.total_errors,
            total_requests: self.total_requests(),
            error_rate: self.error_rate(),
            operation_counts: self.operation_counts.clone(),
            per_operation_errors: self.error_counts.clone(),
            error_category_counts: self.error_category_counts.clone(),
            rejection_codes: self.rejection_codes.clone(),
            per_shard,
        }
    }
}
