//! Machine-readable run report under `.mverse/reports/`.
//!
//! Produces a schema-versioned JSON report with latency percentiles,
//! throughput, the outcome breakdown by kind, per-shard counts and the full
//! resolved config for reproducibility.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::loadtest::config::LoadTestConfig;
use crate::loadtest::engine::LoadTestResult;

/// Bumped whenever a field is renamed or removed.
const SCHEMA_VERSION: &str = "1.0";

/// One run, as written to disk.
#[derive(Debug, Serialize)]
pub struct LoadTestReport {
    /// See [`SCHEMA_VERSION`].
    pub schema_version: String,
    /// RFC 3339 timestamp when the report was generated.
    pub timestamp: String,
    /// Shard endpoints that were targeted, in shard order.
    pub targets: Vec<String>,
    /// Actual run duration in seconds, drain included.
    pub duration_secs: f64,
    /// Config after CLI overrides, so the run can be repeated.
    pub config: LoadTestConfig,
    /// Aggregate metrics.
    pub metrics: ReportMetrics,
    /// Iteration counts by outcome kind: `ok` plus every failure category.
    pub outcomes: BTreeMap<String, u64>,
    /// Verification failures by gRPC status code name.
    pub rejections: BTreeMap<String, u64>,
    /// Per-shard counts keyed by `host:port`.
    pub per_shard: BTreeMap<String, ShardReportMetrics>,
}

/// Aggregate metrics in the report.
#[derive(Debug, Serialize)]
pub struct ReportMetrics {
    /// All iterations.
    pub total_iterations: u64,
    /// Passing iterations.
    pub success_count: u64,
    /// Failed iterations.
    pub error_count: u64,
    /// Failed fraction (0.0..=1.0).
    pub error_rate: f64,
    /// Iterations per second.
    pub throughput_ips: f64,
    /// Latency breakdown.
    pub latency: LatencyMetrics,
    /// Iterations per operation (`transaction`, `root-read`).
    pub operation_counts: BTreeMap<String, u64>,
    /// Failures per operation.
    pub operation_errors: BTreeMap<String, u64>,
}

/// Latency metrics in milliseconds.
#[derive(Debug, Serialize)]
pub struct LatencyMetrics {
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
    pub error_p50_ms: u64,
    pub error_p95_ms: u64,
    pub error_p99_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
}

/// Per-shard metrics for JSON report output.
#[derive(Debug, Serialize)]
pub struct ShardReportMetrics {
    pub total_iterations: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub p50_ms: u64,
    pub p99_ms: u64,
    pub errors: BTreeMap<String, u64>,
}

impl LoadTestReport {
    /// Build a report from a finished run and its resolved config.
    pub fn from_result(result: &LoadTestResult, config: &LoadTestConfig) -> Self {
        let snap = &result.snapshot;
        let elapsed_secs = result.elapsed.as_secs_f64();
        let throughput_ips = if elapsed_secs > 0.0 {
            snap.total_requests as f64 / elapsed_secs
        } else {
            0.0
        };

        let mut outcomes: BTreeMap<String, u64> = ["connection", "timeout", "protocol", "verification"]
            .into_iter()
            .map(|kind| {
                let count = snap.error_category_counts.get(kind).copied().unwrap_or(0);
                (kind.to_string(), count)
            })
            .collect();
        outcomes.insert("ok".to_string(), snap.success_count);

        let targets = (0..config.target.pool_size)
            .filter_map(|offset| config.target.base_port.checked_add(offset))
            .map(|port| format!("{}:{port}", config.target.host))
            .collect();

        let per_shard = snap
            .per_shard
            .iter()
            .map(|shard| {
                (
                    shard.name.clone(),
                    ShardReportMetrics {
                        total_iterations: shard.total_requests,
                        success_count: shard.success_count,
                        error_count: shard.error_count,
                        p50_ms: shard.p50,
                        p99_ms: shard.p99,
                        errors: shard.error_categories.clone().into_iter().collect(),
                    },
                )
            })
            .collect();

        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            targets,
            duration_secs: elapsed_secs,
            config: config.clone(),
            metrics: ReportMetrics {
                total_iterations: snap.total_requests,
                success_count: snap.success_count,
                error_count: snap.error_count,
                error_rate: snap.error_rate,
                throughput_ips,
                latency: LatencyMetrics {
                    p50_ms: snap.p50,
                    p95_ms: snap.p95,
                    p99_ms: snap.p99,
                    error_p50_ms: snap.error_p50,
                    error_p95_ms: snap.error_p95,
                    error_p99_ms: snap.error_p99,
                    min_ms: snap.min,
                    max_ms: snap.max,
                },
                operation_counts: snap
                    .operation_counts
                    .iter()
                    .map(|(op, count)| (op.to_string(), *count))
                    .collect(),
                operation_errors: snap
                    .per_operation_errors
                    .iter()
                    .map(|(op, count)| (op.to_string(), *count))
                    .collect(),
            },
            outcomes,
            rejections: snap.rejection_codes.clone().into_iter().collect(),
            per_shard,
        }
    }
}

/// Write a JSON report file under `<base_dir>/.mverse/reports/`.
///
/// Creates the directory if needed. Returns the path of the written file.
pub fn write_report(report: &LoadTestReport, base_dir: &Path) -> Result<PathBuf, std::io::Error> {
    let reports_dir = base_dir.join(".mverse").join("reports");
    if !reports_dir.exists() {
        std::fs::create_dir_all(&reports_dir)?;
    }

    let report_path = reports_dir.join(report_filename(&chrono::Utc::now()));
    let json = serde_json::to_string_pretty(report).map_err(std::io::Error::other)?;
    std::fs::write(&report_path, json)?;

    Ok(report_path)
}

/// `loadtest-YYYY-MM-DDTHH-MM-SS.json`; hyphens instead of colons so the name
/// is valid on every platform.
pub fn report_filename(timestamp: &chrono::DateTime<chrono::Utc>) -> String {
    format!("loadtest-{}.json", timestamp.format("%Y-%m-%dT%H-%M-%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loadtest::metrics::{MetricsSnapshot, OperationType, ShardSnapshot};
    use std::collections::HashMap;
    use std::time::Duration;

    fn test_result() -> LoadTestResult {
        LoadTestResult {
            snapshot: MetricsSnapshot {
                p50: 42,
                p95: 120,
                p99: 350,
                error_p99: 500,
                min: 2,
                max: 700,
                success_count: 950,
                error_count: 50,
                total_requests: 1000,
                error_rate: 0.05,
                operation_counts: HashMap::from([(OperationType::Transaction, 1000)]),
                per_operation_errors: HashMap::from([(OperationType::Transaction, 50)]),
                error_category_counts: HashMap::from([
                    ("connection".to_string(), 30),
                    ("verification".to_string(), 20),
                ]),
                rejection_codes: HashMap::from([("FailedPrecondition".to_string(), 20)]),
                per_shard: vec![ShardSnapshot {
                    name: "localhost:8001".to_string(),
                    p50: 40,
                    p99: 300,
                    total_requests: 100,
                    success_count: 97,
                    error_count: 3,
                    error_categories: HashMap::from([("connection".to_string(), 3)]),
                }],
                ..MetricsSnapshot::default()
            },
            elapsed: Duration::from_secs(60),
            final_active_vus: 0,
            per_vu_iterations: vec![125; 8],
        }
    }

    #[test]
    fn test_report_schema_and_targets() {
        let report = LoadTestReport::from_result(&test_result(), &LoadTestConfig::default());
        assert_eq!(report.schema_version, "1.0");
        assert_eq!(report.targets.len(), 10);
        assert_eq!(report.targets[0], "localhost:8000");
        assert_eq!(report.targets[9], "localhost:8009");
    }

    #[test]
    fn test_report_metrics() {
        let report = LoadTestReport::from_result(&test_result(), &LoadTestConfig::default());
        assert_eq!(report.metrics.total_iterations, 1000);
        assert_eq!(report.metrics.success_count, 950);
        assert!((report.metrics.throughput_ips - 16.666).abs() < 0.1);
        assert_eq!(report.metrics.latency.p99_ms, 350);
        assert_eq!(report.metrics.latency.min_ms, 2);
        assert_eq!(report.metrics.operation_counts.get("transaction"), Some(&1000));
    }

    #[test]
    fn test_report_outcomes_cover_every_kind() {
        let report = LoadTestReport::from_result(&test_result(), &LoadTestConfig::default());
        let kinds: Vec<&str> = report.outcomes.keys().map(String::as_str).collect();
        assert_eq!(
            kinds,
            vec!["connection", "ok", "protocol", "timeout", "verification"]
        );
        assert_eq!(report.outcomes["ok"], 950);
        assert_eq!(report.outcomes["timeout"], 0);
        assert_eq!(report.rejections["FailedPrecondition"], 20);
        assert_eq!(report.per_shard["localhost:8001"].errors["connection"], 3);
    }

    #[test]
    fn test_report_serializes_config() {
        let report = LoadTestReport::from_result(&test_result(), &LoadTestConfig::default());
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["config"]["settings"]["virtual_users"], 8);
        assert_eq!(value["config"]["target"]["base_port"], 8000);
        assert_eq!(value["config"]["scenario"][0]["type"], "transaction");
    }

    #[test]
    fn test_write_report_lands_under_mverse_reports() {
        let dir = tempfile::tempdir().unwrap();
        let report = LoadTestReport::from_result(&test_result(), &LoadTestConfig::default());
        let path = write_report(&report, dir.path()).unwrap();
        assert!(path.starts_with(dir.path().join(".mverse").join("reports")));
        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["metrics"]["total_iterations"], 1000);
    }

    #[test]
    fn test_report_filename_has_no_colons() {
        use chrono::TimeZone;
        let ts = chrono::Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
        assert_eq!(report_filename(&ts), "loadtest-2026-03-14T09-26-53.json");
    }
}
