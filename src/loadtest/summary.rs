//! k6-style terminal summary renderer for load test results.
//!
//! [`render_summary`] is a pure function: structured data in, formatted
//! [`String`] out. Colors come from `colored`, which honours the global
//! override set when `--no-color` is active or output is piped.

use colored::Colorize;

use crate::loadtest::config::LoadTestConfig;
use crate::loadtest::engine::LoadTestResult;

/// Width for dotted metric row padding.
const PAD_WIDTH: usize = 40;

/// Failure categories in display order.
const FAILURE_KINDS: [&str; 4] = ["connection", "timeout", "protocol", "verification"];

/// Render a k6-style terminal summary.
///
/// ```text
///   mverse-loadgen
///
///   target:    localhost:8000-8009 (10 shards, plaintext)
///   vus:       8
///   duration:  60s (pacing 500ms)
///   scenarios: 1 steps
///
///   iteration_duration..........: p50=4ms  p95=9ms  p99=15ms
///   iterations..................: 960
///   checks_passed...............: 950
///   checks_failed...............: 10
///   ...
///
///   outcomes:
///     ok........................: 950
///     connection................: 10
///     timeout...................: 0
/// ```
pub fn render_summary(result: &LoadTestResult, config: &LoadTestConfig) -> String {
    let snap = &result.snapshot;
    let mut lines = vec![render_header(config)];

    let latency_value = format!("p50={}ms  p95={}ms  p99={}ms", snap.p50, snap.p95, snap.p99);
    let latency_colored = if snap.p99 < 1000 {
        latency_value.green().to_string()
    } else {
        latency_value.yellow().to_string()
    };
    lines.push(format_metric_row("iteration_duration", &latency_colored));
    lines.push(format_metric_row(
        "iteration_duration_range",
        &format!("min={}ms  max={}ms", snap.min, snap.max),
    ));
    lines.push(format_metric_row("iterations", &snap.total_requests.to_string()));
    lines.push(format_metric_row(
        "checks_passed",
        &snap.success_count.to_string().green().to_string(),
    ));

    let failed = if snap.error_count > 0 {
        snap.error_count.to_string().red().to_string()
    } else {
        snap.error_count.to_string()
    };
    lines.push(format_metric_row("checks_failed", &failed));

    let error_rate_pct = snap.error_rate * 100.0;
    let error_rate_str = format!("{error_rate_pct:.1}%");
    let error_rate_colored = if error_rate_pct > 5.0 {
        error_rate_str.red().to_string()
    } else if error_rate_pct > 1.0 {
        error_rate_str.yellow().to_string()
    } else {
        error_rate_str.green().to_string()
    };
    lines.push(format_metric_row("failure_rate", &error_rate_colored));

    let elapsed_secs = result.elapsed.as_secs_f64();
    let throughput = if elapsed_secs > 0.0 {
        snap.total_requests as f64 / elapsed_secs
    } else {
        0.0
    };
    lines.push(format_metric_row(
        "throughput",
        &format!("{throughput:.1} it/s").green().to_string(),
    ));
    lines.push(format_metric_row("elapsed", &format!("{elapsed_secs:.1}s")));

    // Every kind is listed, zeros included, so transient network trouble and
    // service-side rejections can be told apart at a glance.
    lines.push(String::new());
    lines.push("  outcomes:".to_string());
    lines.push(format_metric_row(
        "    ok",
        &snap.success_count.to_string().green().to_string(),
    ));
    for kind in FAILURE_KINDS {
        let count = snap.error_category_counts.get(kind).copied().unwrap_or(0);
        let value = if count > 0 {
            count.to_string().red().to_string()
        } else {
            count.to_string()
        };
        lines.push(format_metric_row(&format!("    {kind}"), &value));
    }

    if !snap.rejection_codes.is_empty() {
        lines.push(String::new());
        lines.push("  rejections by status:".to_string());
        let mut codes: Vec<_> = snap.rejection_codes.iter().collect();
        codes.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        for (code, count) in codes {
            lines.push(format_metric_row(
                &format!("    {code}"),
                &count.to_string().red().to_string(),
            ));
        }
    }

    if snap.operation_counts.len() > 1 {
        lines.push(String::new());
        lines.push("  operations:".to_string());
        let mut ops: Vec<_> = snap.operation_counts.iter().collect();
        ops.sort_by_key(|(op, _)| op.to_string());
        for (op, count) in ops {
            let errors = snap.per_operation_errors.get(op).copied().unwrap_or(0);
            lines.push(format_metric_row(
                &format!("    {op}"),
                &format!("{count} ({errors} failed)"),
            ));
        }
    }

    if !snap.per_shard.is_empty() {
        lines.push(String::new());
        lines.push("  per-shard:".to_string());
        lines.push(String::new());
        lines.push(format!(
            "  {:<24} {:>8} {:>8} {:>7} {:>7} {:>7}",
            "shard", "iters", "failed", "err%", "p50", "p99"
        ));
        lines.push(format!("  {}", "\u{2500}".repeat(66)));
        for shard in &snap.per_shard {
            let err_pct = if shard.total_requests > 0 {
                shard.error_count as f64 / shard.total_requests as f64 * 100.0
            } else {
                0.0
            };
            let err_str = format!("{err_pct:.1}%");
            let err_colored = if err_pct > 5.0 {
                err_str.red().to_string()
            } else {
                err_str.green().to_string()
            };
            lines.push(format!(
                "  {:<24} {:>8} {:>8} {:>7} {:>7} {:>7}",
                shard.name,
                shard.total_requests,
                shard.error_count,
                err_colored,
                format!("{}ms", shard.p50),
                format!("{}ms", shard.p99),
            ));
        }
    }

    lines.join("\n")
}

fn render_header(config: &LoadTestConfig) -> String {
    let target = &config.target;
    let last_port = u32::from(target.base_port) + u32::from(target.pool_size.max(1)) - 1;
    let transport = if target.plaintext { "plaintext" } else { "tls" };
    format!(
        r#"
  {}

  target:    {}:{}-{} ({} shards, {})
  vus:       {}
  duration:  {}s (pacing {}ms)
  scenarios: {} steps
"#,
        "mverse-loadgen".bold(),
        target.host,
        target.base_port,
        last_port,
        target.pool_size,
        transport,
        config.settings.virtual_users,
        config.settings.duration_secs,
        config.settings.pacing_ms,
        config.scenario.len(),
    )
}

/// `"  metric_name..................: value"`
fn format_metric_row(name: &str, value: &str) -> String {
    format!("  {name:.<PAD_WIDTH$}: {value}")
}
