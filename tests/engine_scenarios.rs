//! End-to-end runs of the load test engine.
//!
//! All but one test run on tokio's paused clock against [`MockInvoker`], so
//! iteration counts are exact. The last test drives the real gRPC invoker at
//! a closed local port.

use std::time::Duration;

use mverse_loadgen::loadtest::config::{ConnectionPolicy, LoadTestConfig, ScenarioStep};
use mverse_loadgen::loadtest::engine::LoadTestEngine;
use mverse_loadgen::loadtest::error::{InvokeError, LoadTestError};
use mverse_loadgen::loadtest::metrics::OperationType;
use mverse_loadgen::loadtest::mock::{MockBehavior, MockInvoker};
use mverse_loadgen::loadtest::report::LoadTestReport;
use mverse_loadgen::loadtest::summary::render_summary;

fn config(vus: u32, duration_secs: u64, pacing_ms: u64) -> LoadTestConfig {
    let mut config = LoadTestConfig::default();
    config.settings.virtual_users = vus;
    config.settings.duration_secs = duration_secs;
    config.settings.pacing_ms = pacing_ms;
    config
}

fn engine(config: LoadTestConfig, mock: &MockInvoker) -> LoadTestEngine {
    LoadTestEngine::new(config)
        .with_invoker(mock.clone())
        .with_live_display(false)
}

#[tokio::test(start_paused = true)]
async fn single_vu_completes_four_paced_iterations() {
    let mock = MockInvoker::always_ok();
    let result = engine(config(1, 2, 500), &mock).run().await.unwrap();

    assert_eq!(mock.calls(), 4);
    assert_eq!(result.snapshot.total_requests, 4);
    assert_eq!(result.snapshot.success_count, 4);
    assert_eq!(result.snapshot.error_count, 0);
    assert_eq!(result.per_vu_iterations, vec![4]);
    assert_eq!(result.final_active_vus, 0);
    assert!(!result.has_failures());
}

#[tokio::test(start_paused = true)]
async fn unreachable_pool_fails_every_iteration_as_connection() {
    let mock = MockInvoker::connection_refused();
    let result = engine(config(5, 5, 500), &mock).run().await.unwrap();
    let snap = &result.snapshot;

    assert_eq!(snap.success_count, 0);
    assert_eq!(snap.total_requests, 50);
    assert_eq!(snap.error_count, 50);
    assert_eq!(snap.error_category_counts.get("connection"), Some(&50));
    assert!(snap.error_category_counts.get("timeout").is_none());
    assert!(result.elapsed >= Duration::from_secs(5));
    assert!(result.elapsed < Duration::from_secs(6));
    assert!(result.has_failures());
}

#[tokio::test(start_paused = true)]
async fn zero_virtual_users_is_rejected_before_any_call() {
    let mock = MockInvoker::always_ok();
    let err = engine(config(0, 5, 500), &mock).run().await.unwrap_err();

    assert!(matches!(err, LoadTestError::ConfigValidation { .. }));
    assert_eq!(mock.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn rejected_status_counts_as_verification_failure() {
    let mock = MockInvoker::rejecting(tonic::Code::FailedPrecondition);
    let result = engine(config(1, 1, 500), &mock).run().await.unwrap();
    let snap = &result.snapshot;

    assert_eq!(snap.total_requests, 2);
    assert_eq!(snap.error_category_counts.get("verification"), Some(&2));
    assert_eq!(snap.rejection_codes.get("FailedPrecondition"), Some(&2));
}

#[tokio::test(start_paused = true)]
async fn undecodable_responses_are_reported_apart_from_connection_failures() {
    let mock = MockInvoker::new(MockBehavior::Fail(InvokeError::Protocol {
        message: "failed to decode Protobuf message: invalid wire type".to_string(),
    }));
    mock.inject_failures(2);
    let cfg = config(1, 3, 500);
    let result = engine(cfg.clone(), &mock).run().await.unwrap();
    let snap = &result.snapshot;

    assert_eq!(snap.total_requests, 6);
    assert_eq!(snap.success_count, 0);
    assert_eq!(snap.error_category_counts.get("connection"), Some(&2));
    assert_eq!(snap.error_category_counts.get("protocol"), Some(&4));
    assert!(snap.rejection_codes.is_empty());

    let report = LoadTestReport::from_result(&result, &cfg);
    assert_eq!(report.outcomes["ok"], 0);
    assert_eq!(report.outcomes["connection"], 2);
    assert_eq!(report.outcomes["protocol"], 4);
    assert_eq!(report.outcomes["verification"], 0);
    assert_eq!(report.outcomes["timeout"], 0);

    colored::control::set_override(false);
    let summary = render_summary(&result, &cfg);
    assert!(summary.contains("    protocol"), "got:\n{summary}");
    assert!(!summary.contains("rejections by status:"), "got:\n{summary}");
}

#[tokio::test(start_paused = true)]
async fn injected_failures_only_hit_the_first_calls() {
    let mock = MockInvoker::always_ok();
    mock.inject_failures(2);
    let result = engine(config(1, 2, 500), &mock).run().await.unwrap();
    let snap = &result.snapshot;

    assert_eq!(snap.total_requests, 4);
    assert_eq!(snap.error_count, 2);
    assert_eq!(snap.success_count, 2);
}

#[tokio::test(start_paused = true)]
async fn slow_service_fails_with_timeout() {
    let mut cfg = config(1, 2, 500);
    cfg.settings.timeout_ms = 100;
    let mock = MockInvoker::always_ok().with_latency(Duration::from_millis(250));
    let result = engine(cfg, &mock).run().await.unwrap();
    let snap = &result.snapshot;

    assert!(snap.total_requests > 0);
    assert_eq!(snap.success_count, 0);
    assert_eq!(
        snap.error_category_counts.get("timeout"),
        Some(&snap.total_requests)
    );
}

#[tokio::test(start_paused = true)]
async fn iteration_cap_stops_the_run_early() {
    let mock = MockInvoker::always_ok();
    let result = engine(config(2, 60, 500), &mock)
        .with_iterations(7)
        .run()
        .await
        .unwrap();

    assert_eq!(result.snapshot.total_requests, 7);
    assert_eq!(mock.calls(), 7);
    assert_eq!(result.per_vu_iterations.iter().sum::<u64>(), 7);
    assert!(result.elapsed < Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn mixed_scenario_issues_both_operations() {
    let mut cfg = config(4, 10, 100);
    cfg.scenario = vec![
        ScenarioStep::Transaction { weight: 3 },
        ScenarioStep::RootRead { weight: 1 },
    ];
    let mock = MockInvoker::always_ok();
    let result = engine(cfg, &mock).with_seed(11).run().await.unwrap();
    let snap = &result.snapshot;

    assert_eq!(mock.transactions() + mock.root_reads(), mock.calls());
    assert!(mock.transactions() > mock.root_reads());
    assert!(mock.root_reads() > 0);
    assert_eq!(
        snap.operation_counts.get(&OperationType::Transaction),
        Some(&mock.transactions())
    );
    assert_eq!(
        snap.operation_counts.get(&OperationType::RootRead),
        Some(&mock.root_reads())
    );
}

#[tokio::test(start_paused = true)]
async fn every_shard_port_stays_within_the_pool() {
    let mut cfg = config(3, 20, 100);
    cfg.target.base_port = 9100;
    cfg.target.pool_size = 4;
    let mock = MockInvoker::always_ok();
    engine(cfg, &mock).run().await.unwrap();

    let per_port = mock.calls_per_port();
    assert!(!per_port.is_empty());
    assert!(per_port.keys().all(|port| (9100..9104).contains(port)));
    assert_eq!(per_port.values().sum::<u64>(), mock.calls());
}

#[tokio::test]
async fn grpc_invoker_reports_refused_port_as_connection_failure() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let mut cfg = config(1, 1, 200);
    cfg.target.host = "127.0.0.1".to_string();
    cfg.target.base_port = port;
    cfg.target.pool_size = 1;
    cfg.target.connection = ConnectionPolicy::PerVu;
    cfg.settings.timeout_ms = 2000;

    let result = LoadTestEngine::new(cfg)
        .with_live_display(false)
        .run()
        .await
        .unwrap();
    let snap = &result.snapshot;

    assert!(snap.total_requests >= 1);
    assert_eq!(snap.success_count, 0);
    assert_eq!(
        snap.error_category_counts.get("connection"),
        Some(&snap.total_requests)
    );
}
