//! Property-based tests for metrics and verification invariants.

use proptest::prelude::*;
use std::time::Duration;

use mverse_loadgen::loadtest::client::InvocationResult;
use mverse_loadgen::loadtest::error::InvokeError;
use mverse_loadgen::loadtest::metrics::{MetricsRecorder, OperationType, RequestSample};
use mverse_loadgen::loadtest::verify::{verify, FailureKind, Outcome};

fn arb_failure_kind() -> impl Strategy<Value = FailureKind> {
    prop_oneof![
        Just(FailureKind::Connection),
        Just(FailureKind::Timeout),
        Just(FailureKind::Protocol),
        Just(FailureKind::Verification(tonic::Code::Unavailable)),
        Just(FailureKind::Verification(tonic::Code::Internal)),
    ]
}

proptest! {
    /// Logical counts match the samples recorded, whatever the latency fill.
    #[test]
    fn metrics_counts_match_samples(
        success_count in 0u32..100,
        failures in prop::collection::vec(arb_failure_kind(), 0..50),
        latency_ms in 1u64..2000,
        expected_interval_ms in 1u64..1000,
    ) {
        let mut recorder = MetricsRecorder::new(expected_interval_ms);
        for _ in 0..success_count {
            recorder.record(&RequestSample::success(
                OperationType::Transaction,
                Duration::from_millis(latency_ms),
                None,
            ));
        }
        for kind in &failures {
            recorder.record(&RequestSample::failure(
                OperationType::RootRead,
                Duration::from_millis(latency_ms),
                *kind,
                None,
            ));
        }
        let snap = recorder.snapshot();
        prop_assert_eq!(snap.success_count, success_count as u64);
        prop_assert_eq!(snap.error_count, failures.len() as u64);
        prop_assert_eq!(snap.total_requests, success_count as u64 + failures.len() as u64);
        prop_assert_eq!(
            snap.error_category_counts.values().sum::<u64>(),
            failures.len() as u64
        );
        prop_assert!(snap.error_rate >= 0.0 && snap.error_rate <= 1.0);
    }

    /// P50 <= P95 <= P99 always.
    #[test]
    fn percentiles_monotonic(
        latencies in prop::collection::vec(1u64..2000, 1..200),
    ) {
        let mut recorder = MetricsRecorder::new(10_000);
        for ms in &latencies {
            recorder.record(&RequestSample::success(
                OperationType::Transaction,
                Duration::from_millis(*ms),
                None,
            ));
        }
        let snap = recorder.snapshot();
        prop_assert!(snap.p50 <= snap.p95);
        prop_assert!(snap.p95 <= snap.p99);
        prop_assert!(snap.min <= snap.p50);
        prop_assert!(snap.p99 <= snap.max);
    }

    /// Only an OK status passes; every other status is a verification failure.
    #[test]
    fn verification_passes_only_ok(code in 0i32..17) {
        let code = tonic::Code::from_i32(code);
        let outcome = if code == tonic::Code::Ok {
            verify(&Ok(InvocationResult::ok(vec![0; 32])))
        } else {
            verify(&Ok(InvocationResult::rejected(code, "rejected")))
        };
        if code == tonic::Code::Ok {
            prop_assert_eq!(outcome, Outcome::Pass);
        } else {
            prop_assert_eq!(outcome, Outcome::Fail(FailureKind::Verification(code)));
        }
    }

    /// Transport errors map to their own category, never verification.
    #[test]
    fn invoke_errors_keep_their_category(message in "[a-z ]{0,40}") {
        let cases = [
            InvokeError::Connection { message: message.clone() },
            InvokeError::Timeout,
            InvokeError::Protocol { message },
        ];
        for err in cases {
            let category = err.error_category();
            match verify(&Err(err)) {
                Outcome::Fail(kind) => prop_assert_eq!(kind.category(), category),
                Outcome::Pass => prop_assert!(false, "transport error passed"),
            }
        }
    }
}
