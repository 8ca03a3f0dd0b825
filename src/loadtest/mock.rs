//! Scriptable in-process stand-in for the target service.
//!
//! [`MockInvoker`] implements [`Invoker`] without touching the network so the
//! scheduler can be exercised deterministically, including under a paused
//! tokio clock.
//!
//! # Features
//!
//! - **Scripted outcome**: every call answers OK, a fixed gRPC status, or a
//!   fixed transport error
//! - **Latency injection**: each call sleeps on the tokio clock first
//! - **Failure injection**: the next `n` calls can be forced to fail
//! - **Request counting**: totals and per-port counts are shared by all clones
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use mverse_loadgen::loadtest::client::Invoker;
//! use mverse_loadgen::loadtest::mock::MockInvoker;
//! use mverse_loadgen::loadtest::payload::Call;
//! use mverse_loadgen::loadtest::shard::Endpoint;
//! use mverse_loadgen::loadtest::wire::Empty;
//!
//! # tokio_test_block_on(async {
//! let mock = MockInvoker::always_ok();
//! let mut vu_handle = mock.clone();
//! let endpoint = Endpoint { host: "localhost".into(), port: 8000 };
//! let result = vu_handle
//!     .invoke(&endpoint, &Call::RootRead(Empty {}), Duration::from_secs(1))
//!     .await;
//! assert!(result.is_ok());
//! assert_eq!(mock.calls(), 1);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(f)
//! # }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::loadtest::client::{InvocationResult, Invoker};
use crate::loadtest::error::InvokeError;
use crate::loadtest::payload::Call;
use crate::loadtest::shard::Endpoint;

/// What every call answers with, once latency and injected failures apply.
#[derive(Debug, Clone, PartialEq)]
pub enum MockBehavior {
    /// Status OK with a 32-byte zero head.
    Ok,
    /// A well-formed response with this non-OK status.
    Reject(tonic::Code),
    /// A transport failure.
    Fail(InvokeError),
}

#[derive(Debug, Default)]
struct MockState {
    calls: AtomicU64,
    transactions: AtomicU64,
    root_reads: AtomicU64,
    /// Calls left that answer `Unavailable`-style connection errors.
    injected_failures: AtomicUsize,
    per_port: Mutex<HashMap<u16, u64>>,
}

/// Behaviour-scripted [`Invoker`]. Clones share counters.
#[derive(Debug, Clone)]
pub struct MockInvoker {
    behavior: MockBehavior,
    latency: Duration,
    state: Arc<MockState>,
}

impl MockInvoker {
    /// A mock answering `behavior` to every call.
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            latency: Duration::ZERO,
            state: Arc::new(MockState::default()),
        }
    }

    /// Every call succeeds.
    pub fn always_ok() -> Self {
        Self::new(MockBehavior::Ok)
    }

    /// Every call is refused at connect time.
    pub fn connection_refused() -> Self {
        Self::new(MockBehavior::Fail(InvokeError::Connection {
            message: "connection refused".to_string(),
        }))
    }

    /// Every call is answered with `code`.
    pub fn rejecting(code: tonic::Code) -> Self {
        Self::new(MockBehavior::Reject(code))
    }

    /// Sleep `latency` on the tokio clock before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Force the next `n` calls to fail with a connection error.
    pub fn inject_failures(&self, n: usize) {
        self.state.injected_failures.store(n, Ordering::SeqCst);
    }

    /// Total calls received.
    pub fn calls(&self) -> u64 {
        self.state.calls.load(Ordering::SeqCst)
    }

    /// `ClientTransaction` calls received.
    pub fn transactions(&self) -> u64 {
        self.state.transactions.load(Ordering::SeqCst)
    }

    /// `GetCurrentRoot` calls received.
    pub fn root_reads(&self) -> u64 {
        self.state.root_reads.load(Ordering::SeqCst)
    }

    /// Calls received per destination port.
    pub fn calls_per_port(&self) -> HashMap<u16, u64> {
        self.state
            .per_port
            .lock()
            .map(|ports| ports.clone())
            .unwrap_or_default()
    }

    fn take_injected_failure(&self) -> bool {
        self.state
            .injected_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Invoker for MockInvoker {
    async fn invoke(
        &mut self,
        endpoint: &Endpoint,
        call: &Call,
        timeout: Duration,
    ) -> Result<InvocationResult, InvokeError> {
        self.state.calls.fetch_add(1, Ordering::SeqCst);
        match call {
            Call::Transaction(_) => self.state.transactions.fetch_add(1, Ordering::SeqCst),
            Call::RootRead(_) => self.state.root_reads.fetch_add(1, Ordering::SeqCst),
        };
        if let Ok(mut ports) = self.state.per_port.lock() {
            *ports.entry(endpoint.port).or_insert(0) += 1;
        }

        if self.latency >= timeout {
            tokio::time::sleep(timeout).await;
            return Err(InvokeError::Timeout);
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.take_injected_failure() {
            return Err(InvokeError::Connection {
                message: format!("{endpoint}: injected failure"),
            });
        }
        match &self.behavior {
            MockBehavior::Ok => Ok(InvocationResult::ok(vec![0; 32])),
            MockBehavior::Reject(code) => Ok(InvocationResult::rejected(*code, "mock rejection")),
            MockBehavior::Fail(err) => Err(err.clone()),
        }
    }
}
