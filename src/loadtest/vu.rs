//! Virtual user (VU) task loop.
//!
//! Each VU owns its own [`Invoker`], [`EntropySource`] and [`ShardSelector`]
//! and repeats select shard, build payload, invoke, verify, pace until the
//! run deadline, the iteration cap or cancellation. Outcomes leave the VU
//! only as [`RequestSample`] values on a bounded mpsc channel.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::loadtest::client::Invoker;
use crate::loadtest::config::ScenarioStep;
use crate::loadtest::entropy::EntropySource;
use crate::loadtest::metrics::RequestSample;
use crate::loadtest::payload::PayloadBuilder;
use crate::loadtest::shard::ShardSelector;
use crate::loadtest::verify::{self, Outcome};

/// Atomic counter tracking the number of currently active virtual users.
#[derive(Clone)]
pub struct ActiveVuCounter(Arc<AtomicU32>);

impl ActiveVuCounter {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        Self(Arc::new(AtomicU32::new(0)))
    }

    /// Increments the active VU count by one.
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrements the active VU count by one.
    pub fn decrement(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }

    /// Returns the current number of active VUs.
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for ActiveVuCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only run plan shared by every VU.
pub struct VuPlan {
    /// Scenario steps, indexed by `step_weights`.
    pub scenario: Vec<ScenarioStep>,
    /// Weighted choice over `scenario`.
    pub step_weights: WeightedIndex<u32>,
    /// Request synthesis settings.
    pub payloads: PayloadBuilder,
    /// Per-call timeout.
    pub timeout: Duration,
    /// Delay between iterations of one VU.
    pub pacing: Duration,
    /// No iteration starts at or after this instant.
    pub deadline: Instant,
    /// Shared iteration budget across all VUs.
    pub iteration_cap: Option<(Arc<AtomicU64>, u64)>,
    /// Log every synthesized request as JSON.
    pub log_payloads: bool,
}

/// Everything one VU owns exclusively.
pub struct VuState {
    /// 0-based VU index.
    pub vu_id: u32,
    /// This VU's random stream.
    pub entropy: EntropySource,
    /// This VU's view of the shard pool.
    pub selector: ShardSelector,
    /// This VU's connection handle(s).
    pub invoker: Box<dyn Invoker>,
}

/// Why a VU stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VuExit {
    /// The run deadline passed.
    Deadline,
    /// The shared iteration cap was reached.
    IterationCap,
    /// The run was cancelled.
    Cancelled,
    /// The metrics aggregator went away.
    ChannelClosed,
}

/// Main virtual user task.
///
/// The `active_vus` counter is incremented on entry and decremented on every
/// exit path. Returns the number of iterations this VU completed.
pub async fn vu_loop(
    state: VuState,
    plan: Arc<VuPlan>,
    sample_tx: mpsc::Sender<RequestSample>,
    cancel: CancellationToken,
    active_vus: ActiveVuCounter,
) -> u64 {
    active_vus.increment();
    let vu_id = state.vu_id;
    let (iterations, exit) = vu_loop_inner(state, &plan, &sample_tx, &cancel).await;
    tracing::debug!(vu = vu_id, iterations, ?exit, "virtual user finished");
    active_vus.decrement();
    iterations
}

async fn vu_loop_inner(
    mut state: VuState,
    plan: &VuPlan,
    sample_tx: &mpsc::Sender<RequestSample>,
    cancel: &CancellationToken,
) -> (u64, VuExit) {
    let mut iterations = 0u64;
    let mut warned = false;

    loop {
        if cancel.is_cancelled() {
            return (iterations, VuExit::Cancelled);
        }
        if Instant::now() >= plan.deadline {
            return (iterations, VuExit::Deadline);
        }

        // First-limit-wins with the deadline; overshoot is impossible since
        // the slot is claimed before the call.
        if let Some((ref counter, max)) = plan.iteration_cap {
            let prev = counter.fetch_add(1, Ordering::Relaxed);
            if prev >= max {
                cancel.cancel();
                return (iterations, VuExit::IterationCap);
            }
        }

        let step = &plan.scenario[plan.step_weights.sample(state.entropy.rng_mut())];
        let endpoint = state.selector.select_endpoint(&mut state.entropy);
        let call = plan.payloads.build(step, &mut state.entropy);
        if plan.log_payloads {
            tracing::info!(
                vu = state.vu_id,
                shard = %endpoint,
                shard_index = state.selector.pool().index_of(&endpoint),
                operation = %call.operation(),
                payload = %call.to_json(),
                "request"
            );
        }

        let start = Instant::now();
        let result = state.invoker.invoke(&endpoint, &call, plan.timeout).await;
        let duration = start.elapsed();
        let outcome = verify::verify(&result);
        iterations += 1;

        match (&outcome, &result) {
            (Outcome::Pass, _) => {
                tracing::debug!(vu = state.vu_id, shard = %endpoint, ?duration, "ok");
            }
            (Outcome::Fail(kind), result) => {
                let detail = match result {
                    Err(err) => err.to_string(),
                    Ok(response) => String::from_utf8_lossy(&response.message).into_owned(),
                };
                if warned {
                    tracing::debug!(vu = state.vu_id, shard = %endpoint, %kind, %detail, "failed");
                } else {
                    tracing::warn!(vu = state.vu_id, shard = %endpoint, %kind, %detail, "first failed iteration");
                    warned = true;
                }
            }
        }

        let sample = RequestSample {
            operation: call.operation(),
            duration,
            outcome,
            shard: Some(endpoint.to_string()),
        };
        if sample_tx.send(sample).await.is_err() {
            return (iterations, VuExit::ChannelClosed);
        }

        if plan.pacing.is_zero() {
            tokio::task::yield_now().await;
        } else {
            let wake = (Instant::now() + plan.pacing).min(plan.deadline);
            tokio::select! {
                _ = tokio::time::sleep_until(wake) => {}
                _ = cancel.cancelled() => return (iterations, VuExit::Cancelled),
            }
        }
    }
}
