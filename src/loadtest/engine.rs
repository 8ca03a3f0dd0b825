//! Run controller: builds per-VU state, drives the shard pool for the
//! configured duration and drains.
//!
//! Every VU's entropy source, selector and invoker exist before the first
//! task is spawned, so a config or entropy error issues zero calls. VU tasks
//! live on a [`tokio_util::task::TaskTracker`] and feed one aggregator over a
//! bounded mpsc channel; the aggregator publishes snapshots on a watch
//! channel. The deadline, the iteration cap and Ctrl+C all stop new
//! iterations through one [`CancellationToken`]; calls already in flight
//! finish and are counted.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use rand::distr::weighted::WeightedIndex;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::loadtest::client::{GrpcInvoker, Invoker};
use crate::loadtest::config::LoadTestConfig;
use crate::loadtest::display::display_loop;
use crate::loadtest::entropy::EntropySource;
use crate::loadtest::error::LoadTestError;
use crate::loadtest::metrics::{MetricsRecorder, MetricsSnapshot, RequestSample};
use crate::loadtest::payload::PayloadBuilder;
use crate::loadtest::shard::{ShardPool, ShardSelector};
use crate::loadtest::vu::{vu_loop, ActiveVuCounter, VuPlan, VuState};

// Everything crossing a task boundary must be Send.
const _: () = {
    const fn send<T: Send>() {}
    send::<VuState>();
    send::<RequestSample>();
    send::<DisplayState>();
};

/// Builds one fresh invoker per virtual user.
pub type InvokerFactory = Arc<dyn Fn() -> Box<dyn Invoker> + Send + Sync>;

/// Display state published through the watch channel to the live display.
#[derive(Debug, Clone)]
pub struct DisplayState {
    /// Current metrics snapshot.
    pub snapshot: MetricsSnapshot,
}

/// A configured run against one shard pool.
///
/// ```rust,no_run
/// # use mverse_loadgen::loadtest::config::LoadTestConfig;
/// # use mverse_loadgen::loadtest::engine::LoadTestEngine;
/// # async fn go() -> Result<(), mverse_loadgen::loadtest::error::LoadTestError> {
/// let result = LoadTestEngine::new(LoadTestConfig::default())
///     .with_seed(42)
///     .with_iterations(1_000)
///     .run()
///     .await?;
/// println!("{} passed", result.snapshot.success_count);
/// # Ok(())
/// # }
/// ```
pub struct LoadTestEngine {
    config: LoadTestConfig,
    invoker_factory: Option<InvokerFactory>,
    max_iterations: Option<u64>,
    seed: Option<u64>,
    no_color: bool,
    log_payloads: bool,
    live_display: bool,
}

impl LoadTestEngine {
    /// Creates a new engine. Calls go over gRPC unless
    /// [`with_invoker`](Self::with_invoker) substitutes another transport.
    pub fn new(config: LoadTestConfig) -> Self {
        Self {
            config,
            invoker_factory: None,
            max_iterations: None,
            seed: None,
            no_color: false,
            log_payloads: false,
            live_display: true,
        }
    }

    /// Use clones of `invoker` instead of gRPC. Each VU gets its own clone.
    pub fn with_invoker<I>(mut self, invoker: I) -> Self
    where
        I: Invoker + Clone + Sync + 'static,
    {
        self.invoker_factory =
            Some(Arc::new(move || Box::new(invoker.clone()) as Box<dyn Invoker>));
        self
    }

    /// Sets an iteration limit across all VUs (first-limit-wins with duration).
    pub fn with_iterations(mut self, n: u64) -> Self {
        self.max_iterations = Some(n);
        self
    }

    /// Seeds every VU's generator with `seed + vu_id`.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Disables colored output.
    pub fn with_no_color(mut self, no_color: bool) -> Self {
        self.no_color = no_color;
        self
    }

    /// Logs every synthesized request as JSON at info level.
    pub fn with_log_payloads(mut self, log_payloads: bool) -> Self {
        self.log_payloads = log_payloads;
        self
    }

    /// Enables or disables the live progress line.
    pub fn with_live_display(mut self, live_display: bool) -> Self {
        self.live_display = live_display;
        self
    }

    /// The resolved config this engine runs.
    pub fn config(&self) -> &LoadTestConfig {
        &self.config
    }

    pub fn max_iterations(&self) -> Option<u64> {
        self.max_iterations
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn no_color(&self) -> bool {
        self.no_color
    }

    /// Run the load test to completion.
    ///
    /// Every [`LoadTestError`] is raised before the first VU is spawned.
    pub async fn run(&self) -> Result<LoadTestResult, LoadTestError> {
        self.config.validate()?;

        let settings = &self.config.settings;
        let target = &self.config.target;
        let vu_count = settings.virtual_users;

        let pool = ShardPool::from_target(target)?;
        let weights: Vec<u32> = self.config.scenario.iter().map(|s| s.weight()).collect();
        let step_weights = WeightedIndex::new(&weights)
            .map_err(|e| LoadTestError::validation(format!("invalid scenario weights: {e}")))?;
        let payloads = PayloadBuilder::new(&self.config.payload)?;

        let factory: InvokerFactory = match self.invoker_factory.clone() {
            Some(factory) => factory,
            None => {
                let (plaintext, policy) = (target.plaintext, target.connection);
                Arc::new(move || Box::new(GrpcInvoker::new(plaintext, policy)) as Box<dyn Invoker>)
            }
        };
        let states = (0..vu_count)
            .map(|vu_id| {
                Ok::<_, LoadTestError>(VuState {
                    vu_id,
                    entropy: EntropySource::for_virtual_user(self.seed, vu_id)?,
                    selector: ShardSelector::new(pool.clone(), target.selection, vu_id as usize),
                    invoker: factory(),
                })
            })
            .collect::<Result<Vec<_>, LoadTestError>>()?;

        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        let active_vus = ActiveVuCounter::new();

        let buffer_size = (vu_count as usize) * 100;
        let (sample_tx, sample_rx) = mpsc::channel::<RequestSample>(buffer_size);

        let expected_interval_ms = settings.effective_expected_interval_ms();
        let (display_tx, display_rx) = watch::channel(DisplayState {
            snapshot: MetricsRecorder::new(expected_interval_ms).snapshot(),
        });

        let test_start = Instant::now();
        let deadline = test_start + settings.duration();
        let plan = Arc::new(VuPlan {
            scenario: self.config.scenario.clone(),
            step_weights,
            payloads,
            timeout: settings.timeout_as_duration(),
            pacing: settings.pacing(),
            deadline,
            iteration_cap: self
                .max_iterations
                .map(|max| (Arc::new(AtomicU64::new(0)), max)),
            log_payloads: self.log_payloads,
        });

        tracing::info!(
            vus = vu_count,
            duration_secs = settings.duration_secs,
            pacing_ms = settings.pacing_ms,
            shards = pool.len(),
            base_port = pool.base_port(),
            "starting load test"
        );

        let handles: Vec<_> = states
            .into_iter()
            .map(|state| {
                tracker.spawn(vu_loop(
                    state,
                    plan.clone(),
                    sample_tx.clone(),
                    cancel.clone(),
                    active_vus.clone(),
                ))
            })
            .collect();

        // VUs hold their own clones; the aggregator ends when the last one drops.
        drop(sample_tx);

        let aggregator_handle = tokio::spawn(metrics_aggregator(
            sample_rx,
            display_tx,
            expected_interval_ms,
        ));

        let display_handle = self.live_display.then(|| {
            tokio::spawn(display_loop(
                display_rx.clone(),
                active_vus.clone(),
                vu_count,
                cancel.clone(),
                self.no_color,
                test_start,
            ))
        });

        // Run controller: first-limit-wins between deadline, iteration cap, Ctrl+C.
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {
                cancel.cancel();
            }
            _ = cancel.cancelled() => {}
            _ = handle_ctrl_c(cancel.clone()) => {}
        }

        // Drain: in-flight calls finish, no new iterations start.
        tracker.close();
        tracker.wait().await;

        let mut per_vu_iterations = Vec::with_capacity(handles.len());
        for handle in handles {
            per_vu_iterations.push(handle.await.unwrap_or(0));
        }

        let _ = aggregator_handle.await;
        if let Some(handle) = display_handle {
            let _ = handle.await;
        }

        let snapshot = display_rx.borrow().snapshot.clone();
        let elapsed = test_start.elapsed();
        tracing::info!(
            iterations = snapshot.total_requests,
            ok = snapshot.success_count,
            failed = snapshot.error_count,
            elapsed_ms = elapsed.as_millis() as u64,
            "load test finished"
        );

        Ok(LoadTestResult {
            snapshot,
            elapsed,
            final_active_vus: active_vus.get(),
            per_vu_iterations,
        })
    }
}

/// What a finished run hands back to the CLI.
#[derive(Debug)]
pub struct LoadTestResult {
    /// Final metrics snapshot.
    pub snapshot: MetricsSnapshot,
    /// Total elapsed time of the test, drain included.
    pub elapsed: Duration,
    /// Number of VUs that were still active at test end (0 after a clean drain).
    pub final_active_vus: u32,
    /// Completed iterations per VU, indexed by VU id.
    pub per_vu_iterations: Vec<u64>,
}

impl LoadTestResult {
    /// `true` when at least one iteration failed.
    pub fn has_failures(&self) -> bool {
        self.snapshot.error_count > 0
    }
}

/// Metrics aggregator task.
///
/// Consumes [`RequestSample`] values and publishes a [`DisplayState`] every
/// 2 seconds. Runs until every sender is dropped, so samples from calls
/// that were in flight at the deadline are still counted. `biased;` keeps
/// the tick branch from starving behind a busy channel.
async fn metrics_aggregator(
    mut sample_rx: mpsc::Receiver<RequestSample>,
    display_tx: watch::Sender<DisplayState>,
    expected_interval_ms: u64,
) {
    let mut recorder = MetricsRecorder::new(expected_interval_ms);
    let mut tick = tokio::time::interval(Duration::from_secs(2));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = tick.tick() => {
                while let Ok(sample) = sample_rx.try_recv() {
                    recorder.record(&sample);
                }
                let _ = display_tx.send(DisplayState {
                    snapshot: recorder.snapshot(),
                });
            }
            result = sample_rx.recv() => {
                match result {
                    Some(sample) => recorder.record(&sample),
                    None => {
                        let _ = display_tx.send(DisplayState {
                            snapshot: recorder.snapshot(),
                        });
                        break;
                    }
                }
            }
        }
    }
}

/// First Ctrl+C cancels the run and lets in-flight calls drain; a second one
/// exits the process with status 1.
async fn handle_ctrl_c(cancel: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    eprintln!("\nCtrl+C: no new iterations, waiting for in-flight calls (press again to abort)");
    cancel.cancel();

    if tokio::signal::ctrl_c().await.is_ok() {
        eprintln!("\nCtrl+C again: aborting.");
        std::process::exit(1);
    }
}
