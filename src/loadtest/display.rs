//! Live progress line on stderr while virtual users are running.
//!
//! Redrawn whenever the aggregator publishes a snapshot (every 2 seconds),
//! never per iteration.

use std::io::IsTerminal;
use std::time::Duration;

use colored::{Color, Colorize};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::loadtest::engine::DisplayState;
use crate::loadtest::metrics::MetricsSnapshot;
use crate::loadtest::vu::ActiveVuCounter;

/// Spinner line on stderr.
pub struct LiveDisplay {
    status_bar: ProgressBar,
    color: bool,
}

impl LiveDisplay {
    /// Starts the spinner. The line is colored only when stderr is a terminal
    /// and `no_color` is off; the stdout summary decides for itself.
    pub fn new(no_color: bool) -> Self {
        let color = !no_color && std::io::stderr().is_terminal();

        let status_bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {wide_msg}") {
            status_bar.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
        }
        status_bar.enable_steady_tick(Duration::from_millis(100));

        Self { status_bar, color }
    }

    /// `vus | it/s | p95 | failed | elapsed`, with the most frequent failure
    /// kind named next to the failure count.
    pub fn format_status(
        snap: &MetricsSnapshot,
        elapsed: Duration,
        active_vus: u32,
        target_vus: u32,
        color: bool,
    ) -> String {
        let paint = |text: String, shade: Color| {
            if color {
                text.color(shade).to_string()
            } else {
                text
            }
        };
        let elapsed_secs = elapsed.as_secs_f64();
        let rate = if elapsed_secs > 0.0 {
            snap.total_requests as f64 / elapsed_secs
        } else {
            0.0
        };

        let vu_str = format!("{active_vus}/{target_vus}");
        let rate_str = format!("{rate:.1}");
        let p95_str = format!("{}ms", snap.p95);
        let failure_rate = format!("{:.1}%", snap.error_rate * 100.0);
        let dominant = snap
            .error_category_counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(kind, count)| format!(", {kind} {count}"))
            .unwrap_or_default();
        let failures = format!("{} ({failure_rate}{dominant})", snap.error_count);

        let p95_display = if snap.p95 > 1000 {
            paint(p95_str, Color::Yellow)
        } else {
            paint(p95_str, Color::Green)
        };
        let failures = if snap.error_count > 0 {
            paint(failures, Color::Red)
        } else {
            failures
        };

        format!(
            "  vus: {}  |  it/s: {}  |  p95: {}  |  failed: {}  |  elapsed: {}s",
            paint(vu_str, Color::Green),
            paint(rate_str, Color::Green),
            p95_display,
            failures,
            elapsed.as_secs()
        )
    }

    pub fn update(&self, snap: &MetricsSnapshot, elapsed: Duration, active: u32, target: u32) {
        self.status_bar
            .set_message(Self::format_status(snap, elapsed, active, target, self.color));
    }

    /// Clears the line so the summary prints on a clean terminal.
    pub fn finish(&self) {
        self.status_bar.finish_and_clear();
    }
}

/// Redraws from `display_rx` until the run is cancelled or the aggregator
/// exits.
pub async fn display_loop(
    mut display_rx: watch::Receiver<DisplayState>,
    active_vus: ActiveVuCounter,
    target_vus: u32,
    cancel: CancellationToken,
    no_color: bool,
    test_start: Instant,
) {
    let display = LiveDisplay::new(no_color);

    eprintln!();
    eprintln!("  Driving {target_vus} virtual users...");
    eprintln!();

    loop {
        tokio::select! {
            result = display_rx.changed() => {
                if result.is_err() {
                    break;
                }
                let state = display_rx.borrow_and_update().clone();
                display.update(&state.snapshot, test_start.elapsed(), active_vus.get(), target_vus);
            }
            _ = cancel.cancelled() => {
                let state = display_rx.borrow().clone();
                display.update(&state.snapshot, test_start.elapsed(), active_vus.get(), target_vus);
                break;
            }
        }
    }

    display.finish();
}
