//! Progress tracker: a periodic sampler reporting overall run progress.

use crate::stats::RunCounters;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One point-in-time progress report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    /// Items that have begun their first attempt.
    pub items_started: u64,
    /// Items that reached a terminal outcome.
    pub items_completed: u64,
    /// Total items in the source, if known ahead of time (finite sources).
    pub total_items: Option<u64>,
    /// Terminal failures observed so far.
    pub error_count: u64,
    /// Time elapsed since the pipeline started.
    pub elapsed: Duration,
    /// `items_completed / elapsed.as_secs_f64()`.
    pub items_per_second: f64,
    /// Projected remaining time, when `total_items` is known and the rate
    /// is nonzero.
    pub estimated_time_remaining: Option<Duration>,
    /// `items_completed / total_items`, when `total_items` is known.
    pub percent_complete: Option<f64>,
}

impl ProgressSnapshot {
    fn from_counters(counters: &RunCounters) -> Self {
        let elapsed = counters.started_at.elapsed();
        let items_completed = counters.items_completed();
        let items_per_second = if elapsed.as_secs_f64() > 0.0 {
            items_completed as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        let (estimated_time_remaining, percent_complete) = match counters.total_items {
            Some(total) if total > 0 => {
                let percent = items_completed as f64 / total as f64;
                let remaining = if items_per_second > 0.0 {
                    let remaining_items = total.saturating_sub(items_completed) as f64;
                    Some(Duration::from_secs_f64(remaining_items / items_per_second))
                } else {
                    None
                };
                (remaining, Some(percent))
            }
            Some(_) => (None, Some(1.0)),
            None => (None, None),
        };

        Self {
            items_started: counters.items_started(),
            items_completed,
            total_items: counters.total_items,
            error_count: counters.error_count(),
            elapsed,
            items_per_second,
            estimated_time_remaining,
            percent_complete,
        }
    }
}

/// Callback invoked with each [`ProgressSnapshot`]. Panics are swallowed.
pub type ProgressCallback = Arc<dyn Fn(ProgressSnapshot) + Send + Sync>;

/// Configuration for the progress tracker.
#[derive(Clone)]
pub struct ProgressTrackerOptions {
    pub(crate) report_interval: Duration,
    pub(crate) on_sample: ProgressCallback,
}

impl ProgressTrackerOptions {
    /// Creates progress tracker options reporting every `report_interval`.
    pub fn new(report_interval: Duration, on_sample: ProgressCallback) -> Self {
        Self {
            report_interval,
            on_sample,
        }
    }
}

/// Runs the periodic progress sampling loop until `cancel` fires, then
/// emits one final snapshot before returning.
pub(crate) async fn run_progress_loop(
    options: ProgressTrackerOptions,
    counters: Arc<RunCounters>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(options.report_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                emit(&options, &counters);
            }
            _ = cancel.cancelled() => {
                emit(&options, &counters);
                return;
            }
        }
    }
}

fn emit(options: &ProgressTrackerOptions, counters: &RunCounters) {
    let snapshot = ProgressSnapshot::from_counters(counters);
    let callback = options.on_sample.clone();
    let _ = catch_unwind(AssertUnwindSafe(|| callback(snapshot)));
}
