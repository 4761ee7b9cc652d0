//! Metrics tracker: a periodic sampler reporting engine internals.

use crate::stats::RunCounters;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One point-in-time metrics report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsSnapshot {
    /// Workers currently executing a user-function attempt.
    pub active_workers: usize,
    /// Envelopes buffered in the input channel.
    pub queue_depth: usize,
    /// Items that have begun their first attempt.
    pub items_started: u64,
    /// Items that reached a terminal outcome.
    pub items_completed: u64,
    /// Total retry attempts issued.
    pub total_retries: u64,
    /// Total terminal failures.
    pub total_failures: u64,
    /// Total rate-limit wait episodes.
    pub throttle_events: u64,
    /// Total times the input channel was observed empty.
    pub drain_events: u64,
    /// Time elapsed since the pipeline started.
    pub elapsed: Duration,
    /// `items_completed / elapsed.as_secs_f64()`.
    pub items_per_second: f64,
    /// `total_failures / items_completed`, `0.0` if nothing has completed.
    pub error_rate: f64,
}

impl MetricsSnapshot {
    fn from_counters(counters: &RunCounters) -> Self {
        let elapsed = counters.started_at.elapsed();
        let items_completed = counters.items_completed();
        let items_per_second = if elapsed.as_secs_f64() > 0.0 {
            items_completed as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let total_failures = counters.error_count();
        let error_rate = if items_completed > 0 {
            total_failures as f64 / items_completed as f64
        } else {
            0.0
        };

        Self {
            active_workers: counters.active_workers(),
            queue_depth: counters.queue_depth(),
            items_started: counters.items_started(),
            items_completed,
            total_retries: counters.total_retries(),
            total_failures,
            throttle_events: counters.throttle_events(),
            drain_events: counters.drain_events(),
            elapsed,
            items_per_second,
            error_rate,
        }
    }
}

/// Callback invoked with each [`MetricsSnapshot`]. Panics are swallowed.
pub type MetricsCallback = Arc<dyn Fn(MetricsSnapshot) + Send + Sync>;

/// Configuration for the metrics tracker.
#[derive(Clone)]
pub struct MetricsTrackerOptions {
    pub(crate) sample_interval: Duration,
    pub(crate) on_sample: MetricsCallback,
}

impl MetricsTrackerOptions {
    /// Creates metrics tracker options sampling every `sample_interval`.
    pub fn new(sample_interval: Duration, on_sample: MetricsCallback) -> Self {
        Self {
            sample_interval,
            on_sample,
        }
    }
}

/// Runs the periodic metrics sampling loop until `cancel` fires, then
/// emits one final snapshot before returning.
pub(crate) async fn run_metrics_loop(
    options: MetricsTrackerOptions,
    counters: Arc<RunCounters>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(options.sample_interval);
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

fn emit(options: &MetricsTrackerOptions, counters: &RunCounters) {
    let snapshot = MetricsSnapshot::from_counters(counters);
    let callback = options.on_sample.clone();
    let _ = catch_unwind(AssertUnwindSafe(|| callback(snapshot)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_rate_is_zero_with_no_completions() {
        let counters = RunCounters::new(None);
        let snapshot = MetricsSnapshot::from_counters(&counters);
        assert_eq!(snapshot.error_rate, 0.0);
    }

    #[test]
    fn error_rate_tracks_failures_over_completions() {
        let counters = RunCounters::new(None);
        for _ in 0..4 {
            counters.record_item_completed();
        }
        counters.record_error();
        let snapshot = MetricsSnapshot::from_counters(&counters);
        assert_eq!(snapshot.error_rate, 0.25);
    }
}
