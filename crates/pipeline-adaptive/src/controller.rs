//! The adaptive concurrency sampling loop.

use crate::config::{AdaptiveConcurrencyConfig, AdaptiveStrategy};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[cfg(feature = "metrics")]
use metrics::gauge;

/// Callback invoked on every concurrency-limit change. Panics are
/// swallowed; `on_concurrency_change` is fire-and-forget.
pub type ConcurrencyChangeCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Proof that a worker acquired a concurrency slot and must report back the
/// outcome via [`AdaptiveConcurrencyController::release`].
///
/// Unlike [`pipeline_ratelimiter::RateLimiter`], acquiring a permit here
/// never blocks: the controller only tracks the rolling sample used by the
/// periodic sampling loop to decide the *next* tick's limit. The actual
/// gating of concurrent workers against `current()` is the worker pool's
/// job.
#[derive(Debug)]
pub struct ConcurrencyPermit {
    _private: (),
}

/// Tracks observed latency/success-rate and periodically retunes the
/// concurrency limit `current` within `[min, max]`.
pub struct AdaptiveConcurrencyController {
    config: AdaptiveConcurrencyConfig,
    current: AtomicUsize,
    success_count: AtomicUsize,
    failure_count: AtomicUsize,
    latency_sum_nanos: AtomicU64,
    sample_count: AtomicUsize,
    on_change: Option<ConcurrencyChangeCallback>,
}

impl AdaptiveConcurrencyController {
    /// Creates a controller starting at `config.initial()`.
    pub fn new(config: AdaptiveConcurrencyConfig) -> Self {
        let initial = config.initial();
        Self {
            config,
            current: AtomicUsize::new(initial),
            success_count: AtomicUsize::new(0),
            failure_count: AtomicUsize::new(0),
            latency_sum_nanos: AtomicU64::new(0),
            sample_count: AtomicUsize::new(0),
            on_change: None,
        }
    }

    /// Attaches a callback invoked synchronously whenever the limit changes.
    pub fn with_change_callback(mut self, callback: ConcurrencyChangeCallback) -> Self {
        self.on_change = Some(callback);
        self
    }

    /// The current concurrency limit. Workers consult this before picking
    /// up the next item.
    pub fn current(&self) -> usize {
        self.current.load(Ordering::Acquire)
    }

    /// Grants a bookkeeping permit; always succeeds immediately.
    pub fn acquire(&self) -> ConcurrencyPermit {
        ConcurrencyPermit { _private: () }
    }

    /// Folds one completed attempt's `(latency, success)` into the rolling
    /// sample that the next sampling tick will evaluate.
    pub fn release(&self, _permit: ConcurrencyPermit, latency: Duration, success: bool) {
        if success {
            self.success_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failure_count.fetch_add(1, Ordering::Relaxed);
        }
        self.latency_sum_nanos
            .fetch_add(latency.as_nanos() as u64, Ordering::Relaxed);
        self.sample_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Runs one sampling tick: evaluates the rolling window, applies the
    /// configured strategy, clamps to `[min, max]`, and resets the sample.
    /// Returns `Some((old, new))` if the limit changed.
    pub fn tick(&self) -> Option<(usize, usize)> {
        let sample_count = self.sample_count.swap(0, Ordering::AcqRel);
        let success_count = self.success_count.swap(0, Ordering::AcqRel);
        let failure_count = self.failure_count.swap(0, Ordering::AcqRel);
        let latency_sum_nanos = self.latency_sum_nanos.swap(0, Ordering::AcqRel);

        if sample_count == 0 {
            return None;
        }

        let avg_latency = Duration::from_nanos(latency_sum_nanos / sample_count as u64);
        let success_rate = success_count as f64 / (success_count + failure_count) as f64;

        let current = self.current.load(Ordering::Acquire);
        let decrease = success_rate < self.config.min_success_rate()
            || avg_latency > self.config.target_latency();

        let new = if decrease {
            decreased(self.config.decrease_strategy(), current, self.config.min())
        } else {
            increased(self.config.increase_strategy(), current)
        }
        .clamp(self.config.min(), self.config.max());

        if new == current {
            return None;
        }

        self.current.store(new, Ordering::Release);

        #[cfg(feature = "metrics")]
        gauge!("pipeline_adaptive_concurrency_limit").set(new as f64);
        #[cfg(feature = "tracing")]
        tracing::debug!(old = current, new, ?avg_latency, success_rate, "adaptive concurrency retuned");

        if let Some(callback) = &self.on_change {
            let callback = callback.clone();
            let _ = catch_unwind(AssertUnwindSafe(|| callback(current, new)));
        }

        Some((current, new))
    }

    /// Runs the periodic sampling loop until `cancel` fires, ticking every
    /// `config.sample_interval()`.
    pub async fn run_sampling_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.sample_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick();
                }
                _ = cancel.cancelled() => return,
            }
        }
    }
}

fn increased(strategy: AdaptiveStrategy, current: usize) -> usize {
    match strategy {
        // usize::MAX as the ceiling here is fine: the caller always clamps
        // the result to `config.max()` immediately afterward.
        AdaptiveStrategy::Aimd => pipeline_core::aimd::additive_increase(current, 1, usize::MAX),
        AdaptiveStrategy::Aggressive => current.saturating_mul(2),
        AdaptiveStrategy::Gradual => {
            let scaled = (current as f64 * 1.1).ceil() as usize;
            scaled.max(current + 1)
        }
    }
}

fn decreased(strategy: AdaptiveStrategy, current: usize, min: usize) -> usize {
    match strategy {
        AdaptiveStrategy::Aimd | AdaptiveStrategy::Aggressive => {
            pipeline_core::aimd::multiplicative_decrease(current, 0.5, min)
        }
        AdaptiveStrategy::Gradual => pipeline_core::aimd::multiplicative_decrease(current, 0.75, min),
    }
}
