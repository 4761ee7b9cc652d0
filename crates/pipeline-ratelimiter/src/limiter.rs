//! Token bucket state and the shared, cloneable gate workers acquire from.

use crate::config::RateLimiterConfig;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Result of a blocking acquire: cancelled, or succeeded (optionally after
/// waiting).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// A permit was granted immediately, no wait required.
    Immediate,
    /// A permit was granted after waiting on the bucket to refill.
    AfterWait,
    /// The cancellation token fired before a permit could be granted.
    Cancelled,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl BucketState {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    /// Refills the bucket based on elapsed time since the last refill.
    /// If elapsed <= 0 (clock jitter), this is a no-op.
    fn refill(&mut self, config: &RateLimiterConfig) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_refill);
        if elapsed.is_zero() {
            return;
        }
        let added = elapsed.as_secs_f64() * config.tokens_per_second();
        self.tokens = (self.tokens + added).min(config.burst_capacity());
        self.last_refill = now;
    }

    fn try_acquire(&mut self, config: &RateLimiterConfig) -> bool {
        self.refill(config);
        if self.tokens >= config.tokens_per_operation() {
            self.tokens -= config.tokens_per_operation();
            true
        } else {
            false
        }
    }

    fn min_wait(&self, config: &RateLimiterConfig) -> Duration {
        let deficit = config.tokens_per_operation() - self.tokens;
        Duration::from_secs_f64((deficit / config.tokens_per_second()).max(0.0))
    }
}

/// A token bucket rate limiter shared across every worker in the pipeline.
///
/// Cloning shares the same underlying state; it is internally `Arc`-free
/// because the engine holds one `Arc<RateLimiter>` shared by every worker
/// task rather than the gate managing its own sharing.
pub struct RateLimiter {
    config: RateLimiterConfig,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    /// Creates a new rate limiter, starting with a full bucket.
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            state: Mutex::new(BucketState::new(config.burst_capacity())),
            config,
        }
    }

    /// Non-blocking acquire: returns `true` if a permit was available and
    /// deducted, `false` otherwise. Never sleeps.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        let granted = state.try_acquire(&self.config);

        #[cfg(feature = "metrics")]
        {
            counter!("pipeline_ratelimiter_acquire_total", "outcome" => if granted { "granted" } else { "rejected" }).increment(1);
            gauge!("pipeline_ratelimiter_tokens").set(state.tokens);
        }

        granted
    }

    /// Returns the number of tokens currently available, after refilling.
    pub fn available_tokens(&self) -> f64 {
        let mut state = self.state.lock().unwrap();
        state.refill(&self.config);
        state.tokens
    }

    /// Blocking acquire: sleeps (honoring `cancel`) until a permit is
    /// available. Returns [`AcquireOutcome::Cancelled`] if `cancel` fires
    /// first. Invokes `on_wait` exactly once if this call had to sleep at
    /// all, regardless of how many refill cycles the wait spans.
    pub async fn acquire(
        &self,
        cancel: &CancellationToken,
        on_wait: impl FnOnce(Duration),
    ) -> AcquireOutcome {
        let mut has_waited = false;
        let mut on_wait = Some(on_wait);
        loop {
            let (granted, wait) = {
                let mut state = self.state.lock().unwrap();
                let granted = state.try_acquire(&self.config);
                let wait = if granted {
                    Duration::ZERO
                } else {
                    state.min_wait(&self.config)
                };
                (granted, wait)
            };

            if granted {
                #[cfg(feature = "metrics")]
                counter!("pipeline_ratelimiter_acquire_total", "outcome" => "granted").increment(1);
                return if has_waited {
                    AcquireOutcome::AfterWait
                } else {
                    AcquireOutcome::Immediate
                };
            }

            has_waited = true;
            if let Some(f) = on_wait.take() {
                f(wait);
            }

            #[cfg(feature = "tracing")]
            tracing::debug!(?wait, "rate limiter throttling worker");

            tokio::select! {
                _ = sleep(wait) => {}
                _ = cancel.cancelled() => {
                    return AcquireOutcome::Cancelled;
                }
            }

            // Loop back around: another waiter may have drained the tokens
            // we were waiting for, so re-check rather than assume success.
        }
    }
}
