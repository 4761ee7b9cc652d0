//! Retry backoff strategies.

use rand::Rng;
use std::time::Duration;

/// A delay schedule applied between a failed attempt and the next retry.
///
/// An unrecognized strategy value at the configuration boundary defaults to
/// [`BackoffStrategy::Exponential`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffStrategy {
    /// `delay = base * attempt`.
    Linear,
    /// `delay = uniform(0, base * attempt)`.
    LinearJitter,
    /// `delay = base * 2^(attempt-1)`.
    #[default]
    Exponential,
    /// `delay = uniform(0, base * 2^(attempt-1))`.
    ExponentialJitter,
    /// `delay = uniform(base, max(base, prev_delay * 3))`; `prev_delay`
    /// carries over between attempts of the same item.
    DecorrelatedJitter,
}

/// Cap applied to any single computed delay, regardless of strategy, to
/// protect against `Duration` overflow under `DecorrelatedJitter`'s
/// unbounded multiplicative growth.
const MAX_DELAY: Duration = Duration::from_secs(3600);

/// Per-item backoff state. `DecorrelatedJitter`'s `prev_delay` starts at
/// `base_delay` for each item and is not shared across items.
#[derive(Debug, Clone)]
pub struct BackoffState {
    strategy: BackoffStrategy,
    base_delay: Duration,
    prev_delay: Duration,
}

impl BackoffState {
    /// Creates fresh per-item backoff state.
    pub fn new(strategy: BackoffStrategy, base_delay: Duration) -> Self {
        Self {
            strategy,
            base_delay,
            prev_delay: base_delay,
        }
    }

    /// Computes the delay before retrying after `attempt` (1-based, the
    /// attempt that just failed), updating internal state for
    /// `DecorrelatedJitter`.
    pub fn next_delay(&mut self, attempt: usize) -> Duration {
        let delay = match self.strategy {
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt as u32),
            BackoffStrategy::LinearJitter => {
                let upper = self.base_delay.saturating_mul(attempt as u32);
                uniform(Duration::ZERO, upper)
            }
            BackoffStrategy::Exponential => exponential(self.base_delay, attempt),
            BackoffStrategy::ExponentialJitter => {
                let upper = exponential(self.base_delay, attempt);
                uniform(Duration::ZERO, upper)
            }
            BackoffStrategy::DecorrelatedJitter => {
                let upper = self.base_delay.max(self.prev_delay.saturating_mul(3));
                let delay = uniform(self.base_delay, upper);
                self.prev_delay = delay;
                delay
            }
        };
        delay.min(MAX_DELAY)
    }
}

fn exponential(base: Duration, attempt: usize) -> Duration {
    let exponent = (attempt.saturating_sub(1)).min(32) as u32;
    base.saturating_mul(1u32.checked_shl(exponent).unwrap_or(u32::MAX))
}

fn uniform(low: Duration, high: Duration) -> Duration {
    if high <= low {
        return low;
    }
    rand::rng().random_range(low..=high)
}
