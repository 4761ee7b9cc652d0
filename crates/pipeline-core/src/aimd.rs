//! Generic AIMD (Additive Increase Multiplicative Decrease) controller.
//!
//! Used directly by the adaptive concurrency controller's `AIMD` strategy
//!: additive +1 on increase, multiplicative halving on decrease,
//! clamped to `[min, max]`.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Configuration for an [`AimdController`].
#[derive(Debug, Clone)]
pub struct AimdConfig {
    /// Initial limit value.
    pub initial_limit: usize,
    /// Minimum limit (floor).
    pub min_limit: usize,
    /// Maximum limit (ceiling).
    pub max_limit: usize,
    /// Amount to add on increase (additive increase).
    pub increase_by: usize,
    /// Factor to multiply by on decrease (multiplicative decrease), in
    /// `(0.0, 1.0]`.
    pub decrease_factor: f64,
}

impl Default for AimdConfig {
    fn default() -> Self {
        Self {
            initial_limit: 10,
            min_limit: 1,
            max_limit: 100,
            increase_by: 1,
            decrease_factor: 0.5,
        }
    }
}

impl AimdConfig {
    /// Creates a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the initial limit.
    pub fn with_initial_limit(mut self, limit: usize) -> Self {
        self.initial_limit = limit;
        self
    }

    /// Sets the minimum limit (floor).
    pub fn with_min_limit(mut self, limit: usize) -> Self {
        self.min_limit = limit;
        self
    }

    /// Sets the maximum limit (ceiling).
    pub fn with_max_limit(mut self, limit: usize) -> Self {
        self.max_limit = limit;
        self
    }

    /// Sets the additive increase amount.
    pub fn with_increase_by(mut self, amount: usize) -> Self {
        self.increase_by = amount;
        self
    }

    /// Sets the multiplicative decrease factor.
    pub fn with_decrease_factor(mut self, factor: f64) -> Self {
        self.decrease_factor = factor;
        self
    }
}

/// Additive increase, clamped to `max`. The pure step `AimdController` and
/// any other caller's own additive-increase strategy should share.
pub fn additive_increase(current: usize, step: usize, max: usize) -> usize {
    current.saturating_add(step).min(max)
}

/// Multiplicative decrease, clamped to `min`. The pure step
/// `AimdController` and any other caller's own multiplicative-decrease
/// strategy should share.
pub fn multiplicative_decrease(current: usize, factor: f64, min: usize) -> usize {
    let decreased = (current as f64 * factor).floor() as usize;
    decreased.max(min)
}

/// Thread-safe AIMD controller over a `usize` limit.
pub struct AimdController {
    limit: AtomicUsize,
    config: AimdConfig,
}

impl AimdController {
    /// Creates a new controller, clamping the initial limit to
    /// `[min_limit, max_limit]`.
    pub fn new(config: AimdConfig) -> Self {
        let initial = config
            .initial_limit
            .clamp(config.min_limit, config.max_limit);
        Self {
            limit: AtomicUsize::new(initial),
            config,
        }
    }

    /// Current limit.
    pub fn limit(&self) -> usize {
        self.limit.load(Ordering::Relaxed)
    }

    /// Configured minimum limit.
    pub fn min_limit(&self) -> usize {
        self.config.min_limit
    }

    /// Configured maximum limit.
    pub fn max_limit(&self) -> usize {
        self.config.max_limit
    }

    /// Additive increase, clamped to `max_limit`.
    pub fn increase(&self) {
        let current = self.limit.load(Ordering::Relaxed);
        let new_limit = additive_increase(current, self.config.increase_by, self.config.max_limit);
        self.limit.store(new_limit, Ordering::Relaxed);
    }

    /// Multiplicative decrease, clamped to `min_limit`.
    pub fn decrease(&self) {
        let current = self.limit.load(Ordering::Relaxed);
        let new_limit =
            multiplicative_decrease(current, self.config.decrease_factor, self.config.min_limit);
        self.limit.store(new_limit, Ordering::Relaxed);
    }

    /// Resets the limit to its clamped initial value.
    pub fn reset(&self) {
        let initial = self
            .config
            .initial_limit
            .clamp(self.config.min_limit, self.config.max_limit);
        self.limit.store(initial, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for AimdController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AimdController")
            .field("limit", &self.limit())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_limit_clamped_to_max() {
        let config = AimdConfig::default()
            .with_initial_limit(200)
            .with_max_limit(50);
        let controller = AimdController::new(config);
        assert_eq!(controller.limit(), 50);
    }

    #[test]
    fn additive_increase_then_halving_decrease() {
        let config = AimdConfig::default()
            .with_initial_limit(10)
            .with_min_limit(1)
            .with_max_limit(100)
            .with_increase_by(1)
            .with_decrease_factor(0.5);
        let controller = AimdController::new(config);

        controller.increase();
        assert_eq!(controller.limit(), 11);

        controller.decrease();
        assert_eq!(controller.limit(), 5);
    }

    #[test]
    fn decrease_respects_floor() {
        let config = AimdConfig::default()
            .with_initial_limit(2)
            .with_min_limit(1)
            .with_decrease_factor(0.1);
        let controller = AimdController::new(config);

        controller.decrease();
        assert_eq!(controller.limit(), 1);
    }

    #[test]
    fn reset_restores_initial() {
        let config = AimdConfig::default().with_initial_limit(10);
        let controller = AimdController::new(config);
        controller.increase();
        controller.reset();
        assert_eq!(controller.limit(), 10);
    }
}
