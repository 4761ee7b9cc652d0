//! Configuration for [`crate::AdaptiveConcurrencyController`].

use std::time::Duration;

/// Error returned by [`AdaptiveConcurrencyConfigBuilder::build`].
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum AdaptiveConcurrencyConfigError {
    /// `min` must be at least 1.
    #[error("adaptive_concurrency.min must be >= 1, got {0}")]
    InvalidMin(usize),

    /// `max` must be greater than or equal to `min`.
    #[error("adaptive_concurrency.max ({max}) must be >= min ({min})")]
    MaxBelowMin {
        /// The configured minimum.
        min: usize,
        /// The configured maximum.
        max: usize,
    },

    /// `initial`, if set, must fall within `[min, max]`.
    #[error("adaptive_concurrency.initial ({initial}) must be within [{min}, {max}]")]
    InitialOutOfRange {
        /// The configured initial value.
        initial: usize,
        /// The configured minimum.
        min: usize,
        /// The configured maximum.
        max: usize,
    },

    /// `sample_interval` must be strictly positive.
    #[error("adaptive_concurrency.sample_interval must be > 0")]
    InvalidSampleInterval,

    /// `target_latency` must be strictly positive.
    #[error("adaptive_concurrency.target_latency must be > 0")]
    InvalidTargetLatency,

    /// `min_success_rate` must be within `[0.0, 1.0]`.
    #[error("adaptive_concurrency.min_success_rate must be within [0.0, 1.0], got {0}")]
    InvalidMinSuccessRate(f64),
}

/// Strategy used to grow or shrink the concurrency limit on each sampling
/// tick. An unrecognized strategy name at the
/// configuration boundary defaults to `Aimd`, matching the retry-policy
/// backoff convention of defaulting rather than rejecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdaptiveStrategy {
    /// Increase by +1, decrease by halving (floor, clamped to `min`).
    #[default]
    Aimd,
    /// Increase by doubling, decrease by halving.
    Aggressive,
    /// Increase by `ceil(current * 1.1)`, decrease by `floor(current * 0.75)`.
    Gradual,
}

/// Validated adaptive concurrency configuration.
#[derive(Clone)]
pub struct AdaptiveConcurrencyConfig {
    min: usize,
    max: usize,
    initial: usize,
    sample_interval: Duration,
    target_latency: Duration,
    min_success_rate: f64,
    increase_strategy: AdaptiveStrategy,
    decrease_strategy: AdaptiveStrategy,
}

impl AdaptiveConcurrencyConfig {
    /// Starts a builder requiring the `[min, max]` bounds.
    pub fn builder(min: usize, max: usize) -> AdaptiveConcurrencyConfigBuilder {
        AdaptiveConcurrencyConfigBuilder {
            min,
            max,
            initial: None,
            sample_interval: Duration::from_secs(1),
            target_latency: Duration::from_millis(250),
            min_success_rate: 0.9,
            increase_strategy: AdaptiveStrategy::default(),
            decrease_strategy: AdaptiveStrategy::default(),
        }
    }

    /// Lower bound of the concurrency limit.
    pub fn min(&self) -> usize {
        self.min
    }

    /// Upper bound of the concurrency limit.
    pub fn max(&self) -> usize {
        self.max
    }

    /// Starting concurrency limit.
    pub fn initial(&self) -> usize {
        self.initial
    }

    /// How often the sampling loop evaluates the rolling window.
    pub fn sample_interval(&self) -> Duration {
        self.sample_interval
    }

    /// Average latency above which the controller decreases the limit.
    pub fn target_latency(&self) -> Duration {
        self.target_latency
    }

    /// Success rate below which the controller decreases the limit
    /// regardless of latency.
    pub fn min_success_rate(&self) -> f64 {
        self.min_success_rate
    }

    /// The strategy applied to an increase decision.
    pub fn increase_strategy(&self) -> AdaptiveStrategy {
        self.increase_strategy
    }

    /// The strategy applied to a decrease decision.
    pub fn decrease_strategy(&self) -> AdaptiveStrategy {
        self.decrease_strategy
    }
}

/// Builder for [`AdaptiveConcurrencyConfig`].
pub struct AdaptiveConcurrencyConfigBuilder {
    min: usize,
    max: usize,
    initial: Option<usize>,
    sample_interval: Duration,
    target_latency: Duration,
    min_success_rate: f64,
    increase_strategy: AdaptiveStrategy,
    decrease_strategy: AdaptiveStrategy,
}

impl AdaptiveConcurrencyConfigBuilder {
    /// Overrides the starting limit; defaults to `min`.
    pub fn initial(mut self, initial: usize) -> Self {
        self.initial = Some(initial);
        self
    }

    /// Overrides the default 1 second sampling interval.
    pub fn sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    /// Overrides the default 250ms target latency.
    pub fn target_latency(mut self, latency: Duration) -> Self {
        self.target_latency = latency;
        self
    }

    /// Overrides the default 0.9 minimum success rate.
    pub fn min_success_rate(mut self, rate: f64) -> Self {
        self.min_success_rate = rate;
        self
    }

    /// Overrides the default [`AdaptiveStrategy::Aimd`] increase strategy.
    pub fn increase_strategy(mut self, strategy: AdaptiveStrategy) -> Self {
        self.increase_strategy = strategy;
        self
    }

    /// Overrides the default [`AdaptiveStrategy::Aimd`] decrease strategy.
    pub fn decrease_strategy(mut self, strategy: AdaptiveStrategy) -> Self {
        self.decrease_strategy = strategy;
        self
    }

    /// Sets both `increase_strategy` and `decrease_strategy` to the same
    /// value, matching a single unified strategy selection.
    pub fn strategy(mut self, strategy: AdaptiveStrategy) -> Self {
        self.increase_strategy = strategy;
        self.decrease_strategy = strategy;
        self
    }

    /// Validates and builds the config.
    pub fn build(self) -> Result<AdaptiveConcurrencyConfig, AdaptiveConcurrencyConfigError> {
        if self.min == 0 {
            return Err(AdaptiveConcurrencyConfigError::InvalidMin(self.min));
        }
        if self.max < self.min {
            return Err(AdaptiveConcurrencyConfigError::MaxBelowMin {
                min: self.min,
                max: self.max,
            });
        }
        let initial = self.initial.unwrap_or(self.min);
        if initial < self.min || initial > self.max {
            return Err(AdaptiveConcurrencyConfigError::InitialOutOfRange {
                initial,
                min: self.min,
                max: self.max,
            });
        }
        if self.sample_interval.is_zero() {
            return Err(AdaptiveConcurrencyConfigError::InvalidSampleInterval);
        }
        if self.target_latency.is_zero() {
            return Err(AdaptiveConcurrencyConfigError::InvalidTargetLatency);
        }
        if !(0.0..=1.0).contains(&self.min_success_rate) {
            return Err(AdaptiveConcurrencyConfigError::InvalidMinSuccessRate(
                self.min_success_rate,
            ));
        }

        Ok(AdaptiveConcurrencyConfig {
            min: self.min,
            max: self.max,
            initial,
            sample_interval: self.sample_interval,
            target_latency: self.target_latency,
            min_success_rate: self.min_success_rate,
            increase_strategy: self.increase_strategy,
            decrease_strategy: self.decrease_strategy,
        })
    }
}
