//! Configuration for the token bucket admission gate.

use crate::error::RateLimiterError;

/// Configuration for [`crate::RateLimiter`].
///
/// Mirrors the options surface's `rate_limit` sub-record:
/// `{tokens_per_second, burst_capacity, tokens_per_operation}`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimiterConfig {
    pub(crate) tokens_per_second: f64,
    pub(crate) burst_capacity: f64,
    pub(crate) tokens_per_operation: f64,
}

impl RateLimiterConfig {
    /// Creates a builder seeded with the given refill rate.
    pub fn builder(tokens_per_second: f64) -> RateLimiterConfigBuilder {
        RateLimiterConfigBuilder::new(tokens_per_second)
    }

    /// Configured refill rate, in tokens per second.
    pub fn tokens_per_second(&self) -> f64 {
        self.tokens_per_second
    }

    /// Configured burst capacity (maximum tokens the bucket can hold).
    pub fn burst_capacity(&self) -> f64 {
        self.burst_capacity
    }

    /// Configured cost of a single operation, in tokens.
    pub fn tokens_per_operation(&self) -> f64 {
        self.tokens_per_operation
    }

    fn validate(&self) -> Result<(), RateLimiterError> {
        if !(self.tokens_per_second > 0.0) {
            return Err(RateLimiterError::InvalidRate(self.tokens_per_second));
        }
        if !(self.burst_capacity > 0.0) {
            return Err(RateLimiterError::InvalidCapacity(self.burst_capacity));
        }
        if !(self.tokens_per_operation > 0.0) {
            return Err(RateLimiterError::InvalidCost(self.tokens_per_operation));
        }
        if self.burst_capacity < self.tokens_per_operation {
            return Err(RateLimiterError::CapacityBelowCost {
                capacity: self.burst_capacity,
                cost: self.tokens_per_operation,
            });
        }
        Ok(())
    }
}

/// Builder for [`RateLimiterConfig`].
#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfigBuilder {
    tokens_per_second: f64,
    burst_capacity: f64,
    tokens_per_operation: f64,
}

impl RateLimiterConfigBuilder {
    /// Creates a new builder. Defaults: burst capacity equals the refill
    /// rate (one second's worth of tokens), cost per operation is 1.0.
    pub fn new(tokens_per_second: f64) -> Self {
        Self {
            tokens_per_second,
            burst_capacity: tokens_per_second,
            tokens_per_operation: 1.0,
        }
    }

    /// Sets the burst capacity (maximum tokens the bucket can accumulate).
    pub fn burst_capacity(mut self, capacity: f64) -> Self {
        self.burst_capacity = capacity;
        self
    }

    /// Sets the token cost of a single operation.
    pub fn tokens_per_operation(mut self, cost: f64) -> Self {
        self.tokens_per_operation = cost;
        self
    }

    /// Validates and builds the configuration.
    pub fn build(self) -> Result<RateLimiterConfig, RateLimiterError> {
        let config = RateLimiterConfig {
            tokens_per_second: self.tokens_per_second,
            burst_capacity: self.burst_capacity,
            tokens_per_operation: self.tokens_per_operation,
        };
        config.validate()?;
        Ok(config)
    }
}
