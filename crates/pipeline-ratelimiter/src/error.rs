//! Errors returned while configuring or operating the token bucket.

use thiserror::Error;

/// Errors returned by [`crate::RateLimiterConfig`] validation or by the
/// limiter itself.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RateLimiterError {
    /// `rate` must be strictly positive.
    #[error("rate_limit.tokens_per_second must be > 0, got {0}")]
    InvalidRate(f64),

    /// `capacity` must be strictly positive.
    #[error("rate_limit.burst_capacity must be > 0, got {0}")]
    InvalidCapacity(f64),

    /// `cost_per_op` must be strictly positive.
    #[error("rate_limit.tokens_per_operation must be > 0, got {0}")]
    InvalidCost(f64),

    /// `capacity` must be at least `cost_per_op`, or no operation could ever
    /// be admitted.
    #[error("rate_limit.burst_capacity ({capacity}) must be >= tokens_per_operation ({cost})")]
    CapacityBelowCost {
        /// Configured burst capacity.
        capacity: f64,
        /// Configured cost per operation.
        cost: f64,
    },
}
