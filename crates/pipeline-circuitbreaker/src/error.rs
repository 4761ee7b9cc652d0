//! Errors returned while configuring the circuit breaker.

use thiserror::Error;

/// Errors returned by [`crate::CircuitBreakerConfig`] validation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CircuitBreakerConfigError {
    /// `failure_threshold` must be at least 1.
    #[error("circuit_breaker.failure_threshold must be >= 1, got {0}")]
    InvalidFailureThreshold(usize),

    /// `success_threshold` must be at least 1.
    #[error("circuit_breaker.success_threshold must be >= 1, got {0}")]
    InvalidSuccessThreshold(usize),

    /// `open_timeout` must be strictly positive.
    #[error("circuit_breaker.open_timeout must be > 0")]
    InvalidOpenTimeout,

    /// `sampling_duration`, if set, must be strictly positive.
    #[error("circuit_breaker.sampling_duration must be > 0 if set")]
    InvalidSamplingDuration,
}
