//! Circuit breaker admission gate for the pipeline engine.
//!
//! Workers consult [`CircuitBreaker::try_acquire`] before each attempt; a
//! rejection means the breaker is `Open` and the caller must raise a
//! circuit-open error without attempting the call.

mod circuit;
mod config;
mod error;

pub use circuit::{AdmitOutcome, CircuitBreaker, CircuitState, StateChangeCallback};
pub use config::{CircuitBreakerConfig, CircuitBreakerConfigBuilder};
pub use error::CircuitBreakerConfigError;
