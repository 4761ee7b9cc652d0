//! Token-bucket admission gate for the pipeline engine.
//!
//! Workers call [`RateLimiter::acquire`] before each attempt; it blocks
//! (honoring cancellation) until a token is available, invoking a
//! throttle callback the first time it has to wait.

mod config;
mod error;
mod limiter;

pub use config::{RateLimiterConfig, RateLimiterConfigBuilder};
pub use error::RateLimiterError;
pub use limiter::{AcquireOutcome, RateLimiter};
