//! A parallel asynchronous pipeline engine: bounded-concurrency map/for-each
//! over a sequence, with per-item retries, backoff, an ordering buffer,
//! three error-handling modes, and three independent resilience gates
//! (token-bucket rate limiting, a circuit breaker, adaptive concurrency).
//!
//! The typical entry point is [`Pipeline`]: build one from
//! [`PipelineOptions::builder`], then drive it with [`Pipeline::run_to_vec`],
//! [`Pipeline::run_stream`], or [`Pipeline::for_each`]. [`BatchedPipeline`]
//! wraps the same engine to process fixed-size (or size+timeout) batches
//! instead of individual items.

mod backoff;
mod batch;
mod engine;
mod envelope;
mod gates;
mod metrics_tracker;
mod options;
mod ordering;
mod pipeline;
mod progress;
mod stats;
mod telemetry;
mod worker;
mod writer;

pub use backoff::BackoffStrategy;
pub use batch::BatchedPipeline;
pub use metrics_tracker::{MetricsCallback, MetricsSnapshot, MetricsTrackerOptions};
pub use options::{ErrorMode, PipelineOptions, PipelineOptionsBuilder};
pub use pipeline::Pipeline;
pub use progress::{ProgressCallback, ProgressSnapshot, ProgressTrackerOptions};
pub use telemetry::ProcessCounters;

pub use pipeline_adaptive::{
    AdaptiveConcurrencyConfig, AdaptiveConcurrencyConfigBuilder, AdaptiveConcurrencyConfigError,
    AdaptiveStrategy, ConcurrencyChangeCallback,
};
pub use pipeline_circuitbreaker::{
    CircuitBreakerConfig, CircuitBreakerConfigBuilder, CircuitBreakerConfigError, CircuitState,
    StateChangeCallback,
};
pub use pipeline_core::{EventListener, EventListeners, FnListener, PipelineError, PipelineEvent};
pub use pipeline_ratelimiter::{RateLimiterConfig, RateLimiterConfigBuilder, RateLimiterError};
