//! Adaptive concurrency controller for the pipeline engine.
//!
//! Workers consult [`AdaptiveConcurrencyController::current`] before
//! picking up the next item and report each attempt's outcome through
//! [`AdaptiveConcurrencyController::acquire`] /
//! [`AdaptiveConcurrencyController::release`]. A background task driven by
//! [`AdaptiveConcurrencyController::run_sampling_loop`] retunes the limit
//! on a fixed interval.

mod config;
mod controller;

pub use config::{
    AdaptiveConcurrencyConfig, AdaptiveConcurrencyConfigBuilder, AdaptiveConcurrencyConfigError,
    AdaptiveStrategy,
};
pub use controller::{AdaptiveConcurrencyController, ConcurrencyChangeCallback, ConcurrencyPermit};
