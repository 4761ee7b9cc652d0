//! Shared infrastructure for the parallel-pipeline workspace.
//!
//! This crate provides what every admission gate and the engine itself need:
//! - A unified error type ([`error::PipelineError`])
//! - An event/listener system for observability hooks ([`events`])
//! - A reusable AIMD controller primitive ([`aimd`])

pub mod aimd;
pub mod error;
pub mod events;

pub use error::PipelineError;
pub use events::{EventListener, EventListeners, FnListener, PipelineEvent};
