//! Unified error type for the pipeline engine and its admission gates.
//!
//! [`PipelineError<E>`] wraps every error kind the engine can surface so that
//! admission gates (rate limiter, circuit breaker, adaptive concurrency) and
//! the engine itself share one vocabulary without per-gate `From` impls.
//!
//! # Variants
//!
//! - [`PipelineError::Timeout`] — a per-item timeout fired.
//! - [`PipelineError::CircuitOpen`] — the circuit breaker rejected the call.
//! - [`PipelineError::Cancelled`] — the root cancellation signal fired.
//! - [`PipelineError::Configuration`] — an invalid `Options` record was
//!   supplied at invocation entry.
//! - [`PipelineError::Aggregate`] — the container used by `CollectAndContinue`
//!   error mode to report every per-item failure at once.
//! - [`PipelineError::Application`] — an error returned by the user function.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// A unified error type for the pipeline engine.
///
/// `E` is the application-specific error type returned by the user-supplied
/// async function.
#[derive(Debug, Error)]
pub enum PipelineError<E> {
    /// A per-item timeout elapsed before the user function completed.
    #[error("item timed out after {0:?}")]
    Timeout(Duration),

    /// The circuit breaker is open; the call was rejected without executing
    /// the user function.
    #[error("circuit breaker{} is open", name.as_deref().map(|n| format!(" '{n}'")).unwrap_or_default())]
    CircuitOpen {
        /// Name of the circuit breaker, if configured.
        name: Option<String>,
    },

    /// The root cancellation signal fired (caller cancellation or an
    /// internal `FailFast` abort).
    #[error("pipeline cancelled")]
    Cancelled,

    /// The supplied `Options` record failed validation at invocation entry.
    #[error("invalid pipeline configuration: {0}")]
    Configuration(String),

    /// Aggregate of per-item errors collected under `CollectAndContinue`
    /// error mode.
    #[error("{} item(s) failed: {}", .0.len(), summarize(.0))]
    Aggregate(Vec<PipelineError<E>>),

    /// The user-supplied function returned an application error.
    #[error("application error: {0}")]
    Application(#[source] E),
}

fn summarize<E: fmt::Display>(errors: &[PipelineError<E>]) -> String {
    errors
        .iter()
        .take(3)
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl<E> PipelineError<E> {
    /// Returns `true` if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, PipelineError::Timeout(_))
    }

    /// Returns `true` if this is a circuit-open error.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, PipelineError::CircuitOpen { .. })
    }

    /// Returns `true` if this is a cancellation error.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }

    /// Returns `true` if this is a configuration error.
    pub fn is_configuration(&self) -> bool {
        matches!(self, PipelineError::Configuration(_))
    }

    /// Returns `true` if this is an application error.
    pub fn is_application(&self) -> bool {
        matches!(self, PipelineError::Application(_))
    }

    /// A timeout and a circuit-open error are both "cancellation-kind":
    /// they short-circuit the attempt without the user function producing
    /// an application error. `is_transient` predicates commonly treat both
    /// as retryable.
    pub fn is_cancellation_kind(&self) -> bool {
        matches!(self, PipelineError::Timeout(_) | PipelineError::Cancelled)
    }

    /// Extracts the application error, if this is an `Application` variant.
    pub fn into_application(self) -> Option<E> {
        match self {
            PipelineError::Application(e) => Some(e),
            _ => None,
        }
    }

    /// Flattens nested aggregates and maps the application error.
    pub fn map_application<F, T>(self, f: &F) -> PipelineError<T>
    where
        F: Fn(E) -> T,
    {
        match self {
            PipelineError::Timeout(d) => PipelineError::Timeout(d),
            PipelineError::CircuitOpen { name } => PipelineError::CircuitOpen { name },
            PipelineError::Cancelled => PipelineError::Cancelled,
            PipelineError::Configuration(s) => PipelineError::Configuration(s),
            PipelineError::Aggregate(errs) => {
                PipelineError::Aggregate(errs.into_iter().map(|e| e.map_application(f)).collect())
            }
            PipelineError::Application(e) => PipelineError::Application(f(e)),
        }
    }
}
