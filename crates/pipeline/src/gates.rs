//! Assembles the three independent admission gates from one pipeline's
//! options into the shared state every worker consults before an attempt.

use crate::options::PipelineOptions;
use pipeline_adaptive::AdaptiveConcurrencyController;
use pipeline_circuitbreaker::CircuitBreaker;
use pipeline_ratelimiter::RateLimiter;
use std::sync::Arc;

/// Shared, per-pipeline-run gate state. Each gate guards its own lock and
/// is independent of the others, with its own timers; no component holds
/// more than one gate's lock at a time.
pub(crate) struct Gates {
    pub(crate) rate_limit: Option<Arc<RateLimiter>>,
    pub(crate) circuit_breaker: Option<Arc<CircuitBreaker>>,
    pub(crate) adaptive: Option<Arc<AdaptiveConcurrencyController>>,
}

impl Gates {
    pub(crate) fn build<T, R, E>(options: &PipelineOptions<T, R, E>) -> Self {
        let rate_limit = options.rate_limit.map(|config| Arc::new(RateLimiter::new(config)));

        let circuit_breaker = options.circuit_breaker.clone().map(|config| {
            let mut breaker = CircuitBreaker::new(config);
            if let Some(callback) = options.circuit_breaker_on_state_change.clone() {
                breaker = breaker.with_state_change_callback(callback);
            }
            Arc::new(breaker)
        });

        let adaptive = options.adaptive_concurrency.clone().map(|config| {
            let mut controller = AdaptiveConcurrencyController::new(config);
            if let Some(callback) = options.adaptive_on_change.clone() {
                controller = controller.with_change_callback(callback);
            }
            Arc::new(controller)
        });

        Self {
            rate_limit,
            circuit_breaker,
            adaptive,
        }
    }
}
