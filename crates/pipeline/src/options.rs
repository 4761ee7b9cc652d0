//! The pipeline's configuration record and its builder.

use crate::backoff::BackoffStrategy;
use crate::metrics_tracker::MetricsTrackerOptions;
use crate::progress::ProgressTrackerOptions;
use pipeline_circuitbreaker::{CircuitBreakerConfig, StateChangeCallback as CircuitStateChangeCallback};
use pipeline_core::events::{EventListeners, FnListener, PipelineEvent};
use pipeline_core::PipelineError;
use pipeline_ratelimiter::RateLimiterConfig;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// How the pipeline reacts to a terminal per-item failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMode {
    /// Abort the whole pipeline on the first terminal failure.
    #[default]
    FailFast,
    /// Keep running; collect every terminal failure into an aggregate error
    /// raised at the end.
    CollectAndContinue,
    /// Drop failing items (emit `Skipped`) and keep running.
    BestEffort,
}

// These three hooks classify or react to a terminal-or-retryable error.
// They take `&PipelineError<E>` rather than `&E` so a caller can recognize
// timeout/circuit-open/cancellation-kind failures (not just application
// errors returned by the user function) — a caller needs
// `is_transient(timeout) == true` to drive a timeout's own retries.
type TransientPredicate<E> = Arc<dyn Fn(&PipelineError<E>) -> bool + Send + Sync>;
type ErrorHook<E> = Arc<dyn Fn(u64, &PipelineError<E>) -> bool + Send + Sync>;
type FallbackHook<R, E> = Arc<dyn Fn(u64, &PipelineError<E>) -> R + Send + Sync>;

/// Immutable, validated configuration for one pipeline run.
pub struct PipelineOptions<T, R, E> {
    pub(crate) max_parallelism: usize,
    pub(crate) per_item_timeout: Option<Duration>,
    pub(crate) max_retries: usize,
    pub(crate) base_delay: Duration,
    pub(crate) backoff_strategy: BackoffStrategy,
    pub(crate) is_transient: Option<TransientPredicate<E>>,
    pub(crate) error_mode: ErrorMode,
    pub(crate) ordered_output: bool,
    pub(crate) channel_capacity: usize,
    pub(crate) on_error: Option<ErrorHook<E>>,
    pub(crate) on_fallback: Option<FallbackHook<R, E>>,
    pub(crate) event_listeners: EventListeners,
    pub(crate) rate_limit: Option<RateLimiterConfig>,
    pub(crate) circuit_breaker: Option<CircuitBreakerConfig>,
    pub(crate) circuit_breaker_on_state_change: Option<CircuitStateChangeCallback>,
    pub(crate) adaptive_concurrency: Option<pipeline_adaptive::AdaptiveConcurrencyConfig>,
    pub(crate) adaptive_on_change: Option<pipeline_adaptive::ConcurrencyChangeCallback>,
    pub(crate) progress: Option<ProgressTrackerOptions>,
    pub(crate) metrics: Option<MetricsTrackerOptions>,
    _marker: PhantomData<fn(T) -> R>,
}

impl<T, R, E> PipelineOptions<T, R, E> {
    /// Starts a builder with spec-default values.
    pub fn builder() -> PipelineOptionsBuilder<T, R, E> {
        PipelineOptionsBuilder::new()
    }

    pub(crate) fn is_transient(&self, error: &PipelineError<E>) -> bool {
        self.is_transient.as_ref().is_some_and(|f| f(error))
    }

    pub(crate) fn on_error(&self, index: u64, error: &PipelineError<E>) -> bool {
        self.on_error.as_ref().map(|f| f(index, error)).unwrap_or(true)
    }

    pub(crate) fn on_fallback(&self, index: u64, error: &PipelineError<E>) -> Option<R> {
        self.on_fallback.as_ref().map(|f| f(index, error))
    }
}

/// Builder for [`PipelineOptions`].
pub struct PipelineOptionsBuilder<T, R, E> {
    max_parallelism: usize,
    per_item_timeout: Option<Duration>,
    max_retries: usize,
    base_delay: Duration,
    backoff_strategy: BackoffStrategy,
    is_transient: Option<TransientPredicate<E>>,
    error_mode: ErrorMode,
    ordered_output: bool,
    channel_capacity: usize,
    on_error: Option<ErrorHook<E>>,
    on_fallback: Option<FallbackHook<R, E>>,
    event_listeners: EventListeners,
    rate_limit: Option<RateLimiterConfig>,
    circuit_breaker: Option<CircuitBreakerConfig>,
    circuit_breaker_on_state_change: Option<CircuitStateChangeCallback>,
    adaptive_concurrency: Option<pipeline_adaptive::AdaptiveConcurrencyConfig>,
    adaptive_on_change: Option<pipeline_adaptive::ConcurrencyChangeCallback>,
    progress: Option<ProgressTrackerOptions>,
    metrics: Option<MetricsTrackerOptions>,
    _marker: PhantomData<fn(T) -> R>,
}

impl<T, R, E> Default for PipelineOptionsBuilder<T, R, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, R, E> PipelineOptionsBuilder<T, R, E> {
    /// Creates a new builder with spec-default values:
    /// `max_parallelism` = detected CPU count, `error_mode = FailFast`,
    /// `ordered_output = false`, `channel_capacity = 1024`,
    /// `max_retries = 0`, `base_delay = 100ms`,
    /// `backoff_strategy = Exponential`.
    pub fn new() -> Self {
        let cpu_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            max_parallelism: cpu_count,
            per_item_timeout: None,
            max_retries: 0,
            base_delay: Duration::from_millis(100),
            backoff_strategy: BackoffStrategy::default(),
            is_transient: None,
            error_mode: ErrorMode::default(),
            ordered_output: false,
            channel_capacity: 1024,
            on_error: None,
            on_fallback: None,
            event_listeners: EventListeners::new(),
            rate_limit: None,
            circuit_breaker: None,
            circuit_breaker_on_state_change: None,
            adaptive_concurrency: None,
            adaptive_on_change: None,
            progress: None,
            metrics: None,
            _marker: PhantomData,
        }
    }

    /// Sets the worker pool size when adaptive concurrency is not enabled.
    pub fn max_parallelism(mut self, n: usize) -> Self {
        self.max_parallelism = n;
        self
    }

    /// Arms a per-attempt timeout.
    pub fn per_item_timeout(mut self, timeout: Duration) -> Self {
        self.per_item_timeout = Some(timeout);
        self
    }

    /// Sets the maximum number of retries per item (not counting the
    /// initial attempt).
    pub fn max_retries(mut self, n: usize) -> Self {
        self.max_retries = n;
        self
    }

    /// Sets the base delay used by the backoff strategy.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the backoff strategy applied between retries.
    pub fn backoff_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Sets the predicate deciding whether an error is worth retrying.
    /// Defaults to "never transient" when unset.
    pub fn is_transient<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&PipelineError<E>) -> bool + Send + Sync + 'static,
    {
        self.is_transient = Some(Arc::new(predicate));
        self
    }

    /// Sets the error mode.
    pub fn error_mode(mut self, mode: ErrorMode) -> Self {
        self.error_mode = mode;
        self
    }

    /// Enables strict index-order output via the reassembly buffer.
    pub fn ordered_output(mut self, ordered: bool) -> Self {
        self.ordered_output = ordered;
        self
    }

    /// Sets the bounded capacity of the input and output channels.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Registers the decision hook invoked on each terminal failure before
    /// mode classification. Returning `false` requests cancellation in
    /// `CollectAndContinue`/`BestEffort` mode (ignored in `FailFast`, which
    /// already cancels).
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(u64, &PipelineError<E>) -> bool + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Registers the fallback-value producer. When set, an item that
    /// exhausts its retries is routed to `Fallback` instead of `Failed`.
    pub fn on_fallback<F>(mut self, f: F) -> Self
    where
        F: Fn(u64, &PipelineError<E>) -> R + Send + Sync + 'static,
    {
        self.on_fallback = Some(Arc::new(f));
        self
    }

    /// Registers a notification hook invoked just before a retry sleep
    /// begins.
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(u64, usize, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let PipelineEvent::Retry {
                index,
                attempt,
                delay,
                ..
            } = event
            {
                f(*index, *attempt, *delay);
            }
        }));
        self
    }

    /// Registers a notification hook invoked on each terminal per-item
    /// failure (after classification).
    pub fn on_terminal_error<F>(mut self, f: F) -> Self
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let PipelineEvent::Error { index, .. } = event {
                f(*index);
            }
        }));
        self
    }

    /// Registers a notification hook invoked when an item is completed via
    /// fallback.
    pub fn on_fallback_notify<F>(mut self, f: F) -> Self
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let PipelineEvent::Fallback { index, .. } = event {
                f(*index);
            }
        }));
        self
    }

    /// Registers a notification hook invoked just before a worker starts
    /// its first attempt on an item.
    pub fn on_start_item<F>(mut self, f: F) -> Self
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let PipelineEvent::StartItem { index, .. } = event {
                f(*index);
            }
        }));
        self
    }

    /// Registers a notification hook invoked when an item reaches a
    /// terminal outcome.
    pub fn on_complete_item<F>(mut self, f: F) -> Self
    where
        F: Fn(u64, bool) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let PipelineEvent::CompleteItem {
                index, succeeded, ..
            } = event
            {
                f(*index, *succeeded);
            }
        }));
        self
    }

    /// Registers a notification hook invoked once per wait episode on the
    /// rate-limit gate.
    pub fn on_throttle<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let PipelineEvent::Throttle { wait, .. } = event {
                f(*wait);
            }
        }));
        self
    }

    /// Registers a notification hook invoked when the input channel is
    /// observed empty.
    pub fn on_drain<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, PipelineEvent::Drain { .. }) {
                f();
            }
        }));
        self
    }

    /// Enables the token-bucket rate-limit admission gate.
    pub fn rate_limit(mut self, config: RateLimiterConfig) -> Self {
        self.rate_limit = Some(config);
        self
    }

    /// Enables the circuit-breaker admission gate, with an optional
    /// state-change notification callback.
    pub fn circuit_breaker(
        mut self,
        config: CircuitBreakerConfig,
        on_state_change: Option<CircuitStateChangeCallback>,
    ) -> Self {
        self.circuit_breaker = Some(config);
        self.circuit_breaker_on_state_change = on_state_change;
        self
    }

    /// Enables the adaptive concurrency controller, with an optional
    /// concurrency-change notification callback. Overrides
    /// `max_parallelism` as the worker-pool sizing source.
    pub fn adaptive_concurrency(
        mut self,
        config: pipeline_adaptive::AdaptiveConcurrencyConfig,
        on_change: Option<pipeline_adaptive::ConcurrencyChangeCallback>,
    ) -> Self {
        self.adaptive_concurrency = Some(config);
        self.adaptive_on_change = on_change;
        self
    }

    /// Enables the progress tracker.
    pub fn progress(mut self, options: ProgressTrackerOptions) -> Self {
        self.progress = Some(options);
        self
    }

    /// Enables the metrics tracker.
    pub fn metrics(mut self, options: MetricsTrackerOptions) -> Self {
        self.metrics = Some(options);
        self
    }

    /// Validates and builds the options record.
    pub fn build(self) -> Result<PipelineOptions<T, R, E>, PipelineError<E>> {
        if self.max_parallelism == 0 {
            return Err(PipelineError::Configuration(
                "max_parallelism must be >= 1".to_string(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(PipelineError::Configuration(
                "channel_capacity must be >= 1".to_string(),
            ));
        }

        Ok(PipelineOptions {
            max_parallelism: self.max_parallelism,
            per_item_timeout: self.per_item_timeout,
            max_retries: self.max_retries,
            base_delay: self.base_delay,
            backoff_strategy: self.backoff_strategy,
            is_transient: self.is_transient,
            error_mode: self.error_mode,
            ordered_output: self.ordered_output,
            channel_capacity: self.channel_capacity,
            on_error: self.on_error,
            on_fallback: self.on_fallback,
            event_listeners: self.event_listeners,
            rate_limit: self.rate_limit,
            circuit_breaker: self.circuit_breaker,
            circuit_breaker_on_state_change: self.circuit_breaker_on_state_change,
            adaptive_concurrency: self.adaptive_concurrency,
            adaptive_on_change: self.adaptive_on_change,
            progress: self.progress,
            metrics: self.metrics,
            _marker: PhantomData,
        })
    }
}
