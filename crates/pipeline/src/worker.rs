//! Per-item state machine and worker pool.
//!
//! Each worker task loops: dequeue an envelope, run it through the
//! `GateWait -> Executing -> Classify -> Backoff|Fallback|Failed` cycle, and
//! forward the terminal [`ResultEnvelope`] to the output stage. Multiple
//! workers share one `async_channel::Receiver` clone apiece rather than one
//! receiver behind a `Mutex`, so a worker blocked in `recv().await` never
//! holds a lock the others need.

use crate::envelope::{Envelope, Outcome, ResultEnvelope};
use crate::gates::Gates;
use crate::options::{ErrorMode, PipelineOptions};
use crate::stats::RunCounters;
use crate::telemetry::ProcessCounters;
use crate::backoff::BackoffState;
use pipeline_core::events::PipelineEvent;
use pipeline_core::PipelineError;
use pipeline_ratelimiter::AcquireOutcome;
use pipeline_circuitbreaker::AdmitOutcome;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Coordination state shared by every worker in an adaptively-sized pool,
/// used to grow and shrink the live worker count without a central handle
/// registry: growing just spawns another task; shrinking posts a request
/// that any worker may claim the next time it is about to dequeue.
pub(crate) struct PoolControl {
    pub(crate) live_workers: Arc<AtomicUsize>,
    pub(crate) shrink_request: Arc<AtomicUsize>,
}

impl PoolControl {
    fn try_claim_shrink(&self) -> bool {
        let mut current = self.shrink_request.load(Ordering::SeqCst);
        while current > 0 {
            match self.shrink_request.compare_exchange(
                current,
                current - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    self.live_workers.fetch_sub(1, Ordering::SeqCst);
                    return true;
                }
                Err(actual) => current = actual,
            }
        }
        false
    }
}

/// Outcome of processing one item to the point where the worker loop may
/// move on to the next.
enum ItemDisposition<R, E> {
    /// A result is ready to be forwarded to the output stage.
    Emit(ResultEnvelope<R, E>),
    /// The item was abandoned mid-flight because the pipeline cancelled;
    /// in-flight partial results are discarded, so nothing is emitted for
    /// it.
    Dropped,
}

/// Everything a worker needs that does not change per item.
pub(crate) struct WorkerShared<T, R, E, F> {
    pub(crate) options: Arc<PipelineOptions<T, R, E>>,
    pub(crate) gates: Arc<Gates>,
    pub(crate) counters: Arc<RunCounters>,
    pub(crate) telemetry: Arc<ProcessCounters>,
    pub(crate) executing: Arc<AtomicUsize>,
    pub(crate) cancel: CancellationToken,
    /// Set when `on_error` returns `false` in `CollectAndContinue` or
    /// `BestEffort` mode, so the boundary surfaces `PipelineError::Cancelled`
    /// instead of an aggregate or a silently-truncated success: cancellation
    /// always surfaces as a single cancellation error, regardless of mode.
    /// Shares the same `Arc` as the caller-cancellation flag in
    /// [`crate::engine::RunHandle`]; a `FailFast` abort does not set it,
    /// since `FailFast` surfaces the original error instead.
    pub(crate) hook_cancelled: Arc<std::sync::atomic::AtomicBool>,
    /// The `(index, error)` of the first `FailFast` terminal failure, set
    /// directly here rather than threaded through the results channel: the
    /// ordering stage's `cancel`-vs-`recv` race (both driven by the same
    /// token this failure triggers) can otherwise drop the very `Failure`
    /// that caused the cancellation before it reaches the consumer. Shares
    /// the same `Arc` as [`crate::engine::RunHandle::first_error`].
    pub(crate) first_error: Arc<std::sync::Mutex<Option<(u64, PipelineError<E>)>>>,
    pub(crate) f: Arc<F>,
}

/// Runs one worker task to completion: drains `input_rx` until it closes or
/// `cancel` fires, forwarding each terminal result to `output_tx`.
pub(crate) async fn run_worker_loop<T, R, E, F, Fut>(
    input_rx: async_channel::Receiver<Envelope<T>>,
    output_tx: async_channel::Sender<ResultEnvelope<R, E>>,
    shared: Arc<WorkerShared<T, R, E, F>>,
    pool: Option<Arc<PoolControl>>,
) where
    T: Clone + Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    loop {
        if shared.cancel.is_cancelled() {
            break;
        }
        if let Some(pool) = &pool {
            if pool.try_claim_shrink() {
                break;
            }
        }

        if input_rx.is_empty() {
            shared.counters.record_drain();
            shared.telemetry.record_drain();
            shared
                .options
                .event_listeners
                .emit(&PipelineEvent::Drain {
                    timestamp: Instant::now(),
                });
        }

        let envelope = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => break,
            item = input_rx.recv() => match item {
                Ok(envelope) => envelope,
                Err(_) => break,
            },
        };
        shared.counters.set_queue_depth(input_rx.len() as i64);

        shared.executing.fetch_add(1, Ordering::Relaxed);
        shared
            .counters
            .set_active_workers(shared.executing.load(Ordering::Relaxed));

        let disposition = run_item(envelope, &shared).await;

        shared.executing.fetch_sub(1, Ordering::Relaxed);
        shared
            .counters
            .set_active_workers(shared.executing.load(Ordering::Relaxed));

        match disposition {
            ItemDisposition::Emit(result) => {
                if output_tx.send(result).await.is_err() {
                    break;
                }
            }
            ItemDisposition::Dropped => {}
        }
    }
}

async fn run_item<T, R, E, F, Fut>(
    mut envelope: Envelope<T>,
    shared: &WorkerShared<T, R, E, F>,
) -> ItemDisposition<R, E>
where
    T: Clone,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let index = envelope.index;
    let value = envelope.value.clone();
    let options = &shared.options;
    let gates = &shared.gates;
    let counters = &shared.counters;
    let telemetry = &shared.telemetry;
    let cancel = &shared.cancel;

    counters.record_item_started();
    telemetry.record_item_started();
    options.event_listeners.emit(&PipelineEvent::StartItem {
        index,
        timestamp: Instant::now(),
    });

    let mut backoff = BackoffState::new(options.backoff_strategy, options.base_delay);

    loop {
        if cancel.is_cancelled() {
            return ItemDisposition::Dropped;
        }

        if let Some(limiter) = &gates.rate_limit {
            let outcome = limiter
                .acquire(cancel, |wait| {
                    counters.record_throttle();
                    telemetry.record_throttle();
                    options.event_listeners.emit(&PipelineEvent::Throttle {
                        timestamp: Instant::now(),
                        wait,
                    });
                })
                .await;
            if outcome == AcquireOutcome::Cancelled {
                return ItemDisposition::Dropped;
            }
        }

        if let Some(breaker) = &gates.circuit_breaker {
            if breaker.try_acquire() == AdmitOutcome::Rejected {
                let error = PipelineError::CircuitOpen { name: None };
                return terminal_or_fallback(
                    index,
                    error,
                    options,
                    counters,
                    telemetry,
                    cancel,
                    &shared.hook_cancelled,
                    &shared.first_error,
                );
            }
        }

        let adaptive_permit = gates.adaptive.as_ref().map(|a| a.acquire());

        let attempt_start = Instant::now();
        let attempt_result: Result<R, PipelineError<E>> = match options.per_item_timeout {
            Some(timeout) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(PipelineError::Cancelled),
                    _ = tokio::time::sleep(timeout) => Err(PipelineError::Timeout(timeout)),
                    result = (shared.f)(value.clone()) => result.map_err(PipelineError::Application),
                }
            }
            None => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(PipelineError::Cancelled),
                    result = (shared.f)(value.clone()) => result.map_err(PipelineError::Application),
                }
            }
        };
        let latency = attempt_start.elapsed();

        if let Some(breaker) = &gates.circuit_breaker {
            if attempt_result.is_ok() {
                breaker.record_success();
            } else {
                breaker.record_failure();
            }
        }
        if let Some(adaptive) = &gates.adaptive {
            if let Some(permit) = adaptive_permit {
                adaptive.release(permit, latency, attempt_result.is_ok());
            }
        }

        match attempt_result {
            Ok(output) => {
                counters.record_item_completed();
                telemetry.record_item_completed();
                options.event_listeners.emit(&PipelineEvent::CompleteItem {
                    index,
                    timestamp: Instant::now(),
                    succeeded: true,
                });
                return ItemDisposition::Emit(ResultEnvelope::new(index, Outcome::Success(output)));
            }
            Err(error) => {
                if matches!(error, PipelineError::Cancelled) {
                    return ItemDisposition::Dropped;
                }

                if envelope.attempts_so_far < options.max_retries && options.is_transient(&error) {
                    let attempt_number = envelope.attempts_so_far + 1;
                    let delay = backoff.next_delay(attempt_number);
                    counters.record_retry();
                    telemetry.record_retry();
                    options.event_listeners.emit(&PipelineEvent::Retry {
                        index,
                        attempt: attempt_number,
                        delay,
                        timestamp: Instant::now(),
                    });

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return ItemDisposition::Dropped,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    envelope.attempts_so_far += 1;
                    continue;
                }

                return terminal_or_fallback(
                    index,
                    error,
                    options,
                    counters,
                    telemetry,
                    cancel,
                    &shared.hook_cancelled,
                    &shared.first_error,
                );
            }
        }
    }
}

/// Routes a terminal or gate-rejected error through `on_fallback` (if
/// configured) or the configured [`ErrorMode`]; a fallback always takes
/// precedence over the error mode.
fn terminal_or_fallback<T, R, E>(
    index: u64,
    error: PipelineError<E>,
    options: &PipelineOptions<T, R, E>,
    counters: &RunCounters,
    telemetry: &ProcessCounters,
    cancel: &CancellationToken,
    hook_cancelled: &Arc<std::sync::atomic::AtomicBool>,
    first_error: &Arc<std::sync::Mutex<Option<(u64, PipelineError<E>)>>>,
) -> ItemDisposition<R, E> {
    if let Some(value) = options.on_fallback(index, &error) {
        options.event_listeners.emit(&PipelineEvent::Fallback {
            index,
            timestamp: Instant::now(),
        });
        counters.record_item_completed();
        telemetry.record_item_completed();
        options.event_listeners.emit(&PipelineEvent::CompleteItem {
            index,
            timestamp: Instant::now(),
            succeeded: true,
        });
        return ItemDisposition::Emit(ResultEnvelope::new(index, Outcome::Success(value)));
    }

    options.event_listeners.emit(&PipelineEvent::Error {
        index,
        timestamp: Instant::now(),
    });
    let keep_going = options.on_error(index, &error);
    counters.record_error();
    telemetry.record_failure();
    options.event_listeners.emit(&PipelineEvent::CompleteItem {
        index,
        timestamp: Instant::now(),
        succeeded: false,
    });

    match options.error_mode {
        ErrorMode::FailFast => {
            let mut slot = first_error.lock().unwrap();
            if slot.is_none() {
                *slot = Some((index, error));
            }
            drop(slot);
            cancel.cancel();
            ItemDisposition::Dropped
        }
        ErrorMode::CollectAndContinue => {
            if !keep_going {
                hook_cancelled.store(true, Ordering::SeqCst);
                cancel.cancel();
            }
            ItemDisposition::Emit(ResultEnvelope::new(
                index,
                Outcome::Failure {
                    error,
                    terminal: true,
                },
            ))
        }
        ErrorMode::BestEffort => {
            if !keep_going {
                hook_cancelled.store(true, Ordering::SeqCst);
                cancel.cancel();
            }
            ItemDisposition::Emit(ResultEnvelope::new(index, Outcome::Skipped))
        }
    }
}

/// Spawns a fixed-size worker pool: `count` tasks, none of which ever
/// shrink or grow.
pub(crate) fn spawn_fixed_pool<T, R, E, F, Fut>(
    count: usize,
    input_rx: async_channel::Receiver<Envelope<T>>,
    output_tx: async_channel::Sender<ResultEnvelope<R, E>>,
    shared: Arc<WorkerShared<T, R, E, F>>,
) where
    T: Clone + Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    for _ in 0..count {
        tokio::spawn(run_worker_loop(
            input_rx.clone(),
            output_tx.clone(),
            shared.clone(),
            None,
        ));
    }
}

/// Spawns an adaptively-sized worker pool: the controller's own sampling
/// loop (driven by its configured `sample_interval`, independent of the
/// `sample_interval` argument below), plus a supervisor task that
/// reconciles the live worker count against
/// `AdaptiveConcurrencyController::current()` on every `sample_interval`
/// tick: growing spawns new workers; shrinking lets excess workers finish
/// their current item, then exit.
pub(crate) fn spawn_adaptive_pool<T, R, E, F, Fut>(
    sample_interval: std::time::Duration,
    input_rx: async_channel::Receiver<Envelope<T>>,
    output_tx: async_channel::Sender<ResultEnvelope<R, E>>,
    shared: Arc<WorkerShared<T, R, E, F>>,
) where
    T: Clone + Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    let controller = shared
        .gates
        .adaptive
        .clone()
        .expect("spawn_adaptive_pool requires an adaptive concurrency gate");

    tokio::spawn(controller.clone().run_sampling_loop(shared.cancel.clone()));

    let pool = Arc::new(PoolControl {
        live_workers: Arc::new(AtomicUsize::new(0)),
        shrink_request: Arc::new(AtomicUsize::new(0)),
    });

    let spawn_one = {
        let input_rx = input_rx.clone();
        let output_tx = output_tx.clone();
        let shared = shared.clone();
        let pool = pool.clone();
        move || {
            pool.live_workers.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(run_worker_loop(
                input_rx.clone(),
                output_tx.clone(),
                shared.clone(),
                Some(pool.clone()),
            ));
        }
    };

    for _ in 0..controller.current() {
        spawn_one();
    }

    let cancel = shared.cancel.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sample_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = interval.tick() => {
                    let desired = controller.current();
                    let live = pool.live_workers.load(Ordering::SeqCst);
                    if desired > live {
                        for _ in 0..(desired - live) {
                            spawn_one();
                        }
                    } else if live > desired {
                        pool.shrink_request.fetch_add(live - desired, Ordering::SeqCst);
                    }
                }
            }
        }
    });
}
