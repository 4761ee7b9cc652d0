//! The public driver type: `Pipeline<T, R, E>`.
//!
//! A thin driver over a fat engine: this struct owns nothing but validated
//! options and a telemetry handle, and simply spawns [`crate::engine`] for
//! each call. All three consumption shapes share one engine run; they only
//! differ in how they fold [`ResultEnvelope`]s into their return type.

use crate::envelope::Outcome;
use crate::engine;
use crate::options::{ErrorMode, PipelineOptions};
use crate::telemetry::ProcessCounters;
use futures::Stream;
use pipeline_core::PipelineError;
use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A configured, reusable pipeline: bounded-concurrency map/for-each over a
/// sequence of `T`, producing `R` or a classified [`PipelineError<E>`].
pub struct Pipeline<T, R, E> {
    options: Arc<PipelineOptions<T, R, E>>,
    telemetry: Arc<ProcessCounters>,
}

impl<T, R, E> Pipeline<T, R, E>
where
    T: Clone + Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
{
    /// Builds a pipeline backed by the shared, process-wide telemetry
    /// counters: one shared process instance by default.
    pub fn new(options: PipelineOptions<T, R, E>) -> Self {
        Self {
            options: Arc::new(options),
            telemetry: ProcessCounters::shared(),
        }
    }

    /// Builds a pipeline backed by an independent telemetry instance,
    /// useful for tests or for isolating unrelated pipelines' counters.
    pub fn with_telemetry(options: PipelineOptions<T, R, E>, telemetry: Arc<ProcessCounters>) -> Self {
        Self {
            options: Arc::new(options),
            telemetry,
        }
    }

    fn total_items<S>(source: &S) -> Option<u64>
    where
        S: Stream<Item = T>,
    {
        let (lower, upper) = source.size_hint();
        (upper == Some(lower)).then_some(lower as u64)
    }

    /// Runs the pipeline over `source`, collecting every successful result
    /// into a `Vec<R>` in the order the output stage yields them (source
    /// order if `ordered_output` is set, arrival order otherwise).
    ///
    /// `FailFast` returns the first terminal error encountered.
    /// `CollectAndContinue` returns [`PipelineError::Aggregate`] if any item
    /// failed. `BestEffort` always returns `Ok`, silently omitting failed
    /// items. Any mode returns [`PipelineError::Cancelled`] if `cancel`
    /// fires before the run completes.
    pub async fn run_to_vec<S, F, Fut>(
        &self,
        source: S,
        f: F,
        cancel: CancellationToken,
    ) -> Result<Vec<R>, PipelineError<E>>
    where
        S: Stream<Item = T> + Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        let total_items = Self::total_items(&source);
        let handle = engine::spawn(
            source,
            f,
            self.options.clone(),
            self.telemetry.clone(),
            cancel,
            total_items,
        );

        let mut values = Vec::new();
        let mut aggregate_errors = Vec::new();

        while let Ok(result) = handle.results.recv().await {
            match result.into_outcome() {
                Outcome::Success(value) => values.push(value),
                Outcome::Skipped => {}
                Outcome::Failure { error, .. } => match self.options.error_mode {
                    ErrorMode::FailFast => {
                        debug_assert!(
                            false,
                            "FailFast surfaces its error via RunHandle::first_error, not the results channel"
                        );
                    }
                    ErrorMode::CollectAndContinue => aggregate_errors.push(error),
                    ErrorMode::BestEffort => {
                        debug_assert!(false, "BestEffort never emits Failure");
                    }
                },
            }
        }

        if handle.cancelled_externally.load(Ordering::SeqCst) {
            return Err(PipelineError::Cancelled);
        }
        if let Some((_, error)) = handle.first_error.lock().unwrap().take() {
            return Err(error);
        }
        if !aggregate_errors.is_empty() {
            return Err(PipelineError::Aggregate(aggregate_errors));
        }
        Ok(values)
    }

    /// Runs the pipeline over `source`, yielding each item's result as soon
    /// as the output stage has it. `FailFast` yields the terminal error and
    /// ends the stream; `CollectAndContinue` yields every individual
    /// `Ok`/`Err` in turn; `BestEffort` yields only successes, silently
    /// omitting failed items. A trailing
    /// `Err(PipelineError::Cancelled)` is yielded if `cancel` fired.
    pub fn run_stream<S, F, Fut>(
        &self,
        source: S,
        f: F,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<R, PipelineError<E>>>
    where
        S: Stream<Item = T> + Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        let total_items = Self::total_items(&source);
        let options = self.options.clone();
        let telemetry = self.telemetry.clone();

        async_stream::stream! {
            let handle = engine::spawn(source, f, options.clone(), telemetry, cancel, total_items);

            loop {
                match handle.results.recv().await {
                    Ok(result) => match result.into_outcome() {
                        Outcome::Success(value) => yield Ok(value),
                        Outcome::Skipped => {}
                        Outcome::Failure { error, .. } => {
                            debug_assert!(
                                !matches!(options.error_mode, ErrorMode::FailFast),
                                "FailFast surfaces its error via RunHandle::first_error, not the results channel"
                            );
                            yield Err(error);
                        }
                    },
                    Err(_) => break,
                }
            }

            if let Some((_, error)) = handle.first_error.lock().unwrap().take() {
                yield Err(error);
            } else if handle.cancelled_externally.load(Ordering::SeqCst) {
                yield Err(PipelineError::Cancelled);
            }
        }
    }

    /// Runs the pipeline over `source`, invoking `on_item(index, result)`
    /// for every non-skipped item as its outcome becomes available. Returns
    /// `Err(PipelineError::Cancelled)` if `cancel` fired; otherwise `Ok(())`
    /// regardless of error mode, since per-item failures (including the one
    /// that triggers a `FailFast` abort) are already delivered to the
    /// callback rather than duplicated in the return value.
    pub async fn for_each<S, F, Fut, C>(
        &self,
        source: S,
        f: F,
        cancel: CancellationToken,
        mut on_item: C,
    ) -> Result<(), PipelineError<E>>
    where
        S: Stream<Item = T> + Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        C: FnMut(u64, Result<R, PipelineError<E>>),
    {
        let total_items = Self::total_items(&source);
        let handle = engine::spawn(
            source,
            f,
            self.options.clone(),
            self.telemetry.clone(),
            cancel,
            total_items,
        );

        while let Ok(result) = handle.results.recv().await {
            let index = result.index();
            match result.into_outcome() {
                Outcome::Success(value) => on_item(index, Ok(value)),
                Outcome::Skipped => {}
                Outcome::Failure { error, .. } => on_item(index, Err(error)),
            }
        }

        if let Some((index, error)) = handle.first_error.lock().unwrap().take() {
            on_item(index, Err(error));
        }

        if handle.cancelled_externally.load(Ordering::SeqCst) {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }
}
