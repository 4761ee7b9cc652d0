//! Wires the writer, worker pool, ordering stage, and trackers together for
//! one pipeline run.

use crate::envelope::{Envelope, ResultEnvelope};
use pipeline_core::PipelineError;
use crate::gates::Gates;
use crate::options::PipelineOptions;
use crate::ordering::run_ordering_stage;
use crate::stats::RunCounters;
use crate::telemetry::ProcessCounters;
use crate::worker::{spawn_adaptive_pool, spawn_fixed_pool, WorkerShared};
use crate::writer::run_writer;
use futures::Stream;
use std::future::Future;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything a consumption shape (`run_to_vec`, `run_stream`, `for_each`)
/// needs to read the outcome of one run.
pub(crate) struct RunHandle<R, E> {
    pub(crate) results: async_channel::Receiver<ResultEnvelope<R, E>>,
    /// Fires when either the caller's own token or an internal `FailFast`
    /// abort cancels the run. `FailFast`'s own terminal `Failure` result is
    /// still delivered through `results` before this matters at the
    /// boundary; this token's purpose is purely to let a consumer stop
    /// polling promptly.
    pub(crate) internal_cancel: CancellationToken,
    /// Distinguishes "the caller asked us to stop" / "a hook asked us to
    /// stop" from an ordinary `FailFast` abort, so the boundary can decide
    /// whether to surface `PipelineError::Cancelled` (this flag) or the
    /// first collected `Failure` (plain `FailFast`, flag unset).
    pub(crate) cancelled_externally: Arc<std::sync::atomic::AtomicBool>,
    /// The `(index, error)` of the first `FailFast` terminal failure, if
    /// any. Populated directly by the worker that triggered the abort,
    /// independent of `results`, so an `ordered_output` run can never drop
    /// it in the ordering stage's cancellation race.
    pub(crate) first_error: Arc<std::sync::Mutex<Option<(u64, PipelineError<E>)>>>,
}

/// Spawns the writer, worker pool (fixed or adaptively sized), optional
/// ordering stage, and optional progress/metrics trackers for one run.
/// Returns a handle the caller drives to completion.
pub(crate) fn spawn<T, R, E, F, Fut, S>(
    source: S,
    f: F,
    options: Arc<PipelineOptions<T, R, E>>,
    telemetry: Arc<ProcessCounters>,
    caller_cancel: CancellationToken,
    total_items: Option<u64>,
) -> RunHandle<R, E>
where
    T: Clone + Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    S: Stream<Item = T> + Send + 'static,
{
    let internal_cancel = caller_cancel.child_token();
    let cancelled_externally = Arc::new(std::sync::atomic::AtomicBool::new(false));

    // Keep the flag in sync with the caller's own token without letting our
    // internal FailFast/hook-triggered cancellations leak back upward.
    {
        let caller_cancel = caller_cancel.clone();
        let cancelled_externally = cancelled_externally.clone();
        let internal_cancel = internal_cancel.clone();
        tokio::spawn(async move {
            caller_cancel.cancelled().await;
            cancelled_externally.store(true, std::sync::atomic::Ordering::SeqCst);
            internal_cancel.cancel();
        });
    }

    let counters = Arc::new(RunCounters::new(total_items));
    let gates = Arc::new(Gates::build(&options));
    let f = Arc::new(f);
    let first_error = Arc::new(std::sync::Mutex::new(None));

    let (input_tx, input_rx) = async_channel::bounded::<Envelope<T>>(options.channel_capacity);
    let (output_tx, output_rx) =
        async_channel::bounded::<ResultEnvelope<R, E>>(options.channel_capacity);

    tokio::spawn(run_writer(
        source,
        input_tx,
        counters.clone(),
        internal_cancel.clone(),
    ));

    let shared = Arc::new(WorkerShared {
        options: options.clone(),
        gates: gates.clone(),
        counters: counters.clone(),
        telemetry: telemetry.clone(),
        executing: Arc::new(AtomicUsize::new(0)),
        cancel: internal_cancel.clone(),
        hook_cancelled: cancelled_externally.clone(),
        first_error: first_error.clone(),
        f,
    });

    match &options.adaptive_concurrency {
        Some(adaptive_config) => {
            spawn_adaptive_pool(
                adaptive_config.sample_interval(),
                input_rx,
                output_tx.clone(),
                shared,
            );
        }
        None => {
            spawn_fixed_pool(options.max_parallelism, input_rx, output_tx.clone(), shared);
        }
    }
    drop(output_tx);

    if let Some(progress_options) = options.progress.clone() {
        tokio::spawn(crate::progress::run_progress_loop(
            progress_options,
            counters.clone(),
            internal_cancel.clone(),
        ));
    }
    if let Some(metrics_options) = options.metrics.clone() {
        tokio::spawn(crate::metrics_tracker::run_metrics_loop(
            metrics_options,
            counters.clone(),
            internal_cancel.clone(),
        ));
    }

    let results = if options.ordered_output {
        let (final_tx, final_rx) =
            async_channel::bounded::<ResultEnvelope<R, E>>(options.channel_capacity);
        tokio::spawn(run_ordering_stage(
            output_rx,
            final_tx,
            internal_cancel.clone(),
        ));
        final_rx
    } else {
        output_rx
    };

    RunHandle {
        results,
        internal_cancel,
        cancelled_externally,
        first_error,
    }
}
