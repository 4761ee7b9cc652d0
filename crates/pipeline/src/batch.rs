//! Batching variant: groups a stream of `T` into `Vec<T>`
//! batches, then runs the core engine over batches instead of individual
//! items. `BatchedPipeline<T, R, E>` is a thin wrapper around
//! `Pipeline<Vec<T>, R, E>` — batching only changes what counts as "one
//! item" to the engine, not any of its resilience or ordering semantics.

use crate::options::PipelineOptions;
use crate::pipeline::Pipeline;
use futures::Stream;
use pipeline_core::PipelineError;
use std::future::Future;
use std::time::Duration;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

/// Groups `source` into `Vec<T>` batches of at most `batch_size` elements.
///
/// With `batch_timeout: None`, a batch accumulates until `batch_size` is
/// reached or the source is exhausted (size-only). With a timeout set, the
/// timer starts on the first item of a new batch and also flushes the
/// batch early if it elapses first (size + timeout). The final batch, if
/// non-empty, is always flushed when the source ends; empty batches are
/// never emitted.
fn batch_stream<T, S>(
    source: S,
    batch_size: usize,
    batch_timeout: Option<Duration>,
) -> impl Stream<Item = Vec<T>>
where
    T: Send + 'static,
    S: Stream<Item = T> + Send + 'static,
{
    async_stream::stream! {
        tokio::pin!(source);

        loop {
            let Some(first) = source.next().await else { break };
            let mut batch = Vec::with_capacity(batch_size);
            batch.push(first);

            match batch_timeout {
                None => {
                    while batch.len() < batch_size {
                        match source.next().await {
                            Some(item) => batch.push(item),
                            None => break,
                        }
                    }
                }
                Some(timeout) => {
                    let deadline = tokio::time::sleep(timeout);
                    tokio::pin!(deadline);
                    while batch.len() < batch_size {
                        tokio::select! {
                            biased;
                            _ = &mut deadline => break,
                            item = source.next() => match item {
                                Some(item) => batch.push(item),
                                None => break,
                            }
                        }
                    }
                }
            }

            yield batch;
        }
    }
}

/// Runs the core pipeline over fixed-size (or size+timeout) batches of an
/// input sequence, rather than individual items.
pub struct BatchedPipeline<T, R, E> {
    inner: Pipeline<Vec<T>, R, E>,
    batch_size: usize,
    batch_timeout: Option<Duration>,
}

impl<T, R, E> BatchedPipeline<T, R, E>
where
    T: Clone + Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
{
    /// Builds a size-only batching pipeline: batches flush once they reach
    /// `batch_size` or the source ends.
    pub fn new(options: PipelineOptions<Vec<T>, R, E>, batch_size: usize) -> Result<Self, PipelineError<E>> {
        Self::with_timeout(options, batch_size, None)
    }

    /// Builds a size+timeout batching pipeline: a batch also flushes once
    /// `batch_timeout` elapses since its first element arrived.
    pub fn with_timeout(
        options: PipelineOptions<Vec<T>, R, E>,
        batch_size: usize,
        batch_timeout: Option<Duration>,
    ) -> Result<Self, PipelineError<E>> {
        if batch_size == 0 {
            return Err(PipelineError::Configuration(
                "batch_size must be >= 1".to_string(),
            ));
        }
        Ok(Self {
            inner: Pipeline::new(options),
            batch_size,
            batch_timeout,
        })
    }

    /// Batches `source`, then maps each batch to `R`, collecting every
    /// result into a list.
    pub async fn run_to_vec<S, F, Fut>(
        &self,
        source: S,
        f: F,
        cancel: CancellationToken,
    ) -> Result<Vec<R>, PipelineError<E>>
    where
        S: Stream<Item = T> + Send + 'static,
        F: Fn(Vec<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        let batches = batch_stream(source, self.batch_size, self.batch_timeout);
        self.inner.run_to_vec(batches, f, cancel).await
    }

    /// Batches `source`, then maps each batch to `R`, streaming results as
    /// each batch completes.
    pub fn run_stream<S, F, Fut>(
        &self,
        source: S,
        f: F,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<R, PipelineError<E>>>
    where
        S: Stream<Item = T> + Send + 'static,
        F: Fn(Vec<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        let batches = batch_stream(source, self.batch_size, self.batch_timeout);
        self.inner.run_stream(batches, f, cancel)
    }
}
