//! Input stage / writer.
//!
//! Consumes the source stream, assigns each item its source-order index,
//! and pushes `(index, value)` envelopes into the bounded input channel.
//! `async_channel::Sender::send` suspends once the channel is full, which
//! is exactly the backpressure the finite-source ("read eagerly until
//! full") and streaming-source ("one item at a time, paced by demand")
//! contracts both reduce to: a plain bounded-channel send either way.

use crate::envelope::Envelope;
use crate::stats::RunCounters;
use futures::Stream;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

/// Runs the writer to completion: reads `source` to exhaustion (or until
/// `cancel` fires), assigning indices `0, 1, 2, …` in read order. Closes
/// the input channel exactly once, by dropping `tx` when this future
/// returns.
pub(crate) async fn run_writer<T, S>(
    source: S,
    tx: async_channel::Sender<Envelope<T>>,
    counters: Arc<RunCounters>,
    cancel: CancellationToken,
) where
    T: Send + 'static,
    S: Stream<Item = T> + Send + 'static,
{
    tokio::pin!(source);
    let mut index: u64 = 0;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            item = source.next() => item,
        };

        let Some(value) = next else { break };
        let envelope = Envelope::new(index, value);
        index += 1;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = tx.send(envelope) => {
                if result.is_err() {
                    // Every receiver (worker) has been dropped; nothing left
                    // to write to.
                    break;
                }
            }
        }
        counters.set_queue_depth(tx.len());
    }
    // `tx` drops here, closing the input channel for every worker's
    // receiver clone.
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Envelope as E;

    #[tokio::test]
    async fn assigns_dense_indices_in_source_order() {
        let (tx, rx) = async_channel::bounded::<E<i32>>(4);
        let counters = Arc::new(RunCounters::new(Some(3)));
        let cancel = CancellationToken::new();
        let source = tokio_stream::iter(vec![10, 20, 30]);

        run_writer(source, tx, counters, cancel).await;

        let mut received = Vec::new();
        while let Ok(envelope) = rx.recv().await {
            received.push((envelope.index(), *envelope.value()));
        }
        assert_eq!(received, vec![(0, 10), (1, 20), (2, 30)]);
    }

    #[tokio::test]
    async fn stops_reading_on_cancellation() {
        let (tx, rx) = async_channel::bounded::<E<i32>>(1);
        let counters = Arc::new(RunCounters::new(None));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let source = tokio_stream::iter(vec![1, 2, 3]);

        run_writer(source, tx, counters, cancel).await;
        // Channel may have zero or one buffered item depending on timing,
        // but the writer must not hang waiting on a cancelled send.
        drop(rx);
    }

    #[tokio::test]
    async fn closes_channel_exactly_once_on_exhaustion() {
        let (tx, rx) = async_channel::bounded::<E<i32>>(4);
        let counters = Arc::new(RunCounters::new(Some(0)));
        let cancel = CancellationToken::new();
        let source = tokio_stream::iter(Vec::<i32>::new());

        run_writer(source, tx, counters, cancel).await;
        assert!(rx.recv().await.is_err());
    }
}
