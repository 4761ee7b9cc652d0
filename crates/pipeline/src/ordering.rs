//! Reassembly buffer for `ordered_output` mode.
//!
//! A hashmap keyed by index plus a "next expected" counter is adequate
//! here: arrivals are bounded and closely clustered around
//! `next_to_yield` because the input channel and worker pool are both
//! bounded, so a min-heap buys nothing a hashmap doesn't already give us.

use crate::envelope::{Outcome, ResultEnvelope};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Buffers out-of-order worker results and releases them in strict
/// index order.
///
/// Memory is bounded by `O(max_parallelism + channel_capacity)`: at most
/// one in-flight result per worker plus whatever has accumulated in the
/// bounded output channel can be sitting here at once.
pub(crate) struct OrderingBuffer<R, E> {
    next_to_yield: u64,
    pending: HashMap<u64, ResultEnvelope<R, E>>,
}

impl<R, E> OrderingBuffer<R, E> {
    pub(crate) fn new() -> Self {
        Self {
            next_to_yield: 0,
            pending: HashMap::new(),
        }
    }

    /// Accepts one arriving result. Returns every result now ready to be
    /// yielded, in strict index order (possibly more than one, if this
    /// arrival fills a gap).
    ///
    /// A `Skipped` outcome advances `next_to_yield` without being handed
    /// back to the caller for emission, matching "Skipped indices in
    /// BestEffort mode advance next_to_yield without emission".
    pub(crate) fn accept(&mut self, result: ResultEnvelope<R, E>) -> Vec<ResultEnvelope<R, E>> {
        self.pending.insert(result.index, result);

        let mut ready = Vec::new();
        while let Some(result) = self.pending.remove(&self.next_to_yield) {
            self.next_to_yield += 1;
            if !matches!(result.outcome, Outcome::Skipped) {
                ready.push(result);
            }
        }
        ready
    }
}

/// Runs the reordering stage: consumes worker results as they arrive and
/// forwards them to `tx` in strict index order. Ends (dropping `tx`) once
/// `rx` closes or `cancel` fires; any results still buffered waiting for a
/// gap to fill are discarded on cancellation rather than flushed.
pub(crate) async fn run_ordering_stage<R, E>(
    rx: async_channel::Receiver<ResultEnvelope<R, E>>,
    tx: async_channel::Sender<ResultEnvelope<R, E>>,
    cancel: CancellationToken,
) where
    R: Send + 'static,
    E: Send + 'static,
{
    let mut buffer = OrderingBuffer::new();
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            item = rx.recv() => {
                match item {
                    Ok(result) => {
                        for ready in buffer.accept(result) {
                            if tx.send(ready).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(_) => return,
                }
            }
        }
    }
}
