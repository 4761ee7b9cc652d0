//! Event system used by every hook in the pipeline engine.
//!
//! A small trait-object-based listener registry. Panics in a listener are
//! caught here so one broken `on_retry` callback cannot abort in-flight
//! work.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Every observable moment the engine can notify listeners about.
///
/// This is the backing representation for the `on_retry`, `on_error`,
/// `on_fallback`, `on_start_item`, `on_complete_item`, `on_throttle`, and
/// `on_drain` hooks described in the options record: each hook registered by
/// a caller is really a [`EventListener`] filtering on one `PipelineEvent`
/// variant.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// A worker is about to attempt an item for the first time.
    StartItem { index: u64, timestamp: Instant },
    /// An item reached a terminal outcome (success or failure).
    CompleteItem {
        index: u64,
        timestamp: Instant,
        succeeded: bool,
    },
    /// A retry is about to occur after a failed attempt.
    Retry {
        index: u64,
        attempt: usize,
        delay: Duration,
        timestamp: Instant,
    },
    /// An item reached a terminal failure (post-classification).
    Error { index: u64, timestamp: Instant },
    /// A fallback value was produced for an item that exhausted retries.
    Fallback { index: u64, timestamp: Instant },
    /// A worker had to wait on the rate-limit gate.
    Throttle {
        timestamp: Instant,
        wait: Duration,
    },
    /// The input channel was observed empty.
    Drain { timestamp: Instant },
}

impl PipelineEvent {
    /// When this event occurred.
    pub fn timestamp(&self) -> Instant {
        match self {
            PipelineEvent::StartItem { timestamp, .. }
            | PipelineEvent::CompleteItem { timestamp, .. }
            | PipelineEvent::Retry { timestamp, .. }
            | PipelineEvent::Error { timestamp, .. }
            | PipelineEvent::Fallback { timestamp, .. }
            | PipelineEvent::Throttle { timestamp, .. }
            | PipelineEvent::Drain { timestamp } => *timestamp,
        }
    }
}

/// Trait for listening to [`PipelineEvent`]s.
pub trait EventListener: Send + Sync {
    /// Called when an event occurs. Must not panic in a way callers rely on
    /// propagating — [`EventListeners::emit`] catches panics regardless.
    fn on_event(&self, event: &PipelineEvent);
}

/// A function-based event listener, for registering hooks as plain closures.
pub struct FnListener<F>
where
    F: Fn(&PipelineEvent) + Send + Sync,
{
    f: F,
}

impl<F> FnListener<F>
where
    F: Fn(&PipelineEvent) + Send + Sync,
{
    /// Creates a new function-based listener.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> EventListener for FnListener<F>
where
    F: Fn(&PipelineEvent) + Send + Sync,
{
    fn on_event(&self, event: &PipelineEvent) {
        (self.f)(event)
    }
}

/// A collection of event listeners, shared across workers.
#[derive(Clone, Default)]
pub struct EventListeners {
    listeners: Vec<Arc<dyn EventListener>>,
}

impl fmt::Debug for EventListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListeners")
            .field("len", &self.listeners.len())
            .finish()
    }
}

impl EventListeners {
    /// Creates a new, empty listener collection.
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    /// Adds a listener to the collection.
    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Emits an event to every registered listener.
    ///
    /// If a listener panics, the panic is caught so the remaining listeners
    /// still run — callback errors must never be observable by the pipeline
    /// itself.
    pub fn emit(&self, event: &PipelineEvent) {
        for listener in &self.listeners {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event);
            }));

            if result.is_err() {
                #[cfg(feature = "tracing")]
                tracing::warn!("pipeline event listener panicked");

                #[cfg(feature = "metrics")]
                metrics::counter!("pipeline_event_listener_panics_total").increment(1);
            }
        }
    }

    /// Returns `true` if no listeners are registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn emits_to_all_listeners() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);

        let mut listeners = EventListeners::new();
        listeners.add(FnListener::new(move |_event: &PipelineEvent| {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        listeners.emit(&PipelineEvent::Drain {
            timestamp: Instant::now(),
        });
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_listener_does_not_block_others() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);

        let mut listeners = EventListeners::new();
        listeners.add(FnListener::new(|_: &PipelineEvent| panic!("boom")));
        listeners.add(FnListener::new(move |_: &PipelineEvent| {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        listeners.emit(&PipelineEvent::Drain {
            timestamp: Instant::now(),
        });
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_collection_reports_empty() {
        let listeners = EventListeners::new();
        assert!(listeners.is_empty());
    }
}
