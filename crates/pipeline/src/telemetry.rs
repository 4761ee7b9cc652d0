//! Process-wide telemetry counters.
//!
//! An explicit, `Arc`-shareable dependency rather than a hidden global:
//! defaults to one shared process instance so independent pipelines still
//! aggregate into one view unless a caller opts into isolated counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Additive counters shared across every concurrent pipeline that was
/// handed the same instance.
#[derive(Default)]
pub struct ProcessCounters {
    items_started: AtomicU64,
    items_completed: AtomicU64,
    total_retries: AtomicU64,
    total_failures: AtomicU64,
    throttle_events: AtomicU64,
    drain_events: AtomicU64,
}

impl ProcessCounters {
    /// Creates a fresh, independent set of counters all starting at zero.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns the shared process-wide instance, creating it on first use.
    pub fn shared() -> Arc<Self> {
        static SHARED: OnceLock<Arc<ProcessCounters>> = OnceLock::new();
        SHARED.get_or_init(|| Arc::new(ProcessCounters::default())).clone()
    }

    pub(crate) fn record_item_started(&self) {
        self.items_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_item_completed(&self) {
        self.items_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.total_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_throttle(&self) {
        self.throttle_events.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_drain(&self) {
        self.drain_events.fetch_add(1, Ordering::Relaxed);
    }

    /// Total items that have begun their first attempt, across every
    /// pipeline sharing this instance.
    pub fn items_started(&self) -> u64 {
        self.items_started.load(Ordering::Relaxed)
    }

    /// Total items that reached a terminal outcome.
    pub fn items_completed(&self) -> u64 {
        self.items_completed.load(Ordering::Relaxed)
    }

    /// Total retry attempts issued.
    pub fn total_retries(&self) -> u64 {
        self.total_retries.load(Ordering::Relaxed)
    }

    /// Total terminal failures.
    pub fn total_failures(&self) -> u64 {
        self.total_failures.load(Ordering::Relaxed)
    }

    /// Total rate-limit wait episodes.
    pub fn throttle_events(&self) -> u64 {
        self.throttle_events.load(Ordering::Relaxed)
    }

    /// Total times the input channel was observed empty.
    pub fn drain_events(&self) -> u64 {
        self.drain_events.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_counters_start_at_zero() {
        let counters = ProcessCounters::new();
        assert_eq!(counters.items_started(), 0);
    }

    #[test]
    fn counters_accumulate() {
        let counters = ProcessCounters::new();
        counters.record_item_started();
        counters.record_item_started();
        counters.record_retry();
        assert_eq!(counters.items_started(), 2);
        assert_eq!(counters.total_retries(), 1);
    }

    #[test]
    fn shared_instance_is_stable_across_calls() {
        let a = ProcessCounters::shared();
        a.record_item_started();
        let b = ProcessCounters::shared();
        assert_eq!(b.items_started(), a.items_started());
    }
}
