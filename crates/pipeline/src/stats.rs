//! Per-run atomic counters shared between workers and the progress/metrics
//! trackers.

use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

/// Atomic counters scoped to a single pipeline run, sampled by the
/// progress and metrics trackers without taking any lock.
pub(crate) struct RunCounters {
    pub(crate) started_at: Instant,
    pub(crate) total_items: Option<u64>,
    items_started: AtomicU64,
    items_completed: AtomicU64,
    error_count: AtomicU64,
    total_retries: AtomicU64,
    throttle_events: AtomicU64,
    drain_events: AtomicU64,
    queue_depth: AtomicI64,
    active_workers: AtomicUsize,
}

impl RunCounters {
    pub(crate) fn new(total_items: Option<u64>) -> Self {
        Self {
            started_at: Instant::now(),
            total_items,
            items_started: AtomicU64::new(0),
            items_completed: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            total_retries: AtomicU64::new(0),
            throttle_events: AtomicU64::new(0),
            drain_events: AtomicU64::new(0),
            queue_depth: AtomicI64::new(0),
            active_workers: AtomicUsize::new(0),
        }
    }

    pub(crate) fn record_item_started(&self) {
        self.items_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_item_completed(&self) {
        self.items_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.total_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_throttle(&self) {
        self.throttle_events.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_drain(&self) {
        self.drain_events.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_queue_depth(&self, depth: i64) {
        self.queue_depth.store(depth, Ordering::Relaxed);
    }

    pub(crate) fn set_active_workers(&self, count: usize) {
        self.active_workers.store(count, Ordering::Relaxed);
    }

    pub(crate) fn items_started(&self) -> u64 {
        self.items_started.load(Ordering::Relaxed)
    }

    pub(crate) fn items_completed(&self) -> u64 {
        self.items_completed.load(Ordering::Relaxed)
    }

    pub(crate) fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub(crate) fn total_retries(&self) -> u64 {
        self.total_retries.load(Ordering::Relaxed)
    }

    pub(crate) fn throttle_events(&self) -> u64 {
        self.throttle_events.load(Ordering::Relaxed)
    }

    pub(crate) fn drain_events(&self) -> u64 {
        self.drain_events.load(Ordering::Relaxed)
    }

    pub(crate) fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed).max(0) as usize
    }

    pub(crate) fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::Relaxed)
    }
}
