//! End-to-end exercise of the adaptive concurrency controller: the
//! controller must actually retune `current` over the life of a run, not
//! just report the configured `initial` value.

use pipeline::{AdaptiveConcurrencyConfig, Pipeline, PipelineOptions};
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Every item is slow and fails, so the controller should have decreased
/// `current` below its starting point at least once by the time the run
/// finishes.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sustained_high_latency_decreases_concurrency() {
    let changes = Arc::new(AtomicUsize::new(0));
    let lowest_seen = Arc::new(AtomicUsize::new(usize::MAX));
    let changes_clone = changes.clone();
    let lowest_seen_clone = lowest_seen.clone();

    let adaptive = AdaptiveConcurrencyConfig::builder(1, 8)
        .initial(8)
        .sample_interval(Duration::from_millis(20))
        .target_latency(Duration::from_millis(5))
        .build()
        .unwrap();

    let options = PipelineOptions::<i32, i32, Infallible>::builder()
        .adaptive_concurrency(
            adaptive,
            Some(Arc::new(move |_old, new| {
                changes_clone.fetch_add(1, Ordering::SeqCst);
                lowest_seen_clone.fetch_min(new, Ordering::SeqCst);
            })),
        )
        .build()
        .unwrap();

    let pipeline = Pipeline::new(options);
    let source = tokio_stream::iter(0..200);

    let result = pipeline
        .run_to_vec(
            source,
            |value| async move {
                tokio::time::sleep(Duration::from_millis(15)).await;
                Ok(value)
            },
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.len(), 200);
    assert!(
        changes.load(Ordering::SeqCst) > 0,
        "on_concurrency_change should fire at least once under sustained high latency"
    );
    assert!(
        lowest_seen.load(Ordering::SeqCst) < 8,
        "current should have dropped below the initial limit of 8"
    );
}

/// Every item is fast and succeeds, so a controller started below `max`
/// should climb towards it.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sustained_low_latency_increases_concurrency() {
    let highest_seen = Arc::new(AtomicUsize::new(0));
    let highest_seen_clone = highest_seen.clone();

    let adaptive = AdaptiveConcurrencyConfig::builder(1, 16)
        .initial(1)
        .sample_interval(Duration::from_millis(20))
        .target_latency(Duration::from_millis(200))
        .build()
        .unwrap();

    let options = PipelineOptions::<i32, i32, Infallible>::builder()
        .adaptive_concurrency(
            adaptive,
            Some(Arc::new(move |_old, new| {
                highest_seen_clone.fetch_max(new, Ordering::SeqCst);
            })),
        )
        .build()
        .unwrap();

    let pipeline = Pipeline::new(options);
    let source = tokio_stream::iter(0..400);

    let result = pipeline
        .run_to_vec(
            source,
            |value| async move {
                tokio::time::sleep(Duration::from_millis(1)).await;
                Ok(value)
            },
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.len(), 400);
    assert!(
        highest_seen.load(Ordering::SeqCst) > 1,
        "current should have climbed above the initial limit of 1 under healthy conditions"
    );
}
