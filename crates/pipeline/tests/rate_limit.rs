//! The token-bucket gate throttles a burst down to its steady-state refill
//! rate.

use pipeline::{Pipeline, PipelineOptions};
use pipeline_ratelimiter::RateLimiterConfig;
use std::convert::Infallible;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Source `1..150`, `tokens_per_second=100`, `burst_capacity=50`,
/// `max_parallelism=50`, trivial function. The first 50 items drain the
/// burst immediately; the remaining 100 trickle out at 100/s, so the whole
/// run takes at least ~1s and well under 3s.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn burst_then_steady_rate_bounds_total_duration() {
    let rate_limit = RateLimiterConfig::builder(100.0)
        .burst_capacity(50.0)
        .build()
        .unwrap();

    let options = PipelineOptions::<i32, i32, Infallible>::builder()
        .max_parallelism(50)
        .rate_limit(rate_limit)
        .build()
        .unwrap();

    let pipeline = Pipeline::new(options);
    let source = tokio_stream::iter(1..150);

    let started = Instant::now();
    let result = pipeline
        .run_to_vec(source, |value| async move { Ok(value) }, CancellationToken::new())
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(result.len(), 149);
    assert!(
        elapsed >= std::time::Duration::from_millis(900),
        "expected throttling to take at least ~1s, took {elapsed:?}"
    );
    assert!(
        elapsed <= std::time::Duration::from_millis(3000),
        "expected the run to finish well under 3s, took {elapsed:?}"
    );
}

/// A rate limiter sized far above the workload never measurably slows it.
#[tokio::test]
async fn generous_rate_limit_does_not_throttle_small_runs() {
    let rate_limit = RateLimiterConfig::builder(10_000.0).build().unwrap();

    let options = PipelineOptions::<i32, i32, Infallible>::builder()
        .max_parallelism(10)
        .rate_limit(rate_limit)
        .build()
        .unwrap();

    let pipeline = Pipeline::new(options);
    let source = tokio_stream::iter(1..=20);

    let started = Instant::now();
    let mut result = pipeline
        .run_to_vec(source, |value| async move { Ok(value) }, CancellationToken::new())
        .await
        .unwrap();
    result.sort();

    assert_eq!(result, (1..=20).collect::<Vec<_>>());
    assert!(started.elapsed() <= std::time::Duration::from_millis(500));
}
