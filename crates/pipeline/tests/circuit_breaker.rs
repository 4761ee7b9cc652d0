//! The circuit breaker trips after its failure threshold, rejects calls
//! without invoking the function while `Open`, and recovers through a
//! single `HalfOpen` trial.
//!
//! Gate state lives for the duration of one pipeline run, so both tests stay
//! inside a single `for_each` call rather than chaining several runs.

use pipeline::{ErrorMode, Pipeline, PipelineError, PipelineOptions};
use pipeline_circuitbreaker::CircuitBreakerConfig;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq)]
struct Boom;

impl std::fmt::Display for Boom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "boom")
    }
}

impl std::error::Error for Boom {}

/// After `failure_threshold` consecutive failures the breaker opens; further
/// calls are rejected with `PipelineError::CircuitOpen` and never reach the
/// user function.
#[tokio::test]
async fn breaker_trips_after_threshold_and_rejects_without_invoking_function() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();

    let breaker = CircuitBreakerConfig::builder(2, 1)
        .open_timeout(Duration::from_secs(10))
        .build()
        .unwrap();

    let options = PipelineOptions::<i32, i32, Boom>::builder()
        .max_parallelism(1)
        .max_retries(0)
        .error_mode(ErrorMode::CollectAndContinue)
        .circuit_breaker(breaker, None)
        .build()
        .unwrap();

    let pipeline = Pipeline::new(options);
    let source = tokio_stream::iter(1..=4);

    let results = Arc::new(Mutex::new(Vec::new()));
    let results_clone = results.clone();

    pipeline
        .for_each(
            source,
            move |_value| {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, _>(Boom)
                }
            },
            CancellationToken::new(),
            move |index, result| {
                results_clone.lock().unwrap().push((index, result));
            },
        )
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2, "third and fourth calls should be rejected before reaching the function");

    let results = results.lock().unwrap();
    assert_eq!(results.len(), 4);
    for (index, result) in results.iter() {
        match index {
            0 | 1 => assert!(matches!(result, Err(PipelineError::Application(Boom)))),
            2 | 3 => assert!(matches!(result, Err(PipelineError::CircuitOpen { .. }))),
            other => panic!("unexpected index {other}"),
        }
    }
}

/// Once `open_timeout` has elapsed, the next call is admitted as a trial;
/// a successful trial closes the breaker again.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn half_open_trial_closes_breaker_on_success() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();

    let breaker = CircuitBreakerConfig::builder(3, 1)
        .open_timeout(Duration::from_millis(150))
        .build()
        .unwrap();

    let options = PipelineOptions::<i32, i32, Boom>::builder()
        .max_parallelism(1)
        .max_retries(0)
        .error_mode(ErrorMode::CollectAndContinue)
        .circuit_breaker(breaker, None)
        .build()
        .unwrap();

    let pipeline = Pipeline::new(options);

    // Items 1-3 fail and trip the breaker; item 4 arrives immediately after
    // and is rejected; the source then pauses for longer than `open_timeout`
    // before handing over item 5, which the breaker admits as its trial.
    let source = async_stream::stream! {
        yield 1;
        yield 2;
        yield 3;
        yield 4;
        tokio::time::sleep(Duration::from_millis(250)).await;
        yield 5;
    };

    let results = Arc::new(Mutex::new(Vec::new()));
    let results_clone = results.clone();

    pipeline
        .for_each(
            source,
            move |value| {
                let calls = calls_clone.clone();
                async move {
                    let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if attempt <= 3 {
                        Err(Boom)
                    } else {
                        Ok(value * 10)
                    }
                }
            },
            CancellationToken::new(),
            move |index, result| {
                results_clone.lock().unwrap().push((index, result));
            },
        )
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 4, "item 4 should be rejected without calling the function");

    let results = results.lock().unwrap();
    assert_eq!(results.len(), 5);
    assert!(matches!(results[3].1, Err(PipelineError::CircuitOpen { .. })));
    match &results[4].1 {
        Ok(value) => assert_eq!(*value, 50),
        other => panic!("expected the half-open trial to succeed, got {other:?}"),
    }
}
