//! The three `ErrorMode` behaviors: `FailFast`, `CollectAndContinue`, and
//! `BestEffort`.

use pipeline::{ErrorMode, Pipeline, PipelineError, PipelineOptions};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq)]
struct DivisibleByFive(i32);

impl std::fmt::Display for DivisibleByFive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} is divisible by five", self.0)
    }
}

impl std::error::Error for DivisibleByFive {}

async fn map_odd_multiples_of_five(value: i32) -> Result<i32, DivisibleByFive> {
    if value % 5 == 0 {
        Err(DivisibleByFive(value))
    } else {
        Ok(value * 2)
    }
}

/// Source `1..=20`, function fails when `x % 5 == 0`, `BestEffort` mode,
/// `max_retries=0`. Expect 16 results: `{x*2 : x in 1..=20, x%5 != 0}`.
#[tokio::test]
async fn best_effort_drops_failing_items_and_keeps_the_rest() {
    let options = PipelineOptions::<i32, i32, DivisibleByFive>::builder()
        .error_mode(ErrorMode::BestEffort)
        .ordered_output(true)
        .build()
        .unwrap();

    let pipeline = Pipeline::new(options);
    let source = tokio_stream::iter(1..=20);

    let mut result = pipeline
        .run_to_vec(source, map_odd_multiples_of_five, CancellationToken::new())
        .await
        .unwrap();
    result.sort();

    let mut expected: Vec<i32> = (1..=20).filter(|x| x % 5 != 0).map(|x| x * 2).collect();
    expected.sort();

    assert_eq!(result.len(), 16);
    assert_eq!(result, expected);
}

/// `FailFast` aborts on the first terminal failure and surfaces exactly
/// that error.
#[tokio::test]
async fn fail_fast_aborts_on_first_failure() {
    let options = PipelineOptions::<i32, i32, DivisibleByFive>::builder()
        .max_parallelism(1)
        .error_mode(ErrorMode::FailFast)
        .ordered_output(true)
        .build()
        .unwrap();

    let pipeline = Pipeline::new(options);
    let source = tokio_stream::iter(1..=20);

    let err = pipeline
        .run_to_vec(source, map_odd_multiples_of_five, CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        PipelineError::Application(DivisibleByFive(value)) => assert_eq!(value, 5),
        other => panic!("expected the first failing item's error, got {other:?}"),
    }
}

/// `CollectAndContinue` runs every item to completion and raises an
/// aggregate of every per-item failure.
#[tokio::test]
async fn collect_and_continue_runs_to_completion_and_aggregates_failures() {
    let options = PipelineOptions::<i32, i32, DivisibleByFive>::builder()
        .error_mode(ErrorMode::CollectAndContinue)
        .build()
        .unwrap();

    let pipeline = Pipeline::new(options);
    let source = tokio_stream::iter(1..=20);

    let err = pipeline
        .run_to_vec(source, map_odd_multiples_of_five, CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        PipelineError::Aggregate(errors) => assert_eq!(errors.len(), 4),
        other => panic!("expected an aggregate error, got {other:?}"),
    }
}

/// `on_error` returning `false` in `CollectAndContinue` mode cancels the
/// pipeline early instead of running every item.
#[tokio::test]
async fn on_error_false_cancels_collect_and_continue() {
    let seen = Arc::new(AtomicUsize::new(0));
    let seen_clone = seen.clone();

    let options = PipelineOptions::<i32, i32, DivisibleByFive>::builder()
        .max_parallelism(1)
        .error_mode(ErrorMode::CollectAndContinue)
        .on_error(move |_index, _err| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
            false
        })
        .build()
        .unwrap();

    let pipeline = Pipeline::new(options);
    let source = tokio_stream::iter(1..=20);

    let result = pipeline
        .run_to_vec(source, map_odd_multiples_of_five, CancellationToken::new())
        .await;

    assert!(matches!(result, Err(PipelineError::Cancelled)));
    assert!(seen.load(Ordering::SeqCst) >= 1);
}

/// A configured fallback takes precedence over the error mode: the item
/// completes successfully with the fallback value instead of failing.
#[tokio::test]
async fn fallback_completes_item_instead_of_failing() {
    let options = PipelineOptions::<i32, i32, DivisibleByFive>::builder()
        .error_mode(ErrorMode::FailFast)
        .ordered_output(true)
        .on_fallback(|_index, _err| -1)
        .build()
        .unwrap();

    let pipeline = Pipeline::new(options);
    let source = tokio_stream::iter(1..=10);

    let result = pipeline
        .run_to_vec(source, map_odd_multiples_of_five, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result, vec![2, 4, 6, 8, -1, 12, 14, 16, 18, -1]);
}
