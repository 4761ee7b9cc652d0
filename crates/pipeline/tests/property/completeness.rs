//! Property: every source index produces exactly one outcome.
//!
//! Invariants tested:
//! - Output indices are dense: exactly `{0, 1, ..., n-1}`, no gaps
//! - No index is ever reported more than once
//! - This holds regardless of `max_parallelism` or per-item success/failure

use pipeline::{ErrorMode, Pipeline, PipelineOptions};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq)]
struct OddFailure;

impl std::fmt::Display for OddFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "odd values fail")
    }
}

impl std::error::Error for OddFailure {}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    /// Property: indices stay dense and unique no matter how many workers
    /// race to produce them, and regardless of how many items fail.
    #[test]
    fn every_index_reported_exactly_once(
        item_count in 0usize..60,
        max_parallelism in 1usize..8,
    ) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let options = PipelineOptions::<i32, i32, OddFailure>::builder()
                .max_parallelism(max_parallelism)
                .error_mode(ErrorMode::CollectAndContinue)
                .build()
                .unwrap();

            let pipeline = Pipeline::new(options);
            let source = tokio_stream::iter(0..item_count as i32);

            let seen = Arc::new(Mutex::new(Vec::new()));
            let seen_clone = seen.clone();

            let _ = pipeline
                .for_each(
                    source,
                    |value| async move {
                        if value % 2 == 0 {
                            Ok(value)
                        } else {
                            Err(OddFailure)
                        }
                    },
                    CancellationToken::new(),
                    move |index, _result| {
                        seen_clone.lock().unwrap().push(index);
                    },
                )
                .await;

            let mut seen = seen.lock().unwrap().clone();
            seen.sort_unstable();

            let unique: HashSet<u64> = seen.iter().copied().collect();
            prop_assert_eq!(
                unique.len(),
                seen.len(),
                "an index was reported more than once: {:?}",
                seen
            );

            let expected: Vec<u64> = (0..item_count as u64).collect();
            prop_assert_eq!(seen, expected, "indices were not dense over 0..item_count");

            Ok(())
        })?;
    }
}
