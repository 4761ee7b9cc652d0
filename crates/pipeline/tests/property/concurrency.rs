//! Property: the number of items executing at once never exceeds
//! `max_parallelism`.

use pipeline::{Pipeline, PipelineOptions};
use proptest::prelude::*;
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(25))]

    /// Property: the observed peak of concurrently-executing items is
    /// bounded by `max_parallelism`, across a range of pool sizes and
    /// workloads.
    #[test]
    fn peak_concurrency_never_exceeds_max_parallelism(
        max_parallelism in 1usize..10,
        item_count in 1usize..40,
    ) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let in_flight = Arc::new(AtomicUsize::new(0));
            let peak = Arc::new(AtomicUsize::new(0));

            let options = PipelineOptions::<i32, i32, Infallible>::builder()
                .max_parallelism(max_parallelism)
                .build()
                .unwrap();

            let pipeline = Pipeline::new(options);
            let source = tokio_stream::iter(0..item_count as i32);

            let in_flight_clone = in_flight.clone();
            let peak_clone = peak.clone();

            let _ = pipeline
                .run_to_vec(
                    source,
                    move |value| {
                        let in_flight = in_flight_clone.clone();
                        let peak = peak_clone.clone();
                        async move {
                            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(2)).await;
                            in_flight.fetch_sub(1, Ordering::SeqCst);
                            Ok::<i32, Infallible>(value)
                        }
                    },
                    CancellationToken::new(),
                )
                .await;

            let observed_peak = peak.load(Ordering::SeqCst);
            prop_assert!(
                observed_peak <= max_parallelism,
                "observed {} concurrent items but max_parallelism was {}",
                observed_peak,
                max_parallelism
            );

            Ok(())
        })?;
    }
}
