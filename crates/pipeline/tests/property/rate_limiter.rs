//! Property: the token-bucket gate never admits more than
//! `burst_capacity + ceil(rate * elapsed)` operations within any elapsed
//! window, plus a fixed scheduling slack for the sampling itself.

use pipeline::{Pipeline, PipelineOptions};
use pipeline_ratelimiter::RateLimiterConfig;
use proptest::prelude::*;
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    /// Property: sampled partway through a long run, the number of
    /// completed items never exceeds the bucket's admission bound for the
    /// elapsed wall-clock time.
    #[test]
    fn admissions_within_window_stay_within_bucket_bound(
        tokens_per_second in 20u32..200,
        burst_capacity in 5u32..50,
    ) {
        let tokens_per_second = tokens_per_second as f64;
        let burst_capacity = burst_capacity as f64;

        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let rate_limit = RateLimiterConfig::builder(tokens_per_second)
                .burst_capacity(burst_capacity)
                .build()
                .unwrap();

            let options = PipelineOptions::<i32, i32, Infallible>::builder()
                .max_parallelism(64)
                .rate_limit(rate_limit)
                .build()
                .unwrap();

            let pipeline = Pipeline::new(options);
            // Enough items that the bucket can never keep up, so the run
            // is still throttling when we sample it.
            let source = tokio_stream::iter(0..5000i32);

            let completed = Arc::new(AtomicUsize::new(0));
            let completed_clone = completed.clone();

            let _run = tokio::spawn(async move {
                let _ = pipeline
                    .for_each(
                        source,
                        move |value| {
                            let completed = completed_clone.clone();
                            async move {
                                completed.fetch_add(1, Ordering::SeqCst);
                                Ok::<i32, Infallible>(value)
                            }
                        },
                        CancellationToken::new(),
                        |_, _| {},
                    )
                    .await;
            });

            let sample_window = Duration::from_millis(80);
            let started = std::time::Instant::now();
            tokio::time::sleep(sample_window).await;
            let elapsed = started.elapsed();

            let observed = completed.load(Ordering::SeqCst);

            // Generous slack: one extra in-flight batch of work can slip
            // past the sample point before workers observe the bucket is
            // dry, plus scheduler jitter on the sleep itself.
            let bound = burst_capacity + tokens_per_second * elapsed.as_secs_f64();
            let slack = 64.0 + tokens_per_second * 0.05;

            prop_assert!(
                (observed as f64) <= bound + slack,
                "observed {} admissions in {:?}, bound was {:.1} (+slack {:.1}) for rate {} burst {}",
                observed,
                elapsed,
                bound,
                slack,
                tokens_per_second,
                burst_capacity
            );

            Ok(())
        })?;
    }
}
