//! Property-based tests for the pipeline engine's quantified invariants.
//!
//! Run with: cargo test --test property_tests

pub mod completeness;
pub mod concurrency;
pub mod rate_limiter;
