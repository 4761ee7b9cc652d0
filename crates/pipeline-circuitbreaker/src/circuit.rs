//! The circuit breaker state machine.

use crate::config::CircuitBreakerConfig;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[cfg(feature = "metrics")]
use metrics::gauge;

/// The three states a circuit breaker can occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    /// Calls are admitted; failures are being counted toward the trip
    /// threshold.
    Closed = 0,
    /// Calls are rejected without being attempted.
    Open = 1,
    /// A single trial call is admitted to probe whether the dependency has
    /// recovered.
    HalfOpen = 2,
}

impl CircuitState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            _ => CircuitState::HalfOpen,
        }
    }
}

/// Outcome of [`CircuitBreaker::try_acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitOutcome {
    /// The call may proceed.
    Admitted,
    /// The breaker is `Open` and the timeout has not yet elapsed; the
    /// caller must raise a circuit-open error without attempting the call.
    Rejected,
}

struct Counters {
    /// Consecutive failures since the last success, used when
    /// `sampling_duration` is unset.
    consecutive_failures: usize,
    /// Timestamps of failures within the sliding window, used when
    /// `sampling_duration` is set.
    windowed_failures: VecDeque<Instant>,
    /// Consecutive successes while `HalfOpen`.
    half_open_successes: usize,
    /// When the breaker tripped to `Open`, used to gate the single trial
    /// attempt after `open_timeout`.
    opened_at: Option<Instant>,
    /// Set once the trial attempt in `HalfOpen` has been handed out, so a
    /// flood of concurrent callers doesn't each get their own trial.
    half_open_trial_in_flight: bool,
}

impl Counters {
    fn new() -> Self {
        Self {
            consecutive_failures: 0,
            windowed_failures: VecDeque::new(),
            half_open_successes: 0,
            opened_at: None,
            half_open_trial_in_flight: false,
        }
    }

    fn reset(&mut self) {
        *self = Counters::new();
    }
}

/// Listener invoked on every state transition. Panics are swallowed: a
/// broken callback must never take down the breaker.
pub type StateChangeCallback = Arc<dyn Fn(CircuitState, CircuitState) + Send + Sync>;

/// A circuit breaker admission gate shared across every worker in the
/// pipeline.
///
/// The current state lives in an `AtomicU8` for lock-free reads, so a
/// hot-path `try_acquire` on an already-`Closed` breaker costs a single
/// atomic load before it touches the counters mutex. Failure/success
/// bookkeeping lives behind a `Mutex` since it only needs to be consistent
/// across state transitions, not on every call.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: AtomicU8,
    counters: Mutex<Counters>,
    on_state_change: Option<StateChangeCallback>,
}

impl CircuitBreaker {
    /// Creates a new circuit breaker starting in the `Closed` state.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: AtomicU8::new(CircuitState::Closed as u8),
            counters: Mutex::new(Counters::new()),
            on_state_change: None,
        }
    }

    /// Attaches a callback invoked synchronously on every state transition.
    pub fn with_state_change_callback(mut self, callback: StateChangeCallback) -> Self {
        self.on_state_change = Some(callback);
        self
    }

    /// Returns the current state without taking the counters lock.
    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Decides whether a call may proceed right now.
    ///
    /// If `Open` and `open_timeout` has elapsed, this admits exactly one
    /// caller as the `HalfOpen` trial and flips the state; every other
    /// caller sees `Rejected` until that trial resolves.
    pub fn try_acquire(&self) -> AdmitOutcome {
        match self.state() {
            CircuitState::Closed => AdmitOutcome::Admitted,
            CircuitState::HalfOpen => {
                let mut counters = self.counters.lock().unwrap();
                if counters.half_open_trial_in_flight {
                    AdmitOutcome::Rejected
                } else {
                    counters.half_open_trial_in_flight = true;
                    AdmitOutcome::Admitted
                }
            }
            CircuitState::Open => {
                let mut counters = self.counters.lock().unwrap();
                let elapsed = counters
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.open_timeout())
                    .unwrap_or(true);
                if !elapsed {
                    return AdmitOutcome::Rejected;
                }
                counters.half_open_trial_in_flight = true;
                counters.half_open_successes = 0;
                drop(counters);
                self.transition(CircuitState::Open, CircuitState::HalfOpen);
                AdmitOutcome::Admitted
            }
        }
    }

    /// Records a successful call.
    pub fn record_success(&self) {
        match self.state() {
            CircuitState::Closed => {
                let mut counters = self.counters.lock().unwrap();
                counters.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                let mut counters = self.counters.lock().unwrap();
                counters.half_open_trial_in_flight = false;
                counters.half_open_successes += 1;
                if counters.half_open_successes >= self.config.success_threshold() {
                    counters.reset();
                    drop(counters);
                    self.transition(CircuitState::HalfOpen, CircuitState::Closed);
                }
            }
            CircuitState::Open => {}
        }
        #[cfg(feature = "metrics")]
        gauge!("pipeline_circuitbreaker_state", "outcome" => "success").set(1.0);
    }

    /// Records a failed call.
    pub fn record_failure(&self) {
        match self.state() {
            CircuitState::Closed => {
                let tripped = {
                    let mut counters = self.counters.lock().unwrap();
                    if let Some(window) = self.config.sampling_duration() {
                        let now = Instant::now();
                        counters.windowed_failures.push_back(now);
                        while counters
                            .windowed_failures
                            .front()
                            .is_some_and(|t| now.duration_since(*t) > window)
                        {
                            counters.windowed_failures.pop_front();
                        }
                        counters.windowed_failures.len() >= self.config.failure_threshold()
                    } else {
                        counters.consecutive_failures += 1;
                        counters.consecutive_failures >= self.config.failure_threshold()
                    }
                };
                if tripped {
                    {
                        let mut counters = self.counters.lock().unwrap();
                        counters.opened_at = Some(Instant::now());
                        counters.half_open_trial_in_flight = false;
                    }
                    self.transition(CircuitState::Closed, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                {
                    let mut counters = self.counters.lock().unwrap();
                    counters.opened_at = Some(Instant::now());
                    counters.half_open_trial_in_flight = false;
                    counters.half_open_successes = 0;
                }
                self.transition(CircuitState::HalfOpen, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    /// Forces the breaker back to `Closed` and clears all counters,
    /// regardless of current state.
    pub fn reset(&self) {
        let previous = self.state();
        self.counters.lock().unwrap().reset();
        self.state
            .store(CircuitState::Closed as u8, Ordering::Release);
        if previous != CircuitState::Closed {
            self.fire_callback(previous, CircuitState::Closed);
        }
    }

    fn transition(&self, from: CircuitState, to: CircuitState) {
        self.state.store(to as u8, Ordering::Release);
        #[cfg(feature = "tracing")]
        tracing::info!(?from, ?to, "circuit breaker state transition");
        self.fire_callback(from, to);
    }

    fn fire_callback(&self, from: CircuitState, to: CircuitState) {
        if let Some(callback) = &self.on_state_change {
            let callback = callback.clone();
            let _ = catch_unwind(AssertUnwindSafe(|| callback(from, to)));
        }
    }
}
