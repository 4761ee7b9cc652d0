//! Configuration for [`crate::CircuitBreaker`].

use crate::error::CircuitBreakerConfigError;
use std::time::Duration;

/// Validated circuit breaker configuration.
#[derive(Clone)]
pub struct CircuitBreakerConfig {
    failure_threshold: usize,
    success_threshold: usize,
    open_timeout: Duration,
    sampling_duration: Option<Duration>,
}

impl CircuitBreakerConfig {
    /// Starts a builder requiring the two threshold counts.
    pub fn builder(failure_threshold: usize, success_threshold: usize) -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder {
            failure_threshold,
            success_threshold,
            open_timeout: Duration::from_secs(30),
            sampling_duration: None,
        }
    }

    /// Consecutive (or windowed) failures needed to trip the breaker from
    /// `Closed` to `Open`.
    pub fn failure_threshold(&self) -> usize {
        self.failure_threshold
    }

    /// Consecutive successes needed in `HalfOpen` to close the breaker.
    pub fn success_threshold(&self) -> usize {
        self.success_threshold
    }

    /// How long the breaker stays `Open` before admitting a single trial
    /// attempt and moving to `HalfOpen`.
    pub fn open_timeout(&self) -> Duration {
        self.open_timeout
    }

    /// When set, failures are counted within a sliding time window instead
    /// of as a simple consecutive run.
    pub fn sampling_duration(&self) -> Option<Duration> {
        self.sampling_duration
    }
}

/// Builder for [`CircuitBreakerConfig`].
pub struct CircuitBreakerConfigBuilder {
    failure_threshold: usize,
    success_threshold: usize,
    open_timeout: Duration,
    sampling_duration: Option<Duration>,
}

impl CircuitBreakerConfigBuilder {
    /// Overrides the default 30 second open timeout.
    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Switches failure counting from consecutive-run to sliding-window.
    pub fn sampling_duration(mut self, duration: Duration) -> Self {
        self.sampling_duration = Some(duration);
        self
    }

    /// Validates and builds the config.
    pub fn build(self) -> Result<CircuitBreakerConfig, CircuitBreakerConfigError> {
        if self.failure_threshold == 0 {
            return Err(CircuitBreakerConfigError::InvalidFailureThreshold(
                self.failure_threshold,
            ));
        }
        if self.success_threshold == 0 {
            return Err(CircuitBreakerConfigError::InvalidSuccessThreshold(
                self.success_threshold,
            ));
        }
        if self.open_timeout.is_zero() {
            return Err(CircuitBreakerConfigError::InvalidOpenTimeout);
        }
        if matches!(self.sampling_duration, Some(d) if d.is_zero()) {
            return Err(CircuitBreakerConfigError::InvalidSamplingDuration);
        }

        Ok(CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            success_threshold: self.success_threshold,
            open_timeout: self.open_timeout,
            sampling_duration: self.sampling_duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_failure_threshold() {
        let err = CircuitBreakerConfig::builder(0, 1).build().unwrap_err();
        assert_eq!(err, CircuitBreakerConfigError::InvalidFailureThreshold(0));
    }

    #[test]
    fn rejects_zero_open_timeout() {
        let err = CircuitBreakerConfig::builder(3, 2)
            .open_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert_eq!(err, CircuitBreakerConfigError::InvalidOpenTimeout);
    }

    #[test]
    fn accepts_valid_config_with_window() {
        let config = CircuitBreakerConfig::builder(5, 2)
            .open_timeout(Duration::from_secs(1))
            .sampling_duration(Duration::from_secs(10))
            .build()
            .unwrap();
        assert_eq!(config.failure_threshold(), 5);
        assert_eq!(config.sampling_duration(), Some(Duration::from_secs(10)));
    }
}
