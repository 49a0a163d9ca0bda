//! Circuit breaker pattern for provider resilience.
//!
//! The circuit breaker stops calling a dependency once it has failed
//! `failure_threshold` times in a row. After `open_timeout` has passed since the
//! last failure a single trial call is let through (half-open); its outcome
//! decides whether the circuit closes again or stays open for another cooldown.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::CircuitOpenError;
use crate::lock;

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// Cooldown after the last failure before a trial call is allowed, in milliseconds.
    #[serde(with = "crate::serde_millis")]
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::external_provider()
    }
}

impl CircuitBreakerConfig {
    /// Breaker guarding the external metadata provider.
    pub fn external_provider() -> Self {
        Self {
            failure_threshold: 3,
            open_timeout: Duration::from_secs(60),
        }
    }

    /// Breaker guarding the persistence layer.
    pub fn persistence() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }
}

/// Current state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Circuit is closed, requests are allowed.
    Closed,
    /// Circuit is open, requests are rejected.
    Open,
    /// Circuit is half-open, one trial request is allowed.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        })
    }
}

/// Point-in-time view of a breaker, read under a single lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure_time: Option<Instant>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
    trial_in_flight: bool,
}

/// Three-state circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// A `failure_threshold` of zero is treated as one.
    pub fn new(mut config: CircuitBreakerConfig) -> Self {
        config.failure_threshold = config.failure_threshold.max(1);
        Self {
            name: "default".to_string(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_time: None,
                trial_in_flight: false,
            }),
        }
    }

    /// Label used in log events.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Run `operation` if the circuit admits it.
    ///
    /// Failures of the operation are passed through unchanged and counted.
    /// When the circuit rejects the call, `operation` is never invoked and a
    /// [`CircuitOpenError`] (converted into `E`) is returned instead.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CircuitOpenError>,
    {
        let mut guard = self.admit()?;

        let outcome = operation().await;
        let trial = guard.disarm();
        match &outcome {
            Ok(_) => self.record_success(trial),
            Err(_) => self.record_failure(trial),
        }

        outcome
    }

    /// Get a consistent snapshot of the breaker.
    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = lock(&self.inner);
        CircuitSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
            last_failure_time: inner.last_failure_time,
        }
    }

    /// Get the current state.
    pub fn current_state(&self) -> CircuitState {
        lock(&self.inner).state
    }

    /// Get failure count.
    pub fn failure_count(&self) -> u32 {
        lock(&self.inner).failure_count
    }

    fn admit(&self) -> Result<TrialGuard<'_>, CircuitOpenError> {
        let mut inner = lock(&self.inner);

        match inner.state {
            CircuitState::Closed => Ok(TrialGuard::idle(self)),
            CircuitState::Open => {
                let since_failure = inner
                    .last_failure_time
                    .map(|at| at.elapsed())
                    .unwrap_or(self.config.open_timeout);

                if since_failure < self.config.open_timeout {
                    return Err(CircuitOpenError {
                        retry_after: self.config.open_timeout - since_failure,
                    });
                }

                inner.state = CircuitState::HalfOpen;
                inner.trial_in_flight = true;
                tracing::info!(breaker = %self.name, "circuit half-open, sending trial call");
                Ok(TrialGuard::armed(self))
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    return Err(CircuitOpenError {
                        retry_after: Duration::ZERO,
                    });
                }
                inner.trial_in_flight = true;
                Ok(TrialGuard::armed(self))
            }
        }
    }

    /// Only the half-open trial may move the circuit out of `HalfOpen`.
    /// Calls admitted while closed that finish after the circuit tripped
    /// leave the state alone.
    fn record_success(&self, trial: bool) {
        let mut inner = lock(&self.inner);
        match inner.state {
            CircuitState::HalfOpen if trial => {
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
                inner.trial_in_flight = false;
                tracing::info!(breaker = %self.name, "trial call succeeded, circuit closed");
            }
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::HalfOpen | CircuitState::Open => {}
        }
    }

    fn record_failure(&self, trial: bool) {
        let mut inner = lock(&self.inner);
        inner.failure_count = inner.failure_count.saturating_add(1);

        match inner.state {
            CircuitState::Closed => {
                inner.last_failure_time = Some(Instant::now());
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    tracing::warn!(
                        breaker = %self.name,
                        failures = inner.failure_count,
                        cooldown_ms = self.config.open_timeout.as_millis() as u64,
                        "failure threshold reached, circuit opened"
                    );
                }
            }
            CircuitState::HalfOpen if trial => {
                inner.last_failure_time = Some(Instant::now());
                inner.state = CircuitState::Open;
                inner.trial_in_flight = false;
                tracing::warn!(
                    breaker = %self.name,
                    failures = inner.failure_count,
                    "trial call failed, circuit re-opened"
                );
            }
            // A straggler admitted before the circuit opened; the cooldown stands.
            CircuitState::HalfOpen | CircuitState::Open => {}
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

/// Frees the half-open trial slot if the trial future is dropped before it
/// reports an outcome.
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl<'a> TrialGuard<'a> {
    fn idle(breaker: &'a CircuitBreaker) -> Self {
        Self {
            breaker,
            armed: false,
        }
    }

    fn armed(breaker: &'a CircuitBreaker) -> Self {
        Self {
            breaker,
            armed: true,
        }
    }

    /// Returns whether this call held the half-open trial slot.
    fn disarm(&mut self) -> bool {
        std::mem::replace(&mut self.armed, false)
    }
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            lock(&self.breaker.inner).trial_in_flight = false;
        }
    }
}
