//! Circuit breaker for a single collaborator class.
//!
//! The breaker is a lazy state machine: there is no background timer, the
//! OPEN → HALF_OPEN transition is evaluated when the next call arrives.
//!
//! ```text
//! CLOSED --(failure_count >= threshold)--> OPEN
//! OPEN --(recovery_timeout elapsed, next call)--> HALF_OPEN
//! HALF_OPEN --(success)--> CLOSED
//! HALF_OPEN --(failure_count >= threshold, counted from zero)--> OPEN
//! ```
//!
//! One breaker is shared by every concurrent call to the same collaborator.
//! The state sits behind a mutex that is only held for bookkeeping, never
//! across the wrapped call, so concurrent callers may interleave their
//! updates; the counts are advisory.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow through normally.
    Closed,
    /// Calls are rejected without invoking the collaborator.
    Open,
    /// Cooldown elapsed; the next outcome decides between CLOSED and OPEN.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Thresholds for a circuit breaker.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Failures (since the last success) that open the circuit.
    pub failure_threshold: u32,
    /// Time the circuit stays open before a probe is allowed.
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    /// Creates a configuration with explicit thresholds.
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
        }
    }
}

/// Returned instead of invoking the collaborator while the circuit is open.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Circuit breaker '{name}' is OPEN after {failure_count} failures; retry after {retry_after:?}")]
pub struct CircuitBreakerOpen {
    /// Name of the breaker that rejected the call.
    pub name: String,
    /// Failures recorded when the call was rejected.
    pub failure_count: u32,
    /// Remaining cooldown before a probe is allowed.
    pub retry_after: Duration,
}

/// Error returned by a breaker-wrapped call.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The circuit was open; the wrapped call did not run.
    #[error("{0}")]
    Open(CircuitBreakerOpen),

    /// The wrapped call ran and failed.
    #[error("{0}")]
    Failed(E),
}

impl<E> BreakerError<E> {
    /// Returns true if the call was rejected by an open circuit.
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open(_))
    }

    /// Returns the collaborator error, if the call ran.
    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerError::Open(_) => None,
            BreakerError::Failed(err) => Some(err),
        }
    }
}

/// Point-in-time view of a breaker's state.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerSnapshot {
    /// Current state.
    pub state: CircuitState,
    /// Failures since the last success or recovery.
    pub failure_count: u32,
    /// Time since the last recorded failure.
    pub since_last_failure: Option<Duration>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
}

/// Circuit breaker shared by all calls to one collaborator class.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
            }),
        }
    }

    /// Name used in logs and `CircuitBreakerOpen` errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configured thresholds.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state, without evaluating the cooldown.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Failures since the last success or recovery.
    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    /// Returns a snapshot of the breaker's state.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
            since_last_failure: inner.last_failure.map(|at| at.elapsed()),
        }
    }

    /// Runs a blocking call under breaker protection.
    pub fn call<T, E, F>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.admit().map_err(BreakerError::Open)?;
        match f() {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(BreakerError::Failed(err))
            }
        }
    }

    /// Runs an async call under breaker protection.
    ///
    /// The future is only created once the breaker admits the call.
    pub async fn call_async<T, E, F, Fut>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.admit().map_err(BreakerError::Open)?;
        match f().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(BreakerError::Failed(err))
            }
        }
    }

    /// Decides whether a call may proceed, moving OPEN → HALF_OPEN once the
    /// cooldown has elapsed.
    fn admit(&self) -> Result<(), CircuitBreakerOpen> {
        let mut inner = self.lock();
        if inner.state != CircuitState::Open {
            return Ok(());
        }

        let elapsed = inner
            .last_failure
            .map(|at| at.elapsed())
            .unwrap_or(self.config.recovery_timeout);

        if elapsed >= self.config.recovery_timeout {
            inner.state = CircuitState::HalfOpen;
            inner.failure_count = 0;
            debug!(breaker = %self.name, "Circuit half-open, allowing probe");
            return Ok(());
        }

        Err(CircuitBreakerOpen {
            name: self.name.clone(),
            failure_count: inner.failure_count,
            retry_after: self.config.recovery_timeout - elapsed,
        })
    }

    fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            debug!(breaker = %self.name, "Probe succeeded, circuit closed");
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
    }

    fn record_failure(&self) {
        let mut inner = self.lock();
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());

        // HALF_OPEN entered with a zero count, so probes accumulate toward the
        // same threshold.
        if inner.failure_count >= self.config.failure_threshold {
            if inner.state != CircuitState::Open {
                warn!(
                    breaker = %self.name,
                    failure_count = inner.failure_count,
                    recovery_timeout_secs = self.config.recovery_timeout.as_secs_f64(),
                    "Circuit opened"
                );
            }
            inner.state = CircuitState::Open;
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        // Bookkeeping never panics while holding the lock, but recover anyway.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
