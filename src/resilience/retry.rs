//! Retry with deterministic exponential backoff.
//!
//! Attempt 1 runs immediately. After a retryable failure on attempt `n` the
//! policy waits `min(initial_delay * exponential_base^(n-1), max_delay)`
//! before the next attempt. No jitter is applied. After `max_attempts` the
//! last error is returned unchanged; errors whose [`FailureKind`] is not in
//! the allow-list are returned immediately.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::circuit_breaker::BreakerError;

/// Coarse classification of a failure, used by the retry allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network hiccup, 5xx, connection reset.
    Transient,
    /// The collaborator did not answer in time.
    Timeout,
    /// The collaborator asked us to slow down.
    RateLimited,
    /// The collaborator answered with something unparseable or invalid.
    InvalidResponse,
    /// The requested record does not exist.
    NotFound,
    /// Persistence layer failure.
    Storage,
    /// A circuit breaker rejected the call.
    CircuitOpen,
    /// Anything else.
    Other,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Transient => "transient",
            FailureKind::Timeout => "timeout",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::InvalidResponse => "invalid_response",
            FailureKind::NotFound => "not_found",
            FailureKind::Storage => "storage",
            FailureKind::CircuitOpen => "circuit_open",
            FailureKind::Other => "other",
        };
        write!(f, "{}", name)
    }
}

/// Errors that can report their [`FailureKind`].
pub trait Classify {
    /// Returns the failure classification of this error.
    fn failure_kind(&self) -> FailureKind;
}

impl<E: Classify> Classify for BreakerError<E> {
    fn failure_kind(&self) -> FailureKind {
        match self {
            BreakerError::Open(_) => FailureKind::CircuitOpen,
            BreakerError::Failed(err) => err.failure_kind(),
        }
    }
}

impl Classify for String {
    fn failure_kind(&self) -> FailureKind {
        FailureKind::Other
    }
}

/// Which failures a [`RetryPolicy`] retries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RetryOn {
    /// Retry every failure.
    #[default]
    Any,
    /// Retry only the listed kinds.
    Kinds(Vec<FailureKind>),
}

impl RetryOn {
    /// Returns true if failures of `kind` should be retried.
    pub fn allows(&self, kind: FailureKind) -> bool {
        match self {
            RetryOn::Any => true,
            RetryOn::Kinds(kinds) => kinds.contains(&kind),
        }
    }
}

/// Bounded retry policy with exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub exponential_base: f64,
    /// Retryable failure kinds.
    pub retry_on: RetryOn,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
            retry_on: RetryOn::Any,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy that retries every failure.
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        exponential_base: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            exponential_base,
            retry_on: RetryOn::Any,
        }
    }

    /// Policy used for research, generation and review calls.
    pub fn for_agents() -> Self {
        Self::new(3, Duration::from_secs(2), Duration::from_secs(10), 2.0)
    }

    /// Policy used for storage calls.
    pub fn for_storage() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(5), 2.0)
    }

    /// A single attempt, no retries.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO, 1.0)
    }

    /// Restricts retries to the given failure kinds.
    pub fn with_retry_on(mut self, kinds: Vec<FailureKind>) -> Self {
        self.retry_on = RetryOn::Kinds(kinds);
        self
    }

    /// Delay to wait after a failure on `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.exponential_base.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped > 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            Duration::ZERO
        }
    }

    fn should_retry(&self, attempt: u32, kind: FailureKind) -> bool {
        attempt < self.max_attempts && self.retry_on.allows(kind)
    }

    /// Runs an async operation under this policy.
    ///
    /// `op` is invoked once per attempt; the returned future is awaited
    /// before deciding whether to retry.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    let kind = err.failure_kind();
                    if !self.should_retry(attempt, kind) {
                        return Err(err);
                    }
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        kind = %kind,
                        delay_secs = delay.as_secs_f64(),
                        error = %err,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Runs a blocking operation under this policy, sleeping the current
    /// thread between attempts.
    pub fn run_blocking<T, E, F>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        E: Classify + fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let kind = err.failure_kind();
                    if !self.should_retry(attempt, kind) {
                        return Err(err);
                    }
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        kind = %kind,
                        delay_secs = delay.as_secs_f64(),
                        error = %err,
                        "Attempt failed, retrying"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}
