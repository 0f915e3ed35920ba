//! Fault-tolerance primitives shared by every pipeline stage.
//!
//! Two wrappers with no domain knowledge:
//!
//! - **CircuitBreaker**: stops calling a collaborator that keeps failing and
//!   lets a probe through once its cooldown has elapsed.
//! - **RetryPolicy**: re-runs a failing operation with deterministic
//!   exponential backoff, restricted to an allow-list of failure kinds.
//!
//! Both come in a blocking flavour (`call`, `run_blocking`) and an async
//! flavour (`call_async`, `run`). Pipeline workers compose them as
//! `retry(breaker(operation))`, so every retry attempt consults the breaker
//! again.
//!
//! # Example
//!
//! ```rust,ignore
//! use synth_forge::resilience::{CircuitBreaker, CircuitBreakerConfig, RetryPolicy};
//!
//! let breaker = CircuitBreaker::new("research", CircuitBreakerConfig::default());
//! let policy = RetryPolicy::default();
//!
//! let findings = policy
//!     .run("research", || breaker.call_async(|| agent.research(&task)))
//!     .await?;
//! ```

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{
    BreakerError, BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerOpen,
    CircuitState,
};
pub use retry::{Classify, FailureKind, RetryOn, RetryPolicy};
