//! Failure handling: circuit breakers, retry policies, bulkheads.
//!
//! The pieces compose. A [`FailurePolicyExecutor`] can wrap its
//! attempts in a [`CircuitBreaker`], and callers can put a
//! [`Bulkhead`] in front of either to cap concurrency.

pub mod bulkhead;
pub mod circuit_breaker;
pub mod policy;

pub use bulkhead::Bulkhead;
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerRegistry, CircuitBreakerStats, CircuitState,
};
pub use policy::{FailurePolicy, FailurePolicyExecutor, RetryPolicy};
