//! Failure policies and retry execution.
//!
//! A [`FailurePolicyExecutor`] runs an async operation under one of
//! four policies. `FailFast` surfaces the first error. `Retry` re-runs
//! with exponential backoff. `GracefulDegradation` retries and then
//! lets the caller substitute a fallback. `Fallback` goes straight to
//! the substitute after a single failed attempt.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::resilience::CircuitBreaker;
use crate::telemetry::RuntimeTelemetry;
use crate::types::{BoxError, ResilienceError};

/// Exponential backoff schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Growth factor applied per subsequent attempt.
    pub backoff_multiplier: f64,
    /// Ceiling on any single delay.
    pub max_delay: Duration,
    /// Scatter each delay by up to 12.5% either way to avoid
    /// synchronized retry storms.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait before attempt `attempt` (attempts are numbered
    /// from 1; the first has no delay). The base doubles per retry:
    /// attempt 2 waits `initial_delay`, attempt 3 waits
    /// `initial_delay * multiplier`, and so on, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2) as f64;
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powf(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());
        let scaled = if self.jitter {
            capped * rand::thread_rng().gen_range(0.875..=1.125)
        } else {
            capped
        };
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }
}

/// How an operation's failures are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Surface the first error immediately.
    FailFast,
    /// Retry with backoff, then surface the final error.
    Retry,
    /// Retry with backoff, then fall back if one is provided.
    GracefulDegradation,
    /// Single attempt, then fall back if one is provided.
    Fallback,
}

pub struct FailurePolicyExecutor {
    name: String,
    policy: FailurePolicy,
    retry: RetryPolicy,
    operation_timeout: Duration,
    breaker: Option<Arc<CircuitBreaker>>,
    telemetry: Option<Arc<RuntimeTelemetry>>,
}

impl FailurePolicyExecutor {
    pub fn new(name: impl Into<String>, policy: FailurePolicy) -> Self {
        Self {
            name: name.into(),
            policy,
            retry: RetryPolicy::default(),
            operation_timeout: Duration::from_secs(10),
            breaker: None,
            telemetry: None,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Route every attempt through the given breaker. The breaker's
    /// own operation timeout then governs each attempt.
    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Count retry attempts in the runtime's metrics.
    pub fn with_telemetry(mut self, telemetry: Arc<RuntimeTelemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Run `operation` under the configured policy.
    pub async fn execute<T, F, Fut>(&self, operation: &F) -> Result<T, ResilienceError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, BoxError>>,
    {
        match self.policy {
            FailurePolicy::FailFast | FailurePolicy::Fallback => self.attempt(operation).await,
            FailurePolicy::Retry | FailurePolicy::GracefulDegradation => {
                self.retry_loop(operation).await
            }
        }
    }

    /// Like [`execute`](Self::execute), but when the policy permits
    /// degradation a failed operation is replaced by `fallback`.
    pub async fn execute_with_fallback<T, F, Fut, FB, FbFut>(
        &self,
        operation: &F,
        fallback: FB,
    ) -> Result<T, ResilienceError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, BoxError>>,
        FB: FnOnce() -> FbFut,
        FbFut: Future<Output = Result<T, BoxError>>,
    {
        match self.execute(operation).await {
            Ok(value) => Ok(value),
            Err(err) => match self.policy {
                FailurePolicy::GracefulDegradation | FailurePolicy::Fallback => {
                    warn!(executor = %self.name, error = %err, "falling back");
                    fallback().await.map_err(|source| ResilienceError::Operation {
                        name: format!("{}.fallback", self.name),
                        source,
                    })
                }
                _ => Err(err),
            },
        }
    }

    async fn attempt<T, F, Fut>(&self, operation: &F) -> Result<T, ResilienceError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, BoxError>>,
    {
        match &self.breaker {
            Some(breaker) => breaker.call(operation).await,
            None => {
                match tokio::time::timeout(self.operation_timeout, operation()).await {
                    Ok(result) => result.map_err(|source| ResilienceError::Operation {
                        name: self.name.clone(),
                        source,
                    }),
                    Err(_) => Err(ResilienceError::OperationTimeout {
                        name: self.name.clone(),
                        timeout: self.operation_timeout,
                    }),
                }
            }
        }
    }

    async fn retry_loop<T, F, Fut>(&self, operation: &F) -> Result<T, ResilienceError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, BoxError>>,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_error: Option<ResilienceError> = None;

        for attempt in 1..=max_attempts {
            match self.attempt(operation).await {
                Ok(value) => return Ok(value),
                // A breaker rejection counts as a failed attempt: the
                // reset window may elapse during the backoff, letting
                // a later attempt through half-open.
                Err(err) => {
                    debug!(
                        executor = %self.name,
                        attempt,
                        max_attempts,
                        error = %err,
                        "attempt failed"
                    );
                    last_error = Some(err);
                    if attempt < max_attempts {
                        if let Some(telemetry) = &self.telemetry {
                            telemetry.retry_attempted(&self.name);
                        }
                        let delay = self.retry.delay_for_attempt(attempt + 1);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        let source = last_error.unwrap_or(ResilienceError::Operation {
            name: self.name.clone(),
            source: "no attempts executed".into(),
        });
        Err(ResilienceError::RetryExhausted {
            name: self.name.clone(),
            attempts: max_attempts,
            source: Box::new(source),
        })
    }
}
