//! Error taxonomy for the Aether control runtime.
//!
//! Bootstrap-phase errors are never recovered locally: they abort the whole
//! sequence and surface as [`BootstrapError::FailFast`] wrapping the cause.
//! Resilience-layer errors are recoverable by the calling policy, but the
//! breaker and bulkhead never retry on their own.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use super::ids::ComponentId;

/// Boxed error produced by wrapped operations and activation hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Precondition and contract failures. Always fatal to bootstrap.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("unrecognized runtime mode: {0}")]
    UnrecognizedMode(String),

    #[error("component set is empty")]
    EmptyComponentSet,

    #[error("contract validation rejected the component set: {0}")]
    ContractRejected(String),
}

/// Dependency-graph failures. Always fatal to bootstrap.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("component {component} depends on unknown component {dependency}")]
    UnknownDependency {
        component: ComponentId,
        dependency: ComponentId,
    },

    #[error("cyclic dependencies detected: {cycles:?}")]
    CyclicDependency { cycles: Vec<Vec<ComponentId>> },

    #[error("computed activation order {computed:?} does not match canonical order {expected:?}")]
    InvalidActivationOrder {
        expected: Vec<ComponentId>,
        computed: Vec<ComponentId>,
    },
}

/// Resilience-layer failures, all naming the protected resource.
#[derive(Debug, Error)]
pub enum ResilienceError {
    /// The breaker rejected the call without invoking the operation.
    #[error("circuit {name} is open")]
    CircuitOpen { name: String },

    #[error("operation on {name} timed out after {timeout:?}")]
    OperationTimeout { name: String, timeout: Duration },

    #[error("bulkhead {name} is at capacity")]
    BulkheadFull { name: String },

    /// A single attempt failed with the wrapped operation's own error.
    #[error("operation on {name} failed: {source}")]
    Operation {
        name: String,
        #[source]
        source: BoxError,
    },

    /// All retry attempts were spent; wraps the final failure.
    #[error("retries exhausted for {name} after {attempts} attempts: {source}")]
    RetryExhausted {
        name: String,
        attempts: u32,
        #[source]
        source: Box<ResilienceError>,
    },
}

/// Component activation failures. Abort the whole unlock sequence.
#[derive(Debug, Error)]
pub enum ActivationError {
    #[error("pre-check failed for {component}: {reason}")]
    PreCheckFailed {
        component: ComponentId,
        reason: String,
    },

    #[error("activation failed for {component}: {source}")]
    ActivateFailed {
        component: ComponentId,
        #[source]
        source: BoxError,
    },
}

/// Union of the faults that can abort bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapCause {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Activation(#[from] ActivationError),
}

/// Bootstrap phase in which a failure occurred. Only the fallible
/// phases appear here: event bus construction and health monitor
/// startup cannot fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapPhase {
    Preconditions,
    ContractValidation,
    DependencyResolution,
    Activation,
}

impl fmt::Display for BootstrapPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BootstrapPhase::Preconditions => "precondition validation",
            BootstrapPhase::ContractValidation => "contract validation",
            BootstrapPhase::DependencyResolution => "dependency resolution",
            BootstrapPhase::Activation => "component activation",
        };
        write!(f, "{}", name)
    }
}

/// Top-level bootstrap failure. No partial runtime context survives one.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("bootstrap failed fast during {phase}: {source}")]
    FailFast {
        phase: BootstrapPhase,
        #[source]
        source: Box<BootstrapCause>,
    },
}

impl BootstrapError {
    pub fn fail_fast(phase: BootstrapPhase, cause: impl Into<BootstrapCause>) -> Self {
        BootstrapError::FailFast {
            phase,
            source: Box::new(cause.into()),
        }
    }

    pub fn phase(&self) -> BootstrapPhase {
        match self {
            BootstrapError::FailFast { phase, .. } => *phase,
        }
    }

    pub fn cause(&self) -> &BootstrapCause {
        match self {
            BootstrapError::FailFast { source, .. } => source,
        }
    }
}
