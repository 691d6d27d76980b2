//! Runtime configuration.
//!
//! Everything is plain data with serde derives so profiles can be
//! loaded from JSON, plus named preset constructors for the two
//! built-in runtime profiles.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::graph::{canonical_activation_order, default_component_set, ComponentSpec};
use crate::queue::OverflowPolicy;
use crate::resilience::RetryPolicy;
use crate::types::{ComponentId, RuntimeMode, DEFAULT_PRIORITY};

/// Event bus tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBusConfig {
    /// Capacity of the FIFO backend. Ignored by the priority backend.
    pub fifo_capacity: usize,
    /// Overflow policy for the FIFO backend.
    pub fifo_overflow: OverflowPolicy,
    /// Priority assigned to events published without an explicit one.
    pub default_priority: u8,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            fifo_capacity: 256,
            fifo_overflow: OverflowPolicy::DropOldest,
            default_priority: DEFAULT_PRIORITY,
        }
    }
}

/// Circuit breaker thresholds and windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,
    /// Consecutive half-open successes before the breaker closes.
    pub success_threshold: u32,
    /// How long the breaker stays open before probing.
    pub reset_timeout: Duration,
    /// Per-call deadline for guarded operations.
    pub operation_timeout: Duration,
}

impl CircuitBreakerConfig {
    /// Lenient settings for the minimal profile.
    pub fn minimal() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(15),
            operation_timeout: Duration::from_secs(5),
        }
    }

    /// Standard settings for the full profile.
    pub fn full() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            reset_timeout: Duration::from_secs(30),
            operation_timeout: Duration::from_secs(10),
        }
    }

    /// Trip fast, recover slowly. For dependencies that must not be
    /// hammered while degraded.
    pub fn critical() -> Self {
        Self {
            failure_threshold: 2,
            success_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            operation_timeout: Duration::from_secs(15),
        }
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::full()
    }
}

/// Bulkhead concurrency limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkheadConfig {
    /// Operations allowed to run at once.
    pub max_concurrent: usize,
    /// Callers allowed to wait for a slot before rejection.
    pub max_queue_length: usize,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 8,
            max_queue_length: 16,
        }
    }
}

/// Telemetry switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub metrics_enabled: bool,
    /// Record per-attempt counters in addition to aggregates.
    pub detailed_metrics: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            metrics_enabled: true,
            detailed_metrics: false,
        }
    }
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub mode: RuntimeMode,
    pub bus: EventBusConfig,
    pub breaker: CircuitBreakerConfig,
    pub retry: RetryPolicy,
    pub bulkhead: BulkheadConfig,
    pub telemetry: TelemetryConfig,
    /// Components the bootstrap will resolve and activate.
    pub components: Vec<ComponentSpec>,
    /// Expected activation order; resolution fails if the computed
    /// order differs. `None` disables the check.
    pub canonical_order: Option<Vec<ComponentId>>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        full_runtime_config()
    }
}

/// Lean profile: FIFO bus, lenient breaker, smaller queues.
pub fn minimal_runtime_config() -> RuntimeConfig {
    RuntimeConfig {
        mode: RuntimeMode::Minimal,
        bus: EventBusConfig {
            fifo_capacity: 128,
            ..EventBusConfig::default()
        },
        breaker: CircuitBreakerConfig::minimal(),
        retry: RetryPolicy::default(),
        bulkhead: BulkheadConfig::default(),
        telemetry: TelemetryConfig {
            detailed_metrics: false,
            ..TelemetryConfig::default()
        },
        components: default_component_set(),
        canonical_order: Some(canonical_activation_order()),
    }
}

/// Standard profile: priority bus and production breaker thresholds.
pub fn full_runtime_config() -> RuntimeConfig {
    RuntimeConfig {
        mode: RuntimeMode::Full,
        bus: EventBusConfig::default(),
        breaker: CircuitBreakerConfig::full(),
        retry: RetryPolicy::default(),
        bulkhead: BulkheadConfig::default(),
        telemetry: TelemetryConfig::default(),
        components: default_component_set(),
        canonical_order: Some(canonical_activation_order()),
    }
}
