//! Event model for the runtime event bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Default event priority. Lower values are more urgent.
pub const DEFAULT_PRIORITY: u8 = 5;

/// Well-known event types emitted by the control plane.
pub mod topics {
    pub const BOOTSTRAP_STARTED: &str = "bootstrap.started";
    pub const BOOTSTRAP_SHUTDOWN: &str = "bootstrap.shutdown";
    pub const COMPONENT_ACTIVATING: &str = "component.activating";
    pub const COMPONENT_ACTIVATED: &str = "component.activated";
    pub const CIRCUIT_STATE_CHANGE: &str = "circuit.state_change";
    pub const CIRCUIT_FAILURE: &str = "circuit.failure";
    pub const CIRCUIT_SUCCESS: &str = "circuit.success";
    pub const CIRCUIT_REJECTED: &str = "circuit.rejected";
}

/// A single event published on the bus. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic id, unique within one bus instance.
    pub id: u64,

    /// Event type, e.g. `component.activated`.
    pub event_type: String,

    /// Opaque payload.
    pub payload: Value,

    /// Dispatch priority; lower values dispatch first on the heap backend.
    pub priority: u8,

    /// Wall-clock publish time.
    pub timestamp: DateTime<Utc>,

    /// Publishing subsystem, if known.
    pub source: Option<String>,

    /// Correlates events belonging to one logical operation.
    pub correlation_id: Option<String>,

    /// Free-form metadata.
    pub metadata: HashMap<String, String>,
}

/// Optional fields accepted by [`EventBus::publish`](crate::bus::EventBus::publish).
#[derive(Debug, Clone, Default)]
pub struct PublishOpts {
    pub priority: Option<u8>,
    pub source: Option<String>,
    pub correlation_id: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl PublishOpts {
    /// Override the bus default priority.
    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}
