//! Shared runtime state.
//!
//! A concurrent key/value store visible to every component, plus the
//! readiness ledger the sequencer consults before activating a
//! component's dependents.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;

use crate::types::ComponentId;

/// Key set by the bootstrap once the shared context exists. The
/// sequencer refuses to activate anything before it appears.
pub const CONTEXT_READY_KEY: &str = "runtime.context";

#[derive(Debug, Default)]
pub struct SharedState {
    entries: DashMap<String, Value>,
    ready: DashMap<ComponentId, DateTime<Utc>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|entry| entry.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn context_initialized(&self) -> bool {
        self.contains(CONTEXT_READY_KEY)
    }

    pub fn mark_ready(&self, component: ComponentId) {
        self.ready.insert(component, Utc::now());
    }

    pub fn is_ready(&self, component: &ComponentId) -> bool {
        self.ready.contains_key(component)
    }

    /// Components marked ready, with when each came up.
    pub fn ready_components(&self) -> Vec<(ComponentId, DateTime<Utc>)> {
        self.ready
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.ready.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entries_round_trip() {
        let state = SharedState::new();
        assert!(state.get("key").is_none());

        state.set("key", json!({"n": 1}));
        assert_eq!(state.get("key"), Some(json!({"n": 1})));
        assert!(state.contains("key"));
    }

    #[test]
    fn context_flag_gates_initialization() {
        let state = SharedState::new();
        assert!(!state.context_initialized());
        state.set(CONTEXT_READY_KEY, json!(true));
        assert!(state.context_initialized());
    }

    #[test]
    fn readiness_ledger_tracks_components() {
        let state = SharedState::new();
        let id = ComponentId::new("AE2");
        assert!(!state.is_ready(&id));

        state.mark_ready(id.clone());
        assert!(state.is_ready(&id));
        assert_eq!(state.ready_components().len(), 1);

        state.clear();
        assert!(!state.is_ready(&id));
    }
}
