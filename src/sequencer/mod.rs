//! Component activation.
//!
//! The sequencer walks the resolved activation order and brings each
//! component up in turn: pre-checks first (shared context present,
//! every dependency already ready, then the component's own gate),
//! then the component's activation hook. The first failure aborts the
//! whole sequence.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use crate::bus::EventBus;
use crate::graph::DependencyGraph;
use crate::runtime_core::SharedState;
use crate::telemetry::RuntimeTelemetry;
use crate::types::{topics, ActivationError, BoxError, ComponentId};

/// Per-component lifecycle hooks. Both default to no-ops so simple
/// components only implement what they need.
#[async_trait]
pub trait ComponentHooks: Send + Sync {
    /// Component-specific readiness gate, run after the built-in
    /// checks. Return an explanation to veto activation.
    async fn pre_check(&self, _state: &SharedState) -> Result<(), String> {
        Ok(())
    }

    /// Bring the component up.
    async fn activate(&self, _state: &SharedState) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Hooks for components that need no custom behavior.
pub struct NoopHooks;

#[async_trait]
impl ComponentHooks for NoopHooks {}

pub struct UnlockSequencer {
    hooks: HashMap<ComponentId, Arc<dyn ComponentHooks>>,
}

impl UnlockSequencer {
    pub fn new() -> Self {
        Self {
            hooks: HashMap::new(),
        }
    }

    pub fn register(&mut self, id: impl Into<String>, hooks: Arc<dyn ComponentHooks>) {
        self.hooks.insert(ComponentId::new(id), hooks);
    }

    /// Activate every component in the graph's computed order.
    pub async fn run(
        &self,
        graph: &DependencyGraph,
        state: &SharedState,
        bus: &EventBus,
        telemetry: &RuntimeTelemetry,
    ) -> Result<(), ActivationError> {
        for id in graph.computed_order() {
            let Some(spec) = graph.node(id) else {
                continue;
            };

            if !state.context_initialized() {
                return Err(ActivationError::PreCheckFailed {
                    component: id.clone(),
                    reason: "shared context not initialized".to_string(),
                });
            }
            for dependency in &spec.depends_on {
                if !state.is_ready(dependency) {
                    return Err(ActivationError::PreCheckFailed {
                        component: id.clone(),
                        reason: format!("dependency {dependency} not ready"),
                    });
                }
            }
            if let Some(hooks) = self.hooks.get(id) {
                if let Err(reason) = hooks.pre_check(state).await {
                    return Err(ActivationError::PreCheckFailed {
                        component: id.clone(),
                        reason,
                    });
                }
            }

            debug!(component = %id, "activating");
            bus.publish(
                topics::COMPONENT_ACTIVATING,
                json!({ "component": id.as_str() }),
            );

            if let Some(hooks) = self.hooks.get(id) {
                hooks
                    .activate(state)
                    .await
                    .map_err(|source| ActivationError::ActivateFailed {
                        component: id.clone(),
                        source,
                    })?;
            }

            state.mark_ready(id.clone());
            telemetry.component_activated(id);
            bus.publish(
                topics::COMPONENT_ACTIVATED,
                json!({ "component": id.as_str() }),
            );
            info!(component = %id, "component activated");
        }
        Ok(())
    }
}

impl Default for UnlockSequencer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EventBusConfig, TelemetryConfig};
    use crate::graph::{default_component_set, Resolver};
    use crate::runtime_core::CONTEXT_READY_KEY;

    fn fixture() -> (DependencyGraph, SharedState, EventBus, RuntimeTelemetry) {
        let graph = Resolver::new(default_component_set()).resolve().unwrap();
        let state = SharedState::new();
        state.set(CONTEXT_READY_KEY, json!(true));
        let bus = EventBus::priority(&EventBusConfig::default());
        let telemetry = RuntimeTelemetry::new(TelemetryConfig::default());
        (graph, state, bus, telemetry)
    }

    #[tokio::test]
    async fn activates_all_components_in_order() {
        let (graph, state, bus, telemetry) = fixture();
        let sequencer = UnlockSequencer::new();

        sequencer.run(&graph, &state, &bus, &telemetry).await.unwrap();

        for id in graph.computed_order() {
            assert!(state.is_ready(id));
        }
        assert_eq!(telemetry.counter("components.activated"), 3);
    }

    #[tokio::test]
    async fn missing_context_fails_pre_check() {
        let (graph, _, bus, telemetry) = fixture();
        let state = SharedState::new();
        let sequencer = UnlockSequencer::new();

        let err = sequencer
            .run(&graph, &state, &bus, &telemetry)
            .await
            .unwrap_err();
        assert!(matches!(err, ActivationError::PreCheckFailed { .. }));
    }

    #[tokio::test]
    async fn hook_veto_stops_the_sequence() {
        struct Veto;

        #[async_trait]
        impl ComponentHooks for Veto {
            async fn pre_check(&self, _state: &SharedState) -> Result<(), String> {
                Err("not warmed up".to_string())
            }
        }

        let (graph, state, bus, telemetry) = fixture();
        let mut sequencer = UnlockSequencer::new();
        sequencer.register("AE1", Arc::new(Veto));

        let err = sequencer
            .run(&graph, &state, &bus, &telemetry)
            .await
            .unwrap_err();

        match err {
            ActivationError::PreCheckFailed { component, reason } => {
                assert_eq!(component.as_str(), "AE1");
                assert_eq!(reason, "not warmed up");
            }
            other => panic!("expected PreCheckFailed, got {other:?}"),
        }
        // AE2 came first in the order and had already activated.
        assert!(state.is_ready(&ComponentId::new("AE2")));
        assert!(!state.is_ready(&ComponentId::new("AE1")));
        assert!(!state.is_ready(&ComponentId::new("AE3")));
    }

    #[tokio::test]
    async fn activation_failure_carries_the_source() {
        struct Broken;

        #[async_trait]
        impl ComponentHooks for Broken {
            async fn activate(&self, _state: &SharedState) -> Result<(), BoxError> {
                Err("port in use".into())
            }
        }

        let (graph, state, bus, telemetry) = fixture();
        let mut sequencer = UnlockSequencer::new();
        sequencer.register("AE2", Arc::new(Broken));

        let err = sequencer
            .run(&graph, &state, &bus, &telemetry)
            .await
            .unwrap_err();
        match err {
            ActivationError::ActivateFailed { component, source } => {
                assert_eq!(component.as_str(), "AE2");
                assert_eq!(source.to_string(), "port in use");
            }
            other => panic!("expected ActivateFailed, got {other:?}"),
        }
    }
}
