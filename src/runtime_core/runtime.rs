//! Bootstrap orchestration and the running runtime handle.
//!
//! [`Bootstrap`] drives the six startup phases in order and fails
//! fast: the first phase error aborts the whole sequence, wrapped
//! with the phase it came from. The result is an [`AetherRuntime`], a
//! cheap-to-clone handle over the assembled subsystems.

use std::fmt;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::bus::EventBus;
use crate::clock::{Clock, SystemClock};
use crate::config::{minimal_runtime_config, full_runtime_config, RuntimeConfig};
use crate::graph::Resolver;
use crate::resilience::{CircuitBreaker, CircuitBreakerRegistry};
use crate::runtime_core::{
    AcceptAllContracts, ContractValidator, HealthMonitor, NoopHealthMonitor, SharedState,
    CONTEXT_READY_KEY,
};
use crate::sequencer::{ComponentHooks, UnlockSequencer};
use crate::telemetry::RuntimeTelemetry;
use crate::types::{
    topics, BootstrapError, BootstrapPhase, ComponentId, RuntimeMode, ValidationError,
};

struct RuntimeInner {
    config: RuntimeConfig,
    bus: Arc<EventBus>,
    breakers: Arc<CircuitBreakerRegistry>,
    state: Arc<SharedState>,
    activation_order: Vec<ComponentId>,
    telemetry: Arc<RuntimeTelemetry>,
    shutdown: RwLock<bool>,
}

/// Handle over a bootstrapped runtime. Clones share the same
/// underlying subsystems.
#[derive(Clone)]
pub struct AetherRuntime {
    inner: Arc<RuntimeInner>,
}

// Manual impl: the inner holds non-Debug collaborator trait objects.
impl fmt::Debug for AetherRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AetherRuntime")
            .field("mode", &self.inner.config.mode)
            .field("activation_order", &self.inner.activation_order)
            .finish_non_exhaustive()
    }
}

/// Staged runtime construction. Collaborators not supplied fall back
/// to the built-in defaults.
pub struct Bootstrap {
    config: RuntimeConfig,
    sequencer: UnlockSequencer,
    validator: Box<dyn ContractValidator>,
    monitor: Arc<dyn HealthMonitor>,
    clock: Arc<dyn Clock>,
}

impl Bootstrap {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            sequencer: UnlockSequencer::new(),
            validator: Box::new(AcceptAllContracts),
            monitor: Arc::new(NoopHealthMonitor),
            clock: Arc::new(SystemClock),
        }
    }

    /// Attach lifecycle hooks for a component.
    pub fn with_hooks(mut self, id: impl Into<String>, hooks: Arc<dyn ComponentHooks>) -> Self {
        self.sequencer.register(id, hooks);
        self
    }

    pub fn with_contract_validator(mut self, validator: Box<dyn ContractValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_health_monitor(mut self, monitor: Arc<dyn HealthMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run all bootstrap phases and return the live runtime.
    pub async fn run(self) -> Result<AetherRuntime, BootstrapError> {
        let mode = self.config.mode;
        info!(%mode, "bootstrap starting");

        debug!("Phase 1: preconditions");
        if self.config.components.is_empty() {
            return Err(BootstrapError::fail_fast(
                BootstrapPhase::Preconditions,
                ValidationError::EmptyComponentSet,
            ));
        }

        debug!("Phase 2: contract validation");
        self.validator
            .validate(&self.config.components)
            .await
            .map_err(|err| BootstrapError::fail_fast(BootstrapPhase::ContractValidation, err))?;

        debug!("Phase 3: dependency resolution");
        let mut resolver = Resolver::new(self.config.components.clone());
        if let Some(order) = &self.config.canonical_order {
            resolver = resolver.with_canonical_order(order.clone());
        }
        let graph = resolver
            .resolve()
            .map_err(|err| BootstrapError::fail_fast(BootstrapPhase::DependencyResolution, err))?;

        debug!("Phase 4: event bus and shared context");
        let bus = Arc::new(match mode {
            RuntimeMode::Full => EventBus::priority(&self.config.bus),
            RuntimeMode::Minimal => EventBus::fifo(&self.config.bus),
        });
        let telemetry = Arc::new(RuntimeTelemetry::new(self.config.telemetry.clone()));
        let breakers = Arc::new(
            CircuitBreakerRegistry::new(self.config.breaker.clone())
                .with_event_bus(Arc::clone(&bus))
                .with_clock(Arc::clone(&self.clock)),
        );
        let state = Arc::new(SharedState::new());
        state.set(CONTEXT_READY_KEY, json!(true));

        let metered = Arc::clone(&telemetry);
        bus.subscribe(
            "*",
            Arc::new(move |event| metered.event_published(&event.event_type)),
        );
        let metered = Arc::clone(&telemetry);
        bus.subscribe(
            topics::CIRCUIT_STATE_CHANGE,
            Arc::new(move |event| {
                let field = |key: &str| {
                    event
                        .payload
                        .get(key)
                        .and_then(|value| value.as_str())
                        .unwrap_or("unknown")
                };
                metered.breaker_transition(field("breaker"), field("to"));
            }),
        );
        bus.publish(topics::BOOTSTRAP_STARTED, json!({ "mode": mode.to_string() }));

        debug!("Phase 5: component activation");
        self.sequencer
            .run(&graph, &state, &bus, &telemetry)
            .await
            .map_err(|err| BootstrapError::fail_fast(BootstrapPhase::Activation, err))?;

        debug!("Phase 6: health monitor");
        let monitor = Arc::clone(&self.monitor);
        tokio::spawn(async move {
            monitor.start().await;
        });

        telemetry.bootstrap_completed(mode);
        info!(%mode, components = graph.len(), "bootstrap complete");

        Ok(AetherRuntime {
            inner: Arc::new(RuntimeInner {
                config: self.config,
                bus,
                breakers,
                state,
                activation_order: graph.computed_order().to_vec(),
                telemetry,
                shutdown: RwLock::new(false),
            }),
        })
    }
}

impl AetherRuntime {
    /// Bootstrap with an explicit configuration.
    pub async fn bootstrap(config: RuntimeConfig) -> Result<Self, BootstrapError> {
        Bootstrap::new(config).run().await
    }

    /// Bootstrap one of the named profiles: `"minimal"` or `"full"`.
    pub async fn bootstrap_mode(mode: &str) -> Result<Self, BootstrapError> {
        let mode = RuntimeMode::parse(mode)
            .map_err(|err| BootstrapError::fail_fast(BootstrapPhase::Preconditions, err))?;
        let config = match mode {
            RuntimeMode::Minimal => minimal_runtime_config(),
            RuntimeMode::Full => full_runtime_config(),
        };
        Self::bootstrap(config).await
    }

    pub fn mode(&self) -> RuntimeMode {
        self.inner.config.mode
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.inner.bus
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.inner.breakers
    }

    /// Named breaker with the runtime's default thresholds, created
    /// on first use.
    pub fn breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        self.inner.breakers.get_or_create(name)
    }

    pub fn shared_state(&self) -> &Arc<SharedState> {
        &self.inner.state
    }

    pub fn activation_order(&self) -> &[ComponentId] {
        &self.inner.activation_order
    }

    pub fn telemetry(&self) -> &Arc<RuntimeTelemetry> {
        &self.inner.telemetry
    }

    pub async fn is_shutting_down(&self) -> bool {
        *self.inner.shutdown.read().await
    }

    /// Announce shutdown, flush telemetry, and mark the runtime
    /// stopped. Safe to call more than once.
    pub async fn shutdown(&self) {
        {
            let mut shutdown = self.inner.shutdown.write().await;
            if *shutdown {
                warn!("shutdown already in progress");
                return;
            }
            *shutdown = true;
        }

        info!(mode = %self.inner.config.mode, "runtime shutting down");
        self.inner.bus.publish(
            topics::BOOTSTRAP_SHUTDOWN,
            json!({ "mode": self.inner.config.mode.to_string() }),
        );
        self.inner.telemetry.flush().await;
    }
}
