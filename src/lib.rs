//! Aether runtime: a modular-runtime control plane.
//!
//! The crate assembles four subsystems behind one bootstrap entry
//! point: dependency-graph resolution with deterministic activation
//! ordering, an in-process event bus with priority and bounded-FIFO
//! backends, a resilience layer (circuit breakers, retry policies,
//! bulkheads), and the phased bootstrap that wires them together.
//!
//! ```no_run
//! use aether_runtime::AetherRuntime;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = AetherRuntime::bootstrap_mode("full").await?;
//!
//!     runtime.event_bus().publish("app.started", serde_json::json!({}));
//!     let breaker = runtime.breaker("downstream-api");
//!     let answer = breaker
//!         .call(|| async { Ok::<u32, aether_runtime::BoxError>(42) })
//!         .await?;
//!     assert_eq!(answer, 42);
//!
//!     runtime.shutdown().await;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

pub mod bus;
pub mod clock;
pub mod config;
pub mod graph;
pub mod queue;
pub mod resilience;
pub mod runtime_core;
pub mod sequencer;
pub mod telemetry;
pub mod types;

pub use bus::{BusStats, EventBus, EventHandler, Topic};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    full_runtime_config, minimal_runtime_config, BulkheadConfig, CircuitBreakerConfig,
    EventBusConfig, RuntimeConfig, TelemetryConfig,
};
pub use graph::{
    canonical_activation_order, default_component_set, ComponentSpec, DependencyGraph, Resolver,
};
pub use queue::{BoundedBuffer, BufferStats, OverflowPolicy, PriorityQueue};
pub use resilience::{
    Bulkhead, CircuitBreaker, CircuitBreakerRegistry, CircuitBreakerStats, CircuitState,
    FailurePolicy, FailurePolicyExecutor, RetryPolicy,
};
pub use runtime_core::{
    AcceptAllContracts, AetherRuntime, Bootstrap, ContractValidator, HealthMonitor,
    NoopHealthMonitor, SharedState, CONTEXT_READY_KEY,
};
pub use sequencer::{ComponentHooks, NoopHooks, UnlockSequencer};
pub use telemetry::RuntimeTelemetry;
pub use types::{
    topics, ActivationError, BootstrapCause, BootstrapError, BootstrapPhase, BoxError,
    ComponentId, Event, GraphError, PublishOpts, ResilienceError, RuntimeMode, SubscriptionId,
    ValidationError, DEFAULT_PRIORITY,
};
