//! Runtime assembly: bootstrap orchestration and shared state.

pub mod collaborators;
pub mod runtime;
pub mod shared_state;

pub use collaborators::{AcceptAllContracts, ContractValidator, HealthMonitor, NoopHealthMonitor};
pub use runtime::{AetherRuntime, Bootstrap};
pub use shared_state::{SharedState, CONTEXT_READY_KEY};
