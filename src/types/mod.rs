//! Core data types shared across the runtime.

pub mod errors;
pub mod event;
pub mod ids;
pub mod mode;

pub use errors::{
    ActivationError, BootstrapCause, BootstrapError, BootstrapPhase, BoxError, GraphError,
    ResilienceError, ValidationError,
};
pub use event::{topics, Event, PublishOpts, DEFAULT_PRIORITY};
pub use ids::{ComponentId, SubscriptionId};
pub use mode::RuntimeMode;
