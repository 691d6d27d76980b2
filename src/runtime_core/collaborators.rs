//! Pluggable bootstrap collaborators.

use async_trait::async_trait;
use tracing::debug;

use crate::graph::ComponentSpec;
use crate::types::ValidationError;

/// Validates component contracts before resolution. The default
/// accepts everything; deployments with versioned contracts supply
/// their own.
#[async_trait]
pub trait ContractValidator: Send + Sync {
    async fn validate(&self, components: &[ComponentSpec]) -> Result<(), ValidationError>;
}

pub struct AcceptAllContracts;

#[async_trait]
impl ContractValidator for AcceptAllContracts {
    async fn validate(&self, components: &[ComponentSpec]) -> Result<(), ValidationError> {
        debug!(components = components.len(), "contract validation skipped");
        Ok(())
    }
}

/// Started as the final bootstrap phase, after activation.
#[async_trait]
pub trait HealthMonitor: Send + Sync {
    async fn start(&self);
}

pub struct NoopHealthMonitor;

#[async_trait]
impl HealthMonitor for NoopHealthMonitor {
    async fn start(&self) {
        debug!("health monitor disabled");
    }
}
