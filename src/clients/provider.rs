use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    error::DispatchError,
    models::{message::NotificationPayload, notification::ProviderType, status::DeliveryResult},
};

/// A delivery backend for one provider identifier.
///
/// `attempt` reports vendor failures through the returned [`DeliveryResult`]
/// rather than an error, so the failover loop can move on to the next candidate.
#[async_trait]
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderType;

    /// Whether credentials and sender are present.
    fn is_operational(&self) -> bool;

    async fn attempt(&self, payload: &NotificationPayload) -> DeliveryResult;
}

impl std::fmt::Debug for dyn Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("kind", &self.kind())
            .field("operational", &self.is_operational())
            .finish()
    }
}

/// Builds provider instances for the registry.
pub trait ProviderFactory: Send + Sync {
    fn construct(&self, kind: ProviderType) -> Result<Arc<dyn Provider>, DispatchError>;
}
