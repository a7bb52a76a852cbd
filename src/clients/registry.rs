use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
    clients::provider::{Provider, ProviderFactory},
    error::DispatchError,
    models::notification::ProviderType,
};

/// Holds at most one provider instance per identifier for the life of the process.
pub struct ProviderRegistry {
    factory: Arc<dyn ProviderFactory>,
    providers: RwLock<HashMap<ProviderType, Arc<dyn Provider>>>,
}

impl ProviderRegistry {
    pub fn new(factory: Arc<dyn ProviderFactory>) -> Self {
        Self {
            factory,
            providers: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached provider, constructing it on first use. Readiness is
    /// checked on every call.
    pub async fn get(&self, kind: ProviderType) -> Result<Arc<dyn Provider>, DispatchError> {
        let provider = self
            .instance(kind)
            .await
            .map_err(|e| DispatchError::unavailable(kind, e.to_string()))?;

        if !provider.is_operational() {
            return Err(DispatchError::unavailable(kind, "configuration is invalid"));
        }

        Ok(provider)
    }

    /// Identifiers whose providers are ready to send. A provider the factory
    /// cannot build is a configuration error.
    pub async fn list_available(&self) -> Result<Vec<ProviderType>, DispatchError> {
        let mut available = Vec::new();

        for kind in ProviderType::ALL {
            let provider = self.instance(kind).await?;

            if provider.is_operational() {
                available.push(kind);
            } else {
                debug!(provider = %kind, "Provider is not operational");
            }
        }

        Ok(available)
    }

    async fn instance(&self, kind: ProviderType) -> Result<Arc<dyn Provider>, DispatchError> {
        if let Some(provider) = self.providers.read().await.get(&kind) {
            return Ok(Arc::clone(provider));
        }

        let mut providers = self.providers.write().await;

        // another task may have built it while we waited for the write lock
        if let Some(provider) = providers.get(&kind) {
            return Ok(Arc::clone(provider));
        }

        let provider = self.factory.construct(kind).inspect_err(|e| {
            warn!(provider = %kind, error = %e, "Failed to construct provider");
        })?;

        info!(provider = %kind, "Provider initialized");
        providers.insert(kind, Arc::clone(&provider));

        Ok(provider)
    }
}
