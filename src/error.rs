use thiserror::Error;

use crate::models::notification::{NotificationType, ProviderType};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Provider {provider} is unavailable: {reason}")]
    ProviderUnavailable {
        provider: ProviderType,
        reason: String,
    },

    #[error("No provider configured for type: {0}")]
    NoProviderConfigured(NotificationType),

    #[error("Unsupported provider type: {0}")]
    UnsupportedProvider(String),

    #[error("Queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DispatchError {
    pub fn unavailable(provider: ProviderType, reason: impl Into<String>) -> Self {
        DispatchError::ProviderUnavailable {
            provider,
            reason: reason.into(),
        }
    }
}

impl From<lapin::Error> for DispatchError {
    fn from(e: lapin::Error) -> Self {
        DispatchError::QueueUnavailable(e.to_string())
    }
}
