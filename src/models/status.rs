use std::fmt::{Display, Formatter, Result};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::notification::ProviderType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryResult {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub provider: ProviderType,
    pub timestamp: DateTime<Utc>,
}

impl DeliveryResult {
    pub fn delivered(provider: ProviderType, message_id: Option<String>) -> Self {
        Self {
            success: true,
            message_id,
            error: None,
            provider,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(provider: ProviderType, error: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
            provider,
            timestamp: Utc::now(),
        }
    }
}

/// What the consumer did with one dequeued payload.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlingOutcome {
    /// Not yet due; handed back to the queue for `until`.
    Deferred { until: DateTime<Utc> },
    /// Dispatched; the result may still be a failure.
    Dispatched(DeliveryResult),
}

impl Display for HandlingOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            HandlingOutcome::Deferred { until } => write!(f, "deferred until {}", until),
            HandlingOutcome::Dispatched(result) if result.success => {
                write!(f, "sent via {}", result.provider)
            }
            HandlingOutcome::Dispatched(result) => write!(f, "failed via {}", result.provider),
        }
    }
}
