use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::notification::{NotificationIntent, NotificationType, Priority, ProviderType};

/// The unit that travels through the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub id: String,

    #[serde(rename = "type")]
    pub notification_type: NotificationType,

    pub provider: ProviderType,

    /// Set when the caller chose the provider explicitly; failover is skipped.
    #[serde(default, skip_serializing_if = "is_false")]
    pub provider_pinned: bool,

    pub to: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_sid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_variables: Option<HashMap<String, String>>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl NotificationPayload {
    /// Builds a payload with a fresh id. `provider` is the resolved provider;
    /// it counts as pinned only when the intent named one itself.
    pub fn from_intent(intent: NotificationIntent, provider: ProviderType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            notification_type: intent.notification_type,
            provider_pinned: intent.provider.is_some(),
            provider,
            to: intent.to,
            subject: intent.subject,
            message: intent.message,
            metadata: intent.metadata,
            priority: Some(intent.priority),
            scheduled_at: intent.scheduled_at,
            created_at: Utc::now(),
            content_sid: intent.content_sid,
            content_variables: intent.content_variables,
        }
    }

    pub fn queue_priority(&self) -> u8 {
        self.priority.unwrap_or_default().queue_priority()
    }

    /// Time left until the scheduled send, or `None` when it is due.
    pub fn remaining_delay(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        self.scheduled_at
            .filter(|at| *at > now)
            .and_then(|at| (at - now).to_std().ok())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}
