use std::{
    collections::HashMap,
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::DispatchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Email,
    Sms,
    Whatsapp,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Email => "email",
            NotificationType::Sms => "sms",
            NotificationType::Whatsapp => "whatsapp",
        }
    }
}

impl Display for NotificationType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    Resend,
    Sendgrid,
    Mailersend,
    TwilioSms,
    TwilioWhatsapp,
}

impl ProviderType {
    /// Every provider the service knows how to build, in listing order.
    pub const ALL: [ProviderType; 5] = [
        ProviderType::Resend,
        ProviderType::Sendgrid,
        ProviderType::Mailersend,
        ProviderType::TwilioSms,
        ProviderType::TwilioWhatsapp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Resend => "resend",
            ProviderType::Sendgrid => "sendgrid",
            ProviderType::Mailersend => "mailersend",
            ProviderType::TwilioSms => "twilio_sms",
            ProviderType::TwilioWhatsapp => "twilio_whatsapp",
        }
    }

    /// Providers that deliver pre-approved templates instead of free text.
    pub fn is_template_based(&self) -> bool {
        matches!(self, ProviderType::TwilioWhatsapp)
    }

    /// Parses a comma separated ranking such as `resend, sendgrid`.
    pub fn parse_list(value: &str) -> Result<Vec<ProviderType>, DispatchError> {
        value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ProviderType::from_str)
            .collect()
    }
}

impl Display for ProviderType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderType {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderType::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| DispatchError::UnsupportedProvider(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    /// Broker priority for this tier; the queue is declared with a maximum of 10.
    pub fn queue_priority(self) -> u8 {
        match self {
            Priority::Low => 1,
            Priority::Normal => 5,
            Priority::High => 10,
        }
    }
}

/// A caller's request to send one notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationIntent {
    #[serde(rename = "type")]
    pub notification_type: NotificationType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderType>,

    pub to: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<HashMap<String, serde_json::Value>>,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_sid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_variables: Option<HashMap<String, String>>,
}

impl NotificationIntent {
    pub fn new(
        notification_type: NotificationType,
        to: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            notification_type,
            provider: None,
            to: to.into(),
            subject: None,
            message: message.into(),
            metadata: None,
            priority: Priority::Normal,
            scheduled_at: None,
            content_sid: None,
            content_variables: None,
        }
    }

    pub fn with_provider(mut self, provider: ProviderType) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_scheduled_at(mut self, scheduled_at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(scheduled_at);
        self
    }

    pub fn with_template(
        mut self,
        content_sid: impl Into<String>,
        content_variables: HashMap<String, String>,
    ) -> Self {
        self.content_sid = Some(content_sid.into());
        self.content_variables = Some(content_variables);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BulkNotificationRequest {
    #[schema(min_items = 1, max_items = 100)]
    pub notifications: Vec<NotificationIntent>,
}
