use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    clients::provider::{Provider, ProviderFactory},
    config::Config,
    error::DispatchError,
    models::{message::NotificationPayload, notification::ProviderType, status::DeliveryResult},
};

/// Bound on a whole adapter request, body included.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for adapter calls. `timeout` bounds the full request so a
/// stalled adapter cannot hold a worker.
pub fn adapter_http_client(timeout: Duration) -> Result<Client, Error> {
    Client::builder()
        .connect_timeout(timeout)
        .timeout(timeout)
        .build()
        .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))
}

#[derive(Debug, Clone)]
pub enum AdapterAuth {
    Bearer(String),
    Basic { username: String, password: String },
}

impl AdapterAuth {
    fn is_complete(&self) -> bool {
        match self {
            AdapterAuth::Bearer(token) => !token.is_empty(),
            AdapterAuth::Basic { username, password } => {
                !username.is_empty() && !password.is_empty()
            }
        }
    }
}

/// Where and as whom a provider adapter sends.
#[derive(Debug, Clone)]
pub struct AdapterSettings {
    pub endpoint: String,
    pub auth: AdapterAuth,
    pub sender: String,
}

impl AdapterSettings {
    pub fn is_complete(&self) -> bool {
        !self.endpoint.is_empty() && !self.sender.is_empty() && self.auth.is_complete()
    }

    /// Settings for `kind` from the environment; missing values become empty
    /// strings so the provider reports itself not operational.
    pub fn from_config(config: &Config, kind: ProviderType) -> Self {
        let value = |v: &Option<String>| v.clone().unwrap_or_default();

        let twilio_auth = AdapterAuth::Basic {
            username: value(&config.twilio_account_sid),
            password: value(&config.twilio_auth_token),
        };

        match kind {
            ProviderType::Resend => Self {
                endpoint: value(&config.resend_endpoint),
                auth: AdapterAuth::Bearer(value(&config.resend_api_key)),
                sender: value(&config.resend_from),
            },
            ProviderType::Sendgrid => Self {
                endpoint: value(&config.sendgrid_endpoint),
                auth: AdapterAuth::Bearer(value(&config.sendgrid_api_key)),
                sender: value(&config.sendgrid_from),
            },
            ProviderType::Mailersend => Self {
                endpoint: value(&config.mailersend_endpoint),
                auth: AdapterAuth::Bearer(value(&config.mailersend_api_key)),
                sender: value(&config.mailersend_from),
            },
            ProviderType::TwilioSms => Self {
                endpoint: value(&config.twilio_sms_endpoint),
                auth: twilio_auth,
                sender: value(&config.twilio_phone_number),
            },
            ProviderType::TwilioWhatsapp => Self {
                endpoint: value(&config.twilio_whatsapp_endpoint),
                auth: twilio_auth,
                sender: value(&config.twilio_whatsapp_number),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest<'a> {
    pub notification_id: &'a str,
    pub provider: ProviderType,
    pub from: &'a str,
    pub to: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<&'a str>,

    pub message: &'a str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<&'a HashMap<String, serde_json::Value>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_sid: Option<&'a str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_variables: Option<&'a HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendResponse {
    message_id: Option<String>,
}

/// Sends through a provider's adapter endpoint over HTTP.
pub struct HttpProviderAdapter {
    kind: ProviderType,
    http_client: Client,
    settings: AdapterSettings,
}

impl HttpProviderAdapter {
    pub fn new(kind: ProviderType, http_client: Client, settings: AdapterSettings) -> Self {
        Self {
            kind,
            http_client,
            settings,
        }
    }

    fn build_request<'a>(&'a self, payload: &'a NotificationPayload) -> SendRequest<'a> {
        let to = match self.kind {
            ProviderType::TwilioWhatsapp if !payload.to.starts_with("whatsapp:") => {
                format!("whatsapp:{}", payload.to)
            }
            _ => payload.to.clone(),
        };

        let subject = match self.kind {
            ProviderType::Resend | ProviderType::Sendgrid | ProviderType::Mailersend => {
                Some(payload.subject.as_deref().unwrap_or("Notification"))
            }
            _ => None,
        };

        SendRequest {
            notification_id: &payload.id,
            provider: self.kind,
            from: &self.settings.sender,
            to,
            subject,
            message: &payload.message,
            metadata: payload.metadata.as_ref(),
            content_sid: payload.content_sid.as_deref(),
            content_variables: payload.content_variables.as_ref(),
        }
    }

    async fn send_once(&self, payload: &NotificationPayload) -> Result<Option<String>, Error> {
        let request = self.build_request(payload);

        let builder = self.http_client.post(&self.settings.endpoint).json(&request);
        let builder = match &self.settings.auth {
            AdapterAuth::Bearer(token) => builder.bearer_auth(token),
            AdapterAuth::Basic { username, password } => {
                builder.basic_auth(username, Some(password))
            }
        };

        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(if error_text.is_empty() {
                anyhow!("{} returned status {}", self.kind, status)
            } else {
                anyhow!(error_text)
            });
        }

        let header_id = response
            .headers()
            .get("x-message-id")
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let body = response.bytes().await?;
        let parsed = serde_json::from_slice::<SendResponse>(&body).unwrap_or_default();

        Ok(parsed.message_id.or(header_id))
    }
}

#[async_trait]
impl Provider for HttpProviderAdapter {
    fn kind(&self) -> ProviderType {
        self.kind
    }

    fn is_operational(&self) -> bool {
        self.settings.is_complete()
    }

    async fn attempt(&self, payload: &NotificationPayload) -> DeliveryResult {
        debug!(
            notification_id = %payload.id,
            provider = %self.kind,
            "Sending notification through provider adapter"
        );

        match self.send_once(payload).await {
            Ok(message_id) => DeliveryResult::delivered(self.kind, message_id),
            Err(e) => {
                warn!(
                    notification_id = %payload.id,
                    provider = %self.kind,
                    error = %e,
                    "Provider adapter rejected notification"
                );
                DeliveryResult::failed(self.kind, e.to_string())
            }
        }
    }
}

/// Builds [`HttpProviderAdapter`]s from the process configuration, sharing one HTTP client.
pub struct ConfiguredProviderFactory {
    config: Config,
    http_client: Client,
}

impl ConfiguredProviderFactory {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let http_client = adapter_http_client(REQUEST_TIMEOUT)?;

        info!("Provider adapter factory initialized");

        Ok(Self {
            config: config.clone(),
            http_client,
        })
    }
}

impl ProviderFactory for ConfiguredProviderFactory {
    fn construct(&self, kind: ProviderType) -> Result<Arc<dyn Provider>, DispatchError> {
        let settings = AdapterSettings::from_config(&self.config, kind);

        Ok(Arc::new(HttpProviderAdapter::new(
            kind,
            self.http_client.clone(),
            settings,
        )))
    }
}
