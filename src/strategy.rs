//! Provider selection and the failover attempt loop.

use std::{collections::HashMap, time::Duration};

use anyhow::{Error, Result, anyhow};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::{
    clients::{provider::Provider, registry::ProviderRegistry},
    config::Config,
    error::DispatchError,
    models::{
        message::NotificationPayload,
        notification::{NotificationType, ProviderType},
        status::DeliveryResult,
    },
};

/// Fixed one-provider-per-channel mapping.
#[derive(Debug, Clone)]
pub struct DirectRouting {
    defaults: HashMap<NotificationType, ProviderType>,
}

impl Default for DirectRouting {
    fn default() -> Self {
        Self {
            defaults: HashMap::from([
                (NotificationType::Email, ProviderType::Resend),
                (NotificationType::Sms, ProviderType::TwilioSms),
                (NotificationType::Whatsapp, ProviderType::TwilioWhatsapp),
            ]),
        }
    }
}

impl DirectRouting {
    pub fn new(defaults: HashMap<NotificationType, ProviderType>) -> Self {
        Self { defaults }
    }

    pub fn provider_for(&self, kind: NotificationType) -> Result<ProviderType, DispatchError> {
        self.defaults
            .get(&kind)
            .copied()
            .ok_or(DispatchError::NoProviderConfigured(kind))
    }
}

/// Ranked provider preferences per channel.
#[derive(Debug, Clone)]
pub struct FailoverRouting {
    ranked: HashMap<NotificationType, Vec<ProviderType>>,
    fallback: DirectRouting,
}

impl Default for FailoverRouting {
    fn default() -> Self {
        Self {
            ranked: HashMap::from([
                (
                    NotificationType::Email,
                    vec![ProviderType::Resend, ProviderType::Sendgrid],
                ),
                (NotificationType::Sms, vec![ProviderType::TwilioSms]),
                (NotificationType::Whatsapp, vec![ProviderType::TwilioWhatsapp]),
            ]),
            fallback: DirectRouting::default(),
        }
    }
}

impl FailoverRouting {
    /// Replaces the ranking for one channel; an empty list removes it.
    pub fn with_ranking(mut self, kind: NotificationType, providers: Vec<ProviderType>) -> Self {
        if providers.is_empty() {
            self.ranked.remove(&kind);
        } else {
            self.ranked.insert(kind, providers);
        }
        self
    }

    pub fn candidates_for(&self, payload: &NotificationPayload) -> Result<Vec<ProviderType>, DispatchError> {
        if payload.provider_pinned {
            return Ok(vec![payload.provider]);
        }

        match self.ranked.get(&payload.notification_type) {
            Some(ranked) if !ranked.is_empty() => Ok(ranked.clone()),
            _ => Ok(vec![self.fallback.provider_for(payload.notification_type)?]),
        }
    }

    pub fn default_provider(&self, kind: NotificationType) -> Result<ProviderType, DispatchError> {
        match self.ranked.get(&kind).and_then(|ranked| ranked.first()) {
            Some(provider) => Ok(*provider),
            None => self.fallback.provider_for(kind),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Routing {
    Direct(DirectRouting),
    Failover(FailoverRouting),
}

impl Routing {
    pub fn name(&self) -> &'static str {
        match self {
            Routing::Direct(_) => "direct",
            Routing::Failover(_) => "failover",
        }
    }
}

/// Chooses providers for a payload and drives the attempts.
pub struct DispatchStrategy {
    routing: Routing,
    attempt_timeout: Option<Duration>,
}

impl DispatchStrategy {
    pub fn direct(routing: DirectRouting) -> Self {
        Self {
            routing: Routing::Direct(routing),
            attempt_timeout: None,
        }
    }

    pub fn failover(routing: FailoverRouting) -> Self {
        Self {
            routing: Routing::Failover(routing),
            attempt_timeout: None,
        }
    }

    pub fn with_attempt_timeout(mut self, attempt_timeout: Option<Duration>) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let strategy = match config.dispatch_strategy.trim().to_ascii_lowercase().as_str() {
            "direct" => Self::direct(DirectRouting::default()),
            "failover" => {
                let mut routing = FailoverRouting::default();
                let overrides = [
                    (NotificationType::Email, &config.email_providers),
                    (NotificationType::Sms, &config.sms_providers),
                    (NotificationType::Whatsapp, &config.whatsapp_providers),
                ];

                for (kind, value) in overrides {
                    if let Some(ranked) = Config::ranked_providers(value)? {
                        routing = routing.with_ranking(kind, ranked);
                    }
                }

                Self::failover(routing)
            }
            other => return Err(anyhow!("Unknown dispatch strategy: {}", other)),
        };

        info!(strategy = strategy.routing.name(), "Dispatch strategy selected");

        Ok(strategy.with_attempt_timeout(config.attempt_timeout()))
    }

    pub fn routing(&self) -> &Routing {
        &self.routing
    }

    /// Provider recorded on a payload when the caller names none.
    pub fn default_provider(&self, kind: NotificationType) -> Result<ProviderType, DispatchError> {
        match &self.routing {
            Routing::Direct(direct) => direct.provider_for(kind),
            Routing::Failover(failover) => failover.default_provider(kind),
        }
    }

    pub async fn send(
        &self,
        payload: &NotificationPayload,
        registry: &ProviderRegistry,
    ) -> Result<DeliveryResult, DispatchError> {
        match &self.routing {
            Routing::Direct(_) => {
                let provider = registry.get(payload.provider).await?;
                Ok(self.attempt(payload, provider.as_ref()).await)
            }
            Routing::Failover(failover) => {
                let candidates = failover.candidates_for(payload)?;
                Ok(self.send_with_failover(payload, &candidates, registry).await)
            }
        }
    }

    /// Tries candidates in order until one succeeds. Only the most recent
    /// error survives exhaustion.
    async fn send_with_failover(
        &self,
        payload: &NotificationPayload,
        candidates: &[ProviderType],
        registry: &ProviderRegistry,
    ) -> DeliveryResult {
        let mut last_error = String::from("Unknown error");
        let mut last_provider = payload.provider;

        for (rank, &candidate) in candidates.iter().enumerate() {
            last_provider = candidate;

            let provider = match registry.get(candidate).await {
                Ok(provider) => provider,
                Err(e) => {
                    warn!(
                        notification_id = %payload.id,
                        provider = %candidate,
                        error = %e,
                        "Skipping unavailable provider"
                    );
                    last_error = e.to_string();
                    continue;
                }
            };

            let mut attempt_payload = payload.clone();
            attempt_payload.provider = candidate;

            let result = self.attempt(&attempt_payload, provider.as_ref()).await;

            if result.success {
                if rank > 0 {
                    info!(
                        notification_id = %payload.id,
                        provider = %candidate,
                        rank,
                        "Notification delivered by fallback provider"
                    );
                }
                return result;
            }

            last_error = result.error.unwrap_or_else(|| "Unknown error".to_string());
            debug!(
                notification_id = %payload.id,
                provider = %candidate,
                error = %last_error,
                "Provider attempt failed, trying next candidate"
            );
        }

        DeliveryResult::failed(last_provider, last_error)
    }

    async fn attempt(
        &self,
        payload: &NotificationPayload,
        provider: &dyn Provider,
    ) -> DeliveryResult {
        let kind = provider.kind();

        match self.attempt_timeout {
            None => provider.attempt(payload).await,
            Some(limit) => match timeout(limit, provider.attempt(payload)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        notification_id = %payload.id,
                        provider = %kind,
                        timeout_ms = limit.as_millis() as u64,
                        "Provider attempt timed out"
                    );
                    DeliveryResult::failed(
                        kind,
                        format!("{} timed out after {}ms", kind, limit.as_millis()),
                    )
                }
            },
        }
    }
}
