use std::{sync::Arc, time::Duration};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::{
    clients::{
        queue::{MessageHandler, NotificationQueue},
        registry::ProviderRegistry,
    },
    error::DispatchError,
    models::{
        message::NotificationPayload,
        notification::{NotificationIntent, ProviderType},
        response::{AcceptReceipt, BulkReceipt},
        schedule::DelayTiers,
        status::HandlingOutcome,
    },
    strategy::DispatchStrategy,
};

/// How payloads that are not yet due go back to the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferMode {
    /// Park on one of the broker's fixed-TTL delay queues, then acknowledge.
    /// Survives restarts.
    DelayQueue { tiers: DelayTiers },
    /// Acknowledge at once and republish from an in-process timer. Lost on restart.
    Timer,
}

impl DeferMode {
    pub fn parse(value: &str, tiers: DelayTiers) -> anyhow::Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "delay_queue" => Ok(DeferMode::DelayQueue { tiers }),
            "timer" => Ok(DeferMode::Timer),
            other => Err(anyhow!("Unknown defer mode: {}", other)),
        }
    }
}

/// Accepts notifications onto the queue and handles them when they come back off it.
pub struct Dispatcher {
    queue: Arc<dyn NotificationQueue>,
    strategy: Arc<DispatchStrategy>,
    registry: Arc<ProviderRegistry>,
    defer_mode: DeferMode,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<dyn NotificationQueue>,
        strategy: Arc<DispatchStrategy>,
        registry: Arc<ProviderRegistry>,
        defer_mode: DeferMode,
    ) -> Self {
        Self {
            queue,
            strategy,
            registry,
            defer_mode,
        }
    }

    pub fn queue(&self) -> &Arc<dyn NotificationQueue> {
        &self.queue
    }

    /// Builds the payload and publishes it. Scheduled intents take the same
    /// path; the consumer holds them back until due.
    pub async fn accept(&self, intent: NotificationIntent) -> Result<AcceptReceipt, DispatchError> {
        let provider = match intent.provider {
            Some(provider) => provider,
            None => self.strategy.default_provider(intent.notification_type)?,
        };

        let payload = NotificationPayload::from_intent(intent, provider);

        self.queue.publish(&payload).await?;

        info!(
            notification_id = %payload.id,
            notification_type = %payload.notification_type,
            provider = %payload.provider,
            scheduled_at = ?payload.scheduled_at,
            "Notification queued"
        );

        Ok(AcceptReceipt {
            id: payload.id,
            queued: true,
        })
    }

    /// Accepts intents in order. The first failure aborts the rest of the batch.
    pub async fn accept_bulk(
        &self,
        intents: Vec<NotificationIntent>,
    ) -> Result<BulkReceipt, DispatchError> {
        let mut ids = Vec::with_capacity(intents.len());

        for intent in intents {
            let receipt = self.accept(intent).await?;
            ids.push(receipt.id);
        }

        let queued = ids.len();
        Ok(BulkReceipt { ids, queued })
    }

    pub async fn list_available_providers(&self) -> Result<Vec<ProviderType>, DispatchError> {
        self.registry.list_available().await
    }

    async fn defer(
        &self,
        payload: NotificationPayload,
        remaining: Duration,
    ) -> Result<HandlingOutcome, DispatchError> {
        let until = payload.scheduled_at.unwrap_or_else(Utc::now);

        match &self.defer_mode {
            DeferMode::DelayQueue { tiers } => {
                let hop = tiers.hop_for(remaining);
                self.queue.publish_delayed(&payload, hop).await?;

                info!(
                    notification_id = %payload.id,
                    hop_ms = hop.as_millis() as u64,
                    "Scheduled notification parked until due"
                );
            }
            DeferMode::Timer => {
                let queue = Arc::clone(&self.queue);

                tokio::spawn(async move {
                    sleep(remaining).await;

                    if let Err(e) = queue.publish(&payload).await {
                        error!(
                            notification_id = %payload.id,
                            error = %e,
                            "Failed to republish scheduled notification"
                        );
                    }
                });
            }
        }

        Ok(HandlingOutcome::Deferred { until })
    }
}

#[async_trait]
impl MessageHandler for Dispatcher {
    async fn handle(&self, payload: NotificationPayload) -> Result<HandlingOutcome, DispatchError> {
        if let Some(remaining) = payload.remaining_delay(Utc::now()) {
            return self.defer(payload, remaining).await;
        }

        let result = self.strategy.send(&payload, &self.registry).await?;

        if result.success {
            info!(
                notification_id = %payload.id,
                provider = %result.provider,
                message_id = ?result.message_id,
                "Notification processed"
            );
        } else {
            warn!(
                notification_id = %payload.id,
                provider = %result.provider,
                error = ?result.error,
                "Notification delivery failed"
            );
        }

        Ok(HandlingOutcome::Dispatched(result))
    }
}
