use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        BasicQosOptions, ConfirmSelectOptions, QueueDeclareOptions,
    },
    types::{AMQPValue, FieldTable},
};
use tracing::{debug, error, info, warn};

use crate::{
    clients::queue::{MessageHandler, NotificationQueue},
    config::Config,
    error::DispatchError,
    models::{message::NotificationPayload, schedule::DelayTiers, status::HandlingOutcome},
};

/// Highest broker priority; `high` notifications publish at this value.
pub const MAX_PRIORITY: u8 = 10;

const CONSUMER_TAG: &str = "notification_dispatcher";

/// How a delivery is settled with the broker once handling finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Ack,
    /// Negative acknowledgement without requeue; the message is dropped.
    Reject,
}

impl Settlement {
    pub fn for_result(result: &Result<HandlingOutcome, DispatchError>) -> Self {
        match result {
            Ok(_) => Settlement::Ack,
            Err(_) => Settlement::Reject,
        }
    }
}

pub struct RabbitMqClient {
    connection: Connection,
    channel: Channel,
    queue_name: String,
    delay_tiers: DelayTiers,
    delay_queues: Vec<(Duration, String)>,
    worker_concurrency: usize,
}

impl RabbitMqClient {
    pub async fn connect(config: &Config) -> Result<Self, DispatchError> {
        info!("Connecting to RabbitMQ...");

        let connection = Connection::connect(&config.rabbitmq_url, ConnectionProperties::default())
            .await
            .map_err(|e| DispatchError::QueueUnavailable(format!("Failed to connect: {}", e)))?;

        let channel = connection.create_channel().await.map_err(|e| {
            DispatchError::QueueUnavailable(format!("Channel creation failed: {}", e))
        })?;

        channel
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| DispatchError::QueueUnavailable(format!("Failed to set QoS: {}", e)))?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| {
                DispatchError::QueueUnavailable(format!("Failed to enable publisher confirms: {}", e))
            })?;

        let mut queue_args = FieldTable::default();
        queue_args.insert("x-max-priority".into(), AMQPValue::ShortShortUInt(MAX_PRIORITY));

        channel
            .queue_declare(
                &config.queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                queue_args,
            )
            .await
            .map_err(|e| {
                DispatchError::QueueUnavailable(format!("Failed to declare notification queue: {}", e))
            })?;

        // one queue per tier, each with a single TTL so expiry order is queue
        // order; expired messages dead-letter straight back into the main queue
        let delay_tiers = config.defer_tiers().map_err(|e| {
            DispatchError::QueueUnavailable(format!("Invalid delay tiers: {}", e))
        })?;
        let mut delay_queues = Vec::new();

        for tier in delay_tiers.iter() {
            let name = config.delay_queue_name(tier);
            let ttl = u32::try_from(tier.as_millis()).unwrap_or(u32::MAX);

            let mut delay_args = FieldTable::default();
            delay_args.insert("x-message-ttl".into(), AMQPValue::LongUInt(ttl));
            delay_args.insert("x-dead-letter-exchange".into(), AMQPValue::LongString("".into()));
            delay_args.insert(
                "x-dead-letter-routing-key".into(),
                AMQPValue::LongString(config.queue_name.as_str().into()),
            );

            channel
                .queue_declare(
                    &name,
                    QueueDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    delay_args,
                )
                .await
                .map_err(|e| {
                    DispatchError::QueueUnavailable(format!(
                        "Failed to declare delay queue {}: {}",
                        name, e
                    ))
                })?;

            delay_queues.push((tier, name));
        }

        info!(
            queue = %config.queue_name,
            delay_queues = ?delay_queues.iter().map(|(_, name)| name).collect::<Vec<_>>(),
            prefetch_count = config.prefetch_count,
            "RabbitMQ queues declared"
        );

        Ok(Self {
            connection,
            channel,
            queue_name: config.queue_name.clone(),
            delay_tiers,
            delay_queues,
            worker_concurrency: config.worker_concurrency.max(1),
        })
    }

    async fn create_consumer(&self) -> Result<Consumer, DispatchError> {
        let consumer = self
            .channel
            .basic_consume(
                &self.queue_name,
                CONSUMER_TAG,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| DispatchError::QueueUnavailable(format!("Failed to create consumer: {}", e)))?;

        info!(queue = %self.queue_name, "Consumer created for queue");

        Ok(consumer)
    }

    /// Runs the consumer loop until the channel closes, handling at most
    /// `worker_concurrency` deliveries at once.
    pub async fn consume<H>(&self, handler: Arc<H>) -> Result<(), DispatchError>
    where
        H: MessageHandler + ?Sized,
    {
        let consumer = self.create_consumer().await?;

        consumer
            .for_each_concurrent(self.worker_concurrency, |delivery| {
                let handler = Arc::clone(&handler);

                async move {
                    match delivery {
                        Ok(delivery) => {
                            self.process_delivery(
                                delivery.delivery_tag,
                                &delivery.data,
                                handler.as_ref(),
                            )
                            .await
                        }
                        Err(e) => error!(error = %e, "Failed to receive delivery"),
                    }
                }
            })
            .await;

        warn!(queue = %self.queue_name, "Consumer stream ended");

        Ok(())
    }

    async fn process_delivery<H>(&self, delivery_tag: u64, data: &[u8], handler: &H)
    where
        H: MessageHandler + ?Sized,
    {
        let result = match NotificationPayload::from_bytes(data) {
            Ok(payload) => handler.handle(payload).await,
            Err(e) => Err(DispatchError::from(e)),
        };

        match &result {
            Ok(outcome) => debug!(delivery_tag, outcome = %outcome, "Delivery handled"),
            Err(e) => {
                error!(delivery_tag, error = %e, "Error processing notification, dropping message")
            }
        }

        let settled = match Settlement::for_result(&result) {
            Settlement::Ack => self.acknowledge(delivery_tag).await,
            Settlement::Reject => self.reject(delivery_tag).await,
        };

        if let Err(e) = settled {
            error!(delivery_tag, error = %e, "Failed to settle delivery");
        }
    }

    pub async fn acknowledge(&self, delivery_tag: u64) -> Result<(), DispatchError> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| DispatchError::QueueUnavailable(format!("Failed to acknowledge message: {}", e)))
    }

    pub async fn reject(&self, delivery_tag: u64) -> Result<(), DispatchError> {
        self.channel
            .basic_nack(
                delivery_tag,
                BasicNackOptions {
                    multiple: false,
                    requeue: false,
                },
            )
            .await
            .map_err(|e| DispatchError::QueueUnavailable(format!("Failed to reject message: {}", e)))
    }

    async fn publish_to(
        &self,
        queue: &str,
        payload: &NotificationPayload,
        properties: BasicProperties,
    ) -> Result<(), DispatchError> {
        if !self.channel.status().connected() {
            return Err(DispatchError::QueueUnavailable(
                "RabbitMQ channel not initialized".to_string(),
            ));
        }

        let body = payload.to_bytes()?;

        let confirmation = self
            .channel
            .basic_publish("", queue, BasicPublishOptions::default(), &body, properties)
            .await
            .map_err(|e| DispatchError::QueueUnavailable(format!("Failed to publish message: {}", e)))?
            .await
            .map_err(|e| DispatchError::QueueUnavailable(format!("Publish confirmation failed: {}", e)))?;

        if confirmation.is_nack() {
            return Err(DispatchError::QueueUnavailable(format!(
                "Broker refused message {}",
                payload.id
            )));
        }

        Ok(())
    }

    fn properties_for(payload: &NotificationPayload) -> BasicProperties {
        BasicProperties::default()
            .with_delivery_mode(2)
            .with_priority(payload.queue_priority())
            .with_content_type("application/json".into())
            .with_message_id(payload.id.clone().into())
    }

    /// Releases channel and connection; either may already be closed.
    pub async fn close(&self) {
        if self.channel.status().connected() {
            if let Err(e) = self.channel.close(200, "Normal shutdown").await {
                warn!(error = %e, "Failed to close RabbitMQ channel");
            }
        }

        if self.connection.status().connected() {
            if let Err(e) = self.connection.close(200, "Normal shutdown").await {
                warn!(error = %e, "Failed to close RabbitMQ connection");
            }
        }

        info!("RabbitMQ connection closed");
    }
}

#[async_trait]
impl NotificationQueue for RabbitMqClient {
    async fn publish(&self, payload: &NotificationPayload) -> Result<(), DispatchError> {
        self.publish_to(&self.queue_name, payload, Self::properties_for(payload))
            .await?;

        debug!(
            notification_id = %payload.id,
            priority = payload.queue_priority(),
            "Notification published"
        );

        Ok(())
    }

    async fn publish_delayed(
        &self,
        payload: &NotificationPayload,
        delay: Duration,
    ) -> Result<(), DispatchError> {
        let hop = self.delay_tiers.hop_for(delay);
        let queue = self
            .delay_queues
            .iter()
            .find(|(tier, _)| *tier == hop)
            .map(|(_, name)| name.as_str())
            .ok_or_else(|| {
                DispatchError::QueueUnavailable(format!(
                    "No delay queue for a {}ms hop",
                    hop.as_millis()
                ))
            })?;

        self.publish_to(queue, payload, Self::properties_for(payload))
            .await?;

        debug!(
            notification_id = %payload.id,
            delay_ms = delay.as_millis() as u64,
            hop_ms = hop.as_millis() as u64,
            delay_queue = %queue,
            "Notification parked on delay queue"
        );

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }
}
