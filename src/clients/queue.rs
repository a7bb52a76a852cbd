use std::time::Duration;

use async_trait::async_trait;

use crate::{
    error::DispatchError,
    models::{message::NotificationPayload, status::HandlingOutcome},
};

/// Producer side of the notification queue.
#[async_trait]
pub trait NotificationQueue: Send + Sync {
    /// Publishes to the main queue; returns once the broker holds the message.
    async fn publish(&self, payload: &NotificationPayload) -> Result<(), DispatchError>;

    /// Publishes so the message reaches the main queue again after about
    /// `delay`. The gateway may round to one of its fixed delay tiers, so the
    /// consumer re-checks whether the payload is due.
    async fn publish_delayed(
        &self,
        payload: &NotificationPayload,
        delay: Duration,
    ) -> Result<(), DispatchError>;

    fn is_connected(&self) -> bool;
}

/// Consumer callback. `Ok` acknowledges the delivery, `Err` drops it.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, payload: NotificationPayload) -> Result<HandlingOutcome, DispatchError>;
}
