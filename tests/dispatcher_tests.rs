use std::{collections::HashSet, sync::Arc, time::Duration};

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use notify_dispatch::{
    clients::queue::MessageHandler,
    dispatcher::DeferMode,
    error::DispatchError,
    models::{
        notification::{NotificationIntent, NotificationType, Priority, ProviderType},
        schedule::DelayTiers,
        status::HandlingOutcome,
    },
    strategy::{DirectRouting, DispatchStrategy, FailoverRouting},
};

use crate::common::{
    Behaviour, FakeFactory, FakeProvider, RecordingQueue, call_log, calls, dispatcher, registry,
};

fn delay_queue() -> DeferMode {
    DeferMode::DelayQueue {
        tiers: DelayTiers::default(),
    }
}

fn email() -> NotificationIntent {
    NotificationIntent::new(NotificationType::Email, "a@b.com", "hi")
}

fn email_providers(resend: Behaviour, sendgrid: Behaviour) -> FakeFactory {
    let log = call_log();
    FakeFactory::default()
        .with(FakeProvider::new(ProviderType::Resend, resend, &log))
        .with(FakeProvider::new(ProviderType::Sendgrid, sendgrid, &log))
}

/// Test: Every accepted intent is queued under a fresh id
#[tokio::test]
async fn test_accept_queues_with_unique_ids() -> Result<()> {
    let queue = Arc::new(RecordingQueue::default());
    let dispatcher = dispatcher(
        queue.clone(),
        DispatchStrategy::failover(FailoverRouting::default()),
        registry(FakeFactory::default()),
        delay_queue(),
    );

    let mut ids = HashSet::new();
    for _ in 0..20 {
        let receipt = dispatcher.accept(email()).await?;
        assert!(receipt.queued);
        assert!(!receipt.id.is_empty());
        ids.insert(receipt.id);
    }

    assert_eq!(ids.len(), 20);
    assert_eq!(queue.published().len(), 20);

    Ok(())
}

/// Test: The queued payload carries the resolved provider and intent fields
#[tokio::test]
async fn test_accept_resolves_default_provider() -> Result<()> {
    let queue = Arc::new(RecordingQueue::default());
    let dispatcher = dispatcher(
        queue.clone(),
        DispatchStrategy::failover(FailoverRouting::default()),
        registry(FakeFactory::default()),
        delay_queue(),
    );

    let receipt = dispatcher
        .accept(email().with_subject("Welcome").with_priority(Priority::High))
        .await?;

    let payload = &queue.published()[0];
    assert_eq!(payload.id, receipt.id);
    assert_eq!(payload.provider, ProviderType::Resend);
    assert!(!payload.provider_pinned);
    assert_eq!(payload.subject.as_deref(), Some("Welcome"));
    assert_eq!(payload.queue_priority(), 10);

    Ok(())
}

/// Test: An explicit provider is recorded as pinned
#[tokio::test]
async fn test_accept_pins_explicit_provider() -> Result<()> {
    let queue = Arc::new(RecordingQueue::default());
    let dispatcher = dispatcher(
        queue.clone(),
        DispatchStrategy::direct(DirectRouting::default()),
        registry(FakeFactory::default()),
        delay_queue(),
    );

    dispatcher
        .accept(email().with_provider(ProviderType::Mailersend))
        .await?;

    let payload = &queue.published()[0];
    assert_eq!(payload.provider, ProviderType::Mailersend);
    assert!(payload.provider_pinned);

    Ok(())
}

/// Test: Scheduled intents use the same publish path
#[tokio::test]
async fn test_accept_publishes_scheduled_intents_immediately() -> Result<()> {
    let queue = Arc::new(RecordingQueue::default());
    let dispatcher = dispatcher(
        queue.clone(),
        DispatchStrategy::failover(FailoverRouting::default()),
        registry(FakeFactory::default()),
        delay_queue(),
    );

    let at = Utc::now() + ChronoDuration::hours(2);
    let receipt = dispatcher.accept(email().with_scheduled_at(at)).await?;

    assert!(receipt.queued);
    assert_eq!(queue.published()[0].scheduled_at, Some(at));
    assert!(queue.delayed().is_empty());

    Ok(())
}

/// Test: A broken queue surfaces as an accept error
#[tokio::test]
async fn test_accept_fails_when_queue_is_down() -> Result<()> {
    let dispatcher = dispatcher(
        Arc::new(RecordingQueue::disconnected()),
        DispatchStrategy::failover(FailoverRouting::default()),
        registry(FakeFactory::default()),
        delay_queue(),
    );

    let err = dispatcher.accept(email()).await.unwrap_err();
    assert!(matches!(err, DispatchError::QueueUnavailable(_)));

    Ok(())
}

/// Test: Bulk accept keeps input order
#[tokio::test]
async fn test_bulk_accept_preserves_order() -> Result<()> {
    let queue = Arc::new(RecordingQueue::default());
    let dispatcher = dispatcher(
        queue.clone(),
        DispatchStrategy::failover(FailoverRouting::default()),
        registry(FakeFactory::default()),
        delay_queue(),
    );

    let intents = (0..100)
        .map(|i| NotificationIntent::new(NotificationType::Email, format!("user{}@b.com", i), "hi"))
        .collect::<Vec<_>>();

    let receipt = dispatcher.accept_bulk(intents).await?;
    let published = queue.published();

    assert_eq!(receipt.queued, 100);
    assert_eq!(receipt.ids.len(), 100);
    for (i, (id, payload)) in receipt.ids.iter().zip(&published).enumerate() {
        assert_eq!(id, &payload.id);
        assert_eq!(payload.to, format!("user{}@b.com", i));
    }

    Ok(())
}

/// Test: A failing item aborts the rest of the batch
#[tokio::test]
async fn test_bulk_accept_aborts_on_first_failure() -> Result<()> {
    let queue = Arc::new(RecordingQueue::failing_after(2));
    let dispatcher = dispatcher(
        queue.clone(),
        DispatchStrategy::failover(FailoverRouting::default()),
        registry(FakeFactory::default()),
        delay_queue(),
    );

    let result = dispatcher.accept_bulk(vec![email(); 5]).await;

    assert!(matches!(result, Err(DispatchError::QueueUnavailable(_))));
    assert_eq!(queue.published().len(), 2);

    Ok(())
}

/// Test: The end-to-end failover scenario through accept and handle
#[tokio::test]
async fn test_accepted_email_fails_over_to_sendgrid() -> Result<()> {
    let queue = Arc::new(RecordingQueue::default());
    let dispatcher = dispatcher(
        queue.clone(),
        DispatchStrategy::failover(FailoverRouting::default()),
        registry(email_providers(
            Behaviour::Fail("rate limited"),
            Behaviour::Succeed("sg-123"),
        )),
        delay_queue(),
    );

    dispatcher.accept(email()).await?;
    let payload = queue.published().remove(0);

    let outcome = dispatcher.handle(payload).await?;

    let HandlingOutcome::Dispatched(result) = outcome else {
        panic!("expected a dispatched outcome, got {:?}", outcome);
    };
    assert!(result.success);
    assert_eq!(result.message_id.as_deref(), Some("sg-123"));
    assert_eq!(result.provider, ProviderType::Sendgrid);

    Ok(())
}

/// Test: A failed delivery is still a completed handling
#[tokio::test]
async fn test_failed_delivery_is_not_an_error() -> Result<()> {
    let queue = Arc::new(RecordingQueue::default());
    let dispatcher = dispatcher(
        queue.clone(),
        DispatchStrategy::failover(FailoverRouting::default()),
        registry(email_providers(Behaviour::Fail("a"), Behaviour::Fail("b"))),
        delay_queue(),
    );

    dispatcher.accept(email()).await?;
    let outcome = dispatcher.handle(queue.published().remove(0)).await?;

    assert!(matches!(outcome, HandlingOutcome::Dispatched(ref r) if !r.success));
    assert_eq!(queue.published().len(), 1, "failed sends are not re-queued");

    Ok(())
}

/// Test: Registry errors under direct routing reach the queue as errors
#[tokio::test]
async fn test_direct_handler_error_propagates() -> Result<()> {
    let queue = Arc::new(RecordingQueue::default());
    let dispatcher = dispatcher(
        queue.clone(),
        DispatchStrategy::direct(DirectRouting::default()),
        registry(FakeFactory::default()),
        delay_queue(),
    );

    dispatcher.accept(email()).await?;
    let result = dispatcher.handle(queue.published().remove(0)).await;

    assert!(matches!(result, Err(DispatchError::ProviderUnavailable { .. })));

    Ok(())
}

/// Test: Future payloads are parked on the delay queue, capped at the longest tier
#[tokio::test]
async fn test_future_payload_is_parked_on_delay_queue() -> Result<()> {
    let log = call_log();
    let queue = Arc::new(RecordingQueue::default());
    let dispatcher = dispatcher(
        queue.clone(),
        DispatchStrategy::failover(FailoverRouting::default()),
        registry(
            FakeFactory::default()
                .with(FakeProvider::new(ProviderType::Resend, Behaviour::Succeed("re"), &log)),
        ),
        delay_queue(),
    );

    let at = Utc::now() + ChronoDuration::hours(1);
    dispatcher.accept(email().with_scheduled_at(at)).await?;
    let payload = queue.published().remove(0);

    let outcome = dispatcher.handle(payload.clone()).await?;

    assert_eq!(outcome, HandlingOutcome::Deferred { until: at });
    let delayed = queue.delayed();
    assert_eq!(delayed.len(), 1);
    assert_eq!(delayed[0].0, payload);
    assert_eq!(delayed[0].1, Duration::from_secs(60));
    assert!(calls(&log).is_empty(), "nothing is sent before it is due");

    Ok(())
}

/// Test: Short remaining delays take the largest tier that does not overshoot
#[tokio::test]
async fn test_short_delay_takes_a_tier_within_remaining() -> Result<()> {
    let queue = Arc::new(RecordingQueue::default());
    let dispatcher = dispatcher(
        queue.clone(),
        DispatchStrategy::failover(FailoverRouting::default()),
        registry(FakeFactory::default()),
        delay_queue(),
    );

    dispatcher
        .accept(email().with_scheduled_at(Utc::now() + ChronoDuration::seconds(5)))
        .await?;
    dispatcher.handle(queue.published().remove(0)).await?;

    let (_, hop) = queue.delayed().remove(0);
    assert_eq!(hop, Duration::from_secs(1));

    Ok(())
}

/// Test: Timer mode republishes the unchanged payload once due
#[tokio::test]
async fn test_timer_mode_republishes_when_due() -> Result<()> {
    let queue = Arc::new(RecordingQueue::default());
    let dispatcher = dispatcher(
        queue.clone(),
        DispatchStrategy::failover(FailoverRouting::default()),
        registry(FakeFactory::default()),
        DeferMode::Timer,
    );

    dispatcher
        .accept(email().with_scheduled_at(Utc::now() + ChronoDuration::milliseconds(300)))
        .await?;
    let payload = queue.published().remove(0);

    let outcome = dispatcher.handle(payload.clone()).await?;
    assert!(matches!(outcome, HandlingOutcome::Deferred { .. }));
    assert_eq!(queue.published().len(), 1);

    tokio::time::sleep(Duration::from_millis(800)).await;

    let published = queue.published();
    assert_eq!(published.len(), 2);
    assert_eq!(published[1], payload);
    assert!(queue.delayed().is_empty());

    Ok(())
}

/// Test: Past schedules are sent straight away
#[tokio::test]
async fn test_past_schedule_is_dispatched() -> Result<()> {
    let queue = Arc::new(RecordingQueue::default());
    let dispatcher = dispatcher(
        queue.clone(),
        DispatchStrategy::failover(FailoverRouting::default()),
        registry(email_providers(Behaviour::Succeed("re-1"), Behaviour::Fail("x"))),
        delay_queue(),
    );

    dispatcher
        .accept(email().with_scheduled_at(Utc::now() - ChronoDuration::minutes(1)))
        .await?;
    let outcome = dispatcher.handle(queue.published().remove(0)).await?;

    assert!(matches!(outcome, HandlingOutcome::Dispatched(ref r) if r.success));
    assert!(queue.delayed().is_empty());

    Ok(())
}

/// Test: Available providers come from the registry
#[tokio::test]
async fn test_list_available_providers() -> Result<()> {
    let log = call_log();
    let factory = ProviderType::ALL
        .into_iter()
        .fold(FakeFactory::default(), |factory, kind| {
            let provider = FakeProvider::new(kind, Behaviour::Succeed("ok"), &log);
            provider.set_operational(kind == ProviderType::TwilioSms);
            factory.with(provider)
        });

    let dispatcher = dispatcher(
        Arc::new(RecordingQueue::default()),
        DispatchStrategy::failover(FailoverRouting::default()),
        registry(factory),
        delay_queue(),
    );

    assert_eq!(
        dispatcher.list_available_providers().await?,
        vec![ProviderType::TwilioSms]
    );

    Ok(())
}
