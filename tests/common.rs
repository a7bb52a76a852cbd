#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use notify_dispatch::{
    clients::{
        provider::{Provider, ProviderFactory},
        queue::NotificationQueue,
        registry::ProviderRegistry,
    },
    dispatcher::{DeferMode, Dispatcher},
    error::DispatchError,
    models::{message::NotificationPayload, notification::ProviderType, status::DeliveryResult},
    strategy::DispatchStrategy,
};

/// Shared log of which providers were attempted, in order.
pub type CallLog = Arc<Mutex<Vec<ProviderType>>>;

#[derive(Clone)]
pub enum Behaviour {
    Succeed(&'static str),
    Fail(&'static str),
    Hang,
}

pub struct FakeProvider {
    kind: ProviderType,
    behaviour: Behaviour,
    operational: AtomicBool,
    calls: CallLog,
    seen: Mutex<Vec<NotificationPayload>>,
}

impl FakeProvider {
    pub fn new(kind: ProviderType, behaviour: Behaviour, calls: &CallLog) -> Arc<Self> {
        Arc::new(Self {
            kind,
            behaviour,
            operational: AtomicBool::new(true),
            calls: Arc::clone(calls),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn set_operational(&self, operational: bool) {
        self.operational.store(operational, Ordering::SeqCst);
    }

    pub fn seen(&self) -> Vec<NotificationPayload> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for FakeProvider {
    fn kind(&self) -> ProviderType {
        self.kind
    }

    fn is_operational(&self) -> bool {
        self.operational.load(Ordering::SeqCst)
    }

    async fn attempt(&self, payload: &NotificationPayload) -> DeliveryResult {
        self.calls.lock().unwrap().push(self.kind);
        self.seen.lock().unwrap().push(payload.clone());

        match self.behaviour {
            Behaviour::Succeed(id) => DeliveryResult::delivered(self.kind, Some(id.to_string())),
            Behaviour::Fail(error) => DeliveryResult::failed(self.kind, error),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                DeliveryResult::failed(self.kind, "unreachable")
            }
        }
    }
}

/// Hands out pre-built fakes; anything else is unsupported.
#[derive(Default)]
pub struct FakeFactory {
    providers: HashMap<ProviderType, Arc<FakeProvider>>,
    constructions: AtomicUsize,
}

impl FakeFactory {
    pub fn with(mut self, provider: Arc<FakeProvider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }
}

impl ProviderFactory for FakeFactory {
    fn construct(&self, kind: ProviderType) -> Result<Arc<dyn Provider>, DispatchError> {
        self.constructions.fetch_add(1, Ordering::SeqCst);

        self.providers
            .get(&kind)
            .map(|p| Arc::clone(p) as Arc<dyn Provider>)
            .ok_or_else(|| DispatchError::UnsupportedProvider(kind.to_string()))
    }
}

/// In-memory stand-in for the broker.
#[derive(Default)]
pub struct RecordingQueue {
    published: Mutex<Vec<NotificationPayload>>,
    delayed: Mutex<Vec<(NotificationPayload, Duration)>>,
    fail_after: Option<usize>,
    disconnected: bool,
}

impl RecordingQueue {
    /// Publishing fails once `count` messages have been accepted.
    pub fn failing_after(count: usize) -> Self {
        Self {
            fail_after: Some(count),
            ..Default::default()
        }
    }

    pub fn disconnected() -> Self {
        Self {
            disconnected: true,
            ..Default::default()
        }
    }

    pub fn published(&self) -> Vec<NotificationPayload> {
        self.published.lock().unwrap().clone()
    }

    pub fn delayed(&self) -> Vec<(NotificationPayload, Duration)> {
        self.delayed.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationQueue for RecordingQueue {
    async fn publish(&self, payload: &NotificationPayload) -> Result<(), DispatchError> {
        let mut published = self.published.lock().unwrap();

        if self.disconnected || self.fail_after.is_some_and(|n| published.len() >= n) {
            return Err(DispatchError::QueueUnavailable("channel closed".to_string()));
        }

        published.push(payload.clone());
        Ok(())
    }

    async fn publish_delayed(
        &self,
        payload: &NotificationPayload,
        delay: Duration,
    ) -> Result<(), DispatchError> {
        if self.disconnected {
            return Err(DispatchError::QueueUnavailable("channel closed".to_string()));
        }

        self.delayed.lock().unwrap().push((payload.clone(), delay));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.disconnected
    }
}

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn calls(log: &CallLog) -> Vec<ProviderType> {
    log.lock().unwrap().clone()
}

pub fn registry(factory: FakeFactory) -> Arc<ProviderRegistry> {
    Arc::new(ProviderRegistry::new(Arc::new(factory)))
}

pub fn dispatcher(
    queue: Arc<RecordingQueue>,
    strategy: DispatchStrategy,
    registry: Arc<ProviderRegistry>,
    defer_mode: DeferMode,
) -> Dispatcher {
    Dispatcher::new(queue, Arc::new(strategy), registry, defer_mode)
}
