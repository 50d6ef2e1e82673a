use crate::{
    chain_id::ChainId,
    chains::{ResolveError, TxDetail, TxLocator, TxResolver},
    metrics::Metrics,
    queue::{ConsumerMessage, QueueEvent},
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

type ErrorFactory = Box<dyn Fn(ChainId) -> ResolveError + Send + Sync>;

enum Behaviour {
    Succeed(TxDetail),
    Fail(ErrorFactory),
    Hang,
}

/// [`TxResolver`] returning a fixed answer for every chain.
pub struct ScriptedResolver {
    behaviour: Behaviour,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedResolver {
    fn with_behaviour(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn succeeding(detail: TxDetail) -> Self {
        Self::with_behaviour(Behaviour::Succeed(detail))
    }

    pub fn failing(error: impl Fn(ChainId) -> ResolveError + Send + Sync + 'static) -> Self {
        Self::with_behaviour(Behaviour::Fail(Box::new(error)))
    }

    /// Never answers; only cancellation gets the caller out.
    pub fn hanging() -> Self {
        Self::with_behaviour(Behaviour::Hang)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TxResolver for ScriptedResolver {
    async fn fetch_tx(
        &self,
        chain_id: ChainId,
        _locator: &TxLocator,
    ) -> Result<TxDetail, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.behaviour {
            Behaviour::Succeed(detail) => Ok(detail.clone()),
            Behaviour::Fail(error) => Err(error(chain_id)),
            Behaviour::Hang => std::future::pending().await,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Pending,
    Done,
    Failed,
}

#[derive(Debug, Clone)]
pub struct AckHandle(Arc<Mutex<Ack>>);

impl AckHandle {
    pub fn get(&self) -> Ack {
        *self.0.lock()
    }

    fn set(&self, ack: Ack) {
        *self.0.lock() = ack;
    }
}

/// [`ConsumerMessage`] whose expiry and delivery attempt are set by the test.
#[derive(Debug)]
pub struct ScriptedMessage {
    event: QueueEvent,
    expired: AtomicBool,
    attempt: AtomicU32,
    ack: AckHandle,
}

impl ScriptedMessage {
    pub fn new(event: QueueEvent) -> (Self, AckHandle) {
        let ack = AckHandle(Arc::new(Mutex::new(Ack::Pending)));
        let message = Self {
            event,
            expired: AtomicBool::new(false),
            attempt: AtomicU32::new(1),
            ack: ack.clone(),
        };
        (message, ack)
    }

    pub fn expire(&self) {
        self.expired.store(true, Ordering::SeqCst);
    }

    pub fn set_delivery_attempt(&self, attempt: u32) {
        self.attempt.store(attempt, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConsumerMessage for ScriptedMessage {
    fn data(&self) -> &QueueEvent {
        &self.event
    }

    fn is_expired(&self) -> bool {
        self.expired.load(Ordering::SeqCst)
    }

    fn delivery_attempt(&self) -> u32 {
        self.attempt.load(Ordering::SeqCst)
    }

    async fn done(&self) {
        self.ack.set(Ack::Done);
    }

    async fn failed(&self) {
        self.ack.set(Ack::Failed);
    }
}

#[derive(Debug, Default)]
pub struct RecordingMetrics {
    consumed: AtomicUsize,
    unfiltered: AtomicUsize,
    inserted: AtomicUsize,
    failed: AtomicUsize,
}

impl RecordingMetrics {
    pub fn consumed(&self) -> usize {
        self.consumed.load(Ordering::SeqCst)
    }

    pub fn unfiltered(&self) -> usize {
        self.unfiltered.load(Ordering::SeqCst)
    }

    pub fn inserted(&self) -> usize {
        self.inserted.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }
}

impl Metrics for RecordingMetrics {
    fn inc_vaa_consumed(&self, _chain_id: ChainId) {
        self.consumed.fetch_add(1, Ordering::SeqCst);
    }

    fn inc_vaa_unfiltered(&self, _chain_id: ChainId) {
        self.unfiltered.fetch_add(1, Ordering::SeqCst);
    }

    fn inc_origin_tx_inserted(&self, _chain_id: ChainId) {
        self.inserted.fetch_add(1, Ordering::SeqCst);
    }

    fn inc_origin_tx_failed(&self, _chain_id: ChainId) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
}
