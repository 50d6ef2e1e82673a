use super::{BoxedMessage, ConsumerMessage, QueueEvent, QueueSource};
use crate::settings::MemoryQueueSettings;
use async_trait::async_trait;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use std::{collections::BTreeMap, sync::Arc};
use tokio::{sync::Notify, time::Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct Entry {
    event: QueueEvent,
    attempts: u32,
    visible_at: Instant,
    receipt: Option<u64>,
}

#[derive(Debug, Default)]
struct State {
    entries: BTreeMap<u64, Entry>,
    next_message_id: u64,
    next_receipt: u64,
}

#[derive(Debug)]
struct Inner {
    settings: MemoryQueueSettings,
    state: Mutex<State>,
    notify: Notify,
}

/// In-process queue with at-least-once delivery.
///
/// Every delivery hides the message for `visibility_timeout`. An acknowledged
/// message is removed, a failed one becomes visible again after
/// `redelivery_delay`, and a message that is neither is redelivered once its
/// visibility window elapses.
#[derive(Debug, Clone)]
pub struct MemoryQueue {
    inner: Arc<Inner>,
}

impl MemoryQueue {
    pub fn new(settings: MemoryQueueSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                state: Mutex::new(State::default()),
                notify: Notify::new(),
            }),
        }
    }

    pub fn publish(&self, event: QueueEvent) {
        {
            let mut state = self.inner.state.lock();
            let message_id = state.next_message_id;
            state.next_message_id += 1;
            state.entries.insert(
                message_id,
                Entry {
                    event,
                    attempts: 0,
                    visible_at: Instant::now(),
                    receipt: None,
                },
            );
        }
        self.inner.notify.notify_one();
    }

    /// Messages not yet acknowledged, in flight or not.
    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Takes the oldest visible message, if any.
    pub fn try_receive(&self) -> Option<MemoryMessage> {
        let now = Instant::now();
        let mut state = self.inner.state.lock();
        let receipt = state.next_receipt;
        let (message_id, entry) = state
            .entries
            .iter_mut()
            .find(|(_, entry)| entry.visible_at <= now)?;
        let message_id = *message_id;

        entry.attempts += 1;
        entry.receipt = Some(receipt);
        entry.visible_at = now + self.inner.settings.visibility_timeout;
        let message = MemoryMessage {
            queue: self.inner.clone(),
            message_id,
            receipt,
            event: entry.event.clone(),
            attempt: entry.attempts,
            deadline: entry.visible_at,
        };
        state.next_receipt += 1;
        Some(message)
    }

    fn next_visible_in(&self) -> Option<std::time::Duration> {
        let now = Instant::now();
        self.inner
            .state
            .lock()
            .entries
            .values()
            .map(|entry| entry.visible_at.saturating_duration_since(now))
            .min()
    }
}

impl QueueSource for MemoryQueue {
    fn consume(&self, cancel: CancellationToken) -> BoxStream<'static, BoxedMessage> {
        let queue = self.clone();
        let poll_interval = self.inner.settings.poll_interval;
        let stream = async_stream::stream! {
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                if let Some(message) = queue.try_receive() {
                    yield Box::new(message) as BoxedMessage;
                    continue;
                }

                let wait = queue
                    .next_visible_in()
                    .map_or(poll_interval, |delay| delay.min(poll_interval));
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = queue.inner.notify.notified() => {},
                    _ = tokio::time::sleep(wait) => {},
                }
            }
            tracing::debug!("memory queue consumer stopped");
        };
        Box::pin(stream)
    }
}

/// One delivery handed out by [`MemoryQueue`].
#[derive(Debug)]
pub struct MemoryMessage {
    queue: Arc<Inner>,
    message_id: u64,
    receipt: u64,
    event: QueueEvent,
    attempt: u32,
    deadline: Instant,
}

#[async_trait]
impl ConsumerMessage for MemoryMessage {
    fn data(&self) -> &QueueEvent {
        &self.event
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    fn delivery_attempt(&self) -> u32 {
        self.attempt
    }

    async fn done(&self) {
        let mut state = self.queue.state.lock();
        match state.entries.get(&self.message_id) {
            Some(entry) if entry.receipt == Some(self.receipt) => {
                state.entries.remove(&self.message_id);
            }
            _ => {
                tracing::warn!(
                    vaa_id = %self.event.id,
                    "stale receipt on acknowledge, message was redelivered"
                );
            }
        }
    }

    async fn failed(&self) {
        {
            let mut state = self.queue.state.lock();
            match state.entries.get_mut(&self.message_id) {
                Some(entry) if entry.receipt == Some(self.receipt) => {
                    entry.receipt = None;
                    entry.visible_at = Instant::now() + self.queue.settings.redelivery_delay;
                }
                _ => {
                    tracing::warn!(
                        vaa_id = %self.event.id,
                        "stale receipt on negative acknowledge, message was redelivered"
                    );
                    return;
                }
            }
        }
        self.queue.notify.notify_one();
    }
}
