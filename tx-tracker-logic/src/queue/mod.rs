mod memory;

pub use memory::{MemoryMessage, MemoryQueue};

use crate::chain_id::ChainId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Message announcement as published by the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEvent {
    /// `{chain}/{emitter}/{sequence}`
    pub id: String,
    pub chain_id: ChainId,
    pub emitter_address: String,
    pub sequence: String,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A single delivery of a [`QueueEvent`].
///
/// Exactly one of [`done`](ConsumerMessage::done) or
/// [`failed`](ConsumerMessage::failed) is expected per delivery. A delivery that
/// is neither acknowledged nor failed becomes visible again once its
/// visibility window elapses.
#[async_trait]
pub trait ConsumerMessage: Send + Sync {
    fn data(&self) -> &QueueEvent;

    /// The visibility window of this delivery has elapsed, so the queue may
    /// already have handed the message to someone else.
    fn is_expired(&self) -> bool;

    /// 1 for the first delivery.
    fn delivery_attempt(&self) -> u32;

    /// Acknowledge: the message is never delivered again.
    async fn done(&self);

    /// Negative acknowledge: the message is delivered again later.
    async fn failed(&self);
}

pub type BoxedMessage = Box<dyn ConsumerMessage>;

pub trait QueueSource: Send + Sync {
    /// Lazy, unbounded sequence of deliveries. Ends once `cancel` fires.
    fn consume(&self, cancel: CancellationToken) -> BoxStream<'static, BoxedMessage>;
}
