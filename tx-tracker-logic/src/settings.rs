use crate::chain_id::ChainId;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerPoolSettings {
    pub workers: usize,
    /// Messages of this chain are acknowledged without being resolved.
    pub excluded_chain: Option<ChainId>,
    /// Delivery attempt after which a failing message is stored as
    /// `internal-error` and acknowledged.
    pub max_delivery_attempts: u32,
}

impl Default for WorkerPoolSettings {
    fn default() -> Self {
        Self {
            workers: 500,
            excluded_chain: Some(ChainId::PYTHNET),
            max_delivery_attempts: 5,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct MemoryQueueSettings {
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub visibility_timeout: Duration,
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub redelivery_delay: Duration,
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub poll_interval: Duration,
}

impl Default for MemoryQueueSettings {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(60),
            redelivery_delay: Duration::from_millis(5_000),
            poll_interval: Duration::from_millis(1_000),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct BackfillSettings {
    pub strategy: BackfillStrategy,
    pub page_size: u64,
    /// Messages of one page resolved at the same time.
    pub concurrency: usize,
}

impl Default for BackfillSettings {
    fn default() -> Self {
        Self {
            strategy: BackfillStrategy::Incomplete,
            page_size: 100,
            concurrency: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum BackfillStrategy {
    /// Records without a resolved origin or with an `internal-error` one.
    Incomplete,
    /// Every message in `[after, before]`.
    TimeRange {
        #[serde(default)]
        after: Option<chrono::DateTime<chrono::Utc>>,
        #[serde(default)]
        before: Option<chrono::DateTime<chrono::Utc>>,
        #[serde(default)]
        ascending: bool,
        /// Resolve again messages that already have an origin.
        #[serde(default)]
        overwrite: bool,
    },
}
