pub mod backfill;
pub mod chain_id;
pub mod chains;
pub mod consumer;
pub mod database;
pub mod metrics;
pub mod processor;
pub mod queue;
pub mod settings;
pub mod worker_pool;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
