mod memory_repository;
mod scripted;

pub use memory_repository::MemoryRepository;
pub use scripted::{Ack, AckHandle, RecordingMetrics, ScriptedMessage, ScriptedResolver};

use crate::{chain_id::ChainId, chains::TxDetail, database::VaaRecord, queue::QueueEvent};
use chrono::{DateTime, TimeZone, Utc};

#[cfg(test)]
pub async fn init_db(name: &str) -> blockscout_service_launcher::test_database::TestDbGuard {
    blockscout_service_launcher::test_database::TestDbGuard::new::<migration::Migrator>(name)
        .await
}

fn chain_of(id: &str) -> ChainId {
    id.split('/')
        .next()
        .and_then(|chain| chain.parse().ok())
        .map(ChainId)
        .unwrap_or(ChainId::ETHEREUM)
}

pub fn queue_event(id: &str, chain_id: ChainId) -> QueueEvent {
    let mut parts = id.splitn(3, '/').skip(1);
    QueueEvent {
        id: id.to_string(),
        chain_id,
        emitter_address: parts.next().unwrap_or_default().to_string(),
        sequence: parts.next().unwrap_or_default().to_string(),
        tx_hash: Some("0xabc".to_string()),
        timestamp: None,
    }
}

pub fn vaa_record(id: &str, timestamp: DateTime<Utc>) -> VaaRecord {
    let mut parts = id.splitn(3, '/').skip(1);
    VaaRecord {
        id: id.to_string(),
        emitter_chain: chain_of(id),
        emitter_address: parts.next().unwrap_or_default().to_string(),
        sequence: parts.next().unwrap_or_default().to_string(),
        tx_hash: Some("0xabc".to_string()),
        timestamp,
        vaa: None,
    }
}

pub fn tx_detail(hash: &str) -> TxDetail {
    TxDetail {
        native_tx_hash: hash.to_string(),
        from: "0xsender".to_string(),
        timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).single(),
        attribute: None,
    }
}
