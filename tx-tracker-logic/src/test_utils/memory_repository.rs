use crate::database::{
    GlobalTransaction, IncompleteRecord, OriginTx, TimeRange, TimeRangeCursor, TxRepository,
    UpsertOriginParams, VaaRecord,
};
use async_trait::async_trait;
use entity::sea_orm_active_enums::OriginTxStatus;
use parking_lot::Mutex;
use std::{
    cmp::Ordering,
    collections::BTreeMap,
    sync::atomic::{AtomicUsize, Ordering as AtomicOrdering},
};

/// [`TxRepository`] over in-memory maps, following the Postgres ordering rules.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    vaas: Mutex<BTreeMap<String, VaaRecord>>,
    transactions: Mutex<BTreeMap<String, GlobalTransaction>>,
    operations: AtomicUsize,
    upserts: AtomicUsize,
}

impl MemoryRepository {
    pub fn origin(&self, vaa_id: &str) -> Option<OriginTx> {
        self.transactions
            .lock()
            .get(vaa_id)
            .and_then(|tx| tx.origin_tx.clone())
    }

    /// Stores a record the way another pipeline would, without an origin.
    pub fn insert_transaction(&self, transaction: GlobalTransaction) {
        self.transactions
            .lock()
            .insert(transaction.id.clone(), transaction);
    }

    /// Number of repository calls of any kind.
    pub fn operations(&self) -> usize {
        self.operations.load(AtomicOrdering::SeqCst)
    }

    /// Number of successful `upsert_origin` calls.
    pub fn upserts(&self) -> usize {
        self.upserts.load(AtomicOrdering::SeqCst)
    }

    fn touch(&self) {
        self.operations.fetch_add(1, AtomicOrdering::SeqCst);
    }
}

fn in_range(vaa: &VaaRecord, range: &TimeRange) -> bool {
    range.after.is_none_or(|after| vaa.timestamp >= after)
        && range.before.is_none_or(|before| vaa.timestamp <= before)
}

fn scan_order(a: &VaaRecord, b: &VaaRecord, ascending: bool) -> Ordering {
    let by_time = if ascending {
        a.timestamp.cmp(&b.timestamp)
    } else {
        b.timestamp.cmp(&a.timestamp)
    };
    by_time.then_with(|| a.id.cmp(&b.id))
}

fn after_cursor(vaa: &VaaRecord, cursor: &TimeRangeCursor, ascending: bool) -> bool {
    let beyond = if ascending {
        vaa.timestamp > cursor.timestamp
    } else {
        vaa.timestamp < cursor.timestamp
    };
    beyond || (vaa.timestamp == cursor.timestamp && vaa.id > cursor.id)
}

#[async_trait]
impl TxRepository for MemoryRepository {
    async fn upsert_origin(&self, params: UpsertOriginParams) -> anyhow::Result<()> {
        self.touch();
        let origin = match params.detail {
            Some(detail) => OriginTx {
                status: params.status,
                native_tx_hash: Some(detail.native_tx_hash),
                from: Some(detail.from),
                timestamp: detail.timestamp.or(params.timestamp),
                attribute: detail.attribute,
            },
            None => OriginTx {
                status: params.status,
                native_tx_hash: None,
                from: None,
                timestamp: None,
                attribute: None,
            },
        };
        self.transactions
            .lock()
            .entry(params.vaa_id.clone())
            .or_insert_with(|| GlobalTransaction {
                id: params.vaa_id,
                origin_tx: None,
                destination_tx: None,
            })
            .origin_tx = Some(origin);
        self.upserts.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(())
    }

    async fn mark_origin_internal_error(&self, vaa_id: &str) -> anyhow::Result<bool> {
        self.touch();
        let mut transactions = self.transactions.lock();
        let tx = transactions
            .entry(vaa_id.to_string())
            .or_insert_with(|| GlobalTransaction {
                id: vaa_id.to_string(),
                origin_tx: None,
                destination_tx: None,
            });
        if tx.is_complete() {
            return Ok(false);
        }
        tx.origin_tx = Some(OriginTx {
            status: OriginTxStatus::InternalError,
            native_tx_hash: None,
            from: None,
            timestamp: None,
            attribute: None,
        });
        Ok(true)
    }

    async fn is_already_resolved(&self, vaa_id: &str) -> anyhow::Result<bool> {
        self.touch();
        Ok(self
            .transactions
            .lock()
            .get(vaa_id)
            .is_some_and(|tx| tx.origin_tx.is_some()))
    }

    async fn count_by_time_range(&self, range: TimeRange) -> anyhow::Result<u64> {
        self.touch();
        Ok(self
            .vaas
            .lock()
            .values()
            .filter(|vaa| in_range(vaa, &range))
            .count() as u64)
    }

    async fn count_incomplete(&self) -> anyhow::Result<u64> {
        self.touch();
        Ok(self
            .transactions
            .lock()
            .values()
            .filter(|tx| !tx.is_complete())
            .count() as u64)
    }

    async fn scan_by_time_range(
        &self,
        cursor: Option<&TimeRangeCursor>,
        page_size: u64,
        range: TimeRange,
        ascending: bool,
    ) -> anyhow::Result<Vec<VaaRecord>> {
        self.touch();
        let mut page: Vec<VaaRecord> = self
            .vaas
            .lock()
            .values()
            .filter(|vaa| in_range(vaa, &range))
            .filter(|vaa| cursor.is_none_or(|cursor| after_cursor(vaa, cursor, ascending)))
            .cloned()
            .collect();
        page.sort_by(|a, b| scan_order(a, b, ascending));
        page.truncate(page_size as usize);
        Ok(page)
    }

    async fn scan_incomplete(
        &self,
        cursor: Option<&str>,
        page_size: u64,
    ) -> anyhow::Result<Vec<IncompleteRecord>> {
        self.touch();
        let vaas = self.vaas.lock();
        Ok(self
            .transactions
            .lock()
            .values()
            .filter(|tx| cursor.is_none_or(|cursor| tx.id.as_str() > cursor))
            .filter(|tx| !tx.is_complete())
            .take(page_size as usize)
            .map(|tx| IncompleteRecord {
                transaction: tx.clone(),
                vaa: vaas.get(&tx.id).cloned(),
            })
            .collect())
    }

    async fn find_vaa(&self, id: &str) -> anyhow::Result<Option<VaaRecord>> {
        self.touch();
        Ok(self.vaas.lock().get(id).cloned())
    }

    async fn find_global_transaction(
        &self,
        id: &str,
    ) -> anyhow::Result<Option<GlobalTransaction>> {
        self.touch();
        Ok(self.transactions.lock().get(id).cloned())
    }

    async fn insert_vaa(&self, vaa: VaaRecord) -> anyhow::Result<bool> {
        self.touch();
        let mut vaas = self.vaas.lock();
        if vaas.contains_key(&vaa.id) {
            return Ok(false);
        }
        vaas.insert(vaa.id.clone(), vaa);
        Ok(true)
    }
}
