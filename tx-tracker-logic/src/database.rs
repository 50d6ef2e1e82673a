use crate::{chain_id::ChainId, chains::TxDetail};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use entity::{global_transactions, sea_orm_active_enums::OriginTxStatus, vaas};
use sea_orm::{
    sea_query::OnConflict, ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    Statement,
};
use std::sync::Arc;

/// Raw cross-chain message as stored by the ingestion side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaaRecord {
    pub id: String,
    pub emitter_chain: ChainId,
    pub emitter_address: String,
    pub sequence: String,
    pub tx_hash: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub vaa: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginTx {
    pub status: OriginTxStatus,
    pub native_tx_hash: Option<String>,
    pub from: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub attribute: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalTransaction {
    pub id: String,
    pub origin_tx: Option<OriginTx>,
    pub destination_tx: Option<serde_json::Value>,
}

impl GlobalTransaction {
    /// A record is complete once its origin has been confirmed.
    pub fn is_complete(&self) -> bool {
        matches!(
            self.origin_tx,
            Some(OriginTx {
                status: OriginTxStatus::Confirmed,
                ..
            })
        )
    }
}

/// Incomplete record joined with its raw message, if the message is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncompleteRecord {
    pub transaction: GlobalTransaction,
    pub vaa: Option<VaaRecord>,
}

#[derive(Debug, Clone)]
pub struct UpsertOriginParams {
    pub vaa_id: String,
    pub chain_id: ChainId,
    pub status: OriginTxStatus,
    pub detail: Option<TxDetail>,
    /// Message timestamp, stored when the chain does not report one.
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
}

/// Position of the last row of a time range page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRangeCursor {
    pub timestamp: DateTime<Utc>,
    pub id: String,
}

impl From<&VaaRecord> for TimeRangeCursor {
    fn from(vaa: &VaaRecord) -> Self {
        Self {
            timestamp: vaa.timestamp,
            id: vaa.id.clone(),
        }
    }
}

#[async_trait]
pub trait TxRepository: Send + Sync {
    /// Replaces the origin of the record, creating the record if needed.
    async fn upsert_origin(&self, params: UpsertOriginParams) -> anyhow::Result<()>;

    /// Writes an `internal-error` origin unless the record is already confirmed.
    /// Returns whether anything was written.
    async fn mark_origin_internal_error(&self, vaa_id: &str) -> anyhow::Result<bool>;

    async fn is_already_resolved(&self, vaa_id: &str) -> anyhow::Result<bool>;

    async fn count_by_time_range(&self, range: TimeRange) -> anyhow::Result<u64>;

    async fn count_incomplete(&self) -> anyhow::Result<u64>;

    /// Messages ordered by `(timestamp desc, id asc)`, or `(timestamp asc, id asc)`
    /// when `ascending`, starting strictly after `cursor`.
    async fn scan_by_time_range(
        &self,
        cursor: Option<&TimeRangeCursor>,
        page_size: u64,
        range: TimeRange,
        ascending: bool,
    ) -> anyhow::Result<Vec<VaaRecord>>;

    /// Incomplete records with `id > cursor`, ordered by id.
    async fn scan_incomplete(
        &self,
        cursor: Option<&str>,
        page_size: u64,
    ) -> anyhow::Result<Vec<IncompleteRecord>>;

    async fn find_vaa(&self, id: &str) -> anyhow::Result<Option<VaaRecord>>;

    async fn find_global_transaction(&self, id: &str)
        -> anyhow::Result<Option<GlobalTransaction>>;

    /// Stores a raw message. A message already present is left untouched.
    async fn insert_vaa(&self, vaa: VaaRecord) -> anyhow::Result<bool>;
}

#[derive(Clone)]
pub struct TxTrackerDatabase {
    pub db: Arc<DatabaseConnection>,
}

impl TxTrackerDatabase {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

fn incomplete_condition() -> Condition {
    Condition::any()
        .add(global_transactions::Column::OriginStatus.is_null())
        .add(global_transactions::Column::OriginStatus.eq(OriginTxStatus::InternalError))
}

fn time_range_condition(range: TimeRange) -> Condition {
    let mut condition = Condition::all();
    if let Some(after) = range.after {
        condition = condition.add(vaas::Column::Timestamp.gte(after.naive_utc()));
    }
    if let Some(before) = range.before {
        condition = condition.add(vaas::Column::Timestamp.lte(before.naive_utc()));
    }
    condition
}

fn cursor_condition(cursor: &TimeRangeCursor, ascending: bool) -> Condition {
    let timestamp = cursor.timestamp.naive_utc();
    let beyond = if ascending {
        vaas::Column::Timestamp.gt(timestamp)
    } else {
        vaas::Column::Timestamp.lt(timestamp)
    };
    Condition::any().add(beyond).add(
        Condition::all()
            .add(vaas::Column::Timestamp.eq(timestamp))
            .add(vaas::Column::Id.gt(cursor.id.as_str())),
    )
}

impl TryFrom<vaas::Model> for VaaRecord {
    type Error = anyhow::Error;

    fn try_from(model: vaas::Model) -> Result<Self, Self::Error> {
        let emitter_chain = u16::try_from(model.emitter_chain).with_context(|| {
            format!(
                "vaa {} has invalid emitter chain {}",
                model.id, model.emitter_chain
            )
        })?;
        Ok(Self {
            id: model.id,
            emitter_chain: ChainId(emitter_chain),
            emitter_address: model.emitter_address,
            sequence: model.sequence,
            tx_hash: model.tx_hash,
            timestamp: model.timestamp.and_utc(),
            vaa: model.vaa,
        })
    }
}

impl From<global_transactions::Model> for GlobalTransaction {
    fn from(model: global_transactions::Model) -> Self {
        let origin_tx = model.origin_status.map(|status| OriginTx {
            status,
            native_tx_hash: model.origin_native_tx_hash,
            from: model.origin_from,
            timestamp: model.origin_timestamp.map(|ts| ts.and_utc()),
            attribute: model.origin_attribute,
        });
        Self {
            id: model.id,
            origin_tx,
            destination_tx: model.destination_tx,
        }
    }
}

#[async_trait]
impl TxRepository for TxTrackerDatabase {
    async fn upsert_origin(&self, params: UpsertOriginParams) -> anyhow::Result<()> {
        let now = Utc::now().naive_utc();
        let (native_tx_hash, from, timestamp, attribute) = match params.detail {
            Some(detail) => (
                Some(detail.native_tx_hash),
                Some(detail.from),
                detail.timestamp.or(params.timestamp),
                detail.attribute,
            ),
            None => (None, None, None, None),
        };
        let model = global_transactions::ActiveModel {
            id: Set(params.vaa_id.clone()),
            origin_status: Set(Some(params.status)),
            origin_native_tx_hash: Set(native_tx_hash),
            origin_from: Set(from),
            origin_timestamp: Set(timestamp.map(|ts| ts.naive_utc())),
            origin_attribute: Set(attribute),
            updated_at: Set(now),
            ..Default::default()
        };

        global_transactions::Entity::insert(model)
            .on_conflict(
                OnConflict::column(global_transactions::Column::Id)
                    .update_columns([
                        global_transactions::Column::OriginStatus,
                        global_transactions::Column::OriginNativeTxHash,
                        global_transactions::Column::OriginFrom,
                        global_transactions::Column::OriginTimestamp,
                        global_transactions::Column::OriginAttribute,
                        global_transactions::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(|e| {
                tracing::error!(err =? e, vaa_id = %params.vaa_id, "failed to upsert origin tx");
                e
            })?;
        Ok(())
    }

    async fn mark_origin_internal_error(&self, vaa_id: &str) -> anyhow::Result<bool> {
        let result = self
            .db
            .execute(Statement::from_sql_and_values(
                self.db.get_database_backend(),
                r#"
                INSERT INTO global_transactions (id, origin_status, updated_at)
                VALUES ($1, 'internal-error', now())
                ON CONFLICT (id) DO UPDATE SET
                    origin_status = EXCLUDED.origin_status,
                    origin_native_tx_hash = NULL,
                    origin_from = NULL,
                    origin_timestamp = NULL,
                    origin_attribute = NULL,
                    updated_at = EXCLUDED.updated_at
                WHERE global_transactions.origin_status IS DISTINCT FROM 'confirmed'"#,
                [vaa_id.into()],
            ))
            .await
            .map_err(|e| {
                tracing::error!(err =? e, vaa_id, "failed to mark origin tx as internal error");
                e
            })?;
        Ok(result.rows_affected() > 0)
    }

    async fn is_already_resolved(&self, vaa_id: &str) -> anyhow::Result<bool> {
        let count = global_transactions::Entity::find_by_id(vaa_id)
            .filter(global_transactions::Column::OriginStatus.is_not_null())
            .count(self.db.as_ref())
            .await?;
        Ok(count > 0)
    }

    async fn count_by_time_range(&self, range: TimeRange) -> anyhow::Result<u64> {
        let count = vaas::Entity::find()
            .filter(time_range_condition(range))
            .count(self.db.as_ref())
            .await?;
        Ok(count)
    }

    async fn count_incomplete(&self) -> anyhow::Result<u64> {
        let count = global_transactions::Entity::find()
            .filter(incomplete_condition())
            .count(self.db.as_ref())
            .await?;
        Ok(count)
    }

    async fn scan_by_time_range(
        &self,
        cursor: Option<&TimeRangeCursor>,
        page_size: u64,
        range: TimeRange,
        ascending: bool,
    ) -> anyhow::Result<Vec<VaaRecord>> {
        let mut query = vaas::Entity::find().filter(time_range_condition(range));
        if let Some(cursor) = cursor {
            query = query.filter(cursor_condition(cursor, ascending));
        }
        query = if ascending {
            query.order_by_asc(vaas::Column::Timestamp)
        } else {
            query.order_by_desc(vaas::Column::Timestamp)
        };

        let rows = query
            .order_by_asc(vaas::Column::Id)
            .limit(page_size)
            .all(self.db.as_ref())
            .await
            .map_err(|e| {
                tracing::error!(err =? e, "failed to scan messages by time range");
                e
            })?;
        rows.into_iter().map(VaaRecord::try_from).collect()
    }

    async fn scan_incomplete(
        &self,
        cursor: Option<&str>,
        page_size: u64,
    ) -> anyhow::Result<Vec<IncompleteRecord>> {
        let mut query = global_transactions::Entity::find()
            .find_also_related(vaas::Entity)
            .filter(incomplete_condition());
        if let Some(cursor) = cursor {
            query = query.filter(global_transactions::Column::Id.gt(cursor));
        }

        let rows = query
            .order_by_asc(global_transactions::Column::Id)
            .limit(page_size)
            .all(self.db.as_ref())
            .await
            .map_err(|e| {
                tracing::error!(err =? e, "failed to scan incomplete records");
                e
            })?;
        rows.into_iter()
            .map(|(transaction, vaa)| {
                Ok(IncompleteRecord {
                    transaction: transaction.into(),
                    vaa: vaa.map(VaaRecord::try_from).transpose()?,
                })
            })
            .collect()
    }

    async fn find_vaa(&self, id: &str) -> anyhow::Result<Option<VaaRecord>> {
        let vaa = vaas::Entity::find_by_id(id).one(self.db.as_ref()).await?;
        vaa.map(VaaRecord::try_from).transpose()
    }

    async fn find_global_transaction(
        &self,
        id: &str,
    ) -> anyhow::Result<Option<GlobalTransaction>> {
        let tx = global_transactions::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?;
        Ok(tx.map(GlobalTransaction::from))
    }

    async fn insert_vaa(&self, vaa: VaaRecord) -> anyhow::Result<bool> {
        let model = vaas::ActiveModel {
            id: Set(vaa.id),
            emitter_chain: Set(vaa.emitter_chain.0 as i32),
            emitter_address: Set(vaa.emitter_address),
            sequence: Set(vaa.sequence),
            tx_hash: Set(vaa.tx_hash),
            timestamp: Set(vaa.timestamp.naive_utc()),
            vaa: Set(vaa.vaa),
            indexed_at: Set(Utc::now().naive_utc()),
        };
        let inserted = vaas::Entity::insert(model)
            .on_conflict(OnConflict::column(vaas::Column::Id).do_nothing().to_owned())
            .exec_without_returning(self.db.as_ref())
            .await?;
        Ok(inserted > 0)
    }
}
