use crate::{
    chain_id::ChainId,
    chains::{ResolveError, TxDetail, TxLocator, TxResolver},
    database::{TxRepository, UpsertOriginParams, VaaRecord},
    queue::QueueEvent,
};
use chrono::{DateTime, Utc};
use entity::sea_orm_active_enums::OriginTxStatus;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSourceTxParams {
    pub vaa_id: String,
    pub chain_id: ChainId,
    pub emitter: String,
    pub sequence: String,
    pub tx_hash: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    /// Resolve even when the record already has an origin.
    pub overwrite: bool,
}

impl ProcessSourceTxParams {
    pub fn from_event(event: &QueueEvent) -> Self {
        Self {
            vaa_id: event.id.clone(),
            chain_id: event.chain_id,
            emitter: event.emitter_address.clone(),
            sequence: event.sequence.clone(),
            tx_hash: event.tx_hash.clone(),
            timestamp: event.timestamp,
            overwrite: false,
        }
    }

    pub fn from_vaa(vaa: &VaaRecord, overwrite: bool) -> Self {
        Self {
            vaa_id: vaa.id.clone(),
            chain_id: vaa.emitter_chain,
            emitter: vaa.emitter_address.clone(),
            sequence: vaa.sequence.clone(),
            tx_hash: vaa.tx_hash.clone(),
            timestamp: Some(vaa.timestamp),
            overwrite,
        }
    }

    fn locator(&self) -> TxLocator {
        TxLocator {
            tx_hash: self.tx_hash.clone(),
            emitter: self.emitter.clone(),
            sequence: self.sequence.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Resolved(TxDetail),
    /// The record already has an origin and overwrite was not requested.
    AlreadyProcessed,
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("persistence failure: {0:#}")]
    Persistence(anyhow::Error),
    /// Resolution was interrupted by shutdown. Says nothing about the message
    /// itself, so callers must not record it as a failure of the record.
    #[error("resolution of {chain_id} origin tx cancelled")]
    Cancelled { chain_id: ChainId },
}

impl ProcessError {
    pub fn is_chain_not_supported(&self) -> bool {
        matches!(self, Self::Resolve(err) if err.is_chain_not_supported())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Resolve-then-persist path shared by the worker pool, the backfill driver
/// and the administrative trigger.
#[derive(Clone)]
pub struct SourceTxProcessor {
    repository: Arc<dyn TxRepository>,
    resolver: Arc<dyn TxResolver>,
}

impl SourceTxProcessor {
    pub fn new(repository: Arc<dyn TxRepository>, resolver: Arc<dyn TxResolver>) -> Self {
        Self {
            repository,
            resolver,
        }
    }

    pub fn repository(&self) -> &Arc<dyn TxRepository> {
        &self.repository
    }

    #[instrument(
        name = "process_source_tx",
        skip_all,
        fields(vaa_id = %params.vaa_id, chain_id = %params.chain_id, overwrite = params.overwrite),
        level = "debug"
    )]
    pub async fn process(
        &self,
        params: &ProcessSourceTxParams,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutcome, ProcessError> {
        if !params.overwrite
            && self
                .repository
                .is_already_resolved(&params.vaa_id)
                .await
                .map_err(ProcessError::Persistence)?
        {
            tracing::debug!("origin tx already resolved, skipping");
            return Ok(ProcessOutcome::AlreadyProcessed);
        }

        let locator = params.locator();
        let detail = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProcessError::Cancelled { chain_id: params.chain_id }),
            result = self.resolver.fetch_tx(params.chain_id, &locator) => result.map_err(ProcessError::from),
        }?;

        self.repository
            .upsert_origin(UpsertOriginParams {
                vaa_id: params.vaa_id.clone(),
                chain_id: params.chain_id,
                status: OriginTxStatus::Confirmed,
                detail: Some(detail.clone()),
                timestamp: params.timestamp,
            })
            .await
            .map_err(ProcessError::Persistence)?;

        Ok(ProcessOutcome::Resolved(detail))
    }
}
