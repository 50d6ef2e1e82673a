use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tx_tracker_logic::{
    chains::{ResolveError, TxDetail},
    database::VaaRecord,
    processor::{ProcessError, ProcessOutcome, ProcessSourceTxParams, SourceTxProcessor},
    queue::{MemoryQueue, QueueEvent},
};

#[derive(Debug, thiserror::Error)]
pub enum VaaServiceError {
    #[error("vaa {0} not found")]
    NotFound(String),
    #[error("invalid vaa: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl ResponseError for VaaServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::Process(ProcessError::Resolve(ResolveError::ChainNotSupported(_))) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::Process(ProcessError::Resolve(_)) => StatusCode::BAD_GATEWAY,
            Self::Process(ProcessError::Cancelled { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Process(ProcessError::Persistence(_)) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "message": self.to_string(),
        }))
    }
}

/// Entry points for messages arriving over HTTP: push ingestion into the
/// in-process queue and the synchronous administrative re-resolution.
pub struct VaaService {
    processor: SourceTxProcessor,
    queue: MemoryQueue,
    shutdown: CancellationToken,
}

impl VaaService {
    pub fn new(
        processor: SourceTxProcessor,
        queue: MemoryQueue,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            processor,
            queue,
            shutdown,
        }
    }

    /// Stores the raw message and hands it over to the worker pool through the
    /// queue. Returns whether the message was new.
    pub async fn ingest(&self, event: QueueEvent) -> Result<bool, VaaServiceError> {
        let expected_id = format!(
            "{}/{}/{}",
            event.chain_id, event.emitter_address, event.sequence
        );
        if event.id != expected_id {
            return Err(VaaServiceError::InvalidArgument(format!(
                "id '{}' does not match '{expected_id}'",
                event.id
            )));
        }

        let record = VaaRecord {
            id: event.id.clone(),
            emitter_chain: event.chain_id,
            emitter_address: event.emitter_address.clone(),
            sequence: event.sequence.clone(),
            tx_hash: event.tx_hash.clone(),
            timestamp: event.timestamp.unwrap_or_else(Utc::now),
            vaa: None,
        };
        let inserted = self.processor.repository().insert_vaa(record).await?;
        tracing::debug!(vaa_id = %event.id, inserted, "vaa ingested");
        self.queue.publish(event);
        Ok(inserted)
    }

    /// Resolves the origin tx of a stored message again, overwriting whatever
    /// was recorded before.
    pub async fn process_vaa(&self, id: &str) -> Result<TxDetail, VaaServiceError> {
        let vaa = self
            .processor
            .repository()
            .find_vaa(id)
            .await?
            .ok_or_else(|| VaaServiceError::NotFound(id.to_string()))?;

        let params = ProcessSourceTxParams::from_vaa(&vaa, true);
        match self.processor.process(&params, &self.shutdown).await {
            Ok(ProcessOutcome::Resolved(detail)) => Ok(detail),
            Ok(ProcessOutcome::AlreadyProcessed) => Err(anyhow::anyhow!(
                "origin tx of {id} was skipped despite overwrite"
            )
            .into()),
            Err(err) => {
                tracing::warn!(vaa_id = %id, error = %err, "administrative processing failed");
                Err(err.into())
            }
        }
    }
}
