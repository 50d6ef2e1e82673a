use crate::{
    queue::QueueSource,
    worker_pool::{PushError, WorkerPool},
};
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Producer side of the pipeline: moves deliveries from the queue into the
/// worker pool until cancelled.
pub struct Consumer {
    source: Arc<dyn QueueSource>,
    pool: WorkerPool,
}

impl Consumer {
    pub fn new(source: Arc<dyn QueueSource>, pool: WorkerPool) -> Self {
        Self { source, pool }
    }

    #[instrument(name = "consumer", level = "info", skip_all)]
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!("consumer started");
        let mut deliveries = self.source.consume(cancel.clone());
        while let Some(message) = deliveries.next().await {
            match self.pool.push(message, &cancel).await {
                Ok(()) => {}
                Err(PushError::Cancelled) => break,
                Err(err) => {
                    tracing::error!(error = %err, "failed to push message into worker pool");
                    break;
                }
            }
        }

        tracing::info!("consumer stopping, waiting for in-flight messages");
        self.pool.stop_gracefully().await;
    }
}
