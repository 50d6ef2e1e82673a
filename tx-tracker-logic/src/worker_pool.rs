use crate::{
    chain_id::ChainId,
    metrics::Metrics,
    processor::{ProcessOutcome, ProcessSourceTxParams, SourceTxProcessor},
    queue::{BoxedMessage, ConsumerMessage},
    settings::WorkerPoolSettings,
};
use futures::FutureExt;
use std::{panic::AssertUnwindSafe, sync::Arc};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("push into worker pool cancelled")]
    Cancelled,
    #[error("worker pool is closed")]
    Closed,
}

/// Fixed set of persistent workers fed through a single handoff point.
///
/// Every accepted message holds one of `workers` permits until a worker has
/// handled it, so [`WorkerPool::push`] blocks while every worker is busy.
pub struct WorkerPool {
    sender: async_channel::Sender<Handoff>,
    idle: Arc<Semaphore>,
    tracker: TaskTracker,
}

struct Handoff {
    message: BoxedMessage,
    _permit: OwnedSemaphorePermit,
}

#[derive(Clone)]
struct Worker {
    receiver: async_channel::Receiver<Handoff>,
    processor: SourceTxProcessor,
    metrics: Arc<dyn Metrics>,
    excluded_chain: Option<ChainId>,
    max_delivery_attempts: u32,
    cancel: CancellationToken,
}

impl WorkerPool {
    pub fn new(
        settings: &WorkerPoolSettings,
        processor: SourceTxProcessor,
        metrics: Arc<dyn Metrics>,
        cancel: CancellationToken,
    ) -> Self {
        let workers = settings.workers.max(1);
        // never blocks on send: at most `workers` handoffs exist at once
        let (sender, receiver) = async_channel::bounded(workers);
        let tracker = TaskTracker::new();
        let worker = Worker {
            receiver,
            processor,
            metrics,
            excluded_chain: settings.excluded_chain,
            max_delivery_attempts: settings.max_delivery_attempts,
            cancel,
        };

        for id in 0..workers {
            tracker.spawn(worker.clone().run(id));
        }
        tracing::info!(workers, "worker pool started");

        Self {
            sender,
            idle: Arc::new(Semaphore::new(workers)),
            tracker,
        }
    }

    /// Hands a message over to the next free worker.
    ///
    /// Returns [`PushError::Cancelled`] if `cancel` fires first. A message that
    /// was not accepted is dropped untouched and comes back through the queue.
    pub async fn push(
        &self,
        message: BoxedMessage,
        cancel: &CancellationToken,
    ) -> Result<(), PushError> {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PushError::Cancelled),
            permit = self.idle.clone().acquire_owned() => permit.map_err(|_| PushError::Closed)?,
        };
        self.sender
            .send(Handoff {
                message,
                _permit: permit,
            })
            .await
            .map_err(|_| PushError::Closed)
    }

    /// Stops accepting messages and waits until workers have finished
    /// everything already accepted.
    pub async fn stop_gracefully(self) {
        self.sender.close();
        self.idle.close();
        self.tracker.close();
        self.tracker.wait().await;
        tracing::info!("worker pool stopped");
    }
}

impl Worker {
    async fn run(self, id: usize) {
        while let Ok(Handoff { message, _permit }) = self.receiver.recv().await {
            let handled = AssertUnwindSafe(self.handle(message.as_ref()))
                .catch_unwind()
                .await;
            if handled.is_err() {
                tracing::error!(
                    worker = id,
                    vaa_id = %message.data().id,
                    "message processing panicked"
                );
                message.failed().await;
            }
        }
        tracing::trace!(worker = id, "worker exited");
    }

    async fn handle(&self, message: &dyn ConsumerMessage) {
        let event = message.data();
        let chain_id = event.chain_id;

        if message.is_expired() {
            tracing::warn!(vaa_id = %event.id, %chain_id, "message expired");
            message.failed().await;
            return;
        }
        self.metrics.inc_vaa_consumed(chain_id);

        if self.excluded_chain == Some(chain_id) {
            message.done().await;
            return;
        }
        self.metrics.inc_vaa_unfiltered(chain_id);

        let params = ProcessSourceTxParams::from_event(event);
        match self.processor.process(&params, &self.cancel).await {
            Ok(ProcessOutcome::Resolved(_)) => {
                self.metrics.inc_origin_tx_inserted(chain_id);
                tracing::info!(vaa_id = %event.id, %chain_id, "updated origin tx in the database");
                message.done().await;
            }
            Ok(ProcessOutcome::AlreadyProcessed) => {
                tracing::debug!(vaa_id = %event.id, "origin tx already resolved");
                message.done().await;
            }
            Err(err) if err.is_chain_not_supported() => {
                tracing::info!(vaa_id = %event.id, %chain_id, "skipping message, chain not supported");
                message.done().await;
            }
            // shutdown is not the message's fault, it must come back whatever its attempt
            Err(err) if err.is_cancelled() => {
                tracing::info!(vaa_id = %event.id, %chain_id, "processing cancelled, releasing message");
                message.failed().await;
            }
            Err(err) => {
                self.metrics.inc_origin_tx_failed(chain_id);
                let attempt = message.delivery_attempt();
                tracing::error!(
                    error = %err,
                    vaa_id = %event.id,
                    %chain_id,
                    attempt,
                    "failed to process origin tx"
                );
                if attempt >= self.max_delivery_attempts {
                    self.give_up(message).await;
                } else {
                    message.failed().await;
                }
            }
        }
    }

    /// Records the message as `internal-error` so backfill can pick it up later.
    async fn give_up(&self, message: &dyn ConsumerMessage) {
        let vaa_id = &message.data().id;
        match self
            .processor
            .repository()
            .mark_origin_internal_error(vaa_id)
            .await
        {
            Ok(_) => {
                tracing::warn!(%vaa_id, "delivery attempts exhausted, origin tx marked as internal error");
                message.done().await;
            }
            Err(err) => {
                tracing::error!(error = ?err, %vaa_id, "failed to mark origin tx as internal error");
                message.failed().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chains::ResolveError,
        metrics::NoopMetrics,
        test_utils::{
            queue_event, tx_detail, Ack, MemoryRepository, RecordingMetrics, ScriptedMessage,
            ScriptedResolver,
        },
    };
    use entity::sea_orm_active_enums::OriginTxStatus;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn settings(workers: usize) -> WorkerPoolSettings {
        WorkerPoolSettings {
            workers,
            ..Default::default()
        }
    }

    fn pool(
        workers: usize,
        repository: Arc<MemoryRepository>,
        resolver: Arc<ScriptedResolver>,
        metrics: Arc<dyn Metrics>,
    ) -> WorkerPool {
        WorkerPool::new(
            &settings(workers),
            SourceTxProcessor::new(repository, resolver),
            metrics,
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn expired_message_is_failed_without_resolution() {
        let repository = Arc::new(MemoryRepository::default());
        let resolver = Arc::new(ScriptedResolver::succeeding(tx_detail("abc")));
        let metrics = Arc::new(RecordingMetrics::default());
        let pool = pool(2, repository.clone(), resolver.clone(), metrics.clone());

        let (message, ack) = ScriptedMessage::new(queue_event("2/emitter/1", ChainId::ETHEREUM));
        message.expire();
        pool.push(Box::new(message), &CancellationToken::new())
            .await
            .unwrap();
        pool.stop_gracefully().await;

        assert_eq!(ack.get(), Ack::Failed);
        assert_eq!(resolver.calls(), 0);
        assert_eq!(metrics.consumed(), 0);
        assert!(repository.origin("2/emitter/1").is_none());
    }

    #[tokio::test]
    async fn excluded_chain_is_done_without_resolution() {
        let repository = Arc::new(MemoryRepository::default());
        let resolver = Arc::new(ScriptedResolver::succeeding(tx_detail("abc")));
        let metrics = Arc::new(RecordingMetrics::default());
        let pool = pool(2, repository.clone(), resolver.clone(), metrics.clone());

        let (message, ack) = ScriptedMessage::new(queue_event("26/emitter/1", ChainId::PYTHNET));
        pool.push(Box::new(message), &CancellationToken::new())
            .await
            .unwrap();
        pool.stop_gracefully().await;

        assert_eq!(ack.get(), Ack::Done);
        assert_eq!(resolver.calls(), 0);
        assert_eq!(repository.operations(), 0);
        assert_eq!(metrics.consumed(), 1);
        assert_eq!(metrics.unfiltered(), 0);
    }

    #[tokio::test]
    async fn resolved_message_is_stored_and_acknowledged() {
        let repository = Arc::new(MemoryRepository::default());
        let resolver = Arc::new(ScriptedResolver::succeeding(tx_detail("abc")));
        let metrics = Arc::new(RecordingMetrics::default());
        let pool = pool(4, repository.clone(), resolver, metrics.clone());

        let (message, ack) = ScriptedMessage::new(queue_event("2/emitter/5", ChainId::ETHEREUM));
        pool.push(Box::new(message), &CancellationToken::new())
            .await
            .unwrap();
        pool.stop_gracefully().await;

        assert_eq!(ack.get(), Ack::Done);
        let origin = repository.origin("2/emitter/5").unwrap();
        assert_eq!(origin.status, OriginTxStatus::Confirmed);
        assert_eq!(origin.native_tx_hash.as_deref(), Some("abc"));
        assert_eq!(metrics.inserted(), 1);
    }

    #[tokio::test]
    async fn unsupported_chain_is_acknowledged() {
        let repository = Arc::new(MemoryRepository::default());
        let resolver = Arc::new(ScriptedResolver::failing(ResolveError::ChainNotSupported));
        let metrics = Arc::new(RecordingMetrics::default());
        let pool = pool(1, repository.clone(), resolver, metrics.clone());

        let (message, ack) = ScriptedMessage::new(queue_event("9999/emitter/1", ChainId(9999)));
        pool.push(Box::new(message), &CancellationToken::new())
            .await
            .unwrap();
        pool.stop_gracefully().await;

        assert_eq!(ack.get(), Ack::Done);
        assert_eq!(repository.upserts(), 0);
        assert_eq!(metrics.failed(), 0);
    }

    #[tokio::test]
    async fn transient_error_fails_message_and_leaves_record_untouched() {
        let repository = Arc::new(MemoryRepository::default());
        let resolver = Arc::new(ScriptedResolver::failing(|chain_id| {
            ResolveError::UpstreamUnavailable {
                chain_id,
                reason: "timeout".to_string(),
            }
        }));
        let metrics = Arc::new(RecordingMetrics::default());
        let pool = pool(1, repository.clone(), resolver, metrics.clone());

        let (message, ack) = ScriptedMessage::new(queue_event("2/emitter/1", ChainId::ETHEREUM));
        pool.push(Box::new(message), &CancellationToken::new())
            .await
            .unwrap();
        pool.stop_gracefully().await;

        assert_eq!(ack.get(), Ack::Failed);
        assert!(repository.origin("2/emitter/1").is_none());
        assert_eq!(metrics.failed(), 1);
    }

    #[tokio::test]
    async fn exhausted_attempts_mark_internal_error() {
        let repository = Arc::new(MemoryRepository::default());
        let resolver = Arc::new(ScriptedResolver::failing(|chain_id| {
            ResolveError::MalformedUpstreamResponse {
                chain_id,
                reason: "garbage".to_string(),
            }
        }));
        let pool = pool(1, repository.clone(), resolver, Arc::new(NoopMetrics));

        let (message, ack) = ScriptedMessage::new(queue_event("2/emitter/1", ChainId::ETHEREUM));
        message.set_delivery_attempt(WorkerPoolSettings::default().max_delivery_attempts);
        pool.push(Box::new(message), &CancellationToken::new())
            .await
            .unwrap();
        pool.stop_gracefully().await;

        assert_eq!(ack.get(), Ack::Done);
        assert_eq!(
            repository.origin("2/emitter/1").unwrap().status,
            OriginTxStatus::InternalError
        );
    }

    #[tokio::test]
    async fn stop_gracefully_drains_accepted_messages() {
        let repository = Arc::new(MemoryRepository::default());
        let resolver = Arc::new(
            ScriptedResolver::succeeding(tx_detail("abc")).with_delay(Duration::from_millis(20)),
        );
        let pool = pool(3, repository.clone(), resolver, Arc::new(NoopMetrics));
        let cancel = CancellationToken::new();

        let mut acks = Vec::new();
        for i in 0..10 {
            let (message, ack) =
                ScriptedMessage::new(queue_event(&format!("2/emitter/{i}"), ChainId::ETHEREUM));
            pool.push(Box::new(message), &cancel).await.unwrap();
            acks.push(ack);
        }
        pool.stop_gracefully().await;

        for ack in acks {
            assert_eq!(ack.get(), Ack::Done);
        }
        assert_eq!(repository.upserts(), 10);
    }

    #[tokio::test]
    async fn push_blocks_until_a_worker_is_free() {
        let repository = Arc::new(MemoryRepository::default());
        let resolver = Arc::new(ScriptedResolver::hanging());
        let root = CancellationToken::new();
        let pool = WorkerPool::new(
            &settings(1),
            SourceTxProcessor::new(repository, resolver),
            Arc::new(NoopMetrics),
            root.clone(),
        );
        let cancel = CancellationToken::new();

        let (busy, busy_ack) =
            ScriptedMessage::new(queue_event("2/emitter/busy", ChainId::ETHEREUM));
        pool.push(Box::new(busy), &cancel).await.unwrap();

        let (waiting, waiting_ack) =
            ScriptedMessage::new(queue_event("2/emitter/waiting", ChainId::ETHEREUM));
        let pushed = tokio::time::timeout(
            Duration::from_millis(100),
            pool.push(Box::new(waiting), &cancel),
        )
        .await;
        assert!(pushed.is_err(), "push must wait while the only worker is busy");
        assert_eq!(waiting_ack.get(), Ack::Pending);

        let (blocked, blocked_ack) =
            ScriptedMessage::new(queue_event("2/emitter/blocked", ChainId::ETHEREUM));
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });
        let result = pool.push(Box::new(blocked), &cancel).await;
        assert!(matches!(result, Err(PushError::Cancelled)));
        assert_eq!(blocked_ack.get(), Ack::Pending);

        // root cancellation aborts the hanging resolution, the accepted message fails
        root.cancel();
        pool.stop_gracefully().await;
        assert_eq!(busy_ack.get(), Ack::Failed);
    }

    #[tokio::test]
    async fn shutdown_on_last_attempt_releases_message() {
        let repository = Arc::new(MemoryRepository::default());
        let metrics = Arc::new(RecordingMetrics::default());
        let root = CancellationToken::new();
        let pool = WorkerPool::new(
            &settings(1),
            SourceTxProcessor::new(repository.clone(), Arc::new(ScriptedResolver::hanging())),
            metrics.clone(),
            root.clone(),
        );

        let (message, ack) = ScriptedMessage::new(queue_event("2/emitter/1", ChainId::ETHEREUM));
        message.set_delivery_attempt(WorkerPoolSettings::default().max_delivery_attempts);
        pool.push(Box::new(message), &CancellationToken::new())
            .await
            .unwrap();
        root.cancel();
        pool.stop_gracefully().await;

        assert_eq!(ack.get(), Ack::Failed);
        assert!(repository.origin("2/emitter/1").is_none());
        assert_eq!(metrics.failed(), 0);
    }
}
