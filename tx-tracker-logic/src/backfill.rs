use crate::{
    database::{TimeRange, TimeRangeCursor, VaaRecord},
    metrics::Metrics,
    processor::{ProcessError, ProcessOutcome, ProcessSourceTxParams, SourceTxProcessor},
    settings::{BackfillSettings, BackfillStrategy},
};
use futures::{stream, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BackfillReport {
    pub pages: u64,
    pub processed: u64,
    pub resolved: u64,
    pub already_processed: u64,
    pub unsupported_chain: u64,
    pub failed: u64,
    /// Records whose resolution was interrupted by shutdown. Left untouched.
    pub cancelled: u64,
    /// Incomplete records whose raw message is unknown.
    pub missing_vaa: u64,
}

enum ItemOutcome {
    Resolved,
    AlreadyProcessed,
    UnsupportedChain,
    Failed,
    Cancelled,
}

/// Walks stored records page by page and feeds them through the same
/// resolution path as the live consumer.
pub struct Backfiller {
    processor: SourceTxProcessor,
    metrics: Arc<dyn Metrics>,
    settings: BackfillSettings,
}

impl Backfiller {
    pub fn new(
        processor: SourceTxProcessor,
        metrics: Arc<dyn Metrics>,
        settings: BackfillSettings,
    ) -> Self {
        Self {
            processor,
            metrics,
            settings,
        }
    }

    #[instrument(name = "backfill", level = "info", skip_all)]
    pub async fn run(&self, cancel: &CancellationToken) -> anyhow::Result<BackfillReport> {
        match &self.settings.strategy {
            BackfillStrategy::Incomplete => self.run_incomplete(cancel).await,
            BackfillStrategy::TimeRange {
                after,
                before,
                ascending,
                overwrite,
            } => {
                let range = TimeRange {
                    after: *after,
                    before: *before,
                };
                self.run_time_range(range, *ascending, *overwrite, cancel)
                    .await
            }
        }
    }

    async fn run_incomplete(&self, cancel: &CancellationToken) -> anyhow::Result<BackfillReport> {
        let repository = self.processor.repository();
        let total = repository.count_incomplete().await?;
        tracing::info!(total, "starting backfill of incomplete records");

        let mut report = BackfillReport::default();
        let mut cursor: Option<String> = None;
        while !cancel.is_cancelled() {
            let page = repository
                .scan_incomplete(cursor.as_deref(), self.settings.page_size)
                .await?;
            let Some(last) = page.last() else { break };
            cursor = Some(last.transaction.id.clone());
            report.pages += 1;

            let mut vaas = Vec::with_capacity(page.len());
            for record in page {
                match record.vaa {
                    Some(vaa) => vaas.push(vaa),
                    None => {
                        tracing::warn!(
                            vaa_id = %record.transaction.id,
                            "incomplete record has no stored message, skipping"
                        );
                        report.missing_vaa += 1;
                    }
                }
            }
            // records are incomplete by construction, so always resolve them again
            self.process_page(vaas, true, cancel, &mut report).await;
            tracing::info!(
                pages = report.pages,
                processed = report.processed,
                total,
                "backfill progress"
            );
        }

        Ok(report)
    }

    async fn run_time_range(
        &self,
        range: TimeRange,
        ascending: bool,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> anyhow::Result<BackfillReport> {
        let repository = self.processor.repository();
        let total = repository.count_by_time_range(range).await?;
        tracing::info!(
            total,
            after = ?range.after,
            before = ?range.before,
            ascending,
            overwrite,
            "starting backfill of time range"
        );

        let mut report = BackfillReport::default();
        let mut cursor: Option<TimeRangeCursor> = None;
        while !cancel.is_cancelled() {
            let page = repository
                .scan_by_time_range(cursor.as_ref(), self.settings.page_size, range, ascending)
                .await?;
            let Some(last) = page.last() else { break };
            cursor = Some(last.into());
            report.pages += 1;

            self.process_page(page, overwrite, cancel, &mut report)
                .await;
            tracing::info!(
                pages = report.pages,
                processed = report.processed,
                total,
                "backfill progress"
            );
        }

        Ok(report)
    }

    async fn process_page(
        &self,
        page: Vec<VaaRecord>,
        overwrite: bool,
        cancel: &CancellationToken,
        report: &mut BackfillReport,
    ) {
        let outcomes: Vec<ItemOutcome> = stream::iter(page)
            .map(|vaa| self.process_one(vaa, overwrite, cancel))
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            report.processed += 1;
            match outcome {
                ItemOutcome::Resolved => report.resolved += 1,
                ItemOutcome::AlreadyProcessed => report.already_processed += 1,
                ItemOutcome::UnsupportedChain => report.unsupported_chain += 1,
                ItemOutcome::Failed => report.failed += 1,
                ItemOutcome::Cancelled => report.cancelled += 1,
            }
        }
    }

    async fn process_one(
        &self,
        vaa: VaaRecord,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> ItemOutcome {
        let params = ProcessSourceTxParams::from_vaa(&vaa, overwrite);
        match self.processor.process(&params, cancel).await {
            Ok(ProcessOutcome::Resolved(_)) => {
                self.metrics.inc_origin_tx_inserted(params.chain_id);
                ItemOutcome::Resolved
            }
            Ok(ProcessOutcome::AlreadyProcessed) => ItemOutcome::AlreadyProcessed,
            Err(err) if err.is_chain_not_supported() => {
                tracing::debug!(vaa_id = %params.vaa_id, "chain not supported, skipping");
                ItemOutcome::UnsupportedChain
            }
            Err(err) if err.is_cancelled() => {
                tracing::debug!(vaa_id = %params.vaa_id, "resolution cancelled, leaving record untouched");
                ItemOutcome::Cancelled
            }
            Err(err) => {
                self.metrics.inc_origin_tx_failed(params.chain_id);
                tracing::error!(
                    error = %err,
                    vaa_id = %params.vaa_id,
                    chain_id = %params.chain_id,
                    "failed to backfill origin tx"
                );
                if let ProcessError::Resolve(_) = err {
                    if let Err(err) = self
                        .processor
                        .repository()
                        .mark_origin_internal_error(&params.vaa_id)
                        .await
                    {
                        tracing::error!(error = ?err, vaa_id = %params.vaa_id, "failed to mark origin tx as internal error");
                    }
                }
                ItemOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chain_id::ChainId,
        chains::ResolveError,
        database::{GlobalTransaction, TxRepository},
        metrics::NoopMetrics,
        test_utils::{tx_detail, vaa_record, MemoryRepository, ScriptedResolver},
    };
    use chrono::{Duration, TimeZone, Utc};
    use entity::sea_orm_active_enums::OriginTxStatus;
    use pretty_assertions::assert_eq;

    fn backfiller(
        repository: Arc<MemoryRepository>,
        resolver: Arc<ScriptedResolver>,
        strategy: BackfillStrategy,
    ) -> Backfiller {
        Backfiller::new(
            SourceTxProcessor::new(repository, resolver),
            Arc::new(NoopMetrics),
            BackfillSettings {
                strategy,
                page_size: 2,
                concurrency: 2,
            },
        )
    }

    #[tokio::test]
    async fn incomplete_backfill_resolves_every_incomplete_record() {
        let repository = Arc::new(MemoryRepository::default());
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for i in 0..5 {
            let id = format!("2/emitter/{i}");
            repository.insert_vaa(vaa_record(&id, base)).await.unwrap();
            repository.insert_transaction(GlobalTransaction {
                id,
                origin_tx: None,
                destination_tx: None,
            });
        }
        repository.mark_origin_internal_error("2/emitter/3").await.unwrap();
        repository.insert_transaction(GlobalTransaction {
            id: "2/emitter/orphan".to_string(),
            origin_tx: None,
            destination_tx: None,
        });
        let resolver = Arc::new(ScriptedResolver::succeeding(tx_detail("abc")));

        let report = backfiller(repository.clone(), resolver, BackfillStrategy::Incomplete)
            .run(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.resolved, 5);
        assert_eq!(report.missing_vaa, 1);
        assert_eq!(repository.count_incomplete().await.unwrap(), 1);
        assert_eq!(
            repository.origin("2/emitter/3").unwrap().status,
            OriginTxStatus::Confirmed
        );
    }

    #[tokio::test]
    async fn time_range_backfill_respects_overwrite_flag() {
        let repository = Arc::new(MemoryRepository::default());
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for i in 0..4 {
            repository
                .insert_vaa(vaa_record(&format!("2/emitter/{i}"), base + Duration::minutes(i)))
                .await
                .unwrap();
        }
        // outside of the range
        repository
            .insert_vaa(vaa_record("2/emitter/late", base + Duration::days(1)))
            .await
            .unwrap();
        let resolver = Arc::new(ScriptedResolver::succeeding(tx_detail("abc")));
        let strategy = |overwrite| BackfillStrategy::TimeRange {
            after: Some(base),
            before: Some(base + Duration::hours(1)),
            ascending: false,
            overwrite,
        };

        let first = backfiller(repository.clone(), resolver.clone(), strategy(false))
            .run(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(first.resolved, 4);
        assert_eq!(first.pages, 2);
        assert!(repository.origin("2/emitter/late").is_none());

        let second = backfiller(repository.clone(), resolver.clone(), strategy(false))
            .run(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(second.already_processed, 4);
        assert_eq!(resolver.calls(), 4);

        let third = backfiller(repository.clone(), resolver.clone(), strategy(true))
            .run(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(third.resolved, 4);
        assert_eq!(resolver.calls(), 8);
    }

    #[tokio::test]
    async fn failures_are_recorded_as_internal_error() {
        let repository = Arc::new(MemoryRepository::default());
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        repository
            .insert_vaa(vaa_record("2/emitter/1", base))
            .await
            .unwrap();
        repository
            .insert_vaa(vaa_record("9999/emitter/1", base))
            .await
            .unwrap();
        let resolver = Arc::new(ScriptedResolver::failing(|chain_id| {
            if chain_id == ChainId(9999) {
                ResolveError::ChainNotSupported(chain_id)
            } else {
                ResolveError::UpstreamUnavailable {
                    chain_id,
                    reason: "timeout".to_string(),
                }
            }
        }));

        let report = backfiller(
            repository.clone(),
            resolver,
            BackfillStrategy::TimeRange {
                after: None,
                before: None,
                ascending: true,
                overwrite: false,
            },
        )
        .run(&CancellationToken::new())
        .await
        .unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.unsupported_chain, 1);
        assert_eq!(
            repository.origin("2/emitter/1").unwrap().status,
            OriginTxStatus::InternalError
        );
        assert!(repository.origin("9999/emitter/1").is_none());
    }

    #[tokio::test]
    async fn cancellation_leaves_in_flight_records_untouched() {
        let repository = Arc::new(MemoryRepository::default());
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for i in 0..3 {
            repository
                .insert_vaa(vaa_record(&format!("2/emitter/{i}"), base))
                .await
                .unwrap();
        }
        let backfiller = Backfiller::new(
            SourceTxProcessor::new(repository.clone(), Arc::new(ScriptedResolver::hanging())),
            Arc::new(NoopMetrics),
            BackfillSettings {
                strategy: BackfillStrategy::TimeRange {
                    after: Some(base),
                    before: Some(base + Duration::hours(1)),
                    ascending: true,
                    overwrite: false,
                },
                page_size: 10,
                concurrency: 3,
            },
        );
        let cancel = CancellationToken::new();
        tokio::spawn({
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                cancel.cancel();
            }
        });

        let report = backfiller.run(&cancel).await.unwrap();

        assert_eq!(report.pages, 1);
        assert_eq!(report.cancelled, 3);
        assert_eq!(report.failed, 0);
        for i in 0..3 {
            let id = format!("2/emitter/{i}");
            assert!(repository.find_global_transaction(&id).await.unwrap().is_none());
        }
    }
}
