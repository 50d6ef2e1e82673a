use anyhow::Context;
use blockscout_service_launcher::{database, launcher::ConfigSettings, tracing as launcher_tracing};
use migration::Migrator;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tx_tracker_logic::{
    backfill::Backfiller, chains::ChainRegistry, database::TxTrackerDatabase,
    metrics::NoopMetrics, processor::SourceTxProcessor,
};
use tx_tracker_server::Settings;

const SERVICE_NAME: &str = "tx_tracker_backfiller";

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let settings = Settings::build().context("failed to read config")?;
    launcher_tracing::init_logs(SERVICE_NAME, &settings.tracing, &settings.jaeger)?;
    let db_connection = database::initialize_postgres::<Migrator>(&settings.database).await?;

    let repository = Arc::new(TxTrackerDatabase::new(Arc::new(db_connection)));
    let resolver = Arc::new(ChainRegistry::from_settings(&settings.chains)?);
    let backfiller = Backfiller::new(
        SourceTxProcessor::new(repository, resolver),
        Arc::new(NoopMetrics),
        settings.backfill,
    );

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("received ctrl-c, abandoning in-flight records and stopping");
                cancel.cancel();
            }
        }
    });

    let report = backfiller.run(&cancel).await?;
    tracing::info!(
        pages = report.pages,
        processed = report.processed,
        resolved = report.resolved,
        already_processed = report.already_processed,
        unsupported_chain = report.unsupported_chain,
        failed = report.failed,
        cancelled = report.cancelled,
        missing_vaa = report.missing_vaa,
        "backfill finished"
    );
    Ok(())
}
