use blockscout_service_launcher::{
    database::{DatabaseConnectSettings, DatabaseSettings},
    launcher::{ConfigSettings, MetricsSettings, ServerSettings},
    tracing::{JaegerSettings, TracingSettings},
};
use serde::{Deserialize, Serialize};
use tx_tracker_logic::{
    chains::ChainsSettings,
    settings::{BackfillSettings, MemoryQueueSettings, WorkerPoolSettings},
};

#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub metrics: MetricsSettings,
    #[serde(default)]
    pub tracing: TracingSettings,
    #[serde(default)]
    pub jaeger: JaegerSettings,
    pub database: DatabaseSettings,
    #[serde(default)]
    pub worker_pool: WorkerPoolSettings,
    #[serde(default)]
    pub queue: MemoryQueueSettings,
    #[serde(default)]
    pub chains: ChainsSettings,
    #[serde(default)]
    pub backfill: BackfillSettings,
}

impl ConfigSettings for Settings {
    const SERVICE_NAME: &'static str = "TX_TRACKER";

    fn validate(&self) -> anyhow::Result<()> {
        if self.backfill.page_size == 0 {
            anyhow::bail!("backfill.page_size must be positive");
        }
        Ok(())
    }
}

impl Settings {
    pub fn default(database_url: String) -> Self {
        Self {
            server: Default::default(),
            metrics: Default::default(),
            tracing: Default::default(),
            jaeger: Default::default(),
            database: DatabaseSettings {
                connect: DatabaseConnectSettings::Url(database_url),
                create_database: Default::default(),
                run_migrations: Default::default(),
                connect_options: Default::default(),
            },
            worker_pool: Default::default(),
            queue: Default::default(),
            chains: Default::default(),
            backfill: Default::default(),
        }
    }
}
