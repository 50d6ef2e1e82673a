use anyhow::Context;
use blockscout_service_launcher::{database, launcher::ConfigSettings};
use migration::Migrator;
use std::sync::Arc;
use tx_tracker_server::{run, Settings};

#[actix_web::main]
async fn main() -> Result<(), anyhow::Error> {
    let settings = Settings::build().context("failed to read config")?;
    let db_connection = database::initialize_postgres::<Migrator>(&settings.database).await?;

    run(settings, Arc::new(db_connection)).await
}
