use crate::{
    services::{health, VaaService, VaaServiceError},
    settings::Settings,
};
use actix_web::{middleware::Condition, web, App, HttpResponse, HttpServer};
use anyhow::Context;
use blockscout_service_launcher::{
    launcher::{HttpServerSettings, MetricsSettings},
    tracing as launcher_tracing,
};
use prometheus::{Encoder, Registry, TextEncoder};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tx_tracker_logic::{
    chains::{ChainRegistry, TxDetail, TxResolver},
    consumer::Consumer,
    database::{TxRepository, TxTrackerDatabase},
    metrics::{Metrics, PrometheusMetrics},
    processor::SourceTxProcessor,
    queue::{MemoryQueue, QueueEvent},
    worker_pool::WorkerPool,
};

const SERVICE_NAME: &str = "tx_tracker";

pub struct AppState {
    vaa: VaaService,
    registry: Registry,
}

impl AppState {
    pub fn new(vaa: VaaService, registry: Registry) -> Self {
        Self { vaa, registry }
    }
}

#[derive(Debug, Deserialize)]
struct ProcessVaaRequest {
    id: String,
}

#[derive(Debug, Serialize)]
struct ProcessVaaResponse {
    result: TxDetail,
}

async fn ingest_vaa(
    state: web::Data<AppState>,
    event: web::Json<QueueEvent>,
) -> Result<HttpResponse, VaaServiceError> {
    let event = event.into_inner();
    let id = event.id.clone();
    let inserted = state.vaa.ingest(event).await?;
    Ok(HttpResponse::Accepted().json(serde_json::json!({
        "id": id,
        "inserted": inserted,
    })))
}

async fn process_vaa(
    state: web::Data<AppState>,
    request: web::Json<ProcessVaaRequest>,
) -> Result<web::Json<ProcessVaaResponse>, VaaServiceError> {
    let result = state.vaa.process_vaa(&request.id).await?;
    Ok(web::Json(ProcessVaaResponse { result }))
}

async fn metrics(state: web::Data<AppState>) -> actix_web::Result<HttpResponse> {
    let mut buffer = vec![];
    TextEncoder::new()
        .encode(&state.registry.gather(), &mut buffer)
        .map_err(actix_web::error::ErrorInternalServerError)?;
    Ok(HttpResponse::Ok()
        .content_type(prometheus::TEXT_FORMAT)
        .body(buffer))
}

pub fn http_configure(config: &mut web::ServiceConfig, state: Arc<AppState>) {
    config
        .app_data(web::Data::from(state))
        .route("/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics))
        .service(
            web::scope("/api/v1")
                .route("/vaa", web::post().to(ingest_vaa))
                .route("/vaa/process", web::post().to(process_vaa)),
        );
}

fn metrics_configure(config: &mut web::ServiceConfig, registry: Registry, route: &str) {
    config
        .app_data(web::Data::new(registry))
        .route(route, web::get().to(dedicated_metrics));
}

async fn dedicated_metrics(registry: web::Data<Registry>) -> actix_web::Result<HttpResponse> {
    let mut buffer = vec![];
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .map_err(actix_web::error::ErrorInternalServerError)?;
    Ok(HttpResponse::Ok()
        .content_type(prometheus::TEXT_FORMAT)
        .body(buffer))
}

fn http_serve(
    state: Arc<AppState>,
    settings: &HttpServerSettings,
) -> Result<actix_web::dev::Server, anyhow::Error> {
    tracing::info!("starting http server on addr {}", settings.addr);

    let json_cfg = web::JsonConfig::default().limit(settings.max_body_size);
    let cors_settings = settings.cors.clone();
    let cors_enabled = cors_settings.enabled;
    let server = HttpServer::new(move || {
        let state = state.clone();
        let cors = cors_settings.clone().build();
        App::new()
            .wrap(Condition::new(cors_enabled, cors))
            .app_data(json_cfg.clone())
            .configure(|config| http_configure(config, state))
    })
    .bind(settings.addr)
    .context("failed to bind http server")?
    .run();
    Ok(server)
}

fn metrics_serve(
    registry: Registry,
    settings: &MetricsSettings,
) -> Result<actix_web::dev::Server, anyhow::Error> {
    tracing::info!(
        "starting metrics server on addr {}{}",
        settings.addr,
        settings.route
    );

    let route = settings.route.clone();
    let server = HttpServer::new(move || {
        let registry = registry.clone();
        App::new().configure(|config| metrics_configure(config, registry, &route))
    })
    .bind(settings.addr)
    .context("failed to bind metrics server")?
    .run();
    Ok(server)
}

pub async fn run(settings: Settings, db: Arc<DatabaseConnection>) -> Result<(), anyhow::Error> {
    launcher_tracing::init_logs(SERVICE_NAME, &settings.tracing, &settings.jaeger)?;

    let registry = Registry::new();
    let metrics: Arc<dyn Metrics> = Arc::new(
        PrometheusMetrics::new(&registry).context("failed to register prometheus metrics")?,
    );
    let repository: Arc<dyn TxRepository> = Arc::new(TxTrackerDatabase::new(db));
    let resolver: Arc<dyn TxResolver> = Arc::new(ChainRegistry::from_settings(&settings.chains)?);
    let processor = SourceTxProcessor::new(repository, resolver);
    let queue = MemoryQueue::new(settings.queue.clone());
    let shutdown = CancellationToken::new();

    let pool = WorkerPool::new(
        &settings.worker_pool,
        processor.clone(),
        metrics,
        shutdown.clone(),
    );
    let consumer = Consumer::new(Arc::new(queue.clone()), pool);
    let consumer_handle = tokio::spawn(consumer.run(shutdown.clone()));

    let mut servers = vec![];
    if settings.server.http.enabled {
        let state = Arc::new(AppState::new(
            VaaService::new(processor, queue, shutdown.clone()),
            registry.clone(),
        ));
        servers.push(tokio::spawn(http_serve(state, &settings.server.http)?));
    }
    if settings.metrics.enabled {
        servers.push(tokio::spawn(metrics_serve(registry, &settings.metrics)?));
    }

    // each server resolves once it received a termination signal
    let result = if servers.is_empty() {
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for ctrl-c")
    } else {
        let (result, _, others) = futures::future::select_all(servers).await;
        for server in others {
            server.abort();
        }
        result
            .context("server task panicked")
            .and_then(|result| result.context("server failed"))
    };

    tracing::info!("shutting down vaa pipeline");
    shutdown.cancel();
    consumer_handle
        .await
        .context("consumer task failed to complete")?;
    result
}
