use prometheus::Registry;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tx_tracker_logic::{
    chain_id::ChainId,
    chains::{ChainRegistry, ChainsSettings, EvmChainSettings, TxResolver},
    metrics::{Metrics, PrometheusMetrics},
    processor::SourceTxProcessor,
    queue::MemoryQueue,
    test_utils::MemoryRepository,
};
use tx_tracker_server::{services::VaaService, AppState};
use wiremock::MockServer;

#[allow(dead_code)]
pub struct TestApp {
    pub repository: Arc<MemoryRepository>,
    pub queue: MemoryQueue,
    pub metrics: Arc<dyn Metrics>,
    pub state: Arc<AppState>,
}

#[allow(dead_code)]
pub fn test_app(resolver: Arc<dyn TxResolver>) -> TestApp {
    let repository = Arc::new(MemoryRepository::default());
    let queue = MemoryQueue::new(Default::default());
    let registry = Registry::new();
    let metrics: Arc<dyn Metrics> = Arc::new(PrometheusMetrics::new(&registry).unwrap());
    let processor = SourceTxProcessor::new(repository.clone(), resolver);
    let state = Arc::new(AppState::new(
        VaaService::new(processor, queue.clone(), CancellationToken::new()),
        registry,
    ));
    TestApp {
        repository,
        queue,
        metrics,
        state,
    }
}

/// Registry with a single EVM chain served by `server`.
#[allow(dead_code)]
pub fn evm_registry(server: &MockServer, request_timeout: Duration) -> ChainRegistry {
    ChainRegistry::from_settings(&ChainsSettings {
        request_timeout,
        evm: HashMap::from([(
            "ethereum".to_string(),
            EvmChainSettings {
                chain_id: ChainId::ETHEREUM,
                url: server.uri().parse().unwrap(),
            },
        )]),
        ..Default::default()
    })
    .unwrap()
}
