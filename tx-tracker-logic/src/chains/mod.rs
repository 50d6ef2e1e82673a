mod aptos;
mod evm;
mod http;
mod settings;
mod solana;
mod sui;

pub use aptos::AptosAdapter;
pub use evm::EvmAdapter;
pub use settings::{ChainsSettings, EvmChainSettings};
pub use solana::SolanaAdapter;
pub use sui::SuiAdapter;

use crate::chain_id::ChainId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};

/// Origin transaction details as reported by the native chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxDetail {
    pub native_tx_hash: String,
    pub from: String,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<serde_json::Value>,
}

/// Everything an adapter may need to find the origin transaction of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxLocator {
    /// Hint attached to the message by the watcher. Its meaning is chain specific:
    /// a transaction hash on EVM chains, the message account on Solana,
    /// the event creation number on Aptos, the transaction digest on Sui.
    pub tx_hash: Option<String>,
    pub emitter: String,
    pub sequence: String,
}

impl TxLocator {
    fn required_hint(&self, chain_id: ChainId) -> Result<&str, ResolveError> {
        match self.tx_hash.as_deref().map(str::trim) {
            Some(hint) if !hint.is_empty() => Ok(hint),
            _ => Err(ResolveError::InvalidLocator {
                chain_id,
                reason: "transaction hash hint is missing".to_string(),
            }),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("chain {0} is not supported")]
    ChainNotSupported(ChainId),
    #[error("upstream of chain {chain_id} unavailable: {reason}")]
    UpstreamUnavailable { chain_id: ChainId, reason: String },
    #[error("malformed response from chain {chain_id}: {reason}")]
    MalformedUpstreamResponse { chain_id: ChainId, reason: String },
    #[error("invalid locator for chain {chain_id}: {reason}")]
    InvalidLocator { chain_id: ChainId, reason: String },
}

impl ResolveError {
    pub fn is_chain_not_supported(&self) -> bool {
        matches!(self, Self::ChainNotSupported(_))
    }
}

#[async_trait]
pub trait TxResolver: Send + Sync {
    async fn fetch_tx(&self, chain_id: ChainId, locator: &TxLocator)
        -> Result<TxDetail, ResolveError>;
}

#[derive(Debug, Clone)]
pub enum ChainAdapter {
    Evm(EvmAdapter),
    Solana(SolanaAdapter),
    Aptos(AptosAdapter),
    Sui(SuiAdapter),
}

impl ChainAdapter {
    pub async fn fetch_tx(
        &self,
        chain_id: ChainId,
        locator: &TxLocator,
    ) -> Result<TxDetail, ResolveError> {
        match self {
            Self::Evm(adapter) => adapter.fetch_tx(chain_id, locator).await,
            Self::Solana(adapter) => adapter.fetch_tx(chain_id, locator).await,
            Self::Aptos(adapter) => adapter.fetch_tx(chain_id, locator).await,
            Self::Sui(adapter) => adapter.fetch_tx(chain_id, locator).await,
        }
    }
}

/// Lookup from chain to the adapter able to resolve its transactions.
///
/// Built once at startup; chains without a configured adapter fail fast with
/// [`ResolveError::ChainNotSupported`].
#[derive(Debug, Clone, Default)]
pub struct ChainRegistry {
    adapters: HashMap<ChainId, Arc<ChainAdapter>>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_adapter(mut self, chain_id: ChainId, adapter: ChainAdapter) -> Self {
        self.insert(chain_id, adapter);
        self
    }

    pub fn insert(&mut self, chain_id: ChainId, adapter: ChainAdapter) {
        if self.adapters.insert(chain_id, Arc::new(adapter)).is_some() {
            tracing::warn!(%chain_id, "chain adapter was registered twice, the last one wins");
        }
    }

    pub fn from_settings(settings: &ChainsSettings) -> anyhow::Result<Self> {
        let client = http::build_client(settings.request_timeout)?;
        let mut registry = Self::new();

        if let Some(url) = &settings.solana_url {
            registry.insert(
                ChainId::SOLANA,
                ChainAdapter::Solana(SolanaAdapter::new(client.clone(), url.clone())),
            );
        }
        if let Some(url) = &settings.aptos_url {
            registry.insert(
                ChainId::APTOS,
                ChainAdapter::Aptos(AptosAdapter::new(client.clone(), url.clone())),
            );
        }
        if let Some(url) = &settings.sui_url {
            registry.insert(
                ChainId::SUI,
                ChainAdapter::Sui(SuiAdapter::new(client.clone(), url.clone())),
            );
        }
        for (name, evm) in &settings.evm {
            tracing::debug!(name, chain_id = %evm.chain_id, "registering evm chain");
            registry.insert(
                evm.chain_id,
                ChainAdapter::Evm(EvmAdapter::new(client.clone(), evm.url.clone())),
            );
        }

        tracing::info!(
            chains = ?registry.supported_chains(),
            "chain registry initialized"
        );
        Ok(registry)
    }

    pub fn is_supported(&self, chain_id: ChainId) -> bool {
        self.adapters.contains_key(&chain_id)
    }

    pub fn supported_chains(&self) -> Vec<ChainId> {
        let mut chains: Vec<_> = self.adapters.keys().copied().collect();
        chains.sort();
        chains
    }
}

#[async_trait]
impl TxResolver for ChainRegistry {
    async fn fetch_tx(
        &self,
        chain_id: ChainId,
        locator: &TxLocator,
    ) -> Result<TxDetail, ResolveError> {
        let adapter = self
            .adapters
            .get(&chain_id)
            .ok_or(ResolveError::ChainNotSupported(chain_id))?;
        adapter.fetch_tx(chain_id, locator).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn locator(tx_hash: Option<&str>) -> TxLocator {
        TxLocator {
            tx_hash: tx_hash.map(str::to_string),
            emitter: "0000000000000000000000000000000000000000000000000000000000000001"
                .to_string(),
            sequence: "5".to_string(),
        }
    }

    #[tokio::test]
    async fn unknown_chain_is_not_supported() {
        let registry = ChainRegistry::new();
        let err = registry
            .fetch_tx(ChainId(9999), &locator(Some("0xabc")))
            .await
            .unwrap_err();
        assert!(err.is_chain_not_supported(), "unexpected error: {err:?}");
    }

    #[test]
    fn registry_from_settings_registers_configured_chains() {
        let settings = ChainsSettings {
            request_timeout: Duration::from_secs(1),
            aptos_url: Some("http://localhost:8080/v1".parse().unwrap()),
            solana_url: None,
            sui_url: None,
            evm: HashMap::from([(
                "ethereum".to_string(),
                EvmChainSettings {
                    chain_id: ChainId::ETHEREUM,
                    url: "http://localhost:8545".parse().unwrap(),
                },
            )]),
        };
        let registry = ChainRegistry::from_settings(&settings).unwrap();
        assert_eq!(
            registry.supported_chains(),
            vec![ChainId::ETHEREUM, ChainId::APTOS]
        );
        assert!(!registry.is_supported(ChainId::SOLANA));
    }

    #[test]
    fn missing_hint_is_an_invalid_locator() {
        let err = locator(Some("  ")).required_hint(ChainId::SUI).unwrap_err();
        assert!(matches!(err, ResolveError::InvalidLocator { .. }));
        assert_eq!(
            locator(Some("digest")).required_hint(ChainId::SUI).unwrap(),
            "digest"
        );
    }
}
