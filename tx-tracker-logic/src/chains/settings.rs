use crate::chain_id::ChainId;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::{collections::HashMap, time::Duration};
use url::Url;

#[serde_as]
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ChainsSettings {
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub request_timeout: Duration,
    pub solana_url: Option<Url>,
    pub aptos_url: Option<Url>,
    pub sui_url: Option<Url>,
    /// EVM json-rpc endpoints keyed by a free-form network name.
    pub evm: HashMap<String, EvmChainSettings>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EvmChainSettings {
    pub chain_id: ChainId,
    pub url: Url,
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for ChainsSettings {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            solana_url: None,
            aptos_url: None,
            sui_url: None,
            evm: HashMap::new(),
        }
    }
}
