use super::{
    http::{json_rpc, malformed},
    ResolveError, TxDetail, TxLocator,
};
use crate::chain_id::ChainId;
use chrono::DateTime;
use serde::Deserialize;
use url::Url;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvmTransaction {
    hash: String,
    from: String,
    block_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EvmBlock {
    timestamp: String,
}

#[derive(Debug, Clone)]
pub struct EvmAdapter {
    client: reqwest::Client,
    url: Url,
}

impl EvmAdapter {
    pub fn new(client: reqwest::Client, url: Url) -> Self {
        Self { client, url }
    }

    pub async fn fetch_tx(
        &self,
        chain_id: ChainId,
        locator: &TxLocator,
    ) -> Result<TxDetail, ResolveError> {
        let hint = locator.required_hint(chain_id)?;
        let tx_hash = if hint.starts_with("0x") {
            hint.to_string()
        } else {
            format!("0x{hint}")
        };

        let tx: EvmTransaction = json_rpc(
            &self.client,
            chain_id,
            &self.url,
            "eth_getTransactionByHash",
            [&tx_hash],
        )
        .await?
        .ok_or_else(|| malformed(chain_id, format!("transaction {tx_hash} not found")))?;

        let block_hash = tx
            .block_hash
            .ok_or_else(|| malformed(chain_id, format!("transaction {tx_hash} is pending")))?;
        let block: EvmBlock = json_rpc(
            &self.client,
            chain_id,
            &self.url,
            "eth_getBlockByHash",
            (&block_hash, false),
        )
        .await?
        .ok_or_else(|| malformed(chain_id, format!("block {block_hash} not found")))?;

        let timestamp = i64::from_str_radix(block.timestamp.trim_start_matches("0x"), 16)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(|| {
                malformed(
                    chain_id,
                    format!("invalid block timestamp '{}'", block.timestamp),
                )
            })?;

        Ok(TxDetail {
            native_tx_hash: tx.hash,
            from: tx.from.to_lowercase(),
            timestamp: Some(timestamp),
            attribute: None,
        })
    }
}
