use super::{
    http::{json_rpc, malformed},
    ResolveError, TxDetail, TxLocator,
};
use crate::chain_id::ChainId;
use chrono::DateTime;
use serde::Deserialize;
use serde_json::json;
use serde_with::{serde_as, DisplayFromStr};
use url::Url;

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SuiTransactionBlock {
    digest: String,
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    timestamp_ms: Option<i64>,
    transaction: SuiTransaction,
}

#[derive(Debug, Deserialize)]
struct SuiTransaction {
    data: SuiTransactionData,
}

#[derive(Debug, Deserialize)]
struct SuiTransactionData {
    sender: String,
}

#[derive(Debug, Clone)]
pub struct SuiAdapter {
    client: reqwest::Client,
    url: Url,
}

impl SuiAdapter {
    pub fn new(client: reqwest::Client, url: Url) -> Self {
        Self { client, url }
    }

    pub async fn fetch_tx(
        &self,
        chain_id: ChainId,
        locator: &TxLocator,
    ) -> Result<TxDetail, ResolveError> {
        let digest = locator.required_hint(chain_id)?;

        let block: SuiTransactionBlock = json_rpc(
            &self.client,
            chain_id,
            &self.url,
            "sui_getTransactionBlock",
            json!([digest, { "showInput": true }]),
        )
        .await?
        .ok_or_else(|| malformed(chain_id, format!("transaction {digest} not found")))?;

        Ok(TxDetail {
            native_tx_hash: block.digest,
            from: block.transaction.data.sender,
            timestamp: block.timestamp_ms.and_then(DateTime::from_timestamp_millis),
            attribute: None,
        })
    }
}
