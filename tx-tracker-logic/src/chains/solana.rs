use super::{
    http::{json_rpc, malformed},
    ResolveError, TxDetail, TxLocator,
};
use crate::chain_id::ChainId;
use chrono::DateTime;
use serde::Deserialize;
use serde_json::json;
use url::Url;

const SIGNATURES_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
struct SignatureInfo {
    signature: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SolanaTransaction {
    block_time: Option<i64>,
    transaction: TransactionEnvelope,
}

#[derive(Debug, Deserialize)]
struct TransactionEnvelope {
    message: TransactionMessage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionMessage {
    account_keys: Vec<AccountKey>,
}

#[derive(Debug, Deserialize)]
struct AccountKey {
    pubkey: String,
    #[serde(default)]
    signer: bool,
}

/// The locator hint on Solana is the message account. The transaction that
/// created it is the oldest signature touching that account.
#[derive(Debug, Clone)]
pub struct SolanaAdapter {
    client: reqwest::Client,
    url: Url,
    page_size: usize,
}

impl SolanaAdapter {
    pub fn new(client: reqwest::Client, url: Url) -> Self {
        Self {
            client,
            url,
            page_size: SIGNATURES_LIMIT,
        }
    }

    #[cfg(test)]
    fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Every signature of `account`, newest first. The node returns at most
    /// `page_size` per call, older pages are requested with `before`.
    async fn signatures(
        &self,
        chain_id: ChainId,
        account: &str,
    ) -> Result<Vec<SignatureInfo>, ResolveError> {
        let mut signatures: Vec<SignatureInfo> = Vec::new();
        loop {
            let mut options = json!({ "limit": self.page_size, "commitment": "finalized" });
            if let Some(oldest) = signatures.last() {
                options["before"] = json!(oldest.signature);
            }
            let page: Vec<SignatureInfo> = json_rpc(
                &self.client,
                chain_id,
                &self.url,
                "getSignaturesForAddress",
                json!([account, options]),
            )
            .await?
            .unwrap_or_default();

            let last_page = page.len() < self.page_size;
            signatures.extend(page);
            if last_page {
                return Ok(signatures);
            }
        }
    }

    pub async fn fetch_tx(
        &self,
        chain_id: ChainId,
        locator: &TxLocator,
    ) -> Result<TxDetail, ResolveError> {
        let account = locator.required_hint(chain_id)?;

        let signatures = self.signatures(chain_id, account).await?;
        let signature = signatures
            .last()
            .map(|info| info.signature.clone())
            .ok_or_else(|| malformed(chain_id, format!("no signatures found for {account}")))?;

        let tx: SolanaTransaction = json_rpc(
            &self.client,
            chain_id,
            &self.url,
            "getTransaction",
            json!([signature, {
                "encoding": "jsonParsed",
                "commitment": "finalized",
                "maxSupportedTransactionVersion": 0,
            }]),
        )
        .await?
        .ok_or_else(|| malformed(chain_id, format!("transaction {signature} not found")))?;

        let from = tx
            .transaction
            .message
            .account_keys
            .iter()
            .find(|key| key.signer)
            .map(|key| key.pubkey.clone())
            .ok_or_else(|| malformed(chain_id, format!("transaction {signature} has no signer")))?;
        let timestamp = tx
            .block_time
            .and_then(|secs| DateTime::from_timestamp(secs, 0));

        Ok(TxDetail {
            native_tx_hash: signature,
            from,
            timestamp,
            attribute: Some(json!({ "signatureCount": signatures.len() })),
        })
    }
}
