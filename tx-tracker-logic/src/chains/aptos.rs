use super::{
    http::{get_json, join_url, malformed},
    ResolveError, TxDetail, TxLocator,
};
use crate::chain_id::ChainId;
use chrono::DateTime;
use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr};
use url::Url;

pub const APTOS_CORE_CONTRACT_ADDRESS: &str =
    "0x5bc11445584a763c1fa7ed39081f1b920954da14e04b32440cba863d03e19625";

#[serde_as]
#[derive(Debug, Deserialize)]
struct AptosEvent {
    #[serde_as(as = "DisplayFromStr")]
    version: u64,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct AptosTransaction {
    /// Microseconds since the unix epoch.
    #[serde_as(as = "DisplayFromStr")]
    timestamp: i64,
    sender: String,
    hash: String,
}

/// Resolves a message through the core contract event stream: the locator
/// carries the event creation number (hex), which leads to a ledger version,
/// which leads to the transaction.
#[derive(Debug, Clone)]
pub struct AptosAdapter {
    client: reqwest::Client,
    base_url: Url,
}

impl AptosAdapter {
    pub fn new(client: reqwest::Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    pub async fn fetch_tx(
        &self,
        chain_id: ChainId,
        locator: &TxLocator,
    ) -> Result<TxDetail, ResolveError> {
        let hint = locator.required_hint(chain_id)?;
        let creation_number = u64::from_str_radix(hint.trim_start_matches("0x"), 16)
            .map_err(|err| ResolveError::InvalidLocator {
                chain_id,
                reason: format!("failed to parse event creation number '{hint}': {err}"),
            })?;

        let mut events_url = join_url(
            chain_id,
            &self.base_url,
            &format!(
                "accounts/{APTOS_CORE_CONTRACT_ADDRESS}/events/{APTOS_CORE_CONTRACT_ADDRESS}::state::WormholeMessageHandle/event"
            ),
        )?;
        events_url
            .query_pairs_mut()
            .append_pair("start", &creation_number.to_string())
            .append_pair("limit", "1");
        let events: Vec<AptosEvent> = get_json(&self.client, chain_id, events_url).await?;
        let version = match events.as_slice() {
            [event] => event.version,
            _ => {
                return Err(malformed(
                    chain_id,
                    format!("expected exactly one event, but got {}", events.len()),
                ))
            }
        };

        let tx_url = join_url(
            chain_id,
            &self.base_url,
            &format!("transactions/by_version/{version}"),
        )?;
        let tx: AptosTransaction = get_json(&self.client, chain_id, tx_url).await?;
        let timestamp = DateTime::from_timestamp_micros(tx.timestamp).ok_or_else(|| {
            malformed(
                chain_id,
                format!("transaction timestamp {} is out of range", tx.timestamp),
            )
        })?;

        Ok(TxDetail {
            native_tx_hash: tx.hash,
            from: tx.sender,
            timestamp: Some(timestamp),
            attribute: None,
        })
    }
}
