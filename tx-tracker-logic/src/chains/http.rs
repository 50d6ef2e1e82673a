use super::ResolveError;
use crate::chain_id::ChainId;
use anyhow::Context;
use reqwest::{header, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

pub fn build_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("failed to build http client")
}

fn transport_error(chain_id: ChainId, err: reqwest::Error) -> ResolveError {
    let reason = if err.is_timeout() {
        format!("request timed out: {err}")
    } else {
        err.to_string()
    };
    ResolveError::UpstreamUnavailable { chain_id, reason }
}

async fn read_body<T: DeserializeOwned>(
    chain_id: ChainId,
    response: reqwest::Response,
) -> Result<T, ResolveError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ResolveError::UpstreamUnavailable {
            chain_id,
            reason: format!("unexpected status code {status} from {}", response.url()),
        });
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|err| transport_error(chain_id, err))?;
    serde_json::from_slice(&bytes).map_err(|err| ResolveError::MalformedUpstreamResponse {
        chain_id,
        reason: format!("failed to decode response body: {err}"),
    })
}

pub async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    chain_id: ChainId,
    url: Url,
) -> Result<T, ResolveError> {
    let response = client
        .get(url)
        .header(header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(|err| transport_error(chain_id, err))?;
    read_body(chain_id, response).await
}

#[derive(Serialize)]
struct JsonRpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Sends a single json-rpc call. A `null` result is reported as `Ok(None)`.
pub async fn json_rpc<P: Serialize, T: DeserializeOwned>(
    client: &reqwest::Client,
    chain_id: ChainId,
    url: &Url,
    method: &str,
    params: P,
) -> Result<Option<T>, ResolveError> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0",
        id: 1,
        method,
        params,
    };
    let response = client
        .post(url.clone())
        .json(&request)
        .send()
        .await
        .map_err(|err| transport_error(chain_id, err))?;
    let body: JsonRpcResponse<T> = read_body(chain_id, response).await?;
    if let Some(error) = body.error {
        return Err(ResolveError::UpstreamUnavailable {
            chain_id,
            reason: format!(
                "{method} failed with code {}: {}",
                error.code, error.message
            ),
        });
    }
    Ok(body.result)
}

pub fn malformed(chain_id: ChainId, reason: impl Into<String>) -> ResolveError {
    ResolveError::MalformedUpstreamResponse {
        chain_id,
        reason: reason.into(),
    }
}

pub fn join_url(chain_id: ChainId, base: &Url, path: &str) -> Result<Url, ResolveError> {
    let base = base.as_str().trim_end_matches('/');
    Url::parse(&format!("{base}/{}", path.trim_start_matches('/'))).map_err(|err| {
        ResolveError::InvalidLocator {
            chain_id,
            reason: format!("failed to build request url: {err}"),
        }
    })
}
