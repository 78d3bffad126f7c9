//! Ethereum JSON-RPC state reader.

use std::sync::atomic::{AtomicU64, Ordering};

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error};

use crate::error::{ChainError, ChainResult};
use crate::reader::ChainStateReader;
use crate::types::TokenRef;

/// `balanceOf(address)` function selector.
const BALANCE_OF_SELECTOR: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];

/// Reads balances and block height from an Ethereum JSON-RPC endpoint.
///
/// Reads are against the `latest` block of whichever replica answers.
/// Callers that need to observe a recent write should first wait with
/// [`ConsistencyWaiter`](crate::ConsistencyWaiter).
pub struct JsonRpcChainReader {
    client: Client,
    url: String,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

impl JsonRpcChainReader {
    /// Create a reader for the endpoint at `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), url)
    }

    /// Create a reader sharing an existing HTTP client.
    #[must_use]
    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    /// The endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call(&self, method: &str, params: Value) -> ChainResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        debug!(method, id, "sending json-rpc request");

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            error!(status = %status, method, "json-rpc endpoint returned an error status");
            return Err(ChainError::Rpc(format!("HTTP {}: {text}", status.as_u16())));
        }

        let parsed: RpcResponse = response
            .json()
            .await
            .map_err(|e| ChainError::InvalidResponse(e.to_string()))?;

        if let Some(err) = parsed.error {
            return Err(ChainError::Rpc(format!("{} ({})", err.message, err.code)));
        }
        parsed
            .result
            .ok_or_else(|| ChainError::InvalidResponse(format!("{method}: missing result")))
    }
}

impl std::fmt::Debug for JsonRpcChainReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRpcChainReader")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChainStateReader for JsonRpcChainReader {
    async fn balance(&self, token: &TokenRef, owner: Address) -> ChainResult<U256> {
        let result = match token {
            TokenRef::Native => {
                self.call("eth_getBalance", json!([owner.to_string(), "latest"]))
                    .await?
            },
            TokenRef::Contract(contract) => {
                let call = json!({
                    "to": contract.to_string(),
                    "data": balance_of_calldata(owner),
                });
                self.call("eth_call", json!([call, "latest"])).await?
            },
        };
        let text = as_str(&result)?;
        match token {
            TokenRef::Native => parse_quantity_u256(text),
            TokenRef::Contract(_) => parse_word(text),
        }
    }

    async fn block_height(&self) -> ChainResult<u64> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        parse_quantity_u64(as_str(&result)?)
    }
}

fn as_str(value: &Value) -> ChainResult<&str> {
    value
        .as_str()
        .ok_or_else(|| ChainError::InvalidResponse(format!("expected hex string, got {value}")))
}

/// ABI-encoded `balanceOf(owner)` call data as a `0x` hex string.
fn balance_of_calldata(owner: Address) -> String {
    let mut data = Vec::with_capacity(36);
    data.extend_from_slice(&BALANCE_OF_SELECTOR);
    data.extend_from_slice(&[0u8; 12]);
    data.extend_from_slice(owner.as_slice());
    format!("0x{}", hex::encode(data))
}

fn strip_hex_prefix(text: &str) -> ChainResult<&str> {
    text.strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .ok_or_else(|| ChainError::InvalidResponse(format!("missing 0x prefix: {text}")))
}

/// Parse a JSON-RPC quantity (`0x`-prefixed, no leading zeros required).
fn parse_quantity_u256(text: &str) -> ChainResult<U256> {
    let digits = strip_hex_prefix(text)?;
    if digits.is_empty() {
        return Err(ChainError::InvalidResponse("empty quantity".to_string()));
    }
    U256::from_str_radix(digits, 16)
        .map_err(|e| ChainError::InvalidResponse(format!("bad quantity {text}: {e}")))
}

fn parse_quantity_u64(text: &str) -> ChainResult<u64> {
    let digits = strip_hex_prefix(text)?;
    u64::from_str_radix(digits, 16)
        .map_err(|e| ChainError::InvalidResponse(format!("bad quantity {text}: {e}")))
}

/// Parse a single ABI-encoded 32-byte word. An empty result (`0x`) reads as zero.
fn parse_word(text: &str) -> ChainResult<U256> {
    let digits = strip_hex_prefix(text)?;
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    if digits.len() > 64 {
        return Err(ChainError::InvalidResponse(format!(
            "return data longer than one word: {} hex chars",
            digits.len()
        )));
    }
    U256::from_str_radix(digits, 16)
        .map_err(|e| ChainError::InvalidResponse(format!("bad word {text}: {e}")))
}
