//! Chain status queries over JSON-RPC.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ethstats_protocol::Block;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::trace;
use url::Url;

use crate::error::{Error, Result};

/// Default per-request timeout for chain RPC calls.
pub const DEFAULT_CHAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Read access to the chain client the reporter watches.
#[async_trait]
pub trait ChainClient: Debug + Send + Sync + 'static {
    /// Connected peer count.
    async fn peer_count(&self) -> Result<u64>;

    /// Suggested gas price in wei.
    async fn gas_price(&self) -> Result<u64>;

    /// Whether the node is still catching up.
    async fn syncing(&self) -> Result<bool>;

    /// Latest block header fields.
    async fn latest_block(&self) -> Result<Block>;

    /// Transactions in the pending block.
    async fn pending_transaction_count(&self) -> Result<u64>;
}

/// Options for configuring an [`RpcChainClient`].
#[derive(Clone, Debug)]
pub struct RpcChainClientOptions {
    /// HTTP JSON-RPC endpoint.
    pub url: Url,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// [`ChainClient`] backed by an Ethereum JSON-RPC endpoint.
#[derive(Debug)]
pub struct RpcChainClient {
    client: Client,
    url: Url,
    next_id: AtomicU64,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncProgress {
    current_block: String,
    highest_block: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SyncStatus {
    Flag(bool),
    Progress(SyncProgress),
}

#[derive(Deserialize)]
struct RpcBlock {
    number: String,
    #[serde(default)]
    hash: Option<String>,
    #[serde(default)]
    difficulty: Option<String>,
    timestamp: String,
}

impl RpcChainClient {
    /// Create a client for the endpoint in `options`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HttpRequest`] if the HTTP client cannot be built.
    pub fn new(RpcChainClientOptions { url, timeout }: RpcChainClientOptions) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            url,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        trace!("calling {} (id {})", method, id);

        let response: RpcResponse = self
            .client
            .post(self.url.clone())
            .json(&json!({
                "jsonrpc": "2.0",
                "method": method,
                "params": params,
                "id": id
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(RpcError { code, message }) = response.error {
            return Err(Error::Rpc { code, message });
        }

        Ok(serde_json::from_value(response.result)?)
    }

    async fn quantity(&self, method: &str, params: Value) -> Result<u64> {
        let value: String = self.call(method, params).await?;
        parse_quantity(&value)
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn peer_count(&self) -> Result<u64> {
        self.quantity("net_peerCount", json!([])).await
    }

    async fn gas_price(&self) -> Result<u64> {
        self.quantity("eth_gasPrice", json!([])).await
    }

    async fn syncing(&self) -> Result<bool> {
        let status: SyncStatus = self.call("eth_syncing", json!([])).await?;
        match status {
            SyncStatus::Flag(syncing) => Ok(syncing),
            SyncStatus::Progress(progress) => Ok(parse_quantity(&progress.current_block)?
                < parse_quantity(&progress.highest_block)?),
        }
    }

    async fn latest_block(&self) -> Result<Block> {
        let block: Option<RpcBlock> = self
            .call("eth_getBlockByNumber", json!(["latest", false]))
            .await?;
        let block = block.ok_or_else(|| Error::Json("latest block is null".to_string()))?;

        Ok(Block {
            number: parse_quantity(&block.number)?,
            hash: block.hash.unwrap_or_default(),
            difficulty: block
                .difficulty
                .as_deref()
                .map_or(Ok(0), parse_quantity)?,
            time: parse_quantity(&block.timestamp)?,
        })
    }

    async fn pending_transaction_count(&self) -> Result<u64> {
        let count: Option<String> = self
            .call("eth_getBlockTransactionCountByNumber", json!(["pending"]))
            .await?;
        count.as_deref().map_or(Ok(0), parse_quantity)
    }
}

/// Parse a `0x`-prefixed hex quantity, saturating at `u64::MAX`.
///
/// # Errors
///
/// Returns [`Error::InvalidQuantity`] if `value` is not hex.
pub fn parse_quantity(value: &str) -> Result<u64> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| Error::InvalidQuantity(value.to_string()))?;

    if digits.is_empty() {
        return Ok(0);
    }

    let wide = u128::from_str_radix(digits, 16)
        .map_err(|_| Error::InvalidQuantity(value.to_string()))?;
    Ok(u64::try_from(wide).unwrap_or(u64::MAX))
}
