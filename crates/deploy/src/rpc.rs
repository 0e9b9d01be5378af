//! JSON-RPC access to the target chain.
//!
//! [`ChainClient`] is the seam between the executor and the node: the HTTP
//! implementation below talks to a real endpoint, tests plug in an in-memory chain.

use std::{future::Future, time::Duration};

use alloy_core::primitives::{Address, B256, Bytes};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use serde_json::Value;
use url::Url;

use crate::NetworkProfile;

/// Default timeout for RPC requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from a JSON-RPC exchange.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    /// The request never produced an HTTP response (DNS, refused, timeout).
    #[error("transport error: {0}")]
    Transport(String),
    /// The endpoint answered with a non-success HTTP status, e.g. rejected credentials.
    #[error("http status {0}")]
    Status(u16),
    /// The node answered with a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Response { code: i64, message: String },
    /// The response could not be decoded.
    #[error("invalid response: {0}")]
    Decode(String),
}

/// The subset of a transaction receipt the deployment cares about.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    #[serde(default, deserialize_with = "deserialize_opt_u64_from_hex")]
    pub block_number: Option<u64>,
    /// `1` for success, `0` for a reverted execution.
    #[serde(default, deserialize_with = "deserialize_opt_u64_from_hex")]
    pub status: Option<u64>,
    #[serde(default)]
    pub contract_address: Option<Address>,
    #[serde(deserialize_with = "deserialize_u64_from_hex")]
    pub gas_used: u64,
    #[serde(default, deserialize_with = "deserialize_opt_u128_from_hex")]
    pub effective_gas_price: Option<u128>,
}

impl TransactionReceipt {
    /// Pre-Byzantium receipts have no status field and count as successful.
    pub fn succeeded(&self) -> bool {
        self.status != Some(0)
    }
}

/// Client side of the chain RPC used by the executor.
pub trait ChainClient: Send + Sync {
    /// `eth_chainId`.
    fn chain_id(&self) -> impl Future<Output = Result<u64, RpcError>> + Send;

    /// `eth_getTransactionCount` at the pending block.
    fn transaction_count(
        &self,
        address: Address,
    ) -> impl Future<Output = Result<u64, RpcError>> + Send;

    /// `eth_gasPrice`.
    fn gas_price(&self) -> impl Future<Output = Result<u128, RpcError>> + Send;

    /// `eth_estimateGas` for a contract creation.
    fn estimate_gas(
        &self,
        from: Address,
        input: &Bytes,
    ) -> impl Future<Output = Result<u64, RpcError>> + Send;

    /// `eth_sendRawTransaction`.
    fn send_raw_transaction(
        &self,
        raw: &Bytes,
    ) -> impl Future<Output = Result<B256, RpcError>> + Send;

    /// `eth_getTransactionReceipt`; `None` while the transaction is not mined.
    fn transaction_receipt(
        &self,
        hash: B256,
    ) -> impl Future<Output = Result<Option<TransactionReceipt>, RpcError>> + Send;

    /// Whether the node knows the transaction at all (mempool or chain).
    fn transaction_known(&self, hash: B256)
    -> impl Future<Output = Result<bool, RpcError>> + Send;
}

/// Creates a [`ChainClient`] bound to a profile's endpoint.
pub trait ChainConnector {
    type Client: ChainClient;

    fn connect(&self, profile: &NetworkProfile) -> Result<Self::Client, RpcError>;
}

/// Connects over HTTP JSON-RPC.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    timeout: Duration,
}

impl HttpConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for HttpConnector {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl ChainConnector for HttpConnector {
    type Client = HttpChainClient;

    fn connect(&self, profile: &NetworkProfile) -> Result<Self::Client, RpcError> {
        let url = profile.parsed_rpc_url().map_err(RpcError::Transport)?;

        let mut headers = HeaderMap::new();
        if let Some(auth) = &profile.auth_headers {
            for (name, value) in auth.iter() {
                let name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| RpcError::Transport(format!("invalid header name: {}", e)))?;
                let mut value = HeaderValue::from_str(value)
                    .map_err(|e| RpcError::Transport(format!("invalid header value: {}", e)))?;
                value.set_sensitive(true);
                headers.insert(name, value);
            }
        }

        let client = create_client(headers, self.timeout)?;
        Ok(HttpChainClient { client, url })
    }
}

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client(headers: HeaderMap, timeout: Duration) -> Result<reqwest::Client, RpcError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()
        .map_err(|e| RpcError::Transport(format!("failed to create HTTP client: {}", e)))
}

/// Make a JSON-RPC call and deserialize the result.
///
/// # Arguments
/// * `client` - The HTTP client to use
/// * `url` - The RPC endpoint URL
/// * `method` - The RPC method name
/// * `params` - The method parameters
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &Url,
    method: &str,
    params: Vec<Value>,
) -> Result<T, RpcError> {
    let response = client
        .post(url.clone())
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .map_err(|e| RpcError::Transport(format!("{} request failed: {}", method, e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(RpcError::Status(status.as_u16()));
    }

    let result: Value = response
        .json()
        .await
        .map_err(|e| RpcError::Decode(format!("failed to parse {} response: {}", method, e)))?;

    if let Some(error) = result.get("error") {
        return Err(RpcError::Response {
            code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
        });
    }

    let result_value = result
        .get("result")
        .cloned()
        .ok_or_else(|| RpcError::Decode(format!("no result in {} response", method)))?;

    serde_json::from_value(result_value)
        .map_err(|e| RpcError::Decode(format!("failed to deserialize {} result: {}", method, e)))
}

/// [`ChainClient`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpChainClient {
    client: reqwest::Client,
    url: Url,
}

impl HttpChainClient {
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, RpcError> {
        tracing::trace!(method, url = %self.url, "JSON-RPC call");
        json_rpc_call(&self.client, &self.url, method, params).await
    }

    async fn quantity(&self, method: &str, params: Vec<Value>) -> Result<u128, RpcError> {
        let value: String = self.call(method, params).await?;
        parse_quantity(&value).map_err(RpcError::Decode)
    }
}

impl ChainClient for HttpChainClient {
    async fn chain_id(&self) -> Result<u64, RpcError> {
        let id = self.quantity("eth_chainId", vec![]).await?;
        u64::try_from(id).map_err(|_| RpcError::Decode(format!("chain id {} out of range", id)))
    }

    async fn transaction_count(&self, address: Address) -> Result<u64, RpcError> {
        let count = self
            .quantity(
                "eth_getTransactionCount",
                vec![serde_json::json!(address), serde_json::json!("pending")],
            )
            .await?;
        u64::try_from(count).map_err(|_| RpcError::Decode(format!("nonce {} out of range", count)))
    }

    async fn gas_price(&self) -> Result<u128, RpcError> {
        self.quantity("eth_gasPrice", vec![]).await
    }

    async fn estimate_gas(&self, from: Address, input: &Bytes) -> Result<u64, RpcError> {
        let gas = self
            .quantity(
                "eth_estimateGas",
                vec![serde_json::json!({ "from": from, "data": input })],
            )
            .await?;
        u64::try_from(gas).map_err(|_| RpcError::Decode(format!("gas {} out of range", gas)))
    }

    async fn send_raw_transaction(&self, raw: &Bytes) -> Result<B256, RpcError> {
        self.call("eth_sendRawTransaction", vec![serde_json::json!(raw)])
            .await
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<TransactionReceipt>, RpcError> {
        self.call("eth_getTransactionReceipt", vec![serde_json::json!(hash)])
            .await
    }

    async fn transaction_known(&self, hash: B256) -> Result<bool, RpcError> {
        let tx: Option<Value> = self
            .call("eth_getTransactionByHash", vec![serde_json::json!(hash)])
            .await?;
        Ok(tx.is_some_and(|tx| !tx.is_null()))
    }
}

/// Parse a hex quantity (`0x1a`).
pub fn parse_quantity(value: &str) -> Result<u128, String> {
    let digits = value
        .strip_prefix("0x")
        .ok_or_else(|| format!("quantity '{}' is not 0x-prefixed", value))?;

    if digits.is_empty() {
        return Err("empty quantity".to_string());
    }

    u128::from_str_radix(digits, 16).map_err(|e| format!("invalid quantity '{}': {}", value, e))
}

/// Deserialize a u64 from a hex string (with 0x prefix).
fn deserialize_u64_from_hex<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    let value = parse_quantity(&s).map_err(serde::de::Error::custom)?;
    u64::try_from(value).map_err(serde::de::Error::custom)
}

fn deserialize_opt_u64_from_hex<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Deserialize::deserialize(deserializer)?;
    s.map(|s| {
        let value = parse_quantity(&s).map_err(serde::de::Error::custom)?;
        u64::try_from(value).map_err(serde::de::Error::custom)
    })
    .transpose()
}

fn deserialize_opt_u128_from_hex<'de, D>(deserializer: D) -> Result<Option<u128>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Deserialize::deserialize(deserializer)?;
    s.map(|s| parse_quantity(&s).map_err(serde::de::Error::custom))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AccountKey, AuthHeaders};

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x0"), Ok(0));
        assert_eq!(parse_quantity("0x3e9"), Ok(1001));
        assert_eq!(parse_quantity("0x2019"), Ok(8217));
        assert!(parse_quantity("1001").is_err());
        assert!(parse_quantity("0x").is_err());
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn test_deserialize_receipt() {
        let receipt: TransactionReceipt = serde_json::from_value(serde_json::json!({
            "transactionHash": "0x88df016429689c079f3b2f6ad39fa052532c56795b733da78a91ebe6a713944b",
            "blockNumber": "0x1b4",
            "status": "0x1",
            "contractAddress": "0x5fbdb2315678afecb367f032d93f642f64180aa3",
            "gasUsed": "0x5208",
            "effectiveGasPrice": "0x3b9aca00",
            "logs": []
        }))
        .unwrap();

        assert_eq!(receipt.block_number, Some(436));
        assert_eq!(receipt.gas_used, 21_000);
        assert_eq!(receipt.effective_gas_price, Some(1_000_000_000));
        assert!(receipt.succeeded());
        assert!(receipt.contract_address.is_some());
    }

    #[test]
    fn test_reverted_receipt() {
        let receipt: TransactionReceipt = serde_json::from_value(serde_json::json!({
            "transactionHash": "0x88df016429689c079f3b2f6ad39fa052532c56795b733da78a91ebe6a713944b",
            "blockNumber": "0x1b4",
            "status": "0x0",
            "contractAddress": null,
            "gasUsed": "0x5208"
        }))
        .unwrap();

        assert!(!receipt.succeeded());
        assert!(receipt.effective_gas_price.is_none());
    }

    #[test]
    fn test_connect_rejects_bad_header() {
        let profile = NetworkProfile::new(
            "baobab",
            "https://api.baobab.klaytn.net:8651",
            vec![AccountKey::new(
                "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
            )],
        )
        .with_auth_headers(AuthHeaders::new().with("x-chain-id", "bad\nvalue"));

        assert!(HttpConnector::default().connect(&profile).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let profile = NetworkProfile::new(
            "local",
            // Port 9 (discard) is not expected to run an RPC server.
            "http://127.0.0.1:9",
            vec![AccountKey::new(
                "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
            )],
        );

        let client = HttpConnector::new(Duration::from_secs(2))
            .connect(&profile)
            .unwrap();
        let err = client.chain_id().await.unwrap_err();
        assert!(matches!(err, RpcError::Transport(_)), "{:?}", err);
    }
}
