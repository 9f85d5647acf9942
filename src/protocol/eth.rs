//! Ethereum JSON-RPC 2.0 client

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::artifacts::ContractArtifact;
use crate::protocol::contracts::ContractCall;
use crate::protocol::retry::RetryPolicy;
use crate::protocol::rpc::{
    parse_address, parse_quantity, parse_tx_hash, Address, RelayRpc, TxHash, TxParams, TxReceipt,
    TxStatus,
};
use crate::utils::to_hex_prefixed;

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Client for a node's HTTP JSON-RPC endpoint.
///
/// Reads are retried under the configured [`RetryPolicy`]. Transactions are
/// submitted once; a failed submission is reported, never replayed.
pub struct EthRpcClient {
    client: Client,
    url: Url,
    retry: RetryPolicy,
    next_id: AtomicU64,
}

impl EthRpcClient {
    /// Create a client for `url`
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| Error::config(format!("Invalid RPC URL: {}", e)))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to create HTTP client: {}", e)))?;

        info!("Created JSON-RPC client for {}", url);

        Ok(Self {
            client,
            url,
            retry: RetryPolicy::default(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Replace the retry policy for reads
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Endpoint URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// One JSON-RPC round trip, no retries
    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        debug!(method, id, "JSON-RPC request");

        let response = self
            .client
            .post(self.url.clone())
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<RpcResponse>()
            .await?;

        if let Some(err) = response.error {
            return Err(Error::rpc(err.code, err.message));
        }
        Ok(serde_json::from_value(response.result)?)
    }

    /// A read, retried on transient failures
    async fn read<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        self.retry
            .execute(|| self.request(method, params.clone()))
            .await
    }

    /// Latest block number
    pub async fn block_number(&self) -> Result<u64> {
        let raw: String = self.read("eth_blockNumber", json!([])).await?;
        parse_quantity(&raw)
            .ok_or_else(|| Error::malformed_input(format!("Invalid block number {}", raw)))
    }

    /// Receipt of a transaction, `None` while unknown to the node
    pub async fn transaction_receipt(&self, tx_hash: TxHash) -> Result<Option<TxReceipt>> {
        self.read(
            "eth_getTransactionReceipt",
            json!([to_hex_prefixed(tx_hash.as_bytes())]),
        )
        .await
    }

    async fn send_transaction(
        &self,
        tx: &TxParams,
        to: Option<Address>,
        data: &[u8],
    ) -> Result<TxHash> {
        let raw: String = self
            .request("eth_sendTransaction", json!([transaction_object(tx, to, data)]))
            .await?;
        parse_tx_hash(&raw)
    }
}

/// The transaction object `eth_sendTransaction` takes
fn transaction_object(tx: &TxParams, to: Option<Address>, data: &[u8]) -> Value {
    let mut object = Map::new();
    object.insert("from".into(), to_hex_prefixed(tx.from.as_bytes()).into());
    if let Some(to) = to {
        object.insert("to".into(), to_hex_prefixed(to.as_bytes()).into());
    }
    object.insert("data".into(), to_hex_prefixed(data).into());
    if let Some(gas) = tx.gas.gas {
        object.insert("gas".into(), format!("0x{:x}", gas).into());
    }
    object.insert("gasPrice".into(), format!("0x{:x}", tx.gas.gas_price).into());
    Value::Object(object)
}

#[async_trait]
impl RelayRpc for EthRpcClient {
    async fn accounts(&self) -> Result<Vec<Address>> {
        let raw: Vec<String> = self.read("eth_accounts", json!([])).await?;
        raw.iter().map(|s| parse_address(s)).collect()
    }

    async fn deploy(&self, artifact: &ContractArtifact, tx: &TxParams) -> Result<TxHash> {
        info!("Deploying contract {}", artifact.name());
        self.send_transaction(tx, None, artifact.bytecode()).await
    }

    async fn send_call(
        &self,
        contract: Address,
        call: &ContractCall,
        tx: &TxParams,
    ) -> Result<TxHash> {
        debug!(method = %call.signature(), "Sending contract call");
        self.send_transaction(tx, Some(contract), &call.encode()).await
    }

    async fn transaction_status(&self, tx_hash: TxHash) -> Result<TxStatus> {
        self.transaction_receipt(tx_hash)
            .await
            .map(TxStatus::from_receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::rpc::GasParams;
    use mockito::{Matcher, Server};
    use pretty_assertions::assert_eq;

    fn tx_params() -> TxParams {
        TxParams {
            from: Address::from_low_u64_be(0xaa),
            gas: GasParams {
                gas: Some(4_000_000),
                gas_price: 2_500_000_000,
            },
        }
    }

    #[test]
    fn test_transaction_object() {
        let object = transaction_object(&tx_params(), Some(Address::from_low_u64_be(1)), &[0xab]);
        assert_eq!(object["from"], "0x00000000000000000000000000000000000000aa");
        assert_eq!(object["to"], "0x0000000000000000000000000000000000000001");
        assert_eq!(object["data"], "0xab");
        assert_eq!(object["gas"], "0x3d0900");
        assert_eq!(object["gasPrice"], "0x9502f900");

        let mut params = tx_params();
        params.gas.gas = None;
        let object = transaction_object(&params, None, &[]);
        assert!(object.get("gas").is_none());
        assert!(object.get("to").is_none());
    }

    #[tokio::test]
    async fn test_block_number_and_accounts() {
        let mut server = Server::new_async().await;
        let _block = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({"method": "eth_blockNumber"})))
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x1b4"}"#)
            .create_async()
            .await;
        let _accounts = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({"method": "eth_accounts"})))
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"jsonrpc":"2.0","id":2,"result":["0x00000000000000000000000000000000000000aa"]}"#,
            )
            .create_async()
            .await;

        let client = EthRpcClient::new(&server.url(), Duration::from_secs(5)).unwrap();
        assert_eq!(client.block_number().await.unwrap(), 436);
        assert_eq!(
            client.accounts().await.unwrap(),
            vec![Address::from_low_u64_be(0xaa)]
        );
    }

    #[tokio::test]
    async fn test_rpc_error_is_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"method not found"}}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let client = EthRpcClient::new(&server.url(), Duration::from_secs(5)).unwrap();
        let err = client.block_number().await.unwrap_err();
        assert!(matches!(err, Error::Rpc { code: -32601, .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let mut server = Server::new_async().await;
        let failing = server
            .mock("POST", "/")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let client = EthRpcClient::new(&server.url(), Duration::from_secs(5))
            .unwrap()
            .with_retry(RetryPolicy::new(
                3,
                Duration::from_millis(1),
                Duration::from_millis(5),
            ));
        let err = client.block_number().await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
        failing.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_receipt_is_pending() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(
                json!({"method": "eth_getTransactionReceipt"}),
            ))
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":null}"#)
            .create_async()
            .await;

        let client = EthRpcClient::new(&server.url(), Duration::from_secs(5)).unwrap();
        let status = client
            .transaction_status(TxHash::from_low_u64_be(1))
            .await
            .unwrap();
        assert_eq!(status, TxStatus::Pending);
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(
            EthRpcClient::new("not a url", Duration::from_secs(1)),
            Err(Error::Config(_))
        ));
    }
}
