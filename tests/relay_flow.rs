//! Relay flow against a mocked JSON-RPC node

use btc_snark_relay::core::HeaderStore;
use btc_snark_relay::protocol::{
    contracts, Address, ContractArtifact, EthRpcClient, GasParams, RelayClient, WaitOptions,
};
use btc_snark_relay::utils::logging::LogContext;
use btc_snark_relay::Error;
use mockito::{Matcher, Mock, Server, ServerGuard};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;

const TX_HASH: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";
const STORE_ADDRESS: &str = "0x00000000000000000000000000000000000000c0";

const STORE_ABI: &str = r#"[
  {
    "type": "function",
    "name": "store_block_header",
    "inputs": [
      {"name": "block_number", "type": "uint256"},
      {"name": "version", "type": "bytes4"},
      {"name": "hash_prev_block", "type": "bytes32"},
      {"name": "hash_merkle_root", "type": "bytes32"},
      {"name": "time", "type": "bytes4"},
      {"name": "n_bits", "type": "bytes4"},
      {"name": "nonce", "type": "bytes4"}
    ],
    "outputs": [],
    "stateMutability": "nonpayable"
  },
  {
    "type": "function",
    "name": "get_header_hash",
    "inputs": [{"name": "block_number", "type": "uint256"}],
    "outputs": [{"name": "", "type": "bytes32"}],
    "stateMutability": "nonpayable"
  }
]"#;

fn artifact_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("BTCHeaderStore.abi"), STORE_ABI).unwrap();
    std::fs::write(dir.path().join("BTCHeaderStore.bin"), "0x6080604052\n").unwrap();
    dir
}

fn header_store() -> HeaderStore {
    let mut data = vec![0u8; 80 * 3];
    data[80..84].copy_from_slice(&1u32.to_le_bytes());
    data[80 + 68..80 + 72].copy_from_slice(&1_231_469_665u32.to_le_bytes());
    data[80 + 72..80 + 76].copy_from_slice(&0x1d00ffffu32.to_le_bytes());
    HeaderStore::from_bytes(data).unwrap()
}

fn wait() -> WaitOptions {
    WaitOptions {
        poll_interval: Duration::from_millis(5),
        timeout: Some(Duration::from_secs(2)),
    }
}

async fn rpc_mock(server: &mut ServerGuard, method: &str, result: serde_json::Value) -> Mock {
    server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": method })))
        .with_header("content-type", "application/json")
        .with_body(json!({"jsonrpc": "2.0", "id": 1, "result": result}).to_string())
        .create_async()
        .await
}

async fn client(server: &ServerGuard) -> RelayClient<EthRpcClient> {
    let rpc = EthRpcClient::new(&server.url(), Duration::from_secs(5)).unwrap();
    RelayClient::with_default_account(
        rpc,
        GasParams::default(),
        wait(),
        LogContext::for_operation("relay_flow"),
    )
    .await
    .unwrap()
}

fn receipt(status: &str) -> serde_json::Value {
    json!({
        "transactionHash": TX_HASH,
        "blockNumber": "0x10",
        "contractAddress": STORE_ADDRESS,
        "status": status,
        "gasUsed": "0x5208"
    })
}

#[tokio::test]
async fn test_deploy_then_store_header() {
    let mut server = Server::new_async().await;
    let _accounts = rpc_mock(
        &mut server,
        "eth_accounts",
        json!(["0x00000000000000000000000000000000000000aa"]),
    )
    .await;
    let send = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({"method": "eth_sendTransaction"})))
        .with_header("content-type", "application/json")
        .with_body(json!({"jsonrpc": "2.0", "id": 1, "result": TX_HASH}).to_string())
        .expect(2)
        .create_async()
        .await;
    let _receipt = rpc_mock(&mut server, "eth_getTransactionReceipt", receipt("0x1")).await;

    let dir = artifact_dir();
    let artifact = ContractArtifact::load(dir.path(), "BTCHeaderStore").unwrap();
    assert_eq!(artifact.name(), "BTCHeaderStore");
    assert_eq!(artifact.bytecode(), &[0x60, 0x80, 0x60, 0x40, 0x52]);

    let header = header_store().read_header(1).unwrap();
    let call = contracts::store_block_header(&header).unwrap();
    artifact.check_call(&call).unwrap();

    let relay = client(&server).await;
    assert_eq!(relay.sender(), Address::from_low_u64_be(0xaa));

    let (address, deployed) = relay.deploy(&artifact).await.unwrap();
    assert_eq!(address, Address::from_low_u64_be(0xc0));
    assert_eq!(deployed.block_number_u64(), Some(16));

    let stored = relay.store_block_header(address, &header).await.unwrap();
    assert!(stored.succeeded());
    assert_eq!(stored.gas_used_u64(), Some(21_000));

    send.assert_async().await;
}

#[tokio::test]
async fn test_reverted_call_is_reported() {
    let mut server = Server::new_async().await;
    let _accounts = rpc_mock(
        &mut server,
        "eth_accounts",
        json!(["0x00000000000000000000000000000000000000aa"]),
    )
    .await;
    let _send = rpc_mock(&mut server, "eth_sendTransaction", json!(TX_HASH)).await;
    let _receipt = rpc_mock(&mut server, "eth_getTransactionReceipt", receipt("0x0")).await;

    let relay = client(&server).await;
    let err = relay
        .get_header_hash(Address::from_low_u64_be(0xc0), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TransactionFailed(_)));
}

#[tokio::test]
async fn test_unmined_call_times_out() {
    let mut server = Server::new_async().await;
    let _accounts = rpc_mock(
        &mut server,
        "eth_accounts",
        json!(["0x00000000000000000000000000000000000000aa"]),
    )
    .await;
    let _send = rpc_mock(&mut server, "eth_sendTransaction", json!(TX_HASH)).await;
    let _receipt = rpc_mock(&mut server, "eth_getTransactionReceipt", json!(null)).await;

    let rpc = EthRpcClient::new(&server.url(), Duration::from_secs(5)).unwrap();
    let relay = RelayClient::with_default_account(
        rpc,
        GasParams::default(),
        WaitOptions {
            poll_interval: Duration::from_millis(5),
            timeout: Some(Duration::from_millis(50)),
        },
        LogContext::new(),
    )
    .await
    .unwrap();

    let err = relay
        .get_header_hash(Address::from_low_u64_be(0xc0), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
}

#[tokio::test]
async fn test_node_without_accounts() {
    let mut server = Server::new_async().await;
    let _accounts = rpc_mock(&mut server, "eth_accounts", json!([])).await;

    let rpc = EthRpcClient::new(&server.url(), Duration::from_secs(5)).unwrap();
    let result =
        RelayClient::with_default_account(rpc, GasParams::default(), wait(), LogContext::new())
            .await;
    assert!(matches!(result, Err(Error::Config(_))));
}
