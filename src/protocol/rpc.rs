//! The RPC collaborator seam and transaction confirmation loops

use async_trait::async_trait;
use ethabi::ethereum_types::{H160, H256};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::protocol::artifacts::ContractArtifact;
use crate::protocol::contracts::ContractCall;

/// Ethereum account or contract address
pub type Address = H160;

/// Transaction hash
pub type TxHash = H256;

/// Default interval between receipt polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Gas settings passed through to the node untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasParams {
    /// Gas limit; `None` lets the node estimate
    pub gas: Option<u64>,
    /// Gas price in wei
    pub gas_price: u64,
}

impl Default for GasParams {
    fn default() -> Self {
        Self {
            gas: None,
            gas_price: 2_500_000_000,
        }
    }
}

/// Sender and gas of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxParams {
    /// Sending account
    pub from: Address,
    /// Gas settings
    pub gas: GasParams,
}

/// Transaction receipt, as much of it as the relay needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    /// Transaction hash
    pub transaction_hash: String,
    /// Block the transaction was mined in, hex quantity
    #[serde(default)]
    pub block_number: Option<String>,
    /// Address of a created contract
    #[serde(default)]
    pub contract_address: Option<String>,
    /// `0x1` on success, `0x0` on failure
    #[serde(default)]
    pub status: Option<String>,
    /// Gas consumed, hex quantity
    #[serde(default)]
    pub gas_used: Option<String>,
}

impl TxReceipt {
    /// Whether the node reports success
    pub fn succeeded(&self) -> bool {
        self.status.as_deref().and_then(parse_quantity) == Some(1)
    }

    /// Mined block number
    pub fn block_number_u64(&self) -> Option<u64> {
        self.block_number.as_deref().and_then(parse_quantity)
    }

    /// Gas consumed
    pub fn gas_used_u64(&self) -> Option<u64> {
        self.gas_used.as_deref().and_then(parse_quantity)
    }

    /// Address of the contract this transaction created
    pub fn contract_address(&self) -> Result<Address> {
        let raw = self.contract_address.as_deref().ok_or_else(|| {
            Error::other(format!(
                "Receipt {} has no contract address",
                self.transaction_hash
            ))
        })?;
        parse_address(raw)
    }
}

/// Where a submitted transaction stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    /// No receipt yet, or not in a block yet
    Pending,
    /// Mined successfully
    Mined(TxReceipt),
    /// Mined with a failure status
    Failed(TxReceipt),
}

impl TxStatus {
    /// Classify a receipt lookup result.
    ///
    /// A failure status wins over a block number.
    pub fn from_receipt(receipt: Option<TxReceipt>) -> Self {
        match receipt {
            None => TxStatus::Pending,
            Some(r) if !r.succeeded() => TxStatus::Failed(r),
            Some(r) if r.block_number.is_some() => TxStatus::Mined(r),
            Some(_) => TxStatus::Pending,
        }
    }
}

/// Final result of waiting on a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutcome {
    /// Mined successfully
    Confirmed(TxReceipt),
    /// Mined with a failure status
    Failed(TxReceipt),
    /// Still unmined when the wait timed out
    Pending,
}

impl TxOutcome {
    /// The receipt of a confirmed transaction, anything else as an error
    pub fn into_receipt(self, what: &str) -> Result<TxReceipt> {
        match self {
            TxOutcome::Confirmed(r) => Ok(r),
            TxOutcome::Failed(r) => Err(Error::transaction_failed(format!(
                "{} ({})",
                what, r.transaction_hash
            ))),
            TxOutcome::Pending => Err(Error::timeout(format!("{} not mined in time", what))),
        }
    }
}

/// The operations the relay needs from an Ethereum node
#[async_trait]
pub trait RelayRpc: Send + Sync {
    /// Accounts the node can sign for
    async fn accounts(&self) -> Result<Vec<Address>>;

    /// Submit a contract creation transaction
    async fn deploy(&self, artifact: &ContractArtifact, tx: &TxParams) -> Result<TxHash>;

    /// Submit a contract method call transaction
    async fn send_call(
        &self,
        contract: Address,
        call: &ContractCall,
        tx: &TxParams,
    ) -> Result<TxHash>;

    /// Current status of a submitted transaction
    async fn transaction_status(&self, tx_hash: TxHash) -> Result<TxStatus>;
}

/// How long and how often to poll for receipts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Delay between polls
    pub poll_interval: Duration,
    /// Give up after this long; `None` waits forever
    pub timeout: Option<Duration>,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
        }
    }
}

/// Poll until a transaction is mined or failed, or the wait times out
pub async fn await_mined<R>(rpc: &R, tx_hash: TxHash, options: &WaitOptions) -> Result<TxOutcome>
where
    R: RelayRpc + ?Sized,
{
    let deadline = options.timeout.map(|t| Instant::now() + t);
    info!(tx_hash = ?tx_hash, "Waiting for transaction to get mined");

    loop {
        match rpc.transaction_status(tx_hash).await? {
            TxStatus::Mined(receipt) => {
                info!(tx_hash = ?tx_hash, block = ?receipt.block_number_u64(), "Transaction mined");
                debug!(?receipt, "Receipt");
                return Ok(TxOutcome::Confirmed(receipt));
            }
            TxStatus::Failed(receipt) => {
                error!(tx_hash = ?tx_hash, "Transaction failed");
                debug!(?receipt, "Receipt");
                return Ok(TxOutcome::Failed(receipt));
            }
            TxStatus::Pending => {}
        }

        if deadline.is_some_and(|d| Instant::now() + options.poll_interval > d) {
            warn!(tx_hash = ?tx_hash, "Gave up waiting for transaction");
            return Ok(TxOutcome::Pending);
        }
        tokio::time::sleep(options.poll_interval).await;
    }
}

/// Poll a batch of transactions until every one is mined or failed, or the
/// wait times out. Outcomes come back in input order.
pub async fn await_mined_batch<R>(
    rpc: &R,
    tx_hashes: &[TxHash],
    options: &WaitOptions,
) -> Result<Vec<TxOutcome>>
where
    R: RelayRpc + ?Sized,
{
    let deadline = options.timeout.map(|t| Instant::now() + t);
    let mut outcomes: Vec<Option<TxOutcome>> = vec![None; tx_hashes.len()];
    info!(count = tx_hashes.len(), "Waiting for transactions to get mined");

    loop {
        let pending: Vec<usize> = (0..tx_hashes.len())
            .filter(|&i| outcomes[i].is_none())
            .collect();
        let statuses =
            try_join_all(pending.iter().map(|&i| rpc.transaction_status(tx_hashes[i]))).await?;

        for (i, status) in pending.into_iter().zip(statuses) {
            match status {
                TxStatus::Mined(receipt) => outcomes[i] = Some(TxOutcome::Confirmed(receipt)),
                TxStatus::Failed(receipt) => {
                    error!(tx_hash = ?tx_hashes[i], "Transaction failed");
                    outcomes[i] = Some(TxOutcome::Failed(receipt));
                }
                TxStatus::Pending => {}
            }
        }

        if outcomes.iter().all(Option::is_some) {
            info!("All transactions handled");
            break;
        }
        if deadline.is_some_and(|d| Instant::now() + options.poll_interval > d) {
            warn!(
                pending = outcomes.iter().filter(|o| o.is_none()).count(),
                "Gave up waiting for transactions"
            );
            break;
        }
        tokio::time::sleep(options.poll_interval).await;
    }

    Ok(outcomes
        .into_iter()
        .map(|o| o.unwrap_or(TxOutcome::Pending))
        .collect())
}

/// Send a contract call and wait for it
pub async fn submit_and_await<R>(
    rpc: &R,
    contract: Address,
    call: &ContractCall,
    tx: &TxParams,
    options: &WaitOptions,
) -> Result<TxOutcome>
where
    R: RelayRpc + ?Sized,
{
    let tx_hash = rpc.send_call(contract, call, tx).await?;
    debug!(method = call.method(), tx_hash = ?tx_hash, "Submitted call");
    await_mined(rpc, tx_hash, options).await
}

/// Parse a hex quantity such as `0x1b4`
pub fn parse_quantity(s: &str) -> Option<u64> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(digits, 16).ok()
}

/// Parse a `0x`-prefixed 20-byte address
pub fn parse_address(s: &str) -> Result<Address> {
    let bytes = crate::utils::parse_hex(s)?;
    if bytes.len() != 20 {
        return Err(Error::malformed_input(format!("Invalid address: {}", s)));
    }
    Ok(Address::from_slice(&bytes))
}

/// Parse a `0x`-prefixed 32-byte hash
pub fn parse_tx_hash(s: &str) -> Result<TxHash> {
    let bytes = crate::utils::parse_hex(s)?;
    if bytes.len() != 32 {
        return Err(Error::malformed_input(format!("Invalid transaction hash: {}", s)));
    }
    Ok(TxHash::from_slice(&bytes))
}
