//! Ethereum side of the relay: RPC collaborator, contract calls and
//! transaction confirmation

pub mod artifacts;
pub mod contracts;
pub mod eth;
pub mod relay;
pub mod retry;
pub mod rpc;

pub use artifacts::{ContractArtifact, Proof, VerificationKey};
pub use contracts::ContractCall;
pub use eth::EthRpcClient;
pub use relay::RelayClient;
pub use retry::RetryPolicy;
pub use rpc::{
    await_mined, await_mined_batch, submit_and_await, Address, GasParams, RelayRpc, TxHash,
    TxOutcome, TxParams, TxReceipt, TxStatus, WaitOptions,
};
