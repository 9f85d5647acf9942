//! Call sequencing against the header store and verifier contracts

use tracing::{error, info, warn, Instrument};

use crate::core::{BlockHeader, ProofWitness};
use crate::error::{Error, Result};
use crate::protocol::artifacts::{ContractArtifact, Proof, VerificationKey};
use crate::protocol::contracts::{self, ContractCall};
use crate::protocol::rpc::{
    await_mined, await_mined_batch, submit_and_await, Address, GasParams, RelayRpc, TxHash,
    TxOutcome, TxParams, TxReceipt, WaitOptions,
};
use crate::utils::logging::LogContext;
use crate::utils::to_hex_prefixed;

/// Relay operations over any [`RelayRpc`] implementation.
///
/// Every method submits its transaction(s) once and waits for mining under
/// the configured [`WaitOptions`]. A failed or unmined transaction is an
/// error.
pub struct RelayClient<R> {
    rpc: R,
    tx: TxParams,
    wait: WaitOptions,
    log: LogContext,
}

impl<R: RelayRpc> RelayClient<R> {
    /// Create a client sending from `tx.from`
    pub fn new(rpc: R, tx: TxParams, wait: WaitOptions, log: LogContext) -> Self {
        let log = log.with_account(&to_hex_prefixed(tx.from.as_bytes()));
        Self { rpc, tx, wait, log }
    }

    /// Create a client sending from the node's first account
    pub async fn with_default_account(
        rpc: R,
        gas: GasParams,
        wait: WaitOptions,
        log: LogContext,
    ) -> Result<Self> {
        let from = rpc
            .accounts()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::config("Node has no unlocked accounts"))?;
        Ok(Self::new(rpc, TxParams { from, gas }, wait, log))
    }

    /// Underlying RPC collaborator
    pub fn rpc(&self) -> &R {
        &self.rpc
    }

    /// Sending account
    pub fn sender(&self) -> Address {
        self.tx.from
    }

    /// Deploy a contract and return its address
    pub async fn deploy(&self, artifact: &ContractArtifact) -> Result<(Address, TxReceipt)> {
        let span = self
            .log
            .clone()
            .with_contract(artifact.name())
            .span("deploy");

        async {
            let tx_hash = self.rpc.deploy(artifact, &self.tx).await?;
            let receipt = await_mined(&self.rpc, tx_hash, &self.wait)
                .await?
                .into_receipt(&format!("deploy {}", artifact.name()))?;
            let address = receipt.contract_address()?;
            info!("Contract address = {}", to_hex_prefixed(address.as_bytes()));
            Ok::<_, Error>((address, receipt))
        }
        .instrument(span)
        .await
    }

    async fn transact(&self, contract: Address, call: ContractCall) -> Result<TxReceipt> {
        let span = self
            .log
            .clone()
            .with_contract(&to_hex_prefixed(contract.as_bytes()))
            .span(call.method());

        async {
            let receipt = submit_and_await(&self.rpc, contract, &call, &self.tx, &self.wait)
                .await?
                .into_receipt(call.method())?;
            info!(
                tx_hash = %receipt.transaction_hash,
                gas_used = ?receipt.gas_used_u64(),
                "{} mined",
                call.method()
            );
            Ok::<_, Error>(receipt)
        }
        .instrument(span)
        .await
    }

    /// Point the verifier at the header store it marks blocks verified in
    pub async fn link_verifier(&self, verifier: Address, store: Address) -> Result<TxReceipt> {
        self.transact(verifier, contracts::set_header_contract_addr(store)?)
            .await
    }

    /// Submit one header to the store
    pub async fn store_block_header(
        &self,
        store: Address,
        header: &BlockHeader,
    ) -> Result<TxReceipt> {
        info!(block_number = header.block_number, "Storing block");
        self.transact(store, contracts::store_block_header(header)?)
            .await
    }

    /// Ask the store to compute a stored header's hash
    pub async fn get_header_hash(&self, store: Address, block_number: u64) -> Result<TxReceipt> {
        self.transact(store, contracts::get_header_hash(block_number)?)
            .await
    }

    /// Upload the verification key's IC points, one transaction per point.
    ///
    /// All transactions are submitted before waiting on any of them.
    pub async fn update_verification_params(
        &self,
        verifier: Address,
        vk: &VerificationKey,
    ) -> Result<Vec<TxReceipt>> {
        let span = self
            .log
            .clone()
            .with_contract(&to_hex_prefixed(verifier.as_bytes()))
            .span("update_verification_params");

        async {
            let mut hashes = Vec::with_capacity(vk.ic.len());
            for (i, point) in vk.ic.iter().enumerate() {
                let sent = async {
                    let call = contracts::update_verification_params(i, point)?;
                    self.rpc.send_call(verifier, &call, &self.tx).await
                };
                match sent.await {
                    Ok(tx_hash) => hashes.push(tx_hash),
                    Err(e) => {
                        self.settle_partial_upload(i, &hashes).await;
                        return Err(e);
                    }
                }
            }

            let outcomes = await_mined_batch(&self.rpc, &hashes, &self.wait).await?;
            outcomes
                .into_iter()
                .enumerate()
                .map(|(i, outcome)| outcome.into_receipt(&format!("IC[{}] update", i)))
                .collect::<Result<Vec<_>>>()
        }
        .instrument(span)
        .await
    }

    /// Report and wait out the IC updates submitted before point `failed_at`
    async fn settle_partial_upload(&self, failed_at: usize, hashes: &[TxHash]) {
        if hashes.is_empty() {
            return;
        }
        warn!(
            failed_at,
            submitted = hashes.len(),
            tx_hashes = ?hashes,
            "IC upload interrupted, waiting for submitted updates"
        );
        match await_mined_batch(&self.rpc, hashes, &self.wait).await {
            Ok(outcomes) => {
                let confirmed = outcomes
                    .iter()
                    .filter(|o| matches!(o, TxOutcome::Confirmed(_)))
                    .count();
                warn!(
                    confirmed,
                    submitted = hashes.len(),
                    "Verifier holds a partial IC upload"
                );
            }
            Err(e) => error!(
                error = %e,
                tx_hashes = ?hashes,
                "Could not confirm submitted IC updates"
            ),
        }
    }

    /// Submit a proof with its public inputs
    pub async fn verify_proof(
        &self,
        verifier: Address,
        proof: &Proof,
        witness: &ProofWitness,
    ) -> Result<TxReceipt> {
        info!(
            last_verified_block = witness.last_verified_block,
            n_headers = witness.n_headers,
            "Submitting proof"
        );
        self.transact(verifier, contracts::verify_tx(proof, &witness.inputs())?)
            .await
    }
}
