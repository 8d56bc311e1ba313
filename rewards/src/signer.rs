// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::classifier::{RpcFailure, EXECUTION_REVERTED_CODE};
use crate::metered_eth_provider::{new_metered_eth_provider, MeteredEthHttpProvider};
use crate::metrics::RelayMetrics;
use crate::types::Confirmation;
use async_trait::async_trait;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{JsonRpcClient, Middleware, PendingTransaction, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{
    Address as EthAddress, Bytes, TransactionReceipt, TransactionRequest, TxHash, U256,
};
use std::str::FromStr;
use std::sync::Arc;

/// The account that signs and broadcasts submissions.
#[async_trait]
pub trait TransactionSubmitter: Send + Sync {
    fn address(&self) -> EthAddress;

    /// Sign and broadcast a call to `to`. Returns once the node accepted the transaction.
    async fn send(
        &self,
        to: EthAddress,
        data: Bytes,
        gas_limit: Option<U256>,
    ) -> Result<TxHash, RpcFailure>;

    /// Wait until the transaction is mined. A mined but failed transaction is a revert.
    async fn wait_for_confirmation(&self, tx_hash: TxHash) -> Result<Confirmation, RpcFailure>;
}

pub struct EthSigner<P> {
    client: SignerMiddleware<Provider<P>, LocalWallet>,
    confirmations: usize,
}

impl EthSigner<MeteredEthHttpProvider> {
    pub fn new(
        provider_url: &str,
        metrics: Arc<RelayMetrics>,
        private_key_hex: &str,
        chain_id: u64,
        confirmations: usize,
    ) -> anyhow::Result<Self> {
        let provider = new_metered_eth_provider(provider_url, metrics)?;
        let wallet = LocalWallet::from_str(private_key_hex.trim_start_matches("0x"))
            .map_err(|e| anyhow::anyhow!("Invalid signer key: {e}"))?
            .with_chain_id(chain_id);
        Ok(Self::with_provider(provider, wallet, confirmations))
    }
}

impl<P> EthSigner<P>
where
    P: JsonRpcClient + 'static,
{
    pub fn with_provider(provider: Provider<P>, wallet: LocalWallet, confirmations: usize) -> Self {
        Self {
            client: SignerMiddleware::new(provider, wallet),
            confirmations: confirmations.max(1),
        }
    }
}

#[async_trait]
impl<P> TransactionSubmitter for EthSigner<P>
where
    P: JsonRpcClient + 'static,
{
    fn address(&self) -> EthAddress {
        self.client.address()
    }

    async fn send(
        &self,
        to: EthAddress,
        data: Bytes,
        gas_limit: Option<U256>,
    ) -> Result<TxHash, RpcFailure> {
        let mut tx = TransactionRequest::new().to(to).data(data);
        if let Some(gas) = gas_limit {
            tx = tx.gas(gas);
        }
        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(|e| RpcFailure::from_middleware_error(&e))?;
        Ok(pending.tx_hash())
    }

    async fn wait_for_confirmation(&self, tx_hash: TxHash) -> Result<Confirmation, RpcFailure> {
        let receipt = PendingTransaction::new(tx_hash, self.client.inner())
            .confirmations(self.confirmations)
            .await
            .map_err(|e| RpcFailure::from_provider_error(&e))?
            .ok_or_else(|| RpcFailure::new("transaction dropped from mempool"))?;
        confirmation_from_receipt(&receipt)
    }
}

pub(crate) fn confirmation_from_receipt(
    receipt: &TransactionReceipt,
) -> Result<Confirmation, RpcFailure> {
    if receipt.status.map(|s| s.as_u64()) == Some(0) {
        return Err(RpcFailure::new("execution reverted").with_code(EXECUTION_REVERTED_CODE));
    }
    Ok(Confirmation {
        block_number: receipt.block_number.map(|n| n.as_u64()).unwrap_or_default(),
        gas_used: receipt.gas_used.unwrap_or_default(),
    })
}
