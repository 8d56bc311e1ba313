// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use crate::abi;
use crate::error::{RelayError, RelayResult};
use crate::metered_eth_provider::{new_metered_eth_provider, MeteredEthHttpProvider};
use crate::metrics::RelayMetrics;
use crate::types::{LedgerLog, TokenSummary};
use crate::utils::is_configured;
use async_trait::async_trait;
use ethers::providers::{JsonRpcClient, Middleware, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address as EthAddress, Bytes, Filter, TransactionRequest, H256};
use tap::TapFallible;

#[cfg(test)]
use crate::eth_mock_provider::EthMockProvider;

/// Read side of the ledger used by the reconciler.
#[async_trait]
pub trait LedgerReader: Send + Sync {
    async fn latest_block(&self) -> RelayResult<u64>;

    /// Whether a contract is deployed at `address`.
    async fn has_code(&self, address: EthAddress) -> RelayResult<bool>;

    /// Logs emitted by `address` with `topic` as topic0, in the inclusive block range.
    async fn logs(
        &self,
        address: EthAddress,
        topic: H256,
        from_block: u64,
        to_block: u64,
    ) -> RelayResult<Vec<LedgerLog>>;

    async fn last_submit_day(&self, contract: EthAddress, account: EthAddress)
        -> RelayResult<u64>;
}

pub struct EthClient<P> {
    provider: Provider<P>,
    expected_chain_id: Option<u64>,
}

impl EthClient<MeteredEthHttpProvider> {
    pub async fn new(
        provider_url: &str,
        metrics: Arc<RelayMetrics>,
        expected_chain_id: Option<u64>,
    ) -> anyhow::Result<Self> {
        let provider = new_metered_eth_provider(provider_url, metrics)?;
        let self_ = Self {
            provider,
            expected_chain_id,
        };
        self_.describe().await?;
        Ok(self_)
    }
}

#[cfg(test)]
impl EthClient<EthMockProvider> {
    pub fn new_mocked(provider: EthMockProvider, expected_chain_id: Option<u64>) -> Self {
        Self {
            provider: Provider::new(provider),
            expected_chain_id,
        }
    }
}

pub(crate) fn call_request(to: EthAddress, data: Bytes) -> TypedTransaction {
    TransactionRequest::new().to(to).data(data).into()
}

pub(crate) fn submission_filter(
    address: EthAddress,
    topic: H256,
    from_block: u64,
    to_block: u64,
) -> Filter {
    Filter::new()
        .address(address)
        .topic0(topic)
        .from_block(from_block)
        .to_block(to_block)
}

impl<P> EthClient<P>
where
    P: JsonRpcClient + 'static,
{
    pub async fn get_chain_id(&self) -> RelayResult<u64> {
        let chain_id = self.provider.get_chainid().await?;
        u64::try_from(chain_id).map_err(|_| {
            RelayError::ProviderError(format!("Provider returns out of range chain id {chain_id}"))
        })
    }

    // Validate chain identifier and log connection info
    pub(crate) async fn describe(&self) -> RelayResult<()> {
        let chain_id = self.get_chain_id().await?;
        let block_number = self.latest_block().await?;
        match self.expected_chain_id {
            Some(expected) if expected != chain_id => {
                return Err(RelayError::ChainIdMismatch {
                    expected,
                    actual: chain_id,
                });
            }
            Some(_) => tracing::info!(
                "[EthClient] Connected to chain {} (verified), current block: {}",
                chain_id,
                block_number
            ),
            None => tracing::warn!(
                "[EthClient] Connected to chain {} (NOT VERIFIED - no expected chain ID set), current block: {}",
                chain_id,
                block_number
            ),
        }
        Ok(())
    }

    async fn call(&self, to: EthAddress, data: Bytes) -> RelayResult<Bytes> {
        let tx = call_request(to, data);
        self.provider
            .call(&tx, None)
            .await
            .map_err(RelayError::from)
            .tap_err(|e| tracing::warn!("[EthClient] eth_call to {:?} failed: {:?}", to, e))
    }

    /// Symbol, decimals and formatted balance of the reward token. Falls back to
    /// `("MOVE", 18, "0")` when the token is missing or any read fails.
    pub async fn token_summary(
        &self,
        token: Option<EthAddress>,
        account: EthAddress,
    ) -> TokenSummary {
        let Some(token) = token.filter(|t| is_configured(Some(*t))) else {
            return TokenSummary::default();
        };
        match self.read_token_summary(token, account).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(
                    "[EthClient] Token summary for {:?} unavailable, using defaults: {}",
                    token,
                    e
                );
                TokenSummary::default()
            }
        }
    }

    async fn read_token_summary(
        &self,
        token: EthAddress,
        account: EthAddress,
    ) -> RelayResult<TokenSummary> {
        if !self.has_code(token).await? {
            return Err(RelayError::Generic(format!("no contract at {:?}", token)));
        }
        let symbol = abi::decode_string_output(&self.call(token, abi::encode_erc20_symbol()).await?)?;
        let decimals =
            abi::decode_uint_output(&self.call(token, abi::encode_erc20_decimals()).await?)?;
        let decimals = u8::try_from(decimals)
            .map_err(|_| RelayError::AbiDecodeError(format!("decimals out of range: {decimals}")))?;
        let balance = abi::decode_uint_output(
            &self
                .call(token, abi::encode_erc20_balance_of(account))
                .await?,
        )?;
        let balance = ethers::utils::format_units(balance, decimals as u32)
            .map_err(|e| RelayError::Generic(e.to_string()))?;
        Ok(TokenSummary {
            symbol,
            decimals,
            balance,
        })
    }
}

#[async_trait]
impl<P> LedgerReader for EthClient<P>
where
    P: JsonRpcClient + 'static,
{
    async fn latest_block(&self) -> RelayResult<u64> {
        self.provider
            .get_block_number()
            .await
            .map(|n| n.as_u64())
            .map_err(RelayError::from)
    }

    async fn has_code(&self, address: EthAddress) -> RelayResult<bool> {
        let code = self
            .provider
            .get_code(address, None)
            .await
            .map_err(RelayError::from)?;
        Ok(!code.is_empty())
    }

    // Note: query may fail if range is too big. The reconciler windows are bounded.
    async fn logs(
        &self,
        address: EthAddress,
        topic: H256,
        from_block: u64,
        to_block: u64,
    ) -> RelayResult<Vec<LedgerLog>> {
        let filter = submission_filter(address, topic, from_block, to_block);
        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(RelayError::from)
            .tap_err(|e| {
                tracing::error!(
                    "[EthClient] get_logs failed. Filter: {:?}. Error {:?}",
                    filter,
                    e
                )
            })?;

        // Safeguard check that all events are emitted from requested contract address
        if logs.iter().any(|log| log.address != address) {
            return Err(RelayError::ProviderError(format!(
                "Provider returns logs from different contract address (expected: {:?}): {:?}",
                address, logs
            )));
        }

        logs.into_iter()
            .map(|log| {
                let block_number = log.block_number.ok_or_else(|| {
                    RelayError::ProviderError("Provider returns log without block_number".into())
                })?;
                let tx_hash = log.transaction_hash.ok_or_else(|| {
                    RelayError::ProviderError(
                        "Provider returns log without transaction_hash".into(),
                    )
                })?;
                let log_index = log.log_index.ok_or_else(|| {
                    RelayError::ProviderError("Provider returns log without log_index".into())
                })?;
                let log_index = u64::try_from(log_index).map_err(|_| {
                    RelayError::ProviderError(format!(
                        "Provider returns out of range log_index {log_index}"
                    ))
                })?;
                Ok(LedgerLog {
                    block_number: block_number.as_u64(),
                    tx_hash,
                    log_index,
                    log,
                })
            })
            .collect()
    }

    async fn last_submit_day(
        &self,
        contract: EthAddress,
        account: EthAddress,
    ) -> RelayResult<u64> {
        let output = self
            .call(contract, abi::encode_last_submit_day(account))
            .await?;
        let day = abi::decode_uint_output(&output)?;
        u64::try_from(day)
            .map_err(|_| RelayError::AbiDecodeError(format!("day index out of range: {day}")))
    }
}
