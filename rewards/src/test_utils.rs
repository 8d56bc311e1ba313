// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::abi::EventSchema;
use crate::classifier::RpcFailure;
use crate::encoder::SimulatedEncoder;
use crate::error::{RelayError, RelayResult};
use crate::eth_client::LedgerReader;
use crate::signer::TransactionSubmitter;
use crate::types::{Confirmation, LedgerLog, ResolvedContracts};
use async_trait::async_trait;
use ethers::abi::Token;
use ethers::types::{Address as EthAddress, Bytes, Log, TxHash, H256, U256, U64};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

pub fn resolved_contracts(
    plain: Option<EthAddress>,
    confidential: Option<EthAddress>,
) -> ResolvedContracts {
    ResolvedContracts {
        network: "local".to_string(),
        token: None,
        plain,
        confidential,
        chain_id: 31337,
        explorer_base: None,
    }
}

fn ledger_log(
    contract: EthAddress,
    tx_hash: TxHash,
    log_index: u64,
    block_number: u64,
    topics: Vec<H256>,
    data: Vec<u8>,
) -> LedgerLog {
    LedgerLog {
        block_number,
        tx_hash,
        log_index,
        log: Log {
            address: contract,
            topics,
            data: Bytes::from(data),
            block_number: Some(U64::from(block_number)),
            transaction_hash: Some(tx_hash),
            log_index: Some(U256::from(log_index)),
            ..Default::default()
        },
    }
}

#[allow(clippy::too_many_arguments)]
pub fn plain_submitted_log(
    contract: EthAddress,
    tx_hash: TxHash,
    log_index: u64,
    block_number: u64,
    user: EthAddress,
    day_index: u64,
    steps: u64,
    reward: u64,
) -> LedgerLog {
    let data = ethers::abi::encode(&[
        Token::Uint(U256::from(day_index)),
        Token::Uint(U256::from(steps)),
        Token::Uint(U256::from(reward)),
    ]);
    ledger_log(
        contract,
        tx_hash,
        log_index,
        block_number,
        vec![EventSchema::Plain.topic(), H256::from(user)],
        data,
    )
}

#[allow(clippy::too_many_arguments)]
pub fn confidential_handle_log(
    contract: EthAddress,
    tx_hash: TxHash,
    log_index: u64,
    block_number: u64,
    user: EthAddress,
    day_index: u64,
    steps: u64,
    reward: U256,
) -> LedgerLog {
    let payload = SimulatedEncoder::new()
        .build_payload(steps, "65f0a1b2", "0badcafe")
        .unwrap();
    let data = ethers::abi::encode(&[
        Token::Uint(U256::from(day_index)),
        Token::FixedBytes(payload.handle.as_bytes().to_vec()),
        Token::Bytes(payload.proof.to_vec()),
        Token::Uint(reward),
    ]);
    ledger_log(
        contract,
        tx_hash,
        log_index,
        block_number,
        vec![EventSchema::ConfidentialHandle.topic(), H256::from(user)],
        data,
    )
}

#[allow(clippy::too_many_arguments)]
pub fn confidential_plain_log(
    contract: EthAddress,
    tx_hash: TxHash,
    log_index: u64,
    block_number: u64,
    user: EthAddress,
    day_index: u64,
    steps: u64,
    reward: u64,
) -> LedgerLog {
    let data = ethers::abi::encode(&[
        Token::Uint(U256::from(day_index)),
        Token::Uint(U256::from(steps)),
        Token::Uint(U256::from(reward)),
    ]);
    ledger_log(
        contract,
        tx_hash,
        log_index,
        block_number,
        vec![EventSchema::ConfidentialPlain.topic(), H256::from(user)],
        data,
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogQuery {
    pub address: EthAddress,
    pub topic: H256,
    pub from_block: u64,
    pub to_block: u64,
}

/// In-memory ledger that records every log query it serves.
#[derive(Debug, Default)]
pub struct FakeLedger {
    latest_block: u64,
    code: HashSet<EthAddress>,
    logs: Vec<LedgerLog>,
    last_submit_days: HashMap<(EthAddress, EthAddress), u64>,
    // Serve every log of the address regardless of topic0, like a misbehaving node
    ignore_topic_filter: bool,
    fail_status_reads: bool,
    fail_block_number: bool,
    queries: Mutex<Vec<LogQuery>>,
}

impl FakeLedger {
    pub fn new(latest_block: u64) -> Self {
        Self {
            latest_block,
            ..Default::default()
        }
    }

    pub fn with_code(mut self, address: EthAddress) -> Self {
        self.code.insert(address);
        self
    }

    pub fn with_log(mut self, log: LedgerLog) -> Self {
        self.logs.push(log);
        self
    }

    pub fn with_last_submit_day(mut self, contract: EthAddress, account: EthAddress, day: u64) -> Self {
        self.last_submit_days.insert((contract, account), day);
        self
    }

    pub fn ignoring_topic_filter(mut self) -> Self {
        self.ignore_topic_filter = true;
        self
    }

    pub fn failing_status_reads(mut self) -> Self {
        self.fail_status_reads = true;
        self
    }

    pub fn failing_block_number(mut self) -> Self {
        self.fail_block_number = true;
        self
    }

    pub fn queries(&self) -> Vec<LogQuery> {
        self.queries.lock().unwrap().clone()
    }

    pub fn queries_for(&self, address: EthAddress) -> Vec<LogQuery> {
        self.queries()
            .into_iter()
            .filter(|q| q.address == address)
            .collect()
    }
}

#[async_trait]
impl LedgerReader for FakeLedger {
    async fn latest_block(&self) -> RelayResult<u64> {
        if self.fail_block_number {
            return Err(RelayError::TransientProviderError("connection refused".into()));
        }
        Ok(self.latest_block)
    }

    async fn has_code(&self, address: EthAddress) -> RelayResult<bool> {
        Ok(self.code.contains(&address))
    }

    async fn logs(
        &self,
        address: EthAddress,
        topic: H256,
        from_block: u64,
        to_block: u64,
    ) -> RelayResult<Vec<LedgerLog>> {
        self.queries.lock().unwrap().push(LogQuery {
            address,
            topic,
            from_block,
            to_block,
        });
        Ok(self
            .logs
            .iter()
            .filter(|l| l.log.address == address)
            .filter(|l| self.ignore_topic_filter || l.log.topics.first() == Some(&topic))
            .filter(|l| l.block_number >= from_block && l.block_number <= to_block)
            .cloned()
            .collect())
    }

    async fn last_submit_day(&self, contract: EthAddress, account: EthAddress) -> RelayResult<u64> {
        if self.fail_status_reads {
            return Err(RelayError::ProviderError("execution reverted".into()));
        }
        Ok(self
            .last_submit_days
            .get(&(contract, account))
            .copied()
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentTransaction {
    pub to: EthAddress,
    pub data: Bytes,
    pub gas_limit: Option<U256>,
}

/// Scripted submitter. Sends and waits succeed unless a result was queued.
#[derive(Debug, Default)]
pub struct FakeSubmitter {
    address: EthAddress,
    send_results: Mutex<VecDeque<Result<TxHash, RpcFailure>>>,
    wait_results: Mutex<VecDeque<Result<Confirmation, RpcFailure>>>,
    sent: Mutex<Vec<SentTransaction>>,
    counter: AtomicU64,
    gate: Option<Notify>,
    send_started: Notify,
}

impl FakeSubmitter {
    pub fn new(address: EthAddress) -> Self {
        Self {
            address,
            ..Default::default()
        }
    }

    /// Block every send until [`FakeSubmitter::release`] is called.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Notify::new());
        self
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub async fn wait_until_send_started(&self) {
        self.send_started.notified().await
    }

    pub fn push_send_result(&self, result: Result<TxHash, RpcFailure>) {
        self.send_results.lock().unwrap().push_back(result);
    }

    pub fn push_wait_result(&self, result: Result<Confirmation, RpcFailure>) {
        self.wait_results.lock().unwrap().push_back(result);
    }

    pub fn sent(&self) -> Vec<SentTransaction> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransactionSubmitter for FakeSubmitter {
    fn address(&self) -> EthAddress {
        self.address
    }

    async fn send(
        &self,
        to: EthAddress,
        data: Bytes,
        gas_limit: Option<U256>,
    ) -> Result<TxHash, RpcFailure> {
        self.send_started.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.sent.lock().unwrap().push(SentTransaction {
            to,
            data,
            gas_limit,
        });
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.send_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(TxHash::from_low_u64_be(n)))
    }

    async fn wait_for_confirmation(&self, _tx_hash: TxHash) -> Result<Confirmation, RpcFailure> {
        self.wait_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(Confirmation {
                block_number: 100 + self.counter.load(Ordering::SeqCst),
                gas_used: U256::from(61_000u64),
            }))
    }
}
