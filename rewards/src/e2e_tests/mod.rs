// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Submission and reconciliation run together against an in-memory chain that executes
//! `submitDaily`/`submitDailyEncrypted` calldata and emits the matching events.

use crate::abi::{self, EventSchema};
use crate::classifier::{RpcFailure, EXECUTION_REVERTED_CODE, INTERNAL_ERROR_CODE};
use crate::config::{ReconcilerConfig, SubmissionConfig};
use crate::encoder::decode_handle;
use crate::error::{ErrorKind, RelayResult, SubmitError};
use crate::eth_client::LedgerReader;
use crate::lifecycle::EncoderLifecycle;
use crate::metrics::RelayMetrics;
use crate::orchestrator::SubmissionOrchestrator;
use crate::reconciler::EventReconciler;
use crate::signer::TransactionSubmitter;
use crate::test_utils::{confidential_plain_log, resolved_contracts};
use crate::types::{Confirmation, ContractKind, LedgerLog, SubmissionRequest};
use async_trait::async_trait;
use ethers::abi::{ParamType, Token};
use ethers::types::{Address as EthAddress, Bytes, Log, TxHash, H256, U256, U64};
use ethers::utils::{hex, id};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

const TODAY: u64 = 20_345;

fn plain() -> EthAddress {
    EthAddress::repeat_byte(0x11)
}

fn confidential() -> EthAddress {
    EthAddress::repeat_byte(0x22)
}

fn user() -> EthAddress {
    EthAddress::repeat_byte(0xaa)
}

fn reward_for(steps: u64) -> U256 {
    U256::from(steps) * U256::exp10(15)
}

fn revert(reason: &str) -> RpcFailure {
    let mut data = id("Error(string)").to_vec();
    data.extend(ethers::abi::encode(&[Token::String(reason.to_string())]));
    RpcFailure::new("execution reverted")
        .with_code(EXECUTION_REVERTED_CODE)
        .with_data(json!(format!("0x{}", hex::encode(data))))
}

#[derive(Debug, Default)]
struct ChainState {
    block: u64,
    logs: Vec<LedgerLog>,
    last_submit_day: HashMap<(EthAddress, EthAddress), u64>,
    receipts: HashMap<TxHash, Confirmation>,
    breaker_trips: usize,
    sends: usize,
}

/// Single-account chain. Every accepted transaction is mined in its own block.
#[derive(Debug)]
struct SimulatedChain {
    sender: EthAddress,
    today: u64,
    deployed: HashSet<EthAddress>,
    state: Mutex<ChainState>,
}

impl SimulatedChain {
    fn new(deployed: &[EthAddress]) -> Self {
        Self {
            sender: user(),
            today: TODAY,
            deployed: deployed.iter().copied().collect(),
            state: Mutex::new(ChainState {
                block: 30_000,
                ..Default::default()
            }),
        }
    }

    fn tripping_breaker(self, times: usize) -> Self {
        self.state.lock().unwrap().breaker_trips = times;
        self
    }

    fn with_log(self, log: LedgerLog) -> Self {
        self.state.lock().unwrap().logs.push(log);
        self
    }

    fn sends(&self) -> usize {
        self.state.lock().unwrap().sends
    }

    fn execute(
        &self,
        state: &mut ChainState,
        to: EthAddress,
        data: &[u8],
    ) -> Result<(H256, Vec<u8>), RpcFailure> {
        if !self.deployed.contains(&to) {
            return Err(RpcFailure::new("execution reverted"));
        }
        if data.len() < 4 {
            return Err(revert("unknown selector"));
        }
        let (selector, args) = data.split_at(4);
        let emitted = if selector == id(abi::SUBMIT_DAILY) {
            let tokens = ethers::abi::decode(&[ParamType::Uint(256)], args)
                .map_err(|e| revert(&e.to_string()))?;
            let steps = tokens[0].clone().into_uint().unwrap_or_default();
            let encoded = ethers::abi::encode(&[
                Token::Uint(U256::from(self.today)),
                Token::Uint(steps),
                Token::Uint(reward_for(steps.low_u64())),
            ]);
            (EventSchema::Plain.topic(), encoded)
        } else if selector == id(abi::SUBMIT_DAILY_ENCRYPTED) {
            let tokens = ethers::abi::decode(&[ParamType::FixedBytes(32), ParamType::Bytes], args)
                .map_err(|e| revert(&e.to_string()))?;
            let handle = tokens[0].clone().into_fixed_bytes().unwrap_or_default();
            let proof = tokens[1].clone().into_bytes().unwrap_or_default();
            let encoded = ethers::abi::encode(&[
                Token::Uint(U256::from(self.today)),
                Token::FixedBytes(handle),
                Token::Bytes(proof),
                Token::Uint(U256::exp10(17)),
            ]);
            (EventSchema::ConfidentialHandle.topic(), encoded)
        } else {
            return Err(revert("unknown selector"));
        };
        if state.last_submit_day.get(&(to, self.sender)) == Some(&self.today) {
            return Err(revert("already submitted today"));
        }
        state.last_submit_day.insert((to, self.sender), self.today);
        Ok(emitted)
    }
}

#[async_trait]
impl TransactionSubmitter for SimulatedChain {
    fn address(&self) -> EthAddress {
        self.sender
    }

    async fn send(
        &self,
        to: EthAddress,
        data: Bytes,
        _gas_limit: Option<U256>,
    ) -> Result<TxHash, RpcFailure> {
        let mut state = self.state.lock().unwrap();
        state.sends += 1;
        if state.breaker_trips > 0 {
            state.breaker_trips -= 1;
            return Err(RpcFailure::new("Internal JSON-RPC error.")
                .with_code(INTERNAL_ERROR_CODE)
                .with_data(json!({"cause": {"isBrokenCircuitError": true}})));
        }
        let (topic, event_data) = self.execute(&mut state, to, &data)?;
        state.block += 1;
        let block_number = state.block;
        let tx_hash = TxHash::from_low_u64_be(block_number);
        state.logs.push(LedgerLog {
            block_number,
            tx_hash,
            log_index: 0,
            log: Log {
                address: to,
                topics: vec![topic, H256::from(self.sender)],
                data: Bytes::from(event_data),
                block_number: Some(U64::from(block_number)),
                transaction_hash: Some(tx_hash),
                log_index: Some(U256::zero()),
                ..Default::default()
            },
        });
        state.receipts.insert(
            tx_hash,
            Confirmation {
                block_number,
                gas_used: U256::from(52_000u64),
            },
        );
        Ok(tx_hash)
    }

    async fn wait_for_confirmation(&self, tx_hash: TxHash) -> Result<Confirmation, RpcFailure> {
        self.state
            .lock()
            .unwrap()
            .receipts
            .get(&tx_hash)
            .copied()
            .ok_or_else(|| RpcFailure::new("transaction dropped from mempool"))
    }
}

#[async_trait]
impl LedgerReader for SimulatedChain {
    async fn latest_block(&self) -> RelayResult<u64> {
        Ok(self.state.lock().unwrap().block)
    }

    async fn has_code(&self, address: EthAddress) -> RelayResult<bool> {
        Ok(self.deployed.contains(&address))
    }

    async fn logs(
        &self,
        address: EthAddress,
        topic: H256,
        from_block: u64,
        to_block: u64,
    ) -> RelayResult<Vec<LedgerLog>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .logs
            .iter()
            .filter(|l| l.log.address == address && l.log.topics.first() == Some(&topic))
            .filter(|l| (from_block..=to_block).contains(&l.block_number))
            .cloned()
            .collect())
    }

    async fn last_submit_day(&self, contract: EthAddress, account: EthAddress) -> RelayResult<u64> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .last_submit_day
            .get(&(contract, account))
            .copied()
            .unwrap_or_default())
    }
}

struct Harness {
    chain: Arc<SimulatedChain>,
    orchestrator: SubmissionOrchestrator<SimulatedChain>,
    reconciler: EventReconciler<SimulatedChain>,
    plain: Option<EthAddress>,
    confidential: Option<EthAddress>,
}

impl Harness {
    fn new(chain: SimulatedChain, plain: Option<EthAddress>, confidential: Option<EthAddress>) -> Self {
        crate::init_for_testing();
        let chain = Arc::new(chain);
        let metrics = Arc::new(RelayMetrics::new_for_testing());
        let orchestrator = SubmissionOrchestrator::new(
            chain.clone(),
            resolved_contracts(plain, confidential),
            Arc::new(EncoderLifecycle::simulated()),
            SubmissionConfig::default(),
            metrics.clone(),
        );
        let reconciler = EventReconciler::new(chain.clone(), ReconcilerConfig::default(), metrics);
        Self {
            chain,
            orchestrator,
            reconciler,
            plain,
            confidential,
        }
    }

    async fn report(&self) -> crate::types::ReconciliationReport {
        self.reconciler
            .fetch_for_day(user(), self.plain, self.confidential, TODAY)
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn test_plain_submission_of_zero_steps() {
    let harness = Harness::new(SimulatedChain::new(&[plain()]), Some(plain()), None);
    assert!(!harness.report().await.submitted_today);

    let receipt = harness
        .orchestrator
        .submit(SubmissionRequest::from_input(user(), "0"))
        .await
        .unwrap();
    assert_eq!(receipt.path, ContractKind::Plain);
    assert_eq!(receipt.attempts, 1);

    let report = harness.report().await;
    assert!(report.submitted_today);
    assert_eq!(report.records.len(), 1);
    let record = &report.records[0];
    assert_eq!(record.transaction_id, receipt.transaction_id);
    assert_eq!(record.block_number, receipt.confirmed_block);
    assert_eq!(record.steps, U256::zero());
    assert_eq!(record.day_index, TODAY);
    assert_eq!(record.source, EventSchema::Plain);
}

#[tokio::test]
async fn test_no_usable_contract_sends_nothing() {
    let harness = Harness::new(
        SimulatedChain::new(&[]),
        None,
        Some(EthAddress::zero()),
    );
    let err = harness
        .orchestrator
        .submit(SubmissionRequest::new(user(), 5000))
        .await
        .unwrap_err();
    assert_eq!(err, SubmitError::NoContractConfigured);
    assert_eq!(harness.chain.sends(), 0);
    assert!(harness.report().await.records.is_empty());
}

#[tokio::test]
async fn test_history_from_plain_value_confidential_schema() {
    let chain = SimulatedChain::new(&[confidential()]).with_log(confidential_plain_log(
        confidential(),
        TxHash::repeat_byte(0x42),
        1,
        29_000,
        user(),
        TODAY - 2,
        8_765,
        87,
    ));
    let harness = Harness::new(chain, None, Some(confidential()));
    let report = harness.report().await;
    assert!(!report.submitted_today);
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].steps, U256::from(8_765u64));
    assert_eq!(report.records[0].reward, "87");
    assert_eq!(report.records[0].source, EventSchema::ConfidentialPlain);
}

#[tokio::test]
async fn test_confidential_round_trip() {
    let harness = Harness::new(
        SimulatedChain::new(&[plain(), confidential()]),
        Some(plain()),
        Some(confidential()),
    );
    let receipt = harness
        .orchestrator
        .submit(SubmissionRequest::new(user(), 12_345))
        .await
        .unwrap();
    assert_eq!(receipt.path, ContractKind::Confidential);

    let report = harness.report().await;
    assert!(report.submitted_today);
    assert_eq!(report.records.len(), 1);
    let record = &report.records[0];
    assert_eq!(record.source, EventSchema::ConfidentialHandle);
    assert_eq!(record.steps, U256::from(12_345u64));
    assert_eq!(record.reward, U256::exp10(17).to_string());

    let handle = H256::from_slice(&harness.chain.state.lock().unwrap().logs[0].log.data[32..64]);
    assert_eq!(decode_handle(&handle), 12_345);
}

#[tokio::test(start_paused = true)]
async fn test_breaker_trip_then_confirmed_submission() {
    let harness = Harness::new(
        SimulatedChain::new(&[confidential()]).tripping_breaker(1),
        None,
        Some(confidential()),
    );
    let receipt = harness
        .orchestrator
        .submit(SubmissionRequest::new(user(), 7_000))
        .await
        .unwrap();
    assert_eq!(receipt.attempts, 2);
    assert_eq!(harness.chain.sends(), 2);
    assert_eq!(harness.report().await.records.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_second_submission_same_day_is_reverted() {
    let harness = Harness::new(SimulatedChain::new(&[plain()]), Some(plain()), None);
    harness
        .orchestrator
        .submit(SubmissionRequest::new(user(), 4_000))
        .await
        .unwrap();
    tokio::time::advance(std::time::Duration::from_secs(5)).await;

    let err = harness
        .orchestrator
        .submit(SubmissionRequest::new(user(), 4_500))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadySubmittedToday);
    assert_eq!(harness.report().await.records.len(), 1);
}
