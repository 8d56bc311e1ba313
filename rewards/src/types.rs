// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::abi::EventSchema;
use ethers::types::{Address as EthAddress, Log, TxHash, U256};
use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractKind {
    Plain,
    Confidential,
}

impl ContractKind {
    pub fn label(&self) -> &'static str {
        match self {
            ContractKind::Plain => "plain",
            ContractKind::Confidential => "confidential",
        }
    }
}

impl std::fmt::Display for ContractKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A step count as entered by the user. `step_count` is `None` when the input was empty or not
/// a non-negative integer; zero is a valid check-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRequest {
    pub user: EthAddress,
    pub step_count: Option<u64>,
}

impl SubmissionRequest {
    pub fn new(user: EthAddress, step_count: u64) -> Self {
        Self {
            user,
            step_count: Some(step_count),
        }
    }

    pub fn from_input(user: EthAddress, raw: &str) -> Self {
        let trimmed = raw.trim();
        let step_count = if trimmed.is_empty() {
            None
        } else {
            trimmed.parse::<u64>().ok()
        };
        Self { user, step_count }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedSubmission {
    pub request: SubmissionRequest,
    pub kind: ContractKind,
    pub contract: EthAddress,
    pub steps: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub block_number: u64,
    pub gas_used: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionReceipt {
    pub transaction_id: TxHash,
    pub confirmed_block: u64,
    #[serde(serialize_with = "serialize_decimal")]
    pub gas_used: U256,
    pub path: ContractKind,
    pub attempts: u32,
}

/// Contract addresses of the selected network profile. Unset addresses are `None`, a
/// configured zero address is kept as is and treated as unset by the callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedContracts {
    pub network: String,
    pub token: Option<EthAddress>,
    pub plain: Option<EthAddress>,
    pub confidential: Option<EthAddress>,
    pub chain_id: u64,
    pub explorer_base: Option<String>,
}

/// A log as returned by the ledger, with the identifiers a pending log may lack already checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerLog {
    pub block_number: u64,
    pub tx_hash: TxHash,
    pub log_index: u64,
    pub log: Log,
}

impl LedgerLog {
    pub fn key(&self) -> (TxHash, u64) {
        (self.tx_hash, self.log_index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalSubmissionRecord {
    pub transaction_id: TxHash,
    pub log_index: u64,
    pub block_number: u64,
    pub user: EthAddress,
    pub day_index: u64,
    #[serde(serialize_with = "serialize_decimal")]
    pub steps: U256,
    /// Decimal string, wider than a double can hold
    pub reward: String,
    pub source: EventSchema,
}

impl CanonicalSubmissionRecord {
    pub fn display_key(&self) -> (TxHash, EthAddress) {
        (self.transaction_id, self.user)
    }

    pub fn explorer_url(&self, explorer_base: Option<&str>) -> Option<String> {
        explorer_base.map(|base| {
            format!(
                "{}/tx/{:?}",
                base.trim_end_matches('/'),
                self.transaction_id
            )
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub latest_block: u64,
    pub today: u64,
    pub submitted_today: bool,
    pub records: Vec<CanonicalSubmissionRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenSummary {
    pub symbol: String,
    pub decimals: u8,
    /// Balance formatted with `decimals`
    pub balance: String,
}

impl Default for TokenSummary {
    fn default() -> Self {
        Self {
            symbol: "MOVE".to_string(),
            decimals: 18,
            balance: "0".to_string(),
        }
    }
}

pub(crate) fn serialize_decimal<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}
