// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use ethers::providers::ProviderError;
use serde::Serialize;
use thiserror::Error;

/// Errors raised by the ledger-facing clients (provider, calls, config resolution).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    // Transport level failure talking to the RPC node
    TransientProviderError(String),
    // Provider returned an error or inconsistent data
    ProviderError(String),
    // Return data of a contract call could not be decoded
    AbiDecodeError(String),
    // Connected to a chain other than the selected network profile
    ChainIdMismatch { expected: u64, actual: u64 },
    // Invalid or incomplete configuration
    InvalidConfig(String),
    // Uncategorized error
    Generic(String),
}

impl RelayError {
    /// Returns a short string identifying the error type for metrics labels
    pub fn error_type(&self) -> &'static str {
        match self {
            RelayError::TransientProviderError(_) => "transient_provider_error",
            RelayError::ProviderError(_) => "provider_error",
            RelayError::AbiDecodeError(_) => "abi_decode_error",
            RelayError::ChainIdMismatch { .. } => "chain_id_mismatch",
            RelayError::InvalidConfig(_) => "invalid_config",
            RelayError::Generic(_) => "generic",
        }
    }
}

impl std::fmt::Display for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayError::TransientProviderError(msg) => write!(f, "transient provider error: {msg}"),
            RelayError::ProviderError(msg) => write!(f, "provider error: {msg}"),
            RelayError::AbiDecodeError(msg) => write!(f, "abi decode error: {msg}"),
            RelayError::ChainIdMismatch { expected, actual } => write!(
                f,
                "chain id mismatch: expected {expected}, connected to {actual}"
            ),
            RelayError::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            RelayError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for RelayError {}

impl From<ProviderError> for RelayError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::HTTPError(err) => RelayError::TransientProviderError(err.to_string()),
            other => RelayError::ProviderError(other.to_string()),
        }
    }
}

pub type RelayResult<T> = Result<T, RelayError>;

/// Every way a submission can end without a confirmed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    TrafficProtectionRejected,
    AlreadySubmittedToday,
    UserRejectedSignature,
    InsufficientFunds,
    NetworkUnavailable,
    UnknownRpcError,
    ContractExecutionReverted,
    NoContractConfigured,
    RateLimited,
    AlreadyInProgress,
    EmptyInput,
}

impl ErrorKind {
    pub fn error_type(&self) -> &'static str {
        match self {
            ErrorKind::TrafficProtectionRejected => "traffic_protection_rejected",
            ErrorKind::AlreadySubmittedToday => "already_submitted_today",
            ErrorKind::UserRejectedSignature => "user_rejected_signature",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::NetworkUnavailable => "network_unavailable",
            ErrorKind::UnknownRpcError => "unknown_rpc_error",
            ErrorKind::ContractExecutionReverted => "contract_execution_reverted",
            ErrorKind::NoContractConfigured => "no_contract_configured",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::AlreadyInProgress => "already_in_progress",
            ErrorKind::EmptyInput => "empty_input",
        }
    }

    /// Local precondition failures never reach the network.
    pub fn is_local_precondition(&self) -> bool {
        matches!(
            self,
            ErrorKind::NoContractConfigured
                | ErrorKind::RateLimited
                | ErrorKind::AlreadyInProgress
                | ErrorKind::EmptyInput
        )
    }

    /// User facing text for a network failure. `detail` is only surfaced for reverts.
    pub fn user_message(&self, detail: &str) -> String {
        match self {
            ErrorKind::TrafficProtectionRejected => "the wallet's traffic protection (circuit breaker) blocked the transaction; \
                 reload the page or reconnect the wallet, then try again in a few minutes"
                .to_string(),
            ErrorKind::AlreadySubmittedToday => "you already submitted today".to_string(),
            ErrorKind::UserRejectedSignature => "you canceled the transaction".to_string(),
            ErrorKind::InsufficientFunds => "insufficient balance for gas".to_string(),
            ErrorKind::NetworkUnavailable => {
                "network unavailable, check the connection or RPC node and retry later".to_string()
            }
            ErrorKind::UnknownRpcError => {
                "unknown network error, possibly an RPC node problem, retry later".to_string()
            }
            ErrorKind::ContractExecutionReverted => detail.to_string(),
            ErrorKind::NoContractConfigured => "no contract configured".to_string(),
            ErrorKind::RateLimited => "submitting too frequently".to_string(),
            ErrorKind::AlreadyInProgress => "submission already in progress".to_string(),
            ErrorKind::EmptyInput => "enter a valid step count".to_string(),
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.error_type())
    }
}

/// A network failure after classification, together with the attempt it ended on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedFailure {
    pub kind: ErrorKind,
    pub detail: String,
    pub attempts: u32,
}

impl std::fmt::Display for ClassifiedFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.kind.user_message(&self.detail))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("enter a valid step count")]
    EmptyInput,
    #[error("submission already in progress")]
    AlreadyInProgress,
    #[error("please wait {remaining_secs} more second(s) before submitting again")]
    RateLimited { remaining_secs: u64 },
    #[error("no contract configured")]
    NoContractConfigured,
    #[error("{0}")]
    Failed(ClassifiedFailure),
}

impl SubmitError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SubmitError::EmptyInput => ErrorKind::EmptyInput,
            SubmitError::AlreadyInProgress => ErrorKind::AlreadyInProgress,
            SubmitError::RateLimited { .. } => ErrorKind::RateLimited,
            SubmitError::NoContractConfigured => ErrorKind::NoContractConfigured,
            SubmitError::Failed(failure) => failure.kind,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("results temporarily unavailable: {0}")]
    Unavailable(#[from] RelayError),
}
