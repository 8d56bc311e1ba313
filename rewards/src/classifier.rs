// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Failure classification for transaction submission.
//!
//! Every signer/provider failure is turned into an [`RpcFailure`] at the edge and then mapped to
//! one [`ErrorKind`] here. Structured fields (JSON-RPC code, wallet error data) are inspected
//! first; substring matching is only a fallback for errors that carry nothing but a message.

use crate::error::ErrorKind;
use ethers::abi::ParamType;
use ethers::providers::{JsonRpcError, MiddlewareError, ProviderError, RpcError};
use ethers::utils::hex;
use serde_json::Value;

/// EIP-1193 "user rejected request"
pub const USER_REJECTED_CODE: i64 = 4001;
/// Geth style "execution reverted" with revert data
pub const EXECUTION_REVERTED_CODE: i64 = 3;
/// Generic server error, used by nodes for insufficient funds / nonce problems
pub const SERVER_ERROR_CODE: i64 = -32000;
/// Internal JSON-RPC error, wallets surface circuit breaker trips with it
pub const INTERNAL_ERROR_CODE: i64 = -32603;

/// Selector of `Error(string)`
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

const ALREADY_SUBMITTED_TODAY: &str = "already submitted today";

/// The observable parts of a failed send or confirmation wait.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RpcFailure {
    pub code: Option<i64>,
    pub message: String,
    pub data: Option<Value>,
    /// The request never got a JSON-RPC answer (connection, dns, timeout)
    pub transport: bool,
}

impl RpcFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transport: true,
            ..Default::default()
        }
    }

    pub fn from_json_rpc(err: &JsonRpcError) -> Self {
        Self {
            code: Some(err.code),
            message: err.message.clone(),
            data: err.data.clone(),
            transport: false,
        }
    }

    /// Extract the structured parts of any ethers middleware error.
    pub fn from_middleware_error<E: MiddlewareError>(err: &E) -> Self {
        if let Some(response) = MiddlewareError::as_error_response(err) {
            return Self::from_json_rpc(response);
        }
        if let Some(provider_err) = err.as_provider_error() {
            return Self::from_provider_error(provider_err);
        }
        Self::new(err.to_string())
    }

    pub fn from_provider_error(err: &ProviderError) -> Self {
        if let Some(response) = RpcError::as_error_response(err) {
            return Self::from_json_rpc(response);
        }
        Self {
            code: None,
            message: err.to_string(),
            data: None,
            transport: matches!(err, ProviderError::HTTPError(_)),
        }
    }
}

impl std::fmt::Display for RpcFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "(code {code}) {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: ErrorKind,
    /// Revert reason for reverts, the raw failure text otherwise
    pub detail: String,
}

pub fn classify(failure: &RpcFailure) -> Classification {
    let kind = classify_structured(failure).unwrap_or_else(|| classify_message(&failure.message));
    let detail = match kind {
        ErrorKind::ContractExecutionReverted => {
            revert_reason(failure).unwrap_or_else(|| failure.message.clone())
        }
        _ => failure.to_string(),
    };
    Classification { kind, detail }
}

fn classify_structured(failure: &RpcFailure) -> Option<ErrorKind> {
    if is_broken_circuit(failure.data.as_ref()) {
        return Some(ErrorKind::TrafficProtectionRejected);
    }
    if failure.transport {
        return Some(ErrorKind::NetworkUnavailable);
    }
    match failure.code? {
        USER_REJECTED_CODE => Some(ErrorKind::UserRejectedSignature),
        EXECUTION_REVERTED_CODE => {
            let reason = revert_reason(failure).unwrap_or_default();
            if reason.to_lowercase().contains(ALREADY_SUBMITTED_TODAY) {
                Some(ErrorKind::AlreadySubmittedToday)
            } else {
                Some(ErrorKind::ContractExecutionReverted)
            }
        }
        // SERVER_ERROR_CODE and INTERNAL_ERROR_CODE are shared by unrelated failures,
        // the message decides
        _ => None,
    }
}

fn is_broken_circuit(data: Option<&Value>) -> bool {
    let Some(data) = data else {
        return false;
    };
    [
        data.pointer("/cause/isBrokenCircuitError"),
        data.pointer("/isBrokenCircuitError"),
    ]
    .into_iter()
    .flatten()
    .any(|flag| flag.as_bool() == Some(true))
}

fn classify_message(message: &str) -> ErrorKind {
    let msg = message.to_lowercase();
    if msg.contains("circuit breaker") || msg.contains("execution prevented") {
        ErrorKind::TrafficProtectionRejected
    } else if msg.contains(ALREADY_SUBMITTED_TODAY) {
        ErrorKind::AlreadySubmittedToday
    } else if msg.contains("user rejected") || msg.contains("user denied") {
        ErrorKind::UserRejectedSignature
    } else if msg.contains("insufficient funds") {
        ErrorKind::InsufficientFunds
    } else if msg.contains("execution reverted") {
        ErrorKind::ContractExecutionReverted
    } else if msg.contains("network")
        || msg.contains("connection refused")
        || msg.contains("connection reset")
        || msg.contains("timed out")
        || msg.contains("timeout")
        || msg.contains("dns error")
    {
        ErrorKind::NetworkUnavailable
    } else {
        ErrorKind::UnknownRpcError
    }
}

/// Revert reason from `Error(string)` revert data, or from an "execution reverted: <reason>"
/// message.
pub fn revert_reason(failure: &RpcFailure) -> Option<String> {
    if let Some(reason) = failure
        .data
        .as_ref()
        .and_then(Value::as_str)
        .and_then(decode_error_string)
    {
        return Some(reason);
    }
    let lower = failure.message.to_ascii_lowercase();
    let marker = "execution reverted:";
    lower
        .find(marker)
        .map(|idx| failure.message[idx + marker.len()..].trim().to_string())
        .filter(|reason| !reason.is_empty())
}

fn decode_error_string(data: &str) -> Option<String> {
    let bytes = hex::decode(data.trim_start_matches("0x")).ok()?;
    if bytes.len() < 4 || bytes[..4] != ERROR_STRING_SELECTOR {
        return None;
    }
    let tokens = ethers::abi::decode(&[ParamType::String], &bytes[4..]).ok()?;
    tokens.into_iter().next()?.into_string()
}
