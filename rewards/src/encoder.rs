// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Confidential value encoding.
//!
//! A confidential backend turns a 64-bit value into an opaque 32-byte handle plus an input proof
//! that the confidential rewards contract accepts. [`SimulatedEncoder`] stands in for a real
//! backend: the handle keeps the value in its leading 8 bytes so it can be read back with
//! [`decode_handle`], the rest is timestamp, nonce and zero fill.

use async_trait::async_trait;
use ethers::types::{Address as EthAddress, Bytes, H256};
use ethers::utils::hex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Hex digits of handle data, without the `0x` prefix.
pub const HANDLE_HEX_LEN: usize = 64;
/// Hex digits at the start of the handle that carry the value.
pub const VALUE_HEX_LEN: usize = 16;
pub const PROOF_LEN: usize = 32;
const TIMESTAMP_HEX_LEN: usize = 8;
const NONCE_HEX_LEN: usize = 8;
const PROOF_MARKER: &[u8; 8] = b"deadbeef";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    pub handle: H256,
    pub proof: [u8; PROOF_LEN],
}

impl EncryptedPayload {
    pub fn handle_hex(&self) -> String {
        format!("0x{}", hex::encode(self.handle.as_bytes()))
    }

    pub fn proof_bytes(&self) -> Bytes {
        Bytes::from(self.proof.to_vec())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncoderError {
    #[error("confidential backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("malformed handle: {0}")]
    MalformedHandle(String),
}

/// A confidential-computation backend able to produce encrypted inputs for a contract.
///
/// `contract` and `user` bind the ciphertext to its destination on a real backend. They never
/// appear in the payload.
#[async_trait]
pub trait ConfidentialEncoder: Send + Sync + std::fmt::Debug {
    async fn encode(
        &self,
        contract: EthAddress,
        user: EthAddress,
        value: u64,
    ) -> Result<EncryptedPayload, EncoderError>;

    fn backend_name(&self) -> &'static str;
}

#[derive(Debug, Default, Clone)]
pub struct SimulatedEncoder;

impl SimulatedEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Assemble a payload from already formatted parts. Parts of the wrong width are tolerated,
    /// the handle is forced back to exactly [`HANDLE_HEX_LEN`] digits.
    pub fn build_payload(
        &self,
        value: u64,
        timestamp_hex: &str,
        nonce_hex: &str,
    ) -> Result<EncryptedPayload, EncoderError> {
        let value_hex = format!("{:0width$x}", value, width = VALUE_HEX_LEN);
        let mut handle_data = format!("{value_hex}{timestamp_hex}{nonce_hex}");
        let fill = HANDLE_HEX_LEN.saturating_sub(handle_data.len());
        handle_data.push_str(&"0".repeat(fill));

        let handle_data = normalize_handle_data(handle_data);
        let handle_bytes = hex::decode(&handle_data)
            .map_err(|e| EncoderError::MalformedHandle(format!("{handle_data}: {e}")))?;
        let handle = H256::from_slice(&handle_bytes);

        let mut proof = [0u8; PROOF_LEN];
        copy_prefix(&mut proof[0..4], timestamp_hex.as_bytes());
        copy_prefix(&mut proof[4..8], nonce_hex.as_bytes());
        proof[8..16].copy_from_slice(PROOF_MARKER);

        Ok(EncryptedPayload { handle, proof })
    }
}

#[async_trait]
impl ConfidentialEncoder for SimulatedEncoder {
    async fn encode(
        &self,
        contract: EthAddress,
        user: EthAddress,
        value: u64,
    ) -> Result<EncryptedPayload, EncoderError> {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        // Coarse timestamp, wraps every ~136 years
        let timestamp_hex = format!("{:0width$x}", secs as u32, width = TIMESTAMP_HEX_LEN);
        let nonce_hex = format!(
            "{:0width$x}",
            rand::random::<u32>(),
            width = NONCE_HEX_LEN
        );
        let payload = self.build_payload(value, &timestamp_hex, &nonce_hex)?;
        debug!(
            "[SimulatedEncoder] Encoded value for contract={:?} user={:?}: handle={}",
            contract,
            user,
            payload.handle_hex()
        );
        Ok(payload)
    }

    fn backend_name(&self) -> &'static str {
        "simulated"
    }
}

/// Re-pad or truncate handle data to exactly [`HANDLE_HEX_LEN`] hex digits.
fn normalize_handle_data(data: String) -> String {
    if data.len() == HANDLE_HEX_LEN {
        return data;
    }
    warn!(
        "[SimulatedEncoder] Handle data has {} hex digits, expected {}; correcting",
        data.len(),
        HANDLE_HEX_LEN
    );
    let mut corrected: String = data.chars().take(HANDLE_HEX_LEN).collect();
    while corrected.len() < HANDLE_HEX_LEN {
        corrected.push('0');
    }
    corrected
}

fn copy_prefix(dst: &mut [u8], src: &[u8]) {
    let n = dst.len().min(src.len());
    dst[..n].copy_from_slice(&src[..n]);
}

/// Recover the value carried by a handle: its first 16 hex digits, big endian.
pub fn decode_handle(handle: &H256) -> u64 {
    let mut value = [0u8; 8];
    value.copy_from_slice(&handle.as_bytes()[..8]);
    u64::from_be_bytes(value)
}

/// Same as [`decode_handle`] for the `0x`-prefixed string form.
pub fn decode_handle_hex(handle: &str) -> Result<u64, EncoderError> {
    let data = handle.strip_prefix("0x").unwrap_or(handle);
    let value_hex = data
        .get(..VALUE_HEX_LEN)
        .ok_or_else(|| EncoderError::MalformedHandle(handle.to_string()))?;
    u64::from_str_radix(value_hex, 16).map_err(|e| EncoderError::MalformedHandle(e.to_string()))
}
