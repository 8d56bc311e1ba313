// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Static ABI descriptors of the rewards contracts and the ERC-20 reward token.

use crate::encoder::{decode_handle, EncryptedPayload};
use crate::error::{RelayError, RelayResult};
use crate::types::ContractKind;
use ethers::abi::{Event, EventParam, ParamType, RawLog, Token};
use ethers::types::{Address as EthAddress, Bytes, Log, H256, U256};
use ethers::utils::id;
use serde::Serialize;

pub const SUBMIT_DAILY: &str = "submitDaily(uint256)";
pub const SUBMIT_DAILY_ENCRYPTED: &str = "submitDailyEncrypted(bytes32,bytes)";
pub const LAST_SUBMIT_DAY: &str = "lastSubmitDay(address)";

pub const ERC20_SYMBOL: &str = "symbol()";
pub const ERC20_DECIMALS: &str = "decimals()";
pub const ERC20_BALANCE_OF: &str = "balanceOf(address)";

const SUBMITTED_EVENT: &str = "Submitted";

fn calldata(signature: &str, args: &[Token]) -> Bytes {
    let mut data = id(signature).to_vec();
    data.extend(ethers::abi::encode(args));
    Bytes::from(data)
}

pub fn encode_submit_daily(steps: u64) -> Bytes {
    calldata(SUBMIT_DAILY, &[Token::Uint(U256::from(steps))])
}

pub fn encode_submit_daily_encrypted(payload: &EncryptedPayload) -> Bytes {
    calldata(
        SUBMIT_DAILY_ENCRYPTED,
        &[
            Token::FixedBytes(payload.handle.as_bytes().to_vec()),
            Token::Bytes(payload.proof.to_vec()),
        ],
    )
}

pub fn encode_last_submit_day(account: EthAddress) -> Bytes {
    calldata(LAST_SUBMIT_DAY, &[Token::Address(account)])
}

pub fn encode_erc20_symbol() -> Bytes {
    calldata(ERC20_SYMBOL, &[])
}

pub fn encode_erc20_decimals() -> Bytes {
    calldata(ERC20_DECIMALS, &[])
}

pub fn encode_erc20_balance_of(account: EthAddress) -> Bytes {
    calldata(ERC20_BALANCE_OF, &[Token::Address(account)])
}

/// Decode a single `uint` return value.
pub fn decode_uint_output(data: &[u8]) -> RelayResult<U256> {
    ethers::abi::decode(&[ParamType::Uint(256)], data)
        .map_err(|e| RelayError::AbiDecodeError(e.to_string()))?
        .into_iter()
        .next()
        .and_then(Token::into_uint)
        .ok_or_else(|| RelayError::AbiDecodeError("expected uint output".into()))
}

/// Decode a `string` return value. Tokens that return `bytes32` are read as a
/// zero-terminated string.
pub fn decode_string_output(data: &[u8]) -> RelayResult<String> {
    if let Ok(tokens) = ethers::abi::decode(&[ParamType::String], data) {
        if let Some(value) = tokens.into_iter().next().and_then(Token::into_string) {
            return Ok(value);
        }
    }
    if data.len() == 32 {
        let end = data.iter().position(|b| *b == 0).unwrap_or(data.len());
        return String::from_utf8(data[..end].to_vec())
            .map_err(|e| RelayError::AbiDecodeError(e.to_string()));
    }
    Err(RelayError::AbiDecodeError("expected string output".into()))
}

/// Event encodings a rewards contract may emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSchema {
    /// `Submitted(address indexed user, uint256 dayIndex, uint256 steps, uint256 reward)`
    Plain,
    /// `Submitted(address indexed user, uint256 dayIndex, bytes32 stepsHandle, bytes proof, uint256 reward)`
    ConfidentialHandle,
    /// `Submitted(address indexed user, uint256 dayIndex, uint64 stepsPlain, uint64 rewardPlainApprox)`
    ConfidentialPlain,
}

fn param(name: &str, kind: ParamType, indexed: bool) -> EventParam {
    EventParam {
        name: name.to_string(),
        kind,
        indexed,
    }
}

impl EventSchema {
    pub fn event(&self) -> Event {
        let mut inputs = vec![
            param("user", ParamType::Address, true),
            param("dayIndex", ParamType::Uint(256), false),
        ];
        match self {
            EventSchema::Plain => {
                inputs.push(param("steps", ParamType::Uint(256), false));
                inputs.push(param("reward", ParamType::Uint(256), false));
            }
            EventSchema::ConfidentialHandle => {
                inputs.push(param("stepsHandle", ParamType::FixedBytes(32), false));
                inputs.push(param("proof", ParamType::Bytes, false));
                inputs.push(param("reward", ParamType::Uint(256), false));
            }
            EventSchema::ConfidentialPlain => {
                inputs.push(param("stepsPlain", ParamType::Uint(64), false));
                inputs.push(param("rewardPlainApprox", ParamType::Uint(64), false));
            }
        }
        Event {
            name: SUBMITTED_EVENT.to_string(),
            inputs,
            anonymous: false,
        }
    }

    pub fn topic(&self) -> H256 {
        self.event().signature()
    }

    pub fn label(&self) -> &'static str {
        match self {
            EventSchema::Plain => "plain",
            EventSchema::ConfidentialHandle => "confidential_handle",
            EventSchema::ConfidentialPlain => "confidential_plain",
        }
    }

    /// Schemas to try for a contract, in decode priority order.
    pub fn candidates(kind: ContractKind) -> &'static [EventSchema] {
        match kind {
            ContractKind::Plain => &[EventSchema::Plain],
            ContractKind::Confidential => &[
                EventSchema::ConfidentialHandle,
                EventSchema::ConfidentialPlain,
            ],
        }
    }

    pub fn decode(&self, log: &Log) -> RelayResult<DecodedSubmission> {
        let parsed = self
            .event()
            .parse_log(RawLog {
                topics: log.topics.clone(),
                data: log.data.to_vec(),
            })
            .map_err(|e| RelayError::AbiDecodeError(format!("{}: {e}", self.label())))?;

        let mut params = parsed.params.into_iter();
        let mut next = |name: &str| {
            params
                .next()
                .filter(|p| p.name == name)
                .map(|p| p.value)
                .ok_or_else(|| {
                    RelayError::AbiDecodeError(format!("{}: missing field {name}", self.label()))
                })
        };
        let user = next("user")?
            .into_address()
            .ok_or_else(|| RelayError::AbiDecodeError("user is not an address".into()))?;
        let day_index = next("dayIndex")?
            .into_uint()
            .ok_or_else(|| RelayError::AbiDecodeError("dayIndex is not a uint".into()))?;

        let (steps, reward) = match self {
            EventSchema::Plain => (
                StepsField::Plain(uint(next("steps")?, "steps")?),
                uint(next("reward")?, "reward")?,
            ),
            EventSchema::ConfidentialHandle => {
                let handle = next("stepsHandle")?
                    .into_fixed_bytes()
                    .filter(|b| b.len() == 32)
                    .ok_or_else(|| RelayError::AbiDecodeError("stepsHandle is not bytes32".into()))?;
                next("proof")?;
                (
                    StepsField::Handle(H256::from_slice(&handle)),
                    uint(next("reward")?, "reward")?,
                )
            }
            EventSchema::ConfidentialPlain => (
                StepsField::Plain(uint(next("stepsPlain")?, "stepsPlain")?),
                uint(next("rewardPlainApprox")?, "rewardPlainApprox")?,
            ),
        };
        Ok(DecodedSubmission {
            user,
            day_index,
            steps,
            reward,
        })
    }
}

fn uint(token: Token, field: &str) -> RelayResult<U256> {
    token
        .into_uint()
        .ok_or_else(|| RelayError::AbiDecodeError(format!("{field} is not a uint")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepsField {
    Plain(U256),
    Handle(H256),
}

impl StepsField {
    /// Step count in the clear. Handles are read back through the encoder's decode contract.
    pub fn resolve(&self) -> U256 {
        match self {
            StepsField::Plain(steps) => *steps,
            StepsField::Handle(handle) => U256::from(decode_handle(handle)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSubmission {
    pub user: EthAddress,
    pub day_index: U256,
    pub steps: StepsField,
    pub reward: U256,
}

/// Try each schema of `kind` in priority order, the first that decodes wins.
pub fn decode_submission(
    kind: ContractKind,
    log: &Log,
) -> Result<(EventSchema, DecodedSubmission), Vec<RelayError>> {
    let mut errors = vec![];
    for schema in EventSchema::candidates(kind) {
        match schema.decode(log) {
            Ok(decoded) => return Ok((*schema, decoded)),
            Err(e) => errors.push(e),
        }
    }
    Err(errors)
}
