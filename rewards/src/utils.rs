// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use ethers::types::Address as EthAddress;
use std::time::{SystemTime, UNIX_EPOCH};

pub const SECONDS_PER_DAY: u64 = 86_400;

/// Day index as the rewards contracts compute it: unix seconds / 86400.
pub fn current_day_index() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() / SECONDS_PER_DAY)
        .unwrap_or_default()
}

/// A contract address counts as configured when it is set and not the zero address.
pub fn is_configured(address: Option<EthAddress>) -> bool {
    matches!(address, Some(addr) if !addr.is_zero())
}

/// Start of a look-back window ending at `latest`.
pub fn window_start(latest: u64, window: u64) -> u64 {
    latest.saturating_sub(window)
}
