// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

#![allow(clippy::too_many_arguments, clippy::new_without_default)]

pub mod abi;
pub mod classifier;
pub mod config;
pub mod encoder;
pub mod error;
pub mod eth_client;
pub mod lifecycle;
pub mod metered_eth_provider;
pub mod metrics;
pub mod orchestrator;
pub mod reconciler;
pub mod signer;
pub mod types;
pub mod utils;

#[cfg(test)]
pub mod eth_mock_provider;

#[cfg(test)]
pub mod test_utils;

#[cfg(test)]
mod e2e_tests;

/// Install a test-friendly tracing subscriber once per process. `RUST_LOG` overrides the default
/// `info` filter.
pub fn init_for_testing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
