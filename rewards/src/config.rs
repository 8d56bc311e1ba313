// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::lifecycle::{EncoderFactory, EncoderLifecycle, SimulatedEncoderFactory};
use crate::types::ResolvedContracts;
use anyhow::{anyhow, Context};
use ethers::types::Address as EthAddress;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

pub const LOCAL_NETWORK: &str = "local";
pub const SEPOLIA_NETWORK: &str = "sepolia";
pub const LOCAL_CHAIN_ID: u64 = 31337;
pub const SEPOLIA_CHAIN_ID: u64 = 11155111;
pub const SEPOLIA_EXPLORER: &str = "https://sepolia.etherscan.io";
const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Load/save for config files. YAML for `.yaml`/`.yml`, JSON otherwise.
pub trait Config: Serialize + DeserializeOwned {
    fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = if is_yaml(path) {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };
        Ok(config)
    }

    fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let content = if is_yaml(path) {
            serde_yaml::to_string(self)?
        } else {
            serde_json::to_string_pretty(self)?
        };
        std::fs::write(path, content)
            .with_context(|| format!("writing config {}", path.display()))?;
        Ok(())
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|s| s.to_str()),
        Some("yaml") | Some("yml")
    )
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct NetworkProfile {
    pub chain_id: u64,
    // Reward token (ERC-20). Empty when not deployed.
    #[serde(default)]
    pub token: String,
    // Plain rewards contract
    #[serde(default)]
    pub rewards: String,
    // Confidential rewards contract, the zero address disables the confidential path
    #[serde(default)]
    pub enc_rewards: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explorer_base: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct SubmissionConfig {
    pub min_interval_ms: u64,
    // One entry per retry after a traffic protection rejection
    pub retry_delays_secs: Vec<u64>,
    pub confidential_gas_limit: u64,
    pub confirmations: usize,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 3000,
            retry_delays_secs: vec![30, 60],
            confidential_gas_limit: 300_000,
            confirmations: 1,
        }
    }
}

impl SubmissionConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn retry_delays(&self) -> Vec<Duration> {
        self.retry_delays_secs
            .iter()
            .map(|secs| Duration::from_secs(*secs))
            .collect()
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct ReconcilerConfig {
    pub initial_window: u64,
    pub widened_window: u64,
    pub max_records: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            initial_window: 10_000,
            widened_window: 20_000,
            max_records: 20,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum EncoderBackend {
    #[default]
    Simulated,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct EncoderConfig {
    pub backend: EncoderBackend,
}

impl EncoderConfig {
    pub fn lifecycle(&self) -> EncoderLifecycle {
        let factory: Box<dyn EncoderFactory> = match self.backend {
            EncoderBackend::Simulated => Box::new(SimulatedEncoderFactory),
        };
        EncoderLifecycle::new(factory)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct RelayConfig {
    pub rpc_url: String,
    // Name of the selected entry in `networks`
    pub network: String,
    pub networks: BTreeMap<String, NetworkProfile>,
    // Env var holding the hex private key of the submitting account
    #[serde(default = "default_signer_key_env")]
    pub signer_key_env: String,
    #[serde(default)]
    pub submission: SubmissionConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_port: Option<u16>,
}

fn default_signer_key_env() -> String {
    "PRIVATE_KEY".to_string()
}

impl Config for RelayConfig {}

impl RelayConfig {
    pub fn template() -> Self {
        let networks = BTreeMap::from_iter(vec![
            (
                LOCAL_NETWORK.to_string(),
                NetworkProfile {
                    chain_id: LOCAL_CHAIN_ID,
                    token: ZERO_ADDRESS.to_string(),
                    rewards: ZERO_ADDRESS.to_string(),
                    enc_rewards: ZERO_ADDRESS.to_string(),
                    explorer_base: None,
                },
            ),
            (
                SEPOLIA_NETWORK.to_string(),
                NetworkProfile {
                    chain_id: SEPOLIA_CHAIN_ID,
                    token: ZERO_ADDRESS.to_string(),
                    rewards: ZERO_ADDRESS.to_string(),
                    enc_rewards: ZERO_ADDRESS.to_string(),
                    explorer_base: Some(SEPOLIA_EXPLORER.to_string()),
                },
            ),
        ]);
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            network: LOCAL_NETWORK.to_string(),
            networks,
            signer_key_env: default_signer_key_env(),
            submission: SubmissionConfig::default(),
            reconciler: ReconcilerConfig::default(),
            encoder: EncoderConfig::default(),
            metrics_port: None,
        }
    }

    pub fn selected_profile(&self) -> anyhow::Result<&NetworkProfile> {
        self.networks.get(&self.network).ok_or_else(|| {
            anyhow!(
                "Unknown network profile '{}', known profiles: {:?}",
                self.network,
                self.networks.keys().collect::<Vec<_>>()
            )
        })
    }

    /// Resolve the selected profile into typed addresses.
    pub fn validate(&self) -> anyhow::Result<ResolvedContracts> {
        info!("Starting config validation");
        if self.rpc_url.trim().is_empty() {
            return Err(anyhow!("rpc-url must be set"));
        }
        if self.submission.min_interval_ms == 0 {
            return Err(anyhow!("submission.min-interval-ms must be positive"));
        }
        if self.reconciler.widened_window < self.reconciler.initial_window {
            return Err(anyhow!(
                "reconciler.widened-window ({}) is smaller than initial-window ({})",
                self.reconciler.widened_window,
                self.reconciler.initial_window
            ));
        }
        let profile = self.selected_profile()?;
        let contracts = ResolvedContracts {
            network: self.network.clone(),
            token: parse_optional_address("token", &profile.token)?,
            plain: parse_optional_address("rewards", &profile.rewards)?,
            confidential: parse_optional_address("enc-rewards", &profile.enc_rewards)?,
            chain_id: profile.chain_id,
            explorer_base: profile.explorer_base.clone(),
        };
        info!(
            "Config validation complete: network={}, chain_id={}, rewards={:?}, enc_rewards={:?}",
            contracts.network, contracts.chain_id, contracts.plain, contracts.confidential
        );
        Ok(contracts)
    }

    pub fn signer_key(&self) -> anyhow::Result<String> {
        std::env::var(&self.signer_key_env).map_err(|_| {
            anyhow!(
                "Signer key not found, set the {} environment variable",
                self.signer_key_env
            )
        })
    }
}

fn parse_optional_address(field: &str, value: &str) -> anyhow::Result<Option<EthAddress>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    EthAddress::from_str(value)
        .map(Some)
        .map_err(|e| anyhow!("Invalid {} address '{}': {}", field, value, e))
}
