// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use anyhow::anyhow;
use clap::*;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address as EthAddress;
use move_rewards::config::{Config, RelayConfig};
use move_rewards::types::{ReconciliationReport, ResolvedContracts, TokenSummary};
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Parser)]
#[clap(rename_all = "kebab-case")]
pub struct Args {
    #[clap(subcommand)]
    pub command: RewardsCommand,
    // Dump the prometheus registry to stdout before exiting
    #[clap(long = "print-metrics", global = true)]
    pub print_metrics: bool,
}

#[derive(Parser)]
#[clap(rename_all = "kebab-case")]
pub enum RewardsCommand {
    // Submit today's step count
    #[clap(name = "submit")]
    Submit {
        #[clap(long = "config-path")]
        config_path: PathBuf,
        // Raw step count input, an empty value is rejected
        #[clap(long = "steps", allow_hyphen_values = true)]
        steps: String,
    },
    // Rebuild submission history and today's status from contract events
    #[clap(name = "results")]
    Results {
        #[clap(long = "config-path")]
        config_path: PathBuf,
        // Defaults to the signer account
        #[clap(long = "account")]
        account: Option<EthAddress>,
        #[clap(long = "json")]
        json: bool,
    },
    // Produce a simulated confidential payload without sending anything
    #[clap(name = "encode")]
    Encode {
        #[clap(long = "contract")]
        contract: EthAddress,
        #[clap(long = "user")]
        user: EthAddress,
        #[clap(long = "value")]
        value: u64,
    },
    // Print the step count carried by a simulated handle
    #[clap(name = "decode-handle")]
    DecodeHandle { handle: String },
    #[clap(name = "create-config-template")]
    CreateConfigTemplate { path: PathBuf },
}

/// A config file together with the contracts it resolves to.
pub struct LoadedRewardsConfig {
    pub config: RelayConfig,
    pub contracts: ResolvedContracts,
}

impl LoadedRewardsConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config = RelayConfig::load(path)?;
        let contracts = config.validate()?;
        Ok(Self { config, contracts })
    }

    pub fn signer_wallet(&self) -> anyhow::Result<LocalWallet> {
        let key = self.config.signer_key()?;
        LocalWallet::from_str(key.trim_start_matches("0x"))
            .map(|w| w.with_chain_id(self.contracts.chain_id))
            .map_err(|e| anyhow!("Invalid signer key: {e}"))
    }

    /// `account` if given, the signer's address otherwise.
    pub fn account_or_signer(&self, account: Option<EthAddress>) -> anyhow::Result<EthAddress> {
        match account {
            Some(account) => Ok(account),
            None => Ok(self.signer_wallet()?.address()),
        }
    }
}

pub fn generate_config_template_and_write_to_file(path: &Path) -> anyhow::Result<()> {
    RelayConfig::template().save(path)
}

pub fn format_report(
    report: &ReconciliationReport,
    token: &TokenSummary,
    explorer_base: Option<&str>,
) -> String {
    let mut lines = vec![
        format!("Latest block:     {}", report.latest_block),
        format!(
            "Submitted today:  {}",
            if report.submitted_today { "yes" } else { "no" }
        ),
        format!("Balance:          {} {}", token.balance, token.symbol),
    ];
    if report.records.is_empty() {
        lines.push("No submissions found".to_string());
    }
    for record in &report.records {
        let mut line = format!(
            "day {:>6}  steps {:>8}  reward {}  block {}  tx {:?}",
            record.day_index,
            record.steps.to_string(),
            record.reward,
            record.block_number,
            record.transaction_id
        );
        if let Some(url) = record.explorer_url(explorer_base) {
            line.push_str(&format!("  {url}"));
        }
        lines.push(line);
    }
    lines.join("\n")
}
