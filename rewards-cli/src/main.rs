// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use clap::*;
use ethers::utils::hex;
use move_rewards::encoder::{decode_handle_hex, ConfidentialEncoder, SimulatedEncoder};
use move_rewards::eth_client::EthClient;
use move_rewards::metrics::RelayMetrics;
use move_rewards::orchestrator::SubmissionOrchestrator;
use move_rewards::reconciler::EventReconciler;
use move_rewards::signer::{EthSigner, TransactionSubmitter};
use move_rewards::types::SubmissionRequest;
use move_rewards_cli::{
    format_report, generate_config_template_and_write_to_file, Args, LoadedRewardsConfig,
    RewardsCommand,
};
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let args = Args::parse();

    let registry = Registry::new();
    let metrics = Arc::new(RelayMetrics::new(&registry));

    let result = run(args.command, metrics).await;
    if args.print_metrics {
        let mut buffer = vec![];
        TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
        println!("{}", String::from_utf8_lossy(&buffer));
    }
    result
}

async fn run(command: RewardsCommand, metrics: Arc<RelayMetrics>) -> anyhow::Result<()> {
    match command {
        RewardsCommand::CreateConfigTemplate { path } => {
            generate_config_template_and_write_to_file(&path)?;
            tracing::info!("Rewards config template generated at {}", path.display());
        }

        RewardsCommand::Encode {
            contract,
            user,
            value,
        } => {
            let payload = SimulatedEncoder::new().encode(contract, user, value).await?;
            println!("handle: {}", payload.handle_hex());
            println!("proof:  0x{}", hex::encode(payload.proof));
        }

        RewardsCommand::DecodeHandle { handle } => {
            println!("{}", decode_handle_hex(&handle)?);
        }

        RewardsCommand::Submit { config_path, steps } => {
            let loaded = LoadedRewardsConfig::load(&config_path)?;
            let contracts = loaded.contracts.clone();
            // Fails early on a node serving another chain
            EthClient::new(
                &loaded.config.rpc_url,
                metrics.clone(),
                Some(contracts.chain_id),
            )
            .await?;
            let signer = Arc::new(EthSigner::new(
                &loaded.config.rpc_url,
                metrics.clone(),
                &loaded.config.signer_key()?,
                contracts.chain_id,
                loaded.config.submission.confirmations,
            )?);
            let user = signer.address();
            let orchestrator = SubmissionOrchestrator::new(
                signer,
                contracts.clone(),
                Arc::new(loaded.config.encoder.lifecycle()),
                loaded.config.submission.clone(),
                metrics,
            );
            match orchestrator
                .submit(SubmissionRequest::from_input(user, &steps))
                .await
            {
                Ok(receipt) => {
                    println!("{}", serde_json::to_string_pretty(&receipt)?);
                    if let Some(base) = &contracts.explorer_base {
                        println!(
                            "{}/tx/{:?}",
                            base.trim_end_matches('/'),
                            receipt.transaction_id
                        );
                    }
                }
                Err(e) => {
                    tracing::error!("Submission failed ({}): {}", e.kind(), e);
                    return Err(anyhow::anyhow!(e));
                }
            }
        }

        RewardsCommand::Results {
            config_path,
            account,
            json,
        } => {
            let loaded = LoadedRewardsConfig::load(&config_path)?;
            let account = loaded.account_or_signer(account)?;
            let contracts = &loaded.contracts;
            let client = Arc::new(
                EthClient::new(
                    &loaded.config.rpc_url,
                    metrics.clone(),
                    Some(contracts.chain_id),
                )
                .await?,
            );
            let reconciler =
                EventReconciler::new(client.clone(), loaded.config.reconciler.clone(), metrics);
            let (report, token) = tokio::join!(
                reconciler.fetch(account, contracts.plain, contracts.confidential),
                client.token_summary(contracts.token, account),
            );
            let report = report?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "account": account,
                        "token": token,
                        "report": report,
                    }))?
                );
            } else {
                println!(
                    "{}",
                    format_report(&report, &token, contracts.explorer_base.as_deref())
                );
            }
        }
    }
    Ok(())
}
