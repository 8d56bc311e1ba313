// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Rebuilds submission history from contract logs.
//!
//! The plain contract emits one event encoding; the confidential contract emitted two over its
//! lifetime, so both are queried and merged. Each contract's window is widened once when the
//! initial window holds nothing. Logs that no known schema decodes are dropped.

use crate::abi::{decode_submission, EventSchema};
use crate::config::ReconcilerConfig;
use crate::error::{ReconcileError, RelayResult};
use crate::eth_client::LedgerReader;
use crate::metrics::RelayMetrics;
use crate::types::{CanonicalSubmissionRecord, ContractKind, LedgerLog, ReconciliationReport};
use crate::utils::{current_day_index, is_configured, window_start};
use ethers::types::{Address as EthAddress, TxHash};
use std::collections::HashSet;
use std::sync::Arc;
use tap::TapFallible;
use tracing::{debug, info, warn};

pub struct EventReconciler<R> {
    reader: Arc<R>,
    config: ReconcilerConfig,
    metrics: Arc<RelayMetrics>,
}

impl<R> EventReconciler<R>
where
    R: LedgerReader + 'static,
{
    pub fn new(reader: Arc<R>, config: ReconcilerConfig, metrics: Arc<RelayMetrics>) -> Self {
        Self {
            reader,
            config,
            metrics,
        }
    }

    pub async fn fetch(
        &self,
        account: EthAddress,
        plain: Option<EthAddress>,
        confidential: Option<EthAddress>,
    ) -> Result<ReconciliationReport, ReconcileError> {
        self.fetch_for_day(account, plain, confidential, current_day_index())
            .await
    }

    /// Same as [`EventReconciler::fetch`] with an explicit "today".
    pub async fn fetch_for_day(
        &self,
        account: EthAddress,
        plain: Option<EthAddress>,
        confidential: Option<EthAddress>,
        today: u64,
    ) -> Result<ReconciliationReport, ReconcileError> {
        let (submitted_today, records) = tokio::join!(
            self.submitted_today(account, plain, confidential, today),
            self.collect_records(plain, confidential),
        );
        let (latest_block, records) = records.tap_err(|e| {
            warn!("[Reconciler] Failed to fetch submission records: {}", e);
        })?;
        info!(
            "[Reconciler] Reconciled {} record(s) up to block {}, submitted_today={}",
            records.len(),
            latest_block,
            submitted_today
        );
        Ok(ReconciliationReport {
            latest_block,
            today,
            submitted_today,
            records,
        })
    }

    /// Whether `lastSubmitDay(account)` on either contract is `today`. Failed reads count as day 0.
    async fn submitted_today(
        &self,
        account: EthAddress,
        plain: Option<EthAddress>,
        confidential: Option<EthAddress>,
        today: u64,
    ) -> bool {
        let contracts: Vec<EthAddress> = [plain, confidential]
            .into_iter()
            .filter(|c| is_configured(*c))
            .flatten()
            .collect();
        let reads = contracts.iter().map(|contract| async move {
            self.reader
                .last_submit_day(*contract, account)
                .await
                .unwrap_or_else(|e| {
                    debug!(
                        "[Reconciler] lastSubmitDay read on {:?} failed, treating as day 0: {}",
                        contract, e
                    );
                    0
                })
        });
        futures::future::join_all(reads)
            .await
            .into_iter()
            .any(|day| day == today)
    }

    async fn collect_records(
        &self,
        plain: Option<EthAddress>,
        confidential: Option<EthAddress>,
    ) -> RelayResult<(u64, Vec<CanonicalSubmissionRecord>)> {
        let latest = self.reader.latest_block().await?;

        let mut records = vec![];
        for (kind, contract) in [
            (ContractKind::Plain, plain),
            (ContractKind::Confidential, confidential),
        ] {
            let Some(contract) = contract.filter(|c| is_configured(Some(*c))) else {
                continue;
            };
            if !self.reader.has_code(contract).await? {
                info!(
                    "[Reconciler] No {} contract deployed at {:?}, skipping",
                    kind, contract
                );
                continue;
            }
            let logs = self.query_with_widening(kind, contract, latest).await?;
            records.extend(self.decode_logs(kind, logs));
        }

        // Stable, so ties keep plain-before-confidential and log order
        records.sort_by(|a, b| b.day_index.cmp(&a.day_index));
        records.truncate(self.config.max_records);
        Ok((latest, records))
    }

    async fn query_with_widening(
        &self,
        kind: ContractKind,
        contract: EthAddress,
        latest: u64,
    ) -> RelayResult<Vec<LedgerLog>> {
        let from = window_start(latest, self.config.initial_window);
        let logs = self.query_schemas(kind, contract, from, latest).await?;
        if !logs.is_empty() || from == 0 {
            return Ok(logs);
        }
        let widened_from = window_start(latest, self.config.widened_window);
        info!(
            "[Reconciler] No {} logs in [{}, {}], widening to [{}, {}]",
            kind, from, latest, widened_from, latest
        );
        self.query_schemas(kind, contract, widened_from, latest)
            .await
    }

    /// Query every candidate schema of `kind` concurrently and dedupe by (tx, log index).
    async fn query_schemas(
        &self,
        kind: ContractKind,
        contract: EthAddress,
        from: u64,
        to: u64,
    ) -> RelayResult<Vec<LedgerLog>> {
        let queries = EventSchema::candidates(kind)
            .iter()
            .map(|schema| self.reader.logs(contract, schema.topic(), from, to));
        let results = futures::future::join_all(queries).await;

        let mut seen: HashSet<(TxHash, u64)> = HashSet::new();
        let mut logs = vec![];
        for result in results {
            for log in result? {
                if seen.insert(log.key()) {
                    logs.push(log);
                }
            }
        }
        debug!(
            "[Reconciler] {} {} log(s) from {:?} in [{}, {}]",
            logs.len(),
            kind,
            contract,
            from,
            to
        );
        Ok(logs)
    }

    fn decode_logs(&self, kind: ContractKind, logs: Vec<LedgerLog>) -> Vec<CanonicalSubmissionRecord> {
        logs.into_iter()
            .filter_map(|log| match self.decode_log(kind, &log) {
                Some(record) => {
                    self.metrics
                        .reconciled_records
                        .with_label_values(&[record.source.label()])
                        .inc();
                    Some(record)
                }
                None => {
                    self.metrics.dropped_logs.inc();
                    None
                }
            })
            .collect()
    }

    fn decode_log(&self, kind: ContractKind, log: &LedgerLog) -> Option<CanonicalSubmissionRecord> {
        let (schema, decoded) = decode_submission(kind, &log.log)
            .map_err(|errors| {
                warn!(
                    "[Reconciler] Dropping undecodable log tx={:?} index={}: {:?}",
                    log.tx_hash, log.log_index, errors
                )
            })
            .ok()?;
        let day_index = u64::try_from(decoded.day_index)
            .map_err(|_| {
                warn!(
                    "[Reconciler] Dropping log tx={:?} index={} with out of range day index {}",
                    log.tx_hash, log.log_index, decoded.day_index
                )
            })
            .ok()?;
        Some(CanonicalSubmissionRecord {
            transaction_id: log.tx_hash,
            log_index: log.log_index,
            block_number: log.block_number,
            user: decoded.user,
            day_index,
            steps: decoded.steps.resolve(),
            reward: decoded.reward.to_string(),
            source: schema,
        })
    }
}
