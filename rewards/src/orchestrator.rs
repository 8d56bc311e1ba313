// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Daily step-count submission.
//!
//! [`SubmissionOrchestrator::submit`] is single-flight and rate limited per session. Requests go
//! to the confidential contract when one is configured, otherwise to the plain contract. Traffic
//! protection rejections on the confidential path are retried on a fixed delay schedule with the
//! same calldata; every other failure is reported after the first attempt.

use crate::abi;
use crate::classifier::classify;
use crate::config::SubmissionConfig;
use crate::encoder::EncoderError;
use crate::error::{ClassifiedFailure, ErrorKind, SubmitError};
use crate::lifecycle::EncoderLifecycle;
use crate::metrics::RelayMetrics;
use crate::signer::TransactionSubmitter;
use crate::types::{
    Confirmation, ContractKind, PreparedSubmission, ResolvedContracts, SubmissionReceipt,
    SubmissionRequest,
};
use crate::utils::is_configured;
use ethers::types::{Bytes, TxHash, U256};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// `Idle` whenever no submission is in flight. `RateLimited` marks the last throttled call until
/// the next one is accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SubmissionPhase {
    #[default]
    Idle,
    RateLimited,
    Submitting,
    AwaitingConfirmation,
    Completed,
    Failed,
}

/// Per-session submission state. Never persisted.
#[derive(Debug, Default)]
pub struct SessionSubmissionGuard {
    is_submitting: bool,
    last_submit: Option<Instant>,
    phase: SubmissionPhase,
}

impl SessionSubmissionGuard {
    fn try_enter(&mut self, now: Instant, min_interval: Duration) -> Result<(), SubmitError> {
        if self.is_submitting {
            return Err(SubmitError::AlreadyInProgress);
        }
        if let Some(last) = self.last_submit {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < min_interval {
                let remaining = min_interval - elapsed;
                self.phase = SubmissionPhase::RateLimited;
                return Err(SubmitError::RateLimited {
                    remaining_secs: remaining.as_nanos().div_ceil(1_000_000_000) as u64,
                });
            }
        }
        self.is_submitting = true;
        self.last_submit = Some(now);
        Ok(())
    }
}

fn lock(guard: &Mutex<SessionSubmissionGuard>) -> MutexGuard<'_, SessionSubmissionGuard> {
    guard.lock().unwrap_or_else(|e| e.into_inner())
}

/// Clears `is_submitting` and returns the phase to `Idle` when the submission ends, including
/// when its future is dropped.
struct InFlight {
    guard: Arc<Mutex<SessionSubmissionGuard>>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut guard = lock(&self.guard);
        debug!("[Orchestrator] {:?} -> {:?}", guard.phase, SubmissionPhase::Idle);
        guard.is_submitting = false;
        guard.phase = SubmissionPhase::Idle;
    }
}

/// Retry bookkeeping for one `submit` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    pub attempt: u32,
    pub last_error: Option<ErrorKind>,
    pub next_delay: Option<Duration>,
}

impl RetryState {
    fn new(delays: &[Duration]) -> Self {
        Self {
            attempt: 1,
            last_error: None,
            next_delay: delays.first().copied(),
        }
    }

    /// Record a failed attempt. Returns the delay before the next one, or `None` when the
    /// failure is final.
    fn record_failure(
        &mut self,
        kind: ErrorKind,
        retryable: bool,
        delays: &[Duration],
    ) -> Option<Duration> {
        self.last_error = Some(kind);
        let delay = self.next_delay.filter(|_| retryable)?;
        self.attempt += 1;
        self.next_delay = delays.get(self.attempt as usize - 1).copied();
        Some(delay)
    }
}

pub struct SubmissionOrchestrator<S> {
    submitter: Arc<S>,
    contracts: ResolvedContracts,
    encoder: Arc<EncoderLifecycle>,
    config: SubmissionConfig,
    guard: Arc<Mutex<SessionSubmissionGuard>>,
    metrics: Arc<RelayMetrics>,
}

impl<S> SubmissionOrchestrator<S>
where
    S: TransactionSubmitter + 'static,
{
    pub fn new(
        submitter: Arc<S>,
        contracts: ResolvedContracts,
        encoder: Arc<EncoderLifecycle>,
        config: SubmissionConfig,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            submitter,
            contracts,
            encoder,
            config,
            guard: Arc::new(Mutex::new(SessionSubmissionGuard::default())),
            metrics,
        }
    }

    pub fn is_submitting(&self) -> bool {
        lock(&self.guard).is_submitting
    }

    pub fn phase(&self) -> SubmissionPhase {
        lock(&self.guard).phase
    }

    fn transition(&self, phase: SubmissionPhase) {
        let mut guard = lock(&self.guard);
        debug!("[Orchestrator] {:?} -> {:?}", guard.phase, phase);
        guard.phase = phase;
    }

    fn reject(&self, error: SubmitError) -> SubmitError {
        info!("[Orchestrator] Submission rejected: {}", error);
        self.metrics
            .submission_rejections
            .with_label_values(&[error.kind().error_type()])
            .inc();
        error
    }

    fn enter(&self) -> Result<InFlight, SubmitError> {
        lock(&self.guard)
            .try_enter(Instant::now(), self.config.min_interval())
            .map_err(|e| self.reject(e))?;
        Ok(InFlight {
            guard: self.guard.clone(),
        })
    }

    /// Pick the target contract. The confidential contract wins when configured.
    pub fn prepare(
        &self,
        request: SubmissionRequest,
        steps: u64,
    ) -> Result<PreparedSubmission, SubmitError> {
        let (kind, contract) = match (self.contracts.confidential, self.contracts.plain) {
            (Some(confidential), _) if is_configured(Some(confidential)) => {
                (ContractKind::Confidential, confidential)
            }
            (_, Some(plain)) if is_configured(Some(plain)) => (ContractKind::Plain, plain),
            _ => return Err(SubmitError::NoContractConfigured),
        };
        Ok(PreparedSubmission {
            request,
            kind,
            contract,
            steps,
        })
    }

    pub async fn submit(
        &self,
        request: SubmissionRequest,
    ) -> Result<SubmissionReceipt, SubmitError> {
        let Some(steps) = request.step_count else {
            return Err(self.reject(SubmitError::EmptyInput));
        };
        let _in_flight = self.enter()?;
        let prepared = self.prepare(request, steps).map_err(|e| {
            self.transition(SubmissionPhase::Failed);
            self.reject(e)
        })?;
        info!(
            "[Orchestrator] Submitting {} steps for {:?} via {} contract {:?}",
            prepared.steps, prepared.request.user, prepared.kind, prepared.contract
        );

        let path = prepared.kind.label();
        match self.dispatch(&prepared).await {
            Ok(receipt) => {
                self.transition(SubmissionPhase::Completed);
                self.metrics
                    .submissions
                    .with_label_values(&[path, "completed"])
                    .inc();
                info!(
                    "[Orchestrator] ✅ Submission confirmed: tx={:?}, block={}, attempts={}",
                    receipt.transaction_id, receipt.confirmed_block, receipt.attempts
                );
                Ok(receipt)
            }
            Err(failure) => {
                self.transition(SubmissionPhase::Failed);
                self.metrics
                    .submissions
                    .with_label_values(&[path, "failed"])
                    .inc();
                warn!(
                    "[Orchestrator] ❌ Submission failed after {} attempt(s): kind={}, detail={}",
                    failure.attempts, failure.kind, failure.detail
                );
                Err(SubmitError::Failed(failure))
            }
        }
    }

    async fn build_calldata(
        &self,
        prepared: &PreparedSubmission,
    ) -> Result<(Bytes, Option<U256>), ClassifiedFailure> {
        match prepared.kind {
            ContractKind::Plain => Ok((abi::encode_submit_daily(prepared.steps), None)),
            ContractKind::Confidential => {
                let encoder = self.encoder.instance().await.map_err(encoder_failure)?;
                let payload = encoder
                    .encode(prepared.contract, prepared.request.user, prepared.steps)
                    .await
                    .map_err(encoder_failure)?;
                debug!(
                    "[Orchestrator] Encoded steps with '{}' backend: handle={}",
                    encoder.backend_name(),
                    payload.handle_hex()
                );
                Ok((
                    abi::encode_submit_daily_encrypted(&payload),
                    // Fixed limit, gas estimation is unreliable for confidential inputs
                    Some(U256::from(self.config.confidential_gas_limit)),
                ))
            }
        }
    }

    async fn dispatch(
        &self,
        prepared: &PreparedSubmission,
    ) -> Result<SubmissionReceipt, ClassifiedFailure> {
        let (data, gas_limit) = self.build_calldata(prepared).await?;
        let delays = match prepared.kind {
            ContractKind::Confidential => self.config.retry_delays(),
            ContractKind::Plain => vec![],
        };
        let mut state = RetryState::new(&delays);
        loop {
            let failure = match self.attempt(prepared, data.clone(), gas_limit).await {
                Ok((tx_hash, confirmation)) => {
                    return Ok(SubmissionReceipt {
                        transaction_id: tx_hash,
                        confirmed_block: confirmation.block_number,
                        gas_used: confirmation.gas_used,
                        path: prepared.kind,
                        attempts: state.attempt,
                    })
                }
                Err(failure) => failure,
            };
            let classification = classify(&failure);
            let retryable = classification.kind == ErrorKind::TrafficProtectionRejected;
            let attempt = state.attempt;
            match state.record_failure(classification.kind, retryable, &delays) {
                Some(delay) => {
                    warn!(
                        "[Orchestrator] Attempt {} rejected by traffic protection ({}), retrying in {:?}",
                        attempt, failure, delay
                    );
                    self.metrics.submission_retries.inc();
                    self.transition(SubmissionPhase::Submitting);
                    tokio::time::sleep(delay).await;
                }
                None => {
                    return Err(ClassifiedFailure {
                        kind: classification.kind,
                        detail: classification.detail,
                        attempts: attempt,
                    })
                }
            }
        }
    }

    async fn attempt(
        &self,
        prepared: &PreparedSubmission,
        data: Bytes,
        gas_limit: Option<U256>,
    ) -> Result<(TxHash, Confirmation), crate::classifier::RpcFailure> {
        self.transition(SubmissionPhase::Submitting);
        let tx_hash = self
            .submitter
            .send(prepared.contract, data, gas_limit)
            .await?;
        self.transition(SubmissionPhase::AwaitingConfirmation);
        info!("[Orchestrator] Transaction sent: {:?}, awaiting confirmation", tx_hash);
        let confirmation = self.submitter.wait_for_confirmation(tx_hash).await?;
        Ok((tx_hash, confirmation))
    }
}

fn encoder_failure(e: EncoderError) -> ClassifiedFailure {
    ClassifiedFailure {
        kind: ErrorKind::UnknownRpcError,
        detail: e.to_string(),
        attempts: 1,
    }
}
