//! Transaction submission and finality tracking.
//!
//! # Responsibilities
//! - Prepare data transactions (nonce, capped gas price, gas limit)
//! - Allocate nonces per account, shared by every handle of one seed
//! - Sign and broadcast them, rolling the nonce back only when the
//!   transaction definitely never reached a pool
//! - Poll until the inclusion block is final, guarding against reorgs
//! - Bound the wait by a timeout, a mortality window and a cancel signal
//!
//! # Data Flow
//! ```text
//! submit:   pending nonce -> gas price -> sign -> send_raw_transaction -> Submission
//! finality: inclusion? -> reverted? -> final? -> canonical hash matches? -> FinalityRecord
//! ```

use alloy::primitives::Address;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{sleep, timeout};

use crate::blockchain::nonce::NonceBook;
use crate::blockchain::rpc::{is_already_known, LedgerRpc};
use crate::blockchain::submission::Submission;
use crate::blockchain::types::{
    data_gas_limit, ConfirmationStatus, FinalityRecord, SubmitOptions, TxParams, APP_ID_LEN,
};
use crate::blockchain::wallet::Signer;
use crate::config::{BridgeConfig, FinalityConfig, FinalityMode, SubmissionConfig};
use crate::error::{Error, Result};
use crate::observability::metrics;
use crate::resilience::Backoff;

const WEI_PER_GWEI: u128 = 1_000_000_000;

/// Submits payloads and waits for them to become final.
#[derive(Debug, Clone)]
pub struct FinalityTracker {
    rpc: Arc<dyn LedgerRpc>,
    chain_id: u64,
    nonces: Arc<NonceBook>,
    /// Recipient of data transactions; `None` sends to the signer itself.
    sink: Option<Address>,
    submission: SubmissionConfig,
    finality: FinalityConfig,
}

impl FinalityTracker {
    /// Create a tracker for `chain_id`.
    pub fn new(rpc: Arc<dyn LedgerRpc>, chain_id: u64, config: &BridgeConfig) -> Result<Self> {
        let sink = config
            .submission
            .sink_address
            .as_deref()
            .map(|s| {
                s.parse::<Address>()
                    .map_err(|e| Error::Config(format!("Invalid sink address '{}': {}", s, e)))
            })
            .transpose()?;

        Ok(Self {
            rpc,
            chain_id,
            nonces: Arc::new(NonceBook::new()),
            sink,
            submission: config.submission.clone(),
            finality: config.finality.clone(),
        })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn nonces(&self) -> &NonceBook {
        &self.nonces
    }

    /// Build transaction parameters for `signer` and a payload of `payload_len` bytes.
    ///
    /// Reserves a nonce for the signer's account unless `options` carries one.
    pub async fn prepare(&self, signer: &Signer, payload_len: usize, options: &SubmitOptions) -> Result<TxParams> {
        // 1. Gas price, capped
        let gas_price = self.rpc.gas_price().await?;
        let gas_price_gwei = gas_price / WEI_PER_GWEI;
        if gas_price_gwei > self.submission.max_gas_price_gwei as u128 {
            return Err(Error::Broadcast(format!(
                "gas price {} gwei exceeds cap of {} gwei",
                gas_price_gwei, self.submission.max_gas_price_gwei
            )));
        }
        let gas_price = (gas_price as f64 * self.submission.gas_price_multiplier) as u128;

        // 2. Nonce, synced with the pool
        let nonce = match options.nonce {
            Some(nonce) => nonce,
            None => {
                let chain_nonce = self.rpc.pending_nonce(signer.address()).await?;
                self.nonces.reserve(signer.address(), chain_nonce)
            }
        };

        Ok(TxParams {
            chain_id: self.chain_id,
            nonce,
            gas_price,
            gas_limit: data_gas_limit(APP_ID_LEN + payload_len),
            to: self.sink.unwrap_or_else(|| signer.address()),
        })
    }

    /// Sign and broadcast `payload`. Returns once the node accepted it.
    pub async fn submit(&self, signer: &Signer, payload: &[u8], options: &SubmitOptions) -> Result<Submission> {
        let result = self.try_submit(signer, payload, options).await;
        match &result {
            Ok(submission) => {
                metrics::record_submission("accepted");
                tracing::info!(
                    tx_hash = %submission.tx_hash(),
                    sender = %signer.address(),
                    nonce = submission.transaction().nonce,
                    app_id = options.app_id,
                    payload_len = payload.len(),
                    "Submission broadcast"
                );
            }
            Err(e) => {
                metrics::record_submission("failed");
                tracing::warn!(sender = %signer.address(), error = %e, "Submission failed");
            }
        }
        result
    }

    async fn try_submit(&self, signer: &Signer, payload: &[u8], options: &SubmitOptions) -> Result<Submission> {
        let submitted_at = self.rpc.block_number().await.map_err(into_broadcast)?;
        let params = self
            .prepare(signer, payload.len(), options)
            .await
            .map_err(into_broadcast)?;
        let managed_nonce = options.nonce.is_none();
        let release_nonce = || {
            if managed_nonce && !self.nonces.release(signer.address(), params.nonce) {
                tracing::debug!(nonce = params.nonce, "Nonce not returned, later nonces already issued");
            }
        };

        let signed = match signer.sign_and_prepare(payload, options.app_id, &params).await {
            Ok(signed) => signed,
            Err(e) => {
                release_nonce();
                return Err(e);
            }
        };

        match self.rpc.send_raw_transaction(&signed.raw).await {
            Ok(hash) if hash != signed.hash => {
                tracing::warn!(expected = %signed.hash, reported = %hash, "Node reported a different transaction hash");
            }
            Ok(_) => {}
            // The pool holds these exact bytes, so the nonce is spent
            Err(e) if is_already_known(&e.to_string()) => {
                tracing::info!(tx_hash = %signed.hash, "Transaction already in pool");
            }
            Err(e) => {
                release_nonce();
                return Err(into_broadcast(e));
            }
        }

        let mortality = options.mortality_blocks.or(self.submission.mortality_blocks);
        Ok(Submission::new(signed, payload.len(), submitted_at, mortality))
    }

    /// Wait until `submission` is final, failed, timed out, or cancelled.
    pub async fn await_finality(&self, submission: &Submission) -> Result<FinalityRecord> {
        let started = Instant::now();
        let limit = Duration::from_secs(self.finality.timeout_secs);
        let cancel = submission.cancellation();

        let result = tokio::select! {
            biased;
            _ = cancelled(cancel) => Err(Error::Cancelled),
            outcome = timeout(limit, self.poll(submission)) => match outcome {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout(self.finality.timeout_secs)),
            },
        };

        match &result {
            Ok(record) => {
                metrics::record_resolution("finalized");
                metrics::record_finality_latency(started.elapsed().as_secs_f64());
                tracing::info!(
                    tx_hash = %submission.tx_hash(),
                    block_height = record.block_height,
                    transaction_index = record.transaction_index,
                    "Submission finalized"
                );
            }
            Err(e) => {
                metrics::record_resolution(e.kind());
                tracing::warn!(tx_hash = %submission.tx_hash(), error = %e, "Finality not reached");
            }
        }
        result
    }

    async fn poll(&self, submission: &Submission) -> Result<FinalityRecord> {
        let interval = Duration::from_millis(self.finality.poll_interval_ms);
        let mut backoff = Backoff::from_config(&self.finality);

        loop {
            match self.check(submission).await {
                Ok(ConfirmationStatus::Confirmed(record)) => return Ok(record),
                Ok(ConfirmationStatus::Failed(reason)) => return Err(Error::Rejected(reason)),
                Ok(status) => {
                    if let ConfirmationStatus::Confirming { current, target } = status {
                        tracing::debug!(tx_hash = %submission.tx_hash(), current, target, "Waiting for finality");
                    }
                    backoff.reset();
                    sleep(interval).await;
                }
                Err(e @ Error::NotFound(_)) => return Err(e),
                Err(e) => match backoff.fail() {
                    Some(delay) => {
                        tracing::warn!(
                            tx_hash = %submission.tx_hash(),
                            failures = backoff.failures(),
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Finality poll failed, backing off"
                        );
                        sleep(delay).await;
                    }
                    None => return Err(e),
                },
            }
        }
    }

    /// One finality check against the current chain view.
    pub async fn check(&self, submission: &Submission) -> Result<ConfirmationStatus> {
        let tx_hash = submission.tx_hash();

        // 1. Inclusion, or expiry of the mortality window
        let report = match self.rpc.inclusion(tx_hash).await? {
            Some(report) => report,
            None => {
                if let Some(window) = submission.mortality_blocks() {
                    let head = self.rpc.block_number().await?;
                    if head > submission.submitted_at().saturating_add(window) {
                        return Err(Error::NotFound(tx_hash.to_string()));
                    }
                }
                return Ok(ConfirmationStatus::Pending);
            }
        };

        // 2. Execution status
        if !report.success {
            return Ok(ConfirmationStatus::Failed(format!(
                "transaction {} reverted in block {}",
                tx_hash, report.block_number
            )));
        }

        // 3. Finality of the inclusion block
        match self.finality.mode {
            FinalityMode::Finalized => match self.rpc.finalized_block_number().await? {
                Some(finalized) if finalized >= report.block_number => {}
                finalized => {
                    return Ok(ConfirmationStatus::Confirming {
                        current: finalized.unwrap_or(0),
                        target: report.block_number,
                    })
                }
            },
            FinalityMode::Confirmations => {
                let head = self.rpc.block_number().await?;
                let target = report.block_number + u64::from(self.finality.confirmation_blocks);
                if head < target {
                    return Ok(ConfirmationStatus::Confirming { current: head, target });
                }
            }
        }

        // 4. Reorg guard
        let canonical = self.rpc.block_hash(report.block_number).await?;
        if canonical != Some(report.block_hash) {
            tracing::debug!(
                tx_hash = %tx_hash,
                block_number = report.block_number,
                "Inclusion block no longer canonical"
            );
            return Ok(ConfirmationStatus::Pending);
        }

        Ok(ConfirmationStatus::Confirmed(FinalityRecord::from(&report)))
    }
}

async fn cancelled(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|cancelled| *cancelled).await;
}

fn into_broadcast(error: Error) -> Error {
    match error {
        Error::Broadcast(_) => error,
        other => Error::Broadcast(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::mock::MockLedger;

    const TEST_MNEMONIC: &str = "test test test test test test test test test test test junk";

    fn config() -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.finality.poll_interval_ms = 5;
        config.finality.timeout_secs = 5;
        config.finality.backoff_base_ms = 1;
        config.finality.backoff_max_ms = 5;
        config
    }

    fn setup(config: &BridgeConfig) -> (Arc<MockLedger>, FinalityTracker, Signer) {
        let ledger = Arc::new(MockLedger::new());
        let tracker = FinalityTracker::new(ledger.clone(), 31337, config).unwrap();
        (ledger, tracker, Signer::derive(TEST_MNEMONIC).unwrap())
    }

    #[tokio::test]
    async fn test_submit_encodes_app_data() {
        let (ledger, tracker, signer) = setup(&config());
        let submission = tracker.submit(&signer, b"Hello", &SubmitOptions::new(2)).await.unwrap();

        let sent = ledger.broadcasts();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].hash, submission.tx_hash());
        assert_eq!(sent[0].app_id, 2);
        assert_eq!(sent[0].payload, b"Hello");
        assert_eq!(sent[0].to, Some(signer.address()));
        assert_eq!(submission.payload_len(), 5);
    }

    #[tokio::test]
    async fn test_nonces_advance() {
        let (ledger, tracker, signer) = setup(&config());
        for _ in 0..3 {
            tracker.submit(&signer, b"x", &SubmitOptions::new(0)).await.unwrap();
        }
        let nonces: Vec<u64> = ledger.broadcasts().iter().map(|tx| tx.nonce).collect();
        assert_eq!(nonces, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_broadcast_failure_returns_nonce() {
        let (ledger, tracker, signer) = setup(&config());
        ledger.reject_broadcasts(Some("insufficient funds".to_string()));

        let err = tracker.submit(&signer, b"x", &SubmitOptions::new(0)).await.unwrap_err();
        assert!(matches!(err, Error::Broadcast(ref m) if m.contains("insufficient funds")));
        assert_eq!(tracker.nonces().peek(signer.address()), Some(0));

        ledger.reject_broadcasts(None);
        tracker.submit(&signer, b"x", &SubmitOptions::new(0)).await.unwrap();
        assert_eq!(ledger.broadcasts()[0].nonce, 0);
    }

    #[tokio::test]
    async fn test_signers_of_one_seed_share_nonces() {
        let (ledger, tracker, first) = setup(&config());
        let second = Signer::derive(TEST_MNEMONIC).unwrap();

        tracker.submit(&first, b"same", &SubmitOptions::new(0)).await.unwrap();
        tracker.submit(&second, b"same", &SubmitOptions::new(0)).await.unwrap();
        tracker.submit(&first, b"same", &SubmitOptions::new(0)).await.unwrap();

        let nonces: Vec<u64> = ledger.broadcasts().iter().map(|tx| tx.nonce).collect();
        assert_eq!(nonces, vec![0, 1, 2]);
        assert_eq!(tracker.nonces().peek(first.address()), Some(3));
    }

    #[tokio::test]
    async fn test_already_known_counts_as_accepted() {
        let (ledger, tracker, signer) = setup(&config());
        let options = SubmitOptions::new(4).nonce(0);

        let first = tracker.submit(&signer, b"again", &options).await.unwrap();
        let second = tracker.submit(&signer, b"again", &options).await.unwrap();
        assert_eq!(first.tx_hash(), second.tx_hash());
        assert_eq!(ledger.broadcasts().len(), 1);
        assert_eq!(tracker.nonces().peek(signer.address()), None);
    }

    #[tokio::test]
    async fn test_gas_price_cap() {
        let (ledger, tracker, signer) = setup(&config());
        ledger.set_gas_price(1_000 * WEI_PER_GWEI);

        let err = tracker.submit(&signer, b"x", &SubmitOptions::new(0)).await.unwrap_err();
        assert!(matches!(err, Error::Broadcast(ref m) if m.contains("exceeds cap")));
        assert!(ledger.broadcasts().is_empty());
    }

    #[tokio::test]
    async fn test_finalized_mode() {
        let (_ledger, tracker, signer) = setup(&config());
        let submission = tracker.submit(&signer, b"data", &SubmitOptions::new(1)).await.unwrap();

        let record = tracker.await_finality(&submission).await.unwrap();
        assert_eq!(record.transaction_hash, submission.tx_hash());
        assert!(record.block_height > submission.submitted_at());
    }

    #[tokio::test]
    async fn test_confirmations_mode() {
        let mut config = config();
        config.finality.mode = FinalityMode::Confirmations;
        config.finality.confirmation_blocks = 4;
        let (ledger, tracker, signer) = setup(&config);

        let submission = tracker.submit(&signer, b"data", &SubmitOptions::new(1)).await.unwrap();
        let record = tracker.await_finality(&submission).await.unwrap();
        assert!(ledger.head() >= record.block_height + 4);
    }

    #[tokio::test]
    async fn test_reverted_is_rejected() {
        let (ledger, tracker, signer) = setup(&config());
        ledger.revert_all(true);

        let submission = tracker.submit(&signer, b"data", &SubmitOptions::new(1)).await.unwrap();
        let err = tracker.await_finality(&submission).await.unwrap_err();
        assert!(matches!(err, Error::Rejected(_)));
    }

    #[tokio::test]
    async fn test_dropped_is_not_found() {
        let (ledger, tracker, signer) = setup(&config());
        ledger.drop_all(true);

        let options = SubmitOptions::new(1).mortality_blocks(3);
        let submission = tracker.submit(&signer, b"data", &options).await.unwrap();
        let err = tracker.await_finality(&submission).await.unwrap_err();
        assert_eq!(err, Error::NotFound(submission.tx_hash().to_string()));
    }

    #[tokio::test]
    async fn test_transient_failures_back_off() {
        let (ledger, tracker, signer) = setup(&config());
        let submission = tracker.submit(&signer, b"data", &SubmitOptions::new(1)).await.unwrap();

        ledger.fail_next_polls(3);
        assert!(tracker.await_finality(&submission).await.is_ok());
    }

    #[tokio::test]
    async fn test_failure_budget_exhausted() {
        let mut config = config();
        config.finality.max_rpc_failures = 2;
        let (ledger, tracker, signer) = setup(&config);
        let submission = tracker.submit(&signer, b"data", &SubmitOptions::new(1)).await.unwrap();

        ledger.fail_next_polls(10);
        let err = tracker.await_finality(&submission).await.unwrap_err();
        assert!(matches!(err, Error::Rpc(_)));
    }

    #[tokio::test]
    async fn test_reorged_block_times_out() {
        let mut config = config();
        config.finality.timeout_secs = 1;
        let (ledger, tracker, signer) = setup(&config);
        let submission = tracker.submit(&signer, b"data", &SubmitOptions::new(1)).await.unwrap();

        // Block the transaction will land in.
        ledger.reorg_block(ledger.head() + 1);
        let err = tracker.await_finality(&submission).await.unwrap_err();
        assert_eq!(err, Error::Timeout(1));
    }

    #[tokio::test]
    async fn test_cancel_aborts_wait() {
        let mut config = config();
        config.submission.mortality_blocks = None;
        let (ledger, tracker, signer) = setup(&config);
        ledger.drop_all(true);

        let submission = Arc::new(tracker.submit(&signer, b"data", &SubmitOptions::new(1)).await.unwrap());
        let waiter = {
            let tracker = tracker.clone();
            let submission = submission.clone();
            tokio::spawn(async move { tracker.await_finality(&submission).await })
        };

        sleep(Duration::from_millis(30)).await;
        submission.cancel();
        assert_eq!(waiter.await.unwrap().unwrap_err(), Error::Cancelled);
    }

    #[test]
    fn test_invalid_sink_address() {
        let mut config = config();
        config.submission.sink_address = Some("not-an-address".to_string());
        let err = FinalityTracker::new(Arc::new(MockLedger::new()), 1, &config).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
