//! Submitted transactions and their cached outcome.
//!
//! # Responsibilities
//! - Hold the signed transaction and where in the chain it was submitted
//! - Cache the terminal outcome so repeated resolves never re-wait
//! - Serialize concurrent resolves of the same submission
//! - Carry the cancellation signal for an in-flight wait
//!
//! # Design Decisions
//! - The state lock is a `tokio::sync::Mutex`: a resolve holds it across the
//!   whole finality wait, so a second caller simply waits for the first
//! - Only terminal failures are cached; an exhausted RPC retry budget leaves
//!   the submission `Sent` and a later resolve may try again

use alloy::primitives::TxHash;
use tokio::sync::{watch, Mutex};

use crate::blockchain::transaction::FinalityTracker;
use crate::blockchain::types::{FinalityRecord, SignedTransaction};
use crate::error::{Error, Result};
use crate::registry::Handle;

/// Lifecycle of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionState {
    /// Broadcast, outcome not yet known.
    Sent,
    /// Reached finality; the record lives under `receipt`.
    Finalized { receipt: Handle },
    /// Terminal failure, replayed to every later resolve.
    Failed(Error),
}

/// A data payload accepted by the network.
#[derive(Debug)]
pub struct Submission {
    transaction: SignedTransaction,
    payload_len: usize,
    /// Head height observed just before broadcast.
    submitted_at: u64,
    mortality_blocks: Option<u64>,
    state: Mutex<SubmissionState>,
    cancel: watch::Sender<bool>,
}

impl Submission {
    pub fn new(
        transaction: SignedTransaction,
        payload_len: usize,
        submitted_at: u64,
        mortality_blocks: Option<u64>,
    ) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            transaction,
            payload_len,
            submitted_at,
            mortality_blocks,
            state: Mutex::new(SubmissionState::Sent),
            cancel,
        }
    }

    pub fn tx_hash(&self) -> TxHash {
        self.transaction.hash
    }

    pub fn transaction(&self) -> &SignedTransaction {
        &self.transaction
    }

    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    pub fn submitted_at(&self) -> u64 {
        self.submitted_at
    }

    pub fn mortality_blocks(&self) -> Option<u64> {
        self.mortality_blocks
    }

    /// Abort the current wait for finality, and any later one.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
        tracing::info!(tx_hash = %self.tx_hash(), "Submission cancelled");
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Receiver that observes [`Submission::cancel`].
    pub fn cancellation(&self) -> watch::Receiver<bool> {
        self.cancel.subscribe()
    }

    /// Snapshot of the current state. Waits for an in-flight resolve.
    pub async fn state(&self) -> SubmissionState {
        self.state.lock().await.clone()
    }

    /// Drive the submission to its outcome exactly once.
    ///
    /// `is_live` reports whether a previously published receipt handle is
    /// still registered; `publish` registers a fresh finality record and is
    /// called at most once per submission.
    pub async fn resolve<L, P>(&self, tracker: &FinalityTracker, is_live: L, publish: P) -> Result<Handle>
    where
        L: Fn(Handle) -> bool,
        P: FnOnce(FinalityRecord) -> Result<Handle>,
    {
        let mut state = self.state.lock().await;

        match &*state {
            SubmissionState::Finalized { receipt } if is_live(*receipt) => return Ok(*receipt),
            SubmissionState::Finalized { .. } => {
                return Err(Error::AlreadyResolved(self.tx_hash().to_string()))
            }
            SubmissionState::Failed(e) => return Err(e.clone()),
            SubmissionState::Sent => {}
        }

        match tracker.await_finality(self).await {
            Ok(record) => {
                // Registration failure leaves the submission Sent.
                let receipt = publish(record)?;
                *state = SubmissionState::Finalized { receipt };
                Ok(receipt)
            }
            Err(e) => {
                if is_terminal(&e) {
                    *state = SubmissionState::Failed(e.clone());
                }
                Err(e)
            }
        }
    }
}

fn is_terminal(error: &Error) -> bool {
    matches!(
        error,
        Error::Timeout(_) | Error::Rejected(_) | Error::NotFound(_) | Error::Cancelled
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, Bytes, B256};

    fn submission() -> Submission {
        let transaction = SignedTransaction {
            hash: B256::repeat_byte(0x11),
            raw: Bytes::from_static(&[1, 2, 3]),
            sender: Address::ZERO,
            nonce: 0,
            app_id: 2,
        };
        Submission::new(transaction, 17, 100, Some(64))
    }

    #[test]
    fn test_accessors() {
        let submission = submission();
        assert_eq!(submission.tx_hash(), B256::repeat_byte(0x11));
        assert_eq!(submission.payload_len(), 17);
        assert_eq!(submission.submitted_at(), 100);
        assert_eq!(submission.mortality_blocks(), Some(64));
    }

    #[tokio::test]
    async fn test_cancel_is_sticky() {
        let submission = submission();
        let rx = submission.cancellation();
        assert!(!submission.is_cancelled());

        submission.cancel();
        assert!(submission.is_cancelled());
        assert!(*rx.borrow());
        // Receivers created after the cancel still see it.
        assert!(*submission.cancellation().borrow());
        assert_eq!(submission.state().await, SubmissionState::Sent);
    }

    #[test]
    fn test_terminal_errors() {
        assert!(is_terminal(&Error::Timeout(1)));
        assert!(is_terminal(&Error::Cancelled));
        assert!(is_terminal(&Error::Rejected("reverted".into())));
        assert!(!is_terminal(&Error::Rpc("down".into())));
        assert!(!is_terminal(&Error::Allocation("full".into())));
    }
}
