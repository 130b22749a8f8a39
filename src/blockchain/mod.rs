//! Ledger integration subsystem.
//!
//! # Data Flow
//! ```text
//! seed string
//!     → wallet.rs (key derivation, signing)
//! endpoint URL
//!     → client.rs (JSON-RPC with timeouts and failover) or mock.rs (in memory)
//!     → transaction.rs (prepare, sign, broadcast, track finality)
//!     → nonce.rs (per-account nonce allocation)
//!     → submission.rs (cached outcome per submission)
//! ```
//!
//! # Security Constraints
//! - Seeds and keys never leave wallet.rs and are never logged
//! - All RPC calls have configurable timeouts
//! - Every finality wait is bounded

pub mod client;
pub mod mock;
pub mod nonce;
pub mod rpc;
pub mod submission;
pub mod transaction;
pub mod types;
pub mod wallet;

pub use client::LedgerClient;
pub use mock::MockLedger;
pub use nonce::NonceBook;
pub use rpc::LedgerRpc;
pub use submission::{Submission, SubmissionState};
pub use transaction::FinalityTracker;
pub use types::{ConfirmationStatus, FinalityRecord, InclusionReport, SignedTransaction, SubmitOptions, TxParams};
pub use wallet::Signer;
