//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! RPC call while waiting for finality:
//!     → client.rs (per-request timeout, provider failover)
//!     → On failure: backoff.rs (delay with jitter, bounded failure budget)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Broadcasts are never retried by the poller (a failed broadcast is final)
//! - Jittered backoff prevents synchronized polling from many threads

pub mod backoff;

pub use backoff::{calculate_backoff, Backoff};
