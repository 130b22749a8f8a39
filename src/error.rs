//! Error taxonomy shared by the Rust API and the C ABI.
//!
//! Every variant maps to a stable negative code returned across the boundary
//! in place of a handle. Errors are `Clone` so a submission can cache its
//! terminal outcome and hand the same failure to every later caller.

use thiserror::Error;

/// Errors produced by the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Unknown, stale, or wrong-kind handle.
    #[error("invalid handle {0}")]
    InvalidHandle(i32),

    /// Seed did not parse as key material.
    #[error("invalid seed: {0}")]
    InvalidSeed(String),

    /// Endpoint unreachable or misconfigured at initialization.
    #[error("connection error: {0}")]
    Connection(String),

    /// Transaction rejected before it reached the pool.
    #[error("broadcast failed: {0}")]
    Broadcast(String),

    /// Finality was not observed in time.
    #[error("finality not observed after {0} seconds")]
    Timeout(u64),

    /// The chain executed and rejected the transaction.
    #[error("transaction rejected: {0}")]
    Rejected(String),

    /// The transaction never appeared within its mortality window.
    #[error("transaction {0} not found on chain")]
    NotFound(String),

    /// The submission finalized and its receipt has since been released.
    #[error("submission {0} already resolved")]
    AlreadyResolved(String),

    /// A boundary record could not be produced.
    #[error("record allocation failed: {0}")]
    Allocation(String),

    /// No client session installed.
    #[error("client not initialized")]
    NotInitialized,

    /// A client session is already installed.
    #[error("client already initialized")]
    AlreadyInitialized,

    /// Null pointer, bad UTF-8, negative app id and similar caller mistakes.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The wait for finality was cancelled.
    #[error("submission cancelled")]
    Cancelled,

    /// Configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// RPC request failed on every provider.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// Signing a transaction or message failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// The handle table has no free slot.
    #[error("handle registry is full")]
    RegistryFull,

    /// Pointer was not produced by `receipt_new` or was already freed.
    #[error("unknown record pointer {0:#x}")]
    UnknownRecord(usize),

    /// A panic was contained at the boundary.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable code returned across the C ABI.
    pub fn code(&self) -> i32 {
        match self {
            Error::InvalidHandle(_) => -1,
            Error::InvalidSeed(_) => -2,
            Error::Connection(_) => -3,
            Error::Broadcast(_) => -4,
            Error::Timeout(_) => -5,
            Error::Rejected(_) => -6,
            Error::NotFound(_) => -7,
            Error::AlreadyResolved(_) => -8,
            Error::Allocation(_) => -9,
            Error::NotInitialized => -10,
            Error::InvalidArgument(_) => -11,
            Error::Cancelled => -12,
            Error::Config(_) => -13,
            Error::Rpc(_) => -14,
            Error::Signing(_) => -15,
            Error::RegistryFull => -16,
            Error::UnknownRecord(_) => -17,
            Error::AlreadyInitialized => -18,
            Error::Internal(_) => -99,
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidHandle(_) => "invalid_handle",
            Error::InvalidSeed(_) => "invalid_seed",
            Error::Connection(_) => "connection",
            Error::Broadcast(_) => "broadcast",
            Error::Timeout(_) => "timeout",
            Error::Rejected(_) => "rejected",
            Error::NotFound(_) => "not_found",
            Error::AlreadyResolved(_) => "already_resolved",
            Error::Allocation(_) => "allocation",
            Error::NotInitialized => "not_initialized",
            Error::AlreadyInitialized => "already_initialized",
            Error::InvalidArgument(_) => "invalid_argument",
            Error::Cancelled => "cancelled",
            Error::Config(_) => "config",
            Error::Rpc(_) => "rpc",
            Error::Signing(_) => "signing",
            Error::RegistryFull => "registry_full",
            Error::UnknownRecord(_) => "unknown_record",
            Error::Internal(_) => "internal",
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_negative_and_distinct() {
        let all = [
            Error::InvalidHandle(1),
            Error::InvalidSeed(String::new()),
            Error::Connection(String::new()),
            Error::Broadcast(String::new()),
            Error::Timeout(1),
            Error::Rejected(String::new()),
            Error::NotFound(String::new()),
            Error::AlreadyResolved(String::new()),
            Error::Allocation(String::new()),
            Error::NotInitialized,
            Error::AlreadyInitialized,
            Error::InvalidArgument(String::new()),
            Error::Cancelled,
            Error::Config(String::new()),
            Error::Rpc(String::new()),
            Error::Signing(String::new()),
            Error::RegistryFull,
            Error::UnknownRecord(0),
            Error::Internal(String::new()),
        ];
        let mut codes: Vec<i32> = all.iter().map(Error::code).collect();
        assert!(codes.iter().all(|c| *c < 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }

    #[test]
    fn test_error_display() {
        let err = Error::Timeout(30);
        assert_eq!(err.to_string(), "finality not observed after 30 seconds");

        let err = Error::UnknownRecord(0x10);
        assert_eq!(err.to_string(), "unknown record pointer 0x10");
    }
}
