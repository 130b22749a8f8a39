//! The network capabilities the tracker depends on.
//!
//! [`LedgerClient`](crate::blockchain::LedgerClient) implements this over
//! JSON-RPC; [`MockLedger`](crate::blockchain::MockLedger) implements it in
//! memory.

use alloy::primitives::{Address, TxHash, B256};
use async_trait::async_trait;

use crate::blockchain::types::InclusionReport;
use crate::error::Result;

#[async_trait]
pub trait LedgerRpc: Send + Sync + std::fmt::Debug {
    async fn chain_id(&self) -> Result<u64>;

    /// Current head height.
    async fn block_number(&self) -> Result<u64>;

    /// Height of the latest finalized block, if the node reports one.
    async fn finalized_block_number(&self) -> Result<Option<u64>>;

    /// Canonical hash at `number`, if that block exists.
    async fn block_hash(&self, number: u64) -> Result<Option<B256>>;

    /// Nonce for the next transaction of `address`, counting the pool.
    async fn pending_nonce(&self, address: Address) -> Result<u64>;

    /// Current gas price in wei.
    async fn gas_price(&self) -> Result<u128>;

    /// Broadcast an encoded transaction. Fire-and-forget: returns once the
    /// node accepted it into its pool.
    ///
    /// An `Err` means the transaction was definitely not accepted. When the
    /// outcome is unknown (the request may have reached a pool) implementations
    /// return the local hash and leave the verdict to finality tracking.
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash>;

    /// Inclusion report for `tx_hash`, or `None` while it is unmined.
    async fn inclusion(&self, tx_hash: TxHash) -> Result<Option<InclusionReport>>;
}

/// Whether a broadcast rejection means the pool already holds the transaction.
pub fn is_already_known(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    ["already known", "known transaction", "already imported", "already in mempool"]
        .iter()
        .any(|pattern| message.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_known_replies() {
        assert!(is_already_known("already known"));
        assert!(is_already_known("server returned an error response: error code -32000: ALREADY KNOWN"));
        assert!(is_already_known("known transaction: 0x12ab"));
        assert!(is_already_known("Transaction already imported"));
        assert!(!is_already_known("nonce too low"));
        assert!(!is_already_known("insufficient funds for gas * price + value"));
        assert!(!is_already_known("replacement transaction underpriced"));
    }
}
