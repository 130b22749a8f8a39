//! In-memory ledger for tests and offline runs.
//!
//! Every chain read (`block_number`, `finalized_block_number`, `inclusion`)
//! mines one block, so a polling loop always makes progress. Pending
//! transactions are included in the next mined block in broadcast order.
//! Failure modes are switched on through the control methods.

use alloy::consensus::{Transaction, TxEnvelope};
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::{keccak256, Address, TxHash, B256};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::blockchain::rpc::LedgerRpc;
use crate::blockchain::types::{decode_app_data, InclusionReport};
use crate::error::{Error, Result};

/// Chain ID reported by the mock (Anvil's default).
pub const MOCK_CHAIN_ID: u64 = 31337;

/// A transaction as the mock decoded it from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastTx {
    pub hash: TxHash,
    pub nonce: u64,
    pub app_id: u32,
    pub payload: Vec<u8>,
    pub to: Option<Address>,
}

#[derive(Debug)]
struct ChainState {
    head: u64,
    finality_lag: u64,
    gas_price: u128,
    pending: Vec<TxHash>,
    included: HashMap<TxHash, InclusionReport>,
    broadcasts: Vec<BroadcastTx>,
    orphaned: HashSet<u64>,
    reject: Option<String>,
    revert_all: bool,
    drop_all: bool,
    failing_polls: u32,
    unreachable: bool,
}

impl ChainState {
    fn mine(&mut self) {
        self.head += 1;
        let number = self.head;
        for (index, hash) in self.pending.drain(..).enumerate() {
            self.included.insert(
                hash,
                InclusionReport {
                    block_number: number,
                    block_hash: mined_hash(number),
                    transaction_index: index as u64,
                    transaction_hash: hash,
                    success: !self.revert_all,
                },
            );
        }
    }

    fn reachable(&self) -> Result<()> {
        if self.unreachable {
            return Err(Error::Rpc("connection refused".to_string()));
        }
        Ok(())
    }
}

/// Hash a block had when it was mined.
fn mined_hash(number: u64) -> B256 {
    keccak256(number.to_be_bytes())
}

/// Scriptable in-memory [`LedgerRpc`].
#[derive(Debug)]
pub struct MockLedger {
    state: Mutex<ChainState>,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    pub fn new() -> Self {
        Self::with_finality_lag(2)
    }

    /// Ledger whose finalized head trails the head by `lag` blocks.
    pub fn with_finality_lag(lag: u64) -> Self {
        Self {
            state: Mutex::new(ChainState {
                head: 0,
                finality_lag: lag,
                gas_price: 1_000_000_000,
                pending: Vec::new(),
                included: HashMap::new(),
                broadcasts: Vec::new(),
                orphaned: HashSet::new(),
                reject: None,
                revert_all: false,
                drop_all: false,
                failing_polls: 0,
                unreachable: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current head, without mining.
    pub fn head(&self) -> u64 {
        self.lock().head
    }

    /// Every accepted broadcast, in order.
    pub fn broadcasts(&self) -> Vec<BroadcastTx> {
        self.lock().broadcasts.clone()
    }

    /// Reject every broadcast with `reason`, or accept again with `None`.
    pub fn reject_broadcasts(&self, reason: Option<String>) {
        self.lock().reject = reason;
    }

    /// Mark transactions mined from now on as reverted.
    pub fn revert_all(&self, revert: bool) {
        self.lock().revert_all = revert;
    }

    /// Accept broadcasts but never include them.
    pub fn drop_all(&self, drop: bool) {
        self.lock().drop_all = drop;
    }

    /// Fail the next `count` inclusion lookups with an RPC error.
    pub fn fail_next_polls(&self, count: u32) {
        self.lock().failing_polls = count;
    }

    /// Fail every call with an RPC error.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    pub fn set_gas_price(&self, wei: u128) {
        self.lock().gas_price = wei;
    }

    /// Replace block `number` on the canonical chain, now or once it is mined.
    pub fn reorg_block(&self, number: u64) {
        self.lock().orphaned.insert(number);
    }
}

#[async_trait]
impl LedgerRpc for MockLedger {
    async fn chain_id(&self) -> Result<u64> {
        self.lock().reachable()?;
        Ok(MOCK_CHAIN_ID)
    }

    async fn block_number(&self) -> Result<u64> {
        let mut state = self.lock();
        state.reachable()?;
        state.mine();
        Ok(state.head)
    }

    async fn finalized_block_number(&self) -> Result<Option<u64>> {
        let mut state = self.lock();
        state.reachable()?;
        state.mine();
        Ok(state.head.checked_sub(state.finality_lag))
    }

    async fn block_hash(&self, number: u64) -> Result<Option<B256>> {
        let state = self.lock();
        state.reachable()?;
        if number > state.head {
            return Ok(None);
        }
        if state.orphaned.contains(&number) {
            return Ok(Some(keccak256(mined_hash(number))));
        }
        Ok(Some(mined_hash(number)))
    }

    async fn pending_nonce(&self, _address: Address) -> Result<u64> {
        self.lock().reachable()?;
        Ok(0)
    }

    async fn gas_price(&self) -> Result<u128> {
        let state = self.lock();
        state.reachable()?;
        Ok(state.gas_price)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash> {
        let mut state = self.lock();
        state.reachable()?;
        if let Some(reason) = &state.reject {
            return Err(Error::Broadcast(reason.clone()));
        }

        let envelope = TxEnvelope::decode_2718(&mut &raw[..])
            .map_err(|e| Error::Broadcast(format!("malformed transaction: {}", e)))?;
        let hash = keccak256(raw);
        if state.broadcasts.iter().any(|tx| tx.hash == hash) {
            return Err(Error::Broadcast("already known".to_string()));
        }

        let (app_id, payload) = decode_app_data(envelope.input())
            .ok_or_else(|| Error::Broadcast("calldata lacks an application id".to_string()))?;
        state.broadcasts.push(BroadcastTx {
            hash,
            nonce: envelope.nonce(),
            app_id,
            payload: payload.to_vec(),
            to: envelope.to(),
        });
        if !state.drop_all {
            state.pending.push(hash);
        }
        Ok(hash)
    }

    async fn inclusion(&self, tx_hash: TxHash) -> Result<Option<InclusionReport>> {
        let mut state = self.lock();
        state.reachable()?;
        if state.failing_polls > 0 {
            state.failing_polls -= 1;
            return Err(Error::Rpc("injected poll failure".to_string()));
        }
        state.mine();
        Ok(state.included.get(&tx_hash).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_mine_blocks() {
        let ledger = MockLedger::new();
        assert_eq!(ledger.block_number().await.unwrap(), 1);
        assert_eq!(ledger.finalized_block_number().await.unwrap(), Some(0));
        assert_eq!(ledger.head(), 2);
        assert_eq!(ledger.block_hash(2).await.unwrap(), Some(mined_hash(2)));
        assert_eq!(ledger.block_hash(3).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reorged_block_hash_changes() {
        let ledger = MockLedger::new();
        ledger.block_number().await.unwrap();
        ledger.reorg_block(1);
        assert_ne!(ledger.block_hash(1).await.unwrap(), Some(mined_hash(1)));
    }

    #[tokio::test]
    async fn test_malformed_broadcast() {
        let ledger = MockLedger::new();
        let err = ledger.send_raw_transaction(&[0xde, 0xad]).await.unwrap_err();
        assert!(matches!(err, Error::Broadcast(_)));
        assert!(ledger.broadcasts().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable() {
        let ledger = MockLedger::new();
        ledger.set_unreachable(true);
        assert!(matches!(ledger.chain_id().await, Err(Error::Rpc(_))));
        assert!(matches!(ledger.inclusion(B256::ZERO).await, Err(Error::Rpc(_))));
        ledger.set_unreachable(false);
        assert_eq!(ledger.chain_id().await.unwrap(), MOCK_CHAIN_ID);
    }

    #[tokio::test]
    async fn test_injected_poll_failures() {
        let ledger = MockLedger::new();
        ledger.fail_next_polls(2);
        assert!(ledger.inclusion(B256::ZERO).await.is_err());
        assert!(ledger.inclusion(B256::ZERO).await.is_err());
        assert_eq!(ledger.inclusion(B256::ZERO).await.unwrap(), None);
    }
}
