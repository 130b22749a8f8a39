//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

use alloy::primitives::{Address, TxHash, B256};
use async_trait::async_trait;
use ledger_bridge::blockchain::{InclusionReport, LedgerRpc};
use ledger_bridge::{BridgeConfig, MockLedger, Result, Session};

/// Reference mnemonic of the demo flow.
pub const REFERENCE_SEED: &str = "bottom drive obey lake curtain smoke basket hold race lonely fit walk";
pub const REFERENCE_PAYLOAD: &[u8] = b"Hello from Python";
pub const REFERENCE_APP_ID: i32 = 2;

/// Anvil's default mnemonic; `//1`, `//2`... select further accounts.
pub const TEST_MNEMONIC: &str = "test test test test test test test test test test test junk";

/// Configuration that polls the in-memory ledger quickly.
pub fn fast_config() -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.finality.poll_interval_ms = 5;
    config.finality.timeout_secs = 10;
    config.finality.backoff_base_ms = 1;
    config.finality.backoff_max_ms = 5;
    config.runtime.worker_threads = 2;
    config
}

/// A session over a fresh in-memory ledger.
pub fn mock_session() -> (Arc<MockLedger>, Session) {
    mock_session_with(fast_config())
}

pub fn mock_session_with(config: BridgeConfig) -> (Arc<MockLedger>, Session) {
    let ledger = Arc::new(MockLedger::new());
    let session = Session::with_rpc(ledger.clone(), config).expect("mock session");
    (ledger, session)
}

/// An in-memory ledger whose pending nonce counts broadcasts, as a node's
/// pool would for a single account.
///
/// The first `rendezvous` nonce queries wait for each other, so concurrent
/// submitters all read the same pool state before any of them broadcasts.
#[derive(Debug)]
pub struct PoolLedger {
    pub inner: Arc<MockLedger>,
    barrier: Barrier,
    rendezvous: usize,
    arrivals: AtomicUsize,
}

impl PoolLedger {
    pub fn new(rendezvous: usize) -> Self {
        Self {
            inner: Arc::new(MockLedger::new()),
            barrier: Barrier::new(rendezvous),
            rendezvous,
            arrivals: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LedgerRpc for PoolLedger {
    async fn chain_id(&self) -> Result<u64> {
        self.inner.chain_id().await
    }

    async fn block_number(&self) -> Result<u64> {
        self.inner.block_number().await
    }

    async fn finalized_block_number(&self) -> Result<Option<u64>> {
        self.inner.finalized_block_number().await
    }

    async fn block_hash(&self, number: u64) -> Result<Option<B256>> {
        self.inner.block_hash(number).await
    }

    async fn pending_nonce(&self, _address: Address) -> Result<u64> {
        let pool = self.inner.broadcasts().len() as u64;
        if self.arrivals.fetch_add(1, Ordering::SeqCst) < self.rendezvous {
            self.barrier.wait();
        }
        Ok(pool)
    }

    async fn gas_price(&self) -> Result<u128> {
        self.inner.gas_price().await
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash> {
        self.inner.send_raw_transaction(raw).await
    }

    async fn inclusion(&self, tx_hash: TxHash) -> Result<Option<InclusionReport>> {
        self.inner.inclusion(tx_hash).await
    }
}
