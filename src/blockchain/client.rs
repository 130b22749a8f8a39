//! Ledger RPC client with timeout and failover handling.
//!
//! # Responsibilities
//! - Connect to a JSON-RPC endpoint plus optional failover endpoints
//! - Verify reachability and chain ID at initialization
//! - Broadcast raw transactions and look up receipts
//! - Bound every call with the configured timeout
//!
//! # Design Decisions
//! - Reads fail over to the next provider on error or timeout
//! - Broadcasts fail over only on a definite error. After a timeout the
//!   primary may already hold the transaction, so the client reports the
//!   local hash and lets finality tracking decide

use alloy::eips::BlockNumberOrTag;
use alloy::network::ReceiptResponse as _;
use alloy::primitives::{keccak256, Address, TxHash, B256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::transports::TransportResult;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::blockchain::rpc::{is_already_known, LedgerRpc};
use crate::blockchain::types::InclusionReport;
use crate::config::RpcConfig;
use crate::error::{Error, Result};
use crate::observability::metrics;

type DynProvider = Arc<dyn Provider + Send + Sync>;

/// Parse an endpoint URL, accepting only HTTP(S).
pub fn parse_endpoint(endpoint: &str) -> Result<url::Url> {
    let url: url::Url = endpoint
        .parse()
        .map_err(|e| Error::Connection(format!("Invalid RPC URL '{}': {}", endpoint, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::Connection(format!(
            "Unsupported RPC scheme '{}' in '{}'",
            other, endpoint
        ))),
    }
}

/// JSON-RPC client wrapper with failover support.
#[derive(Clone)]
pub struct LedgerClient {
    /// List of providers (primary + failovers).
    providers: Vec<DynProvider>,
    /// Primary endpoint, for diagnostics.
    endpoint: String,
    /// Request timeout duration.
    timeout_duration: Duration,
}

impl LedgerClient {
    /// Create a client and, when configured, verify the endpoint answers.
    ///
    /// An unreachable endpoint or a chain ID other than `config.chain_id`
    /// fails with [`Error::Connection`].
    pub async fn connect(endpoint: &str, config: &RpcConfig) -> Result<Self> {
        let mut providers = Vec::new();

        // 1. Primary provider
        let primary_url = parse_endpoint(endpoint)?;
        providers.push(Arc::new(ProviderBuilder::new().connect_http(primary_url)) as DynProvider);

        // 2. Failover providers
        for url_str in &config.failover_urls {
            match parse_endpoint(url_str) {
                Ok(url) => providers.push(Arc::new(ProviderBuilder::new().connect_http(url)) as DynProvider),
                Err(_) => tracing::warn!(url = %url_str, "Ignoring invalid failover RPC URL"),
            }
        }

        let client = Self {
            providers,
            endpoint: endpoint.to_string(),
            timeout_duration: Duration::from_secs(config.timeout_secs),
        };

        if config.verify_on_connect {
            client.verify(config.chain_id).await?;
        }

        tracing::info!(
            rpc_url = %endpoint,
            failovers = client.providers.len() - 1,
            "Ledger client initialized"
        );
        Ok(client)
    }

    async fn verify(&self, expected_chain_id: Option<u64>) -> Result<()> {
        let chain_id = self
            .chain_id()
            .await
            .map_err(|e| Error::Connection(format!("Endpoint {} unreachable: {}", self.endpoint, e)))?;

        if let Some(expected) = expected_chain_id {
            if chain_id != expected {
                return Err(Error::Connection(format!(
                    "Chain ID mismatch: expected {}, got {}",
                    expected, chain_id
                )));
            }
        }
        Ok(())
    }

    /// Run `op` against each provider in turn until one answers in time.
    async fn call<T, F, Fut>(&self, method: &'static str, op: F) -> Result<T>
    where
        T: Send,
        F: Fn(DynProvider) -> Fut + Send + Sync,
        Fut: Future<Output = TransportResult<T>> + Send,
    {
        let mut last_error = String::from("no providers configured");
        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, op(provider.clone())).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => {
                    tracing::warn!(provider_idx = i, method, error = %e, "RPC error, trying next provider");
                    last_error = e.to_string();
                }
                Err(_) => {
                    tracing::warn!(provider_idx = i, method, "RPC timeout, trying next provider");
                    last_error = format!("timed out after {:?}", self.timeout_duration);
                }
            }
        }
        metrics::record_rpc_failure(method);
        Err(Error::Rpc(format!("All providers failed to {}: {}", method, last_error)))
    }
}

#[async_trait]
impl LedgerRpc for LedgerClient {
    async fn chain_id(&self) -> Result<u64> {
        self.call("get_chain_id", |p| async move { p.get_chain_id().await })
            .await
    }

    async fn block_number(&self) -> Result<u64> {
        self.call("get_block_number", |p| async move { p.get_block_number().await })
            .await
    }

    async fn finalized_block_number(&self) -> Result<Option<u64>> {
        let block = self
            .call("get_finalized_block", |p| async move {
                p.get_block_by_number(BlockNumberOrTag::Finalized).await
            })
            .await?;
        Ok(block.map(|b| b.header.number))
    }

    async fn block_hash(&self, number: u64) -> Result<Option<B256>> {
        let block = self
            .call("get_block_by_number", |p| async move {
                p.get_block_by_number(BlockNumberOrTag::Number(number)).await
            })
            .await?;
        Ok(block.map(|b| b.header.hash))
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64> {
        self.call("get_transaction_count", |p| async move {
            p.get_transaction_count(address).pending().await
        })
        .await
    }

    async fn gas_price(&self) -> Result<u128> {
        self.call("get_gas_price", |p| async move { p.get_gas_price().await })
            .await
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash> {
        let local_hash = keccak256(raw);
        let mut last_error = String::from("no providers configured");

        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, provider.send_raw_transaction(raw)).await {
                Ok(Ok(pending)) => return Ok(*pending.tx_hash()),
                Ok(Err(e)) if is_already_known(&e.to_string()) => {
                    tracing::info!(provider_idx = i, tx_hash = %local_hash, "Transaction already in pool");
                    return Ok(local_hash);
                }
                Ok(Err(e)) => {
                    tracing::warn!(provider_idx = i, error = %e, "Broadcast rejected, trying next provider");
                    last_error = e.to_string();
                }
                Err(_) => {
                    // The bytes may already sit in this provider's pool
                    tracing::warn!(
                        provider_idx = i,
                        tx_hash = %local_hash,
                        timeout_ms = self.timeout_duration.as_millis() as u64,
                        "Broadcast outcome unknown, tracking transaction"
                    );
                    metrics::record_rpc_failure("send_raw_transaction_timeout");
                    return Ok(local_hash);
                }
            }
        }
        metrics::record_rpc_failure("send_raw_transaction");
        Err(Error::Broadcast(format!("All providers rejected transaction: {}", last_error)))
    }

    async fn inclusion(&self, tx_hash: TxHash) -> Result<Option<InclusionReport>> {
        let receipt = self
            .call("get_transaction_receipt", |p| async move {
                p.get_transaction_receipt(tx_hash).await
            })
            .await?;

        // Receipts without a block position belong to pending blocks.
        Ok(receipt.and_then(|r| {
            Some(InclusionReport {
                block_number: r.block_number?,
                block_hash: r.block_hash?,
                transaction_index: r.transaction_index?,
                transaction_hash: r.transaction_hash,
                success: r.status(),
            })
        }))
    }
}

impl std::fmt::Debug for LedgerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerClient")
            .field("rpc_url", &self.endpoint)
            .field("providers", &self.providers.len())
            .field("timeout", &self.timeout_duration)
            .finish()
    }
}
