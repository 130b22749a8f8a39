//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the bridge.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the ledger bridge.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    /// RPC connection settings.
    pub rpc: RpcConfig,

    /// Transaction preparation settings.
    pub submission: SubmissionConfig,

    /// Finality tracking settings.
    pub finality: FinalityConfig,

    /// Internal async runtime settings.
    pub runtime: RuntimeConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// RPC connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RpcConfig {
    /// Failover JSON-RPC endpoint URLs, tried after the primary endpoint.
    pub failover_urls: Vec<String>,

    /// Expected chain ID. When unset, whatever the endpoint reports is used.
    pub chain_id: Option<u64>,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    /// Query the endpoint at initialization and fail if it is unreachable.
    pub verify_on_connect: bool,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            failover_urls: Vec::new(),
            chain_id: None,
            timeout_secs: 10,
            verify_on_connect: true,
        }
    }
}

/// Transaction preparation configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SubmissionConfig {
    /// Destination of data transactions. Defaults to the signer's own address.
    pub sink_address: Option<String>,

    /// Gas price multiplier (1.0 = estimated, 1.2 = 20% buffer).
    pub gas_price_multiplier: f64,

    /// Maximum gas price in gwei (protection against spikes).
    pub max_gas_price_gwei: u64,

    /// Blocks after submission within which an unseen transaction is still
    /// expected. `None` waits until the finality timeout.
    pub mortality_blocks: Option<u64>,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            sink_address: None,
            gas_price_multiplier: 1.2,
            max_gas_price_gwei: 500,
            mortality_blocks: Some(64),
        }
    }
}

/// How a block is judged final.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinalityMode {
    /// Wait for the chain's `finalized` head to pass the inclusion block.
    Finalized,
    /// Wait for a fixed number of blocks on top of the inclusion block.
    Confirmations,
}

/// Finality tracking configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct FinalityConfig {
    /// Finality rule.
    pub mode: FinalityMode,

    /// Number of blocks required in `confirmations` mode.
    pub confirmation_blocks: u32,

    /// Interval between receipt polls in milliseconds.
    pub poll_interval_ms: u64,

    /// Upper bound on a single resolve in seconds.
    pub timeout_secs: u64,

    /// Consecutive RPC failures tolerated while polling.
    pub max_rpc_failures: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub backoff_base_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub backoff_max_ms: u64,
}

impl Default for FinalityConfig {
    fn default() -> Self {
        Self {
            mode: FinalityMode::Finalized,
            confirmation_blocks: 3,
            poll_interval_ms: 2000,
            timeout_secs: 600,
            max_rpc_failures: 5,
            backoff_base_ms: 200,
            backoff_max_ms: 5000,
        }
    }
}

/// Internal runtime configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Worker threads driving network I/O.
    pub worker_threads: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { worker_threads: 2 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Prometheus endpoint bind address. Disabled when unset.
    pub metrics_address: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_address: None,
        }
    }
}
