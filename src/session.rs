//! Process-scoped client session.
//!
//! # Responsibilities
//! - Own the async runtime, ledger client, handle registry and record ledger
//! - Expose every boundary operation as a blocking call over the runtime
//! - Keep the registry consistent: objects are registered only after every
//!   fallible step of an operation succeeded
//!
//! # Data Flow
//! ```text
//! initialize_signer(seed)        → Signer        → registry (signer handle)
//! sign_message(signer, message)  → Signature
//! submit_data(signer, payload)   → tracker.submit → registry (submission handle)
//! transaction_receipt(sub)       → Submission::resolve → registry (receipt handle)
//! receipt_new(receipt)           → RecordLedger (caller-owned pointer)
//! ```
//!
//! # Design Decisions
//! - Calls block on a multi-threaded runtime, so host threads may call in
//!   concurrently; must not be called from inside an async context
//! - The session never touches the network after construction except on
//!   behalf of a call

use std::net::SocketAddr;
use std::ptr::NonNull;
use std::sync::Arc;

use alloy::primitives::Signature;
use tokio::runtime::{Builder, Runtime};

use crate::blockchain::types::{FinalityRecord, SubmitOptions};
use crate::blockchain::{FinalityTracker, LedgerClient, LedgerRpc, Signer, Submission};
use crate::bridge::record::{Receipt, RecordLedger};
use crate::config::validation::validate_config;
use crate::config::{BridgeConfig, ConfigError};
use crate::error::{Error, Result};
use crate::observability::metrics;
use crate::registry::{Handle, HandleRegistry, Object, ObjectKind};

/// Everything one initialized client owns.
pub struct Session {
    runtime: Runtime,
    tracker: FinalityTracker,
    registry: HandleRegistry,
    records: RecordLedger,
    endpoint: String,
}

impl Session {
    /// Connect to `endpoint` over JSON-RPC.
    pub fn connect(endpoint: &str, config: BridgeConfig) -> Result<Self> {
        validate_config(&config).map_err(|errors| Error::from(ConfigError::Validation(errors)))?;
        let runtime = build_runtime(&config)?;
        let client = runtime.block_on(LedgerClient::connect(endpoint, &config.rpc))?;
        Self::assemble(runtime, Arc::new(client), endpoint, config)
    }

    /// Build a session over any [`LedgerRpc`], e.g. a [`MockLedger`](crate::blockchain::MockLedger).
    pub fn with_rpc(rpc: Arc<dyn LedgerRpc>, config: BridgeConfig) -> Result<Self> {
        validate_config(&config).map_err(|errors| Error::from(ConfigError::Validation(errors)))?;
        let runtime = build_runtime(&config)?;
        Self::assemble(runtime, rpc, "in-process", config)
    }

    fn assemble(runtime: Runtime, rpc: Arc<dyn LedgerRpc>, endpoint: &str, config: BridgeConfig) -> Result<Self> {
        // 1. Chain ID, from config or from the node
        let chain_id = match config.rpc.chain_id {
            Some(id) => id,
            None => runtime
                .block_on(rpc.chain_id())
                .map_err(|e| Error::Connection(format!("Failed to query chain ID: {}", e)))?,
        };

        // 2. Metrics exporter (needs the runtime for its listener)
        if let Some(addr) = &config.observability.metrics_address {
            let addr: SocketAddr = addr
                .parse()
                .map_err(|e| Error::Config(format!("Invalid metrics address '{}': {}", addr, e)))?;
            let _guard = runtime.enter();
            metrics::init_metrics(addr);
        }

        let tracker = FinalityTracker::new(rpc, chain_id, &config)?;

        tracing::info!(
            endpoint = %endpoint,
            chain_id,
            finality_mode = ?config.finality.mode,
            worker_threads = config.runtime.worker_threads,
            "Session initialized"
        );

        Ok(Self {
            runtime,
            tracker,
            registry: HandleRegistry::new(),
            records: RecordLedger::new(),
            endpoint: endpoint.to_string(),
        })
    }

    /// Derive a signer from `seed` and register it.
    pub fn initialize_signer(&self, seed: &str) -> Result<Handle> {
        let signer = Signer::derive(seed)?;
        self.registry.register(Object::Signer(Arc::new(signer)))
    }

    /// Sign `message` (Ethereum-prefixed) with the signer behind `signer`.
    ///
    /// Handles derived from equal seeds return equal signatures.
    pub fn sign_message(&self, signer: Handle, message: &[u8]) -> Result<Signature> {
        let signer = self.registry.signer(signer)?;
        self.runtime.block_on(signer.sign_message(message))
    }

    /// Submit `payload` under `app_id` with the signer behind `signer`.
    pub fn submit_data(&self, signer: Handle, payload: &[u8], app_id: i32) -> Result<Handle> {
        let app_id = u32::try_from(app_id)
            .map_err(|_| Error::InvalidArgument(format!("application id {} is negative", app_id)))?;
        self.submit_with_options(signer, payload, SubmitOptions::new(app_id))
    }

    /// [`Session::submit_data`] with an explicit nonce or mortality window.
    pub fn submit_with_options(&self, signer: Handle, payload: &[u8], options: SubmitOptions) -> Result<Handle> {
        let signer = self.registry.signer(signer)?;
        let submission = self
            .runtime
            .block_on(self.tracker.submit(&signer, payload, &options))?;
        let tx_hash = submission.tx_hash();

        self.registry
            .register(Object::Submission(Arc::new(submission)))
            .inspect_err(|e| {
                tracing::warn!(tx_hash = %tx_hash, error = %e, "Broadcast submission could not be registered");
            })
    }

    /// Block until the submission behind `submission` is final and return a
    /// receipt handle. Repeated calls return the same handle.
    pub fn transaction_receipt(&self, submission: Handle) -> Result<Handle> {
        let submission = self.registry.submission(submission)?;
        self.runtime.block_on(submission.resolve(
            &self.tracker,
            |receipt| self.registry.receipt(receipt).is_ok(),
            |record| self.registry.register(Object::Receipt(Arc::new(record))),
        ))
    }

    /// Abort an in-flight or future wait on `submission`.
    pub fn cancel_submission(&self, submission: Handle) -> Result<()> {
        self.registry.submission(submission)?.cancel();
        Ok(())
    }

    pub fn submission(&self, submission: Handle) -> Result<Arc<Submission>> {
        self.registry.submission(submission)
    }

    /// The finality record behind `receipt`.
    pub fn receipt(&self, receipt: Handle) -> Result<FinalityRecord> {
        self.registry.receipt(receipt).map(|record| *record)
    }

    /// Allocate a caller-owned boundary record for `receipt`.
    pub fn receipt_new(&self, receipt: Handle) -> Result<NonNull<Receipt>> {
        let record = self.registry.receipt(receipt)?;
        self.records.materialize(receipt, &record)
    }

    /// Free a record from [`Session::receipt_new`]. The receipt handle stays live.
    pub fn receipt_free(&self, ptr: *mut Receipt) -> Result<()> {
        self.records.release(ptr)
    }

    /// Read an outstanding boundary record.
    pub fn with_record<T>(&self, ptr: *const Receipt, f: impl FnOnce(&Receipt) -> T) -> Result<T> {
        self.records.with_record(ptr, f)
    }

    pub fn release_signer(&self, signer: Handle) -> Result<()> {
        self.registry.release_kind(signer, ObjectKind::Signer).map(|_| ())
    }

    /// Release a submission handle. A wait still in flight is cancelled.
    pub fn release_submission(&self, submission: Handle) -> Result<()> {
        if let Object::Submission(submission) = self.registry.release_kind(submission, ObjectKind::Submission)? {
            submission.cancel();
        }
        Ok(())
    }

    /// Release a receipt handle. Later resolves of its submission report
    /// `AlreadyResolved`.
    pub fn release_receipt(&self, receipt: Handle) -> Result<()> {
        self.registry.release_kind(receipt, ObjectKind::Receipt).map(|_| ())
    }

    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    pub fn records(&self) -> &RecordLedger {
        &self.records
    }

    pub fn chain_id(&self) -> u64 {
        self.tracker.chain_id()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.endpoint)
            .field("chain_id", &self.chain_id())
            .field("live_handles", &self.registry.len())
            .field("outstanding_records", &self.records.outstanding())
            .finish()
    }
}

fn build_runtime(config: &BridgeConfig) -> Result<Runtime> {
    Builder::new_multi_thread()
        .worker_threads(config.runtime.worker_threads)
        .thread_name("ledger-bridge")
        .enable_all()
        .build()
        .map_err(|e| Error::Internal(format!("Failed to build runtime: {}", e)))
}
