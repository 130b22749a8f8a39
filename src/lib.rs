//! Ledger Bridge
//!
//! Handle-based client library that submits data payloads to an EVM ledger
//! and reports where they became final.
//!
//! # Architecture Overview
//!
//! ```text
//!   host caller
//!       │  int32 handles, C strings, receipt records
//!       ▼
//!  ┌─────────────┐    ┌─────────────┐    ┌──────────────────┐
//!  │   bridge    │───▶│   session   │───▶│     registry     │
//!  │ ffi + record│    │ runtime     │    │ signer/submission│
//!  └─────────────┘    └──────┬──────┘    │ /receipt handles │
//!                            │           └──────────────────┘
//!                            ▼
//!                    ┌───────────────┐    ┌──────────────┐
//!                    │  blockchain   │───▶│  LedgerRpc   │──▶ node
//!                    │ signer,tracker│    │ client / mock│
//!                    └───────────────┘    └──────────────┘
//!
//!   cross-cutting: config, observability, resilience, error
//! ```

pub mod blockchain;
pub mod bridge;
pub mod config;
pub mod error;
pub mod observability;
pub mod registry;
pub mod resilience;
pub mod session;

pub use blockchain::{FinalityRecord, MockLedger, Signer, SubmitOptions};
pub use bridge::Receipt;
pub use config::BridgeConfig;
pub use error::{Error, Result};
pub use registry::Handle;
pub use session::Session;
