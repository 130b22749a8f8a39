//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML), path from caller or LEDGER_BRIDGE_CONFIG
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → BridgeConfig (validated, immutable)
//!     → owned by the Session for its whole lifetime
//! ```
//!
//! # Design Decisions
//! - Config is immutable once a session is installed
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_from_env, parse_config, ConfigError};
pub use schema::BridgeConfig;
pub use schema::{FinalityConfig, FinalityMode, ObservabilityConfig, RpcConfig, RuntimeConfig, SubmissionConfig};
