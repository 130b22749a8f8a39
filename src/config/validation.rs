//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, multipliers positive)
//! - Check that addresses and URLs parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BridgeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into a session

use alloy::primitives::Address;
use std::fmt;

use crate::config::schema::BridgeConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, collecting every problem.
pub fn validate_config(config: &BridgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.rpc.timeout_secs == 0 {
        errors.push(ValidationError::new("rpc.timeout_secs", "must be greater than 0"));
    }
    for url in &config.rpc.failover_urls {
        if let Err(e) = url::Url::parse(url) {
            errors.push(ValidationError::new(
                "rpc.failover_urls",
                format!("'{}' is not a valid URL: {}", url, e),
            ));
        }
    }

    if let Some(sink) = &config.submission.sink_address {
        if sink.parse::<Address>().is_err() {
            errors.push(ValidationError::new(
                "submission.sink_address",
                format!("'{}' is not a valid address", sink),
            ));
        }
    }
    if !(config.submission.gas_price_multiplier > 0.0) {
        errors.push(ValidationError::new(
            "submission.gas_price_multiplier",
            "must be positive",
        ));
    }
    if config.submission.mortality_blocks == Some(0) {
        errors.push(ValidationError::new(
            "submission.mortality_blocks",
            "must be greater than 0 when set",
        ));
    }

    let finality = &config.finality;
    if finality.poll_interval_ms == 0 {
        errors.push(ValidationError::new("finality.poll_interval_ms", "must be greater than 0"));
    }
    if finality.timeout_secs == 0 {
        errors.push(ValidationError::new("finality.timeout_secs", "must be greater than 0"));
    }
    if finality.backoff_base_ms > finality.backoff_max_ms {
        errors.push(ValidationError::new(
            "finality.backoff_base_ms",
            "must not exceed finality.backoff_max_ms",
        ));
    }

    if config.runtime.worker_threads == 0 {
        errors.push(ValidationError::new("runtime.worker_threads", "must be at least 1"));
    }

    if !LOG_LEVELS.contains(&config.observability.log_level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", config.observability.log_level),
        ));
    }
    if let Some(addr) = &config.observability.metrics_address {
        if addr.parse::<std::net::SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "observability.metrics_address",
                format!("'{}' is not a socket address", addr),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&BridgeConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = BridgeConfig::default();
        config.rpc.timeout_secs = 0;
        config.finality.poll_interval_ms = 0;
        config.runtime.worker_threads = 0;
        config.observability.log_level = "loud".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().any(|e| e.field == "observability.log_level"));
    }

    #[test]
    fn test_rejects_bad_addresses() {
        let mut config = BridgeConfig::default();
        config.submission.sink_address = Some("0x1234".to_string());
        config.rpc.failover_urls.push("not a url".to_string());

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].to_string().contains("rpc.failover_urls"));
    }
}
