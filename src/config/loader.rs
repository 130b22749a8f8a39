//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::BridgeConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable naming a TOML configuration file.
pub const CONFIG_ENV_VAR: &str = "LEDGER_BRIDGE_CONFIG";

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for crate::Error {
    fn from(e: ConfigError) -> Self {
        crate::Error::Config(e.to_string())
    }
}

/// Parse and validate configuration from a TOML string.
pub fn parse_config(content: &str) -> Result<BridgeConfig, ConfigError> {
    let config: BridgeConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<BridgeConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_config(&content)
}

/// Load the file named by `LEDGER_BRIDGE_CONFIG`, or defaults when unset.
pub fn load_from_env() -> Result<BridgeConfig, ConfigError> {
    match std::env::var_os(CONFIG_ENV_VAR) {
        Some(path) => {
            tracing::info!(path = ?path, "Loading bridge configuration");
            load_config(Path::new(&path))
        }
        None => Ok(BridgeConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::FinalityMode;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = parse_config(
            r#"
            [finality]
            mode = "confirmations"
            confirmation_blocks = 12

            [rpc]
            chain_id = 31337
            "#,
        )
        .unwrap();

        assert_eq!(config.finality.mode, FinalityMode::Confirmations);
        assert_eq!(config.finality.confirmation_blocks, 12);
        assert_eq!(config.finality.poll_interval_ms, 2000);
        assert_eq!(config.rpc.chain_id, Some(31337));
        assert_eq!(config.rpc.timeout_secs, 10);
    }

    #[test]
    fn test_invalid_config_reports_validation() {
        let err = parse_config("[runtime]\nworker_threads = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("runtime.worker_threads"));
    }

    #[test]
    fn test_malformed_toml() {
        let err = parse_config("[finality\nmode = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join("ledger_bridge_test_config.toml");
        std::fs::write(&path, "[observability]\nlog_level = \"debug\"\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.observability.log_level, "debug");

        std::fs::remove_file(&path).unwrap_or_default();
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/nonexistent/ledger_bridge.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
