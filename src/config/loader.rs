//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::LbConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading and pool construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),

    #[error("endpoint {endpoint}: API key could not be resolved")]
    MissingApiKey { endpoint: String },

    #[error("endpoint {endpoint}: API key is not a valid header value")]
    InvalidApiKey { endpoint: String },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<LbConfig, ConfigError> {
    let config: LbConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<LbConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config = parse_config(&content)?;

    tracing::debug!(
        path = %path.display(),
        endpoints = config.endpoints.len(),
        "Configuration loaded"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = parse_config(
            r#"
            [[endpoints]]
            name = "primary"
            api_key = "sk-1"
            base_url = "https://api.example.com/v1"
            model_map = { "gpt-4o" = "gpt-4o-2024-08-06" }

            [[endpoints]]
            api_key_env = "BACKUP_KEY"
            base_url = "https://backup.example.com/v1"

            [breaker]
            consecutive_failures = 5
            cooldown_secs = 10
            caller_fault_statuses = [400, 422]

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.endpoints.len(), 2);
        assert_eq!(config.endpoints[0].model_map["gpt-4o"], "gpt-4o-2024-08-06");
        assert_eq!(config.endpoints[1].api_key_env.as_deref(), Some("BACKUP_KEY"));
        assert_eq!(config.breaker.consecutive_failures, 5);
        assert_eq!(config.breaker.half_open_max_requests, 1);
        assert_eq!(config.breaker.caller_fault_statuses, vec![400, 422]);
        assert_eq!(config.retries.max_attempts, 3);
        assert_eq!(config.observability.log_format, crate::config::LogFormat::Json);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_config("endpoints = 3"), Err(ConfigError::Parse(_))));

        let err = parse_config("").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert_eq!(err.to_string(), "Validation failed: no endpoints configured");
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
