//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds > 0, ratio within [0, 1])
//! - Check endpoint URLs and key sources
//! - Detect endpoint name collisions
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: LbConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;
use url::Url;

use crate::config::schema::{render_name, BreakerConfig, EndpointConfig, LbConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no endpoints configured")]
    NoEndpoints,

    #[error("endpoint {index}: invalid base_url '{url}': {reason}")]
    InvalidBaseUrl { index: usize, url: String, reason: String },

    #[error("endpoint {index}: neither api_key nor api_key_env is set")]
    MissingKeySource { index: usize },

    #[error("endpoint {index}: model_map has an empty model name")]
    EmptyModelName { index: usize },

    #[error("duplicate endpoint name '{0}'")]
    DuplicateName(String),

    #[error("breaker.{field} must be greater than zero")]
    ZeroValue { field: &'static str },

    #[error("breaker.failure_ratio must be within [0, 1], got {0}")]
    RatioOutOfRange(String),
}

/// Validate a full configuration.
pub fn validate_config(config: &LbConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.endpoints.is_empty() {
        errors.push(ValidationError::NoEndpoints);
    }
    errors.extend(validate_endpoints(&config.endpoints, &config.breaker.name_template));
    errors.extend(validate_breaker(&config.breaker));

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Per-endpoint checks. Also used by the programmatic builder.
pub fn validate_endpoints(endpoints: &[EndpointConfig], name_template: &str) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut names = HashSet::new();

    for (index, endpoint) in endpoints.iter().enumerate() {
        if let Err(e) = parse_base_url(&endpoint.base_url) {
            errors.push(ValidationError::InvalidBaseUrl {
                index,
                url: endpoint.base_url.clone(),
                reason: e,
            });
        }

        if endpoint.api_key.is_none() && endpoint.api_key_env.is_none() {
            errors.push(ValidationError::MissingKeySource { index });
        }

        if endpoint
            .model_map
            .iter()
            .any(|(requested, actual)| requested.is_empty() || actual.is_empty())
        {
            errors.push(ValidationError::EmptyModelName { index });
        }

        let name = endpoint
            .name
            .clone()
            .unwrap_or_else(|| render_name(name_template, index));
        if !names.insert(name.clone()) {
            errors.push(ValidationError::DuplicateName(name));
        }
    }

    errors
}

fn validate_breaker(breaker: &BreakerConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if breaker.consecutive_failures == 0 {
        errors.push(ValidationError::ZeroValue { field: "consecutive_failures" });
    }
    if breaker.half_open_max_requests == 0 {
        errors.push(ValidationError::ZeroValue { field: "half_open_max_requests" });
    }
    if !(0.0..=1.0).contains(&breaker.failure_ratio) {
        errors.push(ValidationError::RatioOutOfRange(breaker.failure_ratio.to_string()));
    }

    errors
}

/// Parse a base URL, accepting only http(s).
pub fn parse_base_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| e.to_string())?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!("unsupported scheme '{}'", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> LbConfig {
        LbConfig {
            endpoints: vec![
                EndpointConfig::new("k1", "https://a.example.com/v1"),
                EndpointConfig::new("k2", "https://b.example.com/v1"),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = valid();
        config.endpoints[0].base_url = "not a url".into();
        config.endpoints[1].api_key = None;
        config.breaker.consecutive_failures = 0;
        config.breaker.failure_ratio = 1.5;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(matches!(errors[0], ValidationError::InvalidBaseUrl { index: 0, .. }));
        assert_eq!(errors[1], ValidationError::MissingKeySource { index: 1 });
        assert!(errors.contains(&ValidationError::ZeroValue { field: "consecutive_failures" }));
    }

    #[test]
    fn test_empty_and_duplicates() {
        let errors = validate_config(&LbConfig::default()).unwrap_err();
        assert_eq!(errors, vec![ValidationError::NoEndpoints]);

        let mut config = valid();
        config.endpoints[0].name = Some("Client-1".into());
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::DuplicateName("Client-1".into())]);
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        assert!(parse_base_url("ftp://files.example.com").is_err());
        assert!(parse_base_url("http://127.0.0.1:8080/v1").is_ok());
    }
}
