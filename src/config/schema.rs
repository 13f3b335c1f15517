//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the load balancer.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::circuit_breaker::{
    consecutive_failures, BreakerSettings, Counts, TripPredicate, DEFAULT_CONSECUTIVE_FAILURES,
};

/// Placeholder in `BreakerConfig::name_template` replaced by the endpoint index.
pub const INDEX_PLACEHOLDER: &str = "{index}";

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct LbConfig {
    /// Upstream endpoints, in selection order.
    pub endpoints: Vec<EndpointConfig>,

    /// Circuit breaker template shared by all endpoints.
    pub breaker: BreakerConfig,

    /// Timeouts for the built-in HTTP client.
    pub timeouts: TimeoutConfig,

    /// Caller-level retry policy.
    pub retries: RetryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// One upstream endpoint.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EndpointConfig {
    /// Display name. Defaults to the rendered breaker name template.
    #[serde(default)]
    pub name: Option<String>,

    /// API key, inline.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable holding the API key. Used when `api_key` is unset.
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Base URL (e.g., "https://api.openai.com/v1").
    pub base_url: String,

    /// Requested model → model actually sent to this endpoint.
    #[serde(default)]
    pub model_map: HashMap<String, String>,
}

impl EndpointConfig {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_model(mut self, requested: impl Into<String>, actual: impl Into<String>) -> Self {
        self.model_map.insert(requested.into(), actual.into());
        self
    }

    /// Resolve the API key, preferring the inline value. Empty keys count as unset.
    pub fn resolve_api_key(&self) -> Option<String> {
        let key = match &self.api_key {
            Some(key) => Some(key.clone()),
            None => self.api_key_env.as_deref().and_then(|var| std::env::var(var).ok()),
        };
        key.filter(|key| !key.is_empty())
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures that open a breaker.
    pub consecutive_failures: u32,

    /// Seconds a breaker stays open before a trial request.
    pub cooldown_secs: u64,

    /// Rolling window for closed-state counts in seconds (0 = no window).
    pub interval_secs: u64,

    /// Trial requests admitted while half-open.
    pub half_open_max_requests: u32,

    /// Also trip when this share of requests failed (0 disables).
    pub failure_ratio: f64,

    /// Minimum requests in the window before `failure_ratio` applies.
    pub min_requests: u32,

    /// Breaker/endpoint name template; `{index}` is the endpoint position.
    pub name_template: String,

    /// Upstream statuses blamed on the caller; they never count against an endpoint.
    pub caller_fault_statuses: Vec<u16>,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            consecutive_failures: DEFAULT_CONSECUTIVE_FAILURES,
            cooldown_secs: 30,
            interval_secs: 0,
            half_open_max_requests: 1,
            failure_ratio: 0.0,
            min_requests: 10,
            name_template: "Client-{index}".to_string(),
            caller_fault_statuses: vec![400],
        }
    }
}

impl BreakerConfig {
    /// Build the breaker template described by this config.
    pub fn to_settings(&self) -> BreakerSettings {
        let consecutive = consecutive_failures(self.consecutive_failures);
        let ready_to_trip = if self.failure_ratio > 0.0 {
            let ratio = self.failure_ratio;
            let min_requests = self.min_requests;
            let predicate: TripPredicate = Arc::new(move |counts: &Counts| {
                consecutive(counts) || (counts.requests >= min_requests && counts.failure_ratio() >= ratio)
            });
            predicate
        } else {
            consecutive
        };

        BreakerSettings {
            name: self.name_template.clone(),
            cooldown: Duration::from_secs(self.cooldown_secs),
            interval: (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs)),
            max_half_open_requests: self.half_open_max_requests,
            ready_to_trip: Some(ready_to_trip),
        }
    }
}

/// Render a breaker name template for the endpoint at `index`.
pub fn render_name(template: &str, index: usize) -> String {
    if template.contains(INDEX_PLACEHOLDER) {
        template.replace(INDEX_PLACEHOLDER, &index.to_string())
    } else {
        format!("{}-{}", template, index)
    }
}

/// Timeout configuration for upstream calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 60,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
