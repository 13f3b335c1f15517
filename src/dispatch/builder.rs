//! Construction of an `LbClient` from endpoint descriptors.

use std::sync::Arc;

use crate::config::schema::render_name;
use crate::config::validation::{parse_base_url, validate_endpoints};
use crate::config::{ConfigError, EndpointConfig, LbConfig, TimeoutConfig, ValidationError};
use crate::dispatch::classify::{FaultPolicy, DEFAULT_CALLER_FAULT_STATUSES};
use crate::dispatch::LbClient;
use crate::error::LbResult;
use crate::load_balancer::{Endpoint, EndpointPool};
use crate::observability::metrics;
use crate::resilience::circuit_breaker::{BreakerSettings, CircuitBreaker, CircuitState};
use crate::upstream::{ChatClient, ClientBuildError, HttpChatClient};

/// Default breaker/endpoint name template.
pub const DEFAULT_NAME_TEMPLATE: &str = "Client-{index}";

/// Builder for `LbClient`.
pub struct LbClientBuilder {
    endpoints: Vec<(EndpointConfig, Option<Arc<dyn ChatClient>>)>,
    breaker: BreakerSettings,
    name_template: String,
    caller_fault_statuses: Vec<u16>,
    timeouts: TimeoutConfig,
}

impl Default for LbClientBuilder {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            breaker: BreakerSettings::default(),
            name_template: DEFAULT_NAME_TEMPLATE.to_string(),
            caller_fault_statuses: DEFAULT_CALLER_FAULT_STATUSES.to_vec(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl LbClientBuilder {
    /// Add an endpoint served by the built-in HTTP client.
    pub fn endpoint(mut self, config: EndpointConfig) -> Self {
        self.endpoints.push((config, None));
        self
    }

    /// Add an endpoint served by a caller-supplied client.
    ///
    /// The descriptor's API key is not needed in this case.
    pub fn endpoint_with_client(mut self, config: EndpointConfig, client: Arc<dyn ChatClient>) -> Self {
        self.endpoints.push((config, Some(client)));
        self
    }

    /// Breaker tuning applied to every endpoint. The name is replaced per endpoint.
    pub fn breaker(mut self, settings: BreakerSettings) -> Self {
        self.breaker = settings;
        self
    }

    /// Name template for endpoints without an explicit name; `{index}` is the position.
    pub fn name_template(mut self, template: impl Into<String>) -> Self {
        self.name_template = template.into();
        self
    }

    /// Upstream statuses that never count against an endpoint.
    pub fn caller_fault_statuses(mut self, statuses: impl Into<Vec<u16>>) -> Self {
        self.caller_fault_statuses = statuses.into();
        self
    }

    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Build the pool. An empty pool is allowed; every call on it fails
    /// with `LbError::NoEndpoints`.
    pub fn build(self) -> LbResult<LbClient> {
        let descriptors: Vec<EndpointConfig> = self.endpoints.iter().map(|(c, _)| c.clone()).collect();
        let errors: Vec<ValidationError> = validate_endpoints(&descriptors, &self.name_template)
            .into_iter()
            .filter(|e| match e {
                ValidationError::MissingKeySource { index } => self.endpoints[*index].1.is_none(),
                _ => true,
            })
            .collect();
        if !errors.is_empty() {
            return Err(ConfigError::Validation(errors).into());
        }

        let mut endpoints = Vec::with_capacity(self.endpoints.len());
        for (index, (config, client)) in self.endpoints.into_iter().enumerate() {
            let name = config
                .name
                .clone()
                .unwrap_or_else(|| render_name(&self.name_template, index));
            let base_url = parse_base_url(&config.base_url).map_err(|reason| {
                ConfigError::Validation(vec![ValidationError::InvalidBaseUrl {
                    index,
                    url: config.base_url.clone(),
                    reason,
                }])
            })?;

            let client = match client {
                Some(client) => client,
                None => {
                    let api_key = config
                        .resolve_api_key()
                        .ok_or_else(|| ConfigError::MissingApiKey { endpoint: name.clone() })?;
                    let http = HttpChatClient::new(&api_key, &base_url, &self.timeouts).map_err(|e| match e {
                        ClientBuildError::InvalidApiKey => ConfigError::InvalidApiKey { endpoint: name.clone() },
                        ClientBuildError::Client(e) => ConfigError::Client(e),
                    })?;
                    Arc::new(http) as Arc<dyn ChatClient>
                }
            };

            let breaker = CircuitBreaker::new(self.breaker.clone().with_name(name.clone()));
            metrics::record_breaker_state(&name, CircuitState::Closed);
            tracing::debug!(endpoint = %name, base_url = %base_url, models = config.model_map.len(), "Endpoint added");

            endpoints.push(Arc::new(Endpoint::new(
                name,
                base_url,
                client,
                Arc::new(breaker),
                config.model_map,
            )));
        }

        tracing::info!(endpoints = endpoints.len(), "Endpoint pool ready");
        Ok(LbClient::from_parts(
            EndpointPool::new(endpoints),
            FaultPolicy::new(self.caller_fault_statuses),
        ))
    }
}

impl LbClient {
    pub fn builder() -> LbClientBuilder {
        LbClientBuilder::default()
    }

    /// Pool over `endpoints` with default breaker tuning.
    pub fn new(endpoints: Vec<EndpointConfig>) -> LbResult<Self> {
        endpoints
            .into_iter()
            .fold(Self::builder(), LbClientBuilder::endpoint)
            .build()
    }

    /// Pool described by a loaded configuration file.
    pub fn from_config(config: &LbConfig) -> LbResult<Self> {
        crate::config::validation::validate_config(config).map_err(ConfigError::Validation)?;

        config
            .endpoints
            .iter()
            .cloned()
            .fold(Self::builder(), LbClientBuilder::endpoint)
            .breaker(config.breaker.to_settings())
            .name_template(config.breaker.name_template.clone())
            .caller_fault_statuses(config.breaker.caller_fault_statuses.clone())
            .timeouts(config.timeouts.clone())
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LbError;
    use crate::load_balancer::endpoint::testing::Unreachable;

    fn descriptor(base_url: &str) -> EndpointConfig {
        EndpointConfig { base_url: base_url.into(), ..Default::default() }
    }

    #[test]
    fn test_default_names_follow_template() {
        let client = LbClient::builder()
            .endpoint_with_client(descriptor("http://a.local"), Arc::new(Unreachable))
            .endpoint_with_client(descriptor("http://b.local").with_name("backup"), Arc::new(Unreachable))
            .endpoint_with_client(descriptor("http://c.local"), Arc::new(Unreachable))
            .build()
            .unwrap();

        let names: Vec<_> = client.endpoints().into_iter().map(|s| s.name).collect();
        assert_eq!(names, ["Client-0", "backup", "Client-2"]);
    }

    #[test]
    fn test_http_endpoints_need_a_key() {
        let err = LbClient::builder()
            .endpoint(EndpointConfig {
                base_url: "http://a.local".into(),
                api_key_env: Some("LLM_LB_BUILDER_TEST_UNSET_KEY".into()),
                ..Default::default()
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, LbError::Config(ConfigError::MissingApiKey { ref endpoint }) if endpoint == "Client-0"));

        let err = LbClient::builder().endpoint(descriptor("http://a.local")).build().unwrap_err();
        assert!(matches!(err, LbError::Config(ConfigError::Validation(_))));
    }

    #[tokio::test]
    async fn test_new_builds_http_endpoints() {
        let client = LbClient::new(vec![
            EndpointConfig::new("sk-1", "https://one.example.com/v1"),
            EndpointConfig::new("sk-2", "https://two.example.com/v1").with_model("gpt-4o", "gpt-4o-mini"),
        ])
        .unwrap();
        let statuses = client.endpoints();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[1].base_url, "https://two.example.com/v1");
        assert!(statuses.iter().all(|s| s.state == CircuitState::Closed));
    }

    #[test]
    fn test_unusable_keys_fail_at_build() {
        let err = LbClient::new(vec![EndpointConfig::new("sk-bad\nkey", "https://one.example.com/v1")]).unwrap_err();
        assert!(matches!(err, LbError::Config(ConfigError::InvalidApiKey { ref endpoint }) if endpoint == "Client-0"));

        let err = LbClient::new(vec![EndpointConfig::new("", "https://one.example.com/v1")]).unwrap_err();
        assert!(matches!(err, LbError::Config(ConfigError::MissingApiKey { .. })));
    }

    #[test]
    fn test_invalid_url_rejected() {
        let err = LbClient::new(vec![EndpointConfig::new("sk", "not a url")]).unwrap_err();
        assert!(matches!(err, LbError::Config(ConfigError::Validation(ref errors)) if errors.len() == 1));
    }

    #[test]
    fn test_from_config_validates() {
        let err = LbClient::from_config(&LbConfig::default()).unwrap_err();
        assert!(matches!(err, LbError::Config(ConfigError::Validation(_))));
    }
}
