//! Endpoint abstraction.
//!
//! # Responsibilities
//! - Represent a single upstream (client + base URL + display name)
//! - Own the endpoint's circuit breaker
//! - Apply the endpoint's model-name rewrites

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use url::Url;

use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitState, Counts};
use crate::upstream::{ChatClient, ChatCompletionRequest};

/// A single upstream endpoint.
pub struct Endpoint {
    name: String,
    base_url: Url,
    client: Arc<dyn ChatClient>,
    breaker: Arc<CircuitBreaker>,
    /// Requested model → model sent to this endpoint.
    model_map: HashMap<String, String>,
}

impl Endpoint {
    pub fn new(
        name: impl Into<String>,
        base_url: Url,
        client: Arc<dyn ChatClient>,
        breaker: Arc<CircuitBreaker>,
        model_map: HashMap<String, String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url,
            client,
            breaker,
            model_map,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn client(&self) -> &dyn ChatClient {
        self.client.as_ref()
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Whether selection should skip this endpoint.
    pub fn is_open(&self) -> bool {
        self.breaker.state() == CircuitState::Open
    }

    /// Substitute the requested model using this endpoint's map.
    ///
    /// The caller's request is never mutated; a copy is made only when the
    /// model actually changes.
    pub fn rewrite_request<'a>(&self, request: &'a ChatCompletionRequest) -> Cow<'a, ChatCompletionRequest> {
        match self.model_map.get(&request.model) {
            Some(actual) => {
                tracing::trace!(endpoint = %self.name, from = %request.model, to = %actual, "Model rewritten");
                let mut rewritten = request.clone();
                rewritten.model = actual.clone();
                Cow::Owned(rewritten)
            }
            None => Cow::Borrowed(request),
        }
    }

    /// Point-in-time view for status reporting.
    pub fn status(&self) -> EndpointStatus {
        EndpointStatus {
            name: self.name.clone(),
            base_url: self.base_url.to_string(),
            state: self.breaker.state(),
            counts: self.breaker.counts(),
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("base_url", &self.base_url.as_str())
            .field("breaker", &self.breaker)
            .field("model_map", &self.model_map)
            .finish()
    }
}

/// Snapshot of one endpoint's breaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointStatus {
    pub name: String,
    pub base_url: String,
    pub state: CircuitState,
    pub counts: Counts,
}
