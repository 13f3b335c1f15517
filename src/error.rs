//! Error types surfaced by the load balancer.

use thiserror::Error;

use crate::config::ConfigError;
use crate::upstream::UpstreamError;

/// Who is responsible for a failed upstream call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The request itself was bad; another endpoint would reject it too.
    Caller,
    /// The endpoint failed (auth, rate limit, server error, network).
    Endpoint,
}

/// Errors returned by dispatch and construction.
#[derive(Debug, Error)]
pub enum LbError {
    /// The pool has no endpoints.
    #[error("no endpoints configured")]
    NoEndpoints,

    /// Every endpoint's breaker is open.
    #[error("all endpoints are unavailable (circuit breakers open)")]
    AllUnavailable,

    /// The selected endpoint's breaker rejected the call.
    #[error("circuit breaker for {endpoint} is open")]
    BreakerOpen { endpoint: String },

    /// The selected endpoint is half-open and its trial quota is in use.
    #[error("circuit breaker for {endpoint} is half-open with a trial already in flight")]
    TooManyTrialRequests { endpoint: String },

    /// The upstream call failed. `source` is the error the client returned.
    #[error("{endpoint}: {source}")]
    Upstream {
        endpoint: String,
        fault: Fault,
        #[source]
        source: UpstreamError,
    },

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl LbError {
    /// Whether a fresh dispatch might succeed.
    ///
    /// Caller faults and configuration errors would fail again on any endpoint.
    pub fn is_retryable(&self) -> bool {
        match self {
            LbError::AllUnavailable
            | LbError::BreakerOpen { .. }
            | LbError::TooManyTrialRequests { .. } => true,
            LbError::Upstream { fault, .. } => *fault == Fault::Endpoint,
            LbError::NoEndpoints | LbError::Config(_) => false,
        }
    }

    pub fn is_caller_fault(&self) -> bool {
        matches!(self, LbError::Upstream { fault: Fault::Caller, .. })
    }

    /// The underlying upstream error, if the call reached an endpoint.
    pub fn upstream(&self) -> Option<&UpstreamError> {
        match self {
            LbError::Upstream { source, .. } => Some(source),
            _ => None,
        }
    }

    /// HTTP status reported by the upstream, if any.
    pub fn status(&self) -> Option<u16> {
        self.upstream().and_then(UpstreamError::status)
    }
}

/// Result type for load balancer operations.
pub type LbResult<T> = Result<T, LbError>;
