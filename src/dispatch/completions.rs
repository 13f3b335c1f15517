//! Unary and streaming dispatch through the endpoint pool.

use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;
use uuid::Uuid;

use crate::dispatch::classify::{outcome_for, FaultPolicy};
use crate::dispatch::stream::CompletionStream;
use crate::error::{Fault, LbError, LbResult};
use crate::load_balancer::{Endpoint, EndpointPool};
use crate::observability::metrics;
use crate::resilience::circuit_breaker::{BreakerError, Rejection};
use crate::resilience::RetryPolicy;
use crate::upstream::{ChatCompletion, ChatCompletionRequest, UpstreamError};

/// The `chat.completions` surface of `LbClient`.
#[derive(Debug, Clone)]
pub struct Completions {
    pool: Arc<EndpointPool>,
    policy: Arc<FaultPolicy>,
}

impl Completions {
    pub(crate) fn new(pool: Arc<EndpointPool>, policy: Arc<FaultPolicy>) -> Self {
        Self { pool, policy }
    }

    /// Send one completion request to the next available endpoint.
    ///
    /// Exactly one endpoint is tried. Its breaker only counts endpoint
    /// faults; caller faults are returned without penalizing it.
    pub async fn create(&self, request: &ChatCompletionRequest) -> LbResult<ChatCompletion> {
        let span = tracing::debug_span!("dispatch", dispatch_id = %Uuid::new_v4(), model = %request.model);
        self.dispatch(request).instrument(span).await
    }

    async fn dispatch(&self, request: &ChatCompletionRequest) -> LbResult<ChatCompletion> {
        let endpoint = self.pool.next()?;
        let request = endpoint.rewrite_request(request);
        tracing::debug!(endpoint = %endpoint.name(), model = %request.model, "Dispatching completion");

        let start = Instant::now();
        let client = endpoint.client();
        let result = endpoint
            .breaker()
            .call(|| client.create(&request), |result| self.policy.outcome(result))
            .await;

        match result {
            Ok(completion) => {
                metrics::record_request(endpoint.name(), "success", start);
                Ok(completion)
            }
            Err(BreakerError::Rejected(rejection)) => {
                metrics::record_request(endpoint.name(), "rejected", start);
                Err(rejected(&endpoint, rejection))
            }
            Err(BreakerError::Inner(source)) => Err(self.upstream_error(&endpoint, source, start)),
        }
    }

    /// Open a streaming completion on the next endpoint that admits it.
    ///
    /// Endpoints whose breaker refuses a permit are passed over, at most
    /// once per pool member.
    pub async fn create_stream(&self, request: &ChatCompletionRequest) -> LbResult<CompletionStream> {
        let span = tracing::debug_span!("dispatch_stream", dispatch_id = %Uuid::new_v4(), model = %request.model);
        self.dispatch_stream(request).instrument(span).await
    }

    async fn dispatch_stream(&self, request: &ChatCompletionRequest) -> LbResult<CompletionStream> {
        for _ in 0..self.pool.len().max(1) {
            let endpoint = self.pool.next()?;
            let permit = match endpoint.breaker().try_acquire() {
                Ok(permit) => permit,
                Err(rejection) => {
                    tracing::debug!(endpoint = %endpoint.name(), %rejection, "Endpoint refused stream");
                    metrics::record_selection_skip(endpoint.name());
                    continue;
                }
            };

            let request = endpoint.rewrite_request(request);
            tracing::debug!(endpoint = %endpoint.name(), model = %request.model, "Opening completion stream");

            let start = Instant::now();
            return match endpoint.client().create_stream(&request).await {
                Ok(inner) => Ok(CompletionStream::new(inner, endpoint, permit, Arc::clone(&self.policy))),
                Err(source) => {
                    permit.record(outcome_for(self.policy.fault_of(&source)));
                    Err(self.upstream_error(&endpoint, source, start))
                }
            };
        }

        tracing::warn!(endpoints = self.pool.len(), "No endpoint admitted the stream");
        metrics::record_unavailable();
        Err(LbError::AllUnavailable)
    }

    /// `create`, repeated under `policy` while the error is retryable.
    ///
    /// Each attempt is a separate dispatch, so round robin moves on to the
    /// next endpoint between attempts.
    pub async fn create_with_retry(
        &self,
        request: &ChatCompletionRequest,
        policy: &RetryPolicy,
    ) -> LbResult<ChatCompletion> {
        policy
            .retry(move |attempt| {
                tracing::debug!(attempt, max_attempts = policy.max_attempts, "Dispatch attempt");
                self.create(request)
            })
            .await
    }

    fn upstream_error(&self, endpoint: &Endpoint, source: UpstreamError, start: Instant) -> LbError {
        let fault = self.policy.fault_of(&source);
        match fault {
            Fault::Caller => {
                tracing::debug!(endpoint = %endpoint.name(), error = %source, "Request rejected by upstream");
                metrics::record_request(endpoint.name(), "caller_error", start);
            }
            Fault::Endpoint => {
                tracing::warn!(endpoint = %endpoint.name(), error = %source, "Endpoint call failed");
                metrics::record_request(endpoint.name(), "endpoint_error", start);
            }
        }
        LbError::Upstream {
            endpoint: endpoint.name().to_string(),
            fault,
            source,
        }
    }
}

fn rejected(endpoint: &Endpoint, rejection: Rejection) -> LbError {
    let endpoint = endpoint.name().to_string();
    match rejection {
        Rejection::Open => LbError::BreakerOpen { endpoint },
        Rejection::TooManyRequests => LbError::TooManyTrialRequests { endpoint },
    }
}
