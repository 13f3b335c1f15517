//! Streaming completions with breaker accounting.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use futures_util::Stream;

use crate::dispatch::classify::{outcome_for, FaultPolicy};
use crate::error::{Fault, LbError};
use crate::load_balancer::Endpoint;
use crate::observability::metrics;
use crate::resilience::circuit_breaker::{Outcome, Permit};
use crate::upstream::{ChatCompletionChunk, ChunkStream};

/// A completion stream that settles its breaker permit when it ends.
///
/// Normal end of stream records a success, an error item records the
/// classified outcome, and dropping the stream early counts as ignored.
pub struct CompletionStream {
    inner: ChunkStream,
    endpoint: Arc<Endpoint>,
    permit: Option<Permit>,
    policy: Arc<FaultPolicy>,
    started: Instant,
}

impl CompletionStream {
    pub(crate) fn new(inner: ChunkStream, endpoint: Arc<Endpoint>, permit: Permit, policy: Arc<FaultPolicy>) -> Self {
        Self {
            inner,
            endpoint,
            permit: Some(permit),
            policy,
            started: Instant::now(),
        }
    }

    /// Name of the endpoint serving this stream.
    pub fn endpoint(&self) -> &str {
        self.endpoint.name()
    }

    fn settle(&mut self, outcome: Outcome, label: &'static str) {
        if let Some(permit) = self.permit.take() {
            permit.record(outcome);
            metrics::record_request(self.endpoint.name(), label, self.started);
        }
    }
}

impl Stream for CompletionStream {
    type Item = Result<ChatCompletionChunk, LbError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        match this.inner.as_mut().poll_next(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(chunk))) => Poll::Ready(Some(Ok(chunk))),
            Poll::Ready(Some(Err(source))) => {
                let fault = this.policy.fault_of(&source);
                tracing::warn!(endpoint = %this.endpoint.name(), error = %source, ?fault, "Completion stream failed");
                let label = match fault {
                    Fault::Caller => "caller_error",
                    Fault::Endpoint => "endpoint_error",
                };
                this.settle(outcome_for(fault), label);
                Poll::Ready(Some(Err(LbError::Upstream {
                    endpoint: this.endpoint.name().to_string(),
                    fault,
                    source,
                })))
            }
            Poll::Ready(None) => {
                this.settle(Outcome::Success, "success");
                Poll::Ready(None)
            }
        }
    }
}

impl fmt::Debug for CompletionStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionStream")
            .field("endpoint", &self.endpoint.name())
            .field("settled", &self.permit.is_none())
            .finish()
    }
}
