//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{LbError, LbResult};
use crate::load_balancer::{endpoint::Endpoint, LoadBalancer};
use crate::observability::metrics;

/// Round-robin selector.
/// Stores an internal counter to rotate through endpoints, skipping open breakers.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicU64,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn next_endpoint(&self, endpoints: &[Arc<Endpoint>]) -> LbResult<Arc<Endpoint>> {
        if endpoints.is_empty() {
            return Err(LbError::NoEndpoints);
        }

        // Every attempt advances the shared counter, so concurrent callers
        // keep spreading even while some endpoints are open.
        let len = endpoints.len() as u64;
        for _ in 0..len {
            let current = self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
            let endpoint = &endpoints[(current.wrapping_sub(1) % len) as usize];
            if endpoint.is_open() {
                tracing::debug!(endpoint = %endpoint.name(), "Skipping endpoint with open circuit");
                metrics::record_selection_skip(endpoint.name());
                continue;
            }
            return Ok(Arc::clone(endpoint));
        }

        tracing::warn!(endpoints = endpoints.len(), "All endpoints unavailable");
        metrics::record_unavailable();
        Err(LbError::AllUnavailable)
    }
}
