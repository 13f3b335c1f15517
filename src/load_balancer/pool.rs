//! Endpoint pool management.
//!
//! # Responsibilities
//! - Hold the endpoints in construction order
//! - Apply the load balancing algorithm to select one

use std::sync::Arc;

use crate::error::LbResult;
use crate::load_balancer::{
    endpoint::{Endpoint, EndpointStatus},
    round_robin::RoundRobin,
    LoadBalancer,
};

/// Ordered endpoints plus the selector shared by all callers.
#[derive(Debug)]
pub struct EndpointPool {
    endpoints: Vec<Arc<Endpoint>>,
    balancer: Box<dyn LoadBalancer>,
}

impl EndpointPool {
    /// Create a round-robin pool. Selection order is the order given.
    pub fn new(endpoints: Vec<Arc<Endpoint>>) -> Self {
        Self::with_balancer(endpoints, Box::new(RoundRobin::new()))
    }

    pub fn with_balancer(endpoints: Vec<Arc<Endpoint>>, balancer: Box<dyn LoadBalancer>) -> Self {
        Self { endpoints, balancer }
    }

    /// Select the next endpoint whose breaker is not open.
    pub fn next(&self) -> LbResult<Arc<Endpoint>> {
        self.balancer.next_endpoint(&self.endpoints)
    }

    pub fn endpoints(&self) -> &[Arc<Endpoint>] {
        &self.endpoints
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn statuses(&self) -> Vec<EndpointStatus> {
        self.endpoints.iter().map(|e| e.status()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LbError;
    use crate::load_balancer::endpoint::testing::endpoint;

    #[test]
    fn test_pool_selection_order() {
        let pool = EndpointPool::new(vec![endpoint("Client-0", 3), endpoint("Client-1", 3)]);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.next().unwrap().name(), "Client-0");
        assert_eq!(pool.next().unwrap().name(), "Client-1");
        assert_eq!(pool.next().unwrap().name(), "Client-0");

        let names: Vec<_> = pool.statuses().into_iter().map(|s| s.name).collect();
        assert_eq!(names, ["Client-0", "Client-1"]);
    }

    #[test]
    fn test_empty_pool() {
        let pool = EndpointPool::new(Vec::new());
        assert!(pool.is_empty());
        assert!(matches!(pool.next(), Err(LbError::NoEndpoints)));
    }
}
