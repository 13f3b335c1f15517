//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! dispatch request
//!     → pool.rs (ordered endpoints)
//!     → round_robin.rs (rotate, skipping open breakers)
//!     → endpoint.rs (rewrite model, hand out client + breaker)
//!     → Return endpoint or NoEndpoints / AllUnavailable
//! ```
//!
//! # Design Decisions
//! - Selector holds only a counter; breakers live on the endpoints
//! - One shared counter for all callers (AtomicU64, never reset)
//! - Open endpoints are skipped at selection; the breaker gate still decides

pub mod endpoint;
pub mod pool;
pub mod round_robin;

use std::fmt::Debug;
use std::sync::Arc;

use crate::error::LbResult;

pub use endpoint::{Endpoint, EndpointStatus};
pub use pool::EndpointPool;
pub use round_robin::RoundRobin;

/// Endpoint selection strategy.
pub trait LoadBalancer: Send + Sync + Debug {
    fn next_endpoint(&self, endpoints: &[Arc<Endpoint>]) -> LbResult<Arc<Endpoint>>;
}
