//! Dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! client.chat.completions.create(&request)
//!     → pool.next() (skip open breakers)
//!     → endpoint.rewrite_request() (model map)
//!     → breaker.call(upstream) with FaultPolicy classification
//!     → ChatCompletion or LbError
//! ```
//!
//! # Design Decisions
//! - Same call shape as a single-endpoint client; callers never see which
//!   endpoint served them
//! - One endpoint per `create`; retries are opt-in via `create_with_retry`
//! - Caller faults are returned as-is and never trip a breaker
//! - Streams hold their breaker permit until they end

pub mod builder;
pub mod classify;
pub mod completions;
pub mod stream;

use std::sync::Arc;

use crate::load_balancer::{EndpointPool, EndpointStatus};

pub use builder::LbClientBuilder;
pub use classify::FaultPolicy;
pub use completions::Completions;
pub use stream::CompletionStream;

/// Load-balanced chat client.
#[derive(Debug, Clone)]
pub struct LbClient {
    pub chat: Chat,
    pool: Arc<EndpointPool>,
}

/// The `chat` namespace.
#[derive(Debug, Clone)]
pub struct Chat {
    pub completions: Completions,
}

impl LbClient {
    pub(crate) fn from_parts(pool: EndpointPool, policy: FaultPolicy) -> Self {
        let pool = Arc::new(pool);
        Self {
            chat: Chat {
                completions: Completions::new(Arc::clone(&pool), Arc::new(policy)),
            },
            pool,
        }
    }

    /// Breaker snapshots, in selection order.
    pub fn endpoints(&self) -> Vec<EndpointStatus> {
        self.pool.statuses()
    }
}
