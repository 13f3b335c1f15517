//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatch to an endpoint:
//!     → circuit_breaker.rs (gate the call, classify the outcome, open on repeated faults)
//!
//! Caller-level:
//!     → retries.rs (repeat a whole dispatch with backoff if the error is retryable)
//! ```
//!
//! # Design Decisions
//! - One breaker per endpoint; breakers never share state
//! - Dispatch itself never retries; retries compose on top of it

pub mod circuit_breaker;
pub mod retries;

pub use circuit_breaker::{
    BreakerError, BreakerSettings, CircuitBreaker, CircuitState, Counts, Outcome, Permit, Rejection,
    TripPredicate,
};
pub use retries::RetryPolicy;
