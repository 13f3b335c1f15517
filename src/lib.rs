//! Load-balanced, circuit-broken client for OpenAI-compatible chat endpoints.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod load_balancer;
pub mod observability;
pub mod resilience;
pub mod upstream;

pub use config::{load_config, EndpointConfig, LbConfig};
pub use dispatch::{CompletionStream, LbClient, LbClientBuilder};
pub use error::{Fault, LbError, LbResult};
pub use load_balancer::EndpointStatus;
pub use resilience::{BreakerSettings, CircuitState, Outcome, RetryPolicy};
pub use upstream::{ChatClient, ChatCompletion, ChatCompletionChunk, ChatCompletionRequest, ChatMessage, UpstreamError};
