//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → LbConfig (validated, immutable)
//!     → LbClient::from_config builds the endpoint pool
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; breaker state is never persisted
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    BreakerConfig, EndpointConfig, LbConfig, LogFormat, ObservabilityConfig, RetryConfig, TimeoutConfig,
};
pub use validation::ValidationError;
