//! Upstream chat-completion clients.
//!
//! # Data Flow
//! ```text
//! dispatch (selected endpoint, rewritten request)
//!     → ChatClient::create / create_stream
//!         → http.rs (reqwest, OpenAI-compatible JSON)
//!         → sse.rs (Server-Sent Events → ChatCompletionChunk)
//!     → ChatCompletion / ChunkStream or UpstreamError
//! ```
//!
//! # Design Decisions
//! - The dispatch layer only sees the `ChatClient` trait; any transport works
//! - `UpstreamError::status()` is the only hook used for fault classification

pub mod http;
pub mod sse;
pub mod types;

use async_trait::async_trait;

pub use http::{ClientBuildError, HttpChatClient};
pub use types::{
    ChatCompletion, ChatCompletionChunk, ChatCompletionRequest, ChatMessage, ChunkStream,
    UpstreamError,
};

/// A single upstream capable of serving chat completions.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Issue a non-streaming completion.
    async fn create(&self, request: &ChatCompletionRequest) -> Result<ChatCompletion, UpstreamError>;

    /// Open a streaming completion.
    async fn create_stream(&self, request: &ChatCompletionRequest) -> Result<ChunkStream, UpstreamError>;
}
