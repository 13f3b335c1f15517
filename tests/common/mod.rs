//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use llm_lb::upstream::{ChunkStream, UpstreamError};
use llm_lb::upstream::types::{ChatCompletionChunk, ChunkChoice, Delta};
use llm_lb::{ChatClient, ChatCompletion, ChatCompletionRequest, EndpointConfig};

/// How a mock endpoint answers.
#[derive(Debug, Clone, PartialEq)]
pub enum Behavior {
    /// Reply with its own name as content; streams yield two chunks.
    Succeed,
    /// Fail with this HTTP status.
    Status(u16),
    /// Fail before any response.
    Transport,
    /// Streams yield one chunk and then break. Unary calls succeed.
    BreakMidStream,
}

/// Scriptable in-memory `ChatClient`.
pub struct MockClient {
    name: String,
    behavior: Mutex<Behavior>,
    calls: AtomicU32,
    models: Mutex<Vec<String>>,
}

impl MockClient {
    pub fn new(name: &str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            behavior: Mutex::new(behavior),
            calls: AtomicU32::new(0),
            models: Mutex::new(Vec::new()),
        })
    }

    pub fn set(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Models seen on the wire, in call order.
    pub fn models(&self) -> Vec<String> {
        self.models.lock().unwrap().clone()
    }

    fn begin(&self, request: &ChatCompletionRequest) -> Behavior {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.models.lock().unwrap().push(request.model.clone());
        self.behavior.lock().unwrap().clone()
    }

    fn chunk(&self, content: &str) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: format!("chunk-{}", self.name),
            model: String::new(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: Delta { role: None, content: Some(content.to_string()) },
                finish_reason: None,
            }],
        }
    }
}

fn failure(behavior: &Behavior) -> UpstreamError {
    match behavior {
        Behavior::Status(status) => UpstreamError::Api {
            status: *status,
            message: format!("mock status {}", status),
        },
        _ => UpstreamError::Transport("connection refused".into()),
    }
}

#[async_trait]
impl ChatClient for MockClient {
    async fn create(&self, request: &ChatCompletionRequest) -> Result<ChatCompletion, UpstreamError> {
        match self.begin(request) {
            Behavior::Succeed | Behavior::BreakMidStream => Ok(completion(&self.name, &request.model)),
            other => Err(failure(&other)),
        }
    }

    async fn create_stream(&self, request: &ChatCompletionRequest) -> Result<ChunkStream, UpstreamError> {
        let items = match self.begin(request) {
            Behavior::Succeed => vec![Ok(self.chunk(&self.name)), Ok(self.chunk("!"))],
            Behavior::BreakMidStream => vec![
                Ok(self.chunk(&self.name)),
                Err(UpstreamError::Stream("connection reset".into())),
            ],
            other => return Err(failure(&other)),
        };
        Ok(Box::pin(stream::iter(items)))
    }
}

pub fn completion(content: &str, model: &str) -> ChatCompletion {
    serde_json::from_value(serde_json::json!({
        "id": "chatcmpl-mock",
        "model": model,
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}, "finish_reason": "stop"}]
    }))
    .unwrap()
}

/// Descriptor for a mock endpoint; no key needed.
pub fn descriptor(index: usize) -> EndpointConfig {
    EndpointConfig {
        base_url: format!("http://mock-{}.local/v1", index),
        ..Default::default()
    }
}

/// A request as received by the mock HTTP backend.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Request line and headers, header names lowercased.
    pub head: String,
    pub body: String,
}

/// Canned HTTP response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl MockResponse {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self { status, content_type: "application/json", body: body.to_string() }
    }

    pub fn sse(events: &[&str]) -> Self {
        let body = events.iter().map(|e| format!("data: {}\n\n", e)).collect();
        Self { status: 200, content_type: "text/event-stream", body }
    }
}

/// Start a programmable HTTP/1.1 backend on an ephemeral port.
pub async fn start_backend<F>(handler: F) -> SocketAddr
where
    F: Fn(&RecordedRequest) -> MockResponse + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let handler = handler.clone();
            tokio::spawn(async move {
                let Some(request) = read_request(&mut socket).await else {
                    return;
                };
                let response = handler(&request);
                let raw = format!(
                    "HTTP/1.1 {} Mock\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    response.status,
                    response.content_type,
                    response.body.len(),
                    response.body
                );
                let _ = socket.write_all(raw.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_lowercase();
    let content_length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let body_start = head_end + 4;
    while buf.len() < body_start + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let body = String::from_utf8_lossy(&buf[body_start..]).into_owned();
    Some(RecordedRequest { head, body })
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}
