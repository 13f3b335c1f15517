//! Server-Sent Events decoding for streaming completions.
//!
//! Bytes accumulate until a blank line closes an event; only complete events
//! are parsed, so chunks split anywhere by the transport reassemble correctly.
//! `data: [DONE]` terminates the stream.

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;

use futures_util::{stream, Stream, StreamExt};

use crate::upstream::types::{ChatCompletionChunk, ChunkStream, UpstreamError};

const DONE_MARKER: &str = "[DONE]";

struct Decoder<S> {
    inner: Pin<Box<S>>,
    buffer: Vec<u8>,
    pending: VecDeque<Result<ChatCompletionChunk, UpstreamError>>,
    finished: bool,
}

impl<S> Decoder<S> {
    /// Parse every complete event currently buffered.
    fn drain_events(&mut self) {
        while let Some(end) = find_event_end(&self.buffer) {
            let raw: Vec<u8> = self.buffer.drain(..end + 2).collect();
            self.push_event(&String::from_utf8_lossy(&raw));
            if self.finished {
                self.buffer.clear();
                return;
            }
        }
    }

    fn push_event(&mut self, raw: &str) {
        let Some(data) = event_data(raw) else {
            return;
        };
        if data == DONE_MARKER {
            self.finished = true;
            return;
        }
        self.pending.push_back(parse_chunk(&data));
    }
}

fn find_event_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

/// Join the `data:` lines of one event. Comments and other fields are skipped.
fn event_data(raw: &str) -> Option<String> {
    let mut data: Option<String> = None;
    for line in raw.lines() {
        if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            match data.as_mut() {
                Some(d) => {
                    d.push('\n');
                    d.push_str(value);
                }
                None => data = Some(value.to_string()),
            }
        }
    }
    data
}

fn parse_chunk(data: &str) -> Result<ChatCompletionChunk, UpstreamError> {
    let value: serde_json::Value =
        serde_json::from_str(data).map_err(|e| UpstreamError::Decode(e.to_string()))?;

    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(UpstreamError::Stream(message));
    }

    serde_json::from_value(value).map_err(|e| UpstreamError::Decode(e.to_string()))
}

/// Turn a raw byte stream into a stream of completion chunks.
///
/// A transport error ends the stream after yielding `UpstreamError::Stream`.
pub fn decode_chunks<S, B, E>(bytes: S) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let decoder = Decoder {
        inner: Box::pin(bytes),
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::unfold(decoder, |mut decoder| async move {
        loop {
            if let Some(item) = decoder.pending.pop_front() {
                return Some((item, decoder));
            }
            if decoder.finished {
                return None;
            }
            match decoder.inner.next().await {
                Some(Ok(bytes)) => {
                    decoder
                        .buffer
                        .extend(bytes.as_ref().iter().copied().filter(|b| *b != b'\r'));
                    decoder.drain_events();
                }
                Some(Err(e)) => {
                    decoder.finished = true;
                    return Some((Err(UpstreamError::Stream(e.to_string())), decoder));
                }
                None => {
                    decoder.finished = true;
                    if !decoder.buffer.is_empty() {
                        let rest = std::mem::take(&mut decoder.buffer);
                        decoder.push_event(&String::from_utf8_lossy(&rest));
                    }
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn byte_stream(parts: Vec<&'static str>) -> impl Stream<Item = Result<&'static [u8], String>> {
        stream::iter(parts.into_iter().map(|p| Ok(p.as_bytes())))
    }

    #[tokio::test]
    async fn test_decodes_events_split_across_chunks() {
        let parts = vec![
            "data: {\"id\":\"a\",\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n",
            "\ndata: {\"id\":\"a\",\"choices\":[{\"del",
            "ta\":{\"content\":\"lo\"}}]}\r\n\r\n",
            "data: [DONE]\n\n",
        ];
        let chunks: Vec<_> = decode_chunks(byte_stream(parts)).collect().await;

        assert_eq!(chunks.len(), 2);
        let text: String = chunks
            .iter()
            .map(|c| c.as_ref().unwrap().choices[0].delta.content.clone().unwrap())
            .collect();
        assert_eq!(text, "Hello");
    }

    #[tokio::test]
    async fn test_stops_at_done_marker() {
        let parts = vec![
            ": keep-alive\n\n",
            "data: {\"choices\":[]}\n\ndata: [DONE]\n\ndata: {\"choices\":[]}\n\n",
        ];
        let chunks: Vec<_> = decode_chunks(byte_stream(parts)).collect().await;
        assert_eq!(chunks.len(), 1);
    }

    #[tokio::test]
    async fn test_error_event_and_transport_error() {
        let parts = vec!["data: {\"error\":{\"message\":\"overloaded\"}}\n\n"];
        let chunks: Vec<_> = decode_chunks(byte_stream(parts)).collect().await;
        assert!(matches!(&chunks[0], Err(UpstreamError::Stream(m)) if m == "overloaded"));

        let failing = stream::iter(vec![
            Ok::<&[u8], String>(b"data: {\"choices\":[]}\n\n"),
            Err("connection reset".to_string()),
        ]);
        let chunks: Vec<_> = decode_chunks(failing).collect().await;
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].is_ok());
        assert!(matches!(&chunks[1], Err(UpstreamError::Stream(_))));
    }

    #[tokio::test]
    async fn test_trailing_event_without_blank_line() {
        let parts = vec!["data: {\"id\":\"tail\",\"choices\":[]}"];
        let chunks: Vec<_> = decode_chunks(byte_stream(parts)).collect().await;
        assert_eq!(chunks[0].as_ref().unwrap().id, "tail");
    }
}
