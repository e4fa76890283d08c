use futures::future::BoxFuture;
use futures::StreamExt;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use gcli_types::models::config::StreamConfig;
use gcli_types::GatewayError;

use super::{ChunkStream, StreamEvent, StreamItem, StreamMode, StreamSession};
use crate::translate::gemini::{candidate_parts, chunk_with_parts, finish_reason, text_chunk};

#[derive(Debug, Clone, Copy)]
pub struct FakeStreamConfig {
    pub chunk_chars: usize,
    pub chunk_interval: Duration,
    pub keepalive_interval: Duration,
}

impl From<&StreamConfig> for FakeStreamConfig {
    fn from(config: &StreamConfig) -> Self {
        Self {
            chunk_chars: config.fake_chunk_chars.max(1),
            chunk_interval: Duration::from_millis(config.fake_chunk_interval_ms),
            keepalive_interval: Duration::from_secs(config.keepalive_interval_secs.max(1)),
        }
    }
}

/// Slice a complete response into stream chunks.
///
/// Thought text (if any) comes first as one chunk, then the visible text in
/// `chunk_chars` slices. The last chunk carries the finish reason, usage and any
/// non-text parts (function calls, inline data).
pub fn slice_response(response: &Value, chunk_chars: usize) -> Vec<Value> {
    let parts = candidate_parts(response);
    let mut chunks = Vec::new();

    let thought: String = parts
        .iter()
        .filter(|p| p.get("thought").and_then(Value::as_bool).unwrap_or(false))
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    if !thought.is_empty() {
        chunks.push(chunk_with_parts(vec![json!({"text": thought, "thought": true})], None));
    }

    let text: Vec<char> = parts
        .iter()
        .filter(|p| !p.get("thought").and_then(Value::as_bool).unwrap_or(false))
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .flat_map(str::chars)
        .collect();
    for slice in text.chunks(chunk_chars.max(1)) {
        chunks.push(text_chunk(&slice.iter().collect::<String>()));
    }

    let extra: Vec<Value> = parts.iter().filter(|p| p.get("text").is_none()).cloned().collect();
    let mut last = chunk_with_parts(extra, Some(finish_reason(response).unwrap_or("STOP")));
    if let Some(usage) = response.get("usageMetadata") {
        last["usageMetadata"] = usage.clone();
    }
    chunks.push(last);
    chunks
}

/// Emit keep-alives until `response` resolves, then its slices at a steady cadence.
pub fn fake_stream(
    response: BoxFuture<'static, Result<Value, GatewayError>>,
    config: FakeStreamConfig,
) -> ChunkStream {
    let stream = async_stream::stream! {
        let mut session = StreamSession::new(StreamMode::Fake);
        let mut response = response;
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + config.keepalive_interval,
            config.keepalive_interval,
        );

        let result = loop {
            let ready = tokio::select! {
                result = &mut response => Some(result),
                _ = ticker.tick() => None,
            };
            match ready {
                Some(result) => break result,
                None => yield StreamItem::KeepAlive,
            }
        };

        match result {
            Ok(full) => {
                let chunks = slice_response(&full, config.chunk_chars);
                debug!("[Stream] Fake stream emitting {} chunks", chunks.len());
                let total = chunks.len();
                for (i, chunk) in chunks.into_iter().enumerate() {
                    yield StreamItem::Chunk(chunk);
                    if i + 1 < total && !config.chunk_interval.is_zero() {
                        tokio::time::sleep(config.chunk_interval).await;
                    }
                }
                session.advance(StreamEvent::Finished);
            },
            Err(e) => {
                session.advance(StreamEvent::Failed);
                yield StreamItem::Error(e);
            },
        }
    };
    stream.boxed()
}
