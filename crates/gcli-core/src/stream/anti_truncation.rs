use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use gcli_types::models::config::StreamConfig;
use gcli_types::GatewayError;

use super::{ChunkStream, OverlapTrimmer, StreamEvent, StreamItem, StreamMode, StreamSession};
use crate::translate::gemini::{chunk_with_parts, finish_reason, text_chunk};

const MAX_TOKENS: &str = "MAX_TOKENS";

/// Opens a streaming continuation seeded with what was delivered so far.
#[async_trait]
pub trait ContinuationSource: Send + Sync {
    async fn open(&self, delivered_text: &str) -> Result<ChunkStream, GatewayError>;
}

#[derive(Debug, Clone, Copy)]
pub struct AntiTruncationConfig {
    pub max_continuations: u32,
    pub min_overlap_chars: usize,
    pub max_overlap_chars: usize,
}

impl From<&StreamConfig> for AntiTruncationConfig {
    fn from(config: &StreamConfig) -> Self {
        Self {
            max_continuations: config.max_continuations,
            min_overlap_chars: config.min_overlap_chars,
            max_overlap_chars: config.max_overlap_chars,
        }
    }
}

/// Final chunk emitted when output is cut short and cannot be continued.
pub fn truncation_marker() -> Value {
    chunk_with_parts(Vec::new(), Some(MAX_TOKENS))
}

/// Remove a `MAX_TOKENS` finish reason from a chunk so the caller does not see
/// the segment end.
fn strip_max_tokens(chunk: &mut Value) {
    if let Some(candidates) = chunk.get_mut("candidates").and_then(Value::as_array_mut) {
        for candidate in candidates {
            if candidate.get("finishReason").and_then(Value::as_str) == Some(MAX_TOKENS) {
                if let Some(obj) = candidate.as_object_mut() {
                    obj.remove("finishReason");
                }
            }
        }
    }
}

/// Route visible text parts through the trimmer (if any), record what is
/// released and drop parts left empty.
fn process_text(
    chunk: &mut Value,
    trimmer: Option<&mut OverlapTrimmer>,
    session: &mut StreamSession,
) {
    let Some(parts) = chunk
        .get_mut("candidates")
        .and_then(Value::as_array_mut)
        .and_then(|c| c.first_mut())
        .and_then(|c| c.get_mut("content"))
        .and_then(|c| c.get_mut("parts"))
        .and_then(Value::as_array_mut)
    else {
        return;
    };

    let mut trimmer = trimmer;
    for part in parts.iter_mut() {
        if part.get("thought").and_then(Value::as_bool).unwrap_or(false) {
            continue;
        }
        let Some(text) = part.get("text").and_then(Value::as_str) else {
            continue;
        };
        let released = match trimmer.as_deref_mut() {
            Some(t) => t.push(text),
            None => text.to_string(),
        };
        session.record_emitted(&released);
        part["text"] = Value::String(released);
    }
    parts.retain(|p| p.get("text").and_then(Value::as_str) != Some(""));
}

/// Worth forwarding: has parts, a finish reason or usage.
fn has_payload(chunk: &Value) -> bool {
    let candidate = chunk.get("candidates").and_then(Value::as_array).and_then(|c| c.first());
    let has_parts = candidate
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)
        .is_some_and(|p| !p.is_empty());
    has_parts
        || candidate.and_then(|c| c.get("finishReason")).is_some()
        || chunk.get("usageMetadata").is_some()
}

/// Stitch continuation segments onto `first` until a natural finish.
///
/// A segment is truncated when its last finish reason is `MAX_TOKENS` or it has
/// none. Errors after output started and continuation failures end the stream
/// with [`truncation_marker`]; an error before any output is surfaced as is.
pub fn anti_truncation_stream(
    first: ChunkStream,
    source: Arc<dyn ContinuationSource>,
    config: AntiTruncationConfig,
) -> ChunkStream {
    let stream = async_stream::stream! {
        let mut session = StreamSession::new(StreamMode::AntiTruncation);
        let mut current = first;
        let mut trimmer: Option<OverlapTrimmer> = None;

        loop {
            let mut last_finish: Option<String> = None;
            let mut failure: Option<GatewayError> = None;

            while let Some(item) = current.next().await {
                match item {
                    StreamItem::Chunk(mut chunk) => {
                        session.advance(StreamEvent::Started);
                        let ends = finish_reason(&chunk).map(str::to_string);
                        strip_max_tokens(&mut chunk);
                        process_text(&mut chunk, trimmer.as_mut(), &mut session);
                        if ends.is_some() {
                            last_finish = ends;
                            // Held-back text must precede the finish chunk.
                            if let Some(rest) = trimmer.as_mut().map(OverlapTrimmer::finish) {
                                if !rest.is_empty() {
                                    session.record_emitted(&rest);
                                    yield StreamItem::Chunk(text_chunk(&rest));
                                }
                            }
                        }
                        if has_payload(&chunk) {
                            yield StreamItem::Chunk(chunk);
                        }
                    },
                    StreamItem::KeepAlive => yield StreamItem::KeepAlive,
                    StreamItem::Error(e) => {
                        failure = Some(e);
                        break;
                    },
                }
            }

            if let Some(mut t) = trimmer.take() {
                let rest = t.finish();
                if !rest.is_empty() {
                    session.record_emitted(&rest);
                    yield StreamItem::Chunk(text_chunk(&rest));
                }
            }

            if let Some(error) = failure {
                if session.accumulated_text.is_empty() && session.continuation_count == 0 {
                    session.advance(StreamEvent::Failed);
                    yield StreamItem::Error(error);
                    return;
                }
                warn!("[Stream] Segment failed after partial output, closing as truncated: {}", error);
                session.advance(StreamEvent::Finished);
                yield StreamItem::Chunk(truncation_marker());
                return;
            }

            let truncated = matches!(last_finish.as_deref(), None | Some(MAX_TOKENS));
            if !truncated {
                session.advance(StreamEvent::Finished);
                if session.continuation_count > 0 {
                    info!(
                        "[Stream] Completed after {} continuation(s), {} chars",
                        session.continuation_count,
                        session.last_emitted_offset
                    );
                }
                return;
            }

            if session.continuation_count >= config.max_continuations {
                warn!(
                    "[Stream] Continuation cap {} reached, closing as truncated",
                    config.max_continuations
                );
                session.advance(StreamEvent::Finished);
                yield StreamItem::Chunk(truncation_marker());
                return;
            }

            session.advance(StreamEvent::Truncated);
            session.continuation_count += 1;
            info!(
                "[Stream] Output truncated ({}) at char {}, continuation {}/{}",
                last_finish.as_deref().unwrap_or("no finish reason"),
                session.last_emitted_offset,
                session.continuation_count,
                config.max_continuations
            );

            match source.open(&session.accumulated_text).await {
                Ok(next) => {
                    session.advance(StreamEvent::Resumed);
                    trimmer = Some(OverlapTrimmer::new(
                        &session.accumulated_text,
                        config.min_overlap_chars,
                        config.max_overlap_chars,
                    ));
                    current = next;
                },
                Err(e) => {
                    warn!("[Stream] Continuation request failed, closing as truncated: {}", e);
                    session.advance(StreamEvent::Finished);
                    yield StreamItem::Chunk(truncation_marker());
                    return;
                },
            }
        }
    };
    stream.boxed()
}
