//! SSE decoding (backend) and encoding (caller).

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::debug;

use gcli_types::GatewayError;

use super::{ChunkStream, StreamItem};
use crate::translate::gemini::unwrap_response;
use crate::upstream::ByteStream;

pub const KEEPALIVE: &str = ": keep-alive\n\n";
pub const DONE: &str = "data: [DONE]\n\n";

/// Incremental `data:` line decoder.
#[derive(Default)]
pub struct SseDecoder {
    buffer: BytesMut,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed bytes, returning every complete JSON event.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Value> {
        self.buffer.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line = self.buffer.split_to(pos + 1);
            if let Some(value) = self.parse_line(&line) {
                out.push(value);
            }
        }
        out
    }

    /// Flush a trailing line without newline.
    pub fn finish(&mut self) -> Option<Value> {
        let rest = self.buffer.split();
        self.parse_line(&rest)
    }

    fn parse_line(&mut self, raw: &[u8]) -> Option<Value> {
        if self.done {
            return None;
        }
        let line = std::str::from_utf8(raw).ok()?.trim();
        let data = line.strip_prefix("data:")?.trim();
        if data == "[DONE]" {
            self.done = true;
            return None;
        }
        match serde_json::from_str::<Value>(data) {
            Ok(json) => Some(unwrap_response(json)),
            Err(e) => {
                debug!("[Stream] Skipping unparsable SSE data ({}): {}", e, data);
                None
            },
        }
    }
}

/// Decode a backend SSE byte stream into chunks.
pub fn decode_stream(mut bytes: ByteStream) -> ChunkStream {
    let stream = async_stream::stream! {
        let mut decoder = SseDecoder::new();
        while let Some(item) = bytes.next().await {
            match item {
                Ok(data) => {
                    for chunk in decoder.push(&data) {
                        yield StreamItem::Chunk(chunk);
                    }
                    if decoder.is_done() {
                        break;
                    }
                },
                Err(e) => {
                    yield StreamItem::Error(e);
                    return;
                },
            }
        }
        if let Some(chunk) = decoder.finish() {
            yield StreamItem::Chunk(chunk);
        }
    };
    stream.boxed()
}

pub fn data_event(value: &Value) -> Bytes {
    Bytes::from(format!("data: {}\n\n", serde_json::to_string(value).unwrap_or_default()))
}

/// Error event sent when a stream fails after it started.
pub fn error_event(error: &GatewayError) -> Bytes {
    data_event(&json!({
        "error": {
            "message": error.to_string(),
            "code": error.http_status_code(),
            "status": error.rpc_status(),
        }
    }))
}
