//! Stream shaping.
//!
//! Every mode produces a [`ChunkStream`] of Gemini response chunks (already
//! unwrapped from the Code Assist envelope). Dialect-specific SSE encoding
//! happens at the HTTP edge via [`sse`].
//!
//! - `Real`: backend SSE forwarded chunk by chunk.
//! - `Fake`: one non-streaming call, keep-alives while waiting, then the text
//!   is sliced into fixed-size chunks.
//! - `AntiTruncation`: like `Real`, but a segment that ends on `MAX_TOKENS` (or
//!   with no finish reason) triggers a continuation call whose output is
//!   de-duplicated against what was already delivered.

mod anti_truncation;
mod fake;
mod overlap;
mod real;
pub mod sse;
mod state;

pub use anti_truncation::{anti_truncation_stream, truncation_marker, AntiTruncationConfig, ContinuationSource};
pub use fake::{fake_stream, slice_response, FakeStreamConfig};
pub use overlap::OverlapTrimmer;
pub use real::real_stream;
pub use state::{StreamEvent, StreamSession, StreamState};

use futures::stream::BoxStream;
use serde::Serialize;
use serde_json::Value;

use gcli_types::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamMode {
    #[default]
    Real,
    Fake,
    AntiTruncation,
}

#[derive(Debug, Clone)]
pub enum StreamItem {
    /// One Gemini `GenerateContentResponse` chunk
    Chunk(Value),
    /// Nothing to send yet; keep the connection open
    KeepAlive,
    /// Terminal failure after the response has started
    Error(GatewayError),
}

pub type ChunkStream = BoxStream<'static, StreamItem>;
