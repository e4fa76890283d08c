use futures::StreamExt;
use tracing::debug;

use super::sse::decode_stream;
use super::{ChunkStream, StreamEvent, StreamItem, StreamMode, StreamSession};
use crate::upstream::ByteStream;

/// Forward backend chunks as they arrive. Dropping the returned stream drops the
/// backend body, which aborts the HTTP call.
pub fn real_stream(bytes: ByteStream) -> ChunkStream {
    let mut inner = decode_stream(bytes);
    let stream = async_stream::stream! {
        let mut session = StreamSession::new(StreamMode::Real);
        let mut chunks = 0usize;
        while let Some(item) = inner.next().await {
            match item {
                StreamItem::Chunk(chunk) => {
                    session.advance(StreamEvent::Started);
                    chunks += 1;
                    yield StreamItem::Chunk(chunk);
                },
                StreamItem::Error(e) => {
                    session.advance(StreamEvent::Failed);
                    yield StreamItem::Error(e);
                    return;
                },
                StreamItem::KeepAlive => yield StreamItem::KeepAlive,
            }
        }
        session.advance(StreamEvent::Finished);
        debug!("[Stream] Real stream completed after {} chunks", chunks);
    };
    stream.boxed()
}
