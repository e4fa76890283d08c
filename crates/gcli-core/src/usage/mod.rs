//! Per-attempt usage events and the recent-error ring.
//!
//! The dispatcher emits one [`UsageEvent`] per physical backend attempt. Aggregation
//! is left to whatever [`UsageSink`] is plugged in; the default one only logs.

mod error_log;

pub use error_log::{ErrorEntry, ErrorLog};

use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use gcli_types::OwnerScope;

use crate::dispatch::AttemptOutcome;

#[derive(Debug, Clone, Serialize)]
pub struct UsageEvent {
    pub credential_id: String,
    pub scope: OwnerScope,
    pub model: String,
    pub outcome: AttemptOutcome,
    /// HTTP status, `None` for transport failures
    pub status: Option<u16>,
    #[serde(serialize_with = "as_millis")]
    pub latency: Duration,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

pub trait UsageSink: Send + Sync {
    fn record(&self, event: &UsageEvent);
}

/// Writes usage events to the log.
pub struct TracingUsageSink;

impl UsageSink for TracingUsageSink {
    fn record(&self, event: &UsageEvent) {
        match event.outcome {
            AttemptOutcome::Success => info!(
                "[Usage] {} model={} scope={} latency={}ms tokens={}/{}",
                event.credential_id,
                event.model,
                event.scope,
                event.latency.as_millis(),
                event.prompt_tokens.unwrap_or(0),
                event.completion_tokens.unwrap_or(0),
            ),
            outcome => debug!(
                "[Usage] {} model={} outcome={:?} status={:?} latency={}ms",
                event.credential_id,
                event.model,
                outcome,
                event.status,
                event.latency.as_millis(),
            ),
        }
    }
}

/// Discards events.
pub struct NoopUsageSink;

impl UsageSink for NoopUsageSink {
    fn record(&self, _event: &UsageEvent) {}
}
