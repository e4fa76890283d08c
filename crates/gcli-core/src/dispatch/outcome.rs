use serde::Serialize;
use serde_json::Value;

use gcli_types::GatewayError;

/// Classification of one physical attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    RateLimited,
    AuthError,
    Transient,
    Fatal,
}

impl AttemptOutcome {
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Backend HTTP status → outcome.
pub const fn classify_status(status: u16) -> AttemptOutcome {
    match status {
        200..=299 => AttemptOutcome::Success,
        429 => AttemptOutcome::RateLimited,
        401 | 403 => AttemptOutcome::AuthError,
        408 | 500..=599 => AttemptOutcome::Transient,
        _ => AttemptOutcome::Fatal,
    }
}

/// Outcome of an error raised before or around the backend call.
pub const fn classify_error(error: &GatewayError) -> AttemptOutcome {
    match error {
        GatewayError::AuthInvalid { .. } => AttemptOutcome::AuthError,
        GatewayError::RateLimited { .. } => AttemptOutcome::RateLimited,
        GatewayError::Transient { .. } => AttemptOutcome::Transient,
        _ => AttemptOutcome::Fatal,
    }
}

/// `error.message` of a Google error body, or the raw text.
pub fn upstream_message(status: u16, body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let error = parsed.as_ref().and_then(|v| match v {
        Value::Array(items) => items.first().and_then(|i| i.get("error")),
        other => other.get("error"),
    });
    match error.and_then(|e| e.get("message")).and_then(Value::as_str) {
        Some(message) => message.to_string(),
        None if body.trim().is_empty() => format!("HTTP {}", status),
        None => crate::storage::truncate_reason(body.trim(), 500),
    }
}

/// Build the error carried forward from a non-2xx attempt.
pub fn error_for_status(
    credential_id: &str,
    status: u16,
    retry_after_secs: Option<u64>,
    body: &str,
) -> GatewayError {
    let message = upstream_message(status, body);
    match classify_status(status) {
        AttemptOutcome::RateLimited => {
            GatewayError::RateLimited { credential_id: credential_id.to_string(), retry_after_secs }
        },
        AttemptOutcome::AuthError => {
            GatewayError::AuthInvalid { credential_id: credential_id.to_string(), message }
        },
        AttemptOutcome::Transient => GatewayError::Transient { status: Some(status), message },
        AttemptOutcome::Success | AttemptOutcome::Fatal => GatewayError::Fatal { status, message },
    }
}
