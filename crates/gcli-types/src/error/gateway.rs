//! Gateway error taxonomy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{ConfigError, StorageError};

/// Errors produced while turning one logical request into backend calls.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum GatewayError {
    /// No credential in the scope can currently be selected
    #[error("No usable credential in scope '{scope}'")]
    PoolExhausted { scope: String },

    /// The credential's secret material or access token was rejected
    #[error("Credential {credential_id} rejected: {message}")]
    AuthInvalid { credential_id: String, message: String },

    /// Backend answered 429 for this credential
    #[error("Credential {credential_id} rate limited{}", retry_after_secs.map(|s| format!(", retry after {}s", s)).unwrap_or_default())]
    RateLimited {
        credential_id: String,
        retry_after_secs: Option<u64>,
    },

    /// 5xx or network failure
    #[error("Transient upstream failure{}: {message}", status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Transient { status: Option<u16>, message: String },

    /// Backend rejected the request itself; retrying cannot help
    #[error("Upstream rejected request ({status}): {message}")]
    Fatal { status: u16, message: String },

    /// Retry ceiling reached
    #[error("Retries exhausted after {attempts} attempts. Last: {last}")]
    RetriesExhausted { attempts: u32, last: Box<GatewayError> },

    /// Inbound payload could not be translated
    #[error("Invalid request: {message}")]
    Translation { message: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl GatewayError {
    /// Whether the dispatcher resolves this classification internally.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::AuthInvalid { .. } | Self::RateLimited { .. } | Self::Transient { .. })
    }

    /// Whether this error should move the request to another credential.
    pub fn should_rotate_credential(&self) -> bool {
        matches!(self, Self::AuthInvalid { .. } | Self::RateLimited { .. })
    }

    /// Get HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::PoolExhausted { .. } => 503,
            Self::AuthInvalid { .. } => 401,
            Self::RateLimited { .. } => 429,
            Self::Transient { status, .. } => status.unwrap_or(502),
            Self::Fatal { status, .. } => *status,
            Self::RetriesExhausted { last, .. } => match last.as_ref() {
                Self::RateLimited { .. } => 429,
                _ => 502,
            },
            Self::Translation { .. } => 400,
            Self::Storage(_) | Self::Config(_) => 500,
        }
    }

    /// Google RPC status string used by the Gemini-native error body.
    pub fn rpc_status(&self) -> &'static str {
        match self.http_status_code() {
            400 => "INVALID_ARGUMENT",
            401 => "UNAUTHENTICATED",
            403 => "PERMISSION_DENIED",
            404 => "NOT_FOUND",
            429 => "RESOURCE_EXHAUSTED",
            503 => "UNAVAILABLE",
            500 => "INTERNAL",
            _ => "UNKNOWN",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_codes() {
        assert_eq!(GatewayError::PoolExhausted { scope: "global".to_string() }.http_status_code(), 503);
        assert_eq!(
            GatewayError::Fatal { status: 404, message: "no such model".to_string() }
                .http_status_code(),
            404
        );
        assert_eq!(
            GatewayError::Transient { status: None, message: "reset".to_string() }.http_status_code(),
            502
        );
    }

    #[test]
    fn test_retries_exhausted_status_follows_last_cause() {
        let rate_limited = GatewayError::RetriesExhausted {
            attempts: 5,
            last: Box::new(GatewayError::RateLimited {
                credential_id: "a".to_string(),
                retry_after_secs: None,
            }),
        };
        let transient = GatewayError::RetriesExhausted {
            attempts: 5,
            last: Box::new(GatewayError::Transient { status: Some(503), message: "x".to_string() }),
        };

        assert_eq!(rate_limited.http_status_code(), 429);
        assert_eq!(rate_limited.rpc_status(), "RESOURCE_EXHAUSTED");
        assert_eq!(transient.http_status_code(), 502);
    }

    #[test]
    fn test_recoverable_classes() {
        let auth = GatewayError::AuthInvalid {
            credential_id: "a".to_string(),
            message: "invalid_grant".to_string(),
        };
        let fatal = GatewayError::Fatal { status: 400, message: "bad".to_string() };

        assert!(auth.is_recoverable());
        assert!(auth.should_rotate_credential());
        assert!(!fatal.is_recoverable());
        assert!(!fatal.should_rotate_credential());
    }

    #[test]
    fn test_display_includes_retry_hint() {
        let err = GatewayError::RateLimited {
            credential_id: "cred-b".to_string(),
            retry_after_secs: Some(60),
        };
        let msg = err.to_string();
        assert!(msg.contains("cred-b"));
        assert!(msg.contains("60"));
    }
}
