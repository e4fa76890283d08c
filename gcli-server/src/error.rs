//! `GatewayError` → HTTP responses in the caller's dialect.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use gcli_types::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    OpenAI,
    Google,
}

#[derive(Debug)]
pub struct ApiError {
    dialect: Dialect,
    error: GatewayError,
}

impl ApiError {
    pub fn openai(error: GatewayError) -> Self {
        Self { dialect: Dialect::OpenAI, error }
    }

    pub fn google(error: GatewayError) -> Self {
        Self { dialect: Dialect::Google, error }
    }

    pub fn invalid_request(dialect: Dialect, message: impl Into<String>) -> Self {
        Self { dialect, error: GatewayError::Translation { message: message.into() } }
    }
}

fn openai_type(status: u16) -> &'static str {
    match status {
        400 | 404 => "invalid_request_error",
        401 | 403 => "authentication_error",
        429 => "rate_limit_error",
        503 => "service_unavailable",
        _ => "api_error",
    }
}

/// `{"error": {"message", "type", "code"}}`
pub fn openai_error_body(error: &GatewayError) -> Value {
    let status = error.http_status_code();
    json!({
        "error": {
            "message": error.to_string(),
            "type": openai_type(status),
            "code": status,
        }
    })
}

/// `{"error": {"code", "message", "status"}}`
pub fn google_error_body(error: &GatewayError) -> Value {
    json!({
        "error": {
            "code": error.http_status_code(),
            "message": error.to_string(),
            "status": error.rpc_status(),
        }
    })
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.error.http_status_code()).unwrap_or(StatusCode::BAD_GATEWAY);
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.error);
        } else {
            tracing::warn!("Request failed: {}", self.error);
        }
        let body = match self.dialect {
            Dialect::OpenAI => openai_error_body(&self.error),
            Dialect::Google => google_error_body(&self.error),
        };
        (status, Json(body)).into_response()
    }
}
