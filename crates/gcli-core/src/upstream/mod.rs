//! Backend seam: one physical call against the model API.

mod client;
pub mod retry_hint;

pub use client::CodeAssistBackend;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;

use gcli_types::GatewayError;

pub type ByteStream = BoxStream<'static, Result<Bytes, GatewayError>>;

pub enum BackendBody {
    Full(Bytes),
    Stream(ByteStream),
}

/// Raw backend answer. Non-2xx bodies are left unread until classified.
pub struct BackendResponse {
    pub status: u16,
    pub retry_after: Option<String>,
    pub body: BackendBody,
}

impl BackendResponse {
    pub fn full(status: u16, body: impl Into<Bytes>) -> Self {
        Self { status, retry_after: None, body: BackendBody::Full(body.into()) }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Drain the body into text (used for error classification).
    pub async fn into_text(self) -> String {
        match self.body {
            BackendBody::Full(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            BackendBody::Stream(mut stream) => {
                let mut buf = Vec::new();
                while let Some(chunk) = stream.next().await {
                    match chunk {
                        Ok(bytes) => buf.extend_from_slice(&bytes),
                        Err(_) => break,
                    }
                }
                String::from_utf8_lossy(&buf).into_owned()
            },
        }
    }
}

/// One outbound call.
#[derive(Debug, Clone, Copy)]
pub struct BackendCall<'a> {
    pub access_token: &'a str,
    pub project_id: &'a str,
    /// Effective backend model name (directives already stripped)
    pub model: &'a str,
    /// Gemini `GenerateContentRequest`
    pub request: &'a Value,
    pub stream: bool,
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// Transport failures surface as [`GatewayError::Transient`]; HTTP errors
    /// come back as a response with a non-2xx status.
    async fn call(&self, call: BackendCall<'_>) -> Result<BackendResponse, GatewayError>;

    /// Resolve the Code Assist project bound to this token.
    async fn discover_project(&self, access_token: &str) -> Result<String, GatewayError>;
}
