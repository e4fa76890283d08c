use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{header, Client};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use gcli_types::models::config::UpstreamConfig;
use gcli_types::GatewayError;

use super::{Backend, BackendBody, BackendCall, BackendResponse};

/// Gemini Code Assist `v1internal` client.
pub struct CodeAssistBackend {
    http_client: Client,
    base_url: String,
    user_agent: String,
}

pub fn build_url(base_url: &str, method: &str, query_string: Option<&str>) -> String {
    if let Some(qs) = query_string {
        format!("{}/v1internal:{}?{}", base_url, method, qs)
    } else {
        format!("{}/v1internal:{}", base_url, method)
    }
}

impl CodeAssistBackend {
    /// Accepts a pre-built client so TLS setup happens outside request paths.
    pub fn new(http_client: Client, base_url: &str, user_agent: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_agent: user_agent.into(),
        }
    }

    /// Build a client from config (timeout, optional outbound proxy).
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, GatewayError> {
        let mut builder =
            Client::builder().timeout(Duration::from_secs(config.request_timeout_secs));
        if let Some(proxy_url) = &config.proxy_url {
            let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| GatewayError::Config(
                gcli_types::ConfigError::ValidationError {
                    field: "upstream.proxy_url".to_string(),
                    message: e.to_string(),
                },
            ))?;
            builder = builder.proxy(proxy);
        }
        let client = builder.build().map_err(|e| GatewayError::Transient {
            status: None,
            message: format!("HTTP client build failed: {}", e),
        })?;
        Ok(Self::new(client, &config.base_url, config.user_agent.clone()))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn headers(&self, access_token: &str) -> Result<header::HeaderMap, GatewayError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", access_token)).map_err(|_| {
                GatewayError::AuthInvalid {
                    credential_id: String::new(),
                    message: "access token contains invalid header characters".to_string(),
                }
            })?,
        );
        if let Ok(ua) = header::HeaderValue::from_str(&self.user_agent) {
            headers.insert(header::USER_AGENT, ua);
        }
        Ok(headers)
    }
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    GatewayError::Transient { status: None, message: format!("upstream request failed: {}", e) }
}

#[async_trait]
impl Backend for CodeAssistBackend {
    async fn call(&self, call: BackendCall<'_>) -> Result<BackendResponse, GatewayError> {
        let (method, query) = if call.stream {
            ("streamGenerateContent", Some("alt=sse"))
        } else {
            ("generateContent", None)
        };
        let url = build_url(&self.base_url, method, query);
        let body = json!({
            "model": call.model,
            "project": call.project_id,
            "request": call.request,
        });

        debug!("[Upstream] POST {} model={} stream={}", url, call.model, call.stream);

        let response = self
            .http_client
            .post(&url)
            .headers(self.headers(call.access_token)?)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = if call.stream && response.status().is_success() {
            BackendBody::Stream(response.bytes_stream().map(|r| r.map_err(transport_error)).boxed())
        } else {
            BackendBody::Full(response.bytes().await.map_err(transport_error)?)
        };

        Ok(BackendResponse { status, retry_after, body })
    }

    async fn discover_project(&self, access_token: &str) -> Result<String, GatewayError> {
        let url = build_url(&self.base_url, "loadCodeAssist", None);
        let request_body = json!({
            "metadata": {
                "ideType": "IDE_UNSPECIFIED",
                "platform": "PLATFORM_UNSPECIFIED",
                "pluginType": "GEMINI"
            }
        });

        let response = self
            .http_client
            .post(&url)
            .headers(self.headers(access_token)?)
            .json(&request_body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = format!("loadCodeAssist returned {}: {}", status, text);
            return Err(match status.as_u16() {
                401 | 403 => GatewayError::AuthInvalid { credential_id: String::new(), message },
                code if status.is_server_error() => {
                    GatewayError::Transient { status: Some(code), message }
                },
                code => GatewayError::Fatal { status: code, message },
            });
        }

        let data: Value = response.json().await.map_err(transport_error)?;
        match data.get("cloudaicompanionProject") {
            Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
            Some(Value::Object(obj)) => obj
                .get("id")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .ok_or_else(|| missing_project(&data)),
            _ => Err(missing_project(&data)),
        }
    }
}

fn missing_project(data: &Value) -> GatewayError {
    let tier = data
        .get("currentTier")
        .and_then(|t| t.get("id"))
        .and_then(Value::as_str)
        .unwrap_or("none");
    GatewayError::AuthInvalid {
        credential_id: String::new(),
        message: format!("no Code Assist project bound to credential (tier: {})", tier),
    }
}
