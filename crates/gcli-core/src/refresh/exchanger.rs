//! Token exchange against Google's OAuth endpoint.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use gcli_types::SecretMaterial;

use super::jwt::build_assertion;

/// Token minted by an exchange.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_in: i64,
    /// Present when the provider rotated the refresh token
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefreshError {
    /// Refresh token or key revoked; the credential cannot recover on its own
    #[error("credential revoked: {0}")]
    Revoked(String),
    #[error("token endpoint rejected exchange ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("token endpoint unreachable: {0}")]
    Network(String),
    #[error("malformed credential or response: {0}")]
    Malformed(String),
}

/// Turns long-lived secret material into a short-lived bearer token.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(&self, secret: &SecretMaterial) -> Result<IssuedToken, RefreshError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TokenErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

const fn default_expires_in() -> i64 {
    3600
}

const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Error codes after which retrying the same secret is pointless.
const REVOKED_ERRORS: &[&str] = &["invalid_grant", "invalid_client", "unauthorized_client"];

pub struct GoogleTokenExchanger {
    client: reqwest::Client,
    default_token_uri: String,
}

impl GoogleTokenExchanger {
    pub fn new(client: reqwest::Client, default_token_uri: impl Into<String>) -> Self {
        Self { client, default_token_uri: default_token_uri.into() }
    }

    /// Build with a dedicated client carrying `timeout_secs`.
    pub fn with_timeout(
        default_token_uri: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, RefreshError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| RefreshError::Network(e.to_string()))?;
        Ok(Self::new(client, default_token_uri))
    }

    async fn post_form(
        &self,
        token_uri: &str,
        form: &[(&str, &str)],
    ) -> Result<IssuedToken, RefreshError> {
        let response = self
            .client
            .post(token_uri)
            .form(form)
            .send()
            .await
            .map_err(|e| RefreshError::Network(e.to_string()))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| RefreshError::Network(e.to_string()))?;

        if status.is_success() {
            let parsed: TokenResponse = serde_json::from_str(&text)
                .map_err(|e| RefreshError::Malformed(format!("token response: {}", e)))?;
            return Ok(IssuedToken {
                access_token: parsed.access_token,
                expires_in: parsed.expires_in,
                refresh_token: parsed.refresh_token,
            });
        }

        let body: TokenErrorBody = serde_json::from_str(&text).unwrap_or_default();
        let message = match body.error_description {
            Some(desc) if !body.error.is_empty() => format!("{}: {}", body.error, desc),
            _ if !body.error.is_empty() => body.error.clone(),
            _ => crate::storage::truncate_reason(&text, 200),
        };

        if status.as_u16() == 401 || REVOKED_ERRORS.contains(&body.error.as_str()) {
            return Err(RefreshError::Revoked(message));
        }
        Err(RefreshError::Rejected { status: status.as_u16(), message })
    }
}

#[async_trait]
impl TokenExchanger for GoogleTokenExchanger {
    async fn exchange(&self, secret: &SecretMaterial) -> Result<IssuedToken, RefreshError> {
        let token_uri = secret.token_uri().unwrap_or(self.default_token_uri.as_str()).to_string();
        match secret {
            SecretMaterial::OAuthUser { client_id, client_secret, refresh_token, .. } => {
                debug!("[Refresh] Exchanging refresh token for client {}", client_id);
                self.post_form(
                    &token_uri,
                    &[
                        ("grant_type", "refresh_token"),
                        ("refresh_token", refresh_token.as_str()),
                        ("client_id", client_id.as_str()),
                        ("client_secret", client_secret.as_str()),
                    ],
                )
                .await
            },
            SecretMaterial::ServiceAccount { client_email, private_key, private_key_id, .. } => {
                debug!("[Refresh] Signing JWT assertion for {}", client_email);
                let assertion = build_assertion(
                    client_email,
                    private_key,
                    private_key_id.as_deref(),
                    CLOUD_PLATFORM_SCOPE,
                    &token_uri,
                    chrono::Utc::now().timestamp(),
                )?;
                self.post_form(
                    &token_uri,
                    &[
                        ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                        ("assertion", assertion.as_str()),
                    ],
                )
                .await
            },
        }
    }
}
