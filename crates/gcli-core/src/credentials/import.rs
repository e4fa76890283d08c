use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use thiserror::Error;

use gcli_types::{AccessToken, CredentialRecord, OwnerScope, SecretMaterial};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImportError {
    #[error("Credential is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Credential is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Credential id '{0}' is empty after sanitizing")]
    EmptyId(String),
}

/// Google credential file as written by gcloud, the Gemini CLI or the IAM console.
#[derive(Debug, Default, Deserialize)]
struct RawCredential {
    #[serde(rename = "type")]
    kind: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    refresh_token: Option<String>,
    #[serde(alias = "access_token")]
    token: Option<String>,
    expiry: Option<String>,
    /// Milliseconds since epoch (Gemini CLI `oauth_creds.json`)
    expiry_date: Option<i64>,
    project_id: Option<String>,
    token_uri: Option<String>,
    #[serde(default)]
    scopes: Vec<String>,
    client_email: Option<String>,
    private_key: Option<String>,
    private_key_id: Option<String>,
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ImportError> {
    value.filter(|v| !v.trim().is_empty()).ok_or(ImportError::MissingField(field))
}

fn parse_expiry(raw: &RawCredential) -> Option<DateTime<Utc>> {
    if let Some(ms) = raw.expiry_date {
        return Utc.timestamp_millis_opt(ms).single();
    }
    let text = raw.expiry.as_deref()?;
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        // google-auth writes naive UTC timestamps
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").ok().map(|n| n.and_utc())
        })
}

/// Replace anything outside `[A-Za-z0-9._@-]` and drop a trailing `.json`.
pub fn sanitize_name(name: &str) -> String {
    let trimmed = name.trim();
    let base = trimmed.strip_suffix(".json").unwrap_or(trimmed);
    let mut out: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '@' | '-') { c } else { '_' })
        .collect();
    if out.starts_with('.') {
        out.replace_range(0..1, "_");
    }
    if out.ends_with(".tmp") {
        out.push('_');
    }
    out
}

/// Storage id for an imported credential.
///
/// Explicit `name`, else the project id, else the service-account email, else a
/// random id; user-owned credentials get the `u_{user}_` prefix.
pub fn derive_id(
    name: Option<&str>,
    project_id: Option<&str>,
    client_email: Option<&str>,
    owner: &OwnerScope,
) -> Result<String, ImportError> {
    let raw = name
        .or(project_id)
        .or(client_email)
        .map(str::to_string)
        .unwrap_or_else(|| format!("cred-{}", &uuid::Uuid::new_v4().simple().to_string()[..12]));
    let base = sanitize_name(&raw);
    if base.is_empty() {
        return Err(ImportError::EmptyId(raw));
    }
    Ok(match owner.id_prefix() {
        Some(prefix) if !base.starts_with(&prefix) => format!("{}{}", prefix, base),
        _ => base,
    })
}

/// Build a record from credential JSON. The OAuth token and project id carried
/// by the file, if any, are kept so the first request needs no refresh.
pub fn parse_credential(
    json: &str,
    name: Option<&str>,
    owner: OwnerScope,
) -> Result<CredentialRecord, ImportError> {
    let raw: RawCredential =
        serde_json::from_str(json).map_err(|e| ImportError::InvalidJson(e.to_string()))?;

    let expiry = parse_expiry(&raw);
    let is_service_account =
        raw.kind.as_deref() == Some("service_account") || raw.private_key.is_some();

    let client_email = raw.client_email.clone();
    let id = derive_id(name, raw.project_id.as_deref(), client_email.as_deref(), &owner)?;

    let (secret, token) = if is_service_account {
        let secret = SecretMaterial::ServiceAccount {
            client_email: required(raw.client_email, "client_email")?,
            private_key: required(raw.private_key, "private_key")?,
            private_key_id: raw.private_key_id,
            token_uri: raw.token_uri,
        };
        (secret, None)
    } else {
        let secret = SecretMaterial::OAuthUser {
            client_id: required(raw.client_id, "client_id")?,
            client_secret: required(raw.client_secret, "client_secret")?,
            refresh_token: required(raw.refresh_token, "refresh_token")?,
            token_uri: raw.token_uri,
            scopes: raw.scopes,
        };
        (secret, raw.token)
    };

    let mut record = CredentialRecord::new(id, secret, owner);
    record.project_id = raw.project_id.filter(|p| !p.is_empty());
    if let (Some(token), Some(expiry)) = (token, expiry) {
        record.access_token = Some(AccessToken::new(token));
        record.access_token_expiry = Some(expiry);
    }
    Ok(record)
}
