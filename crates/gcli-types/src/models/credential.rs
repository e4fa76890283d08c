//! Credential record model.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which token exchange a credential uses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    #[serde(rename = "oauth_user")]
    OAuthUser,
    ServiceAccount,
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OAuthUser => f.write_str("oauth_user"),
            Self::ServiceAccount => f.write_str("service_account"),
        }
    }
}

/// Long-lived secret used to mint access tokens.
///
/// `Debug` never prints the secret fields.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SecretMaterial {
    #[serde(rename = "oauth_user")]
    OAuthUser {
        client_id: String,
        client_secret: String,
        refresh_token: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token_uri: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        scopes: Vec<String>,
    },
    ServiceAccount {
        client_email: String,
        private_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        private_key_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token_uri: Option<String>,
    },
}

impl SecretMaterial {
    pub fn kind(&self) -> CredentialKind {
        match self {
            Self::OAuthUser { .. } => CredentialKind::OAuthUser,
            Self::ServiceAccount { .. } => CredentialKind::ServiceAccount,
        }
    }

    /// Token endpoint override carried by the credential file, if any.
    pub fn token_uri(&self) -> Option<&str> {
        match self {
            Self::OAuthUser { token_uri, .. } | Self::ServiceAccount { token_uri, .. } => {
                token_uri.as_deref()
            },
        }
    }
}

impl fmt::Debug for SecretMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OAuthUser { client_id, .. } => f
                .debug_struct("OAuthUser")
                .field("client_id", client_id)
                .field("refresh_token", &"<redacted>")
                .finish_non_exhaustive(),
            Self::ServiceAccount { client_email, .. } => f
                .debug_struct("ServiceAccount")
                .field("client_email", client_email)
                .field("private_key", &"<redacted>")
                .finish_non_exhaustive(),
        }
    }
}

/// Short-lived bearer token. `Debug` is redacted.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken(<{} chars>)", self.0.len())
    }
}

/// Who a credential belongs to.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum OwnerScope {
    #[default]
    Global,
    User(String),
}

impl OwnerScope {
    /// Prefix applied to ids of credentials uploaded by a user.
    pub fn id_prefix(&self) -> Option<String> {
        match self {
            Self::Global => None,
            Self::User(user) => Some(format!("u_{}_", user)),
        }
    }
}

impl fmt::Display for OwnerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::User(user) => write!(f, "user:{}", user),
        }
    }
}

/// Runtime availability of a credential.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CredentialState {
    #[default]
    Available,
    Cooldown { until: DateTime<Utc> },
    Disabled { reason: String },
}

impl CredentialState {
    /// Available, or cooling down with the window already elapsed.
    pub fn is_selectable_at(&self, now: DateTime<Utc>) -> bool {
        match self {
            Self::Available => true,
            Self::Cooldown { until } => *until <= now,
            Self::Disabled { .. } => false,
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled { .. })
    }

    /// Status label used by inspection endpoints.
    pub fn label_at(&self, now: DateTime<Utc>) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Cooldown { until } if *until <= now => "available",
            Self::Cooldown { .. } => "cooling",
            Self::Disabled { .. } => "disabled",
        }
    }

    /// Seconds left in the cooldown window (0 when not cooling).
    pub fn cooldown_remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        match self {
            Self::Cooldown { until } => until.signed_duration_since(now).num_seconds().max(0),
            _ => 0,
        }
    }
}

/// Durable representation of one credential.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialRecord {
    /// Stable unique identifier (storage key suffix)
    pub id: String,
    /// OAuth refresh material or service-account key
    pub secret: SecretMaterial,
    /// Current bearer token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<AccessToken>,
    /// Instant the bearer token stops being valid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_expiry: Option<DateTime<Utc>>,
    /// Google Cloud project used for Code Assist calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default)]
    pub owner: OwnerScope,
    #[serde(default)]
    pub state: CredentialState,
    #[serde(default)]
    pub consecutive_failure_count: u32,
    /// Successive rate-limit cooldowns without an intervening success
    #[serde(default)]
    pub cooldown_strikes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl CredentialRecord {
    pub fn new(id: impl Into<String>, secret: SecretMaterial, owner: OwnerScope) -> Self {
        Self {
            id: id.into(),
            secret,
            access_token: None,
            access_token_expiry: None,
            project_id: None,
            owner,
            state: CredentialState::Available,
            consecutive_failure_count: 0,
            cooldown_strikes: 0,
            last_used: None,
            created_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> CredentialKind {
        self.secret.kind()
    }

    /// Token present and valid for more than `margin_secs` after `now`.
    pub fn token_fresh_at(&self, now: DateTime<Utc>, margin_secs: i64) -> bool {
        match (&self.access_token, self.access_token_expiry) {
            (Some(_), Some(expiry)) => now + Duration::seconds(margin_secs) < expiry,
            _ => false,
        }
    }

    /// Id with the owning user's prefix stripped.
    pub fn display_name(&self) -> &str {
        match self.owner.id_prefix() {
            Some(prefix) => self.id.strip_prefix(prefix.as_str()).unwrap_or(&self.id),
            None => &self.id,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn oauth_secret() -> SecretMaterial {
        SecretMaterial::OAuthUser {
            client_id: "client".to_string(),
            client_secret: "shh".to_string(),
            refresh_token: "1//refresh-secret".to_string(),
            token_uri: None,
            scopes: Vec::new(),
        }
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut record = CredentialRecord::new("a", oauth_secret(), OwnerScope::Global);
        record.access_token = Some(AccessToken::new("ya29.very-secret"));

        let debug = format!("{:?}", record);
        assert!(!debug.contains("refresh-secret"));
        assert!(!debug.contains("shh"));
        assert!(!debug.contains("ya29"));
        assert!(debug.contains("client"));
    }

    #[test]
    fn test_token_freshness_margin() {
        let now = Utc::now();
        let mut record = CredentialRecord::new("a", oauth_secret(), OwnerScope::Global);
        assert!(!record.token_fresh_at(now, 60));

        record.access_token = Some(AccessToken::new("t"));
        record.access_token_expiry = Some(now + Duration::seconds(120));
        assert!(record.token_fresh_at(now, 60));
        assert!(!record.token_fresh_at(now, 120));
    }

    #[test]
    fn test_cooldown_selectability() {
        let now = Utc::now();
        let state = CredentialState::Cooldown { until: now + Duration::seconds(10) };

        assert!(!state.is_selectable_at(now));
        assert_eq!(state.label_at(now), "cooling");
        assert_eq!(state.cooldown_remaining_secs(now), 10);
        assert!(state.is_selectable_at(now + Duration::seconds(11)));
        assert_eq!(state.label_at(now + Duration::seconds(11)), "available");
    }

    #[test]
    fn test_display_name_strips_user_prefix() {
        let record =
            CredentialRecord::new("u_alice_work.json", oauth_secret(), OwnerScope::User("alice".into()));
        assert_eq!(record.display_name(), "work.json");

        let global = CredentialRecord::new("u_alice_x", oauth_secret(), OwnerScope::Global);
        assert_eq!(global.display_name(), "u_alice_x");
    }

    #[test]
    fn test_record_round_trips_with_defaults() {
        let json = r#"{
            "id": "legacy",
            "secret": {"kind": "service_account", "client_email": "sa@x.iam", "private_key": "pem"},
            "created_at": "2025-01-01T00:00:00Z"
        }"#;
        let record: CredentialRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.kind(), CredentialKind::ServiceAccount);
        assert_eq!(record.state, CredentialState::Available);
        assert_eq!(record.owner, OwnerScope::Global);
    }
}
