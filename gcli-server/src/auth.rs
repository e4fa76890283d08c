//! API-key → caller scope resolution and the admin gate.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use subtle::ConstantTimeEq;
use tracing::warn;

use gcli_types::OwnerScope;

use crate::state::AppState;

/// Resolved caller, inserted as a request extension by [`require_api_key`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub scope: OwnerScope,
}

#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    keys: Vec<(String, OwnerScope)>,
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

impl ApiKeys {
    pub fn from_config(keys: &HashMap<String, Option<String>>) -> Self {
        let keys = keys
            .iter()
            .filter(|(key, _)| !key.is_empty())
            .map(|(key, user)| {
                let scope = match user {
                    Some(user) if !user.is_empty() => OwnerScope::User(user.clone()),
                    _ => OwnerScope::Global,
                };
                (key.clone(), scope)
            })
            .collect();
        Self { keys }
    }

    /// No keys configured: every request runs in the global scope.
    pub fn is_open(&self) -> bool {
        self.keys.is_empty()
    }

    /// Compares against every configured key so timing does not reveal a match position.
    pub fn resolve(&self, presented: &str) -> Option<OwnerScope> {
        let mut found = None;
        for (key, scope) in &self.keys {
            if constant_time_compare(presented, key) && found.is_none() {
                found = Some(scope.clone());
            }
        }
        found
    }
}

/// Key from `Authorization: Bearer`, `x-api-key`, `x-goog-api-key` or `?key=`.
pub fn extract_api_key(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.strip_prefix("Bearer ").unwrap_or(s))
        .or_else(|| headers.get("x-api-key").and_then(|h| h.to_str().ok()))
        .or_else(|| headers.get("x-goog-api-key").and_then(|h| h.to_str().ok()))
        .map(|s| s.trim().to_string())
        .or_else(|| {
            url::form_urlencoded::parse(query?.as_bytes())
                .find(|(name, _)| name == "key")
                .map(|(_, value)| value.into_owned())
        })
        .filter(|k| !k.is_empty())
}

pub async fn require_api_key(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let keys = state.api_keys();
    let scope = if keys.is_open() {
        OwnerScope::Global
    } else {
        let presented = extract_api_key(request.headers(), request.uri().query());
        match presented.as_deref().and_then(|k| keys.resolve(k)) {
            Some(scope) => scope,
            None => {
                warn!("Rejected request to {}: invalid or missing API key", request.uri().path());
                return Err(StatusCode::UNAUTHORIZED);
            },
        }
    };
    request.extensions_mut().insert(Caller { scope });
    Ok(next.run(request).await)
}

/// Admin routes are closed when no admin key is configured.
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(admin_key) = state.admin_key() else {
        return Err(StatusCode::FORBIDDEN);
    };
    let presented = extract_api_key(request.headers(), request.uri().query());
    if presented.is_some_and(|k| constant_time_compare(&k, admin_key)) {
        Ok(next.run(request).await)
    } else {
        warn!("Rejected admin request to {}", request.uri().path());
        Err(StatusCode::UNAUTHORIZED)
    }
}
