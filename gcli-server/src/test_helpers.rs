use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration, Utc};
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;

use gcli_core::refresh::{IssuedToken, RefreshError, TokenExchanger};
use gcli_core::storage::{CredentialRepository, MemoryStore};
use gcli_core::upstream::{Backend, BackendBody, BackendCall, BackendResponse};
use gcli_core::usage::{ErrorLog, NoopUsageSink};
use gcli_core::{CredentialPool, Dispatcher, Gateway, TokenRefresher};
use gcli_types::models::config::{PoolConfig, RetryConfig, ServerConfig, StreamConfig};
use gcli_types::{AccessToken, CredentialRecord, GatewayError, OwnerScope, SecretMaterial};

use crate::state::AppState;

pub const USER_KEY: &str = "sk-alice";
pub const GLOBAL_KEY: &str = "sk-global";
pub const ADMIN_KEY: &str = "admin-key";

/// Replays scripted `(status, body)` pairs; streaming calls receive the body
/// split per line. Unscripted calls answer "Hello" with finish reason STOP.
pub struct StubBackend {
    replies: Mutex<VecDeque<(u16, String)>>,
    pub requests: Mutex<Vec<(Value, bool)>>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self { replies: Mutex::new(VecDeque::new()), requests: Mutex::new(Vec::new()) }
    }

    pub fn push(&self, status: u16, body: impl Into<String>) {
        self.replies.lock().push_back((status, body.into()));
    }
}

#[async_trait]
impl Backend for StubBackend {
    async fn call(&self, call: BackendCall<'_>) -> Result<BackendResponse, GatewayError> {
        self.requests.lock().push((call.request.clone(), call.stream));
        let (status, body) = self.replies.lock().pop_front().unwrap_or_else(|| {
            if call.stream {
                (200, sse(&[gemini_response("Hello", Some("STOP"))]))
            } else {
                (200, gemini_response("Hello", Some("STOP")).to_string())
            }
        });
        if call.stream && status == 200 {
            let pieces: Vec<Result<Bytes, GatewayError>> =
                body.split_inclusive('\n').map(|l| Ok(Bytes::from(l.to_string()))).collect();
            return Ok(BackendResponse {
                status,
                retry_after: None,
                body: BackendBody::Stream(futures::stream::iter(pieces).boxed()),
            });
        }
        Ok(BackendResponse::full(status, Bytes::from(body)))
    }

    async fn discover_project(&self, _access_token: &str) -> Result<String, GatewayError> {
        Ok("test-project".to_string())
    }
}

struct NeverExchanger;

#[async_trait]
impl TokenExchanger for NeverExchanger {
    async fn exchange(&self, _secret: &SecretMaterial) -> Result<IssuedToken, RefreshError> {
        Err(RefreshError::Network("no token endpoint in tests".to_string()))
    }
}

/// Code Assist envelope around a single-candidate response.
pub fn gemini_response(text: &str, finish: Option<&str>) -> Value {
    let mut candidate = json!({"content": {"role": "model", "parts": [{"text": text}]}});
    if let Some(reason) = finish {
        candidate["finishReason"] = json!(reason);
    }
    json!({"response": {"candidates": [candidate]}})
}

pub fn sse(events: &[Value]) -> String {
    events.iter().map(|e| format!("data: {}\n\n", e)).collect()
}

pub fn fresh_record(id: &str, owner: OwnerScope) -> CredentialRecord {
    let mut record = CredentialRecord::new(
        id,
        SecretMaterial::OAuthUser {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            refresh_token: "refresh".to_string(),
            token_uri: None,
            scopes: Vec::new(),
        },
        owner,
    );
    record.access_token = Some(AccessToken::new("token"));
    record.access_token_expiry = Some(Utc::now() + Duration::hours(1));
    record.project_id = Some("test-project".to_string());
    record
}

pub fn server_config() -> ServerConfig {
    let mut server = ServerConfig::default();
    server.api_keys.insert(USER_KEY.to_string(), Some("alice".to_string()));
    server.api_keys.insert(GLOBAL_KEY.to_string(), None);
    server.admin_key = Some(ADMIN_KEY.to_string());
    server
}

/// State over an in-memory pool with one fresh global credential.
pub async fn create_test_state() -> (AppState, Arc<StubBackend>) {
    create_state_with(server_config(), vec![fresh_record("global-1", OwnerScope::Global)]).await
}

pub async fn create_state_with(
    server: ServerConfig,
    records: Vec<CredentialRecord>,
) -> (AppState, Arc<StubBackend>) {
    let pool = Arc::new(CredentialPool::new(
        CredentialRepository::new(Arc::new(MemoryStore::new())),
        PoolConfig::default(),
    ));
    for record in records {
        pool.add(record).await.unwrap();
    }

    let backend = Arc::new(StubBackend::new());
    let refresher = Arc::new(TokenRefresher::new(pool.clone(), Arc::new(NeverExchanger), 60));
    let dispatcher = Arc::new(Dispatcher::new(
        pool,
        refresher,
        backend.clone(),
        Arc::new(NoopUsageSink),
        Arc::new(ErrorLog::new()),
        RetryConfig { max_attempts: 1, ..RetryConfig::default() },
    ));
    let stream = StreamConfig { fake_chunk_interval_ms: 0, ..StreamConfig::default() };
    let gateway = Arc::new(Gateway::new(dispatcher, stream, vec!["gemini-2.5-pro".to_string()]));
    (AppState::new(gateway, &server), backend)
}
