use super::*;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use gcli_types::models::config::PoolConfig;
use gcli_types::{AccessToken, SecretMaterial};

use crate::refresh::{IssuedToken, RefreshError, TokenExchanger};
use crate::storage::{CredentialRepository, MemoryStore};
use crate::usage::NoopUsageSink;

/// Backend that replays scripted statuses and records which token called it.
struct ScriptedBackend {
    script: Mutex<VecDeque<u16>>,
    fallback: u16,
    calls: Mutex<Vec<String>>,
    /// Access tokens whose project lookup answers 404.
    unknown_projects: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    fn new(script: &[u16], fallback: u16) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.iter().copied().collect()),
            fallback,
            calls: Mutex::new(Vec::new()),
            unknown_projects: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn tokens(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn call(&self, call: BackendCall<'_>) -> Result<BackendResponse, GatewayError> {
        self.calls.lock().push(call.access_token.to_string());
        let status = self.script.lock().pop_front().unwrap_or(self.fallback);
        let body = match status {
            200 => json!({"response": {
                "candidates": [{"content": {"role": "model", "parts": [{"text": "ok"}]}, "finishReason": "STOP"}],
                "usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 1}
            }})
            .to_string(),
            429 => r#"{"error":{"code":429,"details":[{"retryDelay":"12s"}]}}"#.to_string(),
            400 => r#"{"error":{"code":400,"message":"Invalid JSON payload"}}"#.to_string(),
            other => format!("HTTP {}", other),
        };
        Ok(BackendResponse::full(status, Bytes::from(body)))
    }

    async fn discover_project(&self, access_token: &str) -> Result<String, GatewayError> {
        if self.unknown_projects.lock().iter().any(|t| t == access_token) {
            return Err(GatewayError::Fatal { status: 404, message: "loadCodeAssist 404".to_string() });
        }
        Ok("discovered-project".to_string())
    }
}

struct StaticExchanger;

/// Mints tokens for every secret except the one carrying `revoked`.
struct RevokingExchanger {
    revoked: String,
}

#[async_trait]
impl TokenExchanger for RevokingExchanger {
    async fn exchange(&self, secret: &SecretMaterial) -> Result<IssuedToken, RefreshError> {
        match secret {
            SecretMaterial::OAuthUser { refresh_token, .. } if *refresh_token == self.revoked => {
                Err(RefreshError::Revoked("invalid_grant".to_string()))
            },
            _ => Ok(IssuedToken {
                access_token: "minted".to_string(),
                expires_in: 3600,
                refresh_token: None,
            }),
        }
    }
}

#[async_trait]
impl TokenExchanger for StaticExchanger {
    async fn exchange(&self, _secret: &SecretMaterial) -> Result<IssuedToken, RefreshError> {
        Ok(IssuedToken { access_token: "minted".to_string(), expires_in: 3600, refresh_token: None })
    }
}

#[derive(Default)]
struct CollectingSink {
    events: Mutex<Vec<UsageEvent>>,
}

impl UsageSink for CollectingSink {
    fn record(&self, event: &UsageEvent) {
        self.events.lock().push(event.clone());
    }
}

fn secret() -> SecretMaterial {
    SecretMaterial::OAuthUser {
        client_id: "c".to_string(),
        client_secret: "s".to_string(),
        refresh_token: "r".to_string(),
        token_uri: None,
        scopes: Vec::new(),
    }
}

async fn pool_with(ids: &[&str]) -> Arc<CredentialPool> {
    let pool = Arc::new(CredentialPool::new(
        CredentialRepository::new(Arc::new(MemoryStore::new())),
        PoolConfig { max_consecutive_failures: 10, ..PoolConfig::default() },
    ));
    for id in ids {
        let mut record = CredentialRecord::new(*id, secret(), OwnerScope::Global);
        record.access_token = Some(AccessToken::new(format!("token-{}", id)));
        record.access_token_expiry = Some(Utc::now() + Duration::hours(1));
        record.project_id = Some(format!("project-{}", id));
        pool.add(record).await.unwrap();
    }
    pool
}

fn dispatcher(
    pool: Arc<CredentialPool>,
    backend: Arc<ScriptedBackend>,
    sink: Arc<dyn UsageSink>,
    max_attempts: u32,
) -> Dispatcher {
    dispatcher_with(pool, backend, sink, max_attempts, Arc::new(StaticExchanger))
}

fn dispatcher_with(
    pool: Arc<CredentialPool>,
    backend: Arc<ScriptedBackend>,
    sink: Arc<dyn UsageSink>,
    max_attempts: u32,
    exchanger: Arc<dyn TokenExchanger>,
) -> Dispatcher {
    let refresher = Arc::new(TokenRefresher::new(pool.clone(), exchanger, 60));
    Dispatcher::new(
        pool,
        refresher,
        backend,
        sink,
        Arc::new(ErrorLog::new()),
        RetryConfig { max_attempts, backoff_base_ms: 1, backoff_max_ms: 4 },
    )
}

fn request() -> DispatchRequest {
    DispatchRequest {
        scope: OwnerScope::Global,
        model: "gemini-2.5-pro".to_string(),
        body: json!({"contents": [{"role": "user", "parts": [{"text": "hi"}]}]}),
        stream: false,
    }
}

#[tokio::test]
async fn test_success_first_attempt() {
    let pool = pool_with(&["a", "b"]).await;
    let backend = ScriptedBackend::new(&[200], 200);
    let sink = Arc::new(CollectingSink::default());
    let dispatcher = dispatcher(pool, backend.clone(), sink.clone(), 3);

    let response = dispatcher.execute(&request()).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.credential_id, "a");
    assert_eq!(backend.call_count(), 1);

    let events = sink.events.lock();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].outcome, AttemptOutcome::Success);
    assert_eq!(events[0].prompt_tokens, Some(3));
    assert_eq!(events[0].completion_tokens, Some(1));
}

#[tokio::test]
async fn test_rate_limit_rotates_to_other_credential() {
    let pool = pool_with(&["a", "b"]).await;
    let backend = ScriptedBackend::new(&[429, 200], 200);
    let dispatcher = dispatcher(pool.clone(), backend.clone(), Arc::new(NoopUsageSink), 3);

    let response = dispatcher.execute(&request()).await.unwrap();
    assert_eq!(response.credential_id, "b");
    assert_eq!(backend.tokens(), vec!["token-a", "token-b"]);

    // Cooldown taken from the body's retryDelay
    let cooled = pool.get("a").unwrap();
    let remaining = cooled.state.cooldown_remaining_secs(Utc::now());
    assert!((10..=12).contains(&remaining));
    assert_eq!(dispatcher.errors().len(), 1);
}

#[tokio::test]
async fn test_auth_error_excludes_credential() {
    let pool = pool_with(&["a", "b"]).await;
    let backend = ScriptedBackend::new(&[401, 200], 200);
    let dispatcher = dispatcher(pool.clone(), backend.clone(), Arc::new(NoopUsageSink), 3);

    let response = dispatcher.execute(&request()).await.unwrap();
    assert_eq!(response.credential_id, "b");
    assert_eq!(pool.get("a").unwrap().consecutive_failure_count, 1);
}

#[tokio::test]
async fn test_retry_bound_never_exceeded() {
    let pool = pool_with(&["a", "b", "c"]).await;
    let backend = ScriptedBackend::new(&[], 503);
    let dispatcher = dispatcher(pool, backend.clone(), Arc::new(NoopUsageSink), 4);

    let err = dispatcher.execute(&request()).await.unwrap_err();
    assert_eq!(backend.call_count(), 4);
    match err {
        GatewayError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 4);
            assert!(matches!(*last, GatewayError::Transient { status: Some(503), .. }));
        },
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_fatal_short_circuits_with_single_call() {
    let pool = pool_with(&["a", "b"]).await;
    let backend = ScriptedBackend::new(&[400], 200);
    let dispatcher = dispatcher(pool.clone(), backend.clone(), Arc::new(NoopUsageSink), 5);

    let err = dispatcher.execute(&request()).await.unwrap_err();
    assert_eq!(backend.call_count(), 1);
    assert_eq!(
        err,
        GatewayError::Fatal { status: 400, message: "Invalid JSON payload".to_string() }
    );
    assert_eq!(pool.get("a").unwrap().consecutive_failure_count, 0);
}

#[tokio::test]
async fn test_pool_exhausted_without_backend_call() {
    let pool = pool_with(&["a", "b"]).await;
    pool.disable("a", "manual").await.unwrap();
    pool.record_rate_limited("b", Some(std::time::Duration::from_secs(300))).await;
    let backend = ScriptedBackend::new(&[], 200);
    let dispatcher = dispatcher(pool, backend.clone(), Arc::new(NoopUsageSink), 5);

    let err = dispatcher.execute(&request()).await.unwrap_err();
    assert!(matches!(err, GatewayError::PoolExhausted { .. }));
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_all_rate_limited_surfaces_retries_exhausted() {
    let pool = pool_with(&["a", "b"]).await;
    let backend = ScriptedBackend::new(&[], 429);
    let dispatcher = dispatcher(pool, backend.clone(), Arc::new(NoopUsageSink), 5);

    let err = dispatcher.execute(&request()).await.unwrap_err();
    // Each credential is tried once, then the pool has nothing left for this request.
    assert_eq!(backend.call_count(), 2);
    assert_eq!(err.http_status_code(), 429);
    assert!(matches!(err, GatewayError::RetriesExhausted { attempts: 2, .. }));
}

#[tokio::test]
async fn test_project_discovered_and_stored() {
    let pool = pool_with(&[]).await;
    let mut record = CredentialRecord::new("fresh", secret(), OwnerScope::Global);
    record.access_token = Some(AccessToken::new("t"));
    record.access_token_expiry = Some(Utc::now() + Duration::hours(1));
    pool.add(record).await.unwrap();

    let backend = ScriptedBackend::new(&[200], 200);
    let dispatcher = dispatcher(pool.clone(), backend, Arc::new(NoopUsageSink), 2);
    dispatcher.execute(&request()).await.unwrap();

    assert_eq!(pool.get("fresh").unwrap().project_id.as_deref(), Some("discovered-project"));
}

#[tokio::test]
async fn test_expired_token_refreshed_before_call() {
    let pool = pool_with(&[]).await;
    let mut record = CredentialRecord::new("stale", secret(), OwnerScope::Global);
    record.project_id = Some("p".to_string());
    pool.add(record).await.unwrap();

    let backend = ScriptedBackend::new(&[200], 200);
    let dispatcher = dispatcher(pool, backend.clone(), Arc::new(NoopUsageSink), 2);
    dispatcher.execute(&request()).await.unwrap();
    assert_eq!(backend.tokens(), vec!["minted"]);
}

#[tokio::test]
async fn test_concurrent_requests_do_not_exceed_bound() {
    let pool = pool_with(&["a", "b", "c"]).await;
    let backend = ScriptedBackend::new(&[], 500);
    let dispatcher = Arc::new(dispatcher(pool, backend.clone(), Arc::new(NoopUsageSink), 3));

    let calls = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();
    for _ in 0..4 {
        let dispatcher = dispatcher.clone();
        let calls = calls.clone();
        handles.push(tokio::spawn(async move {
            let _ = dispatcher.execute(&request()).await;
            calls.fetch_add(1, Ordering::SeqCst);
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert!(backend.call_count() <= 12);
}

#[tokio::test]
async fn test_project_lookup_failure_rotates_to_next_credential() {
    let pool = pool_with(&["a", "b"]).await;
    for id in ["a", "b"] {
        let mut record = pool.get(id).unwrap();
        record.project_id = None;
        pool.add(record).await.unwrap();
    }
    let backend = ScriptedBackend::new(&[], 200);
    backend.unknown_projects.lock().push("token-a".to_string());
    let dispatcher = dispatcher(pool.clone(), backend.clone(), Arc::new(NoopUsageSink), 3);

    let response = dispatcher.execute(&request()).await.unwrap();
    assert_eq!(response.credential_id, "b");
    assert_eq!(backend.tokens(), vec!["token-b"]);
    assert_eq!(pool.get("a").unwrap().consecutive_failure_count, 1);
    assert_eq!(pool.get("a").unwrap().project_id, None);
}

#[tokio::test]
async fn test_revoked_secret_during_refresh_rotates() {
    let pool = pool_with(&["a"]).await;
    let mut stale = CredentialRecord::new(
        "revoked",
        SecretMaterial::OAuthUser {
            client_id: "c".to_string(),
            client_secret: "s".to_string(),
            refresh_token: "dead".to_string(),
            token_uri: None,
            scopes: Vec::new(),
        },
        OwnerScope::Global,
    );
    stale.project_id = Some("p".to_string());
    pool.add(stale).await.unwrap();
    // Stamp "a" as used so the stale credential is picked first.
    pool.acquire(&OwnerScope::Global, &HashSet::new()).unwrap();

    let backend = ScriptedBackend::new(&[], 200);
    let sink = Arc::new(CollectingSink::default());
    let exchanger = Arc::new(RevokingExchanger { revoked: "dead".to_string() });
    let dispatcher = dispatcher_with(pool.clone(), backend.clone(), sink.clone(), 3, exchanger);

    for _ in 0..2 {
        let response = dispatcher.execute(&request()).await.unwrap();
        assert_eq!(response.credential_id, "a");
    }
    // The revoked credential never reached the backend and is out of rotation.
    assert_eq!(backend.tokens(), vec!["token-a", "token-a"]);
    assert!(pool.get("revoked").unwrap().state.is_disabled());
    let outcomes: Vec<AttemptOutcome> = sink.events.lock().iter().map(|e| e.outcome).collect();
    assert_eq!(outcomes.iter().filter(|o| **o == AttemptOutcome::AuthError).count(), 1);
}

#[tokio::test]
async fn test_revoked_only_credential_exhausts_retries() {
    let pool = pool_with(&[]).await;
    let mut stale = CredentialRecord::new("revoked", secret(), OwnerScope::Global);
    stale.project_id = Some("p".to_string());
    pool.add(stale).await.unwrap();

    let backend = ScriptedBackend::new(&[], 200);
    let exchanger = Arc::new(RevokingExchanger { revoked: "r".to_string() });
    let dispatcher =
        dispatcher_with(pool, backend.clone(), Arc::new(NoopUsageSink), 3, exchanger);

    let err = dispatcher.execute(&request()).await.unwrap_err();
    assert_eq!(backend.call_count(), 0);
    match err {
        GatewayError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 1);
            assert!(matches!(*last, GatewayError::AuthInvalid { .. }));
        },
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_transient_failure_backs_off_then_succeeds() {
    let pool = pool_with(&["a"]).await;
    let backend = ScriptedBackend::new(&[503, 200], 200);
    let sink = Arc::new(CollectingSink::default());
    let dispatcher = dispatcher(pool.clone(), backend.clone(), sink.clone(), 3);

    let response = dispatcher.execute(&request()).await.unwrap();
    assert_eq!(response.status, 200);
    // Transient failures keep the credential eligible.
    assert_eq!(backend.tokens(), vec!["token-a", "token-a"]);
    let outcomes: Vec<AttemptOutcome> = sink.events.lock().iter().map(|e| e.outcome).collect();
    assert_eq!(outcomes, vec![AttemptOutcome::Transient, AttemptOutcome::Success]);
    assert_eq!(pool.get("a").unwrap().consecutive_failure_count, 0);
}

#[test]
fn test_dispatch_response_debug_omits_body() {
    let response = DispatchResponse {
        credential_id: "a".to_string(),
        status: 200,
        body: BackendBody::Full(Bytes::from_static(b"secret payload")),
    };
    let rendered = format!("{:?}", response);
    assert!(rendered.contains("14 bytes"));
    assert!(!rendered.contains("secret payload"));
}
