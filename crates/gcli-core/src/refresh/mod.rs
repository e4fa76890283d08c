//! Access-token refresh.
//!
//! `ensure_fresh` is a no-op while the token has more than the safety margin left.
//! Otherwise it takes a per-credential async lock, re-checks (another request may
//! have refreshed meanwhile) and performs one exchange, so a burst of requests on
//! an expiring credential costs a single call to the token endpoint.

mod exchanger;
mod jwt;

pub use exchanger::{GoogleTokenExchanger, IssuedToken, RefreshError, TokenExchanger};

use chrono::{Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

use gcli_types::{AccessToken, CredentialRecord, GatewayError};

use crate::pool::CredentialPool;

pub struct TokenRefresher {
    pool: Arc<CredentialPool>,
    exchanger: Arc<dyn TokenExchanger>,
    refresh_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    safety_margin_secs: i64,
}

impl TokenRefresher {
    pub fn new(
        pool: Arc<CredentialPool>,
        exchanger: Arc<dyn TokenExchanger>,
        safety_margin_secs: i64,
    ) -> Self {
        Self { pool, exchanger, refresh_locks: DashMap::new(), safety_margin_secs }
    }

    /// Return `record` with a usable access token.
    ///
    /// Errors: [`GatewayError::AuthInvalid`] when the secret is rejected (a revoked
    /// secret also disables the credential), [`GatewayError::Transient`] when the
    /// token endpoint cannot be reached.
    pub async fn ensure_fresh(
        &self,
        record: CredentialRecord,
    ) -> Result<CredentialRecord, GatewayError> {
        if record.token_fresh_at(Utc::now(), self.safety_margin_secs) {
            return Ok(record);
        }

        let lock = self
            .refresh_locks
            .entry(record.id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Another request may have refreshed while we waited.
        if let Some(current) = self.pool.get(&record.id) {
            if current.token_fresh_at(Utc::now(), self.safety_margin_secs) {
                debug!("[Refresh] {} already refreshed by a concurrent request", record.id);
                return Ok(current);
            }
        }

        debug!("[Refresh] Credential {} token expiring, refreshing...", record.id);

        match self.exchanger.exchange(&record.secret).await {
            Ok(issued) => {
                let expiry = Utc::now() + Duration::seconds(issued.expires_in);
                info!(
                    "[Refresh] Credential {} refreshed, valid for {}s",
                    record.id, issued.expires_in
                );
                let token = AccessToken::new(issued.access_token);
                match self
                    .pool
                    .store_token(&record.id, token.clone(), expiry, issued.refresh_token)
                    .await
                {
                    Some(updated) => Ok(updated),
                    // Removed from the pool mid-refresh; still serve this request.
                    None => {
                        let mut updated = record;
                        updated.access_token = Some(token);
                        updated.access_token_expiry = Some(expiry);
                        Ok(updated)
                    },
                }
            },
            Err(RefreshError::Network(message)) => {
                error!("[Refresh] Token endpoint unreachable for {}: {}", record.id, message);
                Err(GatewayError::Transient { status: None, message })
            },
            Err(RefreshError::Revoked(message)) => {
                error!("[Refresh] Disabling credential {} due to revoked secret", record.id);
                if let Err(e) = self.pool.disable(&record.id, &format!("revoked: {}", message)).await
                {
                    error!("[Refresh] Failed to disable {}: {}", record.id, e);
                }
                Err(GatewayError::AuthInvalid { credential_id: record.id, message })
            },
            Err(e) => {
                error!("[Refresh] Token refresh failed ({}): {}", record.id, e);
                Err(GatewayError::AuthInvalid { credential_id: record.id, message: e.to_string() })
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gcli_types::models::config::PoolConfig;
    use gcli_types::{OwnerScope, SecretMaterial};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::storage::{CredentialRepository, MemoryStore};

    struct CountingExchanger {
        calls: AtomicUsize,
        result: Result<IssuedToken, RefreshError>,
    }

    #[async_trait]
    impl TokenExchanger for CountingExchanger {
        async fn exchange(&self, _secret: &SecretMaterial) -> Result<IssuedToken, RefreshError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.result.clone()
        }
    }

    fn ok_token() -> Result<IssuedToken, RefreshError> {
        Ok(IssuedToken {
            access_token: "ya29.new".to_string(),
            expires_in: 3600,
            refresh_token: Some("rotated".to_string()),
        })
    }

    async fn setup(
        result: Result<IssuedToken, RefreshError>,
    ) -> (Arc<CredentialPool>, Arc<CountingExchanger>, TokenRefresher) {
        let pool = Arc::new(CredentialPool::new(
            CredentialRepository::new(Arc::new(MemoryStore::new())),
            PoolConfig::default(),
        ));
        pool.add(CredentialRecord::new(
            "a",
            SecretMaterial::OAuthUser {
                client_id: "c".to_string(),
                client_secret: "s".to_string(),
                refresh_token: "old".to_string(),
                token_uri: None,
                scopes: Vec::new(),
            },
            OwnerScope::Global,
        ))
        .await
        .unwrap();
        let exchanger = Arc::new(CountingExchanger { calls: AtomicUsize::new(0), result });
        let refresher = TokenRefresher::new(pool.clone(), exchanger.clone(), 60);
        (pool, exchanger, refresher)
    }

    #[tokio::test]
    async fn test_fresh_token_is_noop() {
        let (pool, exchanger, refresher) = setup(ok_token()).await;
        let mut record = pool.get("a").unwrap();
        record.access_token = Some(AccessToken::new("still-good"));
        record.access_token_expiry = Some(Utc::now() + Duration::seconds(600));

        let out = refresher.ensure_fresh(record).await.unwrap();
        assert_eq!(out.access_token.unwrap().expose(), "still-good");
        assert_eq!(exchanger.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_refresh_updates_pool_and_rotates_refresh_token() {
        let (pool, exchanger, refresher) = setup(ok_token()).await;
        let mut record = pool.get("a").unwrap();
        record.access_token = Some(AccessToken::new("nearly-expired"));
        record.access_token_expiry = Some(Utc::now() + Duration::seconds(30));

        let out = refresher.ensure_fresh(record).await.unwrap();
        assert_eq!(out.access_token.as_ref().unwrap().expose(), "ya29.new");
        assert_eq!(exchanger.calls.load(Ordering::SeqCst), 1);

        let stored = pool.get("a").unwrap();
        assert!(stored.token_fresh_at(Utc::now(), 60));
        assert!(matches!(
            stored.secret,
            SecretMaterial::OAuthUser { ref refresh_token, .. } if refresh_token == "rotated"
        ));
    }

    #[tokio::test]
    async fn test_concurrent_refresh_single_exchange() {
        let (pool, exchanger, refresher) = setup(ok_token()).await;
        let refresher = Arc::new(refresher);

        let mut handles = Vec::new();
        for _ in 0..5 {
            let refresher = refresher.clone();
            let record = pool.get("a").unwrap();
            handles.push(tokio::spawn(async move { refresher.ensure_fresh(record).await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(exchanger.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_revoked_disables_credential() {
        let (pool, _, refresher) = setup(Err(RefreshError::Revoked("invalid_grant".into()))).await;
        let err = refresher.ensure_fresh(pool.get("a").unwrap()).await.unwrap_err();

        assert!(matches!(err, GatewayError::AuthInvalid { ref credential_id, .. } if credential_id == "a"));
        assert!(pool.get("a").unwrap().state.is_disabled());
    }

    #[tokio::test]
    async fn test_rejected_is_auth_invalid_without_disable() {
        let (pool, _, refresher) =
            setup(Err(RefreshError::Rejected { status: 500, message: "oops".into() })).await;
        let err = refresher.ensure_fresh(pool.get("a").unwrap()).await.unwrap_err();

        assert!(matches!(err, GatewayError::AuthInvalid { .. }));
        assert!(!pool.get("a").unwrap().state.is_disabled());
    }

    #[tokio::test]
    async fn test_network_failure_is_transient() {
        let (pool, _, refresher) = setup(Err(RefreshError::Network("connect refused".into()))).await;
        let err = refresher.ensure_fresh(pool.get("a").unwrap()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Transient { status: None, .. }));
    }
}
