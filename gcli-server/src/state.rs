//! Application State
//!
//! Shared handles for the HTTP layer: the gateway (which owns the pool) and the
//! resolved API keys.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use gcli_core::storage::{CredentialRepository, FileStore};
use gcli_core::{
    CodeAssistBackend, CredentialPool, Dispatcher, ErrorLog, Gateway, GoogleTokenExchanger,
    TokenRefresher, TracingUsageSink,
};
use gcli_types::models::config::ServerConfig;
use gcli_types::GatewayConfig;

use crate::auth::ApiKeys;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

pub struct AppStateInner {
    pub gateway: Arc<Gateway>,
    pub api_keys: ApiKeys,
    pub admin_key: Option<String>,
}

/// Credential pool backed by one JSON file per credential under `store_dir`.
pub async fn open_pool(config: &GatewayConfig, store_dir: PathBuf) -> Result<Arc<CredentialPool>> {
    let repo = CredentialRepository::new(Arc::new(FileStore::new(store_dir)));
    let pool = Arc::new(CredentialPool::new(repo, config.pool.clone()));
    pool.reload().await.context("Failed to load credentials")?;
    Ok(pool)
}

impl AppState {
    pub fn new(gateway: Arc<Gateway>, server: &ServerConfig) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                gateway,
                api_keys: ApiKeys::from_config(&server.api_keys),
                admin_key: server.admin_key.clone().filter(|k| !k.is_empty()),
            }),
        }
    }

    /// Wire the production stack: file store, Google token exchange, Code Assist backend.
    pub async fn build(config: &GatewayConfig, store_dir: PathBuf) -> Result<Self> {
        let pool = open_pool(config, store_dir).await?;

        let exchanger =
            GoogleTokenExchanger::with_timeout(config.refresh.token_uri.clone(), config.refresh.timeout_secs)
                .context("Failed to build token client")?;
        let refresher = Arc::new(TokenRefresher::new(
            pool.clone(),
            Arc::new(exchanger),
            config.refresh.safety_margin_secs,
        ));
        let backend = CodeAssistBackend::from_config(&config.upstream).context("Failed to build upstream client")?;

        let dispatcher = Arc::new(Dispatcher::new(
            pool,
            refresher,
            Arc::new(backend),
            Arc::new(TracingUsageSink),
            Arc::new(ErrorLog::new()),
            config.retry.clone(),
        ));
        let gateway = Arc::new(Gateway::new(
            dispatcher,
            config.stream.clone(),
            config.upstream.base_models.clone(),
        ));
        Ok(Self::new(gateway, &config.server))
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.inner.gateway
    }

    pub fn pool(&self) -> &Arc<CredentialPool> {
        self.inner.gateway.pool()
    }

    pub fn api_keys(&self) -> &ApiKeys {
        &self.inner.api_keys
    }

    pub fn admin_key(&self) -> Option<&str> {
        self.inner.admin_key.as_deref()
    }
}
