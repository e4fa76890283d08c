use tracing::{info, warn};

use gcli_types::{GatewayError, OwnerScope};

use super::import::{parse_credential, sanitize_name};
use crate::pool::CredentialPool;

pub const ENV_PREFIX: &str = "GCLI_CREDS_";

/// Import every `GCLI_CREDS_<NAME>` variable as `env-<name>` in the global scope.
pub async fn autoload_env(pool: &CredentialPool) -> Result<usize, GatewayError> {
    autoload_from(pool, std::env::vars()).await
}

/// Same as [`autoload_env`] over an explicit variable list. Credentials already
/// in the pool are left untouched; unparsable values are skipped.
pub async fn autoload_from<I>(pool: &CredentialPool, vars: I) -> Result<usize, GatewayError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut imported = 0;
    for (key, value) in vars {
        let Some(name) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        if name.is_empty() {
            continue;
        }
        let id = format!("env-{}", sanitize_name(name));
        if pool.get(&id).is_some() {
            continue;
        }
        match parse_credential(&value, Some(&id), OwnerScope::Global) {
            Ok(record) => {
                pool.add(record).await?;
                info!("[Credentials] Loaded {} from environment", id);
                imported += 1;
            },
            // The value holds secret material; only the variable name is logged.
            Err(e) => warn!("[Credentials] Ignoring {}: {}", key, e),
        }
    }
    Ok(imported)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use gcli_types::models::config::PoolConfig;

    use crate::storage::{CredentialRepository, MemoryStore};

    const CRED: &str = r#"{"client_id": "c", "client_secret": "s", "refresh_token": "r"}"#;

    fn pool() -> CredentialPool {
        CredentialPool::new(
            CredentialRepository::new(Arc::new(MemoryStore::new())),
            PoolConfig::default(),
        )
    }

    fn var(key: &str, value: &str) -> (String, String) {
        (key.to_string(), value.to_string())
    }

    #[tokio::test]
    async fn test_loads_prefixed_vars_only() {
        let pool = pool();
        let count = autoload_from(
            &pool,
            vec![var("GCLI_CREDS_MAIN", CRED), var("HOME", "/root"), var("GCLI_CREDS_", CRED)],
        )
        .await
        .unwrap();

        assert_eq!(count, 1);
        let record = pool.get("env-MAIN").unwrap();
        assert_eq!(record.owner, OwnerScope::Global);
    }

    #[tokio::test]
    async fn test_existing_and_invalid_skipped() {
        let pool = pool();
        autoload_from(&pool, vec![var("GCLI_CREDS_A", CRED)]).await.unwrap();
        pool.disable("env-A", "operator").await.unwrap();

        let count = autoload_from(
            &pool,
            vec![var("GCLI_CREDS_A", CRED), var("GCLI_CREDS_BAD", "{not json")],
        )
        .await
        .unwrap();

        assert_eq!(count, 0);
        assert!(pool.get("env-A").unwrap().state.is_disabled());
        assert!(pool.get("env-BAD").is_none());
    }
}
