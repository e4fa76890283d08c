use chrono::{Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use gcli_types::models::config::PoolConfig;
use gcli_types::{CredentialRecord, CredentialState, GatewayError, OwnerScope, SecretMaterial};

use super::transitions::{cooldown_secs, MAX_HINT_SECS};
use super::CredentialPool;
use crate::storage::{CredentialRepository, KeyValueStore, MemoryStore};

fn make_record(id: &str, owner: OwnerScope) -> CredentialRecord {
    CredentialRecord::new(
        id,
        SecretMaterial::OAuthUser {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            refresh_token: format!("refresh-{}", id),
            token_uri: None,
            scopes: Vec::new(),
        },
        owner,
    )
}

async fn create_test_pool(ids: &[&str], config: PoolConfig) -> (Arc<CredentialPool>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let pool = Arc::new(CredentialPool::new(CredentialRepository::new(store.clone()), config));
    for id in ids {
        pool.add(make_record(id, OwnerScope::Global)).await.unwrap();
    }
    (pool, store)
}

fn no_exclusions() -> HashSet<String> {
    HashSet::new()
}

#[tokio::test]
async fn test_rotation_is_even_across_pool() {
    let (pool, _) = create_test_pool(&["a", "b", "c"], PoolConfig::default()).await;
    let now = Utc::now();
    let mut counts: HashMap<String, usize> = HashMap::new();

    for _ in 0..31 {
        let record = pool.acquire_at(&OwnerScope::Global, &no_exclusions(), now).unwrap();
        *counts.entry(record.id).or_default() += 1;
    }

    // ceil(31 / 3) = 11
    for id in ["a", "b", "c"] {
        let count = counts.get(id).copied().unwrap_or(0);
        assert!((10..=11).contains(&count), "{} selected {} times", id, count);
    }
}

#[tokio::test]
async fn test_first_pick_is_lowest_id_then_lru() {
    let (pool, _) = create_test_pool(&["b", "a", "c"], PoolConfig::default()).await;
    let now = Utc::now();
    let order: Vec<String> = (0..4)
        .map(|_| pool.acquire_at(&OwnerScope::Global, &no_exclusions(), now).unwrap().id)
        .collect();
    assert_eq!(order, vec!["a", "b", "c", "a"]);
}

#[tokio::test]
async fn test_concurrent_acquisitions_spread() {
    let ids: Vec<String> = (0..4).map(|i| format!("cred-{}", i)).collect();
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let (pool, _) = create_test_pool(&id_refs, PoolConfig::default()).await;

    let mut handles = Vec::new();
    for _ in 0..4 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            pool.acquire(&OwnerScope::Global, &HashSet::new()).unwrap().id
        }));
    }
    let mut picked = HashSet::new();
    for handle in handles {
        picked.insert(handle.await.unwrap());
    }
    assert_eq!(picked.len(), 4, "four concurrent acquisitions should hit four credentials");
}

#[tokio::test]
async fn test_cooldown_excludes_until_expiry() {
    let (pool, _) = create_test_pool(&["a", "b"], PoolConfig::default()).await;
    let now = Utc::now();

    let until = pool
        .record_rate_limited_at("a", Some(std::time::Duration::from_secs(30)), now)
        .await
        .unwrap();
    assert_eq!(until, now + Duration::seconds(30));

    for offset in [0, 10, 29] {
        let record = pool
            .acquire_at(&OwnerScope::Global, &no_exclusions(), now + Duration::seconds(offset))
            .unwrap();
        assert_eq!(record.id, "b", "cooling credential selected at +{}s", offset);
    }

    let only_a: HashSet<String> = ["b".to_string()].into_iter().collect();
    let err = pool.acquire_at(&OwnerScope::Global, &only_a, now + Duration::seconds(29));
    assert!(matches!(err, Err(GatewayError::PoolExhausted { .. })));

    let record = pool.acquire_at(&OwnerScope::Global, &only_a, until + Duration::seconds(1)).unwrap();
    assert_eq!(record.id, "a");
    assert_eq!(pool.get("a").unwrap().state, CredentialState::Available);
}

#[tokio::test]
async fn test_cooldown_doubles_without_hint() {
    let config = PoolConfig { cooldown_base_secs: 10, cooldown_max_secs: 35, ..PoolConfig::default() };
    let (pool, _) = create_test_pool(&["a"], config).await;
    let now = Utc::now();

    let first = pool.record_rate_limited_at("a", None, now).await.unwrap();
    let second = pool.record_rate_limited_at("a", None, now).await.unwrap();
    let third = pool.record_rate_limited_at("a", None, now).await.unwrap();

    assert_eq!(first, now + Duration::seconds(10));
    assert_eq!(second, now + Duration::seconds(20));
    assert_eq!(third, now + Duration::seconds(35));

    pool.record_success("a").await;
    assert_eq!(pool.get("a").unwrap().cooldown_strikes, 0);
    assert_eq!(pool.get("a").unwrap().state, CredentialState::Available);
}

#[tokio::test]
async fn test_oversized_retry_hint_is_clamped() {
    let (pool, _) = create_test_pool(&["a"], PoolConfig::default()).await;
    let now = Utc::now();

    let hint = crate::upstream::retry_hint::parse_retry_after_header("100000000000000000");
    let until = pool.record_rate_limited_at("a", hint, now).await.unwrap();
    assert_eq!(until, now + Duration::seconds(MAX_HINT_SECS as i64));

    let until = pool
        .record_rate_limited_at("a", Some(std::time::Duration::from_secs(u64::MAX)), now)
        .await
        .unwrap();
    assert_eq!(until, now + Duration::seconds(MAX_HINT_SECS as i64));
}

#[test]
fn test_cooldown_secs_saturates() {
    assert_eq!(cooldown_secs(30, 600, 0), 30);
    assert_eq!(cooldown_secs(30, 600, 4), 480);
    assert_eq!(cooldown_secs(30, 600, 5), 600);
    assert_eq!(cooldown_secs(30, 600, 200), 600);
}

#[tokio::test]
async fn test_disable_after_threshold_until_enabled() {
    let config = PoolConfig { max_consecutive_failures: 2, ..PoolConfig::default() };
    let (pool, store) = create_test_pool(&["a"], config).await;

    assert!(!pool.record_failure("a", "500 backend").await);
    assert!(!pool.record_failure("a", "500 backend").await);
    assert!(pool.acquire(&OwnerScope::Global, &no_exclusions()).is_ok());

    assert!(pool.record_failure("a", "500 backend").await);
    assert!(pool.get("a").unwrap().state.is_disabled());

    let far_future = Utc::now() + Duration::days(365);
    assert!(matches!(
        pool.acquire_at(&OwnerScope::Global, &no_exclusions(), far_future),
        Err(GatewayError::PoolExhausted { .. })
    ));

    let persisted = store.get("credentials/a").await.unwrap().unwrap();
    let persisted: CredentialRecord = serde_json::from_slice(&persisted).unwrap();
    assert!(persisted.state.is_disabled());

    assert!(pool.enable("a").await.unwrap());
    let record = pool.acquire(&OwnerScope::Global, &no_exclusions()).unwrap();
    assert_eq!(record.consecutive_failure_count, 0);
}

#[tokio::test]
async fn test_success_resets_failure_count() {
    let (pool, _) = create_test_pool(&["a"], PoolConfig::default()).await;
    pool.record_failure("a", "boom").await;
    pool.record_failure("a", "boom").await;
    pool.record_success("a").await;
    assert_eq!(pool.get("a").unwrap().consecutive_failure_count, 0);
}

#[tokio::test]
async fn test_rate_limit_does_not_revive_disabled() {
    let (pool, _) = create_test_pool(&["a"], PoolConfig::default()).await;
    pool.disable("a", "invalid_grant").await.unwrap();
    assert!(pool.record_rate_limited("a", None).await.is_none());
    assert!(pool.get("a").unwrap().state.is_disabled());
}

#[tokio::test]
async fn test_isolation_scopes_pools() {
    let config = PoolConfig { isolation_enabled: true, ..PoolConfig::default() };
    let (pool, _) = create_test_pool(&["shared"], config).await;
    pool.add(make_record("u_alice_1", OwnerScope::User("alice".into()))).await.unwrap();
    pool.add(make_record("u_bob_1", OwnerScope::User("bob".into()))).await.unwrap();

    let alice = OwnerScope::User("alice".into());
    for _ in 0..3 {
        assert_eq!(pool.acquire(&alice, &no_exclusions()).unwrap().id, "u_alice_1");
        assert_eq!(pool.acquire(&OwnerScope::Global, &no_exclusions()).unwrap().id, "shared");
    }

    let carol = OwnerScope::User("carol".into());
    assert!(matches!(
        pool.acquire(&carol, &no_exclusions()),
        Err(GatewayError::PoolExhausted { scope }) if scope == "user:carol"
    ));

    let visible: Vec<String> = pool.snapshot(&alice).into_iter().map(|s| s.id).collect();
    assert_eq!(visible, vec!["u_alice_1"]);
}

#[tokio::test]
async fn test_without_isolation_everyone_shares() {
    let (pool, _) = create_test_pool(&[], PoolConfig::default()).await;
    pool.add(make_record("u_alice_1", OwnerScope::User("alice".into()))).await.unwrap();

    let record = pool.acquire(&OwnerScope::User("bob".into()), &no_exclusions()).unwrap();
    assert_eq!(record.id, "u_alice_1");
}

#[tokio::test]
async fn test_reload_reflects_storage() {
    let (pool, store) = create_test_pool(&["a", "b"], PoolConfig::default()).await;
    let repo = CredentialRepository::new(store.clone());

    repo.remove("a").await.unwrap();
    repo.save(&make_record("c", OwnerScope::Global)).await.unwrap();

    assert_eq!(pool.reload().await.unwrap(), 2);
    assert!(pool.get("a").is_none());
    assert!(pool.get("c").is_some());
}

#[tokio::test]
async fn test_snapshot_reports_cooldown() {
    let (pool, _) = create_test_pool(&["a", "b"], PoolConfig::default()).await;
    let now = Utc::now();
    pool.record_rate_limited_at("a", Some(std::time::Duration::from_secs(90)), now).await;

    let snapshot = pool.snapshot_at(&OwnerScope::Global, now);
    assert_eq!(snapshot[0].status, "cooling");
    assert_eq!(snapshot[0].cooldown_remaining_seconds, 90);
    assert_eq!(snapshot[1].status, "available");

    let json = serde_json::to_string(&snapshot).unwrap();
    assert!(!json.contains("refresh-a"));
}
