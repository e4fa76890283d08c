//! Key-value persistence contract and the two bundled implementations.

mod file_store;
mod file_utils;
mod repository;

pub use file_store::FileStore;
pub use file_utils::{atomic_write, truncate_reason};
pub use repository::CredentialRepository;

use async_trait::async_trait;
use dashmap::DashMap;
use gcli_types::StorageError;

/// Byte-oriented storage backend. Keys are `/`-separated paths.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

    /// Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Sorted list of keys starting with `prefix`.
    async fn list_keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// In-process store, used by tests and ephemeral deployments.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn list_keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_prefix_listing() {
        let store = MemoryStore::new();
        store.put("credentials/b", b"2".to_vec()).await.unwrap();
        store.put("credentials/a", b"1".to_vec()).await.unwrap();
        store.put("config", b"{}".to_vec()).await.unwrap();

        let keys = store.list_keys_with_prefix("credentials/").await.unwrap();
        assert_eq!(keys, vec!["credentials/a", "credentials/b"]);

        store.delete("credentials/a").await.unwrap();
        store.delete("credentials/missing").await.unwrap();
        assert_eq!(store.get("credentials/a").await.unwrap(), None);
        assert_eq!(store.get("credentials/b").await.unwrap(), Some(b"2".to_vec()));
    }
}
