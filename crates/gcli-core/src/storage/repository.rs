//! Credential records persisted as JSON under `credentials/{id}`.

use std::sync::Arc;

use gcli_types::{CredentialRecord, StorageError};
use tracing::warn;

use super::KeyValueStore;

const CREDENTIAL_PREFIX: &str = "credentials/";

#[derive(Clone)]
pub struct CredentialRepository {
    store: Arc<dyn KeyValueStore>,
}

impl CredentialRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn key(id: &str) -> String {
        format!("{}{}", CREDENTIAL_PREFIX, id)
    }

    pub async fn get(&self, id: &str) -> Result<Option<CredentialRecord>, StorageError> {
        let key = Self::key(id);
        match self.store.get(&key).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StorageError::Corrupt { key, message: e.to_string() }),
            None => Ok(None),
        }
    }

    /// Load every record. Entries that fail to decode are skipped with a warning.
    pub async fn load_all(&self) -> Result<Vec<CredentialRecord>, StorageError> {
        let keys = self.store.list_keys_with_prefix(CREDENTIAL_PREFIX).await?;
        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(bytes) = self.store.get(&key).await? else {
                continue;
            };
            match serde_json::from_slice::<CredentialRecord>(&bytes) {
                Ok(record) => records.push(record),
                Err(e) => warn!("[Storage] Skipping unreadable credential {}: {}", key, e),
            }
        }
        Ok(records)
    }

    pub async fn save(&self, record: &CredentialRecord) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(record).map_err(|e| StorageError::Corrupt {
            key: Self::key(&record.id),
            message: e.to_string(),
        })?;
        self.store.put(&Self::key(&record.id), bytes).await
    }

    pub async fn remove(&self, id: &str) -> Result<(), StorageError> {
        self.store.delete(&Self::key(id)).await
    }
}
