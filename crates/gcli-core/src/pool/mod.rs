//! In-memory credential pool.
//!
//! Records live in a [`DashMap`] keyed by credential id, so state transitions on one
//! credential never contend with another. Selection within a scope is serialized by
//! a short per-scope mutex that never spans an await point.

mod selection;
mod transitions;

#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use gcli_types::models::config::PoolConfig;
use gcli_types::{CredentialKind, CredentialRecord, CredentialState, GatewayError, OwnerScope};

use crate::storage::CredentialRepository;

/// Inspection view of one credential. Never carries secret material.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CredentialStatus {
    pub id: String,
    pub display_name: String,
    pub kind: CredentialKind,
    pub owner: OwnerScope,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled_reason: Option<String>,
    pub cooldown_remaining_seconds: i64,
    pub consecutive_failure_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

pub struct CredentialPool {
    records: DashMap<String, CredentialRecord>,
    /// Last `last_used` stamp handed out per scope; doubles as the selection lock.
    scope_clocks: DashMap<OwnerScope, Arc<Mutex<Option<DateTime<Utc>>>>>,
    repo: CredentialRepository,
    config: PoolConfig,
}

impl CredentialPool {
    pub fn new(repo: CredentialRepository, config: PoolConfig) -> Self {
        Self { records: DashMap::new(), scope_clocks: DashMap::new(), repo, config }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Scope key of the pool that serves `caller`.
    pub fn scope_for(&self, caller: &OwnerScope) -> OwnerScope {
        if self.config.isolation_enabled {
            caller.clone()
        } else {
            OwnerScope::Global
        }
    }

    fn in_scope(&self, record: &CredentialRecord, scope: &OwnerScope) -> bool {
        !self.config.isolation_enabled || &record.owner == scope
    }

    /// Rebuild the in-memory view from storage. Returns the number of records loaded.
    pub async fn reload(&self) -> Result<usize, GatewayError> {
        let records = self.repo.load_all().await?;
        let count = records.len();
        let ids: std::collections::HashSet<String> =
            records.iter().map(|r| r.id.clone()).collect();

        self.records.retain(|id, _| ids.contains(id));
        for record in records {
            self.records.insert(record.id.clone(), record);
        }

        info!("[Pool] Loaded {} credentials", count);
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<CredentialRecord> {
        self.records.get(id).map(|r| r.value().clone())
    }

    /// Insert or replace a credential and persist it.
    pub async fn add(&self, record: CredentialRecord) -> Result<(), GatewayError> {
        self.repo.save(&record).await?;
        info!("[Pool] Added credential {} ({}, owner={})", record.id, record.kind(), record.owner);
        self.records.insert(record.id.clone(), record);
        Ok(())
    }

    /// Remove a credential from memory and storage. Returns false when unknown.
    pub async fn remove(&self, id: &str) -> Result<bool, GatewayError> {
        let existed = self.records.remove(id).is_some();
        self.repo.remove(id).await?;
        if existed {
            info!("[Pool] Removed credential {}", id);
        }
        Ok(existed)
    }

    /// Operator re-enable: clears failures and cooldown history.
    pub async fn enable(&self, id: &str) -> Result<bool, GatewayError> {
        let updated = self.update(id, |record| {
            record.state = CredentialState::Available;
            record.consecutive_failure_count = 0;
            record.cooldown_strikes = 0;
        });
        match updated {
            Some(record) => {
                info!("[Pool] Credential {} re-enabled", id);
                self.persist(&record).await;
                Ok(true)
            },
            None => Ok(false),
        }
    }

    pub async fn disable(&self, id: &str, reason: &str) -> Result<bool, GatewayError> {
        let reason = crate::storage::truncate_reason(reason, 200);
        let updated = self.update(id, |record| {
            record.state = CredentialState::Disabled { reason: reason.clone() };
        });
        match updated {
            Some(record) => {
                warn!("[Pool] Credential {} disabled: {}", id, reason);
                self.persist(&record).await;
                Ok(true)
            },
            None => Ok(false),
        }
    }

    /// Status of every credential visible to `caller`'s pool, sorted by id.
    pub fn snapshot(&self, caller: &OwnerScope) -> Vec<CredentialStatus> {
        self.snapshot_at(caller, Utc::now())
    }

    pub fn snapshot_at(&self, caller: &OwnerScope, now: DateTime<Utc>) -> Vec<CredentialStatus> {
        let scope = self.scope_for(caller);
        let mut statuses: Vec<CredentialStatus> = self
            .records
            .iter()
            .filter(|r| self.in_scope(r.value(), &scope))
            .map(|r| status_of(r.value(), now))
            .collect();
        statuses.sort_by(|a, b| a.id.cmp(&b.id));
        statuses
    }

    /// Status of every credential regardless of scope, for administrators.
    pub fn snapshot_all(&self) -> Vec<CredentialStatus> {
        let now = Utc::now();
        let mut statuses: Vec<CredentialStatus> =
            self.records.iter().map(|r| status_of(r.value(), now)).collect();
        statuses.sort_by(|a, b| a.id.cmp(&b.id));
        statuses
    }

    /// Apply `f` under the record's shard lock and return the updated copy.
    fn update<F>(&self, id: &str, f: F) -> Option<CredentialRecord>
    where
        F: FnOnce(&mut CredentialRecord),
    {
        let mut entry = self.records.get_mut(id)?;
        f(entry.value_mut());
        Some(entry.value().clone())
    }

    async fn persist(&self, record: &CredentialRecord) {
        if let Err(e) = self.repo.save(record).await {
            warn!("[Pool] Failed to persist credential {}: {}", record.id, e);
        }
    }
}

fn status_of(record: &CredentialRecord, now: DateTime<Utc>) -> CredentialStatus {
    CredentialStatus {
        id: record.id.clone(),
        display_name: record.display_name().to_string(),
        kind: record.kind(),
        owner: record.owner.clone(),
        status: record.state.label_at(now),
        disabled_reason: match &record.state {
            CredentialState::Disabled { reason } => Some(reason.clone()),
            _ => None,
        },
        cooldown_remaining_seconds: record.state.cooldown_remaining_secs(now),
        consecutive_failure_count: record.consecutive_failure_count,
        last_used: record.last_used,
        project_id: record.project_id.clone(),
    }
}
