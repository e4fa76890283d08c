use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use gcli_types::{CredentialRecord, CredentialState, GatewayError, OwnerScope};

use super::CredentialPool;

/// Bounds the rescans when a picked record changes between scan and claim.
const MAX_CLAIM_RACES: usize = 8;

impl CredentialPool {
    /// Pick the least-recently-used selectable credential for `caller`.
    pub fn acquire(
        &self,
        caller: &OwnerScope,
        excluded: &HashSet<String>,
    ) -> Result<CredentialRecord, GatewayError> {
        self.acquire_at(caller, excluded, Utc::now())
    }

    /// [`acquire`](Self::acquire) with an explicit clock.
    ///
    /// Credentials whose cooldown ended at or before `now` return to `Available`.
    /// The returned record's `last_used` is stamped before the selection lock is
    /// released, so concurrent callers spread across the pool.
    pub fn acquire_at(
        &self,
        caller: &OwnerScope,
        excluded: &HashSet<String>,
        now: DateTime<Utc>,
    ) -> Result<CredentialRecord, GatewayError> {
        let scope = self.scope_for(caller);
        let clock = self.scope_clock(&scope);
        let mut last_stamp = clock.lock();

        for _ in 0..MAX_CLAIM_RACES {
            let Some(id) = self.pick_candidate(&scope, excluded, now) else {
                break;
            };

            // Stamps are strictly increasing per scope so equal clocks cannot tie.
            let stamp = match *last_stamp {
                Some(prev) if prev >= now => prev + Duration::microseconds(1),
                _ => now,
            };

            let Some(mut entry) = self.records.get_mut(&id) else {
                continue;
            };
            if !entry.state.is_selectable_at(now) {
                continue;
            }
            if matches!(entry.state, CredentialState::Cooldown { .. }) {
                debug!("[Pool] Cooldown elapsed for {}, available again", id);
                entry.state = CredentialState::Available;
            }
            entry.last_used = Some(stamp);
            *last_stamp = Some(stamp);
            return Ok(entry.value().clone());
        }

        Err(GatewayError::PoolExhausted { scope: scope.to_string() })
    }

    fn pick_candidate(
        &self,
        scope: &OwnerScope,
        excluded: &HashSet<String>,
        now: DateTime<Utc>,
    ) -> Option<String> {
        self.records
            .iter()
            .filter(|r| self.in_scope(r.value(), scope))
            .filter(|r| !excluded.contains(r.key()))
            .filter(|r| r.state.is_selectable_at(now))
            .min_by(|a, b| a.last_used.cmp(&b.last_used).then_with(|| a.id.cmp(&b.id)))
            .map(|r| r.key().clone())
    }

    fn scope_clock(&self, scope: &OwnerScope) -> Arc<Mutex<Option<DateTime<Utc>>>> {
        self.scope_clocks
            .entry(scope.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }
}
