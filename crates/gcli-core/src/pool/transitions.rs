//! Outcome-driven state transitions.

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, warn};

use gcli_types::{AccessToken, CredentialState};

use super::CredentialPool;

impl CredentialPool {
    /// 2xx: clear failure and cooldown history.
    pub async fn record_success(&self, id: &str) {
        let mut changed = false;
        let updated = self.update(id, |record| {
            changed = record.consecutive_failure_count != 0
                || record.cooldown_strikes != 0
                || matches!(record.state, CredentialState::Cooldown { .. });
            record.consecutive_failure_count = 0;
            record.cooldown_strikes = 0;
            if matches!(record.state, CredentialState::Cooldown { .. }) {
                record.state = CredentialState::Available;
            }
        });
        if let (Some(record), true) = (updated, changed) {
            self.persist(&record).await;
        }
    }

    /// 429: put the credential in cooldown and return the instant it ends.
    ///
    /// `retry_hint` comes from the backend and is clamped to [`MAX_HINT_SECS`];
    /// without one the window doubles per consecutive strike, starting at
    /// `cooldown_base_secs` and capped at `cooldown_max_secs`.
    pub async fn record_rate_limited(
        &self,
        id: &str,
        retry_hint: Option<std::time::Duration>,
    ) -> Option<DateTime<Utc>> {
        self.record_rate_limited_at(id, retry_hint, Utc::now()).await
    }

    pub async fn record_rate_limited_at(
        &self,
        id: &str,
        retry_hint: Option<std::time::Duration>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let base = self.config.cooldown_base_secs;
        let max = self.config.cooldown_max_secs;
        let mut until = None;

        let updated = self.update(id, |record| {
            if record.state.is_disabled() {
                return;
            }
            let secs = match retry_hint {
                Some(hint) => hint.as_secs().clamp(1, MAX_HINT_SECS),
                None => cooldown_secs(base, max, record.cooldown_strikes),
            };
            let end = cooldown_end(now, secs);
            record.cooldown_strikes = record.cooldown_strikes.saturating_add(1);
            record.state = CredentialState::Cooldown { until: end };
            until = Some(end);
        })?;

        if let Some(end) = until {
            info!(
                "[Pool] Credential {} cooling down until {} (strike {})",
                id,
                end.format("%H:%M:%S"),
                updated.cooldown_strikes
            );
            self.persist(&updated).await;
        }
        until
    }

    /// Auth failure, refresh failure or transient error.
    ///
    /// Returns true when this failure pushed the credential into `Disabled`.
    pub async fn record_failure(&self, id: &str, reason: &str) -> bool {
        let threshold = self.config.max_consecutive_failures;
        let mut disabled_now = false;

        let Some(record) = self.update(id, |record| {
            record.consecutive_failure_count = record.consecutive_failure_count.saturating_add(1);
            if record.consecutive_failure_count > threshold && !record.state.is_disabled() {
                record.state = CredentialState::Disabled {
                    reason: format!(
                        "{} consecutive failures, last: {}",
                        record.consecutive_failure_count,
                        crate::storage::truncate_reason(reason, 160)
                    ),
                };
                disabled_now = true;
            }
        }) else {
            return false;
        };

        if disabled_now {
            warn!(
                "[Pool] Credential {} disabled after {} consecutive failures",
                id, record.consecutive_failure_count
            );
        } else {
            debug!(
                "[Pool] Credential {} failure {}/{}",
                id, record.consecutive_failure_count, threshold
            );
        }
        self.persist(&record).await;
        disabled_now
    }

    /// Store a freshly minted access token (and rotated refresh token, if any).
    pub async fn store_token(
        &self,
        id: &str,
        token: AccessToken,
        expiry: DateTime<Utc>,
        rotated_refresh_token: Option<String>,
    ) -> Option<gcli_types::CredentialRecord> {
        let record = self.update(id, |record| {
            record.access_token = Some(token);
            record.access_token_expiry = Some(expiry);
            if let (
                Some(new_refresh),
                gcli_types::SecretMaterial::OAuthUser { refresh_token, .. },
            ) = (rotated_refresh_token, &mut record.secret)
            {
                *refresh_token = new_refresh;
            }
        })?;
        self.persist(&record).await;
        Some(record)
    }

    pub async fn store_project(&self, id: &str, project_id: &str) {
        if let Some(record) = self.update(id, |record| {
            record.project_id = Some(project_id.to_string());
        }) {
            info!("[Pool] Credential {} bound to project {}", id, project_id);
            self.persist(&record).await;
        }
    }
}

/// Longest cooldown a backend hint may impose (one daily quota window).
pub(crate) const MAX_HINT_SECS: u64 = 24 * 60 * 60;

fn cooldown_end(now: DateTime<Utc>, secs: u64) -> DateTime<Utc> {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `base * 2^strikes`, capped at `max`.
pub(crate) fn cooldown_secs(base: u64, max: u64, strikes: u32) -> u64 {
    let factor = 1_u64.checked_shl(strikes.min(32)).unwrap_or(u64::MAX);
    base.saturating_mul(factor).min(max)
}
