//! Tunables for the pool, retry loop, token refresh and stream shaping.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Credential pool policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[validate(schema(function = "validate_cooldown_window"))]
pub struct PoolConfig {
    /// Restrict each user to credentials they own
    #[serde(default)]
    pub isolation_enabled: bool,
    /// Failures tolerated before a credential is disabled
    #[validate(range(min = 1_u32, max = 100_u32))]
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    /// First cooldown applied when the backend gives no retry hint
    #[validate(range(min = 1_u64))]
    #[serde(default = "default_cooldown_base_secs")]
    pub cooldown_base_secs: u64,
    /// Ceiling for the doubling cooldown
    #[serde(default = "default_cooldown_max_secs")]
    pub cooldown_max_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            isolation_enabled: false,
            max_consecutive_failures: default_max_consecutive_failures(),
            cooldown_base_secs: default_cooldown_base_secs(),
            cooldown_max_secs: default_cooldown_max_secs(),
        }
    }
}

fn validate_cooldown_window(pool: &PoolConfig) -> Result<(), ValidationError> {
    if pool.cooldown_base_secs > pool.cooldown_max_secs {
        return Err(ValidationError::new("cooldown_base_exceeds_max"));
    }
    Ok(())
}

/// Dispatcher retry ceiling and transient backoff curve.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct RetryConfig {
    /// Maximum physical backend calls per logical request
    #[validate(range(min = 1_u32, max = 50_u32))]
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[validate(range(min = 1_u64))]
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

/// Access-token refresh settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct RefreshConfig {
    /// Tokens expiring within this window are refreshed before use
    #[validate(range(min = 0_i64, max = 3000_i64))]
    #[serde(default = "default_safety_margin_secs")]
    pub safety_margin_secs: i64,
    #[validate(url)]
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[validate(range(min = 1_u64, max = 300_u64))]
    #[serde(default = "default_refresh_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            safety_margin_secs: default_safety_margin_secs(),
            token_uri: default_token_uri(),
            timeout_secs: default_refresh_timeout_secs(),
        }
    }
}

/// Fake-streaming cadence and anti-truncation limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct StreamConfig {
    /// Characters per synthetic chunk
    #[validate(range(min = 1_usize))]
    #[serde(default = "default_fake_chunk_chars")]
    pub fake_chunk_chars: usize,
    #[serde(default = "default_fake_chunk_interval_ms")]
    pub fake_chunk_interval_ms: u64,
    /// Keep-alive period while a fake stream waits for the backend
    #[validate(range(min = 1_u64))]
    #[serde(default = "default_keepalive_interval_secs")]
    pub keepalive_interval_secs: u64,
    /// Continuation calls allowed per response
    #[validate(range(max = 20_u32))]
    #[serde(default = "default_max_continuations")]
    pub max_continuations: u32,
    /// Shortest overlap removed when stitching a continuation
    #[validate(range(min = 1_usize))]
    #[serde(default = "default_min_overlap_chars")]
    pub min_overlap_chars: usize,
    /// Longest overlap searched for when stitching a continuation
    #[serde(default = "default_max_overlap_chars")]
    pub max_overlap_chars: usize,
    #[validate(length(min = 1_u64))]
    #[serde(default = "default_continuation_prompt")]
    pub continuation_prompt: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            fake_chunk_chars: default_fake_chunk_chars(),
            fake_chunk_interval_ms: default_fake_chunk_interval_ms(),
            keepalive_interval_secs: default_keepalive_interval_secs(),
            max_continuations: default_max_continuations(),
            min_overlap_chars: default_min_overlap_chars(),
            max_overlap_chars: default_max_overlap_chars(),
            continuation_prompt: default_continuation_prompt(),
        }
    }
}

pub const fn default_max_consecutive_failures() -> u32 {
    3
}

pub const fn default_cooldown_base_secs() -> u64 {
    30
}

pub const fn default_cooldown_max_secs() -> u64 {
    600
}

pub const fn default_max_attempts() -> u32 {
    5
}

pub const fn default_backoff_base_ms() -> u64 {
    500
}

pub const fn default_backoff_max_ms() -> u64 {
    8_000
}

pub const fn default_safety_margin_secs() -> i64 {
    60
}

pub fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

pub const fn default_refresh_timeout_secs() -> u64 {
    30
}

pub const fn default_fake_chunk_chars() -> usize {
    10
}

pub const fn default_fake_chunk_interval_ms() -> u64 {
    10
}

pub const fn default_keepalive_interval_secs() -> u64 {
    5
}

pub const fn default_max_continuations() -> u32 {
    3
}

pub const fn default_min_overlap_chars() -> usize {
    4
}

pub const fn default_max_overlap_chars() -> usize {
    200
}

pub fn default_continuation_prompt() -> String {
    "Continue exactly where you stopped. Do not repeat any text that was already written."
        .to_string()
}
