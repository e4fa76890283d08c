//! Gateway configuration models.

mod engine;
mod server;

pub use engine::{PoolConfig, RefreshConfig, RetryConfig, StreamConfig};
pub use server::{ServerConfig, UpstreamConfig};

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::ConfigError;

/// Root configuration, stored as `config.json` in the data directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct GatewayConfig {
    #[serde(default)]
    #[validate(nested)]
    pub pool: PoolConfig,
    #[serde(default)]
    #[validate(nested)]
    pub retry: RetryConfig,
    #[serde(default)]
    #[validate(nested)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    #[validate(nested)]
    pub stream: StreamConfig,
    #[serde(default)]
    #[validate(nested)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    #[validate(nested)]
    pub server: ServerConfig,
}

impl GatewayConfig {
    /// Run `validator` checks and map the first failure to a [`ConfigError`].
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate().map_err(|e| ConfigError::from_validation(&e))
    }
}
