//! Typed error definitions for the gateway.
//!
//! Only [`GatewayError::Fatal`], [`GatewayError::PoolExhausted`] and
//! [`GatewayError::RetriesExhausted`] ever leave the dispatcher; the other
//! classifications are resolved inside its retry loop.

mod config;
mod gateway;
mod storage;

pub use config::ConfigError;
pub use gateway::GatewayError;
pub use storage::StorageError;

/// Standard Result type using GatewayError.
pub type Result<T> = std::result::Result<T, GatewayError>;
