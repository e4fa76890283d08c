//! # gcli Types
//!
//! Credential records, configuration and error definitions for the gcli gateway.
//!
//! - **`error`** - Gateway error taxonomy plus storage and configuration errors
//! - **`models`** - Credential records, their runtime state, and configuration
//!
//! ## Architecture Role
//!
//! `gcli-types` sits at the bottom of the dependency graph and performs no I/O:
//!
//! ```text
//!          gcli-types (this crate)
//!                 │
//!                 ▼
//!             gcli-core
//!  (pool, refresh, dispatch, translate, stream)
//!                 │
//!                 ▼
//!            gcli-server
//! ```

pub mod error;
pub mod models;

pub use error::{ConfigError, GatewayError, Result, StorageError};

pub use models::{
    AccessToken, CredentialKind, CredentialRecord, CredentialState, GatewayConfig, OwnerScope,
    SecretMaterial,
};
