//! Domain models: credential records and gateway configuration.

pub mod config;
mod credential;

pub use config::GatewayConfig;
pub use credential::{
    AccessToken, CredentialKind, CredentialRecord, CredentialState, OwnerScope, SecretMaterial,
};
