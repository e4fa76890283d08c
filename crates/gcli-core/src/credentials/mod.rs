//! Credential JSON import and `GCLI_CREDS_*` autoload.

mod env_loader;
mod import;

pub use env_loader::{autoload_env, autoload_from, ENV_PREFIX};
pub use import::{derive_id, parse_credential, sanitize_name, ImportError};
