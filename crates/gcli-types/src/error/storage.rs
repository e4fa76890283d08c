//! Key-value persistence errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum StorageError {
    /// Key is not a valid storage path
    #[error("Invalid storage key: {key}")]
    InvalidKey { key: String },

    /// Stored bytes could not be decoded
    #[error("Corrupt record at {key}: {message}")]
    Corrupt { key: String, message: String },

    /// Underlying backend failure (I/O, connection)
    #[error("Storage backend error: {message}")]
    Backend { message: String },
}

impl StorageError {
    pub fn from_io_error(e: &std::io::Error) -> Self {
        Self::Backend { message: e.to_string() }
    }
}
