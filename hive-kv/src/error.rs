//! KV error types

use thiserror::Error;

/// Result type for KV operations
pub type KvResult<T> = std::result::Result<T, KvError>;

/// KV-related errors
#[derive(Debug, Error)]
pub enum KvError {
    /// Could not reach the store
    #[error("Connection error: {0}")]
    Connection(String),

    /// A read or write round-trip failed
    #[error("Operation failed: {0}")]
    Operation(String),

    /// Stored bytes were not valid UTF-8 where text was expected
    #[error("Invalid key encoding: {0}")]
    Encoding(String),

    /// JSON (de)serialization of a stored value failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A watch stream could not be established or was torn down
    #[error("Watch error: {0}")]
    Watch(String),
}

impl From<etcd_client::Error> for KvError {
    fn from(err: etcd_client::Error) -> Self {
        KvError::Operation(err.to_string())
    }
}
