//! Kernel error types

use thiserror::Error;

pub type KernelResult<T> = std::result::Result<T, KernelError>;

#[derive(Error, Debug)]
pub enum KernelError {
    #[error("KV error: {0}")]
    Kv(#[from] hive_kv::KvError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No worker factory registered for '{0}'")]
    UnknownHandler(String),

    #[error("Worker factory '{0}' is already registered")]
    DuplicateFactory(String),

    #[error("Malformed job payload: {0}")]
    MalformedPayload(String),

    #[error("Worker error: {0}")]
    Worker(String),
}
