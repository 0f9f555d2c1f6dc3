//! Error types for the key-value store

use thiserror::Error;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Another transaction committed to one of this transaction's keys
    /// after it began. Retrying from the original inputs is safe; the
    /// failed attempt's writes are wholly discarded.
    #[error("write-write conflict on key {key:02x?}")]
    Conflict { key: Vec<u8> },

    /// The transaction was already committed or rolled back.
    #[error("transaction is closed")]
    TransactionClosed,

    /// Fjall storage error
    #[error("storage error: {0}")]
    Fjall(#[from] fjall::Error),

    /// Filesystem error opening the store
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for failures that are safe to retry with the same inputs.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }
}
