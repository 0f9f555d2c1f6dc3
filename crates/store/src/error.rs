//! Error types for the group store

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("group not found: {0}")]
    GroupNotFound(String),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("index not found: {0}")]
    IndexNotFound(String),

    /// The row addressed by the operation has no physical entry, typically
    /// because a concurrent delete got there first.
    #[error("row not found in {0}")]
    NotFound(String),

    /// A row already occupies the target key position. Retrying with the
    /// same inputs can never succeed.
    #[error("duplicate key in {table}: {key}")]
    DuplicateKey { table: String, key: String },

    /// Uniqueness or integrity breach other than a primary-key duplicate.
    #[error("structural violation: {0}")]
    StructuralViolation(String),

    /// Transient failure caused by concurrent modification. Retrying the
    /// whole operation from its original inputs is safe.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("malformed key encoding at offset {offset}: {reason}")]
    EncodingError { offset: usize, reason: String },

    #[error("invalid scan configuration: {0}")]
    ConfigurationError(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("NULL constraint violation on column: {0}")]
    NullConstraintViolation(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl Error {
    /// True for failures that are safe to retry with the same inputs.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }
}

impl From<grove_kv::Error> for Error {
    fn from(err: grove_kv::Error) -> Self {
        match err {
            grove_kv::Error::Conflict { key } => {
                Error::Conflict(format!("write-write conflict on key {key:02x?}"))
            }
            other => Error::Storage(other.to_string()),
        }
    }
}
