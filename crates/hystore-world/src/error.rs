//! Storage-level errors.

use hystore_bson::BsonError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// Bad magic, unsupported version or a file shorter than its fixed header.
    #[error("format error: {0}")]
    Format(String),

    /// Stored data is inconsistent with itself (size mismatch, blob past EOF).
    #[error("corruption: {0}")]
    Corruption(String),

    #[error("palette capacity exceeded: {count} distinct values, widest palette holds {capacity}")]
    Capacity { count: usize, capacity: usize },

    #[error("string of {0} bytes does not fit a u16 length prefix")]
    StringTooLong(usize),

    #[error("invalid position: {0}")]
    Position(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("document error: {0}")]
    Document(#[from] BsonError),

    #[error("section payload truncated: need {needed} more bytes, have {remaining}")]
    Truncated { needed: usize, remaining: usize },

    #[error("missing field: {0}")]
    MissingField(&'static str),
}

impl StorageError {
    /// Whether this error means the stored bytes cannot be trusted, as opposed
    /// to an environmental failure or a caller mistake.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            StorageError::Corruption(_)
                | StorageError::Truncated { .. }
                | StorageError::Document(_)
                | StorageError::MissingField(_)
        )
    }
}

pub type Result<T, E = StorageError> = std::result::Result<T, E>;
