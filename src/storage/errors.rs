//! Storage error types
//!
//! Not-found is its own variant so callers can tell it apart from a
//! failing store.

use std::io;

use thiserror::Error;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Book storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("book not found: {0}")]
    NotFound(String),

    #[error("checksum mismatch for book record: {0}")]
    ChecksumMismatch(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal storage error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Whether this is the not-found condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_distinct() {
        assert!(StorageError::NotFound("b:1".into()).is_not_found());
        assert!(!StorageError::Internal("boom".into()).is_not_found());
        assert_eq!(
            StorageError::NotFound("b:1".into()).to_string(),
            "book not found: b:1"
        );
    }
}
