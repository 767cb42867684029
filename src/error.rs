use std::time::Duration;

use thiserror::Error;

use crate::segment::SegmentId;

/// Main error type for Quarry operations
#[derive(Error, Debug)]
pub enum QuarryError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Persisting {segment} failed after {attempts} attempts: {reason}")]
    Persistence {
        segment: SegmentId,
        attempts: u32,
        reason: String,
    },

    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Index is closed")]
    Closed,
}

/// Result type alias for Quarry operations
pub type Result<T> = std::result::Result<T, QuarryError>;

impl QuarryError {
    /// Check if this error indicates a transient failure that could be retried
    pub fn is_retriable(&self) -> bool {
        matches!(self, QuarryError::Io(_) | QuarryError::Storage(_))
    }

    pub(crate) fn storage(e: impl std::fmt::Display) -> Self {
        QuarryError::Storage(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QuarryError::InvalidQuery("range without bounds".to_string());
        assert_eq!(err.to_string(), "Invalid query: range without bounds");

        let err = QuarryError::Persistence {
            segment: SegmentId::new(3),
            attempts: 5,
            reason: "disk full".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Persisting segment_3 failed after 5 attempts: disk full"
        );
    }

    #[test]
    fn test_retriable_errors() {
        assert!(QuarryError::Storage("busy".to_string()).is_retriable());
        assert!(QuarryError::Io(std::io::Error::new(std::io::ErrorKind::Other, "x")).is_retriable());
        assert!(!QuarryError::Schema("bad".to_string()).is_retriable());
        assert!(!QuarryError::Timeout(Duration::from_millis(5)).is_retriable());
    }
}
