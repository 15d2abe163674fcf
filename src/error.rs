//! Unified error handling for the route-compare library.
//!
//! This module provides a consistent error type for all route-compare
//! operations. User-input validation failures are not faults and live in
//! [`crate::workflow`] instead.

use std::fmt;

/// Unified error type for route-compare operations.
#[derive(Debug, Clone)]
pub enum CompareError {
    /// A stat item could not be read from the host page
    StatItemFault { message: String },
    /// Persistence/storage error reported by the backing store
    Storage { message: String },
    /// A persisted value exists but could not be decoded
    Corrupt { key: String, message: String },
    /// Generic internal error
    Internal { message: String },
}

impl fmt::Display for CompareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareError::StatItemFault { message } => {
                write!(f, "Stat item fault: {}", message)
            }
            CompareError::Storage { message } => {
                write!(f, "Storage error: {}", message)
            }
            CompareError::Corrupt { key, message } => {
                write!(f, "Corrupt value for key '{}': {}", key, message)
            }
            CompareError::Internal { message } => {
                write!(f, "Internal error: {}", message)
            }
        }
    }
}

impl std::error::Error for CompareError {}

impl CompareError {
    /// Build a storage error from any displayable backend failure.
    pub fn storage(err: impl fmt::Display) -> Self {
        CompareError::Storage {
            message: err.to_string(),
        }
    }
}

/// Result type alias for route-compare operations.
pub type Result<T> = std::result::Result<T, CompareError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CompareError::Corrupt {
            key: "races".to_string(),
            message: "expected array".to_string(),
        };
        assert!(err.to_string().contains("races"));
        assert!(err.to_string().contains("expected array"));
    }

    #[test]
    fn test_storage_helper() {
        let err = CompareError::storage("disk full");
        assert!(matches!(err, CompareError::Storage { .. }));
        assert!(err.to_string().contains("disk full"));
    }
}
