//! Unified error system for Braid
//!
//! Each crate keeps a precise error enum for its own operations and converts into
//! [`BraidError`] at crate boundaries, so applications deal with a single type.

use serde::{Deserialize, Serialize};

/// Unified error type for all Braid operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum BraidError {
    /// Invalid input or configuration
    #[error("Invalid: {message}")]
    Invalid {
        /// Error message describing the invalid input
        message: String,
    },

    /// Resource not found
    #[error("Not found: {message}")]
    NotFound {
        /// Error message describing what was not found
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message describing the serialization failure
        message: String,
    },

    /// Mutation stream or transaction ordering defect
    #[error("Sequencing error: {message}")]
    Sequencing {
        /// Error message describing the ordering defect
        message: String,
    },

    /// Replication queue or update application failure
    #[error("Replication error: {message}")]
    Replication {
        /// Error message describing the replication failure
        message: String,
    },

    /// Reactive engine failure
    #[error("Reactive error: {message}")]
    Reactive {
        /// Error message describing the reactive failure
        message: String,
    },

    /// Internal system error
    #[error("Internal error: {message}")]
    Internal {
        /// Error message describing the internal error
        message: String,
    },
}

impl BraidError {
    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a sequencing error
    pub fn sequencing(message: impl Into<String>) -> Self {
        Self::Sequencing {
            message: message.into(),
        }
    }

    /// Create a replication error
    pub fn replication(message: impl Into<String>) -> Self {
        Self::Replication {
            message: message.into(),
        }
    }

    /// Create a reactive error
    pub fn reactive(message: impl Into<String>) -> Self {
        Self::Reactive {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Standard Result type for Braid operations
pub type Result<T> = std::result::Result<T, BraidError>;

impl From<std::io::Error> for BraidError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::not_found(err.to_string()),
            _ => Self::internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = BraidError::sequencing("record for closed txn-3");
        assert!(matches!(err, BraidError::Sequencing { .. }));
        assert_eq!(err.to_string(), "Sequencing error: record for closed txn-3");
    }

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "braid.toml");
        let err = BraidError::from(io_err);
        assert!(matches!(err, BraidError::NotFound { .. }));
    }
}
