//! Document errors

use braid_core::{BraidError, ContainerId, ContainerKind};

/// Errors raised by document operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocError {
    /// An update could not be decoded
    #[error("failed to decode update: {message}")]
    Decode {
        /// Decoder message
        message: String,
    },

    /// An update could not be encoded
    #[error("failed to encode update: {message}")]
    Encode {
        /// Encoder message
        message: String,
    },

    /// The container does not exist on this replica
    #[error("unknown container {container}")]
    UnknownContainer {
        /// Missing container
        container: ContainerId,
    },

    /// The container exists with a different kind
    #[error("container {container} is a {actual}, expected a {expected}")]
    KindMismatch {
        /// Container that was addressed
        container: ContainerId,
        /// Kind the caller asked for
        expected: ContainerKind,
        /// Kind the container has
        actual: ContainerKind,
    },

    /// A sequence index was past the end
    #[error("index {index} out of bounds for {container} of length {len}")]
    IndexOutOfBounds {
        /// Sequence container
        container: ContainerId,
        /// Requested index
        index: usize,
        /// Visible length
        len: usize,
    },

    /// A remote update was applied while a local transaction was open
    #[error("cannot apply a remote update inside an open local transaction")]
    TransactionInProgress,
}

impl DocError {
    pub(crate) fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode {
            message: err.to_string(),
        }
    }

    pub(crate) fn encode(err: impl std::fmt::Display) -> Self {
        Self::Encode {
            message: err.to_string(),
        }
    }
}

impl From<DocError> for BraidError {
    fn from(err: DocError) -> Self {
        match err {
            DocError::Decode { .. } | DocError::Encode { .. } => {
                BraidError::serialization(err.to_string())
            }
            DocError::UnknownContainer { .. } => BraidError::not_found(err.to_string()),
            DocError::TransactionInProgress => BraidError::sequencing(err.to_string()),
            DocError::KindMismatch { .. } | DocError::IndexOutOfBounds { .. } => {
                BraidError::invalid(err.to_string())
            }
        }
    }
}
