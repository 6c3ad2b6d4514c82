//! Reactive runtime errors

use braid_core::{BraidError, ObserverId};

/// Errors raised by the reactive runtime
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReactiveError {
    /// Reactions kept invalidating each other past the iteration limit
    #[error("reactions did not converge after {iterations} iterations")]
    DidNotConverge {
        /// Rounds executed before giving up
        iterations: usize,
    },

    /// The observer has been disposed
    #[error("{observer} has been disposed")]
    Disposed {
        /// Disposed observer
        observer: ObserverId,
    },
}

impl From<ReactiveError> for BraidError {
    fn from(err: ReactiveError) -> Self {
        BraidError::reactive(err.to_string())
    }
}
