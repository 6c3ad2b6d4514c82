//! Bridge and replication errors
//!
//! None of the bridge errors are fatal. They describe defects in the mutation stream or
//! ancestry data and are reported through `tracing` and counted in
//! [`BridgeStats`](crate::BridgeStats); the offending input is dropped.

use braid_core::{BraidError, ContainerId, TransactionId};
use braid_doc::DocError;
use std::fmt;

/// How a mutation stream event violated transaction ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencingFault {
    /// A record or end for a transaction that was never begun
    UnknownTransaction,
    /// A begin, record or end for a transaction that already ended
    AlreadyClosed,
    /// A second begin for a transaction that is still open
    DuplicateBegin,
}

impl fmt::Display for SequencingFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::UnknownTransaction => "transaction was never begun",
            Self::AlreadyClosed => "transaction already closed",
            Self::DuplicateBegin => "transaction already open",
        };
        f.write_str(label)
    }
}

/// Errors reported by the bridge
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// An event arrived out of transaction order
    #[error("sequencing error for {transaction}: {fault}")]
    Sequencing {
        /// Transaction named by the event
        transaction: TransactionId,
        /// What was wrong
        fault: SequencingFault,
    },

    /// A touched container's ancestry could not be resolved
    #[error("unresolved ancestry for {container} in {transaction}")]
    UnresolvedContainer {
        /// Transaction that touched the container
        transaction: TransactionId,
        /// Container whose walk ended without reaching a root
        container: ContainerId,
    },

    /// A transaction closed while another transaction's invalidations were being emitted
    #[error("{transaction} closed during emission of {emitting}; deferred")]
    ReentrantMutation {
        /// Deferred transaction
        transaction: TransactionId,
        /// Transaction being emitted at the time
        emitting: TransactionId,
    },

    /// Deferred transactions kept cascading past the configured limit
    #[error("cascade limit of {limit} deferred transactions reached, {remaining} left queued")]
    CascadeLimit {
        /// Configured limit
        limit: usize,
        /// Transactions left for the next emission pass
        remaining: usize,
    },
}

impl BridgeError {
    pub(crate) fn sequencing(transaction: TransactionId, fault: SequencingFault) -> Self {
        Self::Sequencing { transaction, fault }
    }
}

impl From<BridgeError> for BraidError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Sequencing { .. } | BridgeError::ReentrantMutation { .. } => {
                BraidError::sequencing(err.to_string())
            }
            BridgeError::UnresolvedContainer { .. } => BraidError::not_found(err.to_string()),
            BridgeError::CascadeLimit { .. } => BraidError::reactive(err.to_string()),
        }
    }
}

/// Errors raised by the replication coordinator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplicationError {
    /// The inbound queue is at capacity
    #[error("replication queue full ({capacity} updates)")]
    QueueFull {
        /// Configured capacity
        capacity: usize,
    },

    /// The document rejected an update
    #[error("failed to apply update: {0}")]
    Apply(#[from] DocError),
}

impl From<ReplicationError> for BraidError {
    fn from(err: ReplicationError) -> Self {
        BraidError::replication(err.to_string())
    }
}
