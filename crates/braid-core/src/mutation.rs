//! Mutation records
//!
//! A document emits one record per low-level operation it integrates, tagged with the
//! transaction the operation belongs to. Records are produced and consumed within one
//! aggregation cycle and are never persisted.

use crate::identifiers::{ContainerId, TransactionId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What happened to a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    /// The container itself came into existence
    Created,
    /// An element was inserted into a sequence
    Insert,
    /// An element or key was removed
    Delete,
    /// A map key was written
    Update,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Created => "created",
            Self::Insert => "insert",
            Self::Delete => "delete",
            Self::Update => "update",
        };
        f.write_str(label)
    }
}

/// One change to one container inside one transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MutationRecord {
    /// Transaction this change belongs to
    pub transaction: TransactionId,
    /// Container the change applies to
    pub container: ContainerId,
    /// Kind of change
    pub change: ChangeKind,
}

impl MutationRecord {
    /// Create a mutation record
    pub fn new(transaction: TransactionId, container: ContainerId, change: ChangeKind) -> Self {
        Self {
            transaction,
            container,
            change,
        }
    }
}

impl fmt::Display for MutationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.transaction, self.change, self.container)
    }
}
