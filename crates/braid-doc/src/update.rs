//! Wire format for replication
//!
//! An [`Update`] is an ordered list of operations in the order the issuing replica
//! integrated them, which is always a causal order. Updates are encoded with bincode.
//! A [`StateVector`] summarises which operations a replica has seen so a peer can send
//! only the difference.

use crate::content::Value;
use crate::error::DocError;
use braid_core::{ClientId, ContainerId, ContainerKind, ItemId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Payload written by an insert or set operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OpContent {
    /// Scalar value (never `Value::Container`)
    Value(Value),
    /// A new nested container whose id is the operation id
    Container(ContainerKind),
}

/// One replicated operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Insert into a sequence after `origin` (or at the start)
    Insert {
        /// Operation id, also the element id
        id: ItemId,
        /// Target sequence
        parent: ContainerId,
        /// Element the insert was placed after when issued
        origin: Option<ItemId>,
        /// Inserted payload
        content: OpContent,
    },
    /// Write a map key
    Set {
        /// Operation id
        id: ItemId,
        /// Target map
        parent: ContainerId,
        /// Key written
        key: String,
        /// Written payload
        content: OpContent,
    },
    /// Remove a map key
    Remove {
        /// Operation id
        id: ItemId,
        /// Target map
        parent: ContainerId,
        /// Key removed
        key: String,
    },
    /// Tombstone a sequence element
    Delete {
        /// Operation id
        id: ItemId,
        /// Target sequence
        parent: ContainerId,
        /// Element being deleted
        target: ItemId,
    },
}

impl Operation {
    /// The operation's own id
    pub fn id(&self) -> ItemId {
        match self {
            Operation::Insert { id, .. }
            | Operation::Set { id, .. }
            | Operation::Remove { id, .. }
            | Operation::Delete { id, .. } => *id,
        }
    }

    /// The container the operation targets
    pub fn parent(&self) -> &ContainerId {
        match self {
            Operation::Insert { parent, .. }
            | Operation::Set { parent, .. }
            | Operation::Remove { parent, .. }
            | Operation::Delete { parent, .. } => parent,
        }
    }

    /// Kind the target container must have
    pub fn parent_kind(&self) -> ContainerKind {
        match self {
            Operation::Insert { .. } | Operation::Delete { .. } => ContainerKind::Sequence,
            Operation::Set { .. } | Operation::Remove { .. } => ContainerKind::Map,
        }
    }
}

/// A batch of operations exchanged between replicas
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Update {
    /// Operations in causal order
    pub ops: Vec<Operation>,
}

impl Update {
    /// Create an update from operations
    pub fn new(ops: Vec<Operation>) -> Self {
        Self { ops }
    }

    /// Whether the update carries no operations
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Encode for the wire
    pub fn encode(&self) -> Result<Vec<u8>, DocError> {
        bincode::serialize(self).map_err(DocError::encode)
    }

    /// Decode from the wire
    pub fn decode(bytes: &[u8]) -> Result<Self, DocError> {
        bincode::deserialize(bytes).map_err(DocError::decode)
    }
}

/// Highest clock seen per client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateVector(BTreeMap<ClientId, u64>);

impl StateVector {
    /// Create an empty state vector
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest clock seen from a client (0 if none)
    pub fn get(&self, client: ClientId) -> u64 {
        self.0.get(&client).copied().unwrap_or(0)
    }

    /// Whether an operation id is covered by this vector
    pub fn covers(&self, id: ItemId) -> bool {
        id.clock <= self.get(id.client)
    }

    /// Record an operation id
    pub fn observe(&mut self, id: ItemId) {
        let entry = self.0.entry(id.client).or_insert(0);
        *entry = (*entry).max(id.clock);
    }

    /// Encode for the wire
    pub fn encode(&self) -> Result<Vec<u8>, DocError> {
        bincode::serialize(self).map_err(DocError::encode)
    }

    /// Decode from the wire
    pub fn decode(bytes: &[u8]) -> Result<Self, DocError> {
        bincode::deserialize(bytes).map_err(DocError::decode)
    }
}
