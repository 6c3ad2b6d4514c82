//! Core identifier types used across Braid
//!
//! Container identities must survive encode/decode cycles between replicas, so none
//! of these types carries a pointer or an index into local storage. A container is
//! named either by its root name or by the id of the operation that created it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Replica identifier
///
/// Every document replica owns a distinct client id. Operation ids are unique because
/// each client only ever advances its own clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub u64);

impl ClientId {
    /// Create a client id from a raw value
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Create a random client id for a fresh replica
    pub fn random() -> Self {
        Self(rand::random())
    }

    /// Get the inner value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

impl From<u64> for ClientId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Operation identifier: a Lamport clock paired with the issuing client
///
/// Ordering compares the clock first and breaks ties by client, which gives the
/// total order used for sequence placement and last-writer-wins map keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId {
    /// Lamport clock at the time the operation was issued
    pub clock: u64,
    /// Client that issued the operation
    pub client: ClientId,
}

impl ItemId {
    /// Create an item id
    pub fn new(client: ClientId, clock: u64) -> Self {
        Self { clock, client }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.client.0, self.clock)
    }
}

/// Stable identity of a container inside a document tree
///
/// Root containers are addressed by name and exist on every replica as soon as they
/// are referenced. Nested containers take the id of the operation that created them,
/// so the same container decodes to the same identity on every replica.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContainerId {
    /// Top-level container addressed by name
    Root(String),
    /// Container created by the operation with this id
    Nested(ItemId),
}

impl ContainerId {
    /// Create a root container id
    pub fn root(name: impl Into<String>) -> Self {
        Self::Root(name.into())
    }

    /// Whether this is a root container
    pub fn is_root(&self) -> bool {
        matches!(self, Self::Root(_))
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root(name) => write!(f, "root:{name}"),
            Self::Nested(id) => write!(f, "nested:{id}"),
        }
    }
}

/// Shape of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerKind {
    /// Key/value container with last-writer-wins keys
    Map,
    /// Ordered sequence container
    Sequence,
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Map => f.write_str("map"),
            Self::Sequence => f.write_str("sequence"),
        }
    }
}

/// Transaction identifier
///
/// Issued by a document in strictly increasing order. A transaction is closed exactly
/// once; ids at or below the highest closed id never reopen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Create a transaction id
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the inner value
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Get the next id in sequence
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}

/// Where the mutations of a transaction came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    /// Mutations made through the local container API
    Local,
    /// Mutations decoded from a remote update
    Remote,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Remote => f.write_str("remote"),
        }
    }
}

/// Reactive engine handle for a tracked computation (reaction or computed value)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObserverId(pub u64);

impl ObserverId {
    /// Get the inner value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_id_orders_by_clock_then_client() {
        let a = ItemId::new(ClientId(9), 1);
        let b = ItemId::new(ClientId(1), 2);
        let c = ItemId::new(ClientId(2), 2);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_container_id_display() {
        assert_eq!(ContainerId::root("things").to_string(), "root:things");
        let nested = ContainerId::Nested(ItemId::new(ClientId(7), 3));
        assert_eq!(nested.to_string(), "nested:7@3");
        assert!(!nested.is_root());
    }

    #[test]
    fn test_transaction_id_next() {
        let txn = TransactionId::new(4);
        assert_eq!(txn.next(), TransactionId(5));
        assert!(txn < txn.next());
    }
}
