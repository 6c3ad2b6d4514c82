//! Container ancestry index
//!
//! The index is shared between a document and anyone resolving ancestry on its behalf.
//! It only stores identities, so holding it never keeps the document alive.

use braid_core::{Ancestry, ContainerId, ContainerResolver};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Parent links of every container a document has seen
#[derive(Clone, Default)]
pub struct ContainerIndex {
    parents: Arc<RwLock<HashMap<ContainerId, Option<ContainerId>>>>,
}

impl ContainerIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a container; the first registration wins since identities are never reused
    pub(crate) fn register(&self, container: ContainerId, parent: Option<ContainerId>) {
        self.parents.write().entry(container).or_insert(parent);
    }

    /// Whether the container has been registered
    pub fn contains(&self, container: &ContainerId) -> bool {
        self.parents.read().contains_key(container)
    }

    /// Number of registered containers
    pub fn len(&self) -> usize {
        self.parents.read().len()
    }

    /// Whether no container has been registered
    pub fn is_empty(&self) -> bool {
        self.parents.read().is_empty()
    }
}

impl ContainerResolver for ContainerIndex {
    fn resolve(&self, container: &ContainerId) -> Ancestry {
        match self.parents.read().get(container) {
            None => Ancestry::Unknown,
            Some(None) => Ancestry::Root,
            Some(Some(parent)) => Ancestry::Child(parent.clone()),
        }
    }
}

impl std::fmt::Debug for ContainerIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerIndex")
            .field("containers", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_core::{ClientId, ItemId};

    #[test]
    fn test_resolve() {
        let index = ContainerIndex::new();
        let root = ContainerId::root("things");
        let child = ContainerId::Nested(ItemId::new(ClientId(1), 1));
        index.register(root.clone(), None);
        index.register(child.clone(), Some(root.clone()));

        assert_eq!(index.resolve(&root), Ancestry::Root);
        assert_eq!(index.resolve(&child), Ancestry::Child(root));
        assert_eq!(
            index.resolve(&ContainerId::root("missing")),
            Ancestry::Unknown
        );
    }

    #[test]
    fn test_first_registration_wins() {
        let index = ContainerIndex::new();
        let child = ContainerId::Nested(ItemId::new(ClientId(1), 1));
        index.register(child.clone(), Some(ContainerId::root("a")));
        index.register(child.clone(), Some(ContainerId::root("b")));
        assert_eq!(
            index.resolve(&child),
            Ancestry::Child(ContainerId::root("a"))
        );
    }
}
