//! Path deduplication
//!
//! Reduces a transaction's touched containers to the set of observers to invalidate.
//! Each walk starts at a touched container and climbs its ancestry until it reaches a
//! container with subscribers, whose observers are collected. Observers are emitted in
//! first-discovery order, each at most once.

use crate::aggregator::TouchedSet;
use braid_core::{Ancestry, ContainerId, ContainerResolver, ObserverId};
use indexmap::IndexSet;

/// Observers to invalidate for one transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupOutcome {
    /// Distinct observers in first-discovery order
    pub observers: IndexSet<ObserverId>,
    /// Touched containers whose walk could not be completed
    pub unresolved: Vec<ContainerId>,
}

/// Walks touched containers up to their nearest subscribed ancestor
#[derive(Debug, Clone, Copy)]
pub struct PathDeduplicator {
    max_depth: usize,
}

impl PathDeduplicator {
    /// Create a deduplicator following at most `max_depth` parent links per walk
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Collect the observers reachable from every touched container
    ///
    /// `subscribers` is consulted once per visited container. A walk that reaches a root
    /// without finding subscribers contributes nothing; one that hits an unknown
    /// container or the depth limit is reported in [`DedupOutcome::unresolved`].
    pub fn deduplicate<F>(
        &self,
        touched: &TouchedSet,
        resolver: &dyn ContainerResolver,
        subscribers: F,
    ) -> DedupOutcome
    where
        F: Fn(&ContainerId) -> Vec<ObserverId>,
    {
        let mut outcome = DedupOutcome::default();
        for container in touched.containers() {
            let mut current = container.clone();
            let mut depth = 0;
            loop {
                let found = subscribers(&current);
                if !found.is_empty() {
                    outcome.observers.extend(found);
                    break;
                }
                match resolver.resolve(&current) {
                    Ancestry::Root => break,
                    Ancestry::Child(parent) if depth < self.max_depth => {
                        depth += 1;
                        current = parent;
                    }
                    Ancestry::Child(_) | Ancestry::Unknown => {
                        outcome.unresolved.push(container.clone());
                        break;
                    }
                }
            }
        }
        outcome
    }
}
