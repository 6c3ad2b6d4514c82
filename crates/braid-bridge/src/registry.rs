//! Subscription registry
//!
//! Maps containers to the observers whose last tracked run read them. Only identities
//! are stored, so a subscription never keeps a container or an observer alive.

use braid_core::{ContainerId, ObserverId};
use indexmap::IndexSet;
use std::collections::HashMap;

/// Container ↔ observer subscriptions
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    by_container: HashMap<ContainerId, IndexSet<ObserverId>>,
    by_observer: HashMap<ObserverId, IndexSet<ContainerId>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `observer` to `container`; returns whether the subscription is new
    pub fn record_read(&mut self, container: &ContainerId, observer: ObserverId) -> bool {
        let added = self
            .by_container
            .entry(container.clone())
            .or_default()
            .insert(observer);
        if added {
            self.by_observer
                .entry(observer)
                .or_default()
                .insert(container.clone());
            tracing::trace!(container = %container, observer = %observer, "subscribed");
        }
        added
    }

    /// Observers subscribed to `container`, in subscription order
    pub fn current_subscribers(&self, container: &ContainerId) -> Vec<ObserverId> {
        self.by_container
            .get(container)
            .map(|observers| observers.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Whether `observer` is subscribed to `container`
    pub fn is_subscribed(&self, container: &ContainerId, observer: ObserverId) -> bool {
        self.by_container
            .get(container)
            .is_some_and(|observers| observers.contains(&observer))
    }

    /// Drop every subscription of a disposed observer; returns how many were removed
    pub fn release_observer(&mut self, observer: ObserverId) -> usize {
        let Some(containers) = self.by_observer.remove(&observer) else {
            return 0;
        };
        for container in &containers {
            if let Some(observers) = self.by_container.get_mut(container) {
                observers.shift_remove(&observer);
                if observers.is_empty() {
                    self.by_container.remove(container);
                }
            }
        }
        containers.len()
    }

    /// Forget the reads of an observer's previous run before it re-evaluates
    pub fn restart_tracking(&mut self, observer: ObserverId) -> usize {
        self.release_observer(observer)
    }

    /// Containers `observer` is subscribed to
    pub fn subscriptions_of(&self, observer: ObserverId) -> Vec<ContainerId> {
        self.by_observer
            .get(&observer)
            .map(|containers| containers.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Total number of container/observer pairs
    pub fn subscription_count(&self) -> usize {
        self.by_container.values().map(IndexSet::len).sum()
    }

    /// Number of observers with at least one subscription
    pub fn observer_count(&self) -> usize {
        self.by_observer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_read_is_idempotent() {
        let mut registry = SubscriptionRegistry::new();
        let things = ContainerId::root("things");
        assert!(registry.record_read(&things, ObserverId(1)));
        assert!(!registry.record_read(&things, ObserverId(1)));
        assert!(registry.record_read(&things, ObserverId(2)));

        assert_eq!(
            registry.current_subscribers(&things),
            vec![ObserverId(1), ObserverId(2)]
        );
        assert_eq!(registry.subscription_count(), 2);
    }

    #[test]
    fn test_release_observer() {
        let mut registry = SubscriptionRegistry::new();
        let a = ContainerId::root("a");
        let b = ContainerId::root("b");
        registry.record_read(&a, ObserverId(1));
        registry.record_read(&b, ObserverId(1));
        registry.record_read(&b, ObserverId(2));

        assert_eq!(registry.release_observer(ObserverId(1)), 2);
        assert!(registry.current_subscribers(&a).is_empty());
        assert_eq!(registry.current_subscribers(&b), vec![ObserverId(2)]);
        assert_eq!(registry.release_observer(ObserverId(1)), 0);
        assert_eq!(registry.observer_count(), 1);
    }

    #[test]
    fn test_restart_tracking_drops_stale_reads() {
        let mut registry = SubscriptionRegistry::new();
        let a = ContainerId::root("a");
        let b = ContainerId::root("b");
        registry.record_read(&a, ObserverId(1));

        registry.restart_tracking(ObserverId(1));
        registry.record_read(&b, ObserverId(1));

        assert!(!registry.is_subscribed(&a, ObserverId(1)));
        assert_eq!(registry.subscriptions_of(ObserverId(1)), vec![b]);
    }
}
