//! Collaborator traits
//!
//! The bridge sits between two black boxes. The document side offers a transaction-scoped
//! mutation stream, ancestry lookups and a read hook; the reactive side offers a
//! dependency-tracking hook, an invalidation primitive and lifecycle notifications.
//!
//! All callbacks are synchronous. Implementations must not hold internal locks while
//! calling back into another collaborator, since the callee may re-enter the caller
//! (for example a reaction that reads the document while the bridge is emitting).

use crate::identifiers::{ContainerId, ObserverId, Origin, TransactionId};
use crate::mutation::MutationRecord;
use std::sync::Weak;

/// Receiver of a document's mutation stream
///
/// For every committed transaction the document calls `begin`, then `record` once per
/// integrated operation in application order, then `end` exactly once.
pub trait MutationSink: Send + Sync {
    /// A transaction started delivering records
    fn begin(&self, transaction: TransactionId, origin: Origin);

    /// One low-level mutation inside an open transaction
    fn record(&self, record: MutationRecord);

    /// The transaction is complete; no more records will carry its id
    fn end(&self, transaction: TransactionId);
}

/// Where a container sits in the document tree
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Ancestry {
    /// Top-level container with no parent
    Root,
    /// Nested container owned by the given parent
    Child(ContainerId),
    /// The resolver has never seen this container
    Unknown,
}

/// Ancestry lookups by identity
///
/// Parent references are navigational only; resolving never extends a container's
/// lifetime.
pub trait ContainerResolver: Send + Sync {
    /// Look up the parent of a container
    fn resolve(&self, container: &ContainerId) -> Ancestry;
}

/// Hook invoked whenever application code reads a container
pub trait ReadTracker: Send + Sync {
    /// A container's contents were read
    fn container_read(&self, container: &ContainerId);
}

/// Notifications about tracked computations, delivered by the reactive engine
pub trait ObserverLifecycle: Send + Sync {
    /// The observer is about to re-evaluate; reads from its previous run are void
    fn tracking_started(&self, observer: ObserverId);

    /// The observer was disposed and will never be invalidated again
    fn observer_disposed(&self, observer: ObserverId);
}

/// The reactive engine as seen from the bridge
pub trait ReactiveEngine: Send + Sync {
    /// The computation currently being evaluated under dependency tracking, if any
    fn tracking_observer(&self) -> Option<ObserverId>;

    /// Schedule the observer (and everything derived from it) to re-run
    ///
    /// Several invalidations inside one [`batch`](ReactiveEngine::batch) re-run each
    /// dependent computation once.
    fn invalidate(&self, observer: ObserverId);

    /// Run `f` as one synchronous tick; scheduled re-runs happen when it returns
    fn batch(&self, f: &mut dyn FnMut());

    /// Register a lifecycle listener, held weakly by the engine
    fn add_lifecycle_listener(&self, listener: Weak<dyn ObserverLifecycle>);
}
