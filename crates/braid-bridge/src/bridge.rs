//! # Observer Bridge
//!
//! Connects a document's mutation stream to a reactive engine.
//!
//! ## Flow
//!
//! 1. Reads made while the engine tracks a computation subscribe that computation to
//!    the container read ([`ReadTracker`]).
//! 2. Records are buffered per transaction until the transaction ends
//!    ([`TransactionAggregator`]).
//! 3. The touched containers are reduced to a set of observers ([`PathDeduplicator`]).
//! 4. Each observer is invalidated once inside one engine batch
//!    ([`NotificationEmitter`]).
//!
//! ## Reentrancy
//!
//! Reactions run while invalidations are emitted, and they may write to the document.
//! Those writes are separate transactions: they are queued behind the transaction being
//! emitted and processed, in order, by the same emission pass. A pass drains at most
//! `max_cascade_depth` deferred transactions; the rest wait for the next pass.
//!
//! No bridge lock is held while the engine or the resolver is called.

use crate::aggregator::{ClosedTransaction, TransactionAggregator};
use crate::dedup::PathDeduplicator;
use crate::emitter::NotificationEmitter;
use crate::error::BridgeError;
use crate::phase::TransactionPhase;
use crate::registry::SubscriptionRegistry;
use braid_core::{
    BridgeConfig, ContainerId, ContainerResolver, MutationRecord, MutationSink, ObserverId,
    ObserverLifecycle, Origin, ReactiveEngine, ReadTracker, TransactionId,
};
use braid_doc::{Document, ObserverKey};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};

/// Counters describing bridge activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Transactions that reached their end
    pub transactions_closed: u64,
    /// Records accepted into a transaction buffer
    pub records_processed: u64,
    /// Invalidation calls made on the engine
    pub invalidations_emitted: u64,
    /// Events dropped for violating transaction order
    pub sequencing_errors: u64,
    /// Touched containers whose ancestry walk could not complete
    pub unresolved_containers: u64,
    /// Transactions that closed during another transaction's emission
    pub deferred_transactions: u64,
    /// Emission passes stopped by the cascade limit
    pub cascade_limit_hits: u64,
}

#[derive(Default)]
struct Driver {
    queue: VecDeque<ClosedTransaction>,
    emitting: Option<TransactionId>,
}

/// The bridge's coordination core
///
/// Implements the document-side hooks ([`MutationSink`], [`ReadTracker`]) and the
/// engine-side hook ([`ObserverLifecycle`]) against the collaborator traits only, so it
/// can sit between any document and engine. [`ObserverBridge`] wires it to a
/// [`Document`].
pub struct BridgeCore {
    config: BridgeConfig,
    resolver: Arc<dyn ContainerResolver>,
    emitter: NotificationEmitter,
    dedup: PathDeduplicator,
    aggregator: Mutex<TransactionAggregator>,
    registry: Mutex<SubscriptionRegistry>,
    driver: Mutex<Driver>,
    stats: Mutex<BridgeStats>,
}

impl BridgeCore {
    /// Create a bridge core and register it as the engine's lifecycle listener
    pub fn new(
        resolver: Arc<dyn ContainerResolver>,
        engine: Arc<dyn ReactiveEngine>,
        config: BridgeConfig,
    ) -> Arc<Self> {
        let core = Arc::new(Self {
            aggregator: Mutex::new(TransactionAggregator::new(config.max_records_per_transaction)),
            dedup: PathDeduplicator::new(config.max_ancestry_depth),
            emitter: NotificationEmitter::new(engine.clone()),
            registry: Mutex::new(SubscriptionRegistry::new()),
            driver: Mutex::new(Driver::default()),
            stats: Mutex::new(BridgeStats::default()),
            resolver,
            config,
        });
        let listener: Weak<dyn ObserverLifecycle> = Arc::downgrade(&core) as _;
        engine.add_lifecycle_listener(listener);
        core
    }

    /// Settings the bridge was created with
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Activity counters
    pub fn stats(&self) -> BridgeStats {
        *self.stats.lock()
    }

    /// Observers currently subscribed to a container
    pub fn subscribers(&self, container: &ContainerId) -> Vec<ObserverId> {
        self.registry.lock().current_subscribers(container)
    }

    /// Total number of container/observer subscriptions
    pub fn subscription_count(&self) -> usize {
        self.registry.lock().subscription_count()
    }

    /// Transactions closed but not yet emitted
    pub fn queued_transactions(&self) -> usize {
        self.driver.lock().queue.len()
    }

    fn count(&self, f: impl FnOnce(&mut BridgeStats)) {
        if self.config.collect_stats {
            f(&mut self.stats.lock());
        }
    }

    fn report(&self, err: &BridgeError) {
        match err {
            BridgeError::Sequencing { .. } => {
                tracing::warn!(error = %err, "dropping out-of-order mutation event");
                self.count(|s| s.sequencing_errors += 1);
            }
            BridgeError::UnresolvedContainer { .. } => {
                tracing::warn!(error = %err, "skipping container with unresolved ancestry");
                self.count(|s| s.unresolved_containers += 1);
            }
            BridgeError::ReentrantMutation { .. } => {
                tracing::debug!(error = %err, "deferring reentrant transaction");
                self.count(|s| s.deferred_transactions += 1);
            }
            BridgeError::CascadeLimit { .. } => {
                tracing::error!(error = %err, "stopping emission pass");
                self.count(|s| s.cascade_limit_hits += 1);
            }
        }
    }

    /// Queue a closed transaction and emit, unless an emission pass is already running
    fn submit(&self, closed: ClosedTransaction) {
        {
            let mut driver = self.driver.lock();
            if let Some(emitting) = driver.emitting {
                let transaction = closed.id;
                driver.queue.push_back(closed);
                drop(driver);
                self.report(&BridgeError::ReentrantMutation {
                    transaction,
                    emitting,
                });
                return;
            }
            driver.queue.push_back(closed);
        }
        self.drain_queue();
    }

    /// Run an emission pass over queued transactions
    ///
    /// Returns the number of transactions emitted. Does nothing if a pass is already
    /// running.
    pub fn drain_queue(&self) -> usize {
        let limit = self.config.max_cascade_depth;
        let mut emitted = 0;
        loop {
            let next = {
                let mut driver = self.driver.lock();
                if driver.emitting.is_some() && emitted == 0 {
                    return 0;
                }
                // the first transaction of a pass is not a deferred one
                if emitted > limit && !driver.queue.is_empty() {
                    driver.emitting = None;
                    let remaining = driver.queue.len();
                    drop(driver);
                    self.report(&BridgeError::CascadeLimit { limit, remaining });
                    return emitted;
                }
                match driver.queue.pop_front() {
                    Some(next) => {
                        driver.emitting = Some(next.id);
                        next
                    }
                    None => {
                        driver.emitting = None;
                        return emitted;
                    }
                }
            };
            self.process(next);
            emitted += 1;
        }
    }

    fn process(&self, mut closed: ClosedTransaction) {
        let transaction = closed.id;
        let outcome = self
            .dedup
            .deduplicate(&closed.touched, self.resolver.as_ref(), |container| {
                self.registry.lock().current_subscribers(container)
            });
        self.advance(&mut closed, TransactionPhase::Deduplicated);
        for container in outcome.unresolved {
            self.report(&BridgeError::UnresolvedContainer {
                transaction,
                container,
            });
        }

        let invalidated = self.emitter.emit(transaction, &outcome.observers);
        self.advance(&mut closed, TransactionPhase::Emitted);
        self.count(|s| s.invalidations_emitted += invalidated as u64);
        tracing::debug!(
            transaction = transaction.value(),
            origin = %closed.origin,
            touched = closed.touched.len(),
            records = closed.touched.record_count(),
            invalidated,
            "transaction emitted"
        );
    }

    fn advance(&self, closed: &mut ClosedTransaction, next: TransactionPhase) {
        if let Err((from, to)) = closed.phase.advance(next) {
            tracing::error!(
                transaction = closed.id.value(),
                from = %from,
                to = %to,
                "illegal transaction phase transition"
            );
        }
    }
}

impl MutationSink for BridgeCore {
    fn begin(&self, transaction: TransactionId, origin: Origin) {
        tracing::trace!(transaction = transaction.value(), origin = %origin, "transaction begin");
        let result = self.aggregator.lock().begin(transaction, origin);
        if let Err(err) = result {
            self.report(&err);
        }
    }

    fn record(&self, record: MutationRecord) {
        let result = self.aggregator.lock().on_mutation(record);
        match result {
            Ok(()) => self.count(|s| s.records_processed += 1),
            Err(err) => self.report(&err),
        }
    }

    fn end(&self, transaction: TransactionId) {
        let result = self.aggregator.lock().on_transaction_end(transaction);
        match result {
            Ok(closed) => {
                self.count(|s| s.transactions_closed += 1);
                self.submit(closed);
            }
            Err(err) => self.report(&err),
        }
    }
}

impl ReadTracker for BridgeCore {
    fn container_read(&self, container: &ContainerId) {
        if let Some(observer) = self.emitter.engine().tracking_observer() {
            self.registry.lock().record_read(container, observer);
        }
    }
}

impl ObserverLifecycle for BridgeCore {
    fn tracking_started(&self, observer: ObserverId) {
        self.registry.lock().restart_tracking(observer);
    }

    fn observer_disposed(&self, observer: ObserverId) {
        let released = self.registry.lock().release_observer(observer);
        tracing::trace!(observer = %observer, released, "observer released");
    }
}

impl std::fmt::Debug for BridgeCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeCore")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// A bridge attached to a [`Document`]
///
/// Dropping the bridge detaches it.
pub struct ObserverBridge {
    doc: Document,
    core: Arc<BridgeCore>,
    keys: Mutex<Option<(ObserverKey, ObserverKey)>>,
}

impl ObserverBridge {
    /// Attach a bridge between `doc` and `engine`
    pub fn attach(doc: &Document, engine: Arc<dyn ReactiveEngine>, config: BridgeConfig) -> Self {
        let resolver: Arc<dyn ContainerResolver> = Arc::new(doc.container_index());
        let core = BridgeCore::new(resolver, engine, config);
        let sink = doc.add_mutation_sink(core.clone());
        let reader = doc.add_read_tracker(core.clone());
        tracing::debug!(client = %doc.client_id(), "observer bridge attached");
        Self {
            doc: doc.clone(),
            core,
            keys: Mutex::new(Some((sink, reader))),
        }
    }

    /// Stop observing the document; later transactions and reads are ignored
    pub fn detach(&self) {
        if let Some((sink, reader)) = self.keys.lock().take() {
            self.doc.remove_listener(sink);
            self.doc.remove_listener(reader);
            tracing::debug!(client = %self.doc.client_id(), "observer bridge detached");
        }
    }

    /// Whether the bridge is still attached
    pub fn is_attached(&self) -> bool {
        self.keys.lock().is_some()
    }

    /// Activity counters
    pub fn stats(&self) -> BridgeStats {
        self.core.stats()
    }

    /// The coordination core
    pub fn core(&self) -> &Arc<BridgeCore> {
        &self.core
    }
}

impl Drop for ObserverBridge {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for ObserverBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverBridge")
            .field("doc", &self.doc)
            .field("attached", &self.is_attached())
            .finish()
    }
}
