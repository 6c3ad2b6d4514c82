//! # Reactive Runtime
//!
//! Owns the dependency graph between sources (observables), derived values (computed)
//! and side effects (reactions).
//!
//! ## Tracking
//!
//! While a computed value or reaction evaluates, every source it reads is recorded
//! against it. Each evaluation starts from an empty dependency set, so a branch that no
//! longer reads a source stops depending on it. Lifecycle listeners are told when an
//! evaluation starts and when an observer is disposed.
//!
//! ## Batching
//!
//! Invalidations mark computed values stale and queue the reactions that depend on
//! them. Queued reactions run when the outermost batch closes, each at most once per
//! round. Reactions that keep re-invalidating each other are stopped after
//! `max_reaction_iterations` rounds.
//!
//! No lock is held while user code runs, so reactions may read, write and create other
//! reactive values freely.

use crate::computed::Computed;
use crate::error::ReactiveError;
use crate::observable::Observable;
use crate::reaction::Reaction;
use braid_core::{ObserverId, ObserverLifecycle, ReactiveEngine, RuntimeConfig};
use indexmap::IndexSet;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

type ReactionBody = Arc<Mutex<Box<dyn FnMut() + Send>>>;

/// Role of a node in the dependency graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeKind {
    Source,
    Computed,
    Reaction,
}

struct Node {
    kind: NodeKind,
    stale: bool,
    sources: IndexSet<ObserverId>,
    dependents: IndexSet<ObserverId>,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            stale: true,
            sources: IndexSet::new(),
            dependents: IndexSet::new(),
        }
    }
}

struct Frame {
    observer: ObserverId,
    reads: IndexSet<ObserverId>,
}

#[derive(Default)]
struct RuntimeState {
    next_id: u64,
    nodes: HashMap<ObserverId, Node>,
    bodies: HashMap<ObserverId, ReactionBody>,
    tracking: Vec<Frame>,
    batch_depth: usize,
    pending: IndexSet<ObserverId>,
    flushing: bool,
    stats: RuntimeStats,
}

impl RuntimeState {
    /// Mark `start` and everything derived from it stale, queueing affected reactions
    fn mark_stale(&mut self, start: ObserverId) {
        let mut stack = vec![start];
        let mut visited = HashSet::new();
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(node) = self.nodes.get_mut(&id) else {
                continue;
            };
            match node.kind {
                NodeKind::Source => stack.extend(node.dependents.iter().copied()),
                NodeKind::Computed => {
                    node.stale = true;
                    stack.extend(node.dependents.iter().copied());
                }
                NodeKind::Reaction => {
                    node.stale = true;
                    self.pending.insert(id);
                }
            }
        }
    }

    fn unlink_sources(&mut self, observer: ObserverId) {
        let sources = match self.nodes.get_mut(&observer) {
            Some(node) => std::mem::take(&mut node.sources),
            None => return,
        };
        for source in sources {
            if let Some(node) = self.nodes.get_mut(&source) {
                node.dependents.shift_remove(&observer);
            }
        }
    }
}

/// Counters describing runtime activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Explicit invalidations received
    pub invalidations: u64,
    /// Outermost batches closed
    pub batches: u64,
    /// Reaction evaluations
    pub reaction_runs: u64,
    /// Computed value evaluations
    pub computed_runs: u64,
}

pub(crate) struct RuntimeInner {
    config: RuntimeConfig,
    state: Mutex<RuntimeState>,
    listeners: RwLock<Vec<Weak<dyn ObserverLifecycle>>>,
}

/// Handle to a reactive runtime
///
/// There is no global runtime: every observable, computed value and reaction belongs to
/// the runtime that created it. Cloning yields another handle to the same runtime.
/// Values hold their runtime weakly; once every runtime handle is dropped they keep
/// working as plain, untracked values.
#[derive(Clone)]
pub struct ReactiveRuntime {
    inner: Arc<RuntimeInner>,
}

impl Default for ReactiveRuntime {
    fn default() -> Self {
        Self::new()
    }
}

struct TrackingScope<'a> {
    runtime: &'a ReactiveRuntime,
    observer: ObserverId,
}

impl Drop for TrackingScope<'_> {
    fn drop(&mut self) {
        self.runtime.end_tracking(self.observer);
    }
}

impl ReactiveRuntime {
    /// Create a runtime with default settings
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a runtime with explicit settings
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                config,
                state: Mutex::new(RuntimeState::default()),
                listeners: RwLock::new(Vec::new()),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<RuntimeInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(inner: &Weak<RuntimeInner>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }

    /// Settings this runtime was created with
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Activity counters
    pub fn stats(&self) -> RuntimeStats {
        self.inner.state.lock().stats
    }

    // === Constructors ===

    /// Create an observable source value
    pub fn observable<T>(&self, value: T) -> Observable<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        Observable::new(self, value)
    }

    /// Create a memoised value derived from whatever `compute` reads
    pub fn computed<T, F>(&self, compute: F) -> Computed<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Computed::new(self, compute)
    }

    /// Run `effect` now and again whenever something it read changes
    pub fn autorun<F>(&self, effect: F) -> Reaction
    where
        F: FnMut() + Send + 'static,
    {
        let id = self.register(NodeKind::Reaction);
        let body: Box<dyn FnMut() + Send> = Box::new(effect);
        self.inner
            .state
            .lock()
            .bodies
            .insert(id, Arc::new(Mutex::new(body)));
        tracing::debug!(observer = %id, "reaction created");
        self.batch(|| self.run_reaction(id));
        Reaction::new(self, id)
    }

    // === Graph bookkeeping ===

    pub(crate) fn register(&self, kind: NodeKind) -> ObserverId {
        let mut state = self.inner.state.lock();
        state.next_id += 1;
        let id = ObserverId(state.next_id);
        state.nodes.insert(id, Node::new(kind));
        id
    }

    /// Whether the observer is still registered
    pub fn contains(&self, observer: ObserverId) -> bool {
        self.inner.state.lock().nodes.contains_key(&observer)
    }

    pub(crate) fn is_stale(&self, observer: ObserverId) -> bool {
        self.inner
            .state
            .lock()
            .nodes
            .get(&observer)
            .map_or(true, |node| node.stale)
    }

    /// Record that the evaluation currently being tracked read `source`
    pub(crate) fn report_read(&self, source: ObserverId) {
        let mut state = self.inner.state.lock();
        if let Some(frame) = state.tracking.last_mut() {
            if frame.observer != source {
                frame.reads.insert(source);
            }
        }
    }

    /// The computation currently being evaluated under tracking
    pub fn tracking_observer(&self) -> Option<ObserverId> {
        self.inner
            .state
            .lock()
            .tracking
            .last()
            .map(|frame| frame.observer)
    }

    /// Evaluate `f` as a tracked run of `observer`
    pub(crate) fn track<R>(&self, observer: ObserverId, f: impl FnOnce() -> R) -> R {
        {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            state.unlink_sources(observer);
            if let Some(node) = state.nodes.get_mut(&observer) {
                node.stale = false;
                match node.kind {
                    NodeKind::Computed => state.stats.computed_runs += 1,
                    NodeKind::Reaction => state.stats.reaction_runs += 1,
                    NodeKind::Source => {}
                }
            }
            state.tracking.push(Frame {
                observer,
                reads: IndexSet::new(),
            });
        }
        self.notify(|listener| listener.tracking_started(observer));

        let _scope = TrackingScope {
            runtime: self,
            observer,
        };
        f()
    }

    fn end_tracking(&self, observer: ObserverId) {
        let mut state = self.inner.state.lock();
        let Some(position) = state
            .tracking
            .iter()
            .rposition(|frame| frame.observer == observer)
        else {
            return;
        };
        let frame = state.tracking.remove(position);
        if !state.nodes.contains_key(&observer) {
            return;
        }
        for source in frame.reads {
            let Some(node) = state.nodes.get_mut(&source) else {
                continue;
            };
            node.dependents.insert(observer);
            if let Some(node) = state.nodes.get_mut(&observer) {
                node.sources.insert(source);
            }
        }
    }

    /// A source value changed; stale everything derived from it
    pub(crate) fn source_changed(&self, source: ObserverId) {
        let flush = {
            let mut state = self.inner.state.lock();
            state.mark_stale(source);
            state.batch_depth == 0
        };
        if flush {
            self.log_flush();
        }
    }

    /// Invalidate an observer, reporting an error if it no longer exists
    ///
    /// Outside a batch, affected reactions re-run before this returns.
    pub fn schedule(&self, observer: ObserverId) -> Result<(), ReactiveError> {
        let flush = {
            let mut state = self.inner.state.lock();
            if !state.nodes.contains_key(&observer) {
                return Err(ReactiveError::Disposed { observer });
            }
            state.stats.invalidations += 1;
            state.mark_stale(observer);
            state.batch_depth == 0
        };
        tracing::trace!(observer = %observer, "observer invalidated");
        if flush {
            self.flush()?;
        }
        Ok(())
    }

    /// Remove an observer from the graph and notify lifecycle listeners
    pub(crate) fn dispose(&self, observer: ObserverId) {
        let (removed, body) = {
            let mut state = self.inner.state.lock();
            state.unlink_sources(observer);
            let Some(node) = state.nodes.remove(&observer) else {
                return;
            };
            for dependent in &node.dependents {
                if let Some(dep) = state.nodes.get_mut(dependent) {
                    dep.sources.shift_remove(&observer);
                }
            }
            state.pending.shift_remove(&observer);
            (node.kind, state.bodies.remove(&observer))
        };
        drop(body);
        if removed != NodeKind::Source {
            tracing::debug!(observer = %observer, "observer disposed");
            self.notify(|listener| listener.observer_disposed(observer));
        }
    }

    // === Batching ===

    /// Run `f` as one batch; queued reactions run once when the outermost batch closes
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.state.lock().batch_depth += 1;
        let result = f();
        if let Err(err) = self.exit_batch() {
            tracing::error!(error = %err, "reactions stopped");
        }
        result
    }

    /// Like [`batch`](Self::batch), returning an error if the reactions did not converge
    pub fn try_batch<R>(&self, f: impl FnOnce() -> R) -> Result<R, ReactiveError> {
        self.inner.state.lock().batch_depth += 1;
        let result = f();
        self.exit_batch().map(|()| result)
    }

    fn exit_batch(&self) -> Result<(), ReactiveError> {
        let outermost = {
            let mut state = self.inner.state.lock();
            state.batch_depth = state.batch_depth.saturating_sub(1);
            if state.batch_depth == 0 {
                state.stats.batches += 1;
            }
            state.batch_depth == 0
        };
        if outermost {
            self.flush()
        } else {
            Ok(())
        }
    }

    fn log_flush(&self) {
        if let Err(err) = self.flush() {
            tracing::error!(error = %err, "reactions stopped");
        }
    }

    /// Run queued reactions until none are left
    ///
    /// A flush started while another is running returns immediately; the running flush
    /// picks up whatever was queued.
    fn flush(&self) -> Result<(), ReactiveError> {
        {
            let mut state = self.inner.state.lock();
            if state.flushing {
                return Ok(());
            }
            state.flushing = true;
        }

        let limit = self.inner.config.max_reaction_iterations;
        let mut rounds = 0;
        let result = loop {
            let round: Vec<ObserverId> = {
                let mut state = self.inner.state.lock();
                state.pending.drain(..).collect()
            };
            if round.is_empty() {
                break Ok(());
            }
            rounds += 1;
            if rounds > limit {
                let mut state = self.inner.state.lock();
                state.pending.clear();
                tracing::error!(
                    iterations = limit,
                    dropped = round.len(),
                    "reactions did not converge"
                );
                break Err(ReactiveError::DidNotConverge { iterations: limit });
            }
            for observer in round {
                self.run_reaction(observer);
            }
        };

        self.inner.state.lock().flushing = false;
        result
    }

    fn run_reaction(&self, observer: ObserverId) {
        let body = self.inner.state.lock().bodies.get(&observer).cloned();
        let Some(body) = body else {
            return;
        };
        tracing::trace!(observer = %observer, "running reaction");
        self.track(observer, || {
            let mut body = body.lock();
            let run = &mut **body;
            run();
        });
    }

    // === Lifecycle listeners ===

    /// Register a listener, held weakly
    pub fn add_lifecycle_listener(&self, listener: Weak<dyn ObserverLifecycle>) {
        let mut listeners = self.inner.listeners.write();
        listeners.retain(|l| l.strong_count() > 0);
        listeners.push(listener);
    }

    fn notify(&self, f: impl Fn(&dyn ObserverLifecycle)) {
        let live: Vec<Arc<dyn ObserverLifecycle>> = self
            .inner
            .listeners
            .read()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        for listener in live {
            f(listener.as_ref());
        }
    }
}

impl ReactiveEngine for ReactiveRuntime {
    fn tracking_observer(&self) -> Option<ObserverId> {
        ReactiveRuntime::tracking_observer(self)
    }

    fn invalidate(&self, observer: ObserverId) {
        match self.schedule(observer) {
            Ok(()) => {}
            Err(ReactiveError::Disposed { .. }) => {
                tracing::debug!(observer = %observer, "ignoring invalidation of disposed observer");
            }
            Err(err) => tracing::error!(observer = %observer, error = %err, "invalidation failed"),
        }
    }

    fn batch(&self, f: &mut dyn FnMut()) {
        ReactiveRuntime::batch(self, f);
    }

    fn add_lifecycle_listener(&self, listener: Weak<dyn ObserverLifecycle>) {
        ReactiveRuntime::add_lifecycle_listener(self, listener);
    }
}

impl std::fmt::Debug for ReactiveRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ReactiveRuntime")
            .field("nodes", &state.nodes.len())
            .field("pending", &state.pending.len())
            .field("batch_depth", &state.batch_depth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Lifecycle {
        started: Mutex<Vec<ObserverId>>,
        disposed: Mutex<Vec<ObserverId>>,
    }

    impl ObserverLifecycle for Lifecycle {
        fn tracking_started(&self, observer: ObserverId) {
            self.started.lock().push(observer);
        }

        fn observer_disposed(&self, observer: ObserverId) {
            self.disposed.lock().push(observer);
        }
    }

    #[test]
    fn test_autorun_runs_immediately_and_on_change() {
        let rt = ReactiveRuntime::new();
        let count = rt.observable(1);
        let runs = Arc::new(AtomicUsize::new(0));

        let seen = count.clone();
        let counter = runs.clone();
        let _reaction = rt.autorun(move || {
            seen.get();
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        count.set(2);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_batch_coalesces_reruns() {
        let rt = ReactiveRuntime::new();
        let a = rt.observable(0);
        let b = rt.observable(0);
        let runs = Arc::new(AtomicUsize::new(0));

        let (ra, rb, counter) = (a.clone(), b.clone(), runs.clone());
        let _reaction = rt.autorun(move || {
            ra.get();
            rb.get();
            counter.fetch_add(1, Ordering::SeqCst);
        });

        rt.batch(|| {
            a.set(1);
            b.set(1);
            a.set(2);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_invalidate_propagates_through_computed() {
        let rt = ReactiveRuntime::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let derived = rt.computed(|| 42);

        let (reader, counter) = (derived.clone(), runs.clone());
        let _reaction = rt.autorun(move || {
            reader.get();
            counter.fetch_add(1, Ordering::SeqCst);
        });

        rt.schedule(derived.id()).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(rt.stats().computed_runs, 2);
    }

    #[test]
    fn test_dependencies_follow_latest_run() {
        let rt = ReactiveRuntime::new();
        let flag = rt.observable(true);
        let left = rt.observable(0);
        let runs = Arc::new(AtomicUsize::new(0));

        let (f, l, counter) = (flag.clone(), left.clone(), runs.clone());
        let _reaction = rt.autorun(move || {
            if f.get() {
                l.get();
            }
            counter.fetch_add(1, Ordering::SeqCst);
        });

        flag.set(false);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        left.set(5);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_lifecycle_notifications() {
        let rt = ReactiveRuntime::new();
        let lifecycle = Arc::new(Lifecycle::default());
        let weak: Weak<dyn ObserverLifecycle> = Arc::downgrade(&lifecycle) as _;
        rt.add_lifecycle_listener(weak);

        let reaction = rt.autorun(|| {});
        let id = reaction.id();
        assert_eq!(*lifecycle.started.lock(), vec![id]);

        drop(reaction);
        assert_eq!(*lifecycle.disposed.lock(), vec![id]);
        assert!(!rt.contains(id));
        assert_matches!(rt.schedule(id), Err(ReactiveError::Disposed { observer }) if observer == id);
    }

    #[test]
    fn test_divergent_reactions_stop() {
        let rt = ReactiveRuntime::with_config(RuntimeConfig {
            max_reaction_iterations: 5,
        });
        let x = rt.observable(0u64);
        let y = rt.observable(0u64);

        let (rx, wy) = (x.clone(), y.clone());
        let _forward = rt.autorun(move || wy.set(rx.get() + 1));
        let (ry, wx) = (y.clone(), x.clone());
        let _backward = rt.autorun(move || wx.set(ry.get() + 1));

        let result = rt.try_batch(|| x.set(100));
        assert_matches!(result, Err(ReactiveError::DidNotConverge { iterations: 5 }));
    }

    #[test]
    fn test_tracking_observer_inside_reaction() {
        let rt = ReactiveRuntime::new();
        let seen = Arc::new(Mutex::new(None));
        let (inner_rt, slot) = (rt.clone(), seen.clone());
        let reaction = rt.autorun(move || {
            *slot.lock() = inner_rt.tracking_observer();
        });
        assert_eq!(*seen.lock(), Some(reaction.id()));
        assert_eq!(rt.tracking_observer(), None);
    }
}
