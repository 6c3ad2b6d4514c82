//! Recording reactive engine

use braid_core::{ObserverId, ObserverLifecycle, ReactiveEngine};
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};

/// One invalidation call seen by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invalidation {
    /// Batch the call was made in (0 if outside any batch)
    pub batch: usize,
    /// Invalidated observer
    pub observer: ObserverId,
}

type InvalidateHook = Arc<dyn Fn(ObserverId) + Send + Sync>;

#[derive(Default)]
struct State {
    tracking: Vec<ObserverId>,
    depth: usize,
    batches: usize,
    calls: Vec<Invalidation>,
}

/// Engine stand-in that records invalidations instead of re-running anything
///
/// Tracking is driven explicitly with [`RecordingEngine::track`], which also delivers the
/// `tracking_started` notification the way a real engine would before a run.
#[derive(Default)]
pub struct RecordingEngine {
    state: Mutex<State>,
    listeners: RwLock<Vec<Weak<dyn ObserverLifecycle>>>,
    hook: RwLock<Option<InvalidateHook>>,
}

impl RecordingEngine {
    /// Create an engine with nothing recorded
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Run `f` as a tracked run of `observer`
    pub fn track<R>(&self, observer: ObserverId, f: impl FnOnce() -> R) -> R {
        self.each_listener(|l| l.tracking_started(observer));
        self.state.lock().tracking.push(observer);
        let result = f();
        self.state.lock().tracking.pop();
        result
    }

    /// Announce that `observer` was disposed
    pub fn dispose(&self, observer: ObserverId) {
        self.each_listener(|l| l.observer_disposed(observer));
    }

    /// Call `hook` synchronously on every invalidation
    pub fn on_invalidate(&self, hook: impl Fn(ObserverId) + Send + Sync + 'static) {
        *self.hook.write() = Some(Arc::new(hook));
    }

    /// Every invalidation so far
    pub fn invalidations(&self) -> Vec<Invalidation> {
        self.state.lock().calls.clone()
    }

    /// Number of invalidation calls for `observer`
    pub fn count_for(&self, observer: ObserverId) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.observer == observer)
            .count()
    }

    /// Total number of invalidation calls
    pub fn total(&self) -> usize {
        self.state.lock().calls.len()
    }

    /// Number of outermost batches opened
    pub fn batches(&self) -> usize {
        self.state.lock().batches
    }

    /// Forget recorded calls
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.calls.clear();
        state.batches = 0;
    }

    fn each_listener(&self, f: impl Fn(&dyn ObserverLifecycle)) {
        let live: Vec<_> = self.listeners.read().iter().filter_map(Weak::upgrade).collect();
        for listener in live {
            f(listener.as_ref());
        }
    }
}

impl ReactiveEngine for RecordingEngine {
    fn tracking_observer(&self) -> Option<ObserverId> {
        self.state.lock().tracking.last().copied()
    }

    fn invalidate(&self, observer: ObserverId) {
        {
            let mut state = self.state.lock();
            let batch = if state.depth > 0 { state.batches } else { 0 };
            state.calls.push(Invalidation { batch, observer });
        }
        let hook = self.hook.read().clone();
        if let Some(hook) = hook {
            hook(observer);
        }
    }

    fn batch(&self, f: &mut dyn FnMut()) {
        {
            let mut state = self.state.lock();
            if state.depth == 0 {
                state.batches += 1;
            }
            state.depth += 1;
        }
        f();
        self.state.lock().depth -= 1;
    }

    fn add_lifecycle_listener(&self, listener: Weak<dyn ObserverLifecycle>) {
        self.listeners.write().push(listener);
    }
}
