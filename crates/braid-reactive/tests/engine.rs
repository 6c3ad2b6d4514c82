//! The runtime driven purely through the `ReactiveEngine` trait

use braid_core::{ObserverId, ObserverLifecycle, ReactiveEngine};
use braid_reactive::ReactiveRuntime;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

#[derive(Default)]
struct Restarts(Mutex<Vec<ObserverId>>);

impl ObserverLifecycle for Restarts {
    fn tracking_started(&self, observer: ObserverId) {
        self.0.lock().push(observer);
    }

    fn observer_disposed(&self, _observer: ObserverId) {}
}

#[test]
fn test_invalidations_in_one_batch_rerun_once() {
    let rt = ReactiveRuntime::new();
    let runs = Arc::new(AtomicUsize::new(0));
    let first = rt.computed(|| 1);
    let second = rt.computed(|| 2);

    let (a, b, counter) = (first.clone(), second.clone(), runs.clone());
    let _reaction = rt.autorun(move || {
        a.get();
        b.get();
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let engine: Arc<dyn ReactiveEngine> = Arc::new(rt.clone());
    let (first_id, second_id) = (first.id(), second.id());
    engine.batch(&mut || {
        engine.invalidate(first_id);
        engine.invalidate(second_id);
        engine.invalidate(first_id);
    });

    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(rt.stats().invalidations, 3);
}

#[test]
fn test_invalidating_disposed_observer_is_ignored() {
    let rt = ReactiveRuntime::new();
    let reaction = rt.autorun(|| {});
    let id = reaction.id();
    reaction.dispose();
    assert!(reaction.is_disposed());

    ReactiveEngine::invalidate(&rt, id);
    assert!(!rt.contains(id));
}

#[test]
fn test_listener_dropped_is_pruned() {
    let rt = ReactiveRuntime::new();
    let restarts = Arc::new(Restarts::default());
    let weak: Weak<dyn ObserverLifecycle> = Arc::downgrade(&restarts) as _;
    ReactiveEngine::add_lifecycle_listener(&rt, weak);

    let count = rt.observable(0);
    let reader = count.clone();
    let reaction = rt.autorun(move || {
        reader.get();
    });
    count.set(1);
    assert_eq!(*restarts.0.lock(), vec![reaction.id(), reaction.id()]);

    drop(restarts);
    count.set(2);
}
