//! Reactive notification emitter

use braid_core::{ObserverId, ReactiveEngine, TransactionId};
use std::sync::Arc;

/// Invalidates observers through the reactive engine
///
/// All invalidations for one transaction are issued inside one engine batch, so the
/// engine re-runs each dependent computation once.
#[derive(Clone)]
pub struct NotificationEmitter {
    engine: Arc<dyn ReactiveEngine>,
}

impl NotificationEmitter {
    /// Create an emitter for an engine
    pub fn new(engine: Arc<dyn ReactiveEngine>) -> Self {
        Self { engine }
    }

    /// The engine invalidations are sent to
    pub fn engine(&self) -> &Arc<dyn ReactiveEngine> {
        &self.engine
    }

    /// Invalidate each observer once; returns the number of invalidation calls
    ///
    /// An empty set makes no engine calls at all.
    pub fn emit<'a, I>(&self, transaction: TransactionId, observers: I) -> usize
    where
        I: IntoIterator<Item = &'a ObserverId>,
    {
        let observers: Vec<ObserverId> = observers.into_iter().copied().collect();
        if observers.is_empty() {
            return 0;
        }
        let engine = &self.engine;
        engine.batch(&mut || {
            for observer in &observers {
                tracing::trace!(
                    transaction = transaction.value(),
                    observer = %observer,
                    "invalidating observer"
                );
                engine.invalidate(*observer);
            }
        });
        observers.len()
    }
}

impl std::fmt::Debug for NotificationEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationEmitter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_core::ObserverLifecycle;
    use parking_lot::Mutex;
    use std::sync::Weak;

    #[derive(Default)]
    struct Counter {
        depth: Mutex<usize>,
        batches: Mutex<usize>,
        calls: Mutex<Vec<(usize, ObserverId)>>,
    }

    impl ReactiveEngine for Counter {
        fn tracking_observer(&self) -> Option<ObserverId> {
            None
        }

        fn invalidate(&self, observer: ObserverId) {
            let depth = *self.depth.lock();
            self.calls.lock().push((depth, observer));
        }

        fn batch(&self, f: &mut dyn FnMut()) {
            *self.batches.lock() += 1;
            *self.depth.lock() += 1;
            f();
            *self.depth.lock() -= 1;
        }

        fn add_lifecycle_listener(&self, _listener: Weak<dyn ObserverLifecycle>) {}
    }

    #[test]
    fn test_empty_set_makes_no_engine_call() {
        let engine = Arc::new(Counter::default());
        let emitter = NotificationEmitter::new(engine.clone());

        let none: [ObserverId; 0] = [];
        assert_eq!(emitter.emit(TransactionId(1), &none), 0);
        assert_eq!(*engine.batches.lock(), 0);
        assert!(engine.calls.lock().is_empty());
    }

    #[test]
    fn test_one_batch_per_emit() {
        let engine = Arc::new(Counter::default());
        let emitter = NotificationEmitter::new(engine.clone());
        let observers = [ObserverId(3), ObserverId(1), ObserverId(2)];

        assert_eq!(emitter.emit(TransactionId(1), &observers), 3);
        assert_eq!(emitter.emit(TransactionId(2), &observers[..1]), 1);

        assert_eq!(*engine.batches.lock(), 2);
        assert_eq!(
            *engine.calls.lock(),
            vec![
                (1, ObserverId(3)),
                (1, ObserverId(1)),
                (1, ObserverId(2)),
                (1, ObserverId(3)),
            ]
        );
    }
}
