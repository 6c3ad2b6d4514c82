//! Exactly-once invalidation per subscribed observer per transaction
//!
//! These run against the real document and the real reactive runtime through the things
//! store, plus a recording engine where the call sequence itself is under test.

use braid_bridge::ObserverBridge;
use braid_core::{
    BridgeConfig, ClientId, MutationRecord, MutationSink, ObserverId, TransactionId,
};
use braid_doc::{Content, Document};
use braid_testkit::{init_tracing, Point, RecordingEngine, ThingStore};
use parking_lot::Mutex;
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn point(n: i64) -> Point {
    Point::new(format!("p{n}"), n, -n)
}

#[test]
fn test_single_insert_invalidates_once_for_any_prior_length() {
    init_tracing();
    for prior in 0..5 {
        let store = ThingStore::new(1).unwrap();
        for n in 0..prior {
            store.add_point(&point(n)).unwrap();
        }
        let (_reaction, runs) = store.count_runs();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        let before = store.bridge.stats().invalidations_emitted;

        store.things.push("plain").unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 2, "prior length {prior}");
        assert_eq!(store.bridge.stats().invalidations_emitted - before, 1);
    }
}

#[test]
fn test_composite_insert_invalidates_once() {
    init_tracing();
    let store = ThingStore::new(1).unwrap();
    let (_reaction, runs) = store.count_runs();
    let records_before = store.bridge.stats().records_processed;

    store.add_point(&Point::new("a", 3, 4)).unwrap();

    let stats = store.bridge.stats();
    // created, inserted into things, three field writes
    assert_eq!(stats.records_processed - records_before, 5);
    assert_eq!(stats.invalidations_emitted, 1);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(store.points().get("a"), Some(&Point::new("a", 3, 4)));
}

#[test]
fn test_several_composites_in_one_transaction_invalidate_once() {
    init_tracing();
    let store = ThingStore::new(1).unwrap();
    let (_reaction, runs) = store.count_runs();

    store.doc.transact(|_| {
        for n in 0..4 {
            store.add_point(&point(n)).unwrap();
        }
    });

    assert_eq!(store.bridge.stats().invalidations_emitted, 1);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(store.points().len(), 4);
}

#[test]
fn test_remote_replay_after_initial_sync_invalidates_once() {
    init_tracing();
    let origin = ThingStore::new(1).unwrap();
    let (_origin_reaction, origin_runs) = origin.count_runs();
    for n in 0..3 {
        origin.add_point(&point(n)).unwrap();
    }
    assert_eq!(origin_runs.load(Ordering::SeqCst), 4);
    assert_eq!(origin.bridge.stats().invalidations_emitted, 3);

    let replica = ThingStore::new(2).unwrap();
    let (_reaction, runs) = replica.count_runs();
    replica.sync_from(&origin).unwrap();
    // the whole history arrives as one update, applied as one remote transaction
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(replica.points().len(), 3);
    let before = replica.bridge.stats().invalidations_emitted;

    origin.add_point(&Point::new("late", 7, 7)).unwrap();
    let outcome = replica.sync_from(&origin).unwrap();

    assert_eq!(outcome.integrated, 4);
    assert_eq!(replica.bridge.stats().invalidations_emitted - before, 1);
    assert_eq!(runs.load(Ordering::SeqCst), 3);
    assert_eq!(replica.points(), origin.points());
}

#[test]
fn test_unread_container_costs_nothing() {
    init_tracing();
    let doc = Document::new(ClientId(1));
    let engine = RecordingEngine::new();
    let _bridge = ObserverBridge::attach(&doc, engine.clone(), BridgeConfig::default());
    let list = doc.sequence("list").unwrap();

    list.push(1).unwrap();
    list.push_map([("k", Content::from(1))]).unwrap();

    assert_eq!(engine.total(), 0);
    assert_eq!(engine.batches(), 0);
}

#[test]
fn test_computed_never_read_is_never_invalidated() {
    init_tracing();
    let store = ThingStore::new(1).unwrap();
    store.add_point(&point(1)).unwrap();

    assert_eq!(store.bridge.stats().invalidations_emitted, 0);
    assert_eq!(store.bridge.core().subscription_count(), 0);
    assert_eq!(store.runtime.stats().invalidations, 0);
}

#[test]
fn test_resubscription_has_no_residue() {
    init_tracing();
    let doc = Document::new(ClientId(1));
    let engine = RecordingEngine::new();
    let bridge = ObserverBridge::attach(&doc, engine.clone(), BridgeConfig::default());
    let list = doc.sequence("list").unwrap();
    let observer = ObserverId(1);

    engine.track(observer, || list.to_vec().unwrap());
    list.push(1).unwrap();
    assert_eq!(engine.count_for(observer), 1);

    engine.dispose(observer);
    assert_eq!(bridge.core().subscription_count(), 0);
    list.push(2).unwrap();
    assert_eq!(engine.count_for(observer), 1);

    engine.track(observer, || list.to_vec().unwrap());
    engine.track(observer, || {
        list.len().unwrap();
        list.to_vec().unwrap()
    });
    assert_eq!(bridge.core().subscribers(list.id()), vec![observer]);
    list.push(3).unwrap();
    assert_eq!(engine.count_for(observer), 2);
}

#[test]
fn test_dropped_reaction_and_new_one_each_run_once() {
    init_tracing();
    let store = ThingStore::new(1).unwrap();
    let (first, first_runs) = store.count_runs();
    store.add_point(&point(1)).unwrap();
    assert_eq!(first_runs.load(Ordering::SeqCst), 2);
    drop(first);

    let (_second, second_runs) = store.count_runs();
    store.add_point(&point(2)).unwrap();

    assert_eq!(first_runs.load(Ordering::SeqCst), 2);
    assert_eq!(second_runs.load(Ordering::SeqCst), 2);
    assert_eq!(store.bridge.stats().invalidations_emitted, 2);
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Record(TransactionId),
    End(TransactionId),
    Invalidated(ObserverId),
}

struct EventLog(Arc<Mutex<Vec<Event>>>);

impl MutationSink for EventLog {
    fn begin(&self, _transaction: TransactionId, _origin: braid_core::Origin) {}

    fn record(&self, record: MutationRecord) {
        self.0.lock().push(Event::Record(record.transaction));
    }

    fn end(&self, transaction: TransactionId) {
        self.0.lock().push(Event::End(transaction));
    }
}

#[test]
fn test_no_invalidation_before_last_record() {
    init_tracing();
    let doc = Document::new(ClientId(1));
    let log = Arc::new(Mutex::new(Vec::new()));
    doc.add_mutation_sink(Arc::new(EventLog(log.clone())));

    let engine = RecordingEngine::new();
    let _bridge = ObserverBridge::attach(&doc, engine.clone(), BridgeConfig::default());
    let things = doc.sequence("things").unwrap();
    let observer = ObserverId(9);
    engine.track(observer, || things.len().unwrap());

    // the hook inspects the document at the moment of invalidation
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let (things, seen, log) = (things.clone(), seen.clone(), log.clone());
        engine.on_invalidate(move |observer| {
            log.lock().push(Event::Invalidated(observer));
            let fields = things
                .get_map(0)
                .unwrap()
                .map(|map| map.len().unwrap())
                .unwrap_or_default();
            seen.lock().push((things.len().unwrap(), fields));
        });
    }

    things
        .push_map([
            ("id", Content::from("a")),
            ("x", Content::from(1)),
            ("y", Content::from(2)),
        ])
        .unwrap();

    assert_eq!(*seen.lock(), vec![(1, 3)]);
    let events = log.lock().clone();
    let end = events
        .iter()
        .position(|e| matches!(e, Event::End(_)))
        .unwrap();
    let invalidated = events
        .iter()
        .position(|e| matches!(e, Event::Invalidated(_)))
        .unwrap();
    assert!(invalidated > end);
    assert_eq!(
        events.iter().filter(|e| matches!(e, Event::Record(_))).count(),
        5
    );
    assert_eq!(events.last(), Some(&Event::Invalidated(observer)));
}

#[test]
fn test_engine_batches_each_transaction() {
    init_tracing();
    let doc = Document::new(ClientId(1));
    let engine = RecordingEngine::new();
    let _bridge = ObserverBridge::attach(&doc, engine.clone(), BridgeConfig::default());
    let left = doc.sequence("left").unwrap();
    let right = doc.map("right").unwrap();
    let (a, b) = (ObserverId(1), ObserverId(2));
    engine.track(a, || left.len().unwrap());
    engine.track(b, || right.keys().unwrap());

    doc.transact(|_| {
        left.push(1).unwrap();
        right.set("k", "v").unwrap();
        left.push(2).unwrap();
    });
    right.set("k", "w").unwrap();

    let calls = engine.invalidations();
    assert_eq!(engine.batches(), 2);
    assert_eq!(calls.len(), 3);
    assert_eq!((calls[0].batch, calls[1].batch, calls[2].batch), (1, 1, 2));
    assert_eq!(calls[2].observer, b);
}

#[test]
fn test_runtime_runs_reaction_once_per_batch() {
    init_tracing();
    let store = ThingStore::new(1).unwrap();
    let labels = store.doc.map("labels").unwrap();
    let label = {
        let labels = labels.clone();
        store.runtime.computed(move || labels.get("title").unwrap())
    };
    let runs = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let _reaction = {
        let (things, label, runs) = (store.things_map.clone(), label.clone(), runs.clone());
        store.runtime.autorun(move || {
            things.get();
            label.get();
            runs.fetch_add(1, Ordering::SeqCst);
        })
    };

    store.doc.transact(|_| {
        store.add_point(&point(1)).unwrap();
        labels.set("title", "points").unwrap();
    });

    // two computed values invalidated in one batch, one reaction run
    assert_eq!(store.bridge.stats().invalidations_emitted, 2);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn test_detached_bridge_stops_emitting() {
    init_tracing();
    let store = ThingStore::new(1).unwrap();
    let (_reaction, runs) = store.count_runs();
    store.bridge.detach();
    assert!(!store.bridge.is_attached());

    store.add_point(&point(1)).unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(store.bridge.stats().transactions_closed, 0);
}
