//! Replicas linked through replication coordinators

use assert_matches::assert_matches;
use braid_bridge::{ReplicationCoordinator, ReplicationError};
use braid_core::ReplicationConfig;
use braid_testkit::{init_tracing, Point, ThingStore};
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn linked_pair() -> (
    ThingStore,
    ThingStore,
    Arc<ReplicationCoordinator>,
    Arc<ReplicationCoordinator>,
) {
    let one = ThingStore::new(1).unwrap();
    let two = ThingStore::new(2).unwrap();
    let a = ReplicationCoordinator::new(one.doc.clone(), ReplicationConfig::default());
    let b = ReplicationCoordinator::new(two.doc.clone(), ReplicationConfig::default());
    ReplicationCoordinator::link(&a, &b);
    ReplicationCoordinator::link(&b, &a);
    (one, two, a, b)
}

#[test]
fn test_each_forwarded_transaction_invalidates_peer_once() {
    init_tracing();
    let (one, two, _a, _b) = linked_pair();
    let (_reaction, runs) = two.count_runs();

    for n in 0..3 {
        one.add_point(&Point::new(format!("p{n}"), n, n)).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), n as usize + 2);
    }

    assert_eq!(two.bridge.stats().invalidations_emitted, 3);
    assert_eq!(two.points(), one.points());
}

#[test]
fn test_edits_on_both_sides_converge_without_echo() {
    init_tracing();
    let (one, two, a, b) = linked_pair();
    let (_r1, runs_one) = one.count_runs();
    let (_r2, runs_two) = two.count_runs();

    one.add_point(&Point::new("left", 0, 0)).unwrap();
    two.add_point(&Point::new("right", 1, 1)).unwrap();

    // one local and one remote transaction on each side
    assert_eq!(runs_one.load(Ordering::SeqCst), 3);
    assert_eq!(runs_two.load(Ordering::SeqCst), 3);
    assert_eq!(one.points(), two.points());
    assert_eq!(one.points().len(), 2);
    assert_eq!((a.queued(), b.queued()), (0, 0));
}

#[test]
fn test_reaction_reads_updated_state_after_remote_apply() {
    init_tracing();
    let (one, two, _a, _b) = linked_pair();
    let observed = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let _reaction = {
        let (points, observed) = (two.things_map.clone(), observed.clone());
        two.runtime.autorun(move || {
            observed.lock().push(points.get().keys().cloned().collect::<Vec<_>>());
        })
    };

    one.add_point(&Point::new("x", 5, 5)).unwrap();

    assert_eq!(
        *observed.lock(),
        vec![Vec::<String>::new(), vec!["x".to_string()]]
    );
}

#[test]
fn test_update_arriving_inside_open_transaction_is_applied_after_commit() {
    init_tracing();
    let (one, two, a, b) = linked_pair();
    let (_reaction, runs) = two.count_runs();

    two.doc.transact(|_| {
        two.add_point(&Point::new("mine", 0, 0)).unwrap();
        one.add_point(&Point::new("theirs", 1, 1)).unwrap();
        assert_eq!(b.queued(), 1);
    });

    assert_eq!((a.queued(), b.queued()), (0, 0));
    assert_eq!(two.points().len(), 2);
    assert_eq!(two.points(), one.points());
    // the local transaction, then the held remote one
    assert_eq!(runs.load(Ordering::SeqCst), 3);
    assert_eq!(two.bridge.stats().sequencing_errors, 0);
}

#[test]
fn test_full_queue_rejects_delivery() {
    init_tracing();
    let store = ThingStore::new(1).unwrap();
    let config = ReplicationConfig {
        max_queued_updates: 2,
        ..ReplicationConfig::default()
    };
    let coordinator = ReplicationCoordinator::new(store.doc.clone(), config);
    coordinator.enqueue(vec![0]).unwrap();
    coordinator.enqueue(vec![1]).unwrap();

    assert_matches!(
        coordinator.deliver(vec![2]),
        Err(ReplicationError::QueueFull { capacity: 2 })
    );
    let report = coordinator.drain();
    assert_eq!((report.applied, report.failed), (0, 2));
    assert_eq!(store.bridge.stats().transactions_closed, 0);
}
