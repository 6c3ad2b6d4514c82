//! Property tests: one invalidation per transaction, local or remote

use braid_testkit::strategies::{arb_delivery, arb_points};
use braid_testkit::{init_tracing, Delivery, ThingStore};
use proptest::prelude::*;
use std::sync::atomic::Ordering;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_each_point_invalidates_once(
        batch in arb_points(6).prop_flat_map(|points| {
            let n = points.len();
            (Just(points), prop::collection::vec(arb_delivery(), n))
        })
    ) {
        init_tracing();
        let (points, deliveries) = batch;
        let store = ThingStore::new(1).unwrap();
        let peer = ThingStore::new(2).unwrap();
        let (_reaction, runs) = store.count_runs();

        for (i, (point, delivery)) in points.iter().zip(&deliveries).enumerate() {
            match delivery {
                Delivery::Local => {
                    store.add_point(point).unwrap();
                }
                Delivery::Remote => {
                    peer.sync_from(&store).unwrap();
                    peer.add_point(point).unwrap();
                    store.sync_from(&peer).unwrap();
                }
            }
            prop_assert_eq!(runs.load(Ordering::SeqCst), i + 2);
            prop_assert_eq!(store.bridge.stats().invalidations_emitted, i as u64 + 1);
        }
        prop_assert_eq!(store.things.len().unwrap(), points.len());
    }

    #[test]
    fn prop_single_transaction_invalidates_once(points in arb_points(8)) {
        init_tracing();
        let store = ThingStore::new(1).unwrap();
        let (_reaction, runs) = store.count_runs();

        store.doc.transact(|_| {
            for point in &points {
                store.add_point(point).unwrap();
            }
        });

        // an empty transaction touches nothing
        let expected = usize::from(!points.is_empty());
        prop_assert_eq!(runs.load(Ordering::SeqCst), 1 + expected);
        prop_assert_eq!(store.bridge.stats().invalidations_emitted, expected as u64);
    }
}
