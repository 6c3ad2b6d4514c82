//! Property test strategies for Braid types

use crate::fixtures::Point;
use braid_core::ClientId;
use proptest::prelude::*;

pub use proptest;

/// Client ids in a small range so collisions between replicas are possible
pub fn arb_client_id() -> impl Strategy<Value = ClientId> {
    (1u64..64).prop_map(ClientId)
}

/// A point with a short numeric id
pub fn arb_point() -> impl Strategy<Value = Point> {
    (0u32..1000, -100i64..100, -100i64..100).prop_map(|(id, x, y)| Point::new(id.to_string(), x, y))
}

/// Up to `max` points
pub fn arb_points(max: usize) -> impl Strategy<Value = Vec<Point>> {
    prop::collection::vec(arb_point(), 0..=max)
}

/// Where a batch of points is written and how it reaches the observed replica
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Written on the observed replica
    Local,
    /// Written on a peer and applied as one update
    Remote,
}

/// Local or remote delivery
pub fn arb_delivery() -> impl Strategy<Value = Delivery> {
    prop_oneof![Just(Delivery::Local), Just(Delivery::Remote)]
}
