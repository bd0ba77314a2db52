//! Spatial indices used by the detectors.
//!
//! Two roles exist:
//!
//! - A **neighbor index** over individual pending elements, described by the
//!   [`NeighborIndex`] trait. [`ExactNeighborIndex`] answers range queries exactly
//!   with an M-tree; [`LshIndex`] answers them approximately with random-projection
//!   hashing.
//! - A **micro-cluster index** ([`MicroClusterIndex`]) over cluster centers. Only
//!   indices that implement [`MetricRangeIndex`] can back the micro-cluster
//!   detector, because cluster maintenance relies on exact `R/2` and `1.5R` queries.

use crate::element::ElementId;
use crate::error::Result;

pub mod cluster;
pub mod exact;
pub mod lsh;
pub mod mtree;

pub use cluster::{ClusterId, ClusterSnapshot, MicroCluster, MicroClusterIndex};
pub use exact::ExactNeighborIndex;
pub use lsh::{HashFunction, HashTable, LshIndex};
pub use mtree::MTree;

/// Euclidean distance over all dimensions of two equally sized vectors.
pub fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum::<f64>()
        .sqrt()
}

/// A range query hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Element found
    pub id: ElementId,
    /// Distance from the query point
    pub distance: f64,
}

/// Index over the coordinates of individual elements.
///
/// Implementations must return range query results ascending by distance, ties
/// broken by ascending id, so that detectors behave deterministically.
pub trait NeighborIndex {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Adds element `id` located at `coords`.
    fn insert(&mut self, id: ElementId, coords: &[f64]);

    /// Removes element `id` located at `coords`.
    ///
    /// Returns `Ok(false)` when the element is not indexed, and a consistency fault
    /// when the index's internal structures disagree about it.
    fn remove(&mut self, id: ElementId, coords: &[f64]) -> Result<bool>;

    /// Elements within `radius` of `coords`, ascending by distance.
    fn range_query(&self, coords: &[f64], radius: f64) -> Vec<Neighbor>;

    /// Number of indexed elements.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every element.
    fn clear(&mut self);
}

/// Marker for indices whose range queries are exact at any radius.
pub trait MetricRangeIndex: NeighborIndex {}
