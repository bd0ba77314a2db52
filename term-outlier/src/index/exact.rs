//! Exact neighbor index: an M-tree over distinct coordinates plus a side map
//! from each coordinate to the elements located there.
//!
//! Streams often repeat values. Storing each distinct coordinate once in the tree
//! keeps it small, and the side map expands a tree hit into every element at
//! that position.

use std::collections::{BTreeSet, HashMap};

use tracing::warn;

use super::mtree::{MTree, DEFAULT_NODE_CAPACITY};
use super::{MetricRangeIndex, Neighbor, NeighborIndex};
use crate::element::ElementId;
use crate::error::{OutlierError, Result};

/// Bit-exact coordinate key. `-0.0` is folded into `0.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoordKey(Vec<u64>);

impl CoordKey {
    pub fn new(coords: &[f64]) -> Self {
        Self(coords.iter().map(|&x| (x + 0.0).to_bits()).collect())
    }
}

/// M-tree backed exact range search over pending elements.
#[derive(Debug, Clone)]
pub struct ExactNeighborIndex {
    tree: MTree<CoordKey>,
    members: HashMap<CoordKey, BTreeSet<ElementId>>,
    len: usize,
}

impl Default for ExactNeighborIndex {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_NODE_CAPACITY)
    }
}

impl ExactNeighborIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses tree nodes holding at most `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tree: MTree::with_capacity(capacity),
            members: HashMap::new(),
            len: 0,
        }
    }

    /// Number of distinct coordinates stored in the tree.
    pub fn distinct_points(&self) -> usize {
        self.tree.len()
    }

    /// Every indexed element id, ascending.
    pub fn ids(&self) -> Vec<ElementId> {
        let mut ids: Vec<ElementId> = self.members.values().flatten().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl NeighborIndex for ExactNeighborIndex {
    fn name(&self) -> &'static str {
        "mtree"
    }

    fn insert(&mut self, id: ElementId, coords: &[f64]) {
        let key = CoordKey::new(coords);
        let entry = self.members.entry(key.clone()).or_default();
        if entry.is_empty() {
            self.tree.insert(key, coords.to_vec());
        }
        if entry.insert(id) {
            self.len += 1;
        }
    }

    fn remove(&mut self, id: ElementId, coords: &[f64]) -> Result<bool> {
        let key = CoordKey::new(coords);
        let Some(entry) = self.members.get_mut(&key) else {
            return Ok(false);
        };
        if !entry.remove(&id) {
            return Ok(false);
        }
        self.len -= 1;
        if entry.is_empty() {
            self.members.remove(&key);
            if !self.tree.remove(&key, coords) {
                warn!(element = id, "coordinate present in side map but missing from tree");
                return Err(OutlierError::consistency(
                    "exact neighbor index",
                    format!("coordinates of element {id} missing from the metric tree"),
                ));
            }
        }
        Ok(true)
    }

    fn range_query(&self, coords: &[f64], radius: f64) -> Vec<Neighbor> {
        let mut results: Vec<Neighbor> = self
            .tree
            .range_query(coords, radius)
            .into_iter()
            .flat_map(|(key, distance)| {
                self.members
                    .get(&key)
                    .into_iter()
                    .flatten()
                    .map(move |&id| Neighbor { id, distance })
            })
            .collect();
        results.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
        results
    }

    fn len(&self) -> usize {
        self.len
    }

    fn clear(&mut self) {
        self.tree.clear();
        self.members.clear();
        self.len = 0;
    }
}

impl MetricRangeIndex for ExactNeighborIndex {}
