//! Micro-clusters and the index over their centers.
//!
//! A micro-cluster groups elements lying within `R/2` of a fixed center element,
//! so any two members are at most `R` apart. Once it holds more than `k` members,
//! membership alone certifies every member as an inlier.
//!
//! Clusters are kept in two structures that must agree: an M-tree keyed by
//! [`ClusterId`] for range search over centers, and a registry owning the
//! cluster data. Removal checks both and reports a consistency fault on mismatch.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::mtree::MTree;
use crate::element::ElementId;
use crate::error::{OutlierError, Result};

/// Stable handle of a micro-cluster. Handles are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterId(u64);

impl ClusterId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mc#{}", self.0)
    }
}

/// A group of elements within `R/2` of a center element.
#[derive(Debug, Clone)]
pub struct MicroCluster {
    id: ClusterId,
    center: ElementId,
    center_coords: Vec<f64>,
    pub(crate) members: BTreeSet<ElementId>,
    /// Pending elements within 1.5R of the center (reverse of their candidate refs).
    pub(crate) candidates: BTreeSet<ElementId>,
}

impl MicroCluster {
    pub fn id(&self) -> ClusterId {
        self.id
    }

    pub fn center(&self) -> ElementId {
        self.center
    }

    pub fn center_coords(&self) -> &[f64] {
        &self.center_coords
    }

    /// Members including the center.
    pub fn members(&self) -> &BTreeSet<ElementId> {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Read-only copy of a cluster for inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub id: ClusterId,
    pub center: ElementId,
    pub center_coords: Vec<f64>,
    pub members: Vec<ElementId>,
}

impl From<&MicroCluster> for ClusterSnapshot {
    fn from(cluster: &MicroCluster) -> Self {
        Self {
            id: cluster.id,
            center: cluster.center,
            center_coords: cluster.center_coords.clone(),
            members: cluster.members.iter().copied().collect(),
        }
    }
}

/// Range-searchable collection of micro-clusters.
#[derive(Debug, Clone, Default)]
pub struct MicroClusterIndex {
    tree: MTree<ClusterId>,
    registry: BTreeMap<ClusterId, MicroCluster>,
    next_id: u64,
}

impl MicroClusterIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a cluster centered at `center` with the given members.
    pub fn create(
        &mut self,
        center: ElementId,
        center_coords: &[f64],
        members: impl IntoIterator<Item = ElementId>,
    ) -> ClusterId {
        self.next_id += 1;
        let id = ClusterId(self.next_id);
        let mut members: BTreeSet<ElementId> = members.into_iter().collect();
        members.insert(center);
        self.tree.insert(id, center_coords.to_vec());
        self.registry.insert(
            id,
            MicroCluster {
                id,
                center,
                center_coords: center_coords.to_vec(),
                members,
                candidates: BTreeSet::new(),
            },
        );
        id
    }

    pub fn get(&self, id: ClusterId) -> Option<&MicroCluster> {
        self.registry.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: ClusterId) -> Option<&mut MicroCluster> {
        self.registry.get_mut(&id)
    }

    /// Clusters whose centers lie within `radius`, nearest first.
    pub fn range_query(&self, coords: &[f64], radius: f64) -> Vec<(ClusterId, f64)> {
        self.tree.range_query(coords, radius)
    }

    /// Removes a cluster from both the tree and the registry.
    pub fn remove(&mut self, id: ClusterId) -> Result<MicroCluster> {
        match self.registry.remove(&id) {
            Some(cluster) => {
                if self.tree.remove(&id, &cluster.center_coords) {
                    Ok(cluster)
                } else {
                    warn!(cluster = %id, "cluster registered but missing from the center tree");
                    Err(OutlierError::consistency(
                        "micro-cluster index",
                        format!("{id} was removed from the registry but not found in the center tree"),
                    ))
                }
            }
            None => {
                let message = if self.tree.contains_key(&id) {
                    format!("{id} is in the center tree but not in the registry")
                } else {
                    format!("{id} is not registered")
                };
                warn!(cluster = %id, "{message}");
                Err(OutlierError::consistency("micro-cluster index", message))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MicroCluster> {
        self.registry.values()
    }

    pub fn snapshots(&self) -> Vec<ClusterSnapshot> {
        self.iter().map(ClusterSnapshot::from).collect()
    }

    pub fn clear(&mut self) {
        self.tree.clear();
        self.registry.clear();
    }
}
