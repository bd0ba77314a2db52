//! Windowed stream elements and their neighbor bookkeeping.
//!
//! Every arriving vector becomes a [`StreamElement`] owned by the window. Two
//! counters describe its neighborhood:
//!
//! - `count_after` counts neighbors from the element's own slide or a later one.
//!   Those neighbors expire no earlier than the element itself, so the counter never
//!   has to be decremented.
//! - `preceding` lists neighbors from earlier slides, ascending by id. Only ids that
//!   are still inside the window are counted; stale ids are pruned lazily.
//!
//! An element whose `count_after` alone reaches `k` is a *safe inlier*: no future
//! expiry can turn it back into an outlier.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::index::ClusterId;

/// Arrival-order identifier, starting at 1.
pub type ElementId = u64;

/// Id assigned to the first element of a stream.
pub const FIRST_ELEMENT_ID: ElementId = 1;

/// Current classification of a live element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    /// Fewer than `k` neighbors in the window
    Outlier,
    /// Inlier tracked individually in the pending index
    InlierPending,
    /// Inlier certified by micro-cluster membership
    InlierClustered,
}

impl Classification {
    /// Returns true for both inlier states.
    pub fn is_inlier(self) -> bool {
        !matches!(self, Self::Outlier)
    }
}

/// Where a live element is currently indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Placement {
    /// Tracked by the pending neighbor index
    Pending,
    /// Owned by a micro-cluster
    Clustered(ClusterId),
    /// Live in the window but absent from every index (evicted safe inliers,
    /// or members of a dissolved cluster awaiting reprocessing)
    Detached,
}

impl Placement {
    /// Returns the owning cluster, if any.
    pub fn cluster(self) -> Option<ClusterId> {
        match self {
            Self::Clustered(id) => Some(id),
            _ => None,
        }
    }
}

/// Lifetime classification summary used by the statistics counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum History {
    /// Classified both inlier and outlier at different moments
    Both,
    /// Never classified outlier
    OnlyInlier,
    /// Never classified inlier
    OnlyOutlier,
}

/// Slide index of an id: ids `1..=slide_size` belong to slide 1, and so on.
pub fn slide_of(id: ElementId, slide_size: u64) -> u64 {
    (id - FIRST_ELEMENT_ID) / slide_size + 1
}

/// A vector in the window together with its neighbor bookkeeping.
#[derive(Debug, Clone)]
pub struct StreamElement {
    pub(crate) id: ElementId,
    pub(crate) coords: Vec<f64>,
    pub(crate) classification: Classification,
    pub(crate) count_after: u32,
    pub(crate) preceding: Vec<ElementId>,
    pub(crate) placement: Placement,
    pub(crate) candidate_clusters: BTreeSet<ClusterId>,
    pub(crate) ever_inlier: bool,
    pub(crate) ever_outlier: bool,
}

impl StreamElement {
    /// Creates an element with no known neighbors.
    ///
    /// The initial `Outlier` state is provisional and does not count towards the
    /// lifetime history until the element is classified for the first time.
    pub fn new(id: ElementId, coords: Vec<f64>) -> Self {
        Self {
            id,
            coords,
            classification: Classification::Outlier,
            count_after: 0,
            preceding: Vec::new(),
            placement: Placement::Detached,
            candidate_clusters: BTreeSet::new(),
            ever_inlier: false,
            ever_outlier: false,
        }
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn coords(&self) -> &[f64] {
        &self.coords
    }

    pub fn classification(&self) -> Classification {
        self.classification
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    pub fn count_after(&self) -> u32 {
        self.count_after
    }

    /// Preceding neighbors, ascending by id. May contain expired ids.
    pub fn preceding(&self) -> &[ElementId] {
        &self.preceding
    }

    /// Clusters whose centers lie within 1.5R of this element.
    pub fn candidate_clusters(&self) -> &BTreeSet<ClusterId> {
        &self.candidate_clusters
    }

    /// Records a preceding neighbor, keeping the list sorted and unique.
    pub(crate) fn insert_preceding(&mut self, id: ElementId) {
        if let Err(pos) = self.preceding.binary_search(&id) {
            self.preceding.insert(pos, id);
        }
    }

    /// Drops preceding neighbors with ids below `since`.
    pub(crate) fn prune_preceding(&mut self, since: ElementId) {
        let cut = self.preceding.partition_point(|&id| id < since);
        self.preceding.drain(..cut);
    }

    /// Number of preceding neighbors with id `>= since`.
    pub fn live_preceding(&self, since: ElementId) -> usize {
        self.preceding.len() - self.preceding.partition_point(|&id| id < since)
    }

    /// Oldest preceding neighbor with id `>= since`.
    pub fn oldest_live_preceding(&self, since: ElementId) -> Option<ElementId> {
        let pos = self.preceding.partition_point(|&id| id < since);
        self.preceding.get(pos).copied()
    }

    /// Total neighbor count relative to a window starting at `since`.
    pub fn neighbor_count(&self, since: ElementId) -> usize {
        self.count_after as usize + self.live_preceding(since)
    }

    /// Whether forward neighbors alone meet the threshold.
    pub fn is_safe_inlier(&self, k: u32) -> bool {
        self.count_after >= k
    }

    /// Sets the classification and records it in the lifetime history.
    pub(crate) fn set_classification(&mut self, classification: Classification) {
        self.classification = classification;
        if classification.is_inlier() {
            self.ever_inlier = true;
        } else {
            self.ever_outlier = true;
        }
    }

    /// Clears neighbor bookkeeping so the element can be processed again.
    ///
    /// Returns the candidate cluster references that were dropped, so the caller
    /// can unlink the reverse references.
    pub(crate) fn reset_neighbors(&mut self) -> BTreeSet<ClusterId> {
        self.count_after = 0;
        self.preceding.clear();
        self.placement = Placement::Detached;
        std::mem::take(&mut self.candidate_clusters)
    }

    /// Outlier for its entire lifetime so far.
    pub fn is_pure_outlier(&self) -> bool {
        self.ever_outlier && !self.ever_inlier
    }

    pub fn history(&self) -> History {
        match (self.ever_inlier, self.ever_outlier) {
            (true, true) => History::Both,
            (true, false) => History::OnlyInlier,
            _ => History::OnlyOutlier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slide_of() {
        assert_eq!(slide_of(1, 5), 1);
        assert_eq!(slide_of(5, 5), 1);
        assert_eq!(slide_of(6, 5), 2);
        assert_eq!(slide_of(11, 5), 3);
        assert_eq!(slide_of(7, 1), 7);
    }

    #[test]
    fn test_preceding_is_sorted_and_unique() {
        let mut element = StreamElement::new(20, vec![0.0]);
        for id in [7, 3, 12, 3, 9, 7] {
            element.insert_preceding(id);
        }
        assert_eq!(element.preceding(), &[3, 7, 9, 12]);
        assert_eq!(element.live_preceding(1), 4);
        assert_eq!(element.live_preceding(8), 2);
        assert_eq!(element.oldest_live_preceding(8), Some(9));
        assert_eq!(element.oldest_live_preceding(13), None);

        element.prune_preceding(9);
        assert_eq!(element.preceding(), &[9, 12]);
    }

    #[test]
    fn test_neighbor_count_and_safety() {
        let mut element = StreamElement::new(10, vec![0.0]);
        element.count_after = 2;
        element.insert_preceding(4);
        element.insert_preceding(6);
        assert_eq!(element.neighbor_count(1), 4);
        assert_eq!(element.neighbor_count(5), 3);
        assert!(!element.is_safe_inlier(3));
        element.count_after = 3;
        assert!(element.is_safe_inlier(3));
    }

    #[test]
    fn test_history_tracking() {
        let mut element = StreamElement::new(1, vec![0.0]);
        assert!(!element.is_pure_outlier());

        element.set_classification(Classification::Outlier);
        assert!(element.is_pure_outlier());
        assert_eq!(element.history(), History::OnlyOutlier);

        element.set_classification(Classification::InlierPending);
        assert!(!element.is_pure_outlier());
        assert_eq!(element.history(), History::Both);

        let mut inlier = StreamElement::new(2, vec![0.0]);
        inlier.set_classification(Classification::InlierClustered);
        assert_eq!(inlier.history(), History::OnlyInlier);
    }

    #[test]
    fn test_reset_neighbors() {
        let mut element = StreamElement::new(3, vec![1.0, 2.0]);
        element.count_after = 4;
        element.insert_preceding(1);
        element.candidate_clusters.insert(ClusterId::new(8));
        element.placement = Placement::Clustered(ClusterId::new(2));

        let dropped = element.reset_neighbors();
        assert_eq!(dropped.len(), 1);
        assert_eq!(element.count_after(), 0);
        assert!(element.preceding().is_empty());
        assert!(element.candidate_clusters().is_empty());
        assert_eq!(element.placement(), Placement::Detached);
    }
}
