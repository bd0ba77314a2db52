//! Micro-cluster based detector.
//!
//! Elements that sit within `R/2` of an existing micro-cluster center join that
//! cluster and are inliers by construction. Everything else lives in a pending
//! neighbor index and keeps explicit neighbor counts. When a pending element
//! finds at least `theta * k` pending elements within `R/2`, they are promoted
//! together into a new cluster.
//!
//! The same engine runs in two modes:
//!
//! - exact: the pending index grows as needed and the result matches a
//!   brute-force recount of every window;
//! - memory-bounded: the pending index is capped and random safe inliers are
//!   evicted to stay under the cap, trading accuracy for memory.

use std::collections::BTreeSet;

use tracing::{debug, info, instrument};

use super::driver::{self, DetectorCore, StreamEngine};
use super::memory_bound::MemoryBound;
use super::OutlierDetector;
use crate::config::{DetectorConfig, MemoryBoundConfig};
use crate::element::{Classification, ElementId, Placement, StreamElement};
use crate::error::{OutlierError, Result};
use crate::index::{
    euclidean_distance, ClusterId, ClusterSnapshot, ExactNeighborIndex, MetricRangeIndex,
    MicroClusterIndex, Neighbor,
};
use crate::logging::{format_coords, LogConfig};
use crate::{log_cluster_event, perf_debug};

/// Micro-cluster detector over a metric pending index.
#[derive(Debug, Clone)]
pub struct MicroClusterEngine<I: MetricRangeIndex = ExactNeighborIndex> {
    core: DetectorCore,
    pending: I,
    clusters: MicroClusterIndex,
    bound: Option<MemoryBound>,
    /// Members of the cluster being dissolved, while they are reprocessed
    reinsert: BTreeSet<ElementId>,
}

impl MicroClusterEngine<ExactNeighborIndex> {
    /// Exact detector with an unbounded pending index.
    pub fn exact(config: DetectorConfig) -> Result<Self> {
        Self::with_index(config, ExactNeighborIndex::new(), None)
    }

    /// Detector whose pending index holds at most `bound.pd_limit` elements.
    pub fn memory_bounded(config: DetectorConfig, bound: MemoryBoundConfig) -> Result<Self> {
        Self::with_index(config, ExactNeighborIndex::new(), Some(bound))
    }
}

impl<I: MetricRangeIndex> MicroClusterEngine<I> {
    /// Builds a detector over a caller-supplied pending index.
    pub fn with_index(config: DetectorConfig, pending: I, bound: Option<MemoryBoundConfig>) -> Result<Self> {
        let core = DetectorCore::new(config)?;
        let bound = bound
            .map(|b| MemoryBound::new(b, core.config.radius))
            .transpose()?;
        info!(
            window_size = core.config.window_size,
            slide_size = core.config.slide_size,
            radius = core.config.radius,
            k = core.config.k,
            index = pending.name(),
            pd_limit = bound.as_ref().map(MemoryBound::pd_limit),
            "micro-cluster detector created"
        );
        Ok(Self {
            core,
            pending,
            clusters: MicroClusterIndex::new(),
            bound,
            reinsert: BTreeSet::new(),
        })
    }

    pub fn with_log_config(mut self, log: LogConfig) -> Self {
        self.core.log = log;
        self
    }

    /// Current micro-clusters, ascending by id.
    pub fn clusters(&self) -> Vec<ClusterSnapshot> {
        self.clusters.snapshots()
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    /// Number of elements in the pending index.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of tracked safe inliers; always zero without a memory bound.
    pub fn safe_inlier_count(&self) -> usize {
        self.bound.as_ref().map_or(0, |b| b.safe.len())
    }

    pub fn memory_bound(&self) -> Option<&MemoryBoundConfig> {
        self.bound.as_ref().map(MemoryBound::config)
    }

    /// Live elements ascending by id.
    pub fn elements(&self) -> impl Iterator<Item = &StreamElement> {
        self.core.window.iter()
    }

    fn coords_of(&self, id: ElementId) -> Result<Vec<f64>> {
        Ok(self.core.element(id)?.coords.clone())
    }

    fn track_if_safe(&mut self, id: ElementId) {
        let Some(bound) = self.bound.as_mut() else {
            return;
        };
        if let Some(element) = self.core.window.get(id) {
            if element.placement == Placement::Pending && element.is_safe_inlier(self.core.config.k) {
                bound.safe.insert(id);
            }
        }
    }

    /// Places an element either in a cluster or in the pending index.
    ///
    /// `is_new` is false while members of a dissolved cluster are reprocessed;
    /// in that case only other reprocessed elements get their counts updated.
    fn process_element(&mut self, id: ElementId, is_new: bool) -> Result<()> {
        let coords = self.coords_of(id)?;
        let radius = self.core.config.radius;
        let nearby = self.clusters.range_query(&coords, 1.5 * radius);

        if let Some(&(cluster, distance)) = nearby.first() {
            if distance <= radius / 2.0 {
                return self.join_cluster(id, cluster, &coords, is_new);
            }
        }
        self.admit_pending(id, &coords, is_new, &nearby)
    }

    fn join_cluster(&mut self, id: ElementId, cid: ClusterId, coords: &[f64], is_new: bool) -> Result<()> {
        let cluster = self.clusters.get_mut(cid).ok_or_else(|| {
            OutlierError::consistency(
                "micro-cluster index",
                format!("{cid} returned by a center search but not registered"),
            )
        })?;
        cluster.members.insert(id);
        let candidates: Vec<ElementId> = cluster.candidates.iter().copied().collect();

        if let Some(element) = self.core.window.get_mut(id) {
            element.placement = Placement::Clustered(cid);
            element.set_classification(Classification::InlierClustered);
        }

        let radius = self.core.config.radius;
        let mut stale = Vec::new();
        for q in candidates {
            let close = match self.core.window.get(q) {
                Some(element)
                    if element.placement == Placement::Pending
                        && element.candidate_clusters.contains(&cid) =>
                {
                    euclidean_distance(&element.coords, coords) <= radius
                }
                _ => {
                    stale.push(q);
                    continue;
                }
            };
            if close && (is_new || self.reinsert.contains(&q)) {
                self.core.add_neighbor(q, id, true);
                self.track_if_safe(q);
            }
        }
        if let Some(cluster) = self.clusters.get_mut(cid) {
            for q in stale {
                cluster.candidates.remove(&q);
            }
        }
        perf_debug!(self.core.log, element = id, cluster = %cid, "element joined micro-cluster");
        Ok(())
    }

    fn admit_pending(
        &mut self,
        id: ElementId,
        coords: &[f64],
        is_new: bool,
        nearby: &[(ClusterId, f64)],
    ) -> Result<()> {
        let evicted = self.enforce_memory_bound()?;

        let radius = self.core.config.radius;
        let half = radius / 2.0;
        let admission = self.bound.as_ref().map_or(half, MemoryBound::admission_radius);

        self.core.counters.range_queries += 1;
        let hits: Vec<Neighbor> = self.pending.range_query(coords, 1.5 * radius);

        let mut near = Vec::new();
        let mut admitted = Vec::new();
        let mut outer = Vec::new();
        for hit in &hits {
            if hit.distance <= radius {
                self.core.add_neighbor(id, hit.id, false);
                if is_new || self.reinsert.contains(&hit.id) {
                    self.core.add_neighbor(hit.id, id, true);
                    self.track_if_safe(hit.id);
                }
            }
            if hit.distance <= half {
                near.push(hit.id);
            } else {
                if evicted && hit.distance <= admission {
                    admitted.push(hit.id);
                }
                outer.push(hit.id);
            }
        }

        if (near.len() + admitted.len()) as f64 >= self.core.config.promotion_threshold() {
            self.form_cluster(id, coords, near, admitted, outer)
        } else {
            self.keep_pending(id, coords, nearby)
        }
    }

    /// Evicts random safe inliers while the pending index is over its limit.
    ///
    /// Returns whether anything was evicted.
    fn enforce_memory_bound(&mut self) -> Result<bool> {
        let Some(bound) = self.bound.as_mut() else {
            return Ok(false);
        };
        let mut evicted = false;
        while self.pending.len() > bound.pd_limit() {
            let Some(victim) = bound.pick_victim() else {
                break;
            };
            let element = self.core.window.get_mut(victim).ok_or_else(|| {
                OutlierError::consistency(
                    "safe inlier set",
                    format!("element {victim} tracked as a safe inlier but not in the window"),
                )
            })?;
            if !self.pending.remove(victim, &element.coords)? {
                return Err(OutlierError::consistency(
                    "safe inlier set",
                    format!("element {victim} tracked as a safe inlier but not pending"),
                ));
            }
            element.placement = Placement::Detached;
            for cid in std::mem::take(&mut element.candidate_clusters) {
                if let Some(cluster) = self.clusters.get_mut(cid) {
                    cluster.candidates.remove(&victim);
                }
            }
            self.core.counters.evictions += 1;
            evicted = true;
            perf_debug!(self.core.log, element = victim, "evicted safe inlier from pending index");
        }
        Ok(evicted)
    }

    fn form_cluster(
        &mut self,
        center: ElementId,
        coords: &[f64],
        near: Vec<ElementId>,
        admitted: Vec<ElementId>,
        outer: Vec<ElementId>,
    ) -> Result<()> {
        let admitted_set: BTreeSet<ElementId> = admitted.iter().copied().collect();
        let absorbed: Vec<ElementId> = near.into_iter().chain(admitted).collect();
        let cid = self.clusters.create(center, coords, absorbed.iter().copied());
        self.core.counters.clusters_formed += 1;

        if let Some(element) = self.core.window.get_mut(center) {
            element.placement = Placement::Clustered(cid);
            element.set_classification(Classification::InlierClustered);
        }

        for &q in &absorbed {
            let q_coords = self.coords_of(q)?;
            if !self.pending.remove(q, &q_coords)? {
                return Err(OutlierError::consistency(
                    "pending index",
                    format!("element {q} returned by a range search but could not be removed"),
                ));
            }
            if let Some(bound) = self.bound.as_mut() {
                bound.safe.remove(q);
            }
            if let Some(element) = self.core.window.get_mut(q) {
                element.placement = Placement::Clustered(cid);
                element.set_classification(Classification::InlierClustered);
                for old in std::mem::take(&mut element.candidate_clusters) {
                    if let Some(cluster) = self.clusters.get_mut(old) {
                        cluster.candidates.remove(&q);
                    }
                }
            }
        }

        let mut linked = BTreeSet::new();
        for q in outer {
            if admitted_set.contains(&q) {
                continue;
            }
            if let Some(element) = self.core.window.get_mut(q) {
                element.candidate_clusters.insert(cid);
                linked.insert(q);
            }
        }
        if let Some(cluster) = self.clusters.get_mut(cid) {
            cluster.candidates = linked;
        }

        log_cluster_event!(
            self.core.log,
            cluster = %cid,
            center,
            members = absorbed.len() + 1,
            coords = %format_coords(coords, self.core.log.max_field_length),
            "micro-cluster formed"
        );
        Ok(())
    }

    fn keep_pending(&mut self, id: ElementId, coords: &[f64], nearby: &[(ClusterId, f64)]) -> Result<()> {
        let radius = self.core.config.radius;
        for &(cid, _) in nearby {
            let members: Vec<ElementId> = match self.clusters.get(cid) {
                Some(cluster) => cluster.members.iter().copied().collect(),
                None => continue,
            };
            for m in members {
                let close = self
                    .core
                    .window
                    .get(m)
                    .is_some_and(|member| euclidean_distance(&member.coords, coords) <= radius);
                if close {
                    self.core.add_neighbor(id, m, false);
                }
            }
        }

        self.core.classify(id);

        let k = self.core.config.k;
        let safe = self.core.element(id)?.is_safe_inlier(k);
        let admit = match &self.bound {
            None => true,
            Some(bound) => !safe || self.pending.len() < bound.pd_limit(),
        };
        if !admit {
            perf_debug!(self.core.log, element = id, "safe inlier not admitted to a full pending index");
            return Ok(());
        }

        self.pending.insert(id, coords);
        if let Some(element) = self.core.window.get_mut(id) {
            element.placement = Placement::Pending;
            element.candidate_clusters = nearby.iter().map(|&(cid, _)| cid).collect();
        }
        for &(cid, _) in nearby {
            if let Some(cluster) = self.clusters.get_mut(cid) {
                cluster.candidates.insert(id);
            }
        }
        if safe {
            if let Some(bound) = self.bound.as_mut() {
                bound.safe.insert(id);
            }
        }
        Ok(())
    }

    /// Breaks up a cluster and reprocesses its members as if they had just
    /// arrived, without notifying pending elements that already counted them.
    fn dissolve(&mut self, cid: ClusterId) -> Result<()> {
        let cluster = self.clusters.remove(cid)?;
        self.core.counters.clusters_dissolved += 1;
        log_cluster_event!(
            self.core.log,
            cluster = %cid,
            members = cluster.len(),
            "micro-cluster dissolved"
        );

        for &q in &cluster.candidates {
            if let Some(element) = self.core.window.get_mut(q) {
                element.candidate_clusters.remove(&cid);
            }
        }

        let mut members = Vec::with_capacity(cluster.len());
        for &m in cluster.members() {
            let Some(element) = self.core.window.get_mut(m) else {
                continue;
            };
            for old in element.reset_neighbors() {
                if let Some(other) = self.clusters.get_mut(old) {
                    other.candidates.remove(&m);
                }
            }
            members.push(m);
        }

        self.reinsert = members.iter().copied().collect();
        let mut result = Ok(());
        for &m in &members {
            result = self.process_element(m, false);
            if result.is_err() {
                break;
            }
        }
        self.reinsert.clear();
        result
    }
}

impl<I: MetricRangeIndex> StreamEngine for MicroClusterEngine<I> {
    fn core(&self) -> &DetectorCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DetectorCore {
        &mut self.core
    }

    fn admit(&mut self, id: ElementId) -> Result<()> {
        self.process_element(id, true)
    }

    /// Removes expired elements from their structures, then dissolves the
    /// clusters left with `k` members or fewer in ascending id order.
    fn expire(&mut self, expired: &[StreamElement]) -> Result<()> {
        let mut touched = BTreeSet::new();
        for element in expired {
            match element.placement {
                Placement::Clustered(cid) => {
                    let cluster = self.clusters.get_mut(cid).ok_or_else(|| {
                        OutlierError::consistency(
                            "micro-cluster index",
                            format!("element {} belongs to unknown {cid}", element.id),
                        )
                    })?;
                    if !cluster.members.remove(&element.id) {
                        return Err(OutlierError::consistency(
                            "micro-cluster index",
                            format!("element {} missing from the members of {cid}", element.id),
                        ));
                    }
                    touched.insert(cid);
                }
                Placement::Pending => {
                    if !self.pending.remove(element.id, &element.coords)? {
                        return Err(OutlierError::consistency(
                            "pending index",
                            format!("pending element {} missing from the index", element.id),
                        ));
                    }
                }
                Placement::Detached => {}
            }
            if let Some(bound) = self.bound.as_mut() {
                bound.safe.remove(element.id);
            }
            for cid in &element.candidate_clusters {
                if let Some(cluster) = self.clusters.get_mut(*cid) {
                    cluster.candidates.remove(&element.id);
                }
            }
        }

        let k = self.core.config.k as usize;
        for cid in touched {
            let undersized = self.clusters.get(cid).is_some_and(|c| c.len() <= k);
            if undersized {
                self.dissolve(cid)?;
            }
        }
        Ok(())
    }

    fn release_indices(&mut self) {
        self.pending.clear();
        self.clusters.clear();
        if let Some(bound) = self.bound.as_mut() {
            bound.safe.clear();
        }
        debug!("micro-cluster indices released");
    }
}

impl<I: MetricRangeIndex> OutlierDetector for MicroClusterEngine<I> {
    fn name(&self) -> &'static str {
        if self.bound.is_some() {
            "approx_memory_bounded"
        } else {
            "exact"
        }
    }

    fn config(&self) -> &DetectorConfig {
        &self.core.config
    }

    #[instrument(level = "debug", skip_all, fields(batch_len = batch.len()))]
    fn process_batch(&mut self, batch: &[Vec<f64>]) -> Result<()> {
        driver::process_batch(self, batch)
    }

    fn insert(&mut self, point: Vec<f64>) -> Result<ElementId> {
        driver::insert(self, point)
    }

    fn flush(&mut self) -> Result<()> {
        driver::flush(self)
    }

    fn pure_outliers(&self) -> &BTreeSet<ElementId> {
        self.core.ledger.pure_outliers()
    }

    fn stats(&self) -> crate::report::DetectionStats {
        self.core.stats()
    }

    fn element(&self, id: ElementId) -> Option<&StreamElement> {
        self.core.window.get(id)
    }

    fn window_bounds(&self) -> (ElementId, ElementId) {
        (self.core.window.start(), self.core.window.end())
    }

    fn is_flushed(&self) -> bool {
        self.core.is_flushed()
    }
}
