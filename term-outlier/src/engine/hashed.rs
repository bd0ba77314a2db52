//! Hash-based detector.
//!
//! Every element goes into a single neighbor index, by default an [`LshIndex`].
//! A new element counts whatever the index returns for its radius and is
//! counted back by each of those elements. There are no micro-clusters, so the
//! expiry path is a plain removal from the index.
//!
//! With an LSH index, neighbors that never share a bucket are missed, so counts
//! can only be underestimated and the reported outliers are a superset of the
//! exact ones. With an [`ExactNeighborIndex`](crate::index::ExactNeighborIndex)
//! the detector is exact.

use std::collections::BTreeSet;

use tracing::{debug, info, instrument};

use super::driver::{self, DetectorCore, StreamEngine};
use super::OutlierDetector;
use crate::config::{DetectorConfig, HashConfig};
use crate::element::{ElementId, Placement, StreamElement};
use crate::error::{OutlierError, Result};
use crate::index::{LshIndex, NeighborIndex};
use crate::logging::LogConfig;
use crate::perf_debug;
use crate::report::DetectionStats;

#[derive(Debug, Clone)]
pub struct HashedEngine<I: NeighborIndex = LshIndex> {
    core: DetectorCore,
    index: I,
}

impl HashedEngine<LshIndex> {
    /// Detector backed by random-projection hash tables.
    ///
    /// The vector dimensionality is fixed by `hash.dimensions`.
    pub fn lsh(config: DetectorConfig, hash: &HashConfig) -> Result<Self> {
        if let Some(d) = config.dimensions {
            if d != hash.dimensions {
                return Err(OutlierError::configuration(format!(
                    "detector dimensions ({d}) differ from hash dimensions ({})",
                    hash.dimensions
                )));
            }
        }
        let index = LshIndex::new(hash)?;
        Self::new(config.with_dimensions(hash.dimensions), index)
    }
}

impl<I: NeighborIndex> HashedEngine<I> {
    pub fn new(config: DetectorConfig, index: I) -> Result<Self> {
        let core = DetectorCore::new(config)?;
        info!(
            window_size = core.config.window_size,
            slide_size = core.config.slide_size,
            radius = core.config.radius,
            k = core.config.k,
            index = index.name(),
            "hash-based detector created"
        );
        Ok(Self { core, index })
    }

    pub fn with_log_config(mut self, log: LogConfig) -> Self {
        self.core.log = log;
        self
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    /// Live elements ascending by id.
    pub fn elements(&self) -> impl Iterator<Item = &StreamElement> {
        self.core.window.iter()
    }
}

impl<I: NeighborIndex> StreamEngine for HashedEngine<I> {
    fn core(&self) -> &DetectorCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DetectorCore {
        &mut self.core
    }

    fn admit(&mut self, id: ElementId) -> Result<()> {
        let coords = self.core.element(id)?.coords.clone();
        self.core.counters.range_queries += 1;
        let hits = self.index.range_query(&coords, self.core.config.radius);
        for hit in &hits {
            self.core.add_neighbor(id, hit.id, false);
            self.core.add_neighbor(hit.id, id, true);
        }

        self.index.insert(id, &coords);
        if let Some(element) = self.core.window.get_mut(id) {
            element.placement = Placement::Pending;
        }
        self.core.classify(id);
        perf_debug!(self.core.log, element = id, candidates = hits.len(), "element indexed");
        Ok(())
    }

    fn expire(&mut self, expired: &[StreamElement]) -> Result<()> {
        for element in expired {
            if !self.index.remove(element.id, &element.coords)? {
                return Err(OutlierError::consistency(
                    self.index.name(),
                    format!("expired element {} missing from the index", element.id),
                ));
            }
        }
        Ok(())
    }

    fn release_indices(&mut self) {
        self.index.clear();
        debug!(index = self.index.name(), "hash index released");
    }
}

impl<I: NeighborIndex> OutlierDetector for HashedEngine<I> {
    fn name(&self) -> &'static str {
        "hash_based"
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

    fn stats(&self) -> DetectionStats {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Classification;
    use crate::index::ExactNeighborIndex;

    fn config() -> DetectorConfig {
        DetectorConfig::new(6, 3, 1.0, 2).unwrap()
    }

    #[test]
    fn test_lsh_fixes_dimensions() {
        let mut engine = HashedEngine::lsh(config(), &HashConfig::new(2, 3, 4.0, 2)).unwrap();
        assert_eq!(engine.config().dimensions, Some(2));
        let err = engine.insert(vec![1.0]).unwrap_err();
        assert!(err.is_input_fault());

        let mismatched = config().with_dimensions(3);
        assert!(HashedEngine::lsh(mismatched, &HashConfig::new(2, 3, 4.0, 2)).is_err());
    }

    #[test]
    fn test_identical_points_are_inliers() {
        let mut engine = HashedEngine::lsh(config(), &HashConfig::new(4, 2, 4.0, 2)).unwrap();
        engine
            .process_batch(&[vec![1.0, 1.0], vec![1.0, 1.0], vec![1.0, 1.0]])
            .unwrap();
        assert_eq!(engine.classification(3), Some(Classification::InlierPending));
        assert_eq!(engine.classification(1), Some(Classification::InlierPending));
        assert_eq!(engine.index().len(), 3);
        assert_eq!(engine.stats().range_queries_executed, 3);
    }

    #[test]
    fn test_expiry_removes_from_index() {
        let mut engine = HashedEngine::new(config(), ExactNeighborIndex::new()).unwrap();
        let batch: Vec<Vec<f64>> = (0..7).map(|i| vec![f64::from(i) * 10.0]).collect();
        engine.process_batch(&batch).unwrap();
        // window [4, 9] after one slide
        assert_eq!(engine.window_bounds(), (4, 9));
        assert_eq!(engine.index().len(), 4);
        assert_eq!(engine.pure_outliers().len(), 3);
    }

    #[test]
    fn test_desynchronized_index_is_a_consistency_fault() {
        let mut engine = HashedEngine::new(config(), ExactNeighborIndex::new()).unwrap();
        let batch: Vec<Vec<f64>> = (0..6).map(|i| vec![f64::from(i)]).collect();
        engine.process_batch(&batch).unwrap();
        engine.index.remove(1, &[0.0]).unwrap();

        let err = engine.insert(vec![7.0]).unwrap_err();
        assert!(err.is_consistency_fault());
    }
}
