//! Continuous outlier detectors.
//!
//! All detectors share the same contract, [`OutlierDetector`]: vectors arrive in
//! batches, receive consecutive ids starting at 1, and are judged against a
//! count-based sliding window. An element is an *outlier* while fewer than `k`
//! other window elements lie within distance `R`; it is a *pure outlier* if it
//! was an outlier every time it was classified during its lifetime.
//!
//! Three variants are available:
//!
//! | Variant | Type | Neighbor search |
//! |---------|------|-----------------|
//! | exact | [`MicroClusterEngine`] | micro-clusters + M-tree, exact |
//! | approx memory-bounded | [`MicroClusterEngine`] with a [`MemoryBoundConfig`](crate::config::MemoryBoundConfig) | as exact, pending set capped |
//! | hash-based | [`HashedEngine`] | LSH buckets, approximate |
//!
//! Use [`build_detector`] to construct one from an [`EngineConfig`].

use std::collections::BTreeSet;

use tracing::info;

use crate::config::{DetectorConfig, EngineConfig, EngineKind};
use crate::element::{Classification, ElementId, StreamElement};
use crate::error::Result;
use crate::report::{DetectionReport, DetectionStats};

mod driver;
pub mod hashed;
pub mod mcod;
pub mod memory_bound;

pub use hashed::HashedEngine;
pub use mcod::MicroClusterEngine;
pub use memory_bound::SafeInlierSet;

/// A streaming distance-based outlier detector.
///
/// Every mutating operation either succeeds completely or, for input faults,
/// leaves the detector untouched. A consistency fault means internal structures
/// disagree; the detector should be discarded.
pub trait OutlierDetector {
    /// Variant name, as used in [`EngineKind::name`].
    fn name(&self) -> &'static str;

    fn config(&self) -> &DetectorConfig;

    /// Appends a batch of vectors to the stream.
    ///
    /// The batch is validated as a whole first: a dimension mismatch or a
    /// non-finite coordinate anywhere rejects it before any element is admitted.
    fn process_batch(&mut self, batch: &[Vec<f64>]) -> Result<()>;

    /// Appends one vector and returns its id.
    fn insert(&mut self, point: Vec<f64>) -> Result<ElementId>;

    /// Ends the stream: every live element is retired and counted.
    ///
    /// Flushing twice is a no-op; inserting after a flush is an error.
    fn flush(&mut self) -> Result<()>;

    /// Ids of retired elements that were outliers for their whole lifetime,
    /// ascending.
    fn pure_outliers(&self) -> &BTreeSet<ElementId>;

    fn stats(&self) -> DetectionStats;

    /// A live element, if `id` is in the window.
    fn element(&self, id: ElementId) -> Option<&StreamElement>;

    fn classification(&self, id: ElementId) -> Option<Classification> {
        self.element(id).map(StreamElement::classification)
    }

    /// Current `(start, end)` of the window.
    fn window_bounds(&self) -> (ElementId, ElementId);

    fn is_flushed(&self) -> bool;

    /// Snapshot of the results so far.
    fn report(&self) -> DetectionReport {
        DetectionReport::new(self.name(), self.pure_outliers().clone(), self.stats())
    }
}

/// Builds the detector described by `config`.
///
/// ```rust
/// use term_outlier::config::{DetectorConfig, EngineConfig, EngineKind};
/// use term_outlier::engine::build_detector;
///
/// # fn main() -> term_outlier::error::Result<()> {
/// let config = EngineConfig::new(DetectorConfig::new(100, 10, 1.0, 3)?, EngineKind::Exact);
/// let mut detector = build_detector(&config)?;
/// detector.process_batch(&[vec![0.0, 0.0], vec![0.1, 0.0]])?;
/// detector.flush()?;
/// assert_eq!(detector.pure_outliers().len(), 2);
/// # Ok(())
/// # }
/// ```
pub fn build_detector(config: &EngineConfig) -> Result<Box<dyn OutlierDetector>> {
    config.validate()?;
    let detector = config.detector.clone();
    let built: Box<dyn OutlierDetector> = match &config.kind {
        EngineKind::Exact => Box::new(MicroClusterEngine::exact(detector)?),
        EngineKind::ApproxMemoryBounded(bound) => Box::new(MicroClusterEngine::memory_bounded(
            detector,
            bound.clone(),
        )?),
        EngineKind::HashBased(hash) => Box::new(HashedEngine::lsh(detector, hash)?),
    };
    info!(engine = config.kind.name(), "detector built");
    Ok(built)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HashConfig, MemoryBoundConfig};

    #[test]
    fn test_build_each_variant() {
        let detector = DetectorConfig::new(20, 5, 1.0, 2).unwrap();
        let kinds = [
            EngineKind::Exact,
            EngineKind::ApproxMemoryBounded(MemoryBoundConfig::new(10, 0.1)),
            EngineKind::HashBased(HashConfig::new(3, 4, 2.0, 2)),
        ];
        for kind in kinds {
            let name = kind.name();
            let mut built = build_detector(&EngineConfig::new(detector.clone(), kind)).unwrap();
            assert_eq!(built.name(), name);
            built.process_batch(&[vec![0.0, 0.0], vec![0.0, 0.5]]).unwrap();
            assert_eq!(built.window_bounds(), (1, 20));
            assert_eq!(built.report().stats.processed, 2);
        }
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let detector = DetectorConfig::new(20, 5, 1.0, 2).unwrap().with_dimensions(3);
        let config = EngineConfig::new(detector, EngineKind::HashBased(HashConfig::new(3, 4, 2.0, 2)));
        assert!(build_detector(&config).is_err());
    }
}
