//! State and control flow shared by every detector variant.
//!
//! [`DetectorCore`] owns the window, the event queue and the retirement ledger,
//! and implements the neighbor bookkeeping that all variants agree on. The
//! variant-specific parts (how a new element finds its neighbors, how expired
//! elements leave the indices) are supplied through [`StreamEngine`], and the
//! free functions in this module drive the common arrival/slide/flush sequence.

use tracing::{debug, info, trace};

use crate::config::DetectorConfig;
use crate::element::{slide_of, Classification, ElementId, Placement, StreamElement};
use crate::error::{OutlierError, Result};
use crate::events::EventQueue;
use crate::log_window_op;
use crate::logging::LogConfig;
use crate::report::DetectionStats;
use crate::window::{RetirementLedger, Window};

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Counters {
    pub(crate) range_queries: u64,
    pub(crate) processed: u64,
    pub(crate) clusters_formed: u64,
    pub(crate) clusters_dissolved: u64,
    pub(crate) evictions: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct DetectorCore {
    pub(crate) config: DetectorConfig,
    pub(crate) log: LogConfig,
    pub(crate) window: Window,
    pub(crate) events: EventQueue,
    pub(crate) ledger: RetirementLedger,
    pub(crate) counters: Counters,
    dimensions: Option<usize>,
    flushed: bool,
}

impl DetectorCore {
    pub(crate) fn new(config: DetectorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            window: Window::new(config.window_size, config.slide_size),
            dimensions: config.dimensions,
            config,
            log: LogConfig::default(),
            events: EventQueue::new(),
            ledger: RetirementLedger::new(),
            counters: Counters::default(),
            flushed: false,
        })
    }

    pub(crate) fn is_flushed(&self) -> bool {
        self.flushed
    }

    #[cfg(test)]
    pub(crate) fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    /// Checks a batch before any of it is admitted.
    ///
    /// The dimensionality is taken from the configuration or, failing that, from
    /// the first vector ever accepted.
    pub(crate) fn validate_batch(&mut self, batch: &[Vec<f64>]) -> Result<()> {
        if self.flushed {
            return Err(OutlierError::configuration(
                "detector has been flushed and accepts no more input",
            ));
        }
        let Some(first) = batch.first() else {
            return Ok(());
        };
        let expected = self.dimensions.unwrap_or(first.len());
        if expected == 0 {
            return Err(OutlierError::DimensionMismatch {
                expected: 1,
                found: 0,
                position: 0,
            });
        }
        for (position, point) in batch.iter().enumerate() {
            if point.len() != expected {
                return Err(OutlierError::DimensionMismatch {
                    expected,
                    found: point.len(),
                    position,
                });
            }
            if let Some((dimension, &value)) = point.iter().enumerate().find(|(_, v)| !v.is_finite()) {
                return Err(OutlierError::InvalidCoordinate {
                    position,
                    dimension,
                    value,
                });
            }
        }
        self.dimensions = Some(expected);
        Ok(())
    }

    pub(crate) fn element(&self, id: ElementId) -> Result<&StreamElement> {
        self.window
            .get(id)
            .ok_or_else(|| OutlierError::Internal(format!("element {id} is not in the window")))
    }

    /// Records `candidate` as a neighbor of `target`.
    ///
    /// Same-or-later slide neighbors increment `count_after`; earlier ones go to
    /// the preceding list. With `update_state`, an outlier that reaches `k`
    /// neighbors becomes a pending inlier and, if unsafe, is scheduled for
    /// re-evaluation. Candidates that already left the window are ignored.
    pub(crate) fn add_neighbor(&mut self, target: ElementId, candidate: ElementId, update_state: bool) {
        let start = self.window.start();
        if candidate < start || !self.window.contains(candidate) {
            return;
        }
        let slide_size = self.config.slide_size;
        let k = self.config.k;
        let window_size = self.config.window_size;
        let Some(element) = self.window.get_mut(target) else {
            return;
        };
        let preceding = slide_of(candidate, slide_size) < slide_of(target, slide_size);
        if preceding {
            element.insert_preceding(candidate);
        } else {
            element.count_after += 1;
        }

        if !update_state {
            return;
        }
        match element.classification {
            Classification::Outlier if element.neighbor_count(start) >= k as usize => {
                element.set_classification(Classification::InlierPending);
                if !element.is_safe_inlier(k) {
                    self.events
                        .schedule(target, element.oldest_live_preceding(start), window_size);
                }
            }
            // only reprocessed elements can receive a neighbor older than the
            // one their pending re-check was scheduled for
            Classification::InlierPending if preceding && !element.is_safe_inlier(k) => {
                self.events.schedule(target, Some(candidate), window_size);
            }
            _ => {}
        }
    }

    /// Classifies an element from its current neighbor counts.
    pub(crate) fn classify(&mut self, id: ElementId) {
        let start = self.window.start();
        let k = self.config.k;
        let window_size = self.config.window_size;
        let Some(element) = self.window.get_mut(id) else {
            return;
        };
        if element.neighbor_count(start) >= k as usize {
            element.set_classification(Classification::InlierPending);
            if !element.is_safe_inlier(k) {
                self.events
                    .schedule(id, element.oldest_live_preceding(start), window_size);
            }
        } else {
            element.set_classification(Classification::Outlier);
        }
    }

    /// Re-evaluates every element whose scheduled time has come.
    ///
    /// Returns the number of items drained.
    pub(crate) fn drain_events(&mut self) -> usize {
        let start = self.window.start();
        let end = self.window.end();
        let k = self.config.k;
        let window_size = self.config.window_size;
        let mut drained = 0;
        while let Some(item) = self.events.pop_due(end) {
            drained += 1;
            let Some(element) = self.window.get_mut(item.element) else {
                continue;
            };
            if matches!(element.placement, Placement::Clustered(_)) {
                continue;
            }
            element.prune_preceding(start);
            if element.neighbor_count(start) < k as usize {
                element.set_classification(Classification::Outlier);
                trace!(element = item.element, "inlier lost its neighbors");
            } else if !element.is_safe_inlier(k) {
                self.events
                    .schedule(item.element, element.oldest_live_preceding(start), window_size);
            }
        }
        drained
    }

    pub(crate) fn retire_all(&mut self, elements: &[StreamElement]) {
        for element in elements {
            self.ledger.retire(element);
        }
    }

    /// Lifetime counters, including elements still in the window.
    pub(crate) fn stats(&self) -> DetectionStats {
        let (mut both, mut only_inlier, mut only_outlier) = self.ledger.history_counts();
        for element in self.window.iter() {
            match (element.ever_inlier, element.ever_outlier) {
                (true, true) => both += 1,
                (true, false) => only_inlier += 1,
                (false, true) => only_outlier += 1,
                (false, false) => {}
            }
        }
        DetectionStats {
            both_inlier_outlier: both,
            only_inlier,
            only_outlier,
            range_queries_executed: self.counters.range_queries,
            processed: self.counters.processed,
            clusters_formed: self.counters.clusters_formed,
            clusters_dissolved: self.counters.clusters_dissolved,
            evictions: self.counters.evictions,
        }
    }
}

/// Variant-specific hooks driven by the shared arrival/slide/flush sequence.
pub(crate) trait StreamEngine {
    fn core(&self) -> &DetectorCore;

    fn core_mut(&mut self) -> &mut DetectorCore;

    /// Finds the neighbors of a freshly pushed element, indexes and classifies it.
    fn admit(&mut self, id: ElementId) -> Result<()>;

    /// Removes expired elements from the variant's indices.
    ///
    /// Called after the window has advanced, before the expired elements are
    /// retired and before due events are drained.
    fn expire(&mut self, expired: &[StreamElement]) -> Result<()>;

    /// Drops all index contents once the stream is flushed.
    fn release_indices(&mut self);
}

/// Validates the whole batch, then admits its vectors in order.
pub(crate) fn process_batch<E: StreamEngine>(engine: &mut E, batch: &[Vec<f64>]) -> Result<()> {
    engine.core_mut().validate_batch(batch)?;
    for point in batch {
        ingest(engine, point.clone())?;
    }
    Ok(())
}

/// Validates and admits one vector.
pub(crate) fn insert<E: StreamEngine>(engine: &mut E, point: Vec<f64>) -> Result<ElementId> {
    engine
        .core_mut()
        .validate_batch(std::slice::from_ref(&point))?;
    ingest(engine, point)
}

fn ingest<E: StreamEngine>(engine: &mut E, coords: Vec<f64>) -> Result<ElementId> {
    if engine.core().window.needs_slide() {
        slide(engine)?;
    }
    let core = engine.core_mut();
    let id = core.window.push(coords);
    core.counters.processed += 1;
    engine.admit(id)?;
    Ok(id)
}

fn slide<E: StreamEngine>(engine: &mut E) -> Result<()> {
    let core = engine.core_mut();
    let expired = core.window.slide();
    log_window_op!(
        core.log,
        start = core.window.start(),
        end = core.window.end(),
        expired = expired.len(),
        "window slid"
    );

    engine.expire(&expired)?;

    let core = engine.core_mut();
    core.retire_all(&expired);
    let drained = core.drain_events();
    if drained > 0 {
        trace!(drained, pending_events = core.events.len(), "event queue drained");
    }
    Ok(())
}

/// Retires every live element and releases the indices. Repeated calls are no-ops.
pub(crate) fn flush<E: StreamEngine>(engine: &mut E) -> Result<()> {
    if engine.core().is_flushed() {
        debug!("flush requested on an already flushed detector");
        return Ok(());
    }
    let core = engine.core_mut();
    let remaining = core.window.drain_all();
    core.retire_all(&remaining);
    core.events.clear();
    core.flushed = true;

    engine.release_indices();

    let core = engine.core();
    if core.log.log_stats {
        let stats = core.stats();
        info!(
            processed = stats.processed,
            pure_outliers = core.ledger.pure_outliers().len(),
            range_queries = stats.range_queries_executed,
            clusters_formed = stats.clusters_formed,
            clusters_dissolved = stats.clusters_dissolved,
            evictions = stats.evictions,
            "stream flushed"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core(window: u64, slide: u64, k: u32) -> DetectorCore {
        let config = DetectorConfig::new(window, slide, 1.0, k).unwrap();
        DetectorCore::new(config).unwrap()
    }

    #[test]
    fn test_validate_batch_rejects_before_mutation() {
        let mut core = core(10, 5, 2);
        let err = core
            .validate_batch(&[vec![0.0, 1.0], vec![0.0]])
            .unwrap_err();
        assert!(matches!(
            err,
            OutlierError::DimensionMismatch {
                expected: 2,
                found: 1,
                position: 1
            }
        ));
        assert_eq!(core.dimensions(), None);

        let err = core
            .validate_batch(&[vec![0.0, 1.0], vec![f64::NAN, 1.0]])
            .unwrap_err();
        assert!(matches!(
            err,
            OutlierError::InvalidCoordinate {
                position: 1,
                dimension: 0,
                ..
            }
        ));

        core.validate_batch(&[vec![0.0, 1.0]]).unwrap();
        assert_eq!(core.dimensions(), Some(2));
        assert!(core.validate_batch(&[vec![1.0]]).is_err());
        assert!(core.validate_batch(&[]).is_ok());
    }

    #[test]
    fn test_add_neighbor_splits_by_slide() {
        let mut core = core(10, 5, 2);
        for _ in 0..7 {
            core.window.push(vec![0.0]);
        }
        core.classify(6);
        assert_eq!(core.window.get(6).unwrap().classification(), Classification::Outlier);

        core.add_neighbor(6, 2, true);
        core.add_neighbor(6, 7, true);
        let element = core.window.get(6).unwrap();
        assert_eq!(element.count_after(), 1);
        assert_eq!(element.preceding(), &[2]);
        assert_eq!(element.classification(), Classification::InlierPending);
        // unsafe inlier: re-check when element 2 leaves a window of 10
        assert_eq!(core.events.times_for(6), vec![12]);
    }

    #[test]
    fn test_add_neighbor_ignores_expired_candidates() {
        let mut core = core(4, 2, 1);
        for _ in 0..4 {
            core.window.push(vec![0.0]);
        }
        core.window.slide();
        core.window.push(vec![0.0]);
        core.add_neighbor(5, 1, true);
        assert_eq!(core.window.get(5).unwrap().neighbor_count(3), 0);
    }

    #[test]
    fn test_drain_events_demotes_and_reschedules() {
        let mut core = core(4, 2, 2);
        for _ in 0..4 {
            core.window.push(vec![0.0]);
        }
        // element 4 has neighbors 1 and 3 (slide 1 and slide 2)
        core.add_neighbor(4, 1, false);
        core.add_neighbor(4, 3, false);
        core.add_neighbor(4, 2, false);
        core.classify(4);
        assert_eq!(core.events.times_for(4), vec![5]);

        // slide: [3, 6], elements 1 and 2 expire; 4 keeps only neighbor 3
        let expired = core.window.slide();
        core.retire_all(&expired);
        assert_eq!(core.drain_events(), 1);
        let element = core.window.get(4).unwrap();
        assert_eq!(element.classification(), Classification::Outlier);
        assert!(element.preceding().is_empty());
    }

    #[test]
    fn test_stats_include_live_elements() {
        let mut core = core(4, 2, 1);
        let id = core.window.push(vec![0.0]);
        core.classify(id);
        let stats = core.stats();
        assert_eq!(stats.only_outlier, 1);
        assert_eq!(stats.classified(), 1);
    }
}
