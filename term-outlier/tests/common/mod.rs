//! Shared infrastructure for the integration tests.
//!
//! - `fixtures`: seeded stream generators
//! - `oracle`: brute-force recount of every window state

#![allow(dead_code)]

pub mod fixtures;
pub mod oracle;

use std::collections::BTreeSet;

use term_outlier::prelude::*;

/// Feeds `points` in batches of `batch` and flushes.
pub fn run_to_end(detector: &mut dyn OutlierDetector, points: &[Vec<f64>], batch: usize) -> BTreeSet<ElementId> {
    for chunk in points.chunks(batch.max(1)) {
        detector.process_batch(chunk).unwrap();
    }
    detector.flush().unwrap();
    detector.pure_outliers().clone()
}

pub fn config(window: u64, slide: u64, radius: f64, k: u32) -> DetectorConfig {
    DetectorConfig::new(window, slide, radius, k).unwrap()
}
