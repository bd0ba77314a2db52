//! Detection results, summary counters and outlier-set comparison.
//!
//! A [`DetectionReport`] is what a run produces: the pure-outlier ids, the
//! lifetime counters and optional timing. Reports serialize to JSON, and the
//! outlier ids can be exported and re-read in the plain one-id-per-line format
//! used to compare runs with [`OutlierComparison`].

use std::collections::BTreeSet;
use std::io::{BufRead, Write};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::element::ElementId;
use crate::error::{OutlierError, Result};

/// Counters describing a detector's history.
///
/// The first three partition every element seen so far by lifetime
/// classification. Elements still in the window are included as of the moment
/// the counters are taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionStats {
    /// Elements classified both inlier and outlier at some point
    pub both_inlier_outlier: u64,
    /// Elements never classified outlier
    pub only_inlier: u64,
    /// Elements never classified inlier
    pub only_outlier: u64,
    /// Range queries issued against the neighbor index
    pub range_queries_executed: u64,
    /// Elements admitted to the window
    pub processed: u64,
    /// Micro-clusters created
    pub clusters_formed: u64,
    /// Micro-clusters dissolved after falling to `k` members or fewer
    pub clusters_dissolved: u64,
    /// Safe inliers evicted from the pending index to respect a memory bound
    pub evictions: u64,
}

impl DetectionStats {
    /// Number of elements covered by the history counters.
    pub fn classified(&self) -> u64 {
        self.both_inlier_outlier + self.only_inlier + self.only_outlier
    }

    /// Percentages of `(both, only_inlier, only_outlier)`.
    pub fn history_percentages(&self) -> (f64, f64, f64) {
        let total = self.classified();
        if total == 0 {
            return (0.0, 0.0, 0.0);
        }
        let pct = |n: u64| 100.0 * n as f64 / total as f64;
        (
            pct(self.both_inlier_outlier),
            pct(self.only_inlier),
            pct(self.only_outlier),
        )
    }
}

/// Wall-clock timing of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunTiming {
    /// Time spent inside the detector, including the final flush
    pub total: Duration,
    /// Batches fed to the detector
    pub batches: u64,
    /// Mean time per batch
    pub mean_per_batch: Duration,
}

impl RunTiming {
    pub fn new(total: Duration, batches: u64) -> Self {
        let mean_per_batch = if batches == 0 {
            Duration::ZERO
        } else {
            total / batches.min(u64::from(u32::MAX)) as u32
        };
        Self {
            total,
            batches,
            mean_per_batch,
        }
    }
}

/// Output of a detector run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    /// Detector variant that produced the report
    pub engine: String,
    /// Elements that were outliers for their whole lifetime
    pub pure_outliers: BTreeSet<ElementId>,
    /// Summary counters
    pub stats: DetectionStats,
    /// Timing, when the run was driven by a runner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<RunTiming>,
}

impl DetectionReport {
    pub fn new(engine: impl Into<String>, pure_outliers: BTreeSet<ElementId>, stats: DetectionStats) -> Self {
        Self {
            engine: engine.into(),
            pure_outliers,
            stats,
            timing: None,
        }
    }

    pub fn with_timing(mut self, timing: RunTiming) -> Self {
        self.timing = Some(timing);
        self
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Writes the outlier ids, one per line, ascending.
    pub fn write_outlier_ids<W: Write>(&self, writer: W) -> Result<()> {
        write_outlier_ids(&self.pure_outliers, writer)
    }
}

/// Writes ids one per line.
pub fn write_outlier_ids<'a, W: Write>(
    ids: impl IntoIterator<Item = &'a ElementId>,
    mut writer: W,
) -> Result<()> {
    for id in ids {
        writeln!(writer, "{id}")?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads ids written by [`write_outlier_ids`]. Blank lines are ignored.
pub fn read_outlier_ids<R: BufRead>(reader: R) -> Result<BTreeSet<ElementId>> {
    let mut ids = BTreeSet::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let id = trimmed.parse::<ElementId>().map_err(|e| {
            OutlierError::parse(index as u64 + 1, format!("invalid outlier id '{trimmed}': {e}"))
        })?;
        ids.insert(id);
    }
    Ok(ids)
}

/// Agreement between a baseline outlier set and a test outlier set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierComparison {
    pub baseline_count: usize,
    pub test_count: usize,
    /// Ids reported by both
    pub common_count: usize,
    /// Fraction of baseline outliers also in the test set (1.0 for an empty baseline)
    pub recall: f64,
    /// Fraction of test outliers also in the baseline (1.0 for an empty test set)
    pub precision: f64,
    /// Ids reported by exactly one of the two
    pub symmetric_difference: usize,
}

impl OutlierComparison {
    pub fn compare(baseline: &BTreeSet<ElementId>, test: &BTreeSet<ElementId>) -> Self {
        let common_count = baseline.intersection(test).count();
        let ratio = |part: usize, whole: usize| {
            if whole == 0 {
                1.0
            } else {
                part as f64 / whole as f64
            }
        };
        Self {
            baseline_count: baseline.len(),
            test_count: test.len(),
            common_count,
            recall: ratio(common_count, baseline.len()),
            precision: ratio(common_count, test.len()),
            symmetric_difference: baseline.len() + test.len() - 2 * common_count,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "baseline outliers: {}, test outliers: {}, common: {} ({:.2}% of baseline detected, precision {:.2}%)",
            self.baseline_count,
            self.test_count,
            self.common_count,
            100.0 * self.recall,
            100.0 * self.precision
        )
    }
}
