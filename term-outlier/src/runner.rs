//! Drives a detector from a stream source.
//!
//! [`StreamRunner`] pulls batches of `slide_size` vectors from a
//! [`StreamSource`], feeds them to an [`OutlierDetector`], flushes at the end
//! and returns a [`DetectionReport`] with timing attached.

use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use crate::engine::OutlierDetector;
use crate::error::{ErrorContext, Result};
use crate::report::{DetectionReport, RunTiming};
use crate::sources::StreamSource;

/// Feeds a source to a detector until the source is exhausted.
#[derive(Debug, Clone, Default)]
pub struct StreamRunner {
    batch_size: Option<usize>,
    max_batches: Option<u64>,
}

impl StreamRunner {
    /// Runner reading one slide per batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the batch size, which defaults to the detector's slide size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size.max(1));
        self
    }

    /// Stops after `max` batches even if the source has more.
    pub fn with_max_batches(mut self, max: u64) -> Self {
        self.max_batches = Some(max);
        self
    }

    /// Runs the detector over the whole source and flushes it.
    ///
    /// Only time spent inside the detector is measured; reading the source is
    /// excluded.
    #[instrument(skip_all, fields(engine = detector.name(), source = %source.description()))]
    pub fn run(
        &self,
        detector: &mut dyn OutlierDetector,
        source: &mut dyn StreamSource,
    ) -> Result<DetectionReport> {
        let batch_size = self
            .batch_size
            .unwrap_or(detector.config().slide_size as usize);
        let mut busy = Duration::ZERO;
        let mut batches = 0u64;

        while self.max_batches.map_or(true, |max| batches < max) {
            let Some(batch) = source.next_batch(batch_size)? else {
                break;
            };
            let started = Instant::now();
            detector
                .process_batch(&batch)
                .with_context(|| format!("processing batch {}", batches + 1))?;
            busy += started.elapsed();
            batches += 1;
        }
        if self.cut_short(batches, source) {
            warn!(batches, "batch limit reached before the source was exhausted");
        }

        let started = Instant::now();
        detector.flush()?;
        busy += started.elapsed();

        let timing = RunTiming::new(busy, batches);
        let report = detector.report().with_timing(timing);
        info!(
            batches,
            processed = report.stats.processed,
            pure_outliers = report.pure_outliers.len(),
            total_ms = timing.total.as_millis() as u64,
            "stream run complete"
        );
        Ok(report)
    }

    /// Whether the batch limit stopped the run while the source still had data.
    ///
    /// Reads one more vector from the source to find out. A record that fails
    /// to parse still counts as more data.
    fn cut_short(&self, batches: u64, source: &mut dyn StreamSource) -> bool {
        self.max_batches.is_some_and(|max| batches >= max)
            && !matches!(source.next_batch(1), Ok(None))
    }
}
