//! Report formatting for detection results.
//!
//! This module provides formatters that turn a [`DetectionReport`] into JSON
//! for programmatic consumption or into a human-readable summary for consoles
//! and logs.
//!
//! # Examples
//!
//! ```rust
//! use std::collections::BTreeSet;
//! use term_outlier::formatters::{HumanFormatter, ReportFormatter};
//! use term_outlier::report::{DetectionReport, DetectionStats};
//!
//! let report = DetectionReport::new("exact", BTreeSet::from([4, 9]), DetectionStats::default());
//! let output = HumanFormatter::new().format(&report).unwrap();
//! assert!(output.contains("Pure outliers: 2"));
//! ```

use serde_json::json;

use crate::error::Result;
use crate::report::DetectionReport;

/// Configuration options for formatting detection reports.
#[derive(Debug, Clone)]
pub struct FormatterConfig {
    /// Include the summary counters
    pub include_stats: bool,
    /// Include the outlier ids themselves
    pub include_outliers: bool,
    /// Include run timing when present
    pub include_timing: bool,
    /// Maximum number of outlier ids to display (-1 for all)
    pub max_outliers: i32,
    /// Whether to use colorized output (for human formatter)
    pub use_colors: bool,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            include_stats: true,
            include_outliers: true,
            include_timing: true,
            max_outliers: 100,
            use_colors: true,
        }
    }
}

impl FormatterConfig {
    /// Creates a minimal configuration showing only the summary line.
    pub fn minimal() -> Self {
        Self {
            include_stats: false,
            include_outliers: false,
            include_timing: false,
            max_outliers: 0,
            use_colors: false,
        }
    }

    /// Creates a detailed configuration showing everything.
    pub fn detailed() -> Self {
        Self {
            include_stats: true,
            include_outliers: true,
            include_timing: true,
            max_outliers: -1,
            use_colors: true,
        }
    }

    /// Creates a configuration suitable for CI/CD environments.
    pub fn ci() -> Self {
        Self {
            include_stats: true,
            include_outliers: true,
            include_timing: false,
            max_outliers: 50,
            use_colors: false,
        }
    }

    pub fn with_stats(mut self, include: bool) -> Self {
        self.include_stats = include;
        self
    }

    pub fn with_outliers(mut self, include: bool) -> Self {
        self.include_outliers = include;
        self
    }

    /// Sets the maximum number of outlier ids to display.
    pub fn with_max_outliers(mut self, max: i32) -> Self {
        self.max_outliers = max;
        self
    }

    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }

    fn outlier_limit(&self, available: usize) -> usize {
        if self.max_outliers < 0 {
            available
        } else {
            available.min(self.max_outliers as usize)
        }
    }
}

/// Trait for formatting detection reports into different output formats.
pub trait ReportFormatter {
    /// Formats a report with the formatter's own configuration.
    fn format(&self, report: &DetectionReport) -> Result<String>;

    /// Formats a report with a custom configuration.
    fn format_with_config(&self, report: &DetectionReport, _config: &FormatterConfig) -> Result<String> {
        self.format(report)
    }
}

/// Formats reports as structured JSON.
#[derive(Debug, Clone)]
pub struct JsonFormatter {
    config: FormatterConfig,
    pretty: bool,
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self {
            config: FormatterConfig::default(),
            pretty: true,
        }
    }

    pub fn with_config(config: FormatterConfig) -> Self {
        Self { config, pretty: true }
    }

    /// Sets whether to use pretty-printed JSON.
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportFormatter for JsonFormatter {
    fn format(&self, report: &DetectionReport) -> Result<String> {
        self.format_with_config(report, &self.config)
    }

    fn format_with_config(&self, report: &DetectionReport, config: &FormatterConfig) -> Result<String> {
        let mut value = json!({
            "engine": report.engine,
            "pure_outlier_count": report.pure_outliers.len(),
        });
        if config.include_outliers {
            let limit = config.outlier_limit(report.pure_outliers.len());
            let ids: Vec<_> = report.pure_outliers.iter().take(limit).collect();
            value["pure_outliers"] = json!(ids);
            value["truncated"] = json!(limit < report.pure_outliers.len());
        }
        if config.include_stats {
            value["stats"] = serde_json::to_value(report.stats)?;
        }
        if config.include_timing {
            if let Some(timing) = report.timing {
                value["timing"] = serde_json::to_value(timing)?;
            }
        }
        let output = if self.pretty {
            serde_json::to_string_pretty(&value)?
        } else {
            serde_json::to_string(&value)?
        };
        Ok(output)
    }
}

/// Formats reports as a console summary.
#[derive(Debug, Clone)]
pub struct HumanFormatter {
    config: FormatterConfig,
}

impl HumanFormatter {
    pub fn new() -> Self {
        Self {
            config: FormatterConfig::default(),
        }
    }

    pub fn with_config(config: FormatterConfig) -> Self {
        Self { config }
    }
}

impl Default for HumanFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportFormatter for HumanFormatter {
    fn format(&self, report: &DetectionReport) -> Result<String> {
        self.format_with_config(report, &self.config)
    }

    fn format_with_config(&self, report: &DetectionReport, config: &FormatterConfig) -> Result<String> {
        let mut output = String::new();
        let count = report.pure_outliers.len();

        output.push('\n');
        if config.use_colors {
            output.push_str(&format!("\x1b[1mOutlier detection ({})\x1b[0m\n", report.engine));
        } else {
            output.push_str(&format!("Outlier detection ({})\n", report.engine));
        }
        if config.use_colors && count > 0 {
            output.push_str(&format!("Pure outliers: \x1b[31m{count}\x1b[0m\n"));
        } else {
            output.push_str(&format!("Pure outliers: {count}\n"));
        }

        if config.include_stats {
            let stats = &report.stats;
            let (both, inlier, outlier) = stats.history_percentages();
            output.push_str("\nSummary Statistics:\n");
            output.push_str(&format!("   Processed: {}\n", stats.processed));
            output.push_str(&format!(
                "   Inlier and outlier: {} ({both:.2}%)\n",
                stats.both_inlier_outlier
            ));
            output.push_str(&format!("   Only inlier: {} ({inlier:.2}%)\n", stats.only_inlier));
            output.push_str(&format!("   Only outlier: {} ({outlier:.2}%)\n", stats.only_outlier));
            output.push_str(&format!("   Range queries: {}\n", stats.range_queries_executed));
            if stats.clusters_formed > 0 {
                output.push_str(&format!(
                    "   Micro-clusters: {} formed, {} dissolved\n",
                    stats.clusters_formed, stats.clusters_dissolved
                ));
            }
            if stats.evictions > 0 {
                output.push_str(&format!("   Evictions: {}\n", stats.evictions));
            }
        }

        if config.include_timing {
            if let Some(timing) = report.timing {
                output.push_str(&format!(
                    "\nExecution Time: {}ms over {} batches ({:.3}ms per batch)\n",
                    timing.total.as_millis(),
                    timing.batches,
                    timing.mean_per_batch.as_secs_f64() * 1000.0
                ));
            }
        }

        if config.include_outliers && count > 0 {
            let limit = config.outlier_limit(count);
            let shown: Vec<String> = report
                .pure_outliers
                .iter()
                .take(limit)
                .map(ToString::to_string)
                .collect();
            output.push_str("\nOutlier ids: ");
            output.push_str(&shown.join(", "));
            if limit < count {
                output.push_str(&format!(" ... and {} more", count - limit));
            }
            output.push('\n');
        }
        Ok(output)
    }
}
