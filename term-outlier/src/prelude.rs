//! Prelude for commonly used types and traits in term-outlier.

pub use crate::config::{DetectorConfig, EngineConfig, EngineKind, HashConfig, MemoryBoundConfig};
pub use crate::element::{Classification, ElementId, Placement, StreamElement};
pub use crate::engine::{build_detector, HashedEngine, MicroClusterEngine, OutlierDetector};
pub use crate::error::{ErrorContext, OutlierError, Result};
pub use crate::formatters::{FormatterConfig, HumanFormatter, JsonFormatter, ReportFormatter};
pub use crate::index::{ExactNeighborIndex, LshIndex, NeighborIndex};
pub use crate::logging::LogConfig;
pub use crate::report::{DetectionReport, DetectionStats, OutlierComparison};
pub use crate::runner::StreamRunner;
pub use crate::sources::{CsvOptions, CsvSource, MemorySource, StreamSource};
