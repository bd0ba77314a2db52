//! # Term Outlier - Continuous Outlier Detection for Rust
//!
//! Term Outlier finds distance-based outliers in an unbounded stream of numeric
//! vectors. Each vector is judged against a count-based sliding window: it is an
//! outlier while fewer than `k` other vectors in the window lie within distance
//! `R` of it. Because the window moves, an element can change classification
//! several times during its life; the detectors report the *pure outliers*,
//! elements that were outliers every time they were classified.
//!
//! ## Quick Start
//!
//! ```rust
//! use term_outlier::prelude::*;
//!
//! # fn main() -> term_outlier::error::Result<()> {
//! let config = DetectorConfig::builder()
//!     .window_size(100)
//!     .slide_size(10)
//!     .radius(1.0)
//!     .k(3)
//!     .build()?;
//! let mut detector = MicroClusterEngine::exact(config)?;
//!
//! // a tight group plus one far point
//! let mut points: Vec<Vec<f64>> = (0..8).map(|i| vec![0.1 * i as f64, 0.0]).collect();
//! points.push(vec![50.0, 50.0]);
//!
//! let report = StreamRunner::new().run(&mut detector, &mut MemorySource::new(points))?;
//! assert_eq!(report.pure_outliers.iter().copied().collect::<Vec<_>>(), vec![9]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Detectors
//!
//! - **Exact** ([`engine::MicroClusterEngine::exact`]): elements lying within
//!   `R/2` of one another are grouped into micro-clusters whose members are
//!   inliers by construction. The remaining elements keep explicit neighbor
//!   counts in an M-tree backed index. Results match a brute-force recount.
//! - **Memory bounded** ([`engine::MicroClusterEngine::memory_bounded`]): the
//!   same algorithm with a cap on the number of individually indexed elements.
//!   Elements that can never become outliers again are evicted at random when
//!   the cap is exceeded.
//! - **Hash based** ([`engine::HashedEngine`]): neighbor search through
//!   random-projection hash tables, without micro-clusters. Counts can be
//!   underestimated, so with distance verification (the default) the reported
//!   outliers are a superset of the exact ones.
//!
//! All three implement [`engine::OutlierDetector`] and can be built from a
//! serializable [`config::EngineConfig`] with [`engine::build_detector`].
//!
//! ## Re-evaluation
//!
//! Neighbors from the element's own or a later slide never expire before the
//! element does. Once those alone reach `k`, the element is a *safe inlier* and
//! is never checked again. Other inliers are scheduled in an event queue for
//! the moment their oldest neighbor leaves the window, so each slide only
//! revisits the elements that can actually change.
//!
//! ## Observability
//!
//! Detectors log through `tracing`. Per-element decisions are emitted at debug
//! level and gated by [`logging::LogConfig`]; call
//! [`logging::setup::init_logging`] to install a subscriber.
//!
//! ## Architecture
//!
//! - [`window`] and [`element`]: the window arena and per-element bookkeeping
//! - [`events`]: re-evaluation schedule
//! - [`index`]: M-tree, exact and LSH neighbor indices, micro-cluster index
//! - [`engine`]: the detectors
//! - [`sources`], [`runner`], [`report`], [`formatters`]: input and output

pub mod config;
pub mod element;
pub mod engine;
pub mod error;
pub mod events;
pub mod formatters;
pub mod index;
pub mod logging;
pub mod prelude;
pub mod report;
pub mod runner;
pub mod sources;
pub mod window;
