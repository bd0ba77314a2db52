//! Detector configuration.
//!
//! [`DetectorConfig`] holds the parameters shared by every detector variant:
//! window geometry, neighborhood radius and neighbor threshold. Variant-specific
//! knobs live in [`MemoryBoundConfig`] and [`HashConfig`], selected through
//! [`EngineKind`]. Everything derives `serde` traits so that a full run can be
//! described as JSON.
//!
//! # Examples
//!
//! ```rust
//! use term_outlier::config::{DetectorConfig, EngineConfig, EngineKind, MemoryBoundConfig};
//!
//! # fn main() -> term_outlier::error::Result<()> {
//! let detector = DetectorConfig::builder()
//!     .window_size(1000)
//!     .slide_size(100)
//!     .radius(0.5)
//!     .k(10)
//!     .build()?;
//!
//! let config = EngineConfig::new(
//!     detector,
//!     EngineKind::ApproxMemoryBounded(MemoryBoundConfig::new(200, 0.1)),
//! );
//! config.validate()?;
//! let json = config.to_json_string()?;
//! assert_eq!(EngineConfig::from_json_str(&json)?, config);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{OutlierError, Result};

/// Default seed for the randomized variants.
pub const DEFAULT_SEED: u64 = 42;

/// Window geometry and neighborhood parameters shared by all detectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Number of elements held by a full window
    pub window_size: u64,
    /// Number of elements the window advances by on each slide
    pub slide_size: u64,
    /// Neighborhood radius `R`
    pub radius: f64,
    /// Minimum number of neighbors for an inlier
    pub k: u32,
    /// Promotion multiplier: a micro-cluster forms when `theta * k` close elements exist
    #[serde(default = "default_theta")]
    pub theta: f64,
    /// Fixed dimensionality; inferred from the first element when absent
    #[serde(default)]
    pub dimensions: Option<usize>,
}

fn default_theta() -> f64 {
    1.0
}

impl DetectorConfig {
    /// Creates a configuration with the default promotion multiplier.
    pub fn new(window_size: u64, slide_size: u64, radius: f64, k: u32) -> Result<Self> {
        let config = Self {
            window_size,
            slide_size,
            radius,
            k,
            theta: default_theta(),
            dimensions: None,
        };
        config.validate()?;
        Ok(config)
    }

    /// Returns a builder with no parameters set.
    pub fn builder() -> DetectorConfigBuilder {
        DetectorConfigBuilder::default()
    }

    /// Sets the promotion multiplier.
    pub fn with_theta(mut self, theta: f64) -> Self {
        self.theta = theta;
        self
    }

    /// Fixes the dimensionality up front.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    /// Checks parameter bounds.
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(OutlierError::configuration("window_size must be at least 1"));
        }
        if self.slide_size == 0 || self.slide_size > self.window_size {
            return Err(OutlierError::configuration(format!(
                "slide_size must be in 1..={}, got {}",
                self.window_size, self.slide_size
            )));
        }
        if !self.radius.is_finite() || self.radius <= 0.0 {
            return Err(OutlierError::configuration(format!(
                "radius must be a positive finite number, got {}",
                self.radius
            )));
        }
        if self.k == 0 {
            return Err(OutlierError::configuration("k must be at least 1"));
        }
        if !self.theta.is_finite() || self.theta < 1.0 {
            return Err(OutlierError::configuration(format!(
                "theta must be >= 1.0, got {}",
                self.theta
            )));
        }
        if self.dimensions == Some(0) {
            return Err(OutlierError::configuration("dimensions must be at least 1"));
        }
        Ok(())
    }

    /// Number of close elements required to promote a micro-cluster.
    pub fn promotion_threshold(&self) -> f64 {
        self.theta * f64::from(self.k)
    }
}

/// Builder for [`DetectorConfig`].
#[derive(Debug, Clone, Default)]
pub struct DetectorConfigBuilder {
    window_size: Option<u64>,
    slide_size: Option<u64>,
    radius: Option<f64>,
    k: Option<u32>,
    theta: Option<f64>,
    dimensions: Option<usize>,
}

impl DetectorConfigBuilder {
    /// Sets the window size.
    pub fn window_size(mut self, window_size: u64) -> Self {
        self.window_size = Some(window_size);
        self
    }

    /// Sets the slide size. Defaults to the window size (tumbling window).
    pub fn slide_size(mut self, slide_size: u64) -> Self {
        self.slide_size = Some(slide_size);
        self
    }

    /// Sets the neighborhood radius.
    pub fn radius(mut self, radius: f64) -> Self {
        self.radius = Some(radius);
        self
    }

    /// Sets the neighbor threshold.
    pub fn k(mut self, k: u32) -> Self {
        self.k = Some(k);
        self
    }

    /// Sets the promotion multiplier.
    pub fn theta(mut self, theta: f64) -> Self {
        self.theta = Some(theta);
        self
    }

    /// Fixes the dimensionality.
    pub fn dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> Result<DetectorConfig> {
        let window_size = self
            .window_size
            .ok_or_else(|| OutlierError::configuration("window_size is required"))?;
        let radius = self
            .radius
            .ok_or_else(|| OutlierError::configuration("radius is required"))?;
        let k = self
            .k
            .ok_or_else(|| OutlierError::configuration("k is required"))?;

        let config = DetectorConfig {
            window_size,
            slide_size: self.slide_size.unwrap_or(window_size),
            radius,
            k,
            theta: self.theta.unwrap_or_else(default_theta),
            dimensions: self.dimensions,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Parameters of the memory-bounded approximate variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryBoundConfig {
    /// Maximum number of pending elements kept in the neighbor index
    pub pd_limit: usize,
    /// Admission radius factor `f`; the admission radius is `R/2 + f*R`
    pub approx_factor: f64,
    /// Seed for random safe-inlier eviction
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

impl MemoryBoundConfig {
    /// Creates a memory bound with the default seed.
    pub fn new(pd_limit: usize, approx_factor: f64) -> Self {
        Self {
            pd_limit,
            approx_factor,
            seed: DEFAULT_SEED,
        }
    }

    /// Sets the eviction seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Checks parameter bounds.
    pub fn validate(&self) -> Result<()> {
        if !self.approx_factor.is_finite() || self.approx_factor < 0.0 {
            return Err(OutlierError::configuration(format!(
                "approx_factor must be a non-negative finite number, got {}",
                self.approx_factor
            )));
        }
        Ok(())
    }

    /// Admission radius for a neighborhood radius `radius`.
    pub fn admission_radius(&self, radius: f64) -> f64 {
        radius / 2.0 + self.approx_factor * radius
    }
}

/// Parameters of the hash-based approximate variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashConfig {
    /// Hash functions combined into one bucket key
    pub num_hashes: usize,
    /// Independent hash tables
    pub num_tables: usize,
    /// Bucket width `w` of each projection
    pub bucket_width: f64,
    /// Dimensionality of the projected vectors
    pub dimensions: usize,
    /// Whether candidates are re-filtered by exact distance `<= R`
    #[serde(default = "default_verify")]
    pub verify_distance: bool,
    /// Seed for the random projections
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_verify() -> bool {
    true
}

impl HashConfig {
    /// Creates a hash configuration with distance verification enabled.
    pub fn new(num_hashes: usize, num_tables: usize, bucket_width: f64, dimensions: usize) -> Self {
        Self {
            num_hashes,
            num_tables,
            bucket_width,
            dimensions,
            verify_distance: true,
            seed: DEFAULT_SEED,
        }
    }

    /// Sets the projection seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Enables or disables exact distance re-filtering.
    pub fn with_verify_distance(mut self, verify: bool) -> Self {
        self.verify_distance = verify;
        self
    }

    /// Checks parameter bounds.
    pub fn validate(&self) -> Result<()> {
        if self.num_hashes == 0 || self.num_tables == 0 {
            return Err(OutlierError::configuration(
                "num_hashes and num_tables must be at least 1",
            ));
        }
        if !self.bucket_width.is_finite() || self.bucket_width <= 0.0 {
            return Err(OutlierError::configuration(format!(
                "bucket_width must be a positive finite number, got {}",
                self.bucket_width
            )));
        }
        if self.dimensions == 0 {
            return Err(OutlierError::configuration("dimensions must be at least 1"));
        }
        Ok(())
    }
}

/// Detector variant selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineKind {
    /// Micro-clusters over an exact metric-tree index
    Exact,
    /// Micro-clusters with a bounded pending set
    ApproxMemoryBounded(MemoryBoundConfig),
    /// Random-projection hashing, no micro-clusters
    HashBased(HashConfig),
}

impl EngineKind {
    /// Short name used in logs and reports.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::ApproxMemoryBounded(_) => "approx_memory_bounded",
            Self::HashBased(_) => "hash_based",
        }
    }
}

/// Complete description of a detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Shared parameters
    pub detector: DetectorConfig,
    /// Variant and its parameters
    pub kind: EngineKind,
}

impl EngineConfig {
    /// Pairs shared parameters with a variant.
    pub fn new(detector: DetectorConfig, kind: EngineKind) -> Self {
        Self { detector, kind }
    }

    /// Validates the shared parameters and the variant parameters together.
    pub fn validate(&self) -> Result<()> {
        self.detector.validate()?;
        match &self.kind {
            EngineKind::Exact => Ok(()),
            EngineKind::ApproxMemoryBounded(bound) => bound.validate(),
            EngineKind::HashBased(hash) => {
                hash.validate()?;
                match self.detector.dimensions {
                    Some(d) if d != hash.dimensions => Err(OutlierError::configuration(format!(
                        "detector dimensions ({d}) differ from hash dimensions ({})",
                        hash.dimensions
                    ))),
                    _ => Ok(()),
                }
            }
        }
    }

    /// Parses and validates a JSON description.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes to pretty JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = DetectorConfig::builder()
            .window_size(10)
            .radius(1.0)
            .k(3)
            .build()
            .unwrap();
        assert_eq!(config.slide_size, 10);
        assert_eq!(config.theta, 1.0);
        assert_eq!(config.dimensions, None);
        assert_eq!(config.promotion_threshold(), 3.0);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(DetectorConfig::new(0, 1, 1.0, 1).is_err());
        assert!(DetectorConfig::new(10, 0, 1.0, 1).is_err());
        assert!(DetectorConfig::new(10, 11, 1.0, 1).is_err());
        assert!(DetectorConfig::new(10, 5, 0.0, 1).is_err());
        assert!(DetectorConfig::new(10, 5, f64::NAN, 1).is_err());
        assert!(DetectorConfig::new(10, 5, 1.0, 0).is_err());
        assert!(DetectorConfig::new(10, 5, 1.0, 3)
            .unwrap()
            .with_theta(0.5)
            .validate()
            .is_err());

        let err = DetectorConfig::builder().radius(1.0).k(1).build().unwrap_err();
        assert!(err.to_string().contains("window_size is required"));
    }

    #[test]
    fn test_variant_validation() {
        assert!(MemoryBoundConfig::new(0, 0.0).validate().is_ok());
        assert!(MemoryBoundConfig::new(10, -0.1).validate().is_err());
        assert!(HashConfig::new(0, 1, 1.0, 2).validate().is_err());
        assert!(HashConfig::new(1, 1, 0.0, 2).validate().is_err());
        assert!(HashConfig::new(2, 3, 4.0, 2).validate().is_ok());

        let detector = DetectorConfig::new(10, 5, 1.0, 3).unwrap().with_dimensions(3);
        let config = EngineConfig::new(detector, EngineKind::HashBased(HashConfig::new(2, 3, 4.0, 2)));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_admission_radius() {
        let bound = MemoryBoundConfig::new(100, 0.25);
        assert!((bound.admission_radius(2.0) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_json_round_trip_with_defaults() {
        let json = r#"{
            "detector": {"window_size": 100, "slide_size": 10, "radius": 0.5, "k": 4},
            "kind": {"kind": "hash_based", "num_hashes": 3, "num_tables": 5,
                     "bucket_width": 2.0, "dimensions": 2}
        }"#;
        let config = EngineConfig::from_json_str(json).unwrap();
        assert_eq!(config.detector.theta, 1.0);
        assert_eq!(config.kind.name(), "hash_based");
        match &config.kind {
            EngineKind::HashBased(hash) => {
                assert!(hash.verify_distance);
                assert_eq!(hash.seed, DEFAULT_SEED);
            }
            other => panic!("unexpected kind {other:?}"),
        }

        let again = EngineConfig::from_json_str(&config.to_json_string().unwrap()).unwrap();
        assert_eq!(again, config);
    }

    #[test]
    fn test_json_rejects_invalid_values() {
        let json = r#"{
            "detector": {"window_size": 10, "slide_size": 20, "radius": 0.5, "k": 4},
            "kind": {"kind": "exact"}
        }"#;
        assert!(matches!(
            EngineConfig::from_json_str(json),
            Err(OutlierError::Configuration(_))
        ));
    }
}
