//! Deterministic stream generators.
//!
//! Same seed, same stream. Streams mix dense Gaussian groups with uniformly
//! scattered noise so that every detector path (cluster formation, pending
//! inliers, outliers, dissolution on expiry) gets exercised.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

/// Parameters of a mixed stream.
#[derive(Debug, Clone)]
pub struct StreamSpec {
    pub len: usize,
    pub dimensions: usize,
    pub groups: usize,
    pub spread: f64,
    /// Probability that a point is uniform noise
    pub noise: f64,
    /// Side of the hypercube holding group centers and noise
    pub extent: f64,
    /// Points drift to a new set of group centers every `drift_every` arrivals
    pub drift_every: Option<usize>,
}

impl Default for StreamSpec {
    fn default() -> Self {
        Self {
            len: 200,
            dimensions: 2,
            groups: 3,
            spread: 0.4,
            noise: 0.15,
            extent: 20.0,
            drift_every: None,
        }
    }
}

fn centers(rng: &mut StdRng, spec: &StreamSpec) -> Vec<Vec<f64>> {
    (0..spec.groups)
        .map(|_| {
            (0..spec.dimensions)
                .map(|_| rng.random_range(0.0..spec.extent))
                .collect()
        })
        .collect()
}

/// Generates a stream from `spec`.
pub fn mixed_stream(seed: u64, spec: &StreamSpec) -> Vec<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let offset = Normal::new(0.0, spec.spread).unwrap();
    let mut group_centers = centers(&mut rng, spec);

    (0..spec.len)
        .map(|i| {
            if let Some(every) = spec.drift_every {
                if i > 0 && i % every == 0 {
                    group_centers = centers(&mut rng, spec);
                }
            }
            if rng.random::<f64>() < spec.noise {
                (0..spec.dimensions)
                    .map(|_| rng.random_range(-spec.extent..2.0 * spec.extent))
                    .collect()
            } else {
                let center = &group_centers[rng.random_range(0..group_centers.len())];
                center.iter().map(|c| c + offset.sample(&mut rng)).collect()
            }
        })
        .collect()
}

/// Points on a coarse grid, so that many pairs sit at exactly the radius.
pub fn grid_stream(seed: u64, len: usize, dimensions: usize, steps: u32, step: f64) -> Vec<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len)
        .map(|_| {
            (0..dimensions)
                .map(|_| f64::from(rng.random_range(0..steps)) * step)
                .collect()
        })
        .collect()
}

/// A tight group of `len` points on a line, `gap` apart, starting at `origin`.
pub fn tight_line(origin: f64, gap: f64, len: usize) -> Vec<Vec<f64>> {
    (0..len).map(|i| vec![origin + gap * i as f64]).collect()
}
