//! Comparing the approximate detectors against the exact one.
//!
//! The same stream is fed to every detector variant. The exact run serves as
//! the baseline; each approximate run is scored by how many baseline outliers
//! it recovers and how many extra ones it reports.
//!
//! Run with:
//! ```bash
//! cargo run --example compare_outliers
//! ```

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use term_outlier::prelude::*;

const DIMENSIONS: usize = 3;

fn synthetic_stream(len: usize, seed: u64) -> std::result::Result<Vec<Vec<f64>>, Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let jitter = Normal::new(0.0, 0.4)?;
    let centers: Vec<Vec<f64>> = (0..4)
        .map(|_| (0..DIMENSIONS).map(|_| rng.random_range(0.0..25.0)).collect())
        .collect();
    Ok((0..len)
        .map(|_| {
            if rng.random::<f64>() < 0.05 {
                (0..DIMENSIONS).map(|_| rng.random_range(-5.0..30.0)).collect()
            } else {
                let center = &centers[rng.random_range(0..centers.len())];
                center.iter().map(|c| c + jitter.sample(&mut rng)).collect()
            }
        })
        .collect())
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let points = synthetic_stream(5_000, 11)?;
    let detector_config = DetectorConfig::new(1_000, 250, 1.0, 6)?;

    let baseline = {
        let mut exact = MicroClusterEngine::exact(detector_config.clone())?;
        StreamRunner::new().run(&mut exact, &mut MemorySource::new(points.clone()))?
    };
    println!(
        "exact: {} pure outliers, {} range queries",
        baseline.pure_outliers.len(),
        baseline.stats.range_queries_executed
    );

    let variants = vec![
        ("pd_limit=50, f=0.0", EngineKind::ApproxMemoryBounded(MemoryBoundConfig::new(50, 0.0))),
        ("pd_limit=50, f=0.2", EngineKind::ApproxMemoryBounded(MemoryBoundConfig::new(50, 0.2))),
        ("pd_limit=500, f=0.0", EngineKind::ApproxMemoryBounded(MemoryBoundConfig::new(500, 0.0))),
        ("lsh 4x2", EngineKind::HashBased(HashConfig::new(4, 2, 2.0, DIMENSIONS))),
        ("lsh 4x8", EngineKind::HashBased(HashConfig::new(4, 8, 2.0, DIMENSIONS))),
        ("lsh 2x8", EngineKind::HashBased(HashConfig::new(2, 8, 2.0, DIMENSIONS))),
    ];

    for (label, kind) in variants {
        let config = EngineConfig::new(detector_config.clone(), kind);
        let mut detector = build_detector(&config)?;
        let report = StreamRunner::new().run(detector.as_mut(), &mut MemorySource::new(points.clone()))?;
        let comparison = OutlierComparison::compare(&baseline.pure_outliers, &report.pure_outliers);

        let mean = report.timing.map(|t| t.mean_per_batch).unwrap_or_default();
        println!("\n{} [{}]", config.kind.name(), label);
        println!("  {}", comparison.summary());
        println!(
            "  symmetric difference: {}, evictions: {}, mean batch time: {:?}",
            comparison.symmetric_difference, report.stats.evictions, mean
        );
    }

    Ok(())
}
