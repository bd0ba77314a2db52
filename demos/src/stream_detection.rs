//! Streaming detection over a CSV file.
//!
//! This example shows how to:
//! - Write a synthetic stream of 2-d points to a CSV file
//! - Feed it through the exact micro-cluster detector in slide-sized batches
//! - Print the report in human-readable and JSON form
//! - Export the pure outlier ids, one per line
//!
//! Run with:
//! ```bash
//! cargo run --example stream_detection
//! ```
//!
//! Set `RUST_LOG=term_outlier=debug` to see slides and cluster events.

use std::fs::File;
use std::io::Write;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use term_outlier::logging::setup::{init_logging, LoggingConfig};
use term_outlier::prelude::*;

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    init_logging(LoggingConfig::default())?;

    // Two dense groups that drift halfway through, plus sparse noise
    let temp_dir = tempfile::tempdir()?;
    let data_path = temp_dir.path().join("sensor_readings.csv");
    let mut file = File::create(&data_path)?;
    writeln!(file, "x,y,label")?;

    let mut rng = StdRng::seed_from_u64(2024);
    let jitter = Normal::new(0.0, 0.3)?;
    for i in 0..2_000 {
        let (center, label) = match (i < 1_000, rng.random::<f64>()) {
            (_, p) if p < 0.03 => ((rng.random_range(-20.0..20.0), rng.random_range(-20.0..20.0)), "noise"),
            (true, p) if p < 0.5 => ((0.0, 0.0), "a"),
            (true, _) => ((6.0, 6.0), "b"),
            (false, p) if p < 0.5 => ((-6.0, 3.0), "a"),
            (false, _) => ((3.0, -6.0), "b"),
        };
        let x = center.0 + jitter.sample(&mut rng);
        let y = center.1 + jitter.sample(&mut rng);
        writeln!(file, "{x},{y},{label}")?;
    }
    drop(file);

    let config = DetectorConfig::builder()
        .window_size(500)
        .slide_size(100)
        .radius(0.6)
        .k(10)
        .build()?;
    let mut detector = MicroClusterEngine::exact(config)?;

    let options = CsvOptions {
        has_header: true,
        contains_class: true,
        ..Default::default()
    };
    let mut source = CsvSource::with_options(&data_path, options)?;

    println!("Running streaming detection over {}...\n", data_path.display());
    let report = StreamRunner::new().run(&mut detector, &mut source)?;

    let human = HumanFormatter::with_config(FormatterConfig::detailed().with_max_outliers(20));
    println!("{}", human.format(&report)?);

    println!("Micro-clusters alive at the end: {}", detector.cluster_count());
    println!("\nJSON summary:");
    let json = JsonFormatter::with_config(FormatterConfig::minimal()).with_pretty(true);
    println!("{}", json.format(&report)?);

    let ids_path = temp_dir.path().join("outliers.txt");
    report.write_outlier_ids(File::create(&ids_path)?)?;
    println!("\nWrote {} outlier ids to {}", report.pure_outliers.len(), ids_path.display());

    Ok(())
}
