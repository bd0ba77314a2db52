//! Describing a detector in JSON.
//!
//! Run with:
//! ```bash
//! cargo run --example json_config
//! ```

use term_outlier::prelude::*;

const CONFIG: &str = r#"{
  "detector": {
    "window_size": 200,
    "slide_size": 50,
    "radius": 0.5,
    "k": 4
  },
  "kind": {
    "kind": "approx_memory_bounded",
    "pd_limit": 40,
    "approx_factor": 0.1,
    "seed": 7
  }
}"#;

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::from_json_str(CONFIG)?;
    println!("Loaded configuration:\n{}\n", config.to_json_string()?);

    let mut detector = build_detector(&config)?;
    let points: Vec<Vec<f64>> = (0..600)
        .map(|i| {
            let t = f64::from(i);
            if i % 97 == 0 {
                vec![100.0 + t, -100.0]
            } else {
                vec![(t * 0.01).sin(), (t * 0.01).cos()]
            }
        })
        .collect();

    let report = StreamRunner::new().run(detector.as_mut(), &mut MemorySource::new(points))?;
    let formatter = HumanFormatter::with_config(FormatterConfig::ci());
    println!("{}", formatter.format(&report)?);

    // an invalid description is rejected before any detector is built
    let broken = CONFIG.replace("\"slide_size\": 50", "\"slide_size\": 500");
    match EngineConfig::from_json_str(&broken) {
        Ok(_) => println!("unexpectedly accepted slide_size > window_size"),
        Err(e) => println!("rejected: {e}"),
    }

    Ok(())
}
