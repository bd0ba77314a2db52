//! Property-based tests for the detectors and indices.
//!
//! ## Properties
//!
//! - Micro-clusters: every member lies within `R/2` of its center (hence any two
//!   members lie within `R`), every cluster holds more than `k` elements, and
//!   member placement agrees with the cluster index.
//! - Exactness: on grid data (duplicates and distance ties everywhere) the exact
//!   detector reports the same pure outliers as a brute-force recount.
//! - Determinism: two runs over the same stream and seed are indistinguishable.
//! - M-tree: range queries agree with a linear scan, before and after removals.
//! - Validation: a rejected batch leaves the detector untouched.
//!
//! Streams are generated from a seed with the fixtures in `common`, so shrinking
//! works on parameters rather than on raw vectors.

mod common;

use std::collections::BTreeSet;

use common::fixtures::{grid_stream, mixed_stream, StreamSpec};
use common::{config, oracle, run_to_end};
use proptest::prelude::*;
use term_outlier::index::{euclidean_distance, MTree};
use term_outlier::prelude::*;

/// Window parameters with `1 <= slide <= window`.
fn window_params() -> impl Strategy<Value = (u64, u64)> {
    (4u64..40).prop_flat_map(|window| (Just(window), 1..=window))
}

fn check_clusters(detector: &MicroClusterEngine, radius: f64, k: u32) -> std::result::Result<(), TestCaseError> {
    for cluster in detector.clusters() {
        prop_assert!(cluster.members.len() > k as usize, "cluster {} too small", cluster.id);
        prop_assert!(cluster.members.contains(&cluster.center));
        for &member in &cluster.members {
            let element = detector.element(member).expect("cluster member is live");
            prop_assert!(euclidean_distance(element.coords(), &cluster.center_coords) <= radius / 2.0);
            prop_assert_eq!(element.placement(), Placement::Clustered(cluster.id));
            prop_assert_eq!(element.classification(), Classification::InlierClustered);
        }
        for &a in &cluster.members {
            for &b in &cluster.members {
                let (pa, pb) = (detector.element(a).unwrap(), detector.element(b).unwrap());
                prop_assert!(euclidean_distance(pa.coords(), pb.coords()) <= radius);
            }
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Cluster invariants hold after every batch, including across expiry.
    #[test]
    fn test_cluster_invariants_hold_after_every_batch(
        seed in any::<u64>(),
        (window, slide) in window_params(),
        k in 1u32..5,
        theta in 1.0f64..2.0,
    ) {
        let points = grid_stream(seed, 120, 2, 6, 0.5);
        let mut detector = MicroClusterEngine::exact(config(window, slide, 1.0, k).with_theta(theta)).unwrap();
        for chunk in points.chunks(slide as usize) {
            detector.process_batch(chunk).unwrap();
            check_clusters(&detector, 1.0, k)?;
        }
    }

    /// The memory bound does not weaken cluster invariants.
    #[test]
    fn test_bounded_cluster_invariants(
        seed in any::<u64>(),
        (window, slide) in window_params(),
        k in 1u32..4,
        pd_limit in 1usize..12,
    ) {
        let points = grid_stream(seed, 120, 2, 6, 0.5);
        let bound = MemoryBoundConfig::new(pd_limit, 0.0).with_seed(seed);
        let mut detector = MicroClusterEngine::memory_bounded(config(window, slide, 1.0, k), bound).unwrap();
        for chunk in points.chunks(slide as usize) {
            detector.process_batch(chunk).unwrap();
            check_clusters(&detector, 1.0, k)?;
        }
    }

    /// Exact detection equals the brute-force recount.
    #[test]
    fn test_exact_detection_matches_recount(
        seed in any::<u64>(),
        (window, slide) in window_params(),
        k in 1u32..6,
        dimensions in 1usize..4,
        batch in 1usize..20,
    ) {
        let points = grid_stream(seed, 100, dimensions, 5, 0.5);
        let mut detector = MicroClusterEngine::exact(config(window, slide, 1.0, k)).unwrap();
        let found = run_to_end(&mut detector, &points, batch);
        prop_assert_eq!(found, oracle::pure_outliers(&points, window, slide, 1.0, k));
    }

    /// Two runs with the same seed agree on everything observable.
    #[test]
    fn test_seeded_runs_are_deterministic(
        stream_seed in any::<u64>(),
        bound_seed in any::<u64>(),
        pd_limit in 1usize..20,
        approx_factor in 0.0f64..0.5,
    ) {
        let spec = StreamSpec { len: 150, ..Default::default() };
        let points = mixed_stream(stream_seed, &spec);
        let run = || {
            let bound = MemoryBoundConfig::new(pd_limit, approx_factor).with_seed(bound_seed);
            let mut detector = MicroClusterEngine::memory_bounded(config(40, 10, 1.0, 3), bound).unwrap();
            let outliers = run_to_end(&mut detector, &points, 10);
            (outliers, detector.stats(), detector.clusters().len())
        };
        prop_assert_eq!(run(), run());
    }

    /// Range queries over the M-tree agree with a linear scan.
    #[test]
    fn test_mtree_range_matches_linear_scan(
        points in prop::collection::vec(prop::collection::vec(-10.0f64..10.0, 3), 0..150),
        query in prop::collection::vec(-10.0f64..10.0, 3),
        radius in 0.0f64..8.0,
        removals in prop::collection::vec(any::<prop::sample::Index>(), 0..40),
    ) {
        let mut tree = MTree::new();
        for (i, point) in points.iter().enumerate() {
            tree.insert(i as u64, point.clone());
        }
        let mut live: BTreeSet<u64> = (0..points.len() as u64).collect();

        let scan = |live: &BTreeSet<u64>| -> BTreeSet<u64> {
            live.iter()
                .copied()
                .filter(|&i| euclidean_distance(&points[i as usize], &query) <= radius)
                .collect()
        };
        let found: BTreeSet<u64> = tree.range_query(&query, radius).into_iter().map(|(k, _)| k).collect();
        prop_assert_eq!(found, scan(&live));

        if !points.is_empty() {
            for index in removals {
                let i = index.index(points.len()) as u64;
                let removed = tree.remove(&i, &points[i as usize]);
                prop_assert_eq!(removed, live.remove(&i));
            }
        }
        prop_assert_eq!(tree.len(), live.len());
        let found: BTreeSet<u64> = tree.range_query(&query, radius).into_iter().map(|(k, _)| k).collect();
        prop_assert_eq!(found, scan(&live));
    }

    /// A batch with a bad vector anywhere in it is rejected as a whole.
    #[test]
    fn test_rejected_batch_leaves_detector_unchanged(
        seed in any::<u64>(),
        prefix in 0usize..60,
        bad_position in 0usize..10,
        use_nan in any::<bool>(),
    ) {
        let points = mixed_stream(seed, &StreamSpec { len: prefix + 10, ..Default::default() });
        let mut detector = MicroClusterEngine::exact(config(20, 5, 1.0, 3)).unwrap();
        detector.process_batch(&points[..prefix]).unwrap();

        let before_stats = detector.stats();
        let before_bounds = detector.window_bounds();
        let before_live: Vec<_> = detector.elements().map(|e| (e.id(), e.classification())).collect();

        let mut batch = points[prefix..].to_vec();
        if use_nan {
            batch[bad_position][0] = f64::NAN;
        } else {
            batch[bad_position].push(0.0);
        }
        let err = detector.process_batch(&batch).unwrap_err();
        prop_assert!(err.is_input_fault());

        prop_assert_eq!(detector.stats(), before_stats);
        prop_assert_eq!(detector.window_bounds(), before_bounds);
        let after_live: Vec<_> = detector.elements().map(|e| (e.id(), e.classification())).collect();
        prop_assert_eq!(after_live, before_live);
    }
}
