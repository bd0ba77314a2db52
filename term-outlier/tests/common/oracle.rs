//! Brute-force reference for pure outliers.
//!
//! Within one window position the neighbor count of every element only grows as
//! arrivals fill the window, so each element's largest count for that position
//! is reached just before the next slide (or at the end of the stream). An
//! element is a pure outlier exactly when that count stays below `k` for every
//! position it lives through.

use std::collections::BTreeSet;

use term_outlier::element::ElementId;
use term_outlier::index::euclidean_distance;

/// Neighbor counts of every element in the window `[start, end]` (1-based ids).
pub fn window_counts(points: &[Vec<f64>], start: u64, end: u64, radius: f64) -> Vec<(ElementId, usize)> {
    let first = (start - 1) as usize;
    let last = (end as usize).min(points.len());
    (first..last)
        .map(|i| {
            let count = (first..last)
                .filter(|&j| j != i && euclidean_distance(&points[i], &points[j]) <= radius)
                .count();
            (i as ElementId + 1, count)
        })
        .collect()
}

/// Pure outliers of a full run followed by a flush.
pub fn pure_outliers(points: &[Vec<f64>], window: u64, slide: u64, radius: f64, k: u32) -> BTreeSet<ElementId> {
    let n = points.len() as u64;
    let mut ever_inlier = vec![false; points.len()];
    let mut start = 1;
    while start <= n {
        let end = start + window - 1;
        for (id, count) in window_counts(points, start, end, radius) {
            if count >= k as usize {
                ever_inlier[(id - 1) as usize] = true;
            }
        }
        if end >= n {
            break;
        }
        start += slide;
    }
    (1..=n).filter(|&id| !ever_inlier[(id - 1) as usize]).collect()
}

/// Whether element `id` has at least `k` neighbors among `[start, end]`.
pub fn is_inlier(points: &[Vec<f64>], id: ElementId, start: u64, end: u64, radius: f64, k: u32) -> bool {
    window_counts(points, start, end, radius)
        .into_iter()
        .any(|(other, count)| other == id && count >= k as usize)
}
