//! Approximate neighbor index based on random-projection hashing.
//!
//! Each [`HashFunction`] projects a point onto a Gaussian direction, shifts it by
//! a bias and quantizes the result into buckets of width `w`. A [`HashTable`]
//! concatenates several such hashes into one bucket key; points that share a key
//! in at least one of the tables are candidate neighbors.
//!
//! Projections are drawn from a seeded [`StdRng`], so two indices built with the
//! same parameters and seed hash identically.

use std::collections::{BTreeSet, HashMap};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use super::{euclidean_distance, Neighbor, NeighborIndex};
use crate::config::HashConfig;
use crate::element::ElementId;
use crate::error::{OutlierError, Result};

/// Bucket key of one table: the per-function hash values in order.
pub type BucketKey = Vec<i64>;

/// `floor((p . v + b) / w)` with Gaussian `v` and uniform `b` in `[0, 1)`.
#[derive(Debug, Clone)]
pub struct HashFunction {
    projection: Vec<f64>,
    bias: f64,
    width: f64,
}

impl HashFunction {
    /// Draws a random projection for `dimensions`-dimensional points.
    pub fn random<R: Rng>(dimensions: usize, width: f64, rng: &mut R) -> Self {
        let bias = rng.random::<f64>();
        let projection = (0..dimensions).map(|_| rng.sample(StandardNormal)).collect();
        Self {
            projection,
            bias,
            width,
        }
    }

    pub fn hash(&self, point: &[f64]) -> i64 {
        let dot: f64 = point
            .iter()
            .zip(&self.projection)
            .map(|(x, v)| x * v)
            .sum();
        ((dot + self.bias) / self.width).floor() as i64
    }
}

/// One table of buckets keyed by concatenated hashes.
#[derive(Debug, Clone)]
pub struct HashTable {
    functions: Vec<HashFunction>,
    buckets: HashMap<BucketKey, Vec<ElementId>>,
}

impl HashTable {
    pub fn random<R: Rng>(num_hashes: usize, width: f64, dimensions: usize, rng: &mut R) -> Self {
        Self {
            functions: (0..num_hashes)
                .map(|_| HashFunction::random(dimensions, width, rng))
                .collect(),
            buckets: HashMap::new(),
        }
    }

    pub fn key(&self, point: &[f64]) -> BucketKey {
        self.functions.iter().map(|f| f.hash(point)).collect()
    }

    fn add(&mut self, key: BucketKey, id: ElementId) {
        let bucket = self.buckets.entry(key).or_default();
        if let Err(pos) = bucket.binary_search(&id) {
            bucket.insert(pos, id);
        }
    }

    fn remove(&mut self, key: &BucketKey, id: ElementId) -> bool {
        let Some(bucket) = self.buckets.get_mut(key) else {
            return false;
        };
        let Ok(pos) = bucket.binary_search(&id) else {
            return false;
        };
        bucket.remove(pos);
        if bucket.is_empty() {
            self.buckets.remove(key);
        }
        true
    }

    pub fn bucket(&self, key: &BucketKey) -> &[ElementId] {
        self.buckets.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of ids stored across all buckets.
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

#[derive(Debug, Clone)]
struct IndexedPoint {
    coords: Vec<f64>,
    keys: Vec<BucketKey>,
}

/// Multi-table LSH index over element coordinates.
#[derive(Debug, Clone)]
pub struct LshIndex {
    tables: Vec<HashTable>,
    points: HashMap<ElementId, IndexedPoint>,
    verify_distance: bool,
}

impl LshIndex {
    /// Builds the tables described by `config`.
    pub fn new(config: &HashConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let tables = (0..config.num_tables)
            .map(|_| HashTable::random(config.num_hashes, config.bucket_width, config.dimensions, &mut rng))
            .collect();
        Ok(Self {
            tables,
            points: HashMap::new(),
            verify_distance: config.verify_distance,
        })
    }

    pub fn tables(&self) -> &[HashTable] {
        &self.tables
    }

    /// Candidates sharing a bucket with `coords` in any table, deduplicated and
    /// ascending by id.
    pub fn candidates(&self, coords: &[f64]) -> BTreeSet<ElementId> {
        self.tables
            .iter()
            .flat_map(|table| table.bucket(&table.key(coords)).iter().copied())
            .collect()
    }
}

impl NeighborIndex for LshIndex {
    fn name(&self) -> &'static str {
        "lsh"
    }

    fn insert(&mut self, id: ElementId, coords: &[f64]) {
        let keys: Vec<BucketKey> = self.tables.iter().map(|table| table.key(coords)).collect();
        for (table, key) in self.tables.iter_mut().zip(&keys) {
            table.add(key.clone(), id);
        }
        self.points.insert(
            id,
            IndexedPoint {
                coords: coords.to_vec(),
                keys,
            },
        );
    }

    fn remove(&mut self, id: ElementId, _coords: &[f64]) -> Result<bool> {
        let Some(point) = self.points.remove(&id) else {
            return Ok(false);
        };
        for (table, key) in self.tables.iter_mut().zip(&point.keys) {
            if !table.remove(key, id) {
                return Err(OutlierError::consistency(
                    "lsh index",
                    format!("element {id} missing from its bucket"),
                ));
            }
        }
        Ok(true)
    }

    /// Without distance verification every bucket candidate is returned,
    /// whatever its distance.
    fn range_query(&self, coords: &[f64], radius: f64) -> Vec<Neighbor> {
        let mut results: Vec<Neighbor> = self
            .candidates(coords)
            .into_iter()
            .filter_map(|id| {
                let point = self.points.get(&id)?;
                Some(Neighbor {
                    id,
                    distance: euclidean_distance(coords, &point.coords),
                })
            })
            .collect();
        results.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
        if self.verify_distance {
            let within = results.partition_point(|n| n.distance <= radius);
            results.truncate(within);
        }
        results
    }

    fn len(&self) -> usize {
        self.points.len()
    }

    fn clear(&mut self) {
        for table in &mut self.tables {
            table.buckets.clear();
        }
        self.points.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(num_hashes: usize, num_tables: usize) -> HashConfig {
        HashConfig::new(num_hashes, num_tables, 4.0, 2).with_seed(3)
    }

    #[test]
    fn test_hash_is_floor_of_projection() {
        let f = HashFunction {
            projection: vec![1.0, -2.0],
            bias: 0.5,
            width: 2.0,
        };
        assert_eq!(f.hash(&[3.0, 0.0]), 1);
        assert_eq!(f.hash(&[0.0, 1.0]), -1);
        assert_eq!(f.hash(&[0.0, 0.0]), 0);
    }

    #[test]
    fn test_same_seed_same_keys() {
        let a = LshIndex::new(&config(3, 4)).unwrap();
        let b = LshIndex::new(&config(3, 4)).unwrap();
        for point in [[0.0, 0.0], [1.5, -2.0], [10.0, 3.0]] {
            for (ta, tb) in a.tables().iter().zip(b.tables()) {
                assert_eq!(ta.key(&point), tb.key(&point));
            }
        }
    }

    #[test]
    fn test_identical_points_always_collide() {
        let mut index = LshIndex::new(&config(4, 2)).unwrap();
        index.insert(1, &[2.0, 2.0]);
        index.insert(2, &[2.0, 2.0]);
        index.insert(3, &[500.0, -500.0]);

        let hits = index.range_query(&[2.0, 2.0], 0.5);
        assert_eq!(hits.iter().map(|n| n.id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_remove_clears_buckets() {
        let mut index = LshIndex::new(&config(2, 3)).unwrap();
        index.insert(1, &[0.0, 1.0]);
        index.insert(2, &[0.0, 1.0]);
        assert_eq!(index.len(), 2);

        assert!(index.remove(1, &[0.0, 1.0]).unwrap());
        assert!(!index.remove(1, &[0.0, 1.0]).unwrap());
        assert_eq!(index.candidates(&[0.0, 1.0]).into_iter().collect::<Vec<_>>(), vec![2]);
        assert!(index.tables().iter().all(|table| table.len() == 1));

        assert!(index.remove(2, &[0.0, 1.0]).unwrap());
        assert!(index.tables().iter().all(HashTable::is_empty));
    }

    #[test]
    fn test_unverified_query_returns_all_candidates() {
        let hash = config(1, 1).with_verify_distance(false);
        let mut index = LshIndex::new(&hash).unwrap();
        index.insert(1, &[0.0, 0.0]);
        index.insert(2, &[0.0, 0.0]);
        let hits = index.range_query(&[0.0, 0.0], 0.0);
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|n| n.distance == 0.0));
    }
}
