//! Bookkeeping for the memory-bounded micro-cluster variant.
//!
//! The pending index is capped at `pd_limit` elements. When it grows past the
//! cap, safe inliers are evicted at random: they can never become outliers
//! again, so dropping them only costs the neighbor updates they would have
//! delivered to later arrivals.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::MemoryBoundConfig;
use crate::element::ElementId;
use crate::error::Result;

/// Set of pending safe inliers with uniform random selection.
#[derive(Debug, Clone, Default)]
pub struct SafeInlierSet {
    items: Vec<ElementId>,
    positions: HashMap<ElementId, usize>,
}

impl SafeInlierSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ElementId) -> bool {
        if self.positions.contains_key(&id) {
            return false;
        }
        self.positions.insert(id, self.items.len());
        self.items.push(id);
        true
    }

    pub fn remove(&mut self, id: ElementId) -> bool {
        let Some(pos) = self.positions.remove(&id) else {
            return false;
        };
        self.items.swap_remove(pos);
        if let Some(&moved) = self.items.get(pos) {
            self.positions.insert(moved, pos);
        }
        true
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.positions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Picks a member uniformly at random.
    pub fn choose<R: Rng>(&self, rng: &mut R) -> Option<ElementId> {
        if self.items.is_empty() {
            return None;
        }
        let pos = rng.random_range(0..self.items.len());
        self.items.get(pos).copied()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.positions.clear();
    }
}

#[derive(Debug, Clone)]
pub(crate) struct MemoryBound {
    config: MemoryBoundConfig,
    admission_radius: f64,
    pub(crate) safe: SafeInlierSet,
    rng: StdRng,
}

impl MemoryBound {
    pub(crate) fn new(config: MemoryBoundConfig, radius: f64) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            admission_radius: config.admission_radius(radius),
            rng: StdRng::seed_from_u64(config.seed),
            safe: SafeInlierSet::new(),
            config,
        })
    }

    pub(crate) fn config(&self) -> &MemoryBoundConfig {
        &self.config
    }

    pub(crate) fn pd_limit(&self) -> usize {
        self.config.pd_limit
    }

    /// Radius within which outer-ring elements count towards cluster promotion
    /// after an eviction.
    pub(crate) fn admission_radius(&self) -> f64 {
        self.admission_radius
    }

    /// Removes and returns a random safe inlier.
    pub(crate) fn pick_victim(&mut self) -> Option<ElementId> {
        let victim = self.safe.choose(&mut self.rng)?;
        self.safe.remove(victim);
        Some(victim)
    }
}
