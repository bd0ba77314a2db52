//! Arena-backed M-tree over Euclidean space.
//!
//! Internal nodes hold routing entries (pivot, covering radius, child); leaves
//! hold keyed points. Node overflow splits by promoting the farthest pair of
//! entries as new pivots and distributing the rest alternately to the nearest
//! pivot, which keeps both halves the same size. Nodes are addressed by index
//! into a slab, so the tree never holds parent pointers; insertion and removal
//! track the descent path instead.

use std::cmp::Ordering;

use super::euclidean_distance;

/// Default maximum number of entries per node.
pub const DEFAULT_NODE_CAPACITY: usize = 25;

// Covering radii are accumulated sums, so allow a few ULPs when pruning.
const PRUNE_SLACK: f64 = 1e-9;

#[derive(Debug, Clone)]
struct LeafEntry<K> {
    key: K,
    point: Vec<f64>,
}

#[derive(Debug, Clone)]
struct RoutingEntry {
    pivot: Vec<f64>,
    radius: f64,
    child: usize,
}

#[derive(Debug, Clone)]
enum Node<K> {
    Leaf(Vec<LeafEntry<K>>),
    Internal(Vec<RoutingEntry>),
}

enum Removal {
    NotFound,
    Removed { now_empty: bool },
}

/// Metric tree storing one point per key.
#[derive(Debug, Clone)]
pub struct MTree<K> {
    capacity: usize,
    nodes: Vec<Node<K>>,
    free: Vec<usize>,
    root: Option<usize>,
    len: usize,
}

impl<K> Default for MTree<K> {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_NODE_CAPACITY)
    }
}

fn within(distance: f64, radius: f64, covering: f64) -> bool {
    distance <= radius + covering + PRUNE_SLACK * (1.0 + radius + covering)
}

impl<K> MTree<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tree whose nodes split above `capacity` entries (at least 2).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(2),
            nodes: Vec::new(),
            free: Vec::new(),
            root: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.root = None;
        self.len = 0;
    }

    /// Number of levels from the root to the leaves.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.root;
        while let Some(idx) = current {
            depth += 1;
            current = match &self.nodes[idx] {
                Node::Internal(entries) => entries.first().map(|entry| entry.child),
                Node::Leaf(_) => None,
            };
        }
        depth
    }

    fn alloc(&mut self, node: Node<K>) -> usize {
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn release(&mut self, idx: usize) {
        self.nodes[idx] = Node::Leaf(Vec::new());
        self.free.push(idx);
    }

    /// Inserts `point` under `key`. Keys are not checked for uniqueness.
    pub fn insert(&mut self, key: K, point: Vec<f64>) {
        self.len += 1;
        let entry = LeafEntry { key, point };
        let Some(root) = self.root else {
            let idx = self.alloc(Node::Leaf(vec![entry]));
            self.root = Some(idx);
            return;
        };

        let mut path: Vec<(usize, usize)> = Vec::new();
        let mut current = root;
        loop {
            match &mut self.nodes[current] {
                Node::Internal(entries) => {
                    let (pos, distance) = choose_subtree(entries, &entry.point);
                    let routing = &mut entries[pos];
                    if distance > routing.radius {
                        routing.radius = distance;
                    }
                    path.push((current, pos));
                    current = routing.child;
                }
                Node::Leaf(entries) => {
                    entries.push(entry);
                    break;
                }
            }
        }

        self.split_upwards(current, path);
    }

    fn overflows(&self, idx: usize) -> bool {
        let size = match &self.nodes[idx] {
            Node::Leaf(entries) => entries.len(),
            Node::Internal(entries) => entries.len(),
        };
        size > self.capacity
    }

    fn split_upwards(&mut self, mut idx: usize, mut path: Vec<(usize, usize)>) {
        while self.overflows(idx) {
            let (left, right) = self.split_node(idx);
            match path.pop() {
                None => {
                    let root = self.alloc(Node::Internal(vec![left, right]));
                    self.root = Some(root);
                    break;
                }
                Some((parent, pos)) => {
                    if let Node::Internal(entries) = &mut self.nodes[parent] {
                        entries[pos] = left;
                        entries.push(right);
                    }
                    idx = parent;
                }
            }
        }
    }

    /// Splits node `idx` in two. The first half stays at `idx`.
    fn split_node(&mut self, idx: usize) -> (RoutingEntry, RoutingEntry) {
        let node = std::mem::replace(&mut self.nodes[idx], Node::Leaf(Vec::new()));
        let (left, right, right_node) = match node {
            Node::Leaf(entries) => {
                let split = partition(entries, |entry| &entry.point, |_| 0.0);
                self.nodes[idx] = Node::Leaf(split.left);
                (
                    (split.left_pivot, split.left_radius),
                    (split.right_pivot, split.right_radius),
                    Node::Leaf(split.right),
                )
            }
            Node::Internal(entries) => {
                let split = partition(entries, |entry| &entry.pivot, |entry| entry.radius);
                self.nodes[idx] = Node::Internal(split.left);
                (
                    (split.left_pivot, split.left_radius),
                    (split.right_pivot, split.right_radius),
                    Node::Internal(split.right),
                )
            }
        };
        let right_idx = self.alloc(right_node);
        (
            RoutingEntry {
                pivot: left.0,
                radius: left.1,
                child: idx,
            },
            RoutingEntry {
                pivot: right.0,
                radius: right.1,
                child: right_idx,
            },
        )
    }

    /// Visits every stored `(key, point)` pair.
    pub fn entries(&self) -> Vec<(&K, &[f64])> {
        let mut out = Vec::with_capacity(self.len);
        let mut stack: Vec<usize> = self.root.into_iter().collect();
        while let Some(idx) = stack.pop() {
            match &self.nodes[idx] {
                Node::Internal(entries) => stack.extend(entries.iter().map(|entry| entry.child)),
                Node::Leaf(entries) => {
                    out.extend(entries.iter().map(|entry| (&entry.key, entry.point.as_slice())))
                }
            }
        }
        out
    }
}

impl<K: PartialEq> MTree<K> {
    /// Removes the entry stored under `key` at `point`. Returns false when absent.
    pub fn remove(&mut self, key: &K, point: &[f64]) -> bool {
        let Some(root) = self.root else {
            return false;
        };
        match self.remove_from(root, key, point) {
            Removal::NotFound => false,
            Removal::Removed { now_empty } => {
                self.len -= 1;
                if now_empty {
                    self.release(root);
                    self.root = None;
                } else {
                    self.collapse_root();
                }
                true
            }
        }
    }

    /// Whether `key` is stored anywhere, regardless of position.
    pub fn contains_key(&self, key: &K) -> bool {
        self.entries().into_iter().any(|(stored, _)| stored == key)
    }

    fn remove_from(&mut self, idx: usize, key: &K, point: &[f64]) -> Removal {
        let children: Vec<usize> = match &mut self.nodes[idx] {
            Node::Leaf(entries) => {
                return match entries.iter().position(|entry| entry.key == *key) {
                    Some(pos) => {
                        entries.swap_remove(pos);
                        Removal::Removed {
                            now_empty: entries.is_empty(),
                        }
                    }
                    None => Removal::NotFound,
                };
            }
            Node::Internal(entries) => entries
                .iter()
                .filter(|entry| within(euclidean_distance(&entry.pivot, point), 0.0, entry.radius))
                .map(|entry| entry.child)
                .collect(),
        };

        for child in children {
            if let Removal::Removed { now_empty } = self.remove_from(child, key, point) {
                if now_empty {
                    self.release(child);
                }
                let Node::Internal(entries) = &mut self.nodes[idx] else {
                    return Removal::Removed { now_empty: false };
                };
                if now_empty {
                    entries.retain(|entry| entry.child != child);
                }
                return Removal::Removed {
                    now_empty: entries.is_empty(),
                };
            }
        }
        Removal::NotFound
    }

    fn collapse_root(&mut self) {
        while let Some(root) = self.root {
            let next = match &self.nodes[root] {
                Node::Internal(entries) if entries.len() == 1 => entries[0].child,
                _ => break,
            };
            self.release(root);
            self.root = Some(next);
        }
    }
}

impl<K: Clone + Ord> MTree<K> {
    /// Returns every `(key, distance)` with distance `<= radius`, ascending by
    /// distance and then by key.
    pub fn range_query(&self, query: &[f64], radius: f64) -> Vec<(K, f64)> {
        let mut results = Vec::new();
        let mut stack: Vec<usize> = self.root.into_iter().collect();
        while let Some(idx) = stack.pop() {
            match &self.nodes[idx] {
                Node::Internal(entries) => {
                    for entry in entries {
                        if within(euclidean_distance(query, &entry.pivot), radius, entry.radius) {
                            stack.push(entry.child);
                        }
                    }
                }
                Node::Leaf(entries) => {
                    for entry in entries {
                        let distance = euclidean_distance(query, &entry.point);
                        if distance <= radius {
                            results.push((entry.key.clone(), distance));
                        }
                    }
                }
            }
        }
        results.sort_by(|a, b| match a.1.total_cmp(&b.1) {
            Ordering::Equal => a.0.cmp(&b.0),
            other => other,
        });
        results
    }
}

fn choose_subtree(entries: &[RoutingEntry], point: &[f64]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    let mut best_cost = (true, f64::INFINITY);
    for (pos, entry) in entries.iter().enumerate() {
        let distance = euclidean_distance(&entry.pivot, point);
        // Prefer subtrees that already cover the point, then the least enlargement.
        let cost = if distance <= entry.radius {
            (false, distance)
        } else {
            (true, distance - entry.radius)
        };
        if cost.0 < best_cost.0 || (cost.0 == best_cost.0 && cost.1 < best_cost.1) {
            best_cost = cost;
            best = (pos, distance);
        }
    }
    best
}

struct Split<T> {
    left_pivot: Vec<f64>,
    left_radius: f64,
    left: Vec<T>,
    right_pivot: Vec<f64>,
    right_radius: f64,
    right: Vec<T>,
}

fn partition<T>(
    items: Vec<T>,
    point: impl Fn(&T) -> &Vec<f64>,
    extent: impl Fn(&T) -> f64,
) -> Split<T> {
    let n = items.len();
    let (mut a, mut b, mut farthest) = (0, n.saturating_sub(1), -1.0);
    for i in 0..n {
        for j in (i + 1)..n {
            let distance = euclidean_distance(point(&items[i]), point(&items[j]));
            if distance > farthest {
                farthest = distance;
                a = i;
                b = j;
            }
        }
    }
    let left_pivot = point(&items[a]).clone();
    let right_pivot = point(&items[b]).clone();
    let to_left: Vec<f64> = items
        .iter()
        .map(|item| euclidean_distance(&left_pivot, point(item)))
        .collect();
    let to_right: Vec<f64> = items
        .iter()
        .map(|item| euclidean_distance(&right_pivot, point(item)))
        .collect();

    // Alternate between pivots, each taking its nearest unassigned entry.
    let mut side: Vec<Option<bool>> = vec![None; n];
    let mut assigned = 0;
    let mut take_left = true;
    while assigned < n {
        let distances = if take_left { &to_left } else { &to_right };
        let nearest = (0..n)
            .filter(|&i| side[i].is_none())
            .min_by(|&i, &j| distances[i].total_cmp(&distances[j]));
        if let Some(i) = nearest {
            side[i] = Some(take_left);
            assigned += 1;
        }
        take_left = !take_left;
    }

    let mut split = Split {
        left_pivot,
        left_radius: 0.0,
        left: Vec::with_capacity(n / 2 + 1),
        right_pivot,
        right_radius: 0.0,
        right: Vec::with_capacity(n / 2 + 1),
    };
    for (i, item) in items.into_iter().enumerate() {
        let reach = extent(&item);
        if side[i] == Some(true) {
            split.left_radius = split.left_radius.max(to_left[i] + reach);
            split.left.push(item);
        } else {
            split.right_radius = split.right_radius.max(to_right[i] + reach);
            split.right.push(item);
        }
    }
    split
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_points(n: usize, dims: usize, seed: u64) -> Vec<Vec<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| (0..dims).map(|_| rng.random_range(-10.0..10.0)).collect())
            .collect()
    }

    fn brute_force(points: &[(u64, Vec<f64>)], query: &[f64], radius: f64) -> Vec<u64> {
        let mut hits: Vec<(u64, f64)> = points
            .iter()
            .map(|(key, point)| (*key, euclidean_distance(query, point)))
            .filter(|(_, distance)| *distance <= radius)
            .collect();
        hits.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        hits.into_iter().map(|(key, _)| key).collect()
    }

    #[test]
    fn test_empty_tree() {
        let mut tree: MTree<u64> = MTree::new();
        assert!(tree.is_empty());
        assert!(tree.range_query(&[0.0], 10.0).is_empty());
        assert!(!tree.remove(&1, &[0.0]));
        assert_eq!(tree.depth(), 0);
    }

    #[test]
    fn test_range_query_matches_linear_scan() {
        let mut tree = MTree::with_capacity(4);
        let points: Vec<(u64, Vec<f64>)> = random_points(300, 3, 7)
            .into_iter()
            .enumerate()
            .map(|(i, p)| (i as u64, p))
            .collect();
        for (key, point) in &points {
            tree.insert(*key, point.clone());
        }
        assert_eq!(tree.len(), 300);
        assert!(tree.depth() > 2);

        for query in random_points(20, 3, 8) {
            let found: Vec<u64> = tree
                .range_query(&query, 4.0)
                .into_iter()
                .map(|(key, _)| key)
                .collect();
            assert_eq!(found, brute_force(&points, &query, 4.0));
        }
    }

    #[test]
    fn test_results_ascending_by_distance() {
        let mut tree = MTree::with_capacity(3);
        for (key, x) in [(1u64, 5.0), (2, 1.0), (3, 3.0), (4, 2.0), (5, 4.0)] {
            tree.insert(key, vec![x]);
        }
        let results = tree.range_query(&[0.0], 3.5);
        assert_eq!(
            results.iter().map(|(key, _)| *key).collect::<Vec<_>>(),
            vec![2, 4, 3]
        );
        assert!(results.windows(2).all(|w| w[0].1 <= w[1].1));
    }

    #[test]
    fn test_remove_everything() {
        let mut tree = MTree::with_capacity(5);
        let points = random_points(200, 2, 11);
        for (i, point) in points.iter().enumerate() {
            tree.insert(i as u64, point.clone());
        }
        for (i, point) in points.iter().enumerate().step_by(2) {
            assert!(tree.remove(&(i as u64), point));
            assert!(!tree.remove(&(i as u64), point));
        }
        assert_eq!(tree.len(), 100);
        let remaining: Vec<(u64, Vec<f64>)> = points
            .iter()
            .enumerate()
            .filter(|(i, _)| i % 2 == 1)
            .map(|(i, p)| (i as u64, p.clone()))
            .collect();
        let found: Vec<u64> = tree
            .range_query(&[0.0, 0.0], 6.0)
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        assert_eq!(found, brute_force(&remaining, &[0.0, 0.0], 6.0));

        for (key, point) in &remaining {
            assert!(tree.remove(key, point));
        }
        assert!(tree.is_empty());
        assert_eq!(tree.depth(), 0);

        tree.insert(999, vec![1.0, 1.0]);
        assert_eq!(tree.range_query(&[1.0, 1.0], 0.0).len(), 1);
    }

    #[test]
    fn test_duplicate_points_with_distinct_keys() {
        let mut tree = MTree::with_capacity(2);
        for key in 0..10u64 {
            tree.insert(key, vec![1.0, 1.0]);
        }
        assert_eq!(tree.range_query(&[1.0, 1.0], 0.0).len(), 10);
        assert!(tree.remove(&4, &[1.0, 1.0]));
        assert!(tree.contains_key(&5));
        assert!(!tree.contains_key(&4));
    }
}
