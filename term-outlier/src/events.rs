//! Re-evaluation schedule for unsafe inliers.
//!
//! An unsafe inlier depends on preceding neighbors that will expire before it
//! does. Instead of recounting every element on every slide, the detector
//! schedules one [`EventItem`] per unsafe inlier at the moment its oldest
//! preceding neighbor leaves the window, and drains due items after each slide.

use std::collections::BTreeSet;

use crate::element::ElementId;

/// A scheduled re-check.
///
/// Items order by `(expiration_time, element)`, so ties resolve by ascending id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventItem {
    /// Window end at which the element must be re-checked
    pub expiration_time: u64,
    /// Element to re-check
    pub element: ElementId,
}

/// Ordered set of scheduled re-checks.
///
/// The same element may be scheduled several times with different times; stale
/// items are harmless because a drained item is always re-validated against the
/// element's current state.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    items: BTreeSet<EventItem>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `element` at `expiration_time`.
    pub fn insert(&mut self, element: ElementId, expiration_time: u64) {
        self.items.insert(EventItem {
            expiration_time,
            element,
        });
    }

    /// Schedules `element` for when `oldest_neighbor` expires from a window of
    /// `window_size` elements. Does nothing when there is no such neighbor.
    ///
    /// That time is the first window `end` at which `oldest_neighbor` is no longer
    /// in the window.
    pub fn schedule(&mut self, element: ElementId, oldest_neighbor: Option<ElementId>, window_size: u64) {
        if let Some(neighbor) = oldest_neighbor {
            self.insert(element, neighbor.saturating_add(window_size));
        }
    }

    pub fn peek_min(&self) -> Option<&EventItem> {
        self.items.first()
    }

    pub fn extract_min(&mut self) -> Option<EventItem> {
        self.items.pop_first()
    }

    /// Extracts the minimum item if it is due at or before `window_end`.
    pub fn pop_due(&mut self, window_end: u64) -> Option<EventItem> {
        if self.peek_min()?.expiration_time <= window_end {
            self.extract_min()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Scheduled times for `element`, ascending.
    pub fn times_for(&self, element: ElementId) -> Vec<u64> {
        self.items
            .iter()
            .filter(|item| item.element == element)
            .map(|item| item.expiration_time)
            .collect()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_by_time_then_id() {
        let mut queue = EventQueue::new();
        queue.insert(9, 20);
        queue.insert(4, 15);
        queue.insert(2, 20);
        queue.insert(7, 15);

        let drained: Vec<_> = std::iter::from_fn(|| queue.extract_min())
            .map(|item| (item.expiration_time, item.element))
            .collect();
        assert_eq!(drained, vec![(15, 4), (15, 7), (20, 2), (20, 9)]);
        assert!(queue.extract_min().is_none());
        assert!(queue.peek_min().is_none());
    }

    #[test]
    fn test_schedule_without_neighbor_is_noop() {
        let mut queue = EventQueue::new();
        queue.schedule(3, None, 10);
        assert!(queue.is_empty());

        queue.schedule(3, Some(2), 10);
        assert_eq!(queue.times_for(3), vec![12]);

        queue.schedule(4, Some(2), u64::MAX);
        assert_eq!(queue.times_for(4), vec![u64::MAX]);
    }

    #[test]
    fn test_duplicate_schedules_are_kept() {
        let mut queue = EventQueue::new();
        queue.schedule(5, Some(1), 10);
        queue.schedule(5, Some(1), 10);
        queue.schedule(5, Some(3), 10);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.times_for(5), vec![11, 13]);
    }

    #[test]
    fn test_pop_due_respects_window_end() {
        let mut queue = EventQueue::new();
        queue.insert(1, 11);
        queue.insert(2, 16);

        assert!(queue.pop_due(10).is_none());
        assert_eq!(queue.pop_due(15).map(|item| item.element), Some(1));
        assert!(queue.pop_due(15).is_none());
        assert_eq!(queue.pop_due(16).map(|item| item.element), Some(2));
        assert!(queue.is_empty());
    }
}
