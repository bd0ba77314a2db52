//! Count-based sliding window and the pure-outlier ledger.
//!
//! The window covers the id range `[start, end]`, initially `[1, window_size]`.
//! When an arriving id exceeds `end`, both bounds advance by `slide_size` and every
//! element with id below the new `start` is handed back to the caller for expiry.
//! Because `start` is always `1 + m * slide_size`, expiry removes whole slides.
//!
//! Live elements are stored contiguously by id, so lookups are a subtraction and
//! an index.

use std::collections::{BTreeSet, VecDeque};

use crate::element::{ElementId, History, StreamElement, FIRST_ELEMENT_ID};

/// Arena of live elements addressed by id.
#[derive(Debug, Clone)]
pub struct Window {
    window_size: u64,
    slide_size: u64,
    start: ElementId,
    end: ElementId,
    next_id: ElementId,
    elements: VecDeque<StreamElement>,
}

impl Window {
    pub fn new(window_size: u64, slide_size: u64) -> Self {
        Self {
            window_size,
            slide_size,
            start: FIRST_ELEMENT_ID,
            end: FIRST_ELEMENT_ID + window_size - 1,
            next_id: FIRST_ELEMENT_ID,
            elements: VecDeque::new(),
        }
    }

    pub fn start(&self) -> ElementId {
        self.start
    }

    pub fn end(&self) -> ElementId {
        self.end
    }

    pub fn window_size(&self) -> u64 {
        self.window_size
    }

    pub fn slide_size(&self) -> u64 {
        self.slide_size
    }

    /// Id the next arrival will receive.
    pub fn next_id(&self) -> ElementId {
        self.next_id
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Whether `id` refers to an element currently in the window.
    pub fn contains(&self, id: ElementId) -> bool {
        id >= self.start && id < self.next_id && self.offset(id).is_some()
    }

    fn offset(&self, id: ElementId) -> Option<usize> {
        let first = self.elements.front()?.id;
        if id < first {
            return None;
        }
        let offset = (id - first) as usize;
        (offset < self.elements.len()).then_some(offset)
    }

    pub fn get(&self, id: ElementId) -> Option<&StreamElement> {
        let offset = self.offset(id)?;
        self.elements.get(offset)
    }

    pub(crate) fn get_mut(&mut self, id: ElementId) -> Option<&mut StreamElement> {
        let offset = self.offset(id)?;
        self.elements.get_mut(offset)
    }

    /// Whether the next arrival falls beyond `end`.
    pub fn needs_slide(&self) -> bool {
        self.next_id > self.end
    }

    /// Appends an element with the next id. The caller slides first when needed.
    pub(crate) fn push(&mut self, coords: Vec<f64>) -> ElementId {
        debug_assert!(!self.needs_slide());
        let id = self.next_id;
        self.elements.push_back(StreamElement::new(id, coords));
        self.next_id += 1;
        id
    }

    /// Advances both bounds by one slide and returns the expired elements in
    /// ascending id order.
    pub(crate) fn slide(&mut self) -> Vec<StreamElement> {
        self.start += self.slide_size;
        self.end += self.slide_size;

        let mut expired = Vec::new();
        while self
            .elements
            .front()
            .is_some_and(|element| element.id < self.start)
        {
            if let Some(element) = self.elements.pop_front() {
                expired.push(element);
            }
        }
        expired
    }

    /// Removes every live element, ascending by id.
    pub(crate) fn drain_all(&mut self) -> Vec<StreamElement> {
        self.elements.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StreamElement> {
        self.elements.iter()
    }
}

/// Final bookkeeping for retired elements.
///
/// An element is retired once: when it expires or when the stream is flushed.
#[derive(Debug, Clone, Default)]
pub struct RetirementLedger {
    pure_outliers: BTreeSet<ElementId>,
    both_inlier_outlier: u64,
    only_inlier: u64,
    only_outlier: u64,
    retired: u64,
}

impl RetirementLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the lifetime outcome of an element leaving the window.
    pub fn retire(&mut self, element: &StreamElement) {
        self.retired += 1;
        match element.history() {
            History::Both => self.both_inlier_outlier += 1,
            History::OnlyInlier => self.only_inlier += 1,
            History::OnlyOutlier => self.only_outlier += 1,
        }
        if element.is_pure_outlier() {
            self.pure_outliers.insert(element.id());
        }
    }

    pub fn pure_outliers(&self) -> &BTreeSet<ElementId> {
        &self.pure_outliers
    }

    /// Counters `(both, only_inlier, only_outlier)` of retired elements.
    pub fn history_counts(&self) -> (u64, u64, u64) {
        (self.both_inlier_outlier, self.only_inlier, self.only_outlier)
    }

    pub fn retired(&self) -> u64 {
        self.retired
    }
}
