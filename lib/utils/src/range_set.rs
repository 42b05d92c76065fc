//! A set of `usize` half-open ranges, kept sorted and merged.

use alloc::vec::Vec;
use core::{cmp::max, ops::Range, slice::Iter};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortedRangeSet {
    inner: Vec<Range<usize>>,
}

impl SortedRangeSet {
    pub const fn new() -> SortedRangeSet {
        SortedRangeSet { inner: Vec::new() }
    }

    pub fn iter(&self) -> Iter<'_, Range<usize>> {
        self.inner.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Sum of the lengths of all ranges.
    pub fn total_len(&self) -> usize {
        self.inner.iter().map(|r| r.len()).sum()
    }

    /// Merge touching or overlapping neighbours and drop empty ranges.
    fn combine(&mut self) {
        let mut merged: Vec<Range<usize>> = Vec::with_capacity(self.inner.len());
        for range in self.inner.drain(..) {
            if range.is_empty() {
                continue;
            }
            match merged.last_mut() {
                Some(last) if last.end >= range.start => {
                    last.end = max(last.end, range.end);
                }
                _ => merged.push(range),
            }
        }
        self.inner = merged;
    }

    pub fn add(&mut self, range: Range<usize>) {
        if range.is_empty() {
            return;
        }
        let pos = self
            .inner
            .iter()
            .position(|r| r.start > range.start)
            .unwrap_or(self.inner.len());
        self.inner.insert(pos, range);
        self.combine();
    }

    pub fn sub(&mut self, range: Range<usize>) {
        if range.is_empty() {
            return;
        }
        let mut res = Vec::with_capacity(self.inner.len() + 1);
        for current in self.inner.drain(..) {
            if current.end <= range.start || current.start >= range.end {
                res.push(current);
                continue;
            }
            // [      ]
            //   [  ]
            if current.start < range.start {
                res.push(current.start..range.start);
            }
            if current.end > range.end {
                res.push(range.end..current.end);
            }
        }
        self.inner = res;
    }

    /// Whether `range` shares at least one address with the set.
    pub fn overlaps(&self, range: &Range<usize>) -> bool {
        self.inner
            .iter()
            .any(|r| r.start < range.end && range.start < r.end)
    }
}
