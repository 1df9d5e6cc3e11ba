use std::fmt;

/// Half-open [start,end) interval of 0-indexed positions
///
/// Used for both reference and read coordinates, so variant blocks, confident blocks and their
/// read projections share the same overlap and merge logic.
///
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
pub struct IntRange {
    pub start: i64,
    pub end: i64,
}

impl IntRange {
    pub fn from_pair(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn size(&self) -> i64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn intersect_pos(&self, pos: i64) -> bool {
        pos >= self.start && pos < self.end
    }

    /// True if the ranges share at least one position
    ///
    pub fn intersect_range(&self, other: &IntRange) -> bool {
        other.end > self.start && other.start < self.end
    }

    /// Extend this range to also cover `other`
    pub fn merge(&mut self, other: &IntRange) {
        self.start = self.start.min(other.start);
        self.end = self.end.max(other.end);
    }

    /// Mirror the range within a sequence of length `size`, as when converting between aligned
    /// and original read orientation of a reverse-strand alignment
    ///
    /// For example [1,3) in a sequence of length 6 becomes [3,5).
    ///
    pub fn get_reverse_range(&self, size: i64) -> Self {
        Self::from_pair(size - self.end, size - self.start)
    }
}

impl fmt::Debug for IntRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}-{})", self.start, self.end)
    }
}

/// Intersection of two ranges, or None if they share no position
///
pub fn get_overlap_range(r1: &IntRange, r2: &IntRange) -> Option<IntRange> {
    let overlap = IntRange::from_pair(r1.start.max(r2.start), r1.end.min(r2.end));
    (!overlap.is_empty()).then_some(overlap)
}

/// Sort ranges and merge any which overlap or are adjacent
///
/// Empty ranges are dropped.
///
pub fn merge_ranges(mut ranges: Vec<IntRange>) -> Vec<IntRange> {
    ranges.retain(|x| !x.is_empty());
    ranges.sort();

    let mut merged: Vec<IntRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if range.start <= last.end => last.merge(&range),
            _ => merged.push(range),
        }
    }
    merged
}

/// Total size of a set of non-overlapping ranges
///
pub fn get_total_range_size(ranges: &[IntRange]) -> i64 {
    ranges.iter().map(|x| x.size()).sum()
}
