//! Key ranges used for push-down and trimming, plus the boundary descriptors
//! reported by storage engines.

use std::fmt;

/// Largest key a series can hold. `i64::MAX` is reserved as the exclusive
/// end of [`KeyRange::full`].
pub const MAX_KEY: i64 = i64::MAX - 1;

/// Half-open key interval `[begin, end)`.
///
/// `begin` is inclusive and `end` exclusive everywhere in the crate: filter
/// push-down, reads and trims all use this convention.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct KeyRange {
    /// Inclusive lower bound.
    pub begin: i64,
    /// Exclusive upper bound.
    pub end: i64,
}

impl KeyRange {
    /// Creates `[begin, end)`.
    pub const fn new(begin: i64, end: i64) -> Self {
        Self { begin, end }
    }

    /// The range covering every representable key.
    pub const fn full() -> Self {
        Self::new(i64::MIN, i64::MAX)
    }

    /// Range holding exactly `key`.
    pub fn point(key: i64) -> Self {
        Self::new(key, key.saturating_add(1))
    }

    /// Whether no key falls inside the range.
    pub fn is_empty(&self) -> bool {
        self.begin >= self.end
    }

    /// Whether `key` falls inside the range.
    pub fn contains(&self, key: i64) -> bool {
        self.begin <= key && key < self.end
    }

    /// Overlap of two ranges, `None` when disjoint.
    pub fn intersect(&self, other: &KeyRange) -> Option<KeyRange> {
        let range = KeyRange::new(self.begin.max(other.begin), self.end.min(other.end));
        (!range.is_empty()).then_some(range)
    }

    /// Sorts `ranges`, drops empty ones and merges overlapping or adjacent
    /// ranges.
    pub fn normalize(mut ranges: Vec<KeyRange>) -> Vec<KeyRange> {
        ranges.retain(|r| !r.is_empty());
        ranges.sort();
        let mut merged: Vec<KeyRange> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match merged.last_mut() {
                Some(last) if range.begin <= last.end => last.end = last.end.max(range.end),
                _ => merged.push(range),
            }
        }
        merged
    }

    /// Pairwise intersection of two normalized range lists.
    pub fn intersect_all(left: &[KeyRange], right: &[KeyRange]) -> Vec<KeyRange> {
        let mut out = Vec::new();
        for l in left {
            for r in right {
                if let Some(range) = l.intersect(r) {
                    out.push(range);
                }
            }
        }
        KeyRange::normalize(out)
    }

    /// Whether `key` falls into any of `ranges`.
    pub fn any_contains(ranges: &[KeyRange], key: i64) -> bool {
        ranges.iter().any(|r| r.contains(key))
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.begin, self.end)
    }
}

/// Key span a storage engine claims to cover.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct KeyInterval {
    /// First key of the span.
    pub start: i64,
    /// Last key of the span.
    pub end: i64,
}

impl KeyInterval {
    /// Creates a new interval.
    pub const fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// `[0, i64::MAX]`, reported when the engine cannot bound its keys. Stored
    /// keys never exceed [`MAX_KEY`], so the end is never a stored key.
    pub const fn unbounded() -> Self {
        Self::new(0, i64::MAX)
    }
}

/// Path span a storage engine claims to cover.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ColumnsInterval {
    /// Smallest path (inclusive), `None` when unknown.
    pub start: Option<String>,
    /// Largest path, `None` when unknown.
    pub end: Option<String>,
    /// Prefix prepended to discovered paths.
    pub schema_prefix: Option<String>,
}

impl ColumnsInterval {
    /// Interval declared by the caller as a single path prefix.
    pub fn prefix(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            start: Some(prefix.clone()),
            end: Some(prefix),
            schema_prefix: None,
        }
    }

    /// Interval discovered from the file tree.
    pub fn discovered(
        start: Option<String>,
        end: Option<String>,
        schema_prefix: Option<String>,
    ) -> Self {
        Self {
            start,
            end,
            schema_prefix,
        }
    }
}
