//! Predicates over the key-value tag set attached to a series.

use std::fmt;

use crate::types::Tags;

/// Value wildcard accepted by [`TagFilter::Base`].
pub const TAG_WILDCARD: &str = "*";

/// Predicate tree over a series' tags. `None` at a call site means the series
/// is not restricted by tags.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TagFilter {
    /// `key = value`; a value of `*` only requires the key to be present.
    Base {
        /// Tag key.
        key: String,
        /// Expected value or `*`.
        value: String,
    },
    /// The tag set must equal this set exactly.
    Precise(Tags),
    /// Matches series that carry no tags at all.
    WithoutTag,
    /// All children must match.
    And(Vec<TagFilter>),
    /// At least one child must match.
    Or(Vec<TagFilter>),
}

impl TagFilter {
    /// `key = value` leaf.
    pub fn base(key: impl Into<String>, value: impl Into<String>) -> Self {
        TagFilter::Base {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Whether `tags` satisfies the predicate.
    pub fn matches(&self, tags: &Tags) -> bool {
        match self {
            TagFilter::Base { key, value } => match tags.get(key) {
                Some(actual) => value == TAG_WILDCARD || actual == value,
                None => false,
            },
            TagFilter::Precise(expected) => expected == tags,
            TagFilter::WithoutTag => tags.is_empty(),
            TagFilter::And(children) => children.iter().all(|c| c.matches(tags)),
            TagFilter::Or(children) => children.iter().any(|c| c.matches(tags)),
        }
    }
}

/// Applies an optional tag filter; an absent filter accepts everything.
pub fn tags_match(filter: Option<&TagFilter>, tags: &Tags) -> bool {
    filter.map_or(true, |f| f.matches(tags))
}

impl fmt::Display for TagFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagFilter::Base { key, value } => write!(f, "{key}={value}"),
            TagFilter::Precise(tags) => {
                f.write_str("{")?;
                for (i, (k, v)) in tags.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}={v}")?;
                }
                f.write_str("}")
            }
            TagFilter::WithoutTag => f.write_str("without tag"),
            TagFilter::And(children) | TagFilter::Or(children) => {
                let sep = if matches!(self, TagFilter::And(_)) {
                    " && "
                } else {
                    " || "
                };
                f.write_str("(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(sep)?;
                    }
                    write!(f, "{child}")?;
                }
                f.write_str(")")
            }
        }
    }
}
