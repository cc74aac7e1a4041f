//! Boolean filter trees shared by rewrite rules and storage executors.
//!
//! A filter is optional everywhere it appears: `None` means "always true".
//! Leaves compare the row key, a path's value, or two paths; `And`/`Or`/`Not`
//! combine them.

use std::cmp::Ordering;
use std::fmt;

use regex::Regex;
use rustc_hash::FxHashMap;

use crate::types::{KeyRange, Value};

/// Comparison operator of a filter leaf.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Op {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// Regex match of the whole value (text values only).
    Like,
}

impl Op {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Op::Eq => ordering == Ordering::Equal,
            Op::Ne => ordering != Ordering::Equal,
            Op::Lt => ordering == Ordering::Less,
            Op::Le => ordering != Ordering::Greater,
            Op::Gt => ordering == Ordering::Greater,
            Op::Ge => ordering != Ordering::Less,
            Op::Like => false,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Op::Eq => "==",
            Op::Ne => "!=",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Like => "like",
        }
    }
}

/// Predicate tree over row keys and path values.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    /// Compares the row key against a constant.
    Key {
        /// Comparison operator.
        op: Op,
        /// Constant key.
        value: i64,
    },
    /// Compares the value stored under `path` against a constant.
    Value {
        /// Fully-qualified path.
        path: String,
        /// Comparison operator.
        op: Op,
        /// Constant operand.
        value: Value,
    },
    /// Compares the values of two paths of the same row.
    Path {
        /// Left-hand path.
        left: String,
        /// Comparison operator.
        op: Op,
        /// Right-hand path.
        right: String,
    },
    /// Constant truth value.
    Bool(bool),
    /// Conjunction.
    And(Vec<Filter>),
    /// Disjunction.
    Or(Vec<Filter>),
    /// Negation.
    Not(Box<Filter>),
}

/// Read access to one row for filter evaluation.
pub trait FilterRow {
    /// Key of the row.
    fn key(&self) -> i64;
    /// Value stored under `path`, if present.
    fn value(&self, path: &str) -> Option<&Value>;
}

impl Filter {
    /// `key <op> value`.
    pub fn key(op: Op, value: i64) -> Self {
        Filter::Key { op, value }
    }

    /// `path <op> value`.
    pub fn value(path: impl Into<String>, op: Op, value: impl Into<Value>) -> Self {
        Filter::Value {
            path: path.into(),
            op,
            value: value.into(),
        }
    }

    /// `left <op> right` over two paths.
    pub fn path(left: impl Into<String>, op: Op, right: impl Into<String>) -> Self {
        Filter::Path {
            left: left.into(),
            op,
            right: right.into(),
        }
    }

    /// Evaluates the filter against `row`. Comparisons touching a missing or
    /// incomparable value are false.
    ///
    /// Use [`Filter::compile`] when evaluating many rows.
    pub fn evaluate<R: FilterRow + ?Sized>(&self, row: &R) -> bool {
        self.compile().evaluate(row)
    }

    /// Compiles the constant `LIKE` patterns of the tree once.
    pub fn compile(&self) -> CompiledFilter<'_> {
        let mut patterns = FxHashMap::default();
        self.collect_patterns(&mut patterns);
        CompiledFilter {
            filter: self,
            patterns,
        }
    }

    fn collect_patterns<'a>(&'a self, out: &mut FxHashMap<&'a str, Option<Regex>>) {
        match self {
            Filter::Value {
                op: Op::Like,
                value,
                ..
            } => {
                if let Some(pattern) = value.as_str() {
                    out.entry(pattern).or_insert_with(|| like_regex(pattern));
                }
            }
            Filter::And(children) | Filter::Or(children) => {
                for child in children {
                    child.collect_patterns(out);
                }
            }
            Filter::Not(child) => child.collect_patterns(out),
            Filter::Key { .. } | Filter::Value { .. } | Filter::Path { .. } | Filter::Bool(_) => {}
        }
    }
}

/// A [`Filter`] ready for evaluation over many rows.
///
/// Invalid patterns compile to `None` and never match. `LIKE` between two
/// paths takes its pattern from the row and is compiled per evaluation.
pub struct CompiledFilter<'a> {
    filter: &'a Filter,
    patterns: FxHashMap<&'a str, Option<Regex>>,
}

impl CompiledFilter<'_> {
    /// Evaluates the filter against `row`.
    pub fn evaluate<R: FilterRow + ?Sized>(&self, row: &R) -> bool {
        self.eval(self.filter, row)
    }

    fn eval<R: FilterRow + ?Sized>(&self, filter: &Filter, row: &R) -> bool {
        match filter {
            Filter::Key { op, value } => op.holds(row.key().cmp(value)),
            Filter::Value { path, op, value } => match row.value(path) {
                Some(actual) => self.compare(actual, *op, value),
                None => false,
            },
            Filter::Path { left, op, right } => match (row.value(left), row.value(right)) {
                (Some(l), Some(r)) => self.compare(l, *op, r),
                _ => false,
            },
            Filter::Bool(b) => *b,
            Filter::And(children) => children.iter().all(|c| self.eval(c, row)),
            Filter::Or(children) => children.iter().any(|c| self.eval(c, row)),
            Filter::Not(child) => !self.eval(child, row),
        }
    }

    fn compare(&self, actual: &Value, op: Op, expected: &Value) -> bool {
        if op == Op::Like {
            let (Some(text), Some(pattern)) = (actual.as_str(), expected.as_str()) else {
                return false;
            };
            return match self.patterns.get(pattern) {
                Some(regex) => regex.as_ref().is_some_and(|re| re.is_match(text)),
                None => like_regex(pattern).is_some_and(|re| re.is_match(text)),
            };
        }
        actual
            .compare(expected)
            .map(|ordering| op.holds(ordering))
            .unwrap_or(false)
    }
}

fn like_regex(pattern: &str) -> Option<Regex> {
    Regex::new(&format!("^(?:{pattern})$")).ok()
}

/// `And(f1, f2)` where an absent operand is the identity.
pub fn combine(f1: Option<Filter>, f2: Option<Filter>) -> Option<Filter> {
    match (f1, f2) {
        (Some(a), Some(b)) => Some(Filter::And(vec![a, b])),
        (Some(a), None) => Some(a),
        (None, b) => b,
    }
}

/// Flattens the top-level `And` chain of `filter` into its operands.
pub fn conjuncts(filter: &Filter) -> Vec<Filter> {
    let mut out = Vec::new();
    collect_conjuncts(filter, &mut out);
    out
}

fn collect_conjuncts(filter: &Filter, out: &mut Vec<Filter>) {
    match filter {
        Filter::And(children) => {
            for child in children {
                collect_conjuncts(child, out);
            }
        }
        other => out.push(other.clone()),
    }
}

/// Key ranges a reader must visit to find every row `filter` can accept.
///
/// Only key comparisons restrict the result; every other leaf is treated as
/// unrestricted and left to row-level evaluation. The returned ranges are
/// sorted and disjoint. An empty result means no row can match.
pub fn key_ranges_from_filter(filter: Option<&Filter>) -> Vec<KeyRange> {
    match filter {
        None => vec![KeyRange::full()],
        Some(filter) => key_ranges(filter),
    }
}

fn key_ranges(filter: &Filter) -> Vec<KeyRange> {
    match filter {
        Filter::Key { op, value } => {
            let v = *value;
            let ranges = match op {
                Op::Eq => vec![KeyRange::point(v)],
                Op::Ne => vec![
                    KeyRange::new(i64::MIN, v),
                    KeyRange::new(v.saturating_add(1), i64::MAX),
                ],
                Op::Lt => vec![KeyRange::new(i64::MIN, v)],
                Op::Le => vec![KeyRange::new(i64::MIN, v.saturating_add(1))],
                Op::Gt => vec![KeyRange::new(v.saturating_add(1), i64::MAX)],
                Op::Ge => vec![KeyRange::new(v, i64::MAX)],
                Op::Like => vec![KeyRange::full()],
            };
            KeyRange::normalize(ranges)
        }
        Filter::Bool(false) => Vec::new(),
        Filter::And(children) => children.iter().fold(vec![KeyRange::full()], |acc, c| {
            KeyRange::intersect_all(&acc, &key_ranges(c))
        }),
        Filter::Or(children) => {
            KeyRange::normalize(children.iter().flat_map(key_ranges).collect())
        }
        Filter::Value { .. } | Filter::Path { .. } | Filter::Bool(true) | Filter::Not(_) => {
            vec![KeyRange::full()]
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Key { op, value } => write!(f, "key {} {}", op.symbol(), value),
            Filter::Value { path, op, value } => write!(f, "{} {} {}", path, op.symbol(), value),
            Filter::Path { left, op, right } => write!(f, "{} {} {}", left, op.symbol(), right),
            Filter::Bool(b) => write!(f, "{b}"),
            Filter::And(children) => write_joined(f, children, " && "),
            Filter::Or(children) => write_joined(f, children, " || "),
            Filter::Not(child) => write!(f, "!({child})"),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, children: &[Filter], sep: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{child}")?;
    }
    f.write_str(")")
}
