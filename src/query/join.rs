//! Structural join algorithm selection.
//!
//! No statistics are modelled, so the choice is driven purely by the shape of
//! the join filter: any cross-side path equality makes the join hashable.

use std::fmt;

use crate::query::filter::{conjuncts, Filter, Op};

/// Algorithm tag assigned to a join node.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum JoinAlgType {
    /// Build a hash table on the equi-join keys.
    HashJoin,
    /// Evaluate the filter against every input pair.
    NestedLoopJoin,
}

/// One equality between a path of the left input and one of the right input.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct EquiKey {
    /// Path under the left input's prefix.
    pub left: String,
    /// Path under the right input's prefix.
    pub right: String,
}

/// Execution strategy chosen for a join.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum JoinAlgorithm {
    /// Full filter evaluated per input pair.
    #[default]
    NestedLoop,
    /// Hash join on the composite of `keys`; `residual` is evaluated on every
    /// matched pair.
    Hash {
        /// Equi-join key pairs, in conjunct order.
        keys: Vec<EquiKey>,
        /// Remaining non-equi conjuncts, `None` when there are none.
        residual: Option<Filter>,
    },
}

impl JoinAlgorithm {
    /// Tag of the chosen algorithm.
    pub fn alg_type(&self) -> JoinAlgType {
        match self {
            JoinAlgorithm::NestedLoop => JoinAlgType::NestedLoopJoin,
            JoinAlgorithm::Hash { .. } => JoinAlgType::HashJoin,
        }
    }
}

impl fmt::Display for JoinAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinAlgorithm::NestedLoop => f.write_str("nested-loop"),
            JoinAlgorithm::Hash { keys, residual } => {
                f.write_str("hash[")?;
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}={}", key.left, key.right)?;
                }
                f.write_str("]")?;
                if let Some(residual) = residual {
                    write!(f, " residual {residual}")?;
                }
                Ok(())
            }
        }
    }
}

fn under_prefix(path: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return false;
    }
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('.'))
}

fn equi_key(filter: &Filter, prefix_a: &str, prefix_b: &str) -> Option<EquiKey> {
    let Filter::Path {
        left,
        op: Op::Eq,
        right,
    } = filter
    else {
        return None;
    };
    if under_prefix(left, prefix_a) && under_prefix(right, prefix_b) {
        Some(EquiKey {
            left: left.clone(),
            right: right.clone(),
        })
    } else if under_prefix(right, prefix_a) && under_prefix(left, prefix_b) {
        Some(EquiKey {
            left: right.clone(),
            right: left.clone(),
        })
    } else {
        None
    }
}

/// Picks hash join when the filter has at least one cross-side equality,
/// nested-loop join otherwise.
pub fn choose_join_algorithm(
    prefix_a: &str,
    prefix_b: &str,
    filter: Option<&Filter>,
) -> JoinAlgorithm {
    let Some(filter) = filter else {
        return JoinAlgorithm::NestedLoop;
    };
    let mut keys = Vec::new();
    let mut rest = Vec::new();
    for conjunct in conjuncts(filter) {
        match equi_key(&conjunct, prefix_a, prefix_b) {
            Some(key) => keys.push(key),
            None => rest.push(conjunct),
        }
    }
    if keys.is_empty() {
        return JoinAlgorithm::NestedLoop;
    }
    let residual = match rest.len() {
        0 => None,
        1 => rest.pop(),
        _ => Some(Filter::And(rest)),
    };
    JoinAlgorithm::Hash { keys, residual }
}
