#![forbid(unsafe_code)]

//! Query compilation: predicate model, logical operator trees and the
//! rule-based rewrite engine.

/// Boolean filter trees over keys and path values.
pub mod filter;

/// Structural join algorithm selection.
pub mod join;

/// Logical operator tree.
pub mod logical;

/// Pattern-matching rewrite rules and the fixpoint optimizer.
pub mod rules;

/// Predicates over series tags.
pub mod tag;

pub use filter::{
    combine, conjuncts, key_ranges_from_filter, CompiledFilter, Filter, FilterRow, Op,
};
pub use join::{choose_join_algorithm, EquiKey, JoinAlgType, JoinAlgorithm};
pub use logical::{
    LogicalOp, LogicalPlan, NodeId, OperatorType, OuterJoinType, PlanBuilder, PlanNode,
};
pub use rules::{Optimizer, OptimizerConfig, RuleSet};
pub use tag::TagFilter;
