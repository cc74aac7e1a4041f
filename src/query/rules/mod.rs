//! Rule-based plan rewriting.

pub mod filter_push_into_join;
pub mod optimizer;
pub mod pattern;
pub mod rule;

pub use filter_push_into_join::FilterPushIntoJoinCondition;
pub use optimizer::{OptimizedPlan, Optimizer, OptimizerConfig, RuleTrace};
pub use pattern::{any, operand, NodeClass, Operand, RuleCall};
pub use rule::{RewriteContext, Rule, RuleSet};
