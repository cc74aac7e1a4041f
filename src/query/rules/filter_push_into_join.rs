//! Pushes a selection into the condition of the inner or cross join below it.

use crate::query::filter::combine;
use crate::query::logical::{LogicalOp, OperatorType, PlanNode};
use crate::query::rules::pattern::{any, operand, NodeClass, Operand, RuleCall};
use crate::query::rules::rule::{RewriteContext, Rule};
use crate::types::{PolyError, Result};

const NAME: &str = "FilterPushIntoJoinConditionRule";

/// Rewrites `Select(Join(a, b))` into a join carrying the selection.
///
/// A cross join becomes an inner join filtered by the selection; an inner join
/// absorbs the selection into its condition. Outer joins are left alone since
/// moving the predicate would change which rows get null-extended.
pub struct FilterPushIntoJoinCondition {
    pattern: Operand,
}

impl FilterPushIntoJoinCondition {
    /// Creates the rule with its `Select(join(any, any))` pattern.
    pub fn new() -> Self {
        Self {
            pattern: operand(
                OperatorType::Select,
                vec![operand(NodeClass::AnyJoin, vec![any(), any()])],
            ),
        }
    }
}

impl Default for FilterPushIntoJoinCondition {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for FilterPushIntoJoinCondition {
    fn name(&self) -> &'static str {
        NAME
    }

    fn group(&self) -> &'static str {
        "FilterPushDownRule"
    }

    fn pattern(&self) -> &Operand {
        &self.pattern
    }

    fn matches(&self, call: &RuleCall<'_>) -> bool {
        call.bound(1).is_some_and(|join| {
            matches!(
                join.op_type(),
                OperatorType::InnerJoin | OperatorType::CrossJoin
            )
        })
    }

    fn on_match(&self, root: PlanNode, ctx: &mut RewriteContext<'_>) -> Result<PlanNode> {
        let PlanNode {
            op: LogicalOp::Select { filter, tag_filter },
            mut inputs,
            ..
        } = root
        else {
            return Err(PolyError::rewrite(NAME, "matched root is not a Select"));
        };
        let join = match (inputs.pop(), inputs.is_empty()) {
            (Some(join), true) => join,
            _ => return Err(PolyError::rewrite(NAME, "Select must have exactly one input")),
        };
        let PlanNode {
            id,
            op,
            inputs: join_inputs,
        } = join;
        match op {
            LogicalOp::CrossJoin { prefix_a, prefix_b } => {
                let op = LogicalOp::inner_join(prefix_a, prefix_b, Some(filter), None);
                Ok(PlanNode::new(ctx.fresh_id(), op, join_inputs))
            }
            LogicalOp::InnerJoin {
                prefix_a,
                prefix_b,
                filter: existing,
                algorithm,
                ..
            } => {
                let mut op = LogicalOp::InnerJoin {
                    prefix_a,
                    prefix_b,
                    filter: combine(existing, Some(filter)),
                    tag_filter,
                    algorithm,
                };
                op.rechoose_join_algorithm();
                Ok(PlanNode::new(id, op, join_inputs))
            }
            other => Err(PolyError::rewrite(
                NAME,
                format!("cannot push a selection into {:?}", other.op_type()),
            )),
        }
    }
}
