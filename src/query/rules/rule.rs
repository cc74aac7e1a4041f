//! Rewrite rule abstraction and the ordered rule registry.

use std::sync::Arc;

use crate::query::logical::{NodeId, NodeIdGen, PlanNode};
use crate::query::rules::filter_push_into_join::FilterPushIntoJoinCondition;
use crate::query::rules::pattern::{Operand, RuleCall};
use crate::types::Result;

/// State a transform may use while building its replacement.
pub struct RewriteContext<'a> {
    ids: &'a mut NodeIdGen,
}

impl<'a> RewriteContext<'a> {
    /// Wraps the plan's id generator.
    pub fn new(ids: &'a mut NodeIdGen) -> Self {
        Self { ids }
    }

    /// Id for a node that did not exist before the rewrite.
    pub fn fresh_id(&mut self) -> NodeId {
        self.ids.next_id()
    }
}

/// A pattern-driven rewrite of a plan subtree.
///
/// The engine calls [`Rule::matches`] only after [`Rule::pattern`] matched
/// structurally, and [`Rule::on_match`] only when the gate passed. The
/// transform receives ownership of the matched subtree and returns the node
/// that takes its place in the parent.
pub trait Rule: Send + Sync {
    /// Unique rule name.
    fn name(&self) -> &'static str;

    /// Family the rule belongs to.
    fn group(&self) -> &'static str {
        "default"
    }

    /// Shape of the subtrees the rule rewrites.
    fn pattern(&self) -> &Operand;

    /// Gate evaluated on a structural match.
    fn matches(&self, _call: &RuleCall<'_>) -> bool {
        true
    }

    /// Builds the replacement for the matched subtree.
    fn on_match(&self, root: PlanNode, ctx: &mut RewriteContext<'_>) -> Result<PlanNode>;
}

/// Immutable, ordered rule registry. Earlier rules win at a node.
#[derive(Clone)]
pub struct RuleSet {
    rules: Vec<Arc<dyn Rule>>,
}

impl RuleSet {
    /// Empty registry.
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Appends `rule` after every rule registered so far.
    pub fn with_rule(mut self, rule: impl Rule + 'static) -> Self {
        self.rules.push(Arc::new(rule));
        self
    }

    /// Rules in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Rule>> {
        self.rules.iter()
    }

    /// Number of registered rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no rule is registered.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Names of the registered rules, in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        RuleSet::new().with_rule(FilterPushIntoJoinCondition::new())
    }
}
