//! Drives registered rules over a plan until no rule applies.
//!
//! Each pass walks the tree top-down. At every node the rules are tried in
//! registration order and the first one whose pattern and gate both pass is
//! applied once; the pass then continues into the replacement's inputs.
//! Passes repeat until one of them applies nothing.

use std::sync::Arc;

use tracing::debug;

use crate::query::logical::{LogicalPlan, NodeId, NodeIdGen, PlanNode};
use crate::query::rules::pattern::RuleCall;
use crate::query::rules::rule::{RewriteContext, RuleSet};
use crate::types::{PolyError, Result};

/// Optimizer knobs.
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Passes allowed before the rewrite is declared non-terminating.
    pub max_passes: usize,
    /// Whether to record before/after explain text for every application.
    pub enable_trace: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_passes: 64,
            enable_trace: false,
        }
    }
}

impl OptimizerConfig {
    /// Sets the pass limit.
    pub fn with_max_passes(mut self, max: usize) -> Self {
        self.max_passes = max;
        self
    }

    /// Enables or disables tracing.
    pub fn with_trace(mut self, enable: bool) -> Self {
        self.enable_trace = enable;
        self
    }
}

/// Record of one rule application.
#[derive(Debug, Clone)]
pub struct RuleTrace {
    /// Rule that fired.
    pub rule_name: &'static str,
    /// Root of the matched subtree.
    pub replaced: NodeId,
    /// Root of the replacement.
    pub replacement: NodeId,
    /// Matched subtree before the rewrite (empty unless tracing).
    pub before: String,
    /// Replacement subtree (empty unless tracing).
    pub after: String,
}

/// Result of running the optimizer.
#[derive(Debug, Clone)]
pub struct OptimizedPlan {
    /// Plan at the fixpoint.
    pub plan: LogicalPlan,
    /// Passes executed, including the final pass that applied nothing.
    pub passes: usize,
    /// Total rule applications.
    pub rules_applied: usize,
    /// One entry per application.
    pub trace: Vec<RuleTrace>,
}

struct PassState<'a> {
    ids: &'a mut NodeIdGen,
    applied: usize,
    trace: &'a mut Vec<RuleTrace>,
}

/// Fixpoint rewrite engine over a shared [`RuleSet`].
pub struct Optimizer {
    rules: Arc<RuleSet>,
    config: OptimizerConfig,
}

impl Optimizer {
    /// Optimizer with default configuration.
    pub fn new(rules: Arc<RuleSet>) -> Self {
        Self::with_config(rules, OptimizerConfig::default())
    }

    /// Optimizer with custom configuration.
    pub fn with_config(rules: Arc<RuleSet>, config: OptimizerConfig) -> Self {
        Self { rules, config }
    }

    /// Rewrites `plan` until no rule applies.
    pub fn optimize(&self, plan: LogicalPlan) -> Result<OptimizedPlan> {
        let (mut root, mut ids) = plan.into_parts();
        let mut passes = 0;
        let mut rules_applied = 0;
        let mut trace = Vec::new();

        loop {
            if passes >= self.config.max_passes {
                return Err(PolyError::rewrite(
                    "optimizer",
                    format!("no fixpoint after {} passes", self.config.max_passes),
                ));
            }
            passes += 1;
            let mut state = PassState {
                ids: &mut ids,
                applied: 0,
                trace: &mut trace,
            };
            root = self.rewrite_node(root, &mut state)?;
            let applied = state.applied;
            rules_applied += applied;
            if applied == 0 {
                debug!(passes, rules_applied, "optimizer.fixpoint");
                break;
            }
        }

        Ok(OptimizedPlan {
            plan: LogicalPlan::from_parts(root, ids),
            passes,
            rules_applied,
            trace,
        })
    }

    fn rewrite_node(&self, node: PlanNode, state: &mut PassState<'_>) -> Result<PlanNode> {
        let mut node = self.apply_first_rule(node, state)?;
        let inputs = std::mem::take(&mut node.inputs);
        node.inputs = inputs
            .into_iter()
            .map(|input| self.rewrite_node(input, state))
            .collect::<Result<Vec<_>>>()?;
        Ok(node)
    }

    fn apply_first_rule(&self, node: PlanNode, state: &mut PassState<'_>) -> Result<PlanNode> {
        for rule in self.rules.iter() {
            let Some(bound) = rule.pattern().bind(&node) else {
                continue;
            };
            if !rule.matches(&RuleCall::new(bound)) {
                continue;
            }

            let replaced = node.id;
            let before_hash = node.fingerprint();
            let before = if self.config.enable_trace {
                node.explain()
            } else {
                String::new()
            };

            let mut ctx = RewriteContext::new(state.ids);
            let replacement = rule.on_match(node, &mut ctx)?;
            replacement
                .validate()
                .map_err(|reason| PolyError::rewrite(rule.name(), reason))?;
            if replacement.fingerprint() == before_hash {
                return Err(PolyError::rewrite(
                    rule.name(),
                    format!("transform of node {replaced} made no progress"),
                ));
            }

            debug!(
                rule = rule.name(),
                replaced = %replaced,
                replacement = %replacement.id,
                "optimizer.rule_applied"
            );
            state.applied += 1;
            state.trace.push(RuleTrace {
                rule_name: rule.name(),
                replaced,
                replacement: replacement.id,
                before,
                after: if self.config.enable_trace {
                    replacement.explain()
                } else {
                    String::new()
                },
            });
            return Ok(replacement);
        }
        Ok(node)
    }
}
