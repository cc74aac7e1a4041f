#![allow(missing_docs)]

use std::sync::Arc;

use polystore::query::{
    combine, EquiKey, Filter, JoinAlgType, JoinAlgorithm, LogicalOp, LogicalPlan, Op, Optimizer,
    OptimizerConfig, OperatorType, OuterJoinType, PlanBuilder, PlanNode, RuleSet, TagFilter,
};
use polystore::types::Result;

fn optimizer() -> Optimizer {
    Optimizer::new(Arc::new(RuleSet::default()))
}

fn inner_join_parts(node: &PlanNode) -> (&Option<Filter>, &Option<TagFilter>, &JoinAlgorithm) {
    match &node.op {
        LogicalOp::InnerJoin {
            filter,
            tag_filter,
            algorithm,
            ..
        } => (filter, tag_filter, algorithm),
        other => panic!("expected inner join, got {other:?}"),
    }
}

#[test]
fn select_over_cross_join_becomes_inner_join() -> Result<()> {
    let mut b = PlanBuilder::new();
    let left = b.source("left");
    let right = b.source("right");
    let (left_copy, right_copy) = (left.clone(), right.clone());
    let cross = b.cross_join(left, right, "l", "r");
    let filter = Filter::path("l.id", Op::Eq, "r.id");
    let select = b.select(cross, filter.clone(), Some(TagFilter::base("host", "a")));
    let plan = b.build(select);

    let out = optimizer().optimize(plan)?;
    let root = &out.plan.root;
    assert_eq!(root.op_type(), OperatorType::InnerJoin);
    assert!(root.iter().all(|n| n.op_type() != OperatorType::Select));
    assert_eq!(root.inputs, vec![left_copy, right_copy]);

    let (join_filter, tag_filter, algorithm) = inner_join_parts(root);
    assert_eq!(join_filter.as_ref(), Some(&filter));
    assert_eq!(tag_filter, &None);
    assert_eq!(algorithm.alg_type(), JoinAlgType::HashJoin);
    assert_eq!(out.rules_applied, 1);
    Ok(())
}

#[test]
fn select_over_inner_join_is_absorbed() -> Result<()> {
    let mut b = PlanBuilder::new();
    let left = b.source("left");
    let right = b.source("right");
    let existing = Filter::value("l.v", Op::Gt, 1i64);
    let join = b.inner_join(left, right, "l", "r", Some(existing.clone()));
    let join_id = join.id;
    let pushed = Filter::value("r.w", Op::Lt, 5i64);
    let tags = TagFilter::base("dc", "eu");
    let select = b.select(join, pushed.clone(), Some(tags.clone()));
    let plan = b.build(select);

    let out = optimizer().optimize(plan)?;
    let root = &out.plan.root;
    assert_eq!(root.id, join_id);
    let (join_filter, tag_filter, algorithm) = inner_join_parts(root);
    assert_eq!(join_filter, &combine(Some(existing), Some(pushed)));
    assert_eq!(tag_filter, &Some(tags));
    assert_eq!(algorithm, &JoinAlgorithm::NestedLoop);
    Ok(())
}

#[test]
fn rewrite_is_idempotent() -> Result<()> {
    let mut b = PlanBuilder::new();
    let left = b.source("left");
    let right = b.source("right");
    let cross = b.cross_join(left, right, "l", "r");
    let select = b.select(cross, Filter::path("l.id", Op::Eq, "r.id"), None);
    let plan = b.build(select);

    let first = optimizer().optimize(plan)?;
    let rewritten = first.plan.root.clone();
    let second = optimizer().optimize(first.plan)?;
    assert_eq!(second.rules_applied, 0);
    assert_eq!(second.passes, 1);
    assert_eq!(second.plan.root, rewritten);
    Ok(())
}

#[test]
fn outer_join_keeps_its_selection() -> Result<()> {
    let mut b = PlanBuilder::new();
    let left = b.source("left");
    let right = b.source("right");
    let outer = b.outer_join(left, right, OuterJoinType::Left, "l", "r", None);
    let select = b.select(outer, Filter::value("r.v", Op::Eq, 3i64), None);
    let plan = b.build(select);
    let before = plan.root.clone();

    let out = optimizer().optimize(plan)?;
    assert_eq!(out.rules_applied, 0);
    assert_eq!(out.plan.root, before);
    Ok(())
}

#[test]
fn equality_plus_range_picks_hash_join_with_residual() {
    let filter = Filter::And(vec![
        Filter::path("l.id", Op::Eq, "r.id"),
        Filter::value("l.v", Op::Gt, 1i64),
    ]);
    let op = LogicalOp::inner_join("l", "r", Some(filter), None);
    let LogicalOp::InnerJoin { algorithm, .. } = op else {
        panic!("inner_join builds an inner join");
    };
    assert_eq!(
        algorithm,
        JoinAlgorithm::Hash {
            keys: vec![EquiKey {
                left: "l.id".into(),
                right: "r.id".into(),
            }],
            residual: Some(Filter::value("l.v", Op::Gt, 1i64)),
        }
    );
}

#[test]
fn stacked_selections_reach_fixpoint_over_several_passes() -> Result<()> {
    let mut b = PlanBuilder::new();
    let left = b.source("left");
    let right = b.source("right");
    let cross = b.cross_join(left, right, "l", "r");
    let inner = Filter::path("r.id", Op::Eq, "l.id");
    let outer = Filter::value("l.v", Op::Ge, 10i64);
    let lower = b.select(cross, inner.clone(), None);
    let upper = b.select(lower, outer.clone(), None);
    let plan = b.build(upper);

    let out = optimizer().optimize(plan)?;
    assert_eq!(out.rules_applied, 2);
    assert_eq!(out.passes, 3);
    let root = &out.plan.root;
    assert_eq!(root.node_count(), 3);
    let (join_filter, _, algorithm) = inner_join_parts(root);
    assert_eq!(join_filter, &Some(Filter::And(vec![inner, outer.clone()])));
    match algorithm {
        JoinAlgorithm::Hash { keys, residual } => {
            assert_eq!(keys[0].left, "l.id");
            assert_eq!(keys[0].right, "r.id");
            assert_eq!(residual.as_ref(), Some(&outer));
        }
        other => panic!("expected hash join, got {other}"),
    }
    Ok(())
}

#[test]
fn trace_records_replaced_and_replacement_nodes() -> Result<()> {
    let mut b = PlanBuilder::new();
    let left = b.source("left");
    let right = b.source("right");
    let cross = b.cross_join(left, right, "l", "r");
    let select = b.select(cross, Filter::Bool(true), None);
    let select_id = select.id;
    let plan = LogicalPlan::new(select);

    let optimizer = Optimizer::with_config(
        Arc::new(RuleSet::default()),
        OptimizerConfig::default().with_trace(true),
    );
    let out = optimizer.optimize(plan)?;
    assert_eq!(out.trace.len(), 1);
    let entry = &out.trace[0];
    assert_eq!(entry.rule_name, "FilterPushIntoJoinConditionRule");
    assert_eq!(entry.replaced, select_id);
    assert_eq!(entry.replacement, out.plan.root.id);
    assert_ne!(entry.replacement, select_id);
    assert!(entry.before.contains("Select"));
    assert!(entry.after.starts_with("InnerJoin"));
    Ok(())
}

#[test]
fn selection_below_projection_is_still_pushed() -> Result<()> {
    let mut b = PlanBuilder::new();
    let left = b.source("left");
    let right = b.source("right");
    let cross = b.cross_join(left, right, "l", "r");
    let select = b.select(cross, Filter::path("l.k", Op::Eq, "r.k"), None);
    let project = b.project(select, vec!["l.k".into(), "r.v".into()]);
    let project_id = project.id;
    let plan = b.build(project);

    let out = optimizer().optimize(plan)?;
    let root = &out.plan.root;
    assert_eq!(root.id, project_id);
    assert_eq!(root.inputs[0].op_type(), OperatorType::InnerJoin);
    Ok(())
}
