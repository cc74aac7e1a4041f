//! Logical operator tree rewritten by the rule engine.

use std::fmt::{self, Write as _};
use std::hash::Hasher;

use rustc_hash::FxHashSet;
use xxhash_rust::xxh64::Xxh64;

use crate::query::filter::Filter;
use crate::query::join::{choose_join_algorithm, JoinAlgorithm};
use crate::query::tag::TagFilter;

/// Identifier of a node, stable for the lifetime of one compilation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out fresh node ids for one plan.
#[derive(Clone, Debug, Default)]
pub struct NodeIdGen {
    next: u32,
}

impl NodeIdGen {
    /// Starts allocating at `next`.
    pub fn starting_at(next: u32) -> Self {
        Self { next }
    }

    /// Returns a fresh id.
    pub fn next_id(&mut self) -> NodeId {
        let id = NodeId(self.next);
        self.next += 1;
        id
    }
}

/// Type tag of a logical operator.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum OperatorType {
    /// Leaf reading one input fragment.
    Source,
    /// Path projection.
    Project,
    /// Row selection.
    Select,
    /// Filtered inner join.
    InnerJoin,
    /// Cartesian product.
    CrossJoin,
    /// Left/right/full outer join.
    OuterJoin,
}

impl OperatorType {
    /// Whether the type is one of the join variants.
    pub fn is_join(self) -> bool {
        matches!(
            self,
            OperatorType::InnerJoin | OperatorType::CrossJoin | OperatorType::OuterJoin
        )
    }

    /// Number of inputs a node of this type owns.
    pub fn arity(self) -> usize {
        match self {
            OperatorType::Source => 0,
            OperatorType::Project | OperatorType::Select => 1,
            OperatorType::InnerJoin | OperatorType::CrossJoin | OperatorType::OuterJoin => 2,
        }
    }
}

/// Null-extension side of an outer join.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum OuterJoinType {
    /// Keep unmatched left rows.
    Left,
    /// Keep unmatched right rows.
    Right,
    /// Keep unmatched rows of both inputs.
    Full,
}

/// Logical operators.
#[derive(Clone, Debug, PartialEq)]
pub enum LogicalOp {
    /// Reads one fragment of a storage unit.
    Source {
        /// Name of the fragment or storage unit.
        name: String,
    },
    /// Keeps only the listed paths.
    Project {
        /// Projected paths (may contain `*`).
        paths: Vec<String>,
        /// Optional tag restriction.
        tag_filter: Option<TagFilter>,
    },
    /// Keeps rows satisfying `filter` and `tag_filter`.
    Select {
        /// Row predicate.
        filter: Filter,
        /// Optional tag restriction.
        tag_filter: Option<TagFilter>,
    },
    /// Inner join with a join condition.
    InnerJoin {
        /// Path prefix of the left input.
        prefix_a: String,
        /// Path prefix of the right input.
        prefix_b: String,
        /// Join condition, `None` when always true.
        filter: Option<Filter>,
        /// Optional tag restriction.
        tag_filter: Option<TagFilter>,
        /// Algorithm chosen for the current filter.
        algorithm: JoinAlgorithm,
    },
    /// Cartesian product of both inputs.
    CrossJoin {
        /// Path prefix of the left input.
        prefix_a: String,
        /// Path prefix of the right input.
        prefix_b: String,
    },
    /// Outer join with a join condition.
    OuterJoin {
        /// Which side is null-extended.
        outer_type: OuterJoinType,
        /// Path prefix of the left input.
        prefix_a: String,
        /// Path prefix of the right input.
        prefix_b: String,
        /// Join condition.
        filter: Option<Filter>,
        /// Optional tag restriction.
        tag_filter: Option<TagFilter>,
    },
}

impl LogicalOp {
    /// Type tag of this operator.
    pub fn op_type(&self) -> OperatorType {
        match self {
            LogicalOp::Source { .. } => OperatorType::Source,
            LogicalOp::Project { .. } => OperatorType::Project,
            LogicalOp::Select { .. } => OperatorType::Select,
            LogicalOp::InnerJoin { .. } => OperatorType::InnerJoin,
            LogicalOp::CrossJoin { .. } => OperatorType::CrossJoin,
            LogicalOp::OuterJoin { .. } => OperatorType::OuterJoin,
        }
    }

    /// Inner join whose algorithm is chosen from `filter`.
    pub fn inner_join(
        prefix_a: impl Into<String>,
        prefix_b: impl Into<String>,
        filter: Option<Filter>,
        tag_filter: Option<TagFilter>,
    ) -> Self {
        let (prefix_a, prefix_b) = (prefix_a.into(), prefix_b.into());
        let algorithm = choose_join_algorithm(&prefix_a, &prefix_b, filter.as_ref());
        LogicalOp::InnerJoin {
            prefix_a,
            prefix_b,
            filter,
            tag_filter,
            algorithm,
        }
    }

    /// Re-runs join algorithm selection after the join filter changed. A no-op
    /// for every other operator.
    pub fn rechoose_join_algorithm(&mut self) {
        if let LogicalOp::InnerJoin {
            prefix_a,
            prefix_b,
            filter,
            algorithm,
            ..
        } = self
        {
            *algorithm = choose_join_algorithm(prefix_a, prefix_b, filter.as_ref());
        }
    }
}

/// Node of the plan tree; owns its inputs exclusively.
#[derive(Clone, Debug, PartialEq)]
pub struct PlanNode {
    /// Stable identifier.
    pub id: NodeId,
    /// Operator at this node.
    pub op: LogicalOp,
    /// Inputs, left to right.
    pub inputs: Vec<PlanNode>,
}

impl PlanNode {
    /// Creates a node with the given inputs.
    pub fn new(id: NodeId, op: LogicalOp, inputs: Vec<PlanNode>) -> Self {
        Self { id, op, inputs }
    }

    /// Type tag of the operator at this node.
    pub fn op_type(&self) -> OperatorType {
        self.op.op_type()
    }

    /// Number of nodes in the subtree.
    pub fn node_count(&self) -> usize {
        1 + self.inputs.iter().map(PlanNode::node_count).sum::<usize>()
    }

    /// Pre-order iterator over the subtree.
    pub fn iter(&self) -> impl Iterator<Item = &PlanNode> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.inputs.iter().rev());
            Some(node)
        })
    }

    /// Checks operator arities and id uniqueness across the subtree.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = FxHashSet::default();
        for node in self.iter() {
            let expected = node.op_type().arity();
            if node.inputs.len() != expected {
                return Err(format!(
                    "{:?} node {} has {} inputs, expected {}",
                    node.op_type(),
                    node.id,
                    node.inputs.len(),
                    expected
                ));
            }
            if !seen.insert(node.id) {
                return Err(format!("node id {} appears more than once", node.id));
            }
        }
        Ok(())
    }

    /// Deterministic hash of the subtree's operators, ignoring node ids.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = Xxh64::new(0);
        hash_node(self, &mut hasher);
        hasher.finish()
    }

    /// Indented, one-operator-per-line rendering of the subtree.
    pub fn explain(&self) -> String {
        let mut out = String::new();
        explain_node(self, 0, &mut out);
        out
    }
}

/// Logical plan for one query compilation.
#[derive(Clone, Debug)]
pub struct LogicalPlan {
    /// Root of the tree.
    pub root: PlanNode,
    ids: NodeIdGen,
}

impl LogicalPlan {
    /// Wraps `root`; fresh ids continue after the largest id in the tree.
    pub fn new(root: PlanNode) -> Self {
        let next = root.iter().map(|n| n.id.0 + 1).max().unwrap_or(0);
        Self {
            root,
            ids: NodeIdGen::starting_at(next),
        }
    }

    /// Splits the plan into its root and id generator.
    pub fn into_parts(self) -> (PlanNode, NodeIdGen) {
        (self.root, self.ids)
    }

    /// Rebuilds a plan from parts produced by [`LogicalPlan::into_parts`].
    pub fn from_parts(root: PlanNode, ids: NodeIdGen) -> Self {
        Self { root, ids }
    }

    /// Renders the whole plan.
    pub fn explain(&self) -> String {
        self.root.explain()
    }
}

/// Builds plan trees with fresh ids, mostly for planners and tests.
#[derive(Debug, Default)]
pub struct PlanBuilder {
    ids: NodeIdGen,
}

impl PlanBuilder {
    /// Creates a builder allocating ids from zero.
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&mut self, op: LogicalOp, inputs: Vec<PlanNode>) -> PlanNode {
        PlanNode::new(self.ids.next_id(), op, inputs)
    }

    /// Source leaf.
    pub fn source(&mut self, name: impl Into<String>) -> PlanNode {
        self.node(LogicalOp::Source { name: name.into() }, Vec::new())
    }

    /// Projection over `input`.
    pub fn project(&mut self, input: PlanNode, paths: Vec<String>) -> PlanNode {
        self.node(
            LogicalOp::Project {
                paths,
                tag_filter: None,
            },
            vec![input],
        )
    }

    /// Selection over `input`.
    pub fn select(
        &mut self,
        input: PlanNode,
        filter: Filter,
        tag_filter: Option<TagFilter>,
    ) -> PlanNode {
        self.node(LogicalOp::Select { filter, tag_filter }, vec![input])
    }

    /// Cross join of `left` and `right`.
    pub fn cross_join(
        &mut self,
        left: PlanNode,
        right: PlanNode,
        prefix_a: impl Into<String>,
        prefix_b: impl Into<String>,
    ) -> PlanNode {
        self.node(
            LogicalOp::CrossJoin {
                prefix_a: prefix_a.into(),
                prefix_b: prefix_b.into(),
            },
            vec![left, right],
        )
    }

    /// Inner join of `left` and `right` with its algorithm already chosen.
    pub fn inner_join(
        &mut self,
        left: PlanNode,
        right: PlanNode,
        prefix_a: impl Into<String>,
        prefix_b: impl Into<String>,
        filter: Option<Filter>,
    ) -> PlanNode {
        self.node(
            LogicalOp::inner_join(prefix_a, prefix_b, filter, None),
            vec![left, right],
        )
    }

    /// Outer join of `left` and `right`.
    pub fn outer_join(
        &mut self,
        left: PlanNode,
        right: PlanNode,
        outer_type: OuterJoinType,
        prefix_a: impl Into<String>,
        prefix_b: impl Into<String>,
        filter: Option<Filter>,
    ) -> PlanNode {
        self.node(
            LogicalOp::OuterJoin {
                outer_type,
                prefix_a: prefix_a.into(),
                prefix_b: prefix_b.into(),
                filter,
                tag_filter: None,
            },
            vec![left, right],
        )
    }

    /// Finishes the plan, keeping the id generator for later rewrites.
    pub fn build(self, root: PlanNode) -> LogicalPlan {
        LogicalPlan::from_parts(root, self.ids)
    }
}

fn op_name(op: &LogicalOp) -> &'static str {
    match op {
        LogicalOp::Source { .. } => "Source",
        LogicalOp::Project { .. } => "Project",
        LogicalOp::Select { .. } => "Select",
        LogicalOp::InnerJoin { .. } => "InnerJoin",
        LogicalOp::CrossJoin { .. } => "CrossJoin",
        LogicalOp::OuterJoin { .. } => "OuterJoin",
    }
}

fn op_props(op: &LogicalOp) -> Vec<(&'static str, String)> {
    fn opt<T: fmt::Display>(value: &Option<T>) -> String {
        value
            .as_ref()
            .map_or_else(|| "none".to_string(), ToString::to_string)
    }
    match op {
        LogicalOp::Source { name } => vec![("name", name.clone())],
        LogicalOp::Project { paths, tag_filter } => {
            vec![("paths", paths.join(",")), ("tags", opt(tag_filter))]
        }
        LogicalOp::Select { filter, tag_filter } => {
            vec![("filter", filter.to_string()), ("tags", opt(tag_filter))]
        }
        LogicalOp::InnerJoin {
            prefix_a,
            prefix_b,
            filter,
            tag_filter,
            algorithm,
        } => vec![
            ("prefixes", format!("{prefix_a},{prefix_b}")),
            ("filter", opt(filter)),
            ("tags", opt(tag_filter)),
            ("alg", algorithm.to_string()),
        ],
        LogicalOp::CrossJoin { prefix_a, prefix_b } => {
            vec![("prefixes", format!("{prefix_a},{prefix_b}"))]
        }
        LogicalOp::OuterJoin {
            outer_type,
            prefix_a,
            prefix_b,
            filter,
            tag_filter,
        } => vec![
            ("type", format!("{outer_type:?}")),
            ("prefixes", format!("{prefix_a},{prefix_b}")),
            ("filter", opt(filter)),
            ("tags", opt(tag_filter)),
        ],
    }
}

fn hash_node(node: &PlanNode, hasher: &mut Xxh64) {
    hasher.write(op_name(&node.op).as_bytes());
    for (key, value) in op_props(&node.op) {
        hasher.write(key.as_bytes());
        hasher.write(value.as_bytes());
    }
    hasher.write_u64(node.inputs.len() as u64);
    for child in &node.inputs {
        hash_node(child, hasher);
    }
}

fn explain_node(node: &PlanNode, depth: usize, out: &mut String) {
    let props = op_props(&node.op)
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ");
    let _ = writeln!(
        out,
        "{:indent$}{}{} [{}]",
        "",
        op_name(&node.op),
        node.id,
        props,
        indent = depth * 2
    );
    for child in &node.inputs {
        explain_node(child, depth + 1, out);
    }
}
