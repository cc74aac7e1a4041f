//! Operand patterns matched against plan subtrees.

use crate::query::logical::{OperatorType, PlanNode};

/// Node-type constraint of an operand.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeClass {
    /// Exactly this operator type.
    Of(OperatorType),
    /// Any join variant.
    AnyJoin,
}

impl NodeClass {
    /// Whether a node of type `ty` satisfies the constraint.
    pub fn accepts(self, ty: OperatorType) -> bool {
        match self {
            NodeClass::Of(expected) => expected == ty,
            NodeClass::AnyJoin => ty.is_join(),
        }
    }
}

impl From<OperatorType> for NodeClass {
    fn from(ty: OperatorType) -> Self {
        NodeClass::Of(ty)
    }
}

/// Shape a rule declares for the subtrees it rewrites.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Operand {
    /// Matches any subtree without binding it.
    Any,
    /// Matches a node of `class` whose inputs match `children` in order.
    /// An empty `children` list leaves the inputs unconstrained.
    Node {
        /// Type constraint on the node.
        class: NodeClass,
        /// Patterns for the node's inputs.
        children: Vec<Operand>,
    },
}

/// Operand constraining a node and its inputs.
pub fn operand(class: impl Into<NodeClass>, children: Vec<Operand>) -> Operand {
    Operand::Node {
        class: class.into(),
        children,
    }
}

/// Operand matching any subtree.
pub fn any() -> Operand {
    Operand::Any
}

impl Operand {
    /// Matches `node` against the pattern, returning the nodes bound by each
    /// non-`any` operand in pre-order.
    pub fn bind<'a>(&self, node: &'a PlanNode) -> Option<Vec<&'a PlanNode>> {
        let mut bound = Vec::new();
        self.bind_into(node, &mut bound).then_some(bound)
    }

    fn bind_into<'a>(&self, node: &'a PlanNode, bound: &mut Vec<&'a PlanNode>) -> bool {
        match self {
            Operand::Any => true,
            Operand::Node { class, children } => {
                if !class.accepts(node.op_type()) {
                    return false;
                }
                if !children.is_empty() && children.len() != node.inputs.len() {
                    return false;
                }
                bound.push(node);
                children
                    .iter()
                    .zip(&node.inputs)
                    .all(|(child, input)| child.bind_into(input, bound))
            }
        }
    }
}

/// Match handed to a rule's gate: the nodes bound by its pattern.
pub struct RuleCall<'a> {
    bound: Vec<&'a PlanNode>,
}

impl<'a> RuleCall<'a> {
    /// Wraps the bindings produced by [`Operand::bind`].
    pub fn new(bound: Vec<&'a PlanNode>) -> Self {
        Self { bound }
    }

    /// Node matched by the pattern's root operand.
    pub fn matched_root(&self) -> &'a PlanNode {
        self.bound[0]
    }

    /// Node bound by the `index`-th non-`any` operand in pre-order.
    pub fn bound(&self, index: usize) -> Option<&'a PlanNode> {
        self.bound.get(index).copied()
    }
}
