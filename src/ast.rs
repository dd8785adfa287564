//! Criteria abstract syntax tree
//!
//! A rule's match condition is a tree of logical nodes (and/or/not) over
//! function leaves (from, to, subject, ...). Trees are built once per rule,
//! simplified into a canonical form, and then consumed by the two backends:
//! the criteria generator and the test interpreter.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Logical operation of an inner tree node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    And,
    Or,
    Not,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationType::And => write!(f, "and"),
            OperationType::Or => write!(f, "or"),
            OperationType::Not => write!(f, "not"),
        }
    }
}

/// Match function of a leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionType {
    From,
    To,
    Cc,
    Bcc,
    ReplyTo,
    Subject,
    List,
    Has,
    /// Free-form Gmail query, passed through without escaping
    Query,
}

impl FunctionType {
    /// Gmail search-syntax name of the function
    pub fn query_name(&self) -> &'static str {
        match self {
            FunctionType::From => "from",
            FunctionType::To => "to",
            FunctionType::Cc => "cc",
            FunctionType::Bcc => "bcc",
            FunctionType::ReplyTo => "replyto",
            FunctionType::Subject => "subject",
            FunctionType::List => "list",
            FunctionType::Has => "has",
            FunctionType::Query => "query",
        }
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.query_name())
    }
}

/// Operator combining the arguments of a multi-argument leaf
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum GroupingType {
    /// Single-argument leaf, no grouping needed
    #[default]
    None,
    And,
    Or,
}

impl GroupingType {
    /// The grouping corresponding to a logical operation, if any
    pub fn from_operation(op: OperationType) -> Option<GroupingType> {
        match op {
            OperationType::And => Some(GroupingType::And),
            OperationType::Or => Some(GroupingType::Or),
            OperationType::Not => None,
        }
    }
}

/// One node of a rule's criteria tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CriteriaNode {
    /// Logical combination of child criteria
    Node {
        operation: OperationType,
        children: Vec<CriteriaNode>,
    },
    /// Field matcher with one or more operands
    Leaf {
        function: FunctionType,
        grouping: GroupingType,
        args: Vec<String>,
        /// Operands are already valid Gmail query syntax and must not be escaped
        is_raw: bool,
    },
}

impl CriteriaNode {
    /// Builds an `and` node
    pub fn and(children: Vec<CriteriaNode>) -> Self {
        CriteriaNode::Node {
            operation: OperationType::And,
            children,
        }
    }

    /// Builds an `or` node
    pub fn or(children: Vec<CriteriaNode>) -> Self {
        CriteriaNode::Node {
            operation: OperationType::Or,
            children,
        }
    }

    /// Builds a `not` node around a single child
    pub fn not(child: CriteriaNode) -> Self {
        CriteriaNode::Node {
            operation: OperationType::Not,
            children: vec![child],
        }
    }

    /// Builds a single-operand leaf
    pub fn leaf(function: FunctionType, arg: impl Into<String>) -> Self {
        CriteriaNode::Leaf {
            function,
            grouping: GroupingType::None,
            args: vec![arg.into()],
            is_raw: false,
        }
    }

    /// Builds a multi-operand leaf with an explicit grouping
    pub fn grouped_leaf(function: FunctionType, grouping: GroupingType, args: Vec<String>) -> Self {
        CriteriaNode::Leaf {
            function,
            grouping,
            args,
            is_raw: false,
        }
    }

    /// Builds a raw (unescaped) single-operand leaf
    pub fn raw_leaf(function: FunctionType, arg: impl Into<String>) -> Self {
        CriteriaNode::Leaf {
            function,
            grouping: GroupingType::None,
            args: vec![arg.into()],
            is_raw: true,
        }
    }

    /// Whether this node is a leaf
    pub fn is_leaf(&self) -> bool {
        matches!(self, CriteriaNode::Leaf { .. })
    }

    /// Operation of this node, if it is a logical node
    pub fn operation(&self) -> Option<OperationType> {
        match self {
            CriteriaNode::Node { operation, .. } => Some(*operation),
            CriteriaNode::Leaf { .. } => None,
        }
    }

    /// Size heuristic used by the splitter: one unit per leaf argument
    /// plus one unit per logical node.
    pub fn size(&self) -> usize {
        match self {
            CriteriaNode::Node { children, .. } => {
                1 + children.iter().map(CriteriaNode::size).sum::<usize>()
            }
            CriteriaNode::Leaf { args, .. } => args.len(),
        }
    }

    /// Whether the tree is OR-rooted for splitting purposes: either a
    /// logical `or` node or a leaf whose arguments are or-grouped.
    pub fn is_or_rooted(&self) -> bool {
        match self {
            CriteriaNode::Node { operation, .. } => *operation == OperationType::Or,
            CriteriaNode::Leaf { grouping, args, .. } => {
                *grouping == GroupingType::Or && args.len() > 1
            }
        }
    }

    /// Total ordering used by the canonical sort: leaves before nodes,
    /// leaves by (grouping, function, args), nodes by (operation, children).
    pub fn canonical_cmp(&self, other: &CriteriaNode) -> Ordering {
        match (self, other) {
            (CriteriaNode::Leaf { .. }, CriteriaNode::Node { .. }) => Ordering::Less,
            (CriteriaNode::Node { .. }, CriteriaNode::Leaf { .. }) => Ordering::Greater,
            (
                CriteriaNode::Leaf {
                    function: f1,
                    grouping: g1,
                    args: a1,
                    is_raw: r1,
                },
                CriteriaNode::Leaf {
                    function: f2,
                    grouping: g2,
                    args: a2,
                    is_raw: r2,
                },
            ) => g1
                .cmp(g2)
                .then(f1.cmp(f2))
                .then_with(|| a1.cmp(a2))
                .then(r1.cmp(r2)),
            (
                CriteriaNode::Node {
                    operation: o1,
                    children: c1,
                },
                CriteriaNode::Node {
                    operation: o2,
                    children: c2,
                },
            ) => o1.cmp(o2).then_with(|| {
                for (l, r) in c1.iter().zip(c2.iter()) {
                    let ord = l.canonical_cmp(r);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                c1.len().cmp(&c2.len())
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_counts_args_and_nodes() {
        // or(from:{a b}, not(to:c)) = 1 (or) + 2 (args) + 1 (not) + 1 (arg)
        let tree = CriteriaNode::or(vec![
            CriteriaNode::grouped_leaf(
                FunctionType::From,
                GroupingType::Or,
                vec!["a".into(), "b".into()],
            ),
            CriteriaNode::not(CriteriaNode::leaf(FunctionType::To, "c")),
        ]);
        assert_eq!(tree.size(), 5);
    }

    #[test]
    fn test_or_rooted_detection() {
        let or_node = CriteriaNode::or(vec![CriteriaNode::leaf(FunctionType::From, "a")]);
        assert!(or_node.is_or_rooted());

        let or_leaf = CriteriaNode::grouped_leaf(
            FunctionType::From,
            GroupingType::Or,
            vec!["a".into(), "b".into()],
        );
        assert!(or_leaf.is_or_rooted());

        let single = CriteriaNode::leaf(FunctionType::From, "a");
        assert!(!single.is_or_rooted());

        let and_node = CriteriaNode::and(vec![single]);
        assert!(!and_node.is_or_rooted());
    }

    #[test]
    fn test_canonical_cmp_leaves_before_nodes() {
        let leaf = CriteriaNode::leaf(FunctionType::Subject, "x");
        let node = CriteriaNode::and(vec![CriteriaNode::leaf(FunctionType::From, "a")]);
        assert_eq!(leaf.canonical_cmp(&node), Ordering::Less);
        assert_eq!(node.canonical_cmp(&leaf), Ordering::Greater);
    }

    #[test]
    fn test_canonical_cmp_orders_by_function() {
        let from = CriteriaNode::leaf(FunctionType::From, "a");
        let subject = CriteriaNode::leaf(FunctionType::Subject, "a");
        assert_eq!(from.canonical_cmp(&subject), Ordering::Less);
    }

    #[test]
    fn test_serde_round_trip() {
        let tree = CriteriaNode::and(vec![
            CriteriaNode::leaf(FunctionType::From, "a@b.com"),
            CriteriaNode::not(CriteriaNode::leaf(FunctionType::List, "dev@lists.b.com")),
        ]);
        let json = serde_json::to_string(&tree).unwrap();
        let back: CriteriaNode = serde_json::from_str(&json).unwrap();
        assert_eq!(tree, back);
    }
}
