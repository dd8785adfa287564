//! Boolean-algebra simplification of criteria trees.
//!
//! `simplify` rewrites a tree into a canonical, minimal-size equivalent via
//! repeated passes of three rewrites (logical flattening, function grouping,
//! redundancy removal) until a fixed point, then applies a recursive
//! canonical sort so that semantically equal trees compare equal.
//!
//! Convergence is a performance property: if the pass bound is hit the
//! partially simplified tree is returned as-is, never an error.

use crate::ast::{CriteriaNode, FunctionType, GroupingType, OperationType};
use std::collections::BTreeMap;
use tracing::trace;

/// Upper bound on rewrite passes; realistic trees converge in one or two.
const MAX_PASSES: usize = 4;

/// Simplifies a criteria tree into canonical form.
///
/// Pure: the input is consumed and a new tree is returned; every pass
/// rebuilds nodes instead of mutating in place.
pub fn simplify(tree: CriteriaNode) -> CriteriaNode {
    let mut current = tree;
    for pass in 0..MAX_PASSES {
        let next = remove_redundancy(group_functions(flatten(current.clone())));
        if next == current {
            trace!(passes = pass, "criteria tree reached fixed point");
            break;
        }
        current = next;
    }
    canonical_sort(current)
}

/// Splices children of same-operation child nodes into their parent:
/// `and(a, and(b, c))` becomes `and(a, b, c)`. Never applies to `not`.
fn flatten(node: CriteriaNode) -> CriteriaNode {
    match node {
        CriteriaNode::Node {
            operation,
            children,
        } => {
            let mut out = Vec::with_capacity(children.len());
            for child in children.into_iter().map(flatten) {
                match child {
                    CriteriaNode::Node {
                        operation: child_op,
                        children: grandchildren,
                    } if child_op == operation && operation != OperationType::Not => {
                        out.extend(grandchildren);
                    }
                    other => out.push(other),
                }
            }
            CriteriaNode::Node {
                operation,
                children: out,
            }
        }
        leaf => leaf,
    }
}

/// Merges sibling leaves of the same function under an `and`/`or` parent
/// into one leaf grouped by the parent operation.
///
/// A leaf takes part only if its grouping is absent (single argument) or
/// already equal to the parent operation; a leaf grouped by a different
/// operation is an inner sub-expression and is left untouched. A merged
/// leaf is raw if any of its inputs was raw.
fn group_functions(node: CriteriaNode) -> CriteriaNode {
    let (operation, children) = match node {
        CriteriaNode::Node {
            operation,
            children,
        } => (operation, children),
        leaf => return leaf,
    };

    let children: Vec<_> = children.into_iter().map(group_functions).collect();

    let grouping = match GroupingType::from_operation(operation) {
        Some(grouping) => grouping,
        // `not` imposes no grouping on its child
        None => {
            return CriteriaNode::Node {
                operation,
                children,
            }
        }
    };

    // Keyed by function; the map iteration order is not meaningful on its
    // own, the final canonical sort restores determinism.
    let mut groups: BTreeMap<FunctionType, (Vec<String>, bool)> = BTreeMap::new();
    let mut rest = Vec::new();
    for child in children {
        match child {
            CriteriaNode::Leaf {
                function,
                grouping: leaf_grouping,
                args,
                is_raw,
            } if !args.is_empty() && (args.len() == 1 || leaf_grouping == grouping) => {
                let entry = groups.entry(function).or_insert((Vec::new(), false));
                entry.0.extend(args);
                entry.1 |= is_raw;
            }
            other => rest.push(other),
        }
    }

    let mut out = rest;
    for (function, (args, is_raw)) in groups {
        let leaf_grouping = if args.len() > 1 {
            grouping
        } else {
            GroupingType::None
        };
        out.push(CriteriaNode::Leaf {
            function,
            grouping: leaf_grouping,
            args,
            is_raw,
        });
    }
    CriteriaNode::Node {
        operation,
        children: out,
    }
}

/// Unwraps single-child `and`/`or` nodes and eliminates double negation.
///
/// A node with zero children signals a malformed tree upstream; it is kept
/// as-is rather than turned into an error here.
fn remove_redundancy(node: CriteriaNode) -> CriteriaNode {
    let (operation, children) = match node {
        CriteriaNode::Node {
            operation,
            children,
        } => (operation, children),
        leaf => return leaf,
    };

    let mut children: Vec<_> = children.into_iter().map(remove_redundancy).collect();

    if operation == OperationType::Not {
        let is_double_negation = matches!(
            children.as_slice(),
            [CriteriaNode::Node {
                operation: OperationType::Not,
                children: inner,
            }] if inner.len() == 1
        );
        if is_double_negation {
            if let Some(CriteriaNode::Node { children: mut inner, .. }) = children.pop() {
                return inner.pop().expect("checked single grandchild");
            }
        }
        return CriteriaNode::Node {
            operation,
            children,
        };
    }

    if children.len() == 1 {
        return children.pop().expect("checked single child");
    }
    CriteriaNode::Node {
        operation,
        children,
    }
}

/// Recursively orders siblings: leaves before nodes, leaves by
/// (grouping, function, args), nodes by operation.
fn canonical_sort(node: CriteriaNode) -> CriteriaNode {
    match node {
        CriteriaNode::Node {
            operation,
            children,
        } => {
            let mut children: Vec<_> = children.into_iter().map(canonical_sort).collect();
            children.sort_by(|a, b| a.canonical_cmp(b));
            CriteriaNode::Node {
                operation,
                children,
            }
        }
        leaf => leaf,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::CriteriaNode as N;

    fn from_leaf(arg: &str) -> CriteriaNode {
        N::leaf(FunctionType::From, arg)
    }

    #[test]
    fn test_flatten_same_operation() {
        let tree = N::and(vec![
            from_leaf("a"),
            N::and(vec![from_leaf("b"), from_leaf("c")]),
        ]);
        let flat = flatten(tree);
        match flat {
            CriteriaNode::Node { children, .. } => assert_eq!(children.len(), 3),
            _ => panic!("expected node"),
        }
    }

    #[test]
    fn test_flatten_keeps_different_operations() {
        let tree = N::and(vec![
            from_leaf("a"),
            N::or(vec![from_leaf("b"), from_leaf("c")]),
        ]);
        let flat = flatten(tree.clone());
        assert_eq!(flat, tree);
    }

    #[test]
    fn test_group_merges_same_function() {
        let tree = N::or(vec![from_leaf("a"), from_leaf("b")]);
        let simplified = simplify(tree);
        assert_eq!(
            simplified,
            N::grouped_leaf(
                FunctionType::From,
                GroupingType::Or,
                vec!["a".into(), "b".into()]
            )
        );
    }

    #[test]
    fn test_group_keeps_differently_grouped_leaf() {
        // from:{a b} under an `and` parent is an inner or-expression and
        // must not merge with the sibling from:c
        let inner = N::grouped_leaf(
            FunctionType::From,
            GroupingType::Or,
            vec!["a".into(), "b".into()],
        );
        let tree = N::and(vec![inner.clone(), from_leaf("c")]);
        let simplified = simplify(tree);
        assert_eq!(simplified, N::and(vec![from_leaf("c"), inner]));
    }

    #[test]
    fn test_group_preserves_rawness() {
        let tree = N::or(vec![
            N::raw_leaf(FunctionType::Query, "label:old"),
            N::leaf(FunctionType::Query, "plain"),
        ]);
        let simplified = simplify(tree);
        match simplified {
            CriteriaNode::Leaf { is_raw, args, .. } => {
                assert!(is_raw);
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected merged leaf, got {:?}", other),
        }
    }

    #[test]
    fn test_single_child_unwrap() {
        let tree = N::or(vec![from_leaf("a")]);
        assert_eq!(simplify(tree), from_leaf("a"));
    }

    #[test]
    fn test_not_never_unwraps() {
        let tree = N::not(from_leaf("a"));
        assert_eq!(simplify(tree.clone()), tree);
    }

    #[test]
    fn test_double_negation() {
        let tree = N::not(N::not(from_leaf("a")));
        assert_eq!(simplify(tree), from_leaf("a"));
    }

    #[test]
    fn test_empty_node_survives() {
        let tree = N::and(vec![]);
        // malformed, but must not crash or disappear
        assert_eq!(simplify(tree.clone()), tree);
    }

    #[test]
    fn test_nested_and_or_collapses() {
        // and(or(from:a, from:b), and(not(or(to:e))))
        let tree = N::and(vec![
            N::or(vec![from_leaf("a"), from_leaf("b")]),
            N::and(vec![N::not(N::or(vec![N::leaf(FunctionType::To, "e")]))]),
        ]);
        let simplified = simplify(tree);
        let expected = N::and(vec![
            N::grouped_leaf(
                FunctionType::From,
                GroupingType::Or,
                vec!["a".into(), "b".into()],
            ),
            N::not(N::leaf(FunctionType::To, "e")),
        ]);
        assert_eq!(simplified, expected);
    }

    #[test]
    fn test_idempotence() {
        let trees = vec![
            N::and(vec![
                N::or(vec![from_leaf("a"), from_leaf("b")]),
                N::not(from_leaf("c")),
                N::leaf(FunctionType::Subject, "hello world"),
            ]),
            N::or(vec![
                N::and(vec![from_leaf("a"), N::leaf(FunctionType::List, "l")]),
                from_leaf("b"),
            ]),
            from_leaf("solo"),
        ];
        for tree in trees {
            let once = simplify(tree);
            let twice = simplify(once.clone());
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_sibling_order_is_canonical() {
        let a = N::and(vec![
            N::leaf(FunctionType::Subject, "s"),
            N::not(from_leaf("x")),
            from_leaf("a"),
        ]);
        let b = N::and(vec![
            from_leaf("a"),
            N::leaf(FunctionType::Subject, "s"),
            N::not(from_leaf("x")),
        ]);
        assert_eq!(simplify(a), simplify(b));
    }
}
