//! Criteria generation and size-limited splitting.
//!
//! This backend compiles a simplified criteria tree into native filter
//! criteria strings, escaping and quoting operands as needed, and splits
//! oversized rules so that no generated filter exceeds the platform's
//! (undocumented, so configurable) size limit. Actions are expanded to
//! respect the one-label-per-filter restriction, and the final filter set
//! is the Cartesian product of split criteria and expanded actions.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::ast::{CriteriaNode, FunctionType, GroupingType, OperationType};
use crate::error::{ErrorList, FilterError, Result};
use crate::models::{Actions, Criteria, Filter};
use crate::rules::{Rule, RuleActions, RuleSet};
use crate::simplifier::simplify;

/// Default size limit, in tree units, above which a rule is split
pub const DEFAULT_SIZE_LIMIT: usize = 20;

/// Compilation parameters
#[derive(Debug, Clone, Copy)]
pub struct CompileOptions {
    /// Maximum tree size (one unit per leaf argument and per logical node)
    /// a single generated filter may have before splitting kicks in
    pub size_limit: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            size_limit: DEFAULT_SIZE_LIMIT,
        }
    }
}

/// A `+` inside a full email address is one token and must not be quoted;
/// a bare `foo+bar` would instead be interpreted as "foo OR bar".
static EMAIL_ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+$").expect("valid address pattern")
});

fn needs_quoting(arg: &str) -> bool {
    if arg
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '{' | '}' | '(' | ')'))
    {
        return true;
    }
    arg.contains('+') && !EMAIL_ADDRESS.is_match(arg)
}

fn escape(arg: &str) -> String {
    if needs_quoting(arg) {
        format!("\"{}\"", arg)
    } else {
        arg.to_string()
    }
}

/// Joins already-escaped operands under their grouping:
/// or-groups as `{a b}`, and-groups as `(a b)`, single operands verbatim.
fn join_args(grouping: GroupingType, args: &[String]) -> String {
    match args {
        [] => String::new(),
        [single] => single.clone(),
        _ if grouping == GroupingType::Or => format!("{{{}}}", args.join(" ")),
        _ => format!("({})", args.join(" ")),
    }
}

fn leaf_value(
    grouping: GroupingType,
    args: &[String],
    is_raw: bool,
) -> String {
    if is_raw {
        join_args(grouping, args)
    } else {
        let escaped: Vec<String> = args.iter().map(|arg| escape(arg)).collect();
        join_args(grouping, &escaped)
    }
}

/// Generates native criteria from a simplified tree.
///
/// A root `and` distributes its children over the dedicated criteria
/// fields; everything that is not a plain from/to/subject leaf lands in
/// the free-text query.
pub fn generate(tree: &CriteriaNode) -> Result<Criteria> {
    let criteria = match tree {
        CriteriaNode::Node {
            operation: OperationType::And,
            children,
        } => {
            let mut acc = Criteria::default();
            for child in children {
                join_criteria(&mut acc, generate_part(child)?);
            }
            acc
        }
        other => generate_part(other)?,
    };
    if criteria.is_empty() {
        return Err(FilterError::EmptyCriteria);
    }
    Ok(criteria)
}

fn generate_part(tree: &CriteriaNode) -> Result<Criteria> {
    match tree {
        CriteriaNode::Leaf {
            function,
            grouping,
            args,
            is_raw,
        } => {
            let value = leaf_value(*grouping, args, *is_raw);
            if value.is_empty() {
                return Err(FilterError::EmptyCriteria);
            }
            let criteria = match function {
                FunctionType::From => Criteria {
                    from: value,
                    ..Default::default()
                },
                FunctionType::To => Criteria {
                    to: value,
                    ..Default::default()
                },
                FunctionType::Subject => Criteria {
                    subject: value,
                    ..Default::default()
                },
                // "has the words" and free-form queries are the query box
                FunctionType::Has | FunctionType::Query => Criteria {
                    query: value,
                    ..Default::default()
                },
                _ => Criteria {
                    query: format!("{}:{}", function.query_name(), value),
                    ..Default::default()
                },
            };
            Ok(criteria)
        }
        node => Ok(Criteria {
            query: render_node(node)?,
            ..Default::default()
        }),
    }
}

/// Renders a subtree as a free-text query fragment
fn render_node(tree: &CriteriaNode) -> Result<String> {
    match tree {
        CriteriaNode::Leaf {
            function,
            grouping,
            args,
            is_raw,
        } => {
            let value = leaf_value(*grouping, args, *is_raw);
            match function {
                FunctionType::Has | FunctionType::Query => Ok(value),
                _ => Ok(format!("{}:{}", function.query_name(), value)),
            }
        }
        CriteriaNode::Node {
            operation,
            children,
        } => {
            if children.is_empty() {
                return Err(FilterError::EmptyCriteria);
            }
            match operation {
                OperationType::Not => {
                    if children.len() != 1 {
                        return Err(FilterError::InvalidCriteria(format!(
                            "not must have exactly one child, got {}",
                            children.len()
                        )));
                    }
                    Ok(format!("-{}", render_node(&children[0])?))
                }
                OperationType::And | OperationType::Or => {
                    let parts = children
                        .iter()
                        .map(render_node)
                        .collect::<Result<Vec<_>>>()?;
                    if *operation == OperationType::Or {
                        Ok(format!("{{{}}}", parts.join(" ")))
                    } else {
                        Ok(format!("({})", parts.join(" ")))
                    }
                }
            }
        }
    }
}

fn join_criteria(acc: &mut Criteria, part: Criteria) {
    for (into, from) in [
        (&mut acc.from, part.from),
        (&mut acc.to, part.to),
        (&mut acc.subject, part.subject),
        (&mut acc.query, part.query),
    ] {
        if from.is_empty() {
            continue;
        }
        if into.is_empty() {
            *into = from;
        } else {
            *into = format!("{} {}", into, from);
        }
    }
}

/// Splits a tree into pieces each within `limit` units where possible.
///
/// An or-rooted tree is chunked; an and-rooted tree splits its largest
/// or-rooted child and recombines each chunk with clones of the remaining
/// siblings. Anything else is emitted whole even when over the limit:
/// splitting it would change meaning, so best effort is all there is.
pub fn split_criteria(tree: &CriteriaNode, limit: usize) -> Vec<CriteriaNode> {
    if tree.size() <= limit {
        return vec![tree.clone()];
    }
    match tree {
        CriteriaNode::Node {
            operation: OperationType::Or,
            children,
        } => chunk_or_children(children, limit),
        CriteriaNode::Leaf {
            function,
            grouping: GroupingType::Or,
            args,
            is_raw,
        } if args.len() > 1 => chunk_or_leaf(*function, args, *is_raw, limit),
        CriteriaNode::Node {
            operation: OperationType::And,
            children,
        } => split_and(children, limit).unwrap_or_else(|| vec![tree.clone()]),
        _ => vec![tree.clone()],
    }
}

/// Greedily packs or-children into chunks of at most `limit` units each.
/// A chunk of two or more children gets re-wrapped in an `or` node, so one
/// unit is reserved for the wrapper; a single child over the limit is
/// emitted alone (best effort).
fn chunk_or_children(children: &[CriteriaNode], limit: usize) -> Vec<CriteriaNode> {
    let mut chunks = Vec::new();
    let mut current: Vec<CriteriaNode> = Vec::new();
    let mut current_size = 0;
    for child in children {
        let child_size = child.size();
        if !current.is_empty() && current_size + child_size + 1 > limit {
            chunks.push(wrap_or(std::mem::take(&mut current)));
            current_size = 0;
        }
        current_size += child_size;
        current.push(child.clone());
    }
    if !current.is_empty() {
        chunks.push(wrap_or(current));
    }
    chunks
}

fn wrap_or(mut children: Vec<CriteriaNode>) -> CriteriaNode {
    if children.len() == 1 {
        children.pop().expect("checked length")
    } else {
        CriteriaNode::Node {
            operation: OperationType::Or,
            children,
        }
    }
}

/// Chunks the arguments of an or-grouped leaf
fn chunk_or_leaf(
    function: FunctionType,
    args: &[String],
    is_raw: bool,
    limit: usize,
) -> Vec<CriteriaNode> {
    args.chunks(limit.max(1))
        .map(|chunk| CriteriaNode::Leaf {
            function,
            grouping: if chunk.len() > 1 {
                GroupingType::Or
            } else {
                GroupingType::None
            },
            args: chunk.to_vec(),
            is_raw,
        })
        .collect()
}

fn split_and(children: &[CriteriaNode], limit: usize) -> Option<Vec<CriteriaNode>> {
    let (split_idx, _) = children
        .iter()
        .enumerate()
        .filter(|(_, child)| child.is_or_rooted())
        .max_by_key(|(_, child)| child.size())?;

    let siblings_size: usize = children
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != split_idx)
        .map(|(_, child)| child.size())
        .sum();
    let sub_limit = limit.saturating_sub(siblings_size).max(1);

    let chunks = split_criteria(&children[split_idx], sub_limit);
    Some(
        chunks
            .into_iter()
            .map(|chunk| {
                let rebuilt = children
                    .iter()
                    .enumerate()
                    .map(|(idx, child)| {
                        if idx == split_idx {
                            chunk.clone()
                        } else {
                            child.clone()
                        }
                    })
                    .collect();
                CriteriaNode::Node {
                    operation: OperationType::And,
                    children: rebuilt,
                }
            })
            .collect(),
    )
}

/// A root-level plain `or` always becomes one filter per disjunct, before
/// any size consideration: Gmail applies all matching filters
/// independently, and the split filters read better than one big query.
fn split_root_or(tree: CriteriaNode) -> Vec<CriteriaNode> {
    match tree {
        CriteriaNode::Node {
            operation: OperationType::Or,
            children,
        } => children,
        other => vec![other],
    }
}

/// Expands declared actions into native action objects, one label each.
///
/// The first object carries every non-label effect; each further label
/// gets an object of its own.
pub fn expand_actions(actions: &RuleActions) -> Result<Vec<Actions>> {
    actions.validate()?;
    let first = Actions {
        archive: actions.archive,
        delete: actions.delete,
        mark_read: actions.mark_read,
        star: actions.star,
        mark_important: actions.mark_important == Some(true),
        mark_not_important: actions.mark_important == Some(false),
        mark_not_spam: actions.mark_spam == Some(false),
        category: actions.category,
        add_label: actions.labels.first().cloned(),
        forward: actions.forward.clone(),
    };
    let mut expanded = vec![first];
    for label in actions.labels.iter().skip(1) {
        expanded.push(Actions {
            add_label: Some(label.clone()),
            ..Default::default()
        });
    }
    Ok(expanded)
}

/// Compiles one rule into native filters: simplify, split the root or,
/// split for size, generate criteria, and take the Cartesian product with
/// the expanded actions.
pub fn compile_rule(rule: &Rule, options: CompileOptions) -> Result<Vec<Filter>> {
    let actions = expand_actions(&rule.actions)?;
    let simplified = simplify(rule.criteria.clone());

    let trees: Vec<CriteriaNode> = split_root_or(simplified)
        .into_iter()
        .flat_map(|tree| split_criteria(&tree, options.size_limit))
        .collect();

    let criterias = trees
        .iter()
        .map(generate)
        .collect::<Result<Vec<Criteria>>>()?;

    let mut filters = Vec::with_capacity(criterias.len() * actions.len());
    for criteria in &criterias {
        for action in &actions {
            filters.push(Filter::new(criteria.clone(), action.clone()));
        }
    }
    debug!(
        criteria_count = criterias.len(),
        action_count = actions.len(),
        "compiled rule"
    );
    Ok(filters)
}

/// Compiles a slice of parsed rules, collecting per-rule errors instead of
/// aborting on the first bad rule
pub fn compile_rules(
    rules: &[Rule],
    options: CompileOptions,
) -> std::result::Result<Vec<Filter>, ErrorList> {
    let mut filters = Vec::new();
    let mut errors = ErrorList::new();
    for (index, rule) in rules.iter().enumerate() {
        match compile_rule(rule, options) {
            Ok(compiled) => filters.extend(compiled),
            Err(err) => errors.push(err.for_rule(index)),
        }
    }
    errors.into_result(filters)
}

/// Parses and compiles a whole declarative rule set
pub fn compile_ruleset(
    ruleset: &RuleSet,
    options: CompileOptions,
) -> std::result::Result<Vec<Filter>, ErrorList> {
    let rules = ruleset.parse_rules()?;
    compile_rules(&rules, options)
}
