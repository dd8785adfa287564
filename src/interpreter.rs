//! Test interpreter: the second backend over the criteria AST.
//!
//! Instead of native criteria strings, this backend compiles a tree into a
//! boolean evaluator that can be run against sample messages, reproducing
//! Gmail's matching semantics (case-insensitive addresses with `@` and `.`
//! equivalent, `*`/`.` domain suffixes, substring matching for text
//! fields, `to:` as shorthand for to/cc/bcc/list). It is used to validate
//! that declared rules produce the declared actions on declared fixtures.

use std::collections::BTreeSet;

use crate::ast::{CriteriaNode, FunctionType, GroupingType, OperationType};
use crate::error::{FilterError, Result};
use crate::models::Category;
use crate::rules::{Message, Rule, RuleActions, TestSpec};

/// Compiled boolean evaluator for one criteria tree
#[derive(Debug, Clone)]
pub enum Evaluator {
    And(Vec<Evaluator>),
    Or(Vec<Evaluator>),
    Not(Box<Evaluator>),
    Field {
        function: FunctionType,
        grouping: GroupingType,
        args: Vec<String>,
    },
}

impl Evaluator {
    /// Compiles a criteria tree into an evaluator.
    ///
    /// Free-form query leaves cannot be evaluated against a structured
    /// sample message and are rejected outright; the caller is expected to
    /// skip the offending rule and keep going with the rest.
    pub fn compile(tree: &CriteriaNode) -> Result<Evaluator> {
        match tree {
            CriteriaNode::Node {
                operation,
                children,
            } => {
                let compiled = children
                    .iter()
                    .map(Evaluator::compile)
                    .collect::<Result<Vec<_>>>()?;
                match operation {
                    OperationType::And => Ok(Evaluator::And(compiled)),
                    OperationType::Or => Ok(Evaluator::Or(compiled)),
                    OperationType::Not => {
                        let mut compiled = compiled;
                        match (compiled.len(), compiled.pop()) {
                            (1, Some(child)) => Ok(Evaluator::Not(Box::new(child))),
                            (n, _) => Err(FilterError::InvalidCriteria(format!(
                                "not must have exactly one child, got {}",
                                n
                            ))),
                        }
                    }
                }
            }
            CriteriaNode::Leaf {
                function: FunctionType::Query,
                ..
            } => Err(FilterError::Unsupported("a free-form query".to_string())),
            CriteriaNode::Leaf {
                function,
                grouping,
                args,
                ..
            } => Ok(Evaluator::Field {
                function: *function,
                grouping: *grouping,
                args: args.clone(),
            }),
        }
    }

    /// Whether the compiled criteria matches the message
    pub fn matches(&self, message: &Message) -> bool {
        match self {
            Evaluator::And(children) => children.iter().all(|child| child.matches(message)),
            Evaluator::Or(children) => children.iter().any(|child| child.matches(message)),
            Evaluator::Not(child) => !child.matches(message),
            Evaluator::Field {
                function,
                grouping,
                args,
            } => match grouping {
                GroupingType::Or => args.iter().any(|arg| field_match(*function, arg, message)),
                _ => args.iter().all(|arg| field_match(*function, arg, message)),
            },
        }
    }
}

fn field_match(function: FunctionType, operand: &str, message: &Message) -> bool {
    match function {
        FunctionType::From => address_match(&message.from, operand),
        FunctionType::Cc => any_address_match(&message.cc, operand),
        FunctionType::Bcc => any_address_match(&message.bcc, operand),
        FunctionType::ReplyTo => any_address_match(&message.reply_to, operand),
        FunctionType::List => any_address_match(&message.lists, operand),
        // Gmail treats to: as shorthand for every delivery field
        FunctionType::To => {
            any_address_match(&message.to, operand)
                || any_address_match(&message.cc, operand)
                || any_address_match(&message.bcc, operand)
                || any_address_match(&message.lists, operand)
        }
        FunctionType::Subject => text_match(&message.subject, operand),
        FunctionType::Has => {
            field_match(FunctionType::To, operand, message)
                || address_match(&message.from, operand)
                || text_match(&message.subject, operand)
                || text_match(&message.body, operand)
        }
        FunctionType::Query => false, // rejected at compile time
    }
}

fn any_address_match(addresses: &[String], operand: &str) -> bool {
    addresses.iter().any(|address| address_match(address, operand))
}

/// Gmail address comparison: case-insensitive, `@` and `.` equivalent.
/// Operands starting with `*` or `.` match as domain suffixes.
fn address_match(address: &str, operand: &str) -> bool {
    let address = normalize_address(address);
    let operand = normalize_address(operand);
    if let Some(suffix) = operand.strip_prefix('*') {
        return address.ends_with(suffix);
    }
    if operand.starts_with('.') {
        return address.ends_with(&operand);
    }
    address == operand
}

fn normalize_address(address: &str) -> String {
    address.to_lowercase().replace('@', ".")
}

fn text_match(haystack: &str, operand: &str) -> bool {
    haystack.to_lowercase().contains(&operand.to_lowercase())
}

/// Actions accumulated across every rule matching one message.
///
/// The merge is commutative: booleans OR together, labels accumulate,
/// and tri-state or single-valued effects must agree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergedActions {
    pub archive: bool,
    pub delete: bool,
    pub mark_read: bool,
    pub star: bool,
    pub mark_spam: Option<bool>,
    pub mark_important: Option<bool>,
    pub category: Option<Category>,
    pub forward: Option<String>,
    pub labels: BTreeSet<String>,
}

impl MergedActions {
    pub fn from_declared(actions: &RuleActions) -> Self {
        Self {
            archive: actions.archive,
            delete: actions.delete,
            mark_read: actions.mark_read,
            star: actions.star,
            mark_spam: actions.mark_spam,
            mark_important: actions.mark_important,
            category: actions.category,
            forward: actions.forward.clone(),
            labels: actions.labels.iter().cloned().collect(),
        }
    }

    /// Merges another rule's actions in, failing on any disagreement
    pub fn merge(&mut self, actions: &RuleActions) -> Result<()> {
        self.archive |= actions.archive;
        self.delete |= actions.delete;
        self.mark_read |= actions.mark_read;
        self.star |= actions.star;
        merge_exclusive(&mut self.mark_spam, actions.mark_spam, "mark as spam")?;
        merge_exclusive(
            &mut self.mark_important,
            actions.mark_important,
            "mark as important",
        )?;
        merge_exclusive(&mut self.category, actions.category, "category")?;
        merge_exclusive(&mut self.forward, actions.forward.clone(), "forward")?;
        self.labels.extend(actions.labels.iter().cloned());
        Ok(())
    }
}

fn merge_exclusive<T: PartialEq>(
    current: &mut Option<T>,
    incoming: Option<T>,
    what: &str,
) -> Result<()> {
    let Some(incoming) = incoming else {
        return Ok(());
    };
    match current {
        None => {
            *current = Some(incoming);
            Ok(())
        }
        Some(existing) if *existing == incoming => Ok(()),
        Some(_) => Err(FilterError::ActionConflict(what.to_string())),
    }
}

/// One failed fixture message: what the rule set was declared to do versus
/// what the matching rules actually merged to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestFailure {
    pub message_index: usize,
    pub expected: MergedActions,
    pub got: MergedActions,
}

/// Result of evaluating one declared test fixture
#[derive(Debug)]
pub struct TestOutcome {
    pub name: String,
    pub failures: Vec<TestFailure>,
    pub errors: Vec<FilterError>,
}

impl TestOutcome {
    pub fn passed(&self) -> bool {
        self.failures.is_empty() && self.errors.is_empty()
    }
}

struct Entry {
    index: usize,
    evaluator: Evaluator,
    actions: RuleActions,
}

/// All evaluable rules of a rule set, compiled for repeated matching.
///
/// Rules the backend cannot evaluate are skipped, not fatal: they are
/// collected as diagnostics and the rest of the rule set stays testable.
pub struct Interpreter {
    entries: Vec<Entry>,
    skipped: Vec<FilterError>,
}

impl Interpreter {
    pub fn compile(rules: &[Rule]) -> Interpreter {
        let mut entries = Vec::with_capacity(rules.len());
        let mut skipped = Vec::new();
        for (index, rule) in rules.iter().enumerate() {
            match Evaluator::compile(&rule.criteria) {
                Ok(evaluator) => entries.push(Entry {
                    index,
                    evaluator,
                    actions: rule.actions.clone(),
                }),
                Err(err) => skipped.push(err.for_rule(index)),
            }
        }
        Interpreter { entries, skipped }
    }

    /// Rules that could not be compiled for this backend
    pub fn skipped(&self) -> &[FilterError] {
        &self.skipped
    }

    /// Merges the actions of every rule matching the message
    pub fn merged_actions(&self, message: &Message) -> Result<MergedActions> {
        let mut merged = MergedActions::default();
        for entry in &self.entries {
            if entry.evaluator.matches(message) {
                merged
                    .merge(&entry.actions)
                    .map_err(|err| err.for_rule(entry.index))?;
            }
        }
        Ok(merged)
    }

    /// Runs every declared test fixture against the compiled rules
    pub fn run_tests(&self, tests: &[TestSpec]) -> Vec<TestOutcome> {
        tests
            .iter()
            .map(|test| {
                let expected = MergedActions::from_declared(&test.actions);
                let mut failures = Vec::new();
                let mut errors = Vec::new();
                for (message_index, message) in test.messages.iter().enumerate() {
                    match self.merged_actions(message) {
                        Ok(got) if got == expected => {}
                        Ok(got) => failures.push(TestFailure {
                            message_index,
                            expected: expected.clone(),
                            got,
                        }),
                        Err(err) => errors.push(err.for_test(test.name.as_str())),
                    }
                }
                TestOutcome {
                    name: test.name.clone(),
                    failures,
                    errors,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::CriteriaNode as N;

    fn message_from(from: &str) -> Message {
        Message {
            from: from.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_address_equivalence_of_at_and_dot() {
        // from "x@y.com" matches operand "x.y.com"
        assert!(address_match("x@y.com", "x.y.com"));
        assert!(address_match("x@y.com", "X@Y.COM"));
        assert!(!address_match("x@y.com", "z@y.com"));
    }

    #[test]
    fn test_address_suffix_matching() {
        assert!(address_match("foo@gmail.com", "*@gmail.com"));
        assert!(address_match("foo@sub.gmail.com", ".gmail.com"));
        assert!(!address_match("foo@gmailxcom", "*@gmail.com"));
        assert!(!address_match("foo@gmail.org", ".gmail.com"));
    }

    #[test]
    fn test_subject_is_substring_match() {
        let evaluator = Evaluator::compile(&N::leaf(FunctionType::Subject, "Weekly")).unwrap();
        let message = Message {
            subject: "your weekly digest".to_string(),
            ..Default::default()
        };
        assert!(evaluator.matches(&message));
        assert!(!evaluator.matches(&message_from("a@b.com")));
    }

    #[test]
    fn test_to_expands_to_all_delivery_fields() {
        let evaluator = Evaluator::compile(&N::leaf(FunctionType::To, "me@x.com")).unwrap();
        for message in [
            Message {
                to: vec!["me@x.com".to_string()],
                ..Default::default()
            },
            Message {
                cc: vec!["me@x.com".to_string()],
                ..Default::default()
            },
            Message {
                bcc: vec!["me@x.com".to_string()],
                ..Default::default()
            },
            Message {
                lists: vec!["me@x.com".to_string()],
                ..Default::default()
            },
        ] {
            assert!(evaluator.matches(&message));
        }
        assert!(!evaluator.matches(&message_from("me@x.com")));
    }

    #[test]
    fn test_has_expands_everywhere() {
        let evaluator = Evaluator::compile(&N::leaf(FunctionType::Has, "report")).unwrap();
        let by_subject = Message {
            subject: "quarterly report attached".to_string(),
            ..Default::default()
        };
        let by_body = Message {
            body: "see the report below".to_string(),
            ..Default::default()
        };
        assert!(evaluator.matches(&by_subject));
        assert!(evaluator.matches(&by_body));
        assert!(!evaluator.matches(&Message::default()));
    }

    #[test]
    fn test_grouping_or_vs_and() {
        let or_leaf = N::grouped_leaf(
            FunctionType::Has,
            GroupingType::Or,
            vec!["alpha".into(), "beta".into()],
        );
        let and_leaf = N::grouped_leaf(
            FunctionType::Has,
            GroupingType::And,
            vec!["alpha".into(), "beta".into()],
        );
        let message = Message {
            body: "only alpha here".to_string(),
            ..Default::default()
        };
        assert!(Evaluator::compile(&or_leaf).unwrap().matches(&message));
        assert!(!Evaluator::compile(&and_leaf).unwrap().matches(&message));
    }

    #[test]
    fn test_boolean_combinators() {
        let tree = N::and(vec![
            N::leaf(FunctionType::From, "a@b.com"),
            N::not(N::leaf(FunctionType::Subject, "spam")),
        ]);
        let evaluator = Evaluator::compile(&tree).unwrap();
        assert!(evaluator.matches(&message_from("a@b.com")));

        let mut message = message_from("a@b.com");
        message.subject = "spam offer".to_string();
        assert!(!evaluator.matches(&message));
    }

    #[test]
    fn test_raw_query_is_skipped_not_fatal() {
        let rules = vec![
            Rule {
                criteria: N::raw_leaf(FunctionType::Query, "label:old"),
                actions: RuleActions {
                    delete: true,
                    ..Default::default()
                },
            },
            Rule {
                criteria: N::leaf(FunctionType::From, "a@b.com"),
                actions: RuleActions {
                    archive: true,
                    ..Default::default()
                },
            },
        ];
        let interpreter = Interpreter::compile(&rules);
        assert_eq!(interpreter.skipped().len(), 1);
        assert!(interpreter.skipped()[0].to_string().contains("rule #0"));

        // the evaluable rule still works
        let merged = interpreter.merged_actions(&message_from("a@b.com")).unwrap();
        assert!(merged.archive);
        assert!(!merged.delete);
    }

    #[test]
    fn test_merge_accumulates_labels_and_flags() {
        let rules = vec![
            Rule {
                criteria: N::leaf(FunctionType::From, "a@b.com"),
                actions: RuleActions {
                    archive: true,
                    labels: vec!["l1".into()],
                    ..Default::default()
                },
            },
            Rule {
                criteria: N::leaf(FunctionType::Has, "invoice"),
                actions: RuleActions {
                    mark_read: true,
                    labels: vec!["l2".into()],
                    ..Default::default()
                },
            },
        ];
        let interpreter = Interpreter::compile(&rules);
        let message = Message {
            from: "a@b.com".to_string(),
            subject: "your invoice".to_string(),
            ..Default::default()
        };
        let merged = interpreter.merged_actions(&message).unwrap();
        assert!(merged.archive);
        assert!(merged.mark_read);
        assert_eq!(
            merged.labels.iter().cloned().collect::<Vec<_>>(),
            vec!["l1".to_string(), "l2".to_string()]
        );
    }

    #[test]
    fn test_merge_conflict_on_tri_state() {
        let rules = vec![
            Rule {
                criteria: N::leaf(FunctionType::From, "a@b.com"),
                actions: RuleActions {
                    mark_important: Some(true),
                    ..Default::default()
                },
            },
            Rule {
                criteria: N::leaf(FunctionType::From, "a@b.com"),
                actions: RuleActions {
                    mark_important: Some(false),
                    ..Default::default()
                },
            },
        ];
        let interpreter = Interpreter::compile(&rules);
        let err = interpreter
            .merged_actions(&message_from("a@b.com"))
            .unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains("rule #1"));
        assert!(rendered.contains("mark as important"));
    }

    #[test]
    fn test_merge_conflict_on_category() {
        let mut merged = MergedActions::default();
        merged
            .merge(&RuleActions {
                category: Some(Category::Updates),
                ..Default::default()
            })
            .unwrap();
        let err = merged
            .merge(&RuleActions {
                category: Some(Category::Forums),
                ..Default::default()
            })
            .unwrap_err();
        assert!(err.to_string().contains("category"));

        // agreeing categories merge fine
        merged
            .merge(&RuleActions {
                category: Some(Category::Updates),
                ..Default::default()
            })
            .unwrap();
    }

    #[test]
    fn test_run_tests_reports_expected_vs_got() {
        let rules = vec![Rule {
            criteria: N::leaf(FunctionType::From, "news@x.com"),
            actions: RuleActions {
                archive: true,
                labels: vec!["news".into()],
                ..Default::default()
            },
        }];
        let interpreter = Interpreter::compile(&rules);
        let tests = vec![
            TestSpec {
                name: "news is archived".to_string(),
                messages: vec![message_from("news@x.com")],
                actions: RuleActions {
                    archive: true,
                    labels: vec!["news".into()],
                    ..Default::default()
                },
            },
            TestSpec {
                name: "unrelated mail is deleted".to_string(),
                messages: vec![message_from("other@y.com")],
                actions: RuleActions {
                    delete: true,
                    ..Default::default()
                },
            },
        ];
        let outcomes = interpreter.run_tests(&tests);
        assert!(outcomes[0].passed());
        assert!(!outcomes[1].passed());
        let failure = &outcomes[1].failures[0];
        assert_eq!(failure.message_index, 0);
        assert!(failure.expected.delete);
        assert_eq!(failure.got, MergedActions::default());
    }
}
