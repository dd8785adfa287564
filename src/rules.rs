//! Declarative rule set: the parsed input surface of the compiler.
//!
//! A rule set pairs criteria specifications (boolean combinations of field
//! matchers, possibly referencing reusable named filters) with declared
//! actions, plus optional test fixtures for the interpreter backend. The
//! host configuration language is not interpreted here: this module only
//! models the already-parsed rule set and lowers it to criteria trees.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::ast::{CriteriaNode, FunctionType, OperationType};
use crate::error::{ErrorList, FilterError, Result};
use crate::models::Category;

/// Declarative form of one criteria tree node.
///
/// Exactly one operator must be set per node: a single match field
/// (`from`, `to`, ...), a boolean combinator (`and`, `or`, `not`), or a
/// reference to a named filter. `is_escaped` marks the operand as already
/// valid Gmail query syntax, exempting it from escaping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct CriteriaSpec {
    pub from: Option<String>,
    pub to: Option<String>,
    pub cc: Option<String>,
    pub bcc: Option<String>,
    pub reply_to: Option<String>,
    pub subject: Option<String>,
    pub list: Option<String>,
    pub has: Option<String>,
    pub query: Option<String>,
    /// Reference to a named filter defined in the rule set
    pub name: Option<String>,
    pub is_escaped: bool,
    pub and: Vec<CriteriaSpec>,
    pub or: Vec<CriteriaSpec>,
    pub not: Option<Box<CriteriaSpec>>,
}

impl CriteriaSpec {
    /// Lowers this specification to a criteria tree, resolving named-filter
    /// references against `named`.
    pub fn parse(&self, named: &HashMap<String, CriteriaNode>) -> Result<CriteriaNode> {
        let mut set = Vec::new();
        for (label, present) in [
            ("from", self.from.is_some()),
            ("to", self.to.is_some()),
            ("cc", self.cc.is_some()),
            ("bcc", self.bcc.is_some()),
            ("replyTo", self.reply_to.is_some()),
            ("subject", self.subject.is_some()),
            ("list", self.list.is_some()),
            ("has", self.has.is_some()),
            ("query", self.query.is_some()),
            ("name", self.name.is_some()),
            ("and", !self.and.is_empty()),
            ("or", !self.or.is_empty()),
            ("not", self.not.is_some()),
        ] {
            if present {
                set.push(label);
            }
        }
        match set.len() {
            0 => {
                return Err(FilterError::InvalidCriteria(
                    "no operator specified".to_string(),
                ))
            }
            1 => {}
            _ => {
                return Err(FilterError::InvalidCriteria(format!(
                    "multiple operators specified in one node: {}",
                    set.join(", ")
                )))
            }
        }

        if let Some(name) = &self.name {
            return named
                .get(name)
                .cloned()
                .ok_or_else(|| FilterError::UnknownNamedFilter(name.clone()));
        }
        if !self.and.is_empty() {
            return self.parse_children(OperationType::And, &self.and, named);
        }
        if !self.or.is_empty() {
            return self.parse_children(OperationType::Or, &self.or, named);
        }
        if let Some(child) = &self.not {
            return Ok(CriteriaNode::not(child.parse(named)?));
        }

        let (function, arg) = self
            .function_operand()
            .expect("one operator is set and it is not a combinator");
        Ok(CriteriaNode::Leaf {
            function,
            grouping: Default::default(),
            args: vec![arg.to_string()],
            // free-form queries are native syntax by definition
            is_raw: self.is_escaped || function == FunctionType::Query,
        })
    }

    fn parse_children(
        &self,
        operation: OperationType,
        specs: &[CriteriaSpec],
        named: &HashMap<String, CriteriaNode>,
    ) -> Result<CriteriaNode> {
        let children = specs
            .iter()
            .map(|spec| spec.parse(named))
            .collect::<Result<Vec<_>>>()?;
        Ok(CriteriaNode::Node {
            operation,
            children,
        })
    }

    fn function_operand(&self) -> Option<(FunctionType, &str)> {
        let fields = [
            (FunctionType::From, &self.from),
            (FunctionType::To, &self.to),
            (FunctionType::Cc, &self.cc),
            (FunctionType::Bcc, &self.bcc),
            (FunctionType::ReplyTo, &self.reply_to),
            (FunctionType::Subject, &self.subject),
            (FunctionType::List, &self.list),
            (FunctionType::Has, &self.has),
            (FunctionType::Query, &self.query),
        ];
        fields
            .into_iter()
            .find_map(|(function, value)| value.as_deref().map(|arg| (function, arg)))
    }
}

/// Reusable criteria definition referenced by name from rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamedFilter {
    pub name: String,
    pub query: CriteriaSpec,
}

/// Declared side effects of a rule.
///
/// `mark_spam` and `mark_important` are tri-state: absent means "leave
/// alone", `false` means the never-variant. Declaring `mark_spam = true`
/// is rejected because Gmail filters cannot route mail to spam.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct RuleActions {
    pub archive: bool,
    pub delete: bool,
    pub mark_read: bool,
    pub star: bool,
    pub mark_spam: Option<bool>,
    pub mark_important: Option<bool>,
    pub category: Option<Category>,
    pub labels: Vec<String>,
    pub forward: Option<String>,
}

impl RuleActions {
    /// Whether no action is declared
    pub fn is_empty(&self) -> bool {
        self == &RuleActions::default()
    }

    /// Rejects action sets the target platform forbids or that do nothing
    pub fn validate(&self) -> Result<()> {
        if self.mark_spam == Some(true) {
            return Err(FilterError::SpamAction);
        }
        if self.is_empty() {
            return Err(FilterError::EmptyActions);
        }
        Ok(())
    }
}

/// One declared rule: a criteria specification plus its actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    pub filter: CriteriaSpec,
    pub actions: RuleActions,
}

/// A sample message evaluated by the test interpreter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct Message {
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub reply_to: Vec<String>,
    pub lists: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// A declared test fixture: sample messages and the actions the rule set
/// is expected to apply to every one of them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestSpec {
    pub name: String,
    pub messages: Vec<Message>,
    pub actions: RuleActions,
}

/// A parsed rule ready for compilation: criteria tree + declared actions
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub criteria: CriteriaNode,
    pub actions: RuleActions,
}

/// The complete declarative rule set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuleSet {
    pub filters: Vec<NamedFilter>,
    pub rules: Vec<RuleSpec>,
    pub tests: Vec<TestSpec>,
}

impl RuleSet {
    /// Parses a rule set from its TOML representation
    pub fn from_toml_str(input: &str) -> Result<RuleSet> {
        Ok(toml::from_str(input)?)
    }

    /// Loads a rule set from a TOML file
    pub fn load(path: &Path) -> Result<RuleSet> {
        let input = std::fs::read_to_string(path)?;
        Self::from_toml_str(&input)
    }

    /// Resolves named filters in definition order. A named filter may
    /// reference filters defined before it.
    pub fn resolve_named(&self) -> std::result::Result<HashMap<String, CriteriaNode>, ErrorList> {
        let mut named = HashMap::new();
        let mut errors = ErrorList::new();
        for filter in &self.filters {
            match filter.query.parse(&named) {
                Ok(tree) => {
                    named.insert(filter.name.clone(), tree);
                }
                Err(err) => errors.push(err.for_named(filter.name.as_str())),
            }
        }
        errors.into_result(named)
    }

    /// Lowers every rule to a criteria tree, collecting per-rule errors so
    /// one malformed rule does not hide diagnostics for the rest.
    pub fn parse_rules(&self) -> std::result::Result<Vec<Rule>, ErrorList> {
        let named = self.resolve_named()?;
        let mut rules = Vec::with_capacity(self.rules.len());
        let mut errors = ErrorList::new();
        for (index, spec) in self.rules.iter().enumerate() {
            let parsed = spec
                .filter
                .parse(&named)
                .and_then(|criteria| spec.actions.validate().map(|_| criteria));
            match parsed {
                Ok(criteria) => rules.push(Rule {
                    criteria,
                    actions: spec.actions.clone(),
                }),
                Err(err) => errors.push(err.for_rule(index)),
            }
        }
        errors.into_result(rules)
    }
}
