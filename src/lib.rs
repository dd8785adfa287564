//! Gmail Filter Compiler
//!
//! A pure, synchronous core that turns declarative email-filtering intent
//! into the minimal set of native Gmail filters needed to realize it, and
//! computes verifiable diffs between filter collections.
//!
//! # Overview
//!
//! This library provides the complete compilation and reconciliation core:
//! - **Rule Model**: Declarative rule sets (boolean criteria + actions),
//!   loadable from TOML
//! - **Simplification**: Boolean-algebra rewriting of criteria trees into
//!   canonical, minimal form
//! - **Generation**: Native filter criteria with query escaping and
//!   size-limited splitting
//! - **Testing**: A boolean interpreter that validates rules against
//!   sample messages with Gmail's matching semantics
//! - **Diffing**: Content-based added/removed sets between filter or label
//!   collections, reordered for minimal diff noise
//!
//! Network access, credential handling, and process orchestration are
//! deliberately out of scope: the crate only computes, callers decide
//! when and how to apply the results.
//!
//! # Example Usage
//!
//! ```no_run
//! use gmail_filters::{compile_ruleset, diff_filters, CompileOptions, RuleSet};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Load the declarative rule set
//!     let ruleset = RuleSet::load("rules.toml".as_ref())?;
//!
//!     // Compile it to native filters
//!     let desired = compile_ruleset(&ruleset, CompileOptions::default())?;
//!
//!     // Diff against the filters observed upstream (listed elsewhere)
//!     let observed = Vec::new();
//!     let diff = diff_filters(&observed, &desired);
//!     print!("{}", diff);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`ast`] - Criteria tree data structures
//! - [`simplifier`] - Boolean-algebra simplification to canonical form
//! - [`rules`] - Declarative rule set model and TOML loading
//! - [`generator`] - Native criteria generation, splitting, action expansion
//! - [`interpreter`] - Boolean test backend over sample messages
//! - [`diff`] - Content-hash diffing and similarity-based reordering
//! - [`assignment`] - Minimum-cost bipartite assignment
//! - [`models`] - Native filter/label value objects
//! - [`error`] - Error types and result aliases

pub mod assignment;
pub mod ast;
pub mod diff;
pub mod error;
pub mod generator;
pub mod interpreter;
pub mod models;
pub mod rules;
pub mod simplifier;

// Re-export commonly used types for convenience
pub use error::{ErrorList, FilterError, Result};

// Criteria tree
pub use ast::{CriteriaNode, FunctionType, GroupingType, OperationType};
pub use simplifier::simplify;

// Native value objects
pub use models::{Actions, Category, Criteria, Filter, Label, LabelColor};

// Declarative rule set
pub use rules::{
    CriteriaSpec, Message, NamedFilter, Rule, RuleActions, RuleSet, RuleSpec, TestSpec,
};

// Compilation
pub use generator::{
    compile_rule, compile_rules, compile_ruleset, expand_actions, generate, split_criteria,
    CompileOptions, DEFAULT_SIZE_LIMIT,
};

// Test interpretation
pub use interpreter::{Evaluator, Interpreter, MergedActions, TestFailure, TestOutcome};

// Diffing
pub use diff::{
    categorize_filters, diff_filters, diff_labels, FiltersDiff, LabelsDiff, MergeBuckets,
};
