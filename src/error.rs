use std::fmt;
use thiserror::Error;

/// Type alias for Result with FilterError
pub type Result<T> = std::result::Result<T, FilterError>;

/// Error types for the filter compiler and diff engine
#[derive(Error, Debug)]
pub enum FilterError {
    /// A criteria tree produced no usable criteria fields
    #[error("criteria is empty")]
    EmptyCriteria,

    /// A declarative criteria node specified more than one operator
    #[error("invalid criteria node: {0}")]
    InvalidCriteria(String),

    /// A rule referenced a named filter that does not exist
    #[error("unknown named filter: {0}")]
    UnknownNamedFilter(String),

    /// Gmail forbids programmatically routing mail to spam
    #[error("a filter cannot mark a message as spam")]
    SpamAction,

    /// A rule declared no actions at all
    #[error("rule has no actions")]
    EmptyActions,

    /// Two matched rules declared actions that cannot be merged
    #[error("conflicting actions: {0}")]
    ActionConflict(String),

    /// Construct that the test interpreter cannot evaluate
    #[error("cannot evaluate {0} against a sample message")]
    Unsupported(String),

    /// Error attributable to a specific rule in a batch
    #[error("rule #{index}: {source}")]
    Rule {
        index: usize,
        #[source]
        source: Box<FilterError>,
    },

    /// Error attributable to a specific test fixture
    #[error("test {name:?}: {source}")]
    Test {
        name: String,
        #[source]
        source: Box<FilterError>,
    },

    /// Error attributable to a named filter definition
    #[error("named filter {name:?}: {source}")]
    Named {
        name: String,
        #[source]
        source: Box<FilterError>,
    },

    /// IO error (rule set loading)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// TOML parse error (rule set loading)
    #[error("rule set parse error: {0}")]
    ParseError(#[from] toml::de::Error),

    /// JSON serialization error (content hashing, renderings)
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl FilterError {
    /// Attaches the index of the offending rule
    pub fn for_rule(self, index: usize) -> FilterError {
        FilterError::Rule {
            index,
            source: Box::new(self),
        }
    }

    /// Attaches the name of the offending test fixture
    pub fn for_test(self, name: impl Into<String>) -> FilterError {
        FilterError::Test {
            name: name.into(),
            source: Box::new(self),
        }
    }

    /// Attaches the name of the offending named filter definition
    pub fn for_named(self, name: impl Into<String>) -> FilterError {
        FilterError::Named {
            name: name.into(),
            source: Box::new(self),
        }
    }
}

/// Collection of errors gathered during batch compilation.
///
/// One malformed rule must not block diagnostics for the rest, so batch
/// entry points accumulate per-rule errors here and report them together.
#[derive(Debug, Default)]
pub struct ErrorList {
    errors: Vec<FilterError>,
}

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: FilterError) {
        self.errors.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[FilterError] {
        &self.errors
    }

    /// Turns a value into `Ok(value)` if no errors were collected
    pub fn into_result<T>(self, value: T) -> std::result::Result<T, ErrorList> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} error(s):", self.errors.len())?;
        for err in &self.errors {
            writeln!(f, "  - {}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorList {}

impl From<FilterError> for ErrorList {
    fn from(err: FilterError) -> Self {
        Self { errors: vec![err] }
    }
}
