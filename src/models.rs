//! Native Gmail value objects: filter criteria, filter actions, labels.
//!
//! These are the immutable outputs of the compiler and the inputs of the
//! diff engine. Content identity (used everywhere by the diff) is a SHA-256
//! over the canonical JSON of a value with its storage id excluded.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Native filter criteria, ready to submit verbatim to the Gmail API.
///
/// Empty fields are unset; a criteria with every field empty is invalid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Criteria {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub query: String,
}

impl Criteria {
    /// Whether no criteria field is set
    pub fn is_empty(&self) -> bool {
        self.from.is_empty() && self.to.is_empty() && self.subject.is_empty() && self.query.is_empty()
    }
}

/// Gmail tab category an action can file a message into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Personal,
    Social,
    Updates,
    Forums,
    Promotions,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Personal => "personal",
            Category::Social => "social",
            Category::Updates => "updates",
            Category::Forums => "forums",
            Category::Promotions => "promotions",
        };
        write!(f, "{}", name)
    }
}

/// Native filter actions.
///
/// Gmail allows at most one label per filter, so a rule declaring several
/// labels compiles to several `Actions` objects sharing the same criteria.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Actions {
    pub archive: bool,
    pub delete: bool,
    pub mark_read: bool,
    pub star: bool,
    pub mark_important: bool,
    pub mark_not_important: bool,
    pub mark_not_spam: bool,
    pub category: Option<Category>,
    pub add_label: Option<String>,
    pub forward: Option<String>,
}

impl Actions {
    /// Whether no action is set
    pub fn is_empty(&self) -> bool {
        self == &Actions::default()
    }
}

/// One native Gmail filter: a criteria + action pair.
///
/// `id` is present only for filters observed from the remote state; locally
/// compiled filters have none. The id never participates in content identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub criteria: Criteria,
    pub action: Actions,
}

impl Filter {
    pub fn new(criteria: Criteria, action: Actions) -> Self {
        Self {
            id: None,
            criteria,
            action,
        }
    }

    /// Hash of (criteria, action) — id excluded
    pub fn content_hash(&self) -> String {
        hash_json(&(&self.criteria, &self.action))
    }

    /// Hash of the criteria alone, used to bucket same-criteria filters
    /// during merge categorization
    pub fn criteria_hash(&self) -> String {
        hash_json(&self.criteria)
    }

    /// Line-based rendering consumed by the diff engine and suitable for
    /// unified-diff formatting downstream
    pub fn render_lines(&self) -> Vec<String> {
        let mut lines = vec!["* Criteria:".to_string()];
        for (name, value) in [
            ("from", &self.criteria.from),
            ("to", &self.criteria.to),
            ("subject", &self.criteria.subject),
            ("query", &self.criteria.query),
        ] {
            if !value.is_empty() {
                lines.push(format!("    {}: {}", name, value));
            }
        }
        lines.push("  Actions:".to_string());
        for (name, on) in [
            ("archive", self.action.archive),
            ("delete", self.action.delete),
            ("mark as read", self.action.mark_read),
            ("star", self.action.star),
            ("mark as important", self.action.mark_important),
            ("never mark as important", self.action.mark_not_important),
            ("never mark as spam", self.action.mark_not_spam),
        ] {
            if on {
                lines.push(format!("    {}", name));
            }
        }
        if let Some(category) = self.action.category {
            lines.push(format!("    categorize as: {}", category));
        }
        if let Some(label) = &self.action.add_label {
            lines.push(format!("    apply label: {}", label));
        }
        if let Some(forward) = &self.action.forward {
            lines.push(format!("    forward to: {}", forward));
        }
        lines
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render_lines().join("\n"))
    }
}

/// Color of a Gmail label
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelColor {
    pub background: String,
    pub text: String,
}

/// One native Gmail label.
///
/// Same identity rule as [`Filter`]: the id is storage identity only and is
/// excluded from the content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<LabelColor>,
}

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            color: None,
        }
    }

    /// Hash of (name, color) — id excluded
    pub fn content_hash(&self) -> String {
        hash_json(&(&self.name, &self.color))
    }

    /// One-line rendering consumed by the diff engine
    pub fn render_lines(&self) -> Vec<String> {
        match &self.color {
            Some(color) => vec![format!(
                "{} (background: {}, text: {})",
                self.name, color.background, color.text
            )],
            None => vec![self.name.clone()],
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render_lines().join("\n"))
    }
}

/// SHA-256 over the canonical JSON encoding of a value, hex encoded.
///
/// Struct field order is fixed by the derives, so the encoding is canonical
/// for our value types.
fn hash_json<T: Serialize>(value: &T) -> String {
    let json = serde_json::to_vec(value).expect("value types always serialize");
    let mut hasher = Sha256::new();
    hasher.update(&json);
    hex::encode(hasher.finalize())
}
