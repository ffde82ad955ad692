//! Statement classification.
//!
//! Decides whether a SQL text is executed for its effect only (mutating) or
//! is expected to produce rows (reading). The execution engine depends only on
//! the [`StatementClassifier`] trait, so the heuristic can be swapped out.

mod parser;

pub use parser::ParserClassifier;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// How a statement is routed through the execution engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// Executed for effect; no rows are returned.
    Mutating,
    /// Executed and every returned row is materialized.
    Reading,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mutating => write!(f, "Mutating"),
            Self::Reading => write!(f, "Reading"),
        }
    }
}

/// Classifies SQL text. Implementations must be pure and deterministic.
pub trait StatementClassifier: Send + Sync {
    fn classify(&self, sql: &str) -> StatementKind;
}

/// Tokens whose presence anywhere in the text marks a statement as mutating.
const MUTATING_TOKENS: [&str; 3] = ["INSERT", "DELETE", "UPDATE"];

/// The default classifier: a case-sensitive substring search.
///
/// `INSERT`, `DELETE` or `UPDATE` anywhere in the text (string literals and
/// identifiers included) makes the statement mutating. Lowercase keywords do
/// not match, so `select updated_at from t` is reading and
/// `insert into t values (1)` is reading too.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstringClassifier;

impl StatementClassifier for SubstringClassifier {
    fn classify(&self, sql: &str) -> StatementKind {
        if MUTATING_TOKENS.iter().any(|token| sql.contains(token)) {
            StatementKind::Mutating
        } else {
            StatementKind::Reading
        }
    }
}

/// Selects the classifier implementation from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    /// Case-sensitive token search.
    #[default]
    Substring,
    /// sqlparser-backed classification, falling back to the token search.
    Parser,
}

impl ClassifierKind {
    /// Builds the classifier this kind names.
    pub fn build(self) -> Arc<dyn StatementClassifier> {
        match self {
            Self::Substring => Arc::new(SubstringClassifier),
            Self::Parser => Arc::new(ParserClassifier::new()),
        }
    }
}

impl std::str::FromStr for ClassifierKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "substring" => Ok(Self::Substring),
            "parser" => Ok(Self::Parser),
            _ => Err(format!(
                "Unknown classifier: {s}. Valid options: substring, parser"
            )),
        }
    }
}
