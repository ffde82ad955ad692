//! Parser-backed statement classification.
//!
//! Uses sqlparser-rs with the generic dialect, so keyword case, string
//! literals and identifiers no longer influence the decision. Text that does
//! not parse is classified by the substring heuristic instead.

use sqlparser::ast::Statement;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use tracing::debug;

use super::{StatementClassifier, StatementKind, SubstringClassifier};

/// Classifies statements by parsing them.
///
/// A statement is reading when it produces rows: queries, `EXPLAIN`, `SHOW`,
/// `PRAGMA`, and DML carrying a `RETURNING` clause. A script is reading only
/// if every statement in it is.
#[derive(Debug, Default)]
pub struct ParserClassifier {
    dialect: GenericDialect,
    fallback: SubstringClassifier,
}

impl ParserClassifier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatementClassifier for ParserClassifier {
    fn classify(&self, sql: &str) -> StatementKind {
        match Parser::parse_sql(&self.dialect, sql) {
            Ok(statements) if !statements.is_empty() => {
                if statements.iter().all(produces_rows) {
                    StatementKind::Reading
                } else {
                    StatementKind::Mutating
                }
            }
            Ok(_) => self.fallback.classify(sql),
            Err(e) => {
                debug!("SQL did not parse ({e}), using substring classification");
                self.fallback.classify(sql)
            }
        }
    }
}

fn produces_rows(statement: &Statement) -> bool {
    match statement {
        Statement::Query(_)
        | Statement::Explain { .. }
        | Statement::ShowVariable { .. }
        | Statement::ShowTables { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowCreate { .. }
        | Statement::ShowFunctions { .. }
        | Statement::ShowStatus { .. }
        | Statement::ShowCollation { .. }
        | Statement::Pragma { .. } => true,

        Statement::Insert(insert) => insert.returning.is_some(),
        Statement::Update { returning, .. } => returning.is_some(),
        Statement::Delete(delete) => delete.returning.is_some(),

        _ => false,
    }
}
