//! Uniform, text-only result tables.

use serde::Serialize;

use crate::db::QueryResult;
use crate::dialect::coerce_to_text;

/// A fully materialized result with every cell rendered as text.
///
/// Column names are kept apart from the data rows; use
/// [`TabularResult::with_header_row`] for the header-first shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TabularResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TabularResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    /// Number of data rows (the header is never counted).
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the rows with the column names prepended as the first row.
    pub fn with_header_row(&self) -> Vec<Vec<String>> {
        std::iter::once(self.columns.clone())
            .chain(self.rows.iter().cloned())
            .collect()
    }
}

impl From<&QueryResult> for TabularResult {
    fn from(result: &QueryResult) -> Self {
        let columns = result.columns.iter().map(|c| c.name.clone()).collect();
        let rows = result
            .rows
            .iter()
            .map(|row| row.iter().map(coerce_to_text).collect())
            .collect();
        Self { columns, rows }
    }
}
