//! Per-user, per-database statement history.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::debug;

use crate::dialect::Dialect;
use crate::error::Result;
use crate::persistence::{GatewayStore, HistoryFilter, QueryRecord};

/// Writes and reads statement history through the durable store.
#[derive(Clone)]
pub struct HistoryRecorder {
    store: Arc<dyn GatewayStore>,
}

impl HistoryRecorder {
    pub fn new(store: Arc<dyn GatewayStore>) -> Self {
        Self { store }
    }

    /// Records a statement that has already executed successfully.
    pub async fn record(
        &self,
        user: &str,
        dialect: Dialect,
        database_label: &str,
        statement: &str,
        executed_at: DateTime<Utc>,
    ) -> Result<()> {
        let record = QueryRecord {
            user: user.to_string(),
            dialect,
            database_label: database_label.to_string(),
            statement: statement.to_string(),
            executed_at,
        };
        self.store.save_history_record(&record).await?;
        debug!(user, label = database_label, "Recorded statement");
        Ok(())
    }

    /// Returns the user's history for one database label, oldest first.
    pub async fn fetch(
        &self,
        user: &str,
        database_label: &str,
        filter: &HistoryFilter,
    ) -> Result<Vec<QueryRecord>> {
        self.store
            .fetch_history_records(user, database_label, filter)
            .await
    }
}

/// Renders records as `(database label, dialect, statement, timestamp)` text rows.
pub fn to_text_rows(records: &[QueryRecord]) -> Vec<Vec<String>> {
    records
        .iter()
        .map(|r| {
            vec![
                r.database_label.clone(),
                r.dialect.to_string(),
                r.statement.clone(),
                r.executed_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            ]
        })
        .collect()
}
