//! Query execution with statement classification.
//!
//! Mutating statements are sent for effect only; reading statements are
//! prepared and every row is materialized before the handle is released.

use std::future::Future;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::classify::{StatementClassifier, StatementKind, SubstringClassifier};
use crate::connection::TenantConnection;
use crate::dialect::coerce_to_text;
use crate::error::{GatewayError, Result};

use super::TabularResult;

/// Runs statements against a tenant's connection.
#[derive(Clone)]
pub struct ExecutionEngine {
    classifier: Arc<dyn StatementClassifier>,
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new(Arc::new(SubstringClassifier))
    }
}

impl ExecutionEngine {
    pub fn new(classifier: Arc<dyn StatementClassifier>) -> Self {
        Self { classifier }
    }

    /// Classifies a statement with the configured classifier.
    pub fn classify(&self, sql: &str) -> StatementKind {
        self.classifier.classify(sql)
    }

    /// Executes one SQL text.
    ///
    /// Returns `None` for mutating statements and `Some` table for reading
    /// ones; an empty table is a successful read.
    pub async fn execute(
        &self,
        connection: &TenantConnection,
        sql: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<TabularResult>> {
        let kind = self.classify(sql);
        debug!(
            label = %connection.database_label,
            dialect = %connection.dialect,
            kind = %kind,
            "Executing statement"
        );

        let run = async {
            let client = connection.handle.lock().await;
            let outcome = match kind {
                StatementKind::Mutating => client.execute(sql).await.map(|affected| {
                    debug!(affected, "Statement executed");
                    None
                }),
                StatementKind::Reading => client.fetch_all(sql).await.map(|result| {
                    debug!(
                        rows = result.row_count(),
                        elapsed_ms = result.execution_time.as_millis() as u64,
                        "Query returned"
                    );
                    Some(TabularResult::from(&result))
                }),
            };
            outcome
        };

        with_cancellation(cancel, run).await
    }

    /// Reads an uploaded file as one SQL text and executes it.
    pub async fn execute_from_file<R>(
        &self,
        connection: &TenantConnection,
        file: Option<R>,
        cancel: &CancellationToken,
    ) -> Result<Option<TabularResult>>
    where
        R: AsyncRead + Unpin + Send,
    {
        let sql = self.read_statement(file, cancel).await?;
        self.execute(connection, &sql, cancel).await
    }

    /// Reads the full content of an uploaded file as one SQL text.
    pub async fn read_statement<R>(&self, file: Option<R>, cancel: &CancellationToken) -> Result<String>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut file = file.ok_or(GatewayError::MissingFile)?;
        with_cancellation(cancel, read_sql(&mut file)).await
    }

    /// Lists the user tables of the connected database.
    ///
    /// Always takes the reading path, whatever the classifier would say.
    pub async fn list_tables(
        &self,
        connection: &TenantConnection,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let sql = connection.dialect.table_listing_query();
        let run = async {
            let client = connection.handle.lock().await;
            let result = client.fetch_all(sql).await;
            result
        };
        let result = with_cancellation(cancel, run).await?;

        Ok(result
            .rows
            .iter()
            .filter_map(|row| row.first().map(coerce_to_text))
            .collect())
    }
}

async fn read_sql<R>(file: &mut R) -> Result<String>
where
    R: AsyncRead + Unpin + Send,
{
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .await
        .map_err(|e| GatewayError::read_failed(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| GatewayError::read_failed(format!("not UTF-8 text: {e}")))
}

/// Races `fut` against the caller's token.
///
/// On cancellation the in-flight future is dropped, which returns the
/// statement and the handle lock before `Cancelled` is reported.
async fn with_cancellation<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(GatewayError::Cancelled),
        result = fut => result,
    }
}
