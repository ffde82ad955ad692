//! Mock database clients for testing.
//!
//! Lets the registry and execution engine be exercised without a live backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{DatabaseClient, QueryResult};
use crate::dialect::Dialect;
use crate::error::{GatewayError, Result};

/// A mock database client that returns a canned result and records every
/// statement it receives.
#[derive(Debug)]
pub struct MockDatabaseClient {
    dialect: Dialect,
    result: QueryResult,
    delay: Duration,
    tracker: MockTracker,
}

/// Shared view of a mock's activity that stays usable after the client has
/// been boxed and handed to a registry.
#[derive(Debug, Clone, Default)]
pub struct MockTracker {
    statements: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl MockTracker {
    /// Returns the statements received so far, in order.
    pub fn statements(&self) -> Vec<String> {
        self.statements
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Returns true once the client has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl MockDatabaseClient {
    /// Creates a mock that returns an empty result.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            result: QueryResult::new(),
            delay: Duration::ZERO,
            tracker: MockTracker::default(),
        }
    }

    /// Sets the result returned by every row-producing statement.
    pub fn with_result(mut self, result: QueryResult) -> Self {
        self.result = result;
        self
    }

    /// Makes every statement take at least `delay` to complete.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Returns a tracker sharing this client's statement log and close flag.
    pub fn tracker(&self) -> MockTracker {
        self.tracker.clone()
    }

    async fn record(&self, sql: &str) {
        if let Ok(mut statements) = self.tracker.statements.lock() {
            statements.push(sql.to_string());
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        self.record(sql).await;
        Ok(0)
    }

    async fn fetch_all(&self, sql: &str) -> Result<QueryResult> {
        self.record(sql).await;
        Ok(self.result.clone())
    }

    async fn close(&self) -> Result<()> {
        self.tracker.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Stage at which a [`FailingDatabaseClient`] reports its error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Prepare,
    Execute,
    Scan,
}

/// A client whose statements always fail at a fixed stage.
#[derive(Debug)]
pub struct FailingDatabaseClient {
    dialect: Dialect,
    stage: FailureStage,
    message: String,
}

impl FailingDatabaseClient {
    pub fn new(dialect: Dialect, stage: FailureStage, message: impl Into<String>) -> Self {
        Self {
            dialect,
            stage,
            message: message.into(),
        }
    }

    fn error(&self) -> GatewayError {
        match self.stage {
            FailureStage::Prepare => GatewayError::prepare(self.message.clone()),
            FailureStage::Execute => GatewayError::execute(self.message.clone()),
            FailureStage::Scan => GatewayError::scan(self.message.clone()),
        }
    }
}

#[async_trait]
impl DatabaseClient for FailingDatabaseClient {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn execute(&self, _sql: &str) -> Result<u64> {
        // Statements sent unprepared never reach the prepare or scan stage.
        Err(GatewayError::execute(self.message.clone()))
    }

    async fn fetch_all(&self, _sql: &str) -> Result<QueryResult> {
        Err(self.error())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
