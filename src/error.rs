//! Error types for the gateway.
//!
//! Defines the main error enum used throughout the crate. Backend failures are
//! carried as strings with the operation that was being attempted, so callers
//! see the driver's message verbatim.

use thiserror::Error;

/// Authentication failures surfaced by login and registration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Unknown user or wrong password.
    #[error("invalid login or password")]
    InvalidCredentials,

    /// Registration for a login that already exists.
    #[error("user '{0}' is already registered")]
    AlreadyExists(String),

    /// The tenant has not logged in (or has logged out).
    #[error("user '{0}' is not logged in")]
    NotLoggedIn(String),
}

/// Main error type for gateway operations.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Credential errors (bad credentials, duplicate registration, no session).
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// No active backend connection resolved for the tenant.
    #[error("No active connection for '{0}'")]
    NoConnection(String),

    /// The dialect name is not one of postgres, mysql or sqlite, or the
    /// operation is not available for the dialect.
    #[error("Unsupported dialect: {0}")]
    UnsupportedDialect(String),

    /// Opening a backend connection failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The backend rejected the statement while preparing it.
    #[error("Failed to prepare statement: {0}")]
    Prepare(String),

    /// The backend failed while executing the statement.
    #[error("Failed to execute statement: {0}")]
    Execute(String),

    /// A result row could not be read back into text.
    #[error("Failed to read result row: {0}")]
    Scan(String),

    /// A file-based operation was called without a file.
    #[error("Missing file")]
    MissingFile,

    /// The uploaded file could not be read.
    #[error("Failed to read file: {0}")]
    ReadFailed(String),

    /// Uploaded databases could not be materialized on storage.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The credential/history store failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Configuration errors (invalid config file, bad values, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The caller cancelled the request before the backend finished.
    #[error("Request cancelled")]
    Cancelled,

    /// Internal errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Creates a no-connection error for the given tenant.
    pub fn no_connection(tenant: impl Into<String>) -> Self {
        Self::NoConnection(tenant.into())
    }

    /// Creates an unsupported-dialect error with the given message.
    pub fn unsupported_dialect(msg: impl Into<String>) -> Self {
        Self::UnsupportedDialect(msg.into())
    }

    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a prepare error with the given message.
    pub fn prepare(msg: impl Into<String>) -> Self {
        Self::Prepare(msg.into())
    }

    /// Creates an execute error with the given message.
    pub fn execute(msg: impl Into<String>) -> Self {
        Self::Execute(msg.into())
    }

    /// Creates a scan error with the given message.
    pub fn scan(msg: impl Into<String>) -> Self {
        Self::Scan(msg.into())
    }

    /// Creates a read error with the given message.
    pub fn read_failed(msg: impl Into<String>) -> Self {
        Self::ReadFailed(msg.into())
    }

    /// Creates a storage error with the given message.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Creates a persistence error with the given message.
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Auth(_) => "Authentication Error",
            Self::NoConnection(_) => "No Connection",
            Self::UnsupportedDialect(_) => "Unsupported Dialect",
            Self::Connection(_) => "Connection Error",
            Self::Prepare(_) => "Prepare Failed",
            Self::Execute(_) => "Execute Failed",
            Self::Scan(_) => "Scan Failed",
            Self::MissingFile => "Missing File",
            Self::ReadFailed(_) => "Read Failed",
            Self::Storage(_) => "Storage Error",
            Self::Persistence(_) => "Persistence Error",
            Self::Config(_) => "Configuration Error",
            Self::Cancelled => "Cancelled",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using GatewayError.
pub type Result<T> = std::result::Result<T, GatewayError>;
