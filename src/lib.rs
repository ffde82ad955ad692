//! db-switchboard - a multi-tenant SQL gateway.
//!
//! Many logged-in users each hold live connections to PostgreSQL, MySQL or
//! SQLite backends. The [`gateway::Gateway`] routes their SQL text to the
//! active connection, returns uniform text tables and keeps a per-user,
//! per-database history.

pub mod classify;
pub mod cli;
pub mod config;
pub mod connection;
pub mod db;
pub mod dialect;
pub mod error;
pub mod gateway;
pub mod history;
pub mod logging;
pub mod persistence;
pub mod query;
pub mod uploads;
