//! Integration tests for db-switchboard.

pub mod connection_test;
pub mod gateway_test;
pub mod persistence_test;
pub mod query_test;
pub mod registry_test;
