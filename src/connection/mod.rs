//! Connection management for the gateway.
//!
//! Owns every tenant's open backend handles and decides which one is active.

pub mod registry;

pub use registry::{ActivationPolicy, ConnectionHandle, ConnectionRegistry, TenantConnection};
