//! WEFT Protocol Registry
//!
//! Authoritative store of protocol definitions: lifecycle status, version
//! sets per protocol name, the dependency graph between protocols, rolling
//! execution statistics and read-only discovery over all of it.

#![warn(clippy::all)]

pub mod config;
pub mod discovery;
pub mod graph;
pub mod registry;
pub mod shared;
pub mod stats;

pub use config::RegistryConfig;
pub use discovery::{
    CompatibilityIssue, CompatibilityReport, DiscoveryFilter, OperationDiscovery,
    OperationSummary, ProtocolDiscovery, ProtocolSummary, RegistryStats,
};
pub use graph::DependencyGraph;
pub use registry::{ProtocolRegistry, RegistryEntry};
pub use shared::SharedRegistry;
pub use stats::{ExecutionStats, ProtocolStats};
