//! WEFT Protocol Engine
//!
//! Registers protocols after schema and dependency checks, indexes their
//! operation handlers and executes operations with input/output validation,
//! timeouts, retries, metrics and lifecycle events. Execution never returns
//! an error: every outcome is an [`ExecutionResult`].

#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod metrics;
pub mod result;
pub mod telemetry;

pub use config::{ConfigError, EngineConfig, WeftConfig};
pub use engine::{EngineStatus, ProtocolEngine};
pub use metrics::EngineMetrics;
pub use result::{ExecutionMetadata, ExecutionResult};
pub use telemetry::{TelemetryConfig, init_tracing};
