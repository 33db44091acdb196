//! WEFT Core Types
//!
//! Shared vocabulary for the protocol substrate: protocol and operation
//! definitions, handler binding, per-call context, versions, timestamps and
//! the error taxonomy every other crate reports through.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod error;
pub mod handler;
pub mod id;
pub mod protocol;
pub mod time;
pub mod version;
pub mod violation;

// Re-exports
pub use context::OperationContext;
pub use error::{CoreError, CoreResult};
pub use handler::{FnHandler, OperationHandler, handler_fn};
pub use id::{OperationKey, TraceId};
pub use protocol::{
    OperationDefinition, ProtocolDefinition, ProtocolMaturity, ProtocolMetadata, ProtocolStatus,
    ProtocolType,
};
pub use time::{Stopwatch, Timestamp, clamp_execution_ms};
pub use version::Version;
pub use violation::{SchemaViolation, ValidationOutcome, ValidationStage};
