//! Per-call operation context.

use crate::id::TraceId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Context handed to a handler for one invocation.
///
/// A fresh value is built per call and moved into the handler; it is never
/// shared between concurrent calls.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationContext {
    /// Protocol being invoked
    #[serde(default)]
    pub protocol_id: String,
    /// Operation being invoked
    #[serde(default)]
    pub operation_name: String,
    /// Caller session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Calling agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Free-form metadata
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, Value>,
    /// Trace correlation id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<TraceId>,
}

impl OperationContext {
    /// Create a context for an operation
    #[must_use]
    pub fn new(protocol_id: impl Into<String>, operation_name: impl Into<String>) -> Self {
        Self {
            protocol_id: protocol_id.into(),
            operation_name: operation_name.into(),
            ..Default::default()
        }
    }

    /// Set the session id
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Set the agent id
    #[must_use]
    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Add a metadata entry
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Set the trace id
    #[must_use]
    pub fn with_trace(mut self, trace: TraceId) -> Self {
        self.trace = Some(trace);
        self
    }

    /// Fill in the target of the call where the caller left it blank
    #[must_use]
    pub fn complete(mut self, protocol_id: &str, operation_name: &str) -> Self {
        if self.protocol_id.is_empty() {
            self.protocol_id = protocol_id.to_string();
        }
        if self.operation_name.is_empty() {
            self.operation_name = operation_name.to_string();
        }
        self
    }
}
