//! Lifecycle and execution events.
//!
//! Every event name has one fixed payload shape. Payloads serialize with
//! camelCase field names.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use weft_core::{ProtocolDefinition, ProtocolType, SchemaViolation, Timestamp, ValidationStage};

/// Event kind - name an event is published under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    /// `protocol:registered`
    #[serde(rename = "protocol:registered")]
    ProtocolRegistered,
    /// `protocol:unregistered`
    #[serde(rename = "protocol:unregistered")]
    ProtocolUnregistered,
    /// `operation:started`
    #[serde(rename = "operation:started")]
    OperationStarted,
    /// `operation:completed`
    #[serde(rename = "operation:completed")]
    OperationCompleted,
    /// `operation:failed`
    #[serde(rename = "operation:failed")]
    OperationFailed,
    /// `validation:failed`
    #[serde(rename = "validation:failed")]
    ValidationFailed,
    /// `engine:started`
    #[serde(rename = "engine:started")]
    EngineStarted,
    /// `engine:stopped`
    #[serde(rename = "engine:stopped")]
    EngineStopped,
}

impl EventKind {
    /// Every kind, in declaration order
    pub const ALL: [Self; 8] = [
        Self::ProtocolRegistered,
        Self::ProtocolUnregistered,
        Self::OperationStarted,
        Self::OperationCompleted,
        Self::OperationFailed,
        Self::ValidationFailed,
        Self::EngineStarted,
        Self::EngineStopped,
    ];

    /// Wire name of the event
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ProtocolRegistered => "protocol:registered",
            Self::ProtocolUnregistered => "protocol:unregistered",
            Self::OperationStarted => "operation:started",
            Self::OperationCompleted => "operation:completed",
            Self::OperationFailed => "operation:failed",
            Self::ValidationFailed => "validation:failed",
            Self::EngineStarted => "engine:started",
            Self::EngineStopped => "engine:stopped",
        }
    }

    /// Look a kind up by wire name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    /// Whether the event ends an operation
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::OperationCompleted | Self::OperationFailed)
    }

    /// Whether the event reports a failure
    #[must_use]
    pub const fn is_error(self) -> bool {
        matches!(self, Self::OperationFailed | Self::ValidationFailed)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of `protocol:registered`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolRegistered {
    /// Protocol concerned
    pub protocol_id: String,
    /// Human-readable protocol name
    pub protocol_name: String,
    /// Declared version string
    pub version: String,
    /// Protocol category
    #[serde(rename = "type")]
    pub protocol_type: ProtocolType,
    /// When the event was raised
    pub timestamp: Timestamp,
}

impl ProtocolRegistered {
    /// Payload describing `definition`, stamped now
    #[must_use]
    pub fn of(definition: &ProtocolDefinition) -> Self {
        Self {
            protocol_id: definition.id.clone(),
            protocol_name: definition.name.clone(),
            version: definition.version.clone(),
            protocol_type: definition.protocol_type,
            timestamp: Timestamp::now(),
        }
    }
}

/// Payload of `protocol:unregistered`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolUnregistered {
    /// Protocol concerned
    pub protocol_id: String,
    /// When the event was raised
    pub timestamp: Timestamp,
}

/// Payload of `operation:started`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStarted {
    /// Protocol concerned
    pub protocol_id: String,
    /// Operation concerned
    pub operation_name: String,
    /// Session of the calling context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// When the event was raised
    pub timestamp: Timestamp,
}

/// Payload of `operation:completed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationCompleted {
    /// Protocol concerned
    pub protocol_id: String,
    /// Operation concerned
    pub operation_name: String,
    /// Milliseconds spent, never below one
    pub execution_time: u64,
    /// When the event was raised
    pub timestamp: Timestamp,
}

/// Payload of `operation:failed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationFailed {
    /// Protocol concerned
    pub protocol_id: String,
    /// Operation concerned
    pub operation_name: String,
    /// Failure message
    pub error: String,
    /// Milliseconds spent, never below one
    pub execution_time: u64,
    /// When the event was raised
    pub timestamp: Timestamp,
}

/// Payload of `validation:failed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationFailed {
    /// Protocol concerned
    pub protocol_id: String,
    /// Operation concerned
    pub operation_name: String,
    /// Input or output
    pub stage: ValidationStage,
    /// Every violation found
    pub errors: Vec<SchemaViolation>,
    /// When the event was raised
    pub timestamp: Timestamp,
}

/// Payload of `engine:started` and `engine:stopped`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineLifecycle {
    /// Protocols registered at the transition
    pub protocol_count: usize,
    /// When the event was raised
    pub timestamp: Timestamp,
}

/// A published event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum Event {
    #[serde(rename = "protocol:registered")]
    ProtocolRegistered(ProtocolRegistered),
    #[serde(rename = "protocol:unregistered")]
    ProtocolUnregistered(ProtocolUnregistered),
    #[serde(rename = "operation:started")]
    OperationStarted(OperationStarted),
    #[serde(rename = "operation:completed")]
    OperationCompleted(OperationCompleted),
    #[serde(rename = "operation:failed")]
    OperationFailed(OperationFailed),
    #[serde(rename = "validation:failed")]
    ValidationFailed(ValidationFailed),
    #[serde(rename = "engine:started")]
    EngineStarted(EngineLifecycle),
    #[serde(rename = "engine:stopped")]
    EngineStopped(EngineLifecycle),
}

impl Event {
    /// Kind of this event
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::ProtocolRegistered(_) => EventKind::ProtocolRegistered,
            Self::ProtocolUnregistered(_) => EventKind::ProtocolUnregistered,
            Self::OperationStarted(_) => EventKind::OperationStarted,
            Self::OperationCompleted(_) => EventKind::OperationCompleted,
            Self::OperationFailed(_) => EventKind::OperationFailed,
            Self::ValidationFailed(_) => EventKind::ValidationFailed,
            Self::EngineStarted(_) => EventKind::EngineStarted,
            Self::EngineStopped(_) => EventKind::EngineStopped,
        }
    }

    /// Wire name of this event
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Protocol the event concerns, if any
    #[must_use]
    pub fn protocol_id(&self) -> Option<&str> {
        match self {
            Self::ProtocolRegistered(p) => Some(&p.protocol_id),
            Self::ProtocolUnregistered(p) => Some(&p.protocol_id),
            Self::OperationStarted(p) => Some(&p.protocol_id),
            Self::OperationCompleted(p) => Some(&p.protocol_id),
            Self::OperationFailed(p) => Some(&p.protocol_id),
            Self::ValidationFailed(p) => Some(&p.protocol_id),
            Self::EngineStarted(_) | Self::EngineStopped(_) => None,
        }
    }

    /// Payload as a JSON document
    #[must_use]
    pub fn payload(&self) -> Value {
        let encoded = match self {
            Self::ProtocolRegistered(p) => serde_json::to_value(p),
            Self::ProtocolUnregistered(p) => serde_json::to_value(p),
            Self::OperationStarted(p) => serde_json::to_value(p),
            Self::OperationCompleted(p) => serde_json::to_value(p),
            Self::OperationFailed(p) => serde_json::to_value(p),
            Self::ValidationFailed(p) => serde_json::to_value(p),
            Self::EngineStarted(p) | Self::EngineStopped(p) => serde_json::to_value(p),
        };
        encoded.unwrap_or_default()
    }

    pub fn is_terminal(&self) -> bool {
        self.kind().is_terminal()
    }

    pub fn is_error(&self) -> bool {
        self.kind().is_error()
    }
}
