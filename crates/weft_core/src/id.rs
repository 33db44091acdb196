//! Identifiers for WEFT entities.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Index key for an operation: `protocolId:operationName`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationKey(String);

impl OperationKey {
    /// Build the key for an operation of a protocol
    #[must_use]
    pub fn new(protocol_id: &str, operation: &str) -> Self {
        Self(format!("{}:{}", protocol_id, operation))
    }

    /// Split back into protocol id and operation name.
    ///
    /// Protocol ids may not contain `:` reliably, so the split happens at the
    /// last separator.
    #[must_use]
    pub fn split(&self) -> (&str, &str) {
        self.0.rsplit_once(':').unwrap_or((self.0.as_str(), ""))
    }

    /// Key as string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OperationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for OperationKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Trace identifier attached to an operation context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TraceId(Uuid);

impl TraceId {
    /// Create a new random TraceId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get as UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "trace_{}", self.0)
    }
}
