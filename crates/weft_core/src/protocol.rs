//! Protocol and operation definitions.
//!
//! A protocol is a versioned, schema-described bundle of named operations.
//! Definitions are plain data plus optional handler bindings; the handler
//! is never serialized.

use crate::handler::OperationHandler;
use crate::time::option_duration_ms;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Protocol family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolType {
    /// Core platform protocols
    Core,
    /// Collaboration protocols
    Collab,
    /// Third-party extension protocols
    Extension,
}

impl ProtocolType {
    /// Every protocol type, in declaration order
    pub const ALL: [Self; 3] = [Self::Core, Self::Collab, Self::Extension];

    /// Lowercase name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Collab => "collab",
            Self::Extension => "extension",
        }
    }
}

impl fmt::Display for ProtocolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maturity level declared in protocol metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolMaturity {
    /// Experimental
    Experimental,
    /// Beta
    Beta,
    /// Stable (assumed when undeclared)
    #[default]
    Stable,
    /// Deprecated
    Deprecated,
}

impl ProtocolMaturity {
    /// Every maturity level, in declaration order
    pub const ALL: [Self; 4] = [
        Self::Experimental,
        Self::Beta,
        Self::Stable,
        Self::Deprecated,
    ];
}

/// Lifecycle status of a registered protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolStatus {
    /// Just registered
    Registered,
    /// In active use
    Active,
    /// Temporarily disabled
    Inactive,
    /// Scheduled for removal
    Deprecated,
    /// Removed
    Unregistered,
}

impl ProtocolStatus {
    /// Every status, in declaration order
    pub const ALL: [Self; 5] = [
        Self::Registered,
        Self::Active,
        Self::Inactive,
        Self::Deprecated,
        Self::Unregistered,
    ];
}

/// Descriptive protocol metadata
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolMetadata {
    /// Author
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Discovery tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Declared maturity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maturity: Option<ProtocolMaturity>,
    /// Anything else
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ProtocolMetadata {
    /// Maturity with the stable default applied
    #[must_use]
    pub fn maturity_or_default(&self) -> ProtocolMaturity {
        self.maturity.unwrap_or_default()
    }

    /// Whether any tag matches
    #[must_use]
    pub fn has_any_tag(&self, tags: &[String]) -> bool {
        tags.iter().any(|t| self.tags.contains(t))
    }
}

/// A single named operation of a protocol
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDefinition {
    /// Operation name (unique within the protocol)
    pub name: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// Schema the input must satisfy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    /// Schema the output must satisfy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    /// Bound handler; absence surfaces at call time
    #[serde(skip)]
    pub handler: Option<Arc<dyn OperationHandler>>,
    /// Per-operation timeout overriding the engine default
    #[serde(default, with = "option_duration_ms", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    /// Retries on handler error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
}

impl OperationDefinition {
    /// Create an operation without schemas or handler
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: None,
            output_schema: None,
            handler: None,
            timeout: None,
            retries: None,
        }
    }

    /// Set input schema
    #[must_use]
    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }

    /// Set output schema
    #[must_use]
    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Bind a handler
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn OperationHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Set the timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the retry count
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Whether a handler is bound
    #[must_use]
    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }
}

impl fmt::Debug for OperationDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .field("output_schema", &self.output_schema)
            .field("handler", &self.handler.as_ref().map(|_| "<handler>"))
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .finish()
    }
}

/// A complete protocol definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolDefinition {
    /// Globally unique id once registered
    pub id: String,
    /// Display name (versions are grouped by name)
    pub name: String,
    /// Version string, compared by major component only
    pub version: String,
    /// Protocol family
    #[serde(rename = "type")]
    pub protocol_type: ProtocolType,
    /// Schema document for protocol data
    #[serde(default = "default_schema")]
    pub schema: Value,
    /// Operations keyed by name
    #[serde(default)]
    pub operations: IndexMap<String, OperationDefinition>,
    /// Ids of protocols that must already be registered
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Descriptive metadata
    #[serde(default)]
    pub metadata: ProtocolMetadata,
}

fn default_schema() -> Value {
    serde_json::json!({ "type": "object" })
}

impl ProtocolDefinition {
    /// Create an empty protocol with an `object` schema
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
        protocol_type: ProtocolType,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            protocol_type,
            schema: default_schema(),
            operations: IndexMap::new(),
            dependencies: Vec::new(),
            metadata: ProtocolMetadata::default(),
        }
    }

    /// Set the schema document
    #[must_use]
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }

    /// Add an operation, keyed by its name
    #[must_use]
    pub fn with_operation(mut self, operation: OperationDefinition) -> Self {
        self.operations.insert(operation.name.clone(), operation);
        self
    }

    /// Add a dependency
    #[must_use]
    pub fn with_dependency(mut self, protocol_id: impl Into<String>) -> Self {
        self.dependencies.push(protocol_id.into());
        self
    }

    /// Set metadata
    #[must_use]
    pub fn with_metadata(mut self, metadata: ProtocolMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Look up an operation
    #[must_use]
    pub fn operation(&self, name: &str) -> Option<&OperationDefinition> {
        self.operations.get(name)
    }

    /// Operation names in declaration order
    #[must_use]
    pub fn operation_names(&self) -> Vec<String> {
        self.operations.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_protocol_builder() {
        let protocol = ProtocolDefinition::new("math", "Math", "1.0.0", ProtocolType::Core)
            .with_operation(OperationDefinition::new("add", "Add numbers"))
            .with_operation(OperationDefinition::new("sub", "Subtract numbers"))
            .with_dependency("base");

        assert_eq!(protocol.operation_names(), vec!["add", "sub"]);
        assert_eq!(protocol.dependencies, vec!["base"]);
        assert!(protocol.operation("add").is_some());
        assert!(!protocol.operation("add").unwrap().has_handler());
    }

    #[test]
    fn test_operation_keys_are_unique() {
        let protocol = ProtocolDefinition::new("p", "P", "1.0.0", ProtocolType::Core)
            .with_operation(OperationDefinition::new("op", "first"))
            .with_operation(OperationDefinition::new("op", "second"));
        assert_eq!(protocol.operations.len(), 1);
        assert_eq!(protocol.operation("op").unwrap().description, "second");
    }

    #[test]
    fn test_protocol_deserialize() {
        let protocol: ProtocolDefinition = serde_json::from_value(json!({
            "id": "math",
            "name": "Math",
            "version": "1.0.0",
            "type": "core",
            "operations": {
                "add": { "name": "add", "timeout": 250, "inputSchema": { "type": "object" } }
            },
            "metadata": { "tags": ["arith"], "maturity": "beta", "owner": "team-a" }
        }))
        .unwrap();

        assert_eq!(protocol.protocol_type, ProtocolType::Core);
        assert_eq!(protocol.schema, json!({ "type": "object" }));
        let add = protocol.operation("add").unwrap();
        assert_eq!(add.timeout, Some(Duration::from_millis(250)));
        assert!(add.input_schema.is_some());
        assert_eq!(protocol.metadata.maturity_or_default(), ProtocolMaturity::Beta);
        assert_eq!(protocol.metadata.extra.get("owner"), Some(&json!("team-a")));
    }

    #[test]
    fn test_maturity_defaults_to_stable() {
        assert_eq!(
            ProtocolMetadata::default().maturity_or_default(),
            ProtocolMaturity::Stable
        );
    }

    #[test]
    fn test_has_any_tag() {
        let metadata = ProtocolMetadata {
            tags: vec!["a".to_string(), "b".to_string()],
            ..Default::default()
        };
        assert!(metadata.has_any_tag(&["x".to_string(), "b".to_string()]));
        assert!(!metadata.has_any_tag(&["x".to_string()]));
    }
}
