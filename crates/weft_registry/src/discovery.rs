//! Read-only discovery, compatibility and aggregate counts.

use crate::registry::ProtocolRegistry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use weft_core::time::option_duration_ms;
use weft_core::{
    CoreError, CoreResult, ProtocolMaturity, ProtocolStatus, ProtocolType, Timestamp, Version,
};

/// Filter for `discover_protocols`; empty fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiscoveryFilter {
    /// Only this protocol type
    #[serde(rename = "type")]
    pub protocol_type: Option<ProtocolType>,
    /// Only this maturity
    pub maturity: Option<ProtocolMaturity>,
    /// Matches protocols carrying any of these tags
    pub tags: Vec<String>,
}

impl DiscoveryFilter {
    /// Restrict to one type
    #[must_use]
    pub fn with_type(mut self, protocol_type: ProtocolType) -> Self {
        self.protocol_type = Some(protocol_type);
        self
    }

    /// Restrict to one maturity
    #[must_use]
    pub fn with_maturity(mut self, maturity: ProtocolMaturity) -> Self {
        self.maturity = Some(maturity);
        self
    }

    /// Add an accepted tag
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// Discovery view of one protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolSummary {
    /// Protocol id
    pub id: String,
    /// Protocol name
    pub name: String,
    /// Declared version
    pub version: String,
    /// Protocol category
    #[serde(rename = "type")]
    pub protocol_type: ProtocolType,
    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Operation names
    pub operations: Vec<String>,
    /// Ids this protocol depends on
    pub dependencies: Vec<String>,
    /// Maturity, stable when unset
    pub maturity: ProtocolMaturity,
}

/// Result of `discover_protocols`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolDiscovery {
    /// Matching protocols in registration order
    pub protocols: Vec<ProtocolSummary>,
    /// Number of matches
    pub total_count: usize,
    /// When the snapshot was taken
    pub timestamp: Timestamp,
}

/// Discovery view of one operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationSummary {
    /// Owning protocol
    pub protocol_id: String,
    /// Protocol name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Schema checked against input
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    /// Schema checked against output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    /// Per-operation timeout
    #[serde(default, with = "option_duration_ms", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    /// Per-operation retry count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    /// Whether a handler was bound at registration
    pub has_handler: bool,
}

/// Result of `discover_operations`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDiscovery {
    /// Operation names
    pub operations: Vec<OperationSummary>,
    /// Number of matches
    pub total_count: usize,
    /// When the snapshot was taken
    pub timestamp: Timestamp,
}

/// One reason two versions are incompatible
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityIssue {
    /// Always `breaking` for a major mismatch
    #[serde(rename = "type")]
    pub kind: String,
    /// What is incompatible
    pub message: String,
}

/// Result of `check_compatibility`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatibilityReport {
    /// Whether the target can replace the current version
    pub compatible: bool,
    /// Declared version
    pub version: String,
    /// Version asked about
    pub target_version: String,
    /// Incompatibilities found
    pub issues: Vec<CompatibilityIssue>,
    /// Suggested action when incompatible
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

/// Aggregate registry counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    /// Registered protocols
    pub total_protocols: usize,
    /// Indexed operations
    pub total_operations: usize,
    /// Count per protocol type
    pub protocols_by_type: BTreeMap<ProtocolType, usize>,
    /// Count per maturity
    pub protocols_by_maturity: BTreeMap<ProtocolMaturity, usize>,
    /// Count per lifecycle status
    pub protocols_by_status: BTreeMap<ProtocolStatus, usize>,
    /// Number of dependency edges
    pub dependency_count: usize,
    /// When the snapshot was taken
    pub timestamp: Timestamp,
}

impl ProtocolRegistry {
    /// Summaries of protocols matching `filter`
    #[must_use]
    pub fn discover_protocols(&self, filter: &DiscoveryFilter) -> ProtocolDiscovery {
        let protocols: Vec<ProtocolSummary> = self
            .entries
            .values()
            .map(|e| &e.definition)
            .filter(|p| filter.protocol_type.is_none_or(|t| p.protocol_type == t))
            .filter(|p| {
                filter
                    .maturity
                    .is_none_or(|m| p.metadata.maturity_or_default() == m)
            })
            .filter(|p| filter.tags.is_empty() || p.metadata.has_any_tag(&filter.tags))
            .map(|p| ProtocolSummary {
                id: p.id.clone(),
                name: p.name.clone(),
                version: p.version.clone(),
                protocol_type: p.protocol_type,
                description: p.metadata.description.clone(),
                operations: p.operation_names(),
                dependencies: p.dependencies.clone(),
                maturity: p.metadata.maturity_or_default(),
            })
            .collect();

        ProtocolDiscovery {
            total_count: protocols.len(),
            protocols,
            timestamp: Timestamp::now(),
        }
    }

    /// Summaries of indexed operations, optionally of one protocol
    #[must_use]
    pub fn discover_operations(&self, protocol_id: Option<&str>) -> OperationDiscovery {
        let operations: Vec<OperationSummary> = self
            .operations
            .values()
            .filter(|e| protocol_id.is_none_or(|id| e.protocol_id == id))
            .map(|e| OperationSummary {
                protocol_id: e.protocol_id.clone(),
                name: e.operation.name.clone(),
                description: e.operation.description.clone(),
                input_schema: e.operation.input_schema.clone(),
                output_schema: e.operation.output_schema.clone(),
                timeout: e.operation.timeout,
                retries: e.operation.retries,
                has_handler: e.operation.has_handler(),
            })
            .collect();

        OperationDiscovery {
            total_count: operations.len(),
            operations,
            timestamp: Timestamp::now(),
        }
    }

    /// Compare a protocol's version with `target_version`.
    ///
    /// Only the major component matters. With the check disabled every
    /// target is reported compatible.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolNotFound` for unknown ids
    pub fn check_compatibility(
        &self,
        protocol_id: &str,
        target_version: &str,
    ) -> CoreResult<CompatibilityReport> {
        let entry = self
            .entries
            .get(protocol_id)
            .ok_or_else(|| CoreError::ProtocolNotFound {
                protocol_id: protocol_id.to_string(),
            })?;
        let version = entry.definition.version.clone();

        let compatible = !self.config.enable_compatibility_check
            || Version::parse_lenient(&version)
                .is_compatible_with(&Version::parse_lenient(target_version));

        let (issues, recommendation) = if compatible {
            (Vec::new(), None)
        } else {
            (
                vec![CompatibilityIssue {
                    kind: "breaking".to_string(),
                    message: format!(
                        "Version {} is not compatible with {}",
                        target_version, version
                    ),
                }],
                Some(format!("Upgrade to version {}", target_version)),
            )
        };

        Ok(CompatibilityReport {
            compatible,
            version,
            target_version: target_version.to_string(),
            issues,
            recommendation,
        })
    }

    /// Counts by type, maturity and status
    #[must_use]
    pub fn registry_stats(&self) -> RegistryStats {
        let mut by_type: BTreeMap<ProtocolType, usize> =
            ProtocolType::ALL.iter().map(|t| (*t, 0)).collect();
        let mut by_maturity: BTreeMap<ProtocolMaturity, usize> =
            ProtocolMaturity::ALL.iter().map(|m| (*m, 0)).collect();
        let mut by_status: BTreeMap<ProtocolStatus, usize> =
            ProtocolStatus::ALL.iter().map(|s| (*s, 0)).collect();

        for entry in self.entries.values() {
            *by_type.entry(entry.definition.protocol_type).or_default() += 1;
            *by_maturity
                .entry(entry.definition.metadata.maturity_or_default())
                .or_default() += 1;
            *by_status.entry(entry.status).or_default() += 1;
        }

        RegistryStats {
            total_protocols: self.entries.len(),
            total_operations: self.operations.len(),
            protocols_by_type: by_type,
            protocols_by_maturity: by_maturity,
            protocols_by_status: by_status,
            dependency_count: self.graph.edge_count(),
            timestamp: Timestamp::now(),
        }
    }
}
