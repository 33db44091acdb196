//! Protocol registry.

use crate::config::RegistryConfig;
use crate::graph::DependencyGraph;
use crate::stats::{ExecutionStats, ProtocolStats};
use indexmap::{IndexMap, IndexSet};
use std::sync::Arc;
use weft_core::{
    CoreError, CoreResult, OperationDefinition, OperationKey, ProtocolDefinition,
    ProtocolMaturity, ProtocolStatus, ProtocolType, Timestamp,
};
use weft_events::{Event, EventFeed, ProtocolRegistered, ProtocolUnregistered};

/// A registered protocol with its lifecycle state
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    /// Registered definition
    pub definition: ProtocolDefinition,
    /// Lifecycle status
    pub status: ProtocolStatus,
    /// When the definition was stored
    pub registered_at: Timestamp,
    /// Last recorded execution
    pub last_used: Option<Timestamp>,
    /// Rolling statistics
    pub stats: ProtocolStats,
}

impl RegistryEntry {
    fn new(definition: ProtocolDefinition) -> Self {
        let stats = ProtocolStats::new(definition.operations.len());
        Self {
            definition,
            status: ProtocolStatus::Registered,
            registered_at: Timestamp::now(),
            last_used: None,
            stats,
        }
    }
}

/// Indexed operation, addressable by `protocolId:operationName`
#[derive(Debug, Clone)]
pub(crate) struct OperationEntry {
    pub(crate) protocol_id: String,
    pub(crate) operation: OperationDefinition,
    pub(crate) stats: ExecutionStats,
}

/// Registry of protocols
///
/// Owns every definition, the operation index, the version sets per
/// protocol name and the dependency graph. All mutation goes through
/// `register`, `unregister`, `set_status`, `update_execution_stats` and
/// `clear`; every other method is a read.
pub struct ProtocolRegistry {
    pub(crate) config: RegistryConfig,
    pub(crate) entries: IndexMap<String, RegistryEntry>,
    pub(crate) operations: IndexMap<OperationKey, OperationEntry>,
    pub(crate) versions: IndexMap<String, IndexSet<String>>,
    pub(crate) graph: DependencyGraph,
    feed: Option<Arc<dyn EventFeed>>,
}

impl ProtocolRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        tracing::debug!(?config, "protocol registry initialized");
        Self {
            config,
            entries: IndexMap::new(),
            operations: IndexMap::new(),
            versions: IndexMap::new(),
            graph: DependencyGraph::new(),
            feed: None,
        }
    }

    /// Publish lifecycle events to `feed`
    #[must_use]
    pub fn with_event_feed(mut self, feed: Arc<dyn EventFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn publish(&self, event: Event) {
        if let Some(feed) = &self.feed {
            feed.publish(event);
        }
    }

    /// Register a protocol.
    ///
    /// With versioning enabled an existing id is replaced, as long as the
    /// protocol name has room for another version.
    ///
    /// # Errors
    ///
    /// - `DuplicateProtocol` if the id exists and versioning is off
    /// - `TooManyVersions` if the name already holds the maximum
    /// - `MissingDependency` if a dependency is not registered
    /// - `DependencyCycle` if a replacement would depend on its own dependent
    pub fn register(&mut self, definition: ProtocolDefinition) -> CoreResult<()> {
        let protocol_id = definition.id.clone();
        let replacing = self.entries.contains_key(&protocol_id);

        if replacing {
            if !self.config.enable_versioning {
                return Err(CoreError::DuplicateProtocol { protocol_id });
            }
            self.check_version_room(&definition)?;
        }

        for dependency in &definition.dependencies {
            if !self.entries.contains_key(dependency) {
                return Err(CoreError::MissingDependency {
                    protocol_id,
                    dependency: dependency.clone(),
                });
            }
        }

        if let Some(dependency) = self.graph.find_cycle(&protocol_id, &definition.dependencies) {
            return Err(CoreError::DependencyCycle {
                protocol_id,
                dependency: dependency.clone(),
            });
        }

        if let Some(previous) = self.entries.get(&protocol_id) {
            let stale: Vec<OperationKey> = previous
                .definition
                .operations
                .keys()
                .map(|op| OperationKey::new(&protocol_id, op))
                .collect();
            for key in stale {
                self.operations.shift_remove(&key);
            }
        }

        for (name, operation) in &definition.operations {
            self.operations.insert(
                OperationKey::new(&protocol_id, name),
                OperationEntry {
                    protocol_id: protocol_id.clone(),
                    operation: operation.clone(),
                    stats: ExecutionStats::default(),
                },
            );
        }

        self.versions
            .entry(definition.name.clone())
            .or_insert_with(IndexSet::new)
            .insert(definition.version.clone());
        self.graph.link(&protocol_id, &definition.dependencies);

        tracing::info!(
            protocol_id = %protocol_id,
            name = %definition.name,
            version = %definition.version,
            protocol_type = %definition.protocol_type,
            operation_count = definition.operations.len(),
            replaced = replacing,
            "protocol registered"
        );

        let event = Event::ProtocolRegistered(ProtocolRegistered::of(&definition));
        self.entries
            .insert(protocol_id, RegistryEntry::new(definition));
        self.publish(event);
        Ok(())
    }

    fn check_version_room(&self, definition: &ProtocolDefinition) -> CoreResult<()> {
        let Some(versions) = self.versions.get(&definition.name) else {
            return Ok(());
        };
        let limit = self.config.max_versions_per_protocol;
        if !versions.contains(&definition.version) && versions.len() >= limit {
            return Err(CoreError::TooManyVersions {
                name: definition.name.clone(),
                limit,
            });
        }
        Ok(())
    }

    /// Forget the version history of a removed definition.
    ///
    /// The whole set goes once no entry carries the name; otherwise only the
    /// removed version, unless another entry still holds it.
    fn release_versions(&mut self, removed: &ProtocolDefinition) {
        let name = &removed.name;
        if !self.entries.values().any(|e| &e.definition.name == name) {
            self.versions.shift_remove(name);
            return;
        }
        let held = self
            .entries
            .values()
            .any(|e| &e.definition.name == name && e.definition.version == removed.version);
        if held {
            return;
        }
        if let Some(versions) = self.versions.get_mut(name) {
            versions.shift_remove(&removed.version);
        }
    }

    /// Unregister a protocol, returning `false` if it was not registered.
    ///
    /// # Errors
    ///
    /// Returns `HasDependents`, listing them sorted, while other protocols
    /// still depend on it
    pub fn unregister(&mut self, protocol_id: &str) -> CoreResult<bool> {
        if !self.entries.contains_key(protocol_id) {
            return Ok(false);
        }

        if self.graph.has_dependents(protocol_id) {
            let mut dependents = self.graph.dependents_of(protocol_id);
            dependents.sort();
            return Err(CoreError::HasDependents {
                protocol_id: protocol_id.to_string(),
                dependents,
            });
        }

        let Some(entry) = self.entries.shift_remove(protocol_id) else {
            return Ok(false);
        };
        for name in entry.definition.operations.keys() {
            self.operations
                .shift_remove(&OperationKey::new(protocol_id, name));
        }

        self.release_versions(&entry.definition);
        self.graph.unlink(protocol_id);

        tracing::info!(protocol_id, "protocol unregistered");
        self.publish(Event::ProtocolUnregistered(ProtocolUnregistered {
            protocol_id: protocol_id.to_string(),
            timestamp: Timestamp::now(),
        }));
        Ok(true)
    }

    /// Definition of a protocol
    #[must_use]
    pub fn get(&self, protocol_id: &str) -> Option<&ProtocolDefinition> {
        self.entries.get(protocol_id).map(|e| &e.definition)
    }

    /// Full entry of a protocol
    #[must_use]
    pub fn entry(&self, protocol_id: &str) -> Option<&RegistryEntry> {
        self.entries.get(protocol_id)
    }

    /// Check if a protocol is registered
    #[must_use]
    pub fn contains(&self, protocol_id: &str) -> bool {
        self.entries.contains_key(protocol_id)
    }

    /// Lifecycle status of a protocol
    #[must_use]
    pub fn status(&self, protocol_id: &str) -> Option<ProtocolStatus> {
        self.entries.get(protocol_id).map(|e| e.status)
    }

    /// Set the lifecycle status, returning `false` for unknown ids
    pub fn set_status(&mut self, protocol_id: &str, status: ProtocolStatus) -> bool {
        match self.entries.get_mut(protocol_id) {
            Some(entry) => {
                entry.status = status;
                tracing::debug!(protocol_id, ?status, "protocol status updated");
                true
            }
            None => false,
        }
    }

    /// Operation of a protocol
    #[must_use]
    pub fn get_operation(&self, protocol_id: &str, operation: &str) -> Option<&OperationDefinition> {
        self.operations
            .get(&OperationKey::new(protocol_id, operation))
            .map(|e| &e.operation)
    }

    /// Check if an operation is indexed
    #[must_use]
    pub fn has_operation(&self, protocol_id: &str, operation: &str) -> bool {
        self.operations
            .contains_key(&OperationKey::new(protocol_id, operation))
    }

    /// Every definition, in registration order
    #[must_use]
    pub fn list(&self) -> Vec<&ProtocolDefinition> {
        self.entries.values().map(|e| &e.definition).collect()
    }

    /// Registered ids, in registration order
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Number of registered protocols
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Protocols of one type
    #[must_use]
    pub fn protocols_by_type(&self, protocol_type: ProtocolType) -> Vec<&ProtocolDefinition> {
        self.entries
            .values()
            .filter(|e| e.definition.protocol_type == protocol_type)
            .map(|e| &e.definition)
            .collect()
    }

    /// Protocols of one maturity, unset maturity counting as stable
    #[must_use]
    pub fn protocols_by_maturity(&self, maturity: ProtocolMaturity) -> Vec<&ProtocolDefinition> {
        self.entries
            .values()
            .filter(|e| e.definition.metadata.maturity_or_default() == maturity)
            .map(|e| &e.definition)
            .collect()
    }

    /// Case-insensitive substring search over name, id, description and tags
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<&ProtocolDefinition> {
        let query = query.to_lowercase();
        self.entries
            .values()
            .map(|e| &e.definition)
            .filter(|p| {
                p.name.to_lowercase().contains(&query)
                    || p.id.to_lowercase().contains(&query)
                    || p.metadata
                        .description
                        .as_ref()
                        .is_some_and(|d| d.to_lowercase().contains(&query))
                    || p.metadata
                        .tags
                        .iter()
                        .any(|t| t.to_lowercase().contains(&query))
            })
            .collect()
    }

    /// Stats of a protocol
    #[must_use]
    pub fn stats(&self, protocol_id: &str) -> Option<&ProtocolStats> {
        self.entries.get(protocol_id).map(|e| &e.stats)
    }

    /// Stats of one operation
    #[must_use]
    pub fn operation_stats(&self, protocol_id: &str, operation: &str) -> Option<&ExecutionStats> {
        self.operations
            .get(&OperationKey::new(protocol_id, operation))
            .map(|e| &e.stats)
    }

    /// Fold one execution into protocol and operation stats.
    ///
    /// No-op when stats are disabled. Unknown ids are ignored.
    pub fn update_execution_stats(
        &mut self,
        protocol_id: &str,
        operation: &str,
        execution_ms: u64,
        success: bool,
    ) {
        if !self.config.enable_stats {
            return;
        }

        if let Some(entry) = self.entries.get_mut(protocol_id) {
            entry.last_used = Some(Timestamp::now());
            entry.stats.record(execution_ms, success);
        }
        if let Some(entry) = self
            .operations
            .get_mut(&OperationKey::new(protocol_id, operation))
        {
            entry.stats.record(execution_ms, success);
        }
    }

    /// Versions registered under a protocol name
    #[must_use]
    pub fn versions_of(&self, name: &str) -> Vec<String> {
        self.versions
            .get(name)
            .map(|v| v.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Direct dependencies of a protocol
    #[must_use]
    pub fn dependencies_of(&self, protocol_id: &str) -> Vec<String> {
        self.graph.dependencies_of(protocol_id)
    }

    /// Protocols that depend on `protocol_id`
    #[must_use]
    pub fn dependents_of(&self, protocol_id: &str) -> Vec<String> {
        self.graph.dependents_of(protocol_id)
    }

    /// Remove everything, without events
    pub fn clear(&mut self) {
        self.entries.clear();
        self.operations.clear();
        self.versions.clear();
        self.graph.clear();
        tracing::info!("protocol registry cleared");
    }
}

impl Default for ProtocolRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}
