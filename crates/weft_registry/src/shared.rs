//! Registry handle for concurrent access.

use crate::config::RegistryConfig;
use crate::discovery::{
    CompatibilityReport, DiscoveryFilter, OperationDiscovery, ProtocolDiscovery, RegistryStats,
};
use crate::registry::ProtocolRegistry;
use crate::stats::ProtocolStats;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use weft_core::{CoreResult, OperationDefinition, ProtocolDefinition, ProtocolStatus};

/// Thread-safe registry
///
/// Reads share the lock, so discovery never observes a half-applied
/// registration.
pub struct SharedRegistry {
    inner: RwLock<ProtocolRegistry>,
}

impl SharedRegistry {
    /// Create an empty shared registry
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        Self::from_registry(ProtocolRegistry::new(config))
    }

    /// Wrap an existing registry
    #[must_use]
    pub fn from_registry(registry: ProtocolRegistry) -> Self {
        Self {
            inner: RwLock::new(registry),
        }
    }

    /// Shared read access for multi-step reads
    pub async fn read(&self) -> RwLockReadGuard<'_, ProtocolRegistry> {
        self.inner.read().await
    }

    /// Exclusive access for multi-step updates
    pub async fn write(&self) -> RwLockWriteGuard<'_, ProtocolRegistry> {
        self.inner.write().await
    }

    /// Register a protocol
    ///
    /// # Errors
    ///
    /// See [`ProtocolRegistry::register`]
    pub async fn register(&self, definition: ProtocolDefinition) -> CoreResult<()> {
        self.inner.write().await.register(definition)
    }

    /// Unregister a protocol
    ///
    /// # Errors
    ///
    /// See [`ProtocolRegistry::unregister`]
    pub async fn unregister(&self, protocol_id: &str) -> CoreResult<bool> {
        self.inner.write().await.unregister(protocol_id)
    }

    /// Definition of a protocol
    pub async fn get(&self, protocol_id: &str) -> Option<ProtocolDefinition> {
        self.inner.read().await.get(protocol_id).cloned()
    }

    /// Check if a protocol is registered
    pub async fn contains(&self, protocol_id: &str) -> bool {
        self.inner.read().await.contains(protocol_id)
    }

    /// Operation of a protocol
    pub async fn get_operation(
        &self,
        protocol_id: &str,
        operation: &str,
    ) -> Option<OperationDefinition> {
        self.inner
            .read()
            .await
            .get_operation(protocol_id, operation)
            .cloned()
    }

    /// Every definition
    pub async fn list(&self) -> Vec<ProtocolDefinition> {
        self.inner.read().await.list().into_iter().cloned().collect()
    }

    /// Case-insensitive search
    pub async fn search(&self, query: &str) -> Vec<ProtocolDefinition> {
        self.inner
            .read()
            .await
            .search(query)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Lifecycle status
    pub async fn status(&self, protocol_id: &str) -> Option<ProtocolStatus> {
        self.inner.read().await.status(protocol_id)
    }

    /// Set the lifecycle status
    pub async fn set_status(&self, protocol_id: &str, status: ProtocolStatus) -> bool {
        self.inner.write().await.set_status(protocol_id, status)
    }

    /// Filtered protocol summaries
    pub async fn discover_protocols(&self, filter: &DiscoveryFilter) -> ProtocolDiscovery {
        self.inner.read().await.discover_protocols(filter)
    }

    /// Operation summaries
    pub async fn discover_operations(&self, protocol_id: Option<&str>) -> OperationDiscovery {
        self.inner.read().await.discover_operations(protocol_id)
    }

    /// Version compatibility
    ///
    /// # Errors
    ///
    /// Returns `ProtocolNotFound` for unknown ids
    pub async fn check_compatibility(
        &self,
        protocol_id: &str,
        target_version: &str,
    ) -> CoreResult<CompatibilityReport> {
        self.inner
            .read()
            .await
            .check_compatibility(protocol_id, target_version)
    }

    /// Stats of a protocol
    pub async fn stats(&self, protocol_id: &str) -> Option<ProtocolStats> {
        self.inner.read().await.stats(protocol_id).cloned()
    }

    /// Fold one execution into the stats
    pub async fn update_execution_stats(
        &self,
        protocol_id: &str,
        operation: &str,
        execution_ms: u64,
        success: bool,
    ) {
        self.inner
            .write()
            .await
            .update_execution_stats(protocol_id, operation, execution_ms, success);
    }

    /// Aggregate counts
    pub async fn registry_stats(&self) -> RegistryStats {
        self.inner.read().await.registry_stats()
    }
}

impl Default for SharedRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}
