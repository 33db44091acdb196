//! Namespace and tag scoped facade over a shared store.

use crate::store::CacheStore;
use crate::strategy::{CacheStrategy, SourceFetch, StrategyError, StrategyOptions};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use weft_core::CoreResult;

/// Cache handle for one caller.
///
/// Keys are prefixed with `namespace:` so several clients can share a store
/// without colliding. Tags are tracked client-side for bulk invalidation.
pub struct CacheClient {
    store: Arc<CacheStore>,
    namespace: Option<String>,
    tags: Mutex<HashMap<String, BTreeSet<String>>>,
}

impl CacheClient {
    /// Client over the whole store, without a prefix
    #[must_use]
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self {
            store,
            namespace: None,
            tags: Mutex::new(HashMap::new()),
        }
    }

    /// Client scoped to `namespace`
    #[must_use]
    pub fn namespaced(store: Arc<CacheStore>, namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Self::new(store)
        }
    }

    /// Namespace, if any
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Underlying store
    #[must_use]
    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    fn full_key(&self, key: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{}:{}", ns, key),
            None => key.to_string(),
        }
    }

    /// Read a value
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.store.get(&self.full_key(key)).await
    }

    /// Write a value
    pub async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> bool {
        self.store.set(&self.full_key(key), value, ttl).await
    }

    /// Write a value and file it under `tags`
    pub async fn set_tagged(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
        tags: &[&str],
    ) -> bool {
        let full = self.full_key(key);
        if !self.store.set(&full, value, ttl).await {
            return false;
        }
        let mut index = self.tags.lock().await;
        for tag in tags {
            index.entry((*tag).to_string()).or_default().insert(full.clone());
        }
        // The store evicts and expires without telling us
        let indexed: usize = index.values().map(BTreeSet::len).sum();
        if indexed > self.store.config().max_size {
            self.prune(&mut index).await;
        }
        true
    }

    async fn prune(&self, index: &mut HashMap<String, BTreeSet<String>>) {
        let present = self.store.stored(index.values().flatten()).await;
        for keys in index.values_mut() {
            keys.retain(|k| present.contains(k));
        }
        index.retain(|_, keys| !keys.is_empty());
        tracing::trace!(tags = index.len(), "tag index pruned");
    }

    /// Keys currently filed under `tag`, without the namespace prefix
    pub async fn tagged_keys(&self, tag: &str) -> Vec<String> {
        let mut index = self.tags.lock().await;
        self.prune(&mut index).await;
        let prefix = self.namespace.as_ref().map(|ns| format!("{}:", ns));
        index
            .get(tag)
            .into_iter()
            .flatten()
            .map(|k| match &prefix {
                Some(prefix) => k.strip_prefix(prefix.as_str()).unwrap_or(k.as_str()).to_string(),
                None => k.clone(),
            })
            .collect()
    }

    /// Remove a key
    pub async fn delete(&self, key: &str) -> bool {
        let full = self.full_key(key);
        let removed = self.store.delete(&full).await;
        let mut index = self.tags.lock().await;
        for keys in index.values_mut() {
            keys.remove(&full);
        }
        index.retain(|_, keys| !keys.is_empty());
        removed
    }

    /// Whether a live entry exists
    pub async fn has(&self, key: &str) -> bool {
        self.store.has(&self.full_key(key)).await
    }

    /// Delete every key filed under `tag`, returning how many were present
    pub async fn invalidate_tag(&self, tag: &str) -> usize {
        let keys = self.tags.lock().await.remove(tag).unwrap_or_default();
        let mut removed = 0;
        for key in &keys {
            if self.store.delete(key).await {
                removed += 1;
            }
        }
        tracing::debug!(tag, removed, "cache tag invalidated");
        removed
    }

    /// Keys of this client, without the namespace prefix
    pub async fn keys(&self) -> Vec<String> {
        let keys = self.store.keys().await;
        match &self.namespace {
            Some(ns) => {
                let prefix = format!("{}:", ns);
                keys.into_iter()
                    .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
                    .collect()
            }
            None => keys,
        }
    }

    /// Remove every key of this client, returning the count.
    ///
    /// Without a namespace this clears the whole store.
    ///
    /// # Errors
    ///
    /// Propagates pattern errors from the store
    pub async fn clear(&self) -> CoreResult<usize> {
        self.tags.lock().await.clear();
        match &self.namespace {
            Some(ns) => {
                let pattern = format!("^{}:", regex::escape(ns));
                self.store.clear_pattern(&pattern).await
            }
            None => {
                let size = self.store.size().await;
                self.store.clear().await;
                Ok(size)
            }
        }
    }

    /// Run a strategy for a client-scoped key
    ///
    /// # Errors
    ///
    /// Propagates the strategy's error
    pub async fn fetch(
        &self,
        key: &str,
        strategy: &dyn CacheStrategy,
        source: SourceFetch,
        options: &StrategyOptions,
    ) -> Result<Value, StrategyError> {
        strategy.execute(&self.full_key(key), source, options).await
    }
}
