//! Tag and namespace aware cache provider.
//!
//! A separate store whose entries carry tags and an optional namespace.
//! Inverted indexes (tag -> keys, namespace -> keys) are updated on every
//! write and removal so bulk deletion never scans the whole map. Eviction
//! scans the live entries for the extremal candidate of the chosen policy.

use crate::entry::effective_ttl;
use crate::metrics::CacheMetrics;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use weft_core::time::duration_ms;

/// Victim selection when the provider is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Least recently accessed
    #[default]
    Lru,
    /// Fewest accesses
    Lfu,
    /// Oldest write
    Fifo,
    /// Uniformly random
    Random,
}

impl EvictionPolicy {
    /// Lowercase name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lru => "lru",
            Self::Lfu => "lfu",
            Self::Fifo => "fifo",
            Self::Random => "random",
        }
    }
}

/// Provider configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaggedCacheConfig {
    /// Maximum number of entries
    pub max_size: usize,
    /// Lifetime when a write gives none; zero never expires
    #[serde(with = "duration_ms")]
    pub default_ttl: Duration,
    /// Victim selection at capacity
    pub policy: EvictionPolicy,
    /// Seed for random eviction; entropy when absent
    pub seed: Option<u64>,
}

impl Default for TaggedCacheConfig {
    fn default() -> Self {
        Self {
            max_size: crate::config::DEFAULT_MAX_SIZE,
            default_ttl: Duration::from_secs(crate::config::DEFAULT_TTL_SECS),
            policy: EvictionPolicy::Lru,
            seed: None,
        }
    }
}

impl TaggedCacheConfig {
    /// Set the capacity
    #[must_use]
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Set the eviction policy
    #[must_use]
    pub fn with_policy(mut self, policy: EvictionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Seed random eviction
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Options for one write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaggedSet {
    /// Lifetime of this entry; `None` uses the default
    pub ttl: Option<Duration>,
    /// Tags the key is filed under
    pub tags: Vec<String>,
    /// Namespace the key belongs to
    pub namespace: Option<String>,
}

impl TaggedSet {
    /// Add a tag
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// File the entry under a namespace
    #[must_use]
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the TTL
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

#[derive(Debug, Clone)]
struct TaggedEntry {
    value: Value,
    tags: BTreeSet<String>,
    namespace: Option<String>,
    ttl: Option<Duration>,
    created_at: Instant,
    accessed_at: Instant,
    access_count: u64,
    write_seq: u64,
    access_seq: u64,
}

impl TaggedEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.saturating_duration_since(self.created_at) > ttl)
    }
}

struct TaggedState {
    entries: HashMap<String, TaggedEntry>,
    by_tag: HashMap<String, HashSet<String>>,
    by_namespace: HashMap<String, HashSet<String>>,
    metrics: CacheMetrics,
    seq: u64,
    rng: SmallRng,
}

impl TaggedState {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn unindex(&mut self, key: &str, entry: &TaggedEntry) {
        for tag in &entry.tags {
            if let Some(keys) = self.by_tag.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.by_tag.remove(tag);
                }
            }
        }
        if let Some(ns) = &entry.namespace {
            if let Some(keys) = self.by_namespace.get_mut(ns) {
                keys.remove(key);
                if keys.is_empty() {
                    self.by_namespace.remove(ns);
                }
            }
        }
    }

    fn index(&mut self, key: &str, entry: &TaggedEntry) {
        for tag in &entry.tags {
            self.by_tag
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
        if let Some(ns) = &entry.namespace {
            self.by_namespace
                .entry(ns.clone())
                .or_default()
                .insert(key.to_string());
        }
    }

    fn remove(&mut self, key: &str) -> Option<TaggedEntry> {
        let entry = self.entries.remove(key)?;
        self.unindex(key, &entry);
        self.metrics.total_size = self.entries.len();
        Some(entry)
    }

    fn remove_all(&mut self, keys: HashSet<String>) -> usize {
        keys.iter().filter(|k| self.remove(k).is_some()).count()
    }

    fn pick_victim(&mut self, policy: EvictionPolicy) -> Option<String> {
        let entries = &self.entries;
        match policy {
            EvictionPolicy::Lru => entries
                .iter()
                .min_by_key(|(_, e)| (e.accessed_at, e.access_seq))
                .map(|(k, _)| k.clone()),
            EvictionPolicy::Lfu => entries
                .iter()
                .min_by_key(|(_, e)| (e.access_count, e.access_seq))
                .map(|(k, _)| k.clone()),
            EvictionPolicy::Fifo => entries
                .iter()
                .min_by_key(|(_, e)| e.write_seq)
                .map(|(k, _)| k.clone()),
            EvictionPolicy::Random => {
                if entries.is_empty() {
                    return None;
                }
                let index = self.rng.gen_range(0..entries.len());
                self.entries.keys().nth(index).cloned()
            }
        }
    }
}

/// Cache provider with tag and namespace indexes
pub struct TaggedCache {
    config: TaggedCacheConfig,
    state: Mutex<TaggedState>,
}

impl TaggedCache {
    /// Create an empty provider
    #[must_use]
    pub fn new(config: TaggedCacheConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Self {
            config,
            state: Mutex::new(TaggedState {
                entries: HashMap::new(),
                by_tag: HashMap::new(),
                by_namespace: HashMap::new(),
                metrics: CacheMetrics::default(),
                seq: 0,
                rng,
            }),
        }
    }

    /// Eviction policy in use
    #[must_use]
    pub fn policy(&self) -> EvictionPolicy {
        self.config.policy
    }

    /// Write a value with its tags and namespace.
    ///
    /// Returns `false` when the provider has no capacity.
    pub async fn set(&self, key: &str, value: Value, options: TaggedSet) -> bool {
        if self.config.max_size == 0 {
            return false;
        }
        let mut state = self.state.lock().await;

        if state.remove(key).is_none() && state.entries.len() >= self.config.max_size {
            if let Some(victim) = state.pick_victim(self.config.policy) {
                state.remove(&victim);
                state.metrics.evictions += 1;
                tracing::debug!(key = %victim, policy = self.config.policy.as_str(), "tagged cache eviction");
            }
        }

        let seq = state.next_seq();
        let now = Instant::now();
        let entry = TaggedEntry {
            value,
            tags: options.tags.into_iter().collect(),
            namespace: options.namespace,
            ttl: effective_ttl(options.ttl, self.config.default_ttl),
            created_at: now,
            accessed_at: now,
            access_count: 1,
            write_seq: seq,
            access_seq: seq,
        };
        state.index(key, &entry);
        state.entries.insert(key.to_string(), entry);
        state.metrics.sets += 1;
        state.metrics.total_size = state.entries.len();
        true
    }

    /// Read a value
    pub async fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let mut state = self.state.lock().await;

        if state.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            state.remove(key);
            state.metrics.expirations += 1;
        }
        let seq = state.next_seq();
        let value = state.entries.get_mut(key).map(|entry| {
            entry.accessed_at = now;
            entry.access_count += 1;
            entry.access_seq = seq;
            entry.value.clone()
        });
        match value {
            Some(_) => state.metrics.record_hit(),
            None => state.metrics.record_miss(),
        }
        value
    }

    /// Remove a key
    pub async fn delete(&self, key: &str) -> bool {
        let mut state = self.state.lock().await;
        let removed = state.remove(key).is_some();
        if removed {
            state.metrics.deletes += 1;
        }
        removed
    }

    /// Whether a live entry exists
    pub async fn has(&self, key: &str) -> bool {
        let now = Instant::now();
        self.state
            .lock()
            .await
            .entries
            .get(key)
            .is_some_and(|e| !e.is_expired(now))
    }

    /// Delete every entry carrying `tag`
    pub async fn delete_by_tag(&self, tag: &str) -> usize {
        let mut state = self.state.lock().await;
        let keys = state.by_tag.remove(tag).unwrap_or_default();
        let removed = state.remove_all(keys);
        state.metrics.deletes += removed as u64;
        removed
    }

    /// Delete every entry carrying any of `tags`
    pub async fn delete_by_tags(&self, tags: &[&str]) -> usize {
        let mut state = self.state.lock().await;
        let keys: HashSet<String> = tags
            .iter()
            .filter_map(|t| state.by_tag.get(*t))
            .flatten()
            .cloned()
            .collect();
        let removed = state.remove_all(keys);
        state.metrics.deletes += removed as u64;
        removed
    }

    /// Delete every entry of a namespace
    pub async fn clear_namespace(&self, namespace: &str) -> usize {
        let mut state = self.state.lock().await;
        let keys = state.by_namespace.remove(namespace).unwrap_or_default();
        let removed = state.remove_all(keys);
        state.metrics.deletes += removed as u64;
        tracing::debug!(namespace, removed, "namespace cleared");
        removed
    }

    /// Keys carrying `tag`, sorted
    pub async fn keys_with_tag(&self, tag: &str) -> Vec<String> {
        let state = self.state.lock().await;
        let mut keys: Vec<String> = state
            .by_tag
            .get(tag)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Keys of a namespace, sorted
    pub async fn keys_in_namespace(&self, namespace: &str) -> Vec<String> {
        let state = self.state.lock().await;
        let mut keys: Vec<String> = state
            .by_namespace
            .get(namespace)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Tags of an entry
    pub async fn tags_of(&self, key: &str) -> Option<Vec<String>> {
        let state = self.state.lock().await;
        state
            .entries
            .get(key)
            .map(|e| e.tags.iter().cloned().collect())
    }

    /// Delete expired entries, returning the count
    pub async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let expired: HashSet<String> = state
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        let removed = state.remove_all(expired);
        state.metrics.expirations += removed as u64;
        removed
    }

    /// Remove everything
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.entries.clear();
        state.by_tag.clear();
        state.by_namespace.clear();
        state.metrics.total_size = 0;
    }

    /// Number of stored entries
    pub async fn size(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    /// Snapshot of the counters
    pub async fn metrics(&self) -> CacheMetrics {
        self.state.lock().await.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider(max_size: usize, policy: EvictionPolicy) -> TaggedCache {
        TaggedCache::new(
            TaggedCacheConfig::default()
                .with_max_size(max_size)
                .with_policy(policy)
                .with_seed(7),
        )
    }

    #[tokio::test]
    async fn test_delete_by_tag_and_namespace() {
        let cache = provider(10, EvictionPolicy::Lru);
        cache
            .set("role:1", json!(1), TaggedSet::default().tag("role").in_namespace("acl"))
            .await;
        cache
            .set("role:2", json!(2), TaggedSet::default().tag("role").tag("hot"))
            .await;
        cache
            .set("perm:1", json!(3), TaggedSet::default().tag("perm").in_namespace("acl"))
            .await;

        assert_eq!(cache.keys_with_tag("role").await, vec!["role:1", "role:2"]);
        assert_eq!(cache.delete_by_tag("role").await, 2);
        // Indexes stay consistent after removal
        assert!(cache.keys_with_tag("hot").await.is_empty());
        assert_eq!(cache.keys_in_namespace("acl").await, vec!["perm:1"]);

        assert_eq!(cache.clear_namespace("acl").await, 1);
        assert_eq!(cache.size().await, 0);
    }

    #[tokio::test]
    async fn test_overwrite_reindexes() {
        let cache = provider(10, EvictionPolicy::Lru);
        cache.set("k", json!(1), TaggedSet::default().tag("old")).await;
        cache.set("k", json!(2), TaggedSet::default().tag("new")).await;

        assert!(cache.keys_with_tag("old").await.is_empty());
        assert_eq!(cache.tags_of("k").await, Some(vec!["new".to_string()]));
        assert_eq!(cache.delete_by_tags(&["old", "new"]).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lru_policy() {
        let cache = provider(2, EvictionPolicy::Lru);
        cache.set("a", json!(1), TaggedSet::default()).await;
        cache.set("b", json!(2), TaggedSet::default()).await;
        cache.get("a").await;
        cache.set("c", json!(3), TaggedSet::default()).await;
        assert!(cache.has("a").await);
        assert!(!cache.has("b").await);
    }

    #[tokio::test]
    async fn test_lfu_policy() {
        let cache = provider(2, EvictionPolicy::Lfu);
        cache.set("a", json!(1), TaggedSet::default()).await;
        cache.set("b", json!(2), TaggedSet::default()).await;
        cache.get("b").await;
        cache.get("b").await;
        cache.get("a").await;
        cache.set("c", json!(3), TaggedSet::default()).await;
        assert!(!cache.has("a").await);
        assert!(cache.has("b").await);
    }

    #[tokio::test]
    async fn test_fifo_policy() {
        let cache = provider(2, EvictionPolicy::Fifo);
        cache.set("a", json!(1), TaggedSet::default()).await;
        cache.set("b", json!(2), TaggedSet::default()).await;
        cache.get("a").await;
        cache.set("c", json!(3), TaggedSet::default()).await;
        assert!(!cache.has("a").await);
        assert!(cache.has("b").await);
        assert_eq!(cache.metrics().await.evictions, 1);
    }

    #[tokio::test]
    async fn test_random_policy_stays_within_capacity() {
        let cache = provider(3, EvictionPolicy::Random);
        for i in 0..10 {
            cache
                .set(&format!("k{}", i), json!(i), TaggedSet::default().tag("t"))
                .await;
        }
        assert_eq!(cache.size().await, 3);
        assert_eq!(cache.keys_with_tag("t").await.len(), 3);
        assert!(cache.has("k9").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_are_misses() {
        let cache = provider(10, EvictionPolicy::Lru);
        cache
            .set("k", json!(1), TaggedSet::default().ttl(Duration::from_secs(1)).tag("t"))
            .await;
        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(cache.get("k").await, None);
        assert!(cache.keys_with_tag("t").await.is_empty());
        assert_eq!(cache.metrics().await.misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_expired() {
        let cache = provider(10, EvictionPolicy::Lru);
        cache
            .set("short", json!(1), TaggedSet::default().ttl(Duration::from_secs(1)))
            .await;
        cache.set("long", json!(2), TaggedSet::default()).await;
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.sweep_expired().await, 1);
        assert_eq!(cache.size().await, 1);
    }
}
