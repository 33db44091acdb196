//! Cache core: TTL expiry, LRU eviction, pattern deletion and metrics.
//!
//! All state lives behind one async mutex owned by the store. Each write
//! schedules an expiry task tagged with the entry's write version; a task
//! that fires after its entry was replaced finds a newer version and does
//! nothing.

use crate::config::CacheConfig;
use crate::entry::{CacheEntry, effective_ttl};
use crate::metrics::CacheMetrics;
use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace};
use weft_core::{CoreError, CoreResult};

#[derive(Default)]
struct StoreState {
    entries: IndexMap<String, CacheEntry>,
    timers: HashMap<String, JoinHandle<()>>,
    metrics: CacheMetrics,
    next_seq: u64,
    next_version: u64,
}

impl StoreState {
    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn bump_version(&mut self) -> u64 {
        self.next_version += 1;
        self.next_version
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        if let Some(timer) = self.timers.remove(key) {
            timer.abort();
        }
        let removed = self.entries.shift_remove(key);
        self.metrics.total_size = self.entries.len();
        removed
    }

    fn live_count(&self, now: Instant) -> usize {
        self.entries.values().filter(|e| !e.is_expired(now)).count()
    }
}

/// Process-local key/value cache
pub struct CacheStore {
    config: CacheConfig,
    state: Mutex<StoreState>,
    this: Weak<CacheStore>,
}

impl CacheStore {
    /// Create a store; expiry tasks hold a weak reference back to it
    #[must_use]
    pub fn new(config: CacheConfig) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            config,
            state: Mutex::new(StoreState::default()),
            this: this.clone(),
        })
    }

    /// Create a store with default configuration
    #[must_use]
    pub fn with_defaults() -> Arc<Self> {
        Self::new(CacheConfig::default())
    }

    /// Store configuration
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Write a value.
    ///
    /// `ttl` of `None` applies the configured default, a zero TTL never
    /// expires. At capacity a new key evicts the least recently used entry.
    /// Returns `false` when the value could not be stored.
    pub async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> bool {
        if self.config.max_size == 0 {
            debug!(key, "cache has no capacity, value not stored");
            return false;
        }
        let ttl = effective_ttl(ttl, self.config.default_ttl);
        let mut state = self.state.lock().await;

        if !state.entries.contains_key(key) && state.entries.len() >= self.config.max_size {
            self.evict_lru(&mut state);
        }

        let seq = state.bump_seq();
        let version = state.bump_version();
        state
            .entries
            .insert(key.to_string(), CacheEntry::new(key, value, ttl, seq, version));
        state.metrics.total_size = state.entries.len();
        if self.config.enable_metrics {
            state.metrics.sets += 1;
        }
        self.schedule_expiry(&mut state, key, version, ttl);
        trace!(key, size = state.entries.len(), "cache set");
        true
    }

    /// Read a value, counting a hit or miss
    pub async fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let mut state = self.state.lock().await;

        let expired = match state.entries.get(key) {
            None => None,
            Some(entry) => Some((
                entry.is_expired(now),
                entry.is_expired_with(now, self.config.stale_retention),
            )),
        };

        match expired {
            None => {
                self.record_miss(&mut state);
                debug!(key, "cache miss");
                None
            }
            Some((true, past_retention)) => {
                if past_retention {
                    state.remove(key);
                    if self.config.enable_metrics {
                        state.metrics.expirations += 1;
                    }
                }
                self.record_miss(&mut state);
                debug!(key, "cache miss (expired)");
                None
            }
            Some((false, _)) => {
                let seq = state.bump_seq();
                let value = state.entries.get_mut(key).map(|entry| {
                    entry.touch(seq);
                    entry.value.clone()
                });
                if self.config.enable_metrics {
                    state.metrics.record_hit();
                }
                debug!(key, "cache hit");
                value
            }
        }
    }

    /// Read a value even if it expired within `tolerance` of its TTL.
    ///
    /// Does not touch the entry or the counters.
    pub async fn peek_stale(&self, key: &str, tolerance: Duration) -> Option<Value> {
        let now = Instant::now();
        let state = self.state.lock().await;
        state
            .entries
            .get(key)
            .filter(|e| !e.is_expired_with(now, tolerance))
            .map(|e| e.value.clone())
    }

    /// Copy of an entry with its bookkeeping, without touching it
    pub async fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.state.lock().await.entries.get(key).cloned()
    }

    /// Which of `keys` still have an entry, retained ones included
    pub(crate) async fn stored<'a>(
        &self,
        keys: impl IntoIterator<Item = &'a String>,
    ) -> HashSet<String> {
        let state = self.state.lock().await;
        keys.into_iter()
            .filter(|k| state.entries.contains_key(k.as_str()))
            .cloned()
            .collect()
    }

    /// Remove a key, returning whether it was present
    pub async fn delete(&self, key: &str) -> bool {
        let mut state = self.state.lock().await;
        let removed = state.remove(key).is_some();
        if removed && self.config.enable_metrics {
            state.metrics.deletes += 1;
        }
        trace!(key, removed, "cache delete");
        removed
    }

    /// Whether a live entry exists; no metric side effects
    pub async fn has(&self, key: &str) -> bool {
        let now = Instant::now();
        self.state
            .lock()
            .await
            .entries
            .get(key)
            .is_some_and(|e| !e.is_expired(now))
    }

    /// Remove every entry
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        let previous = state.entries.len();
        for (_, timer) in state.timers.drain() {
            timer.abort();
        }
        state.entries.clear();
        state.metrics.total_size = 0;
        info!(previous_size = previous, "cache cleared");
    }

    /// Delete every key matching a regular expression, returning the count
    ///
    /// # Errors
    ///
    /// Returns `InvalidPattern` if the expression does not compile
    pub async fn clear_pattern(&self, pattern: &str) -> CoreResult<usize> {
        let re = Regex::new(pattern).map_err(|e| CoreError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        let mut state = self.state.lock().await;
        let matching: Vec<String> = state
            .entries
            .keys()
            .filter(|k| re.is_match(k))
            .cloned()
            .collect();
        for key in &matching {
            state.remove(key);
        }
        if self.config.enable_metrics {
            state.metrics.deletes += matching.len() as u64;
        }
        debug!(pattern, removed = matching.len(), "cache pattern cleared");
        Ok(matching.len())
    }

    /// Keys of live entries, in insertion order
    pub async fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        self.state
            .lock()
            .await
            .entries
            .values()
            .filter(|e| !e.is_expired(now))
            .map(|e| e.key.clone())
            .collect()
    }

    /// Number of live entries
    pub async fn size(&self) -> usize {
        let now = Instant::now();
        self.state.lock().await.live_count(now)
    }

    /// Delete every entry past its TTL and retention window
    pub async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let retention = self.config.stale_retention;
        let mut state = self.state.lock().await;
        let expired: Vec<String> = state
            .entries
            .values()
            .filter(|e| e.is_expired_with(now, retention))
            .map(|e| e.key.clone())
            .collect();
        for key in &expired {
            state.remove(key);
        }
        if self.config.enable_metrics {
            state.metrics.expirations += expired.len() as u64;
        }
        if !expired.is_empty() {
            debug!(removed = expired.len(), "expired entries swept");
        }
        expired.len()
    }

    /// Snapshot of the counters
    pub async fn metrics(&self) -> CacheMetrics {
        let now = Instant::now();
        let state = self.state.lock().await;
        CacheMetrics {
            total_size: state.live_count(now),
            ..state.metrics
        }
    }

    /// Zero the counters
    pub async fn reset_metrics(&self) {
        self.state.lock().await.metrics.reset();
    }

    fn record_miss(&self, state: &mut StoreState) {
        if self.config.enable_metrics {
            state.metrics.record_miss();
        }
    }

    fn evict_lru(&self, state: &mut StoreState) {
        // Entries kept only for stale reads go before live ones
        let now = Instant::now();
        let retained = state
            .entries
            .values()
            .filter(|e| e.is_expired(now))
            .min_by_key(|e| e.recency())
            .map(|e| e.key.clone());
        if let Some(key) = retained {
            state.remove(&key);
            if self.config.enable_metrics {
                state.metrics.expirations += 1;
            }
            debug!(key = %key, "retained expired entry dropped for capacity");
            return;
        }

        let oldest = state
            .entries
            .values()
            .min_by_key(|e| e.recency())
            .map(|e| e.key.clone());
        if let Some(key) = oldest {
            state.remove(&key);
            if self.config.enable_metrics {
                state.metrics.evictions += 1;
            }
            debug!(key = %key, "cache eviction (lru)");
        }
    }

    fn schedule_expiry(
        &self,
        state: &mut StoreState,
        key: &str,
        version: u64,
        ttl: Option<Duration>,
    ) {
        if let Some(previous) = state.timers.remove(key) {
            previous.abort();
        }
        let Some(ttl) = ttl else {
            return;
        };
        let delay = ttl.saturating_add(self.config.stale_retention);
        let store = self.this.clone();
        let owned = key.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(store) = store.upgrade() {
                store.expire_if_current(&owned, version).await;
            }
        });
        state.timers.insert(key.to_string(), handle);
    }

    async fn expire_if_current(&self, key: &str, version: u64) {
        let mut state = self.state.lock().await;
        let current = state.entries.get(key).is_some_and(|e| e.version == version);
        if !current {
            // Replaced or deleted since this timer was armed
            return;
        }
        // Drop our own handle without aborting the running task
        state.timers.remove(key);
        state.entries.shift_remove(key);
        state.metrics.total_size = state.entries.len();
        if self.config.enable_metrics {
            state.metrics.expirations += 1;
        }
        trace!(key, "cache entry expired");
    }
}

impl Drop for CacheStore {
    fn drop(&mut self) {
        for (_, timer) in self.state.get_mut().timers.drain() {
            timer.abort();
        }
    }
}

/// Run `sweep_expired` every `cleanup_interval` until the store is dropped.
///
/// Returns `None` when the interval is zero.
#[must_use]
pub fn spawn_cleanup_task(store: &Arc<CacheStore>) -> Option<JoinHandle<()>> {
    let period = store.config.cleanup_interval;
    if period.is_zero() {
        return None;
    }
    let weak = Arc::downgrade(store);
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(store) = weak.upgrade() else {
                break;
            };
            store.sweep_expired().await;
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn store(max_size: usize) -> Arc<CacheStore> {
        CacheStore::new(CacheConfig::default().with_max_size(max_size))
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_then_get() {
        let cache = store(10);
        assert!(cache.set("k", json!("v"), Some(Duration::from_secs(1))).await);
        assert_eq!(cache.get("k").await, Some(json!("v")));

        let metrics = cache.metrics().await;
        assert_eq!(metrics.sets, 1);
        assert_eq!(metrics.hits, 1);
        assert_eq!(metrics.total_size, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_after_ttl_is_miss() {
        let cache = store(10);
        cache.set("k", json!(1), Some(Duration::from_secs(1))).await;
        tokio::time::advance(Duration::from_millis(1001)).await;

        assert_eq!(cache.get("k").await, None);
        let metrics = cache.metrics().await;
        assert_eq!(metrics.misses, 1);
        assert_eq!(metrics.total_size, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_timer_removes_unread_entries() {
        let cache = store(10);
        cache.set("k", json!(1), Some(Duration::from_secs(1))).await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        // Past its TTL but inside the default retention window
        assert!(cache.entry("k").await.is_some());
        assert!(!cache.has("k").await);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(cache.entry("k").await.is_none());
        assert_eq!(cache.metrics().await.expirations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_timer_without_retention() {
        let cache = CacheStore::new(CacheConfig::default().with_stale_retention(Duration::ZERO));
        cache.set("k", json!(1), Some(Duration::from_secs(1))).await;
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(cache.entry("k").await.is_none());
        assert_eq!(cache.metrics().await.expirations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_config_keeps_expired_value_for_peek() {
        let cache = CacheStore::with_defaults();
        cache.set("k", json!("last-good"), Some(Duration::from_secs(1))).await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(cache.get("k").await, None);
        assert_eq!(
            cache.peek_stale("k", Duration::from_secs(60)).await,
            Some(json!("last-good"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_drops_retained_entry_before_live_one() {
        let cache = store(2);
        cache.set("live", json!(1), None).await;
        tokio::time::advance(Duration::from_millis(10)).await;
        cache.set("expired", json!(2), Some(Duration::from_secs(1))).await;
        tokio::time::advance(Duration::from_secs(2)).await;

        // "live" is the least recently used, but "expired" is only retained
        cache.set("new", json!(3), None).await;
        assert!(cache.entry("expired").await.is_none());
        assert_eq!(cache.keys().await, vec!["live", "new"]);
        let metrics = cache.metrics().await;
        assert_eq!(metrics.evictions, 0);
        assert_eq!(metrics.expirations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replaced_entry_outlives_stale_timer() {
        let cache = store(10);
        cache.set("k", json!(1), Some(Duration::from_secs(1))).await;
        tokio::time::advance(Duration::from_millis(500)).await;
        cache.set("k", json!(2), Some(Duration::from_secs(10))).await;
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(cache.get("k").await, Some(json!(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ttl_never_expires() {
        let cache = store(10);
        cache.set("k", json!(1), Some(Duration::ZERO)).await;
        tokio::time::sleep(Duration::from_secs(86_400)).await;
        assert!(cache.has("k").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_least_recently_accessed() {
        let cache = store(3);
        cache.set("a", json!(1), None).await;
        cache.set("b", json!(2), None).await;
        cache.set("c", json!(3), None).await;
        // Touch "a" so "b" becomes the oldest
        cache.get("a").await;

        cache.set("d", json!(4), None).await;
        assert_eq!(cache.keys().await, vec!["a", "c", "d"]);
        assert_eq!(cache.metrics().await.evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_at_capacity_does_not_evict() {
        let cache = store(2);
        cache.set("a", json!(1), None).await;
        cache.set("b", json!(2), None).await;
        cache.set("a", json!(3), None).await;
        assert_eq!(cache.size().await, 2);
        assert_eq!(cache.metrics().await.evictions, 0);
    }

    #[tokio::test]
    async fn test_zero_capacity_refuses() {
        let cache = store(0);
        assert!(!cache.set("k", json!(1), None).await);
        assert_eq!(cache.size().await, 0);
    }

    #[tokio::test]
    async fn test_delete_and_has() {
        let cache = store(10);
        cache.set("k", json!(1), None).await;
        assert!(cache.has("k").await);
        assert!(cache.delete("k").await);
        assert!(!cache.delete("k").await);
        assert!(!cache.has("k").await);

        let metrics = cache.metrics().await;
        assert_eq!(metrics.deletes, 1);
        // has() leaves the counters alone
        assert_eq!(metrics.hits + metrics.misses, 0);
    }

    #[tokio::test]
    async fn test_clear_pattern() {
        let cache = store(10);
        for key in ["user:1", "user:2", "order:1"] {
            cache.set(key, json!(key), None).await;
        }
        assert_eq!(cache.clear_pattern("^user:").await.unwrap(), 2);
        assert_eq!(cache.keys().await, vec!["order:1"]);

        let err = cache.clear_pattern("([").await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidPattern { .. }));
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = store(10);
        cache.set("a", json!(1), None).await;
        cache.set("b", json!(2), None).await;
        cache.clear().await;
        assert_eq!(cache.size().await, 0);
        assert!(cache.keys().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_expired() {
        let cache = CacheStore::new(
            CacheConfig::default().with_stale_retention(Duration::from_secs(60)),
        );
        cache.set("short", json!(1), Some(Duration::from_secs(1))).await;
        cache.set("long", json!(2), Some(Duration::from_secs(600))).await;

        tokio::time::advance(Duration::from_secs(2)).await;
        // Expired but still within retention
        assert_eq!(cache.sweep_expired().await, 0);
        assert_eq!(cache.size().await, 1);

        tokio::time::advance(Duration::from_secs(60)).await;
        cache.sweep_expired().await;
        assert!(cache.entry("short").await.is_none());
        assert!(cache.entry("long").await.is_some());
        assert_eq!(cache.metrics().await.expirations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_retention_keeps_value_for_peek() {
        let cache = CacheStore::new(
            CacheConfig::default().with_stale_retention(Duration::from_secs(60)),
        );
        cache.set("k", json!("old"), Some(Duration::from_secs(1))).await;
        tokio::time::advance(Duration::from_secs(5)).await;

        assert_eq!(cache.get("k").await, None);
        assert_eq!(cache.peek_stale("k", Duration::from_secs(10)).await, Some(json!("old")));
        assert_eq!(cache.peek_stale("k", Duration::from_secs(1)).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_stops_with_store() {
        let cache = CacheStore::new(
            CacheConfig::default()
                .with_cleanup_interval(Duration::from_secs(5))
                .with_default_ttl(Duration::from_secs(1))
                .with_stale_retention(Duration::ZERO),
        );
        let handle = spawn_cleanup_task(&cache).unwrap();
        cache.set("k", json!(1), None).await;

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(cache.entry("k").await.is_none());

        drop(cache);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn test_metrics_disabled() {
        let cache = CacheStore::new(CacheConfig::default().with_metrics(false));
        cache.set("k", json!(1), None).await;
        cache.get("k").await;
        cache.get("missing").await;
        let metrics = cache.metrics().await;
        assert_eq!(metrics.hits + metrics.misses + metrics.sets, 0);
        assert_eq!(metrics.total_size, 1);
    }

    #[tokio::test]
    async fn test_reset_metrics() {
        let cache = store(10);
        cache.set("k", json!(1), None).await;
        cache.get("k").await;
        cache.reset_metrics().await;
        let metrics = cache.metrics().await;
        assert_eq!(metrics.hits, 0);
        assert_eq!(metrics.sets, 0);
        assert_eq!(metrics.total_size, 1);
    }

    proptest! {
        #[test]
        fn prop_capacity_is_never_exceeded(keys in proptest::collection::vec(0u8..20, 1..60), cap in 1usize..8) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            rt.block_on(async {
                let cache = store(cap);
                for k in &keys {
                    cache.set(&k.to_string(), json!(k), None).await;
                    prop_assert!(cache.size().await <= cap);
                }
                // The most recent write always survives
                let last = keys.last().unwrap().to_string();
                prop_assert!(cache.has(&last).await);
                Ok(())
            })?;
        }
    }
}
