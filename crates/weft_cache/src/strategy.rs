//! Cache strategies reconciling the store with a source of truth.
//!
//! Each strategy is handed a source fetch that it may call at most once.
//! Strategy errors surface directly to the caller: they sit below the
//! engine's result wrapping.

use crate::config::DEFAULT_STALE_RETENTION_SECS;
use crate::store::CacheStore;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use weft_core::CoreError;

/// Default extra age tolerated by stale-if-error fallback
pub const DEFAULT_STALE_TOLERANCE_SECS: u64 = DEFAULT_STALE_RETENTION_SECS;

/// Deferred call to the source of truth
pub type SourceFetch = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<Value>> + Send>;

/// Wrap an async closure as a [`SourceFetch`]
pub fn source_fetch<F, Fut>(f: F) -> SourceFetch
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Box::new(move || -> BoxFuture<'static, anyhow::Result<Value>> { Box::pin(f()) })
}

/// Strategy error
#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    /// Cache-only lookup found nothing
    #[error("Cache miss for key: {key}")]
    CacheMiss { key: String },

    /// The source fetch failed and no fallback applied
    #[error(transparent)]
    Source(#[from] anyhow::Error),
}

impl From<StrategyError> for CoreError {
    fn from(err: StrategyError) -> Self {
        match err {
            StrategyError::CacheMiss { key } => Self::CacheMiss { key },
            StrategyError::Source(source) => Self::HandlerFailed {
                message: source.to_string(),
            },
        }
    }
}

/// Per-call strategy options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StrategyOptions {
    /// TTL for values written back; `None` uses the store default
    #[serde(with = "weft_core::time::option_duration_ms")]
    pub ttl: Option<Duration>,
    /// Extra age accepted when falling back to a stale value
    #[serde(with = "weft_core::time::duration_ms")]
    pub stale_tolerance: Duration,
}

impl Default for StrategyOptions {
    fn default() -> Self {
        Self {
            ttl: None,
            stale_tolerance: Duration::from_secs(DEFAULT_STALE_TOLERANCE_SECS),
        }
    }
}

impl StrategyOptions {
    /// Set the write-back TTL
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Set the stale tolerance
    #[must_use]
    pub fn with_stale_tolerance(mut self, tolerance: Duration) -> Self {
        self.stale_tolerance = tolerance;
        self
    }
}

/// Strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    CacheFirst,
    SourceFirst,
    CacheOnly,
    SourceOnly,
    StaleWhileRevalidate,
    StaleIfError,
}

impl StrategyKind {
    /// Every strategy
    pub const ALL: [Self; 6] = [
        Self::CacheFirst,
        Self::SourceFirst,
        Self::CacheOnly,
        Self::SourceOnly,
        Self::StaleWhileRevalidate,
        Self::StaleIfError,
    ];

    /// Kebab-case name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CacheFirst => "cache-first",
            Self::SourceFirst => "source-first",
            Self::CacheOnly => "cache-only",
            Self::SourceOnly => "source-only",
            Self::StaleWhileRevalidate => "stale-while-revalidate",
            Self::StaleIfError => "stale-if-error",
        }
    }

    /// Build the strategy over a store
    #[must_use]
    pub fn build(self, store: Arc<CacheStore>) -> Arc<dyn CacheStrategy> {
        match self {
            Self::CacheFirst => Arc::new(CacheFirst::new(store)),
            Self::SourceFirst => Arc::new(SourceFirst::new(store)),
            Self::CacheOnly => Arc::new(CacheOnly::new(store)),
            Self::SourceOnly => Arc::new(SourceOnly),
            Self::StaleWhileRevalidate => Arc::new(StaleWhileRevalidate::new(store)),
            Self::StaleIfError => Arc::new(StaleIfError::new(store)),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cache/source reconciliation policy
#[async_trait]
pub trait CacheStrategy: Send + Sync {
    /// Which strategy this is
    fn kind(&self) -> StrategyKind;

    /// Produce the value for `key`
    async fn execute(
        &self,
        key: &str,
        fetch: SourceFetch,
        options: &StrategyOptions,
    ) -> Result<Value, StrategyError>;
}

macro_rules! store_backed {
    ($name:ident) => {
        impl $name {
            /// Create the strategy over a store
            #[must_use]
            pub fn new(store: Arc<CacheStore>) -> Self {
                Self { store }
            }
        }
    };
}

/// Cached value if present, else fetch and store
pub struct CacheFirst {
    store: Arc<CacheStore>,
}
store_backed!(CacheFirst);

#[async_trait]
impl CacheStrategy for CacheFirst {
    fn kind(&self) -> StrategyKind {
        StrategyKind::CacheFirst
    }

    async fn execute(
        &self,
        key: &str,
        fetch: SourceFetch,
        options: &StrategyOptions,
    ) -> Result<Value, StrategyError> {
        if let Some(cached) = self.store.get(key).await {
            return Ok(cached);
        }
        let fresh = fetch().await?;
        self.store.set(key, fresh.clone(), options.ttl).await;
        Ok(fresh)
    }
}

/// Always fetch, always overwrite the cache
pub struct SourceFirst {
    store: Arc<CacheStore>,
}
store_backed!(SourceFirst);

#[async_trait]
impl CacheStrategy for SourceFirst {
    fn kind(&self) -> StrategyKind {
        StrategyKind::SourceFirst
    }

    async fn execute(
        &self,
        key: &str,
        fetch: SourceFetch,
        options: &StrategyOptions,
    ) -> Result<Value, StrategyError> {
        let fresh = fetch().await?;
        self.store.set(key, fresh.clone(), options.ttl).await;
        Ok(fresh)
    }
}

/// Cached value or `CacheMiss`; never calls the source
pub struct CacheOnly {
    store: Arc<CacheStore>,
}
store_backed!(CacheOnly);

#[async_trait]
impl CacheStrategy for CacheOnly {
    fn kind(&self) -> StrategyKind {
        StrategyKind::CacheOnly
    }

    async fn execute(
        &self,
        key: &str,
        _fetch: SourceFetch,
        _options: &StrategyOptions,
    ) -> Result<Value, StrategyError> {
        self.store
            .get(key)
            .await
            .ok_or_else(|| StrategyError::CacheMiss {
                key: key.to_string(),
            })
    }
}

/// Always fetch; the cache is never read or written
pub struct SourceOnly;

#[async_trait]
impl CacheStrategy for SourceOnly {
    fn kind(&self) -> StrategyKind {
        StrategyKind::SourceOnly
    }

    async fn execute(
        &self,
        _key: &str,
        fetch: SourceFetch,
        _options: &StrategyOptions,
    ) -> Result<Value, StrategyError> {
        Ok(fetch().await?)
    }
}

/// Serve a cached value at once and refresh it in the background
pub struct StaleWhileRevalidate {
    store: Arc<CacheStore>,
}
store_backed!(StaleWhileRevalidate);

#[async_trait]
impl CacheStrategy for StaleWhileRevalidate {
    fn kind(&self) -> StrategyKind {
        StrategyKind::StaleWhileRevalidate
    }

    async fn execute(
        &self,
        key: &str,
        fetch: SourceFetch,
        options: &StrategyOptions,
    ) -> Result<Value, StrategyError> {
        let mut source = tokio::spawn(fetch());
        let ttl = options.ttl;

        let cached = tokio::select! {
            biased;
            cached = self.store.get(key) => cached,
            fetched = &mut source => {
                // Source answered before the cache
                let fresh = flatten_join(fetched)?;
                self.store.set(key, fresh.clone(), ttl).await;
                return Ok(fresh);
            }
        };

        match cached {
            Some(value) => {
                let store = Arc::clone(&self.store);
                let key = key.to_string();
                tokio::spawn(async move {
                    match flatten_join(source.await) {
                        Ok(fresh) => {
                            if store.set(&key, fresh, ttl).await {
                                debug!(key = %key, "background revalidation stored");
                            } else {
                                warn!(key = %key, "background revalidation could not be stored");
                            }
                        }
                        Err(err) => {
                            warn!(key = %key, error = %err, "background revalidation failed");
                        }
                    }
                });
                Ok(value)
            }
            None => {
                let fresh = flatten_join(source.await)?;
                self.store.set(key, fresh.clone(), ttl).await;
                Ok(fresh)
            }
        }
    }
}

fn flatten_join(
    joined: Result<anyhow::Result<Value>, tokio::task::JoinError>,
) -> anyhow::Result<Value> {
    joined.map_err(|e| anyhow::anyhow!("source fetch aborted: {}", e))?
}

/// Fetch first, falling back to a recently expired cached value on error
pub struct StaleIfError {
    store: Arc<CacheStore>,
}
store_backed!(StaleIfError);

#[async_trait]
impl CacheStrategy for StaleIfError {
    fn kind(&self) -> StrategyKind {
        StrategyKind::StaleIfError
    }

    async fn execute(
        &self,
        key: &str,
        fetch: SourceFetch,
        options: &StrategyOptions,
    ) -> Result<Value, StrategyError> {
        match fetch().await {
            Ok(fresh) => {
                self.store.set(key, fresh.clone(), options.ttl).await;
                Ok(fresh)
            }
            Err(err) => match self.store.peek_stale(key, options.stale_tolerance).await {
                Some(stale) => {
                    warn!(key, error = %err, "source failed, serving stale value");
                    Ok(stale)
                }
                None => Err(err.into()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_source(calls: &Arc<AtomicUsize>, value: Value) -> SourceFetch {
        let calls = Arc::clone(calls);
        source_fetch(move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(value)
        })
    }

    fn failing_source(calls: &Arc<AtomicUsize>) -> SourceFetch {
        let calls = Arc::clone(calls);
        source_fetch(move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("source down"))
        })
    }

    fn store() -> Arc<CacheStore> {
        CacheStore::new(CacheConfig::default())
    }

    #[tokio::test]
    async fn test_cache_first_fetches_once_per_miss() {
        let cache = store();
        let calls = Arc::new(AtomicUsize::new(0));
        let strategy = CacheFirst::new(Arc::clone(&cache));
        let opts = StrategyOptions::default();

        let first = strategy.execute("k", counting_source(&calls, json!(1)), &opts).await.unwrap();
        let second = strategy.execute("k", counting_source(&calls, json!(2)), &opts).await.unwrap();

        assert_eq!(first, json!(1));
        assert_eq!(second, json!(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_source_first_overwrites() {
        let cache = store();
        cache.set("k", json!("old"), None).await;
        let calls = Arc::new(AtomicUsize::new(0));
        let strategy = SourceFirst::new(Arc::clone(&cache));

        let value = strategy
            .execute("k", counting_source(&calls, json!("new")), &StrategyOptions::default())
            .await
            .unwrap();
        assert_eq!(value, json!("new"));
        assert_eq!(cache.get("k").await, Some(json!("new")));
    }

    #[tokio::test]
    async fn test_cache_only_miss_never_calls_source() {
        let cache = store();
        let calls = Arc::new(AtomicUsize::new(0));
        let strategy = CacheOnly::new(Arc::clone(&cache));

        let err = strategy
            .execute("k", counting_source(&calls, json!(1)), &StrategyOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StrategyError::CacheMiss { ref key } if key == "k"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(CoreError::from(err), CoreError::CacheMiss { key: "k".to_string() });
    }

    #[tokio::test]
    async fn test_source_only_never_touches_cache() {
        let cache = store();
        cache.set("k", json!("cached"), None).await;
        cache.reset_metrics().await;
        let calls = Arc::new(AtomicUsize::new(0));

        let value = SourceOnly
            .execute("k", counting_source(&calls, json!("fresh")), &StrategyOptions::default())
            .await
            .unwrap();
        assert_eq!(value, json!("fresh"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let metrics = cache.metrics().await;
        assert_eq!(metrics.hits + metrics.misses + metrics.sets, 0);
        assert_eq!(cache.get("k").await, Some(json!("cached")));
    }

    #[tokio::test]
    async fn test_stale_while_revalidate_serves_cached_then_refreshes() {
        let cache = store();
        cache.set("k", json!("stale"), None).await;
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let fetch = source_fetch(move || async move {
            // Hold the source until the caller has its answer
            let _ = rx.await;
            Ok(json!("fresh"))
        });
        let strategy = StaleWhileRevalidate::new(Arc::clone(&cache));

        let value = strategy.execute("k", fetch, &StrategyOptions::default()).await.unwrap();
        assert_eq!(value, json!("stale"));

        tx.send(()).unwrap();
        for _ in 0..100 {
            if cache.peek_stale("k", Duration::ZERO).await == Some(json!("fresh")) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(cache.get("k").await, Some(json!("fresh")));
    }

    #[tokio::test]
    async fn test_stale_while_revalidate_waits_for_source_on_miss() {
        let cache = store();
        let calls = Arc::new(AtomicUsize::new(0));
        let strategy = StaleWhileRevalidate::new(Arc::clone(&cache));

        let value = strategy
            .execute("k", counting_source(&calls, json!(5)), &StrategyOptions::default())
            .await
            .unwrap();
        assert_eq!(value, json!(5));
        assert_eq!(cache.get("k").await, Some(json!(5)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stale_while_revalidate_background_failure_is_swallowed() {
        let cache = store();
        cache.set("k", json!("kept"), None).await;
        let calls = Arc::new(AtomicUsize::new(0));
        let strategy = StaleWhileRevalidate::new(Arc::clone(&cache));

        let value = strategy
            .execute("k", failing_source(&calls), &StrategyOptions::default())
            .await
            .unwrap();
        assert_eq!(value, json!("kept"));
        tokio::task::yield_now().await;
        assert_eq!(cache.get("k").await, Some(json!("kept")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_if_error_falls_back_within_tolerance() {
        let cache = CacheStore::new(
            CacheConfig::default().with_stale_retention(Duration::from_secs(120)),
        );
        cache.set("k", json!("last-good"), Some(Duration::from_secs(1))).await;
        tokio::time::advance(Duration::from_secs(30)).await;

        let calls = Arc::new(AtomicUsize::new(0));
        let strategy = StaleIfError::new(Arc::clone(&cache));
        let opts = StrategyOptions::default().with_stale_tolerance(Duration::from_secs(60));

        let value = strategy.execute("k", failing_source(&calls), &opts).await.unwrap();
        assert_eq!(value, json!("last-good"));

        tokio::time::advance(Duration::from_secs(60)).await;
        let err = strategy.execute("k", failing_source(&calls), &opts).await.unwrap_err();
        assert_eq!(err.to_string(), "source down");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_if_error_default_config_serves_expired_value() {
        let cache = store();
        cache.set("k", json!("last-good"), Some(Duration::from_secs(1))).await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        let calls = Arc::new(AtomicUsize::new(0));
        let strategy = StaleIfError::new(Arc::clone(&cache));
        let opts = StrategyOptions::default();

        let value = strategy.execute("k", failing_source(&calls), &opts).await.unwrap();
        assert_eq!(value, json!("last-good"));

        // Past TTL plus the default tolerance the entry is gone
        tokio::time::sleep(Duration::from_secs(60)).await;
        let err = strategy.execute("k", failing_source(&calls), &opts).await.unwrap_err();
        assert_eq!(err.to_string(), "source down");
        assert!(cache.entry("k").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_while_revalidate_default_config_ignores_expired_value() {
        let cache = store();
        cache.set("k", json!("expired"), Some(Duration::from_secs(1))).await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        let calls = Arc::new(AtomicUsize::new(0));
        let strategy = StaleWhileRevalidate::new(Arc::clone(&cache));
        let value = strategy
            .execute("k", counting_source(&calls, json!("fresh")), &StrategyOptions::default())
            .await
            .unwrap();

        assert_eq!(value, json!("fresh"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get("k").await, Some(json!("fresh")));
    }

    #[tokio::test]
    async fn test_stale_if_error_stores_fresh_value() {
        let cache = store();
        let calls = Arc::new(AtomicUsize::new(0));
        let strategy = StaleIfError::new(Arc::clone(&cache));

        let value = strategy
            .execute("k", counting_source(&calls, json!(9)), &StrategyOptions::default())
            .await
            .unwrap();
        assert_eq!(value, json!(9));
        assert_eq!(cache.get("k").await, Some(json!(9)));
    }

    #[tokio::test]
    async fn test_build_from_kind() {
        let cache = store();
        for kind in StrategyKind::ALL {
            assert_eq!(kind.build(Arc::clone(&cache)).kind(), kind);
        }
        assert_eq!(StrategyKind::StaleIfError.to_string(), "stale-if-error");
    }
}
