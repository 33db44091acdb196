//! WEFT Cache
//!
//! Process-local caching shared by operation handlers: a TTL/LRU core
//! store with a background sweeper, six cache/source strategies, a
//! namespace-scoped client and a separate tag-indexed provider.

#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod entry;
pub mod metrics;
pub mod store;
pub mod strategy;
pub mod tagged;

pub use client::CacheClient;
pub use config::CacheConfig;
pub use entry::CacheEntry;
pub use metrics::CacheMetrics;
pub use store::{CacheStore, spawn_cleanup_task};
pub use strategy::{
    CacheFirst, CacheOnly, CacheStrategy, SourceFetch, SourceFirst, SourceOnly, StaleIfError,
    StaleWhileRevalidate, StrategyError, StrategyKind, StrategyOptions, source_fetch,
};
pub use tagged::{EvictionPolicy, TaggedCache, TaggedCacheConfig, TaggedSet};
