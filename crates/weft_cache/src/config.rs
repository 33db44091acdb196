//! Cache configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use weft_core::time::duration_ms;

/// Default entry lifetime in seconds
pub const DEFAULT_TTL_SECS: u64 = 300;

/// Default capacity
pub const DEFAULT_MAX_SIZE: usize = 1000;

/// Default background sweep period in seconds
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;

/// Default time expired entries stay readable for stale fallback, seconds
pub const DEFAULT_STALE_RETENTION_SECS: u64 = 60;

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    /// Lifetime applied when `set` is not given one; zero never expires
    #[serde(with = "duration_ms")]
    pub default_ttl: Duration,
    /// Maximum number of entries
    pub max_size: usize,
    /// Period of the background sweep; zero disables it
    #[serde(with = "duration_ms")]
    pub cleanup_interval: Duration,
    /// Whether hit/miss counters are maintained
    pub enable_metrics: bool,
    /// How long expired entries are retained for stale reads.
    ///
    /// Bounds the widest stale tolerance a fallback read can be served with.
    #[serde(with = "duration_ms")]
    pub stale_retention: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            max_size: DEFAULT_MAX_SIZE,
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
            enable_metrics: true,
            stale_retention: Duration::from_secs(DEFAULT_STALE_RETENTION_SECS),
        }
    }
}

impl CacheConfig {
    /// Load from `WEFT_CACHE_*` environment variables.
    ///
    /// Absent or unparsable values fall back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let secs = |name: &str| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
        };

        Self {
            default_ttl: secs("WEFT_CACHE_DEFAULT_TTL_SECS").unwrap_or(defaults.default_ttl),
            max_size: std::env::var("WEFT_CACHE_MAX_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_size),
            cleanup_interval: secs("WEFT_CACHE_CLEANUP_INTERVAL_SECS")
                .unwrap_or(defaults.cleanup_interval),
            enable_metrics: std::env::var("WEFT_CACHE_METRICS")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(defaults.enable_metrics),
            stale_retention: secs("WEFT_CACHE_STALE_RETENTION_SECS")
                .unwrap_or(defaults.stale_retention),
        }
    }

    /// Set the default TTL
    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set the capacity
    #[must_use]
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Set the sweep period
    #[must_use]
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Enable or disable metrics
    #[must_use]
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.enable_metrics = enabled;
        self
    }

    /// Set the stale retention window
    #[must_use]
    pub fn with_stale_retention(mut self, retention: Duration) -> Self {
        self.stale_retention = retention;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.default_ttl, Duration::from_secs(300));
        assert_eq!(config.max_size, 1000);
        assert!(config.enable_metrics);
        assert_eq!(config.stale_retention, Duration::from_secs(60));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: CacheConfig =
            serde_json::from_str(r#"{ "maxSize": 5, "defaultTtl": 1500 }"#).unwrap();
        assert_eq!(config.max_size, 5);
        assert_eq!(config.default_ttl, Duration::from_millis(1500));
        assert_eq!(config.cleanup_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_builder() {
        let config = CacheConfig::default()
            .with_max_size(2)
            .with_default_ttl(Duration::ZERO)
            .with_metrics(false)
            .with_stale_retention(Duration::from_secs(30));
        assert_eq!(config.max_size, 2);
        assert_eq!(config.default_ttl, Duration::ZERO);
        assert!(!config.enable_metrics);
        assert_eq!(config.stale_retention, Duration::from_secs(30));
    }
}
