//! Cache entries.

use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

/// A stored value with its access bookkeeping
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Entry key
    pub key: String,
    /// Stored value
    pub value: Value,
    /// Lifetime measured from creation; `None` never expires
    pub ttl: Option<Duration>,
    /// When the entry was (re)written
    pub created_at: Instant,
    /// Last read or write
    pub accessed_at: Instant,
    /// Reads and writes so far
    pub access_count: u64,
    /// Store-wide access sequence, breaks `accessed_at` ties
    pub(crate) access_seq: u64,
    /// Write version, matched by the expiry timer
    pub(crate) version: u64,
}

impl CacheEntry {
    pub(crate) fn new(key: &str, value: Value, ttl: Option<Duration>, seq: u64, version: u64) -> Self {
        let now = Instant::now();
        Self {
            key: key.to_string(),
            value,
            ttl,
            created_at: now,
            accessed_at: now,
            access_count: 1,
            access_seq: seq,
            version,
        }
    }

    /// Time since the entry was written
    #[must_use]
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    /// Whether the entry is past its TTL
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        self.is_expired_with(now, Duration::ZERO)
    }

    /// Whether the entry is past its TTL extended by `tolerance`
    #[must_use]
    pub fn is_expired_with(&self, now: Instant, tolerance: Duration) -> bool {
        self.ttl
            .is_some_and(|ttl| self.age(now) > ttl.saturating_add(tolerance))
    }

    pub(crate) fn touch(&mut self, seq: u64) {
        self.accessed_at = Instant::now();
        self.access_count += 1;
        self.access_seq = seq;
    }

    /// Ordering key for least-recently-used selection
    pub(crate) fn recency(&self) -> (Instant, u64) {
        (self.accessed_at, self.access_seq)
    }
}

/// Normalise a requested TTL: zero means the entry never expires
#[must_use]
pub fn effective_ttl(requested: Option<Duration>, default_ttl: Duration) -> Option<Duration> {
    let ttl = requested.unwrap_or(default_ttl);
    (!ttl.is_zero()).then_some(ttl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_effective_ttl() {
        let default = Duration::from_secs(300);
        assert_eq!(effective_ttl(None, default), Some(default));
        assert_eq!(effective_ttl(Some(Duration::from_secs(1)), default), Some(Duration::from_secs(1)));
        assert_eq!(effective_ttl(Some(Duration::ZERO), default), None);
        assert_eq!(effective_ttl(None, Duration::ZERO), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_is_strictly_after_ttl() {
        let entry = CacheEntry::new("k", json!(1), Some(Duration::from_secs(1)), 0, 0);
        let created = entry.created_at;
        assert!(!entry.is_expired(created + Duration::from_secs(1)));
        assert!(entry.is_expired(created + Duration::from_millis(1001)));
        assert!(!entry.is_expired_with(created + Duration::from_secs(2), Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_expires_without_ttl() {
        let entry = CacheEntry::new("k", json!(1), None, 0, 0);
        assert!(!entry.is_expired(entry.created_at + Duration::from_secs(86_400)));
    }
}
