//! Cache counters.

use serde::{Deserialize, Serialize};

/// Monotonic cache counters, reset only on request
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetrics {
    /// Lookups that found a live entry
    pub hits: u64,
    /// Lookups that found nothing or an expired entry
    pub misses: u64,
    /// Successful writes
    pub sets: u64,
    /// Explicit and pattern deletions
    pub deletes: u64,
    /// Entries dropped to make room
    pub evictions: u64,
    /// Entries removed by TTL expiry
    pub expirations: u64,
    /// Live entries when the snapshot was taken
    pub total_size: usize,
    /// `hits / (hits + misses)`, zero before the first lookup
    pub hit_rate: f64,
}

impl CacheMetrics {
    pub(crate) fn record_hit(&mut self) {
        self.hits += 1;
        self.update_hit_rate();
    }

    pub(crate) fn record_miss(&mut self) {
        self.misses += 1;
        self.update_hit_rate();
    }

    fn update_hit_rate(&mut self) {
        let total = self.hits + self.misses;
        if total > 0 {
            self.hit_rate = self.hits as f64 / total as f64;
        }
    }

    /// Zero every counter, keeping the current size
    pub(crate) fn reset(&mut self) {
        *self = Self {
            total_size: self.total_size,
            ..Self::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let mut metrics = CacheMetrics::default();
        assert_eq!(metrics.hit_rate, 0.0);
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_miss();
        assert!((metrics.hit_rate - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reset_keeps_size() {
        let mut metrics = CacheMetrics {
            hits: 4,
            evictions: 2,
            total_size: 7,
            ..CacheMetrics::default()
        };
        metrics.reset();
        assert_eq!(metrics.hits, 0);
        assert_eq!(metrics.evictions, 0);
        assert_eq!(metrics.total_size, 7);
    }
}
