//! Rolling execution statistics.
//!
//! No sample history is kept: the average is folded incrementally as
//! `avg' = (avg * (n - 1) + sample) / n`.

use serde::{Deserialize, Serialize};
use weft_core::Timestamp;

/// Counters and timing for one protocol or operation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStats {
    /// Recorded calls
    pub total_executions: u64,
    /// Calls that succeeded
    pub successful_executions: u64,
    /// Calls that failed
    pub failed_executions: u64,
    /// Milliseconds
    pub average_execution_time: f64,
    /// Milliseconds
    pub min_execution_time: u64,
    /// Milliseconds
    pub max_execution_time: u64,
    /// When the last call was recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_execution_time: Option<Timestamp>,
}

impl ExecutionStats {
    /// Fold one sample in
    pub fn record(&mut self, execution_ms: u64, success: bool) {
        self.total_executions += 1;
        if success {
            self.successful_executions += 1;
        } else {
            self.failed_executions += 1;
        }

        if self.total_executions == 1 {
            self.min_execution_time = execution_ms;
            self.max_execution_time = execution_ms;
            self.average_execution_time = execution_ms as f64;
        } else {
            self.min_execution_time = self.min_execution_time.min(execution_ms);
            self.max_execution_time = self.max_execution_time.max(execution_ms);
            let n = self.total_executions as f64;
            self.average_execution_time =
                (self.average_execution_time * (n - 1.0) + execution_ms as f64) / n;
        }

        self.last_execution_time = Some(Timestamp::now());
    }

    /// Fraction of executions that succeeded, zero before the first
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total_executions == 0 {
            0.0
        } else {
            self.successful_executions as f64 / self.total_executions as f64
        }
    }
}

/// Per-protocol statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolStats {
    /// When the protocol was registered
    pub registration_time: Timestamp,
    /// Operations in the definition
    pub operation_count: usize,
    /// Aggregate over all operations
    pub execution_stats: ExecutionStats,
    /// Failed calls
    pub error_count: u64,
}

impl ProtocolStats {
    /// Fresh stats for a protocol with `operation_count` operations
    #[must_use]
    pub fn new(operation_count: usize) -> Self {
        Self {
            registration_time: Timestamp::now(),
            operation_count,
            execution_stats: ExecutionStats::default(),
            error_count: 0,
        }
    }

    /// Fold one sample in
    pub fn record(&mut self, execution_ms: u64, success: bool) {
        self.execution_stats.record(execution_ms, success);
        if !success {
            self.error_count += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_first_sample_sets_bounds() {
        let mut stats = ExecutionStats::default();
        stats.record(40, true);
        assert_eq!(stats.min_execution_time, 40);
        assert_eq!(stats.max_execution_time, 40);
        assert_eq!(stats.average_execution_time, 40.0);
        assert!(stats.last_execution_time.is_some());
    }

    #[test]
    fn test_rolling_values() {
        let mut stats = ExecutionStats::default();
        stats.record(10, true);
        stats.record(30, false);
        stats.record(20, true);

        assert_eq!(stats.total_executions, 3);
        assert_eq!(stats.successful_executions, 2);
        assert_eq!(stats.failed_executions, 1);
        assert_eq!(stats.min_execution_time, 10);
        assert_eq!(stats.max_execution_time, 30);
        assert!((stats.average_execution_time - 20.0).abs() < 1e-9);
        assert!((stats.success_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_protocol_stats_counts_errors() {
        let mut stats = ProtocolStats::new(2);
        stats.record(5, false);
        stats.record(5, true);
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.operation_count, 2);
        assert_eq!(stats.execution_stats.total_executions, 2);
    }

    proptest! {
        #[test]
        fn prop_rolling_average_matches_mean(samples in prop::collection::vec(0u64..10_000, 1..64)) {
            let mut stats = ExecutionStats::default();
            for &s in &samples {
                stats.record(s, true);
            }
            let mean = samples.iter().sum::<u64>() as f64 / samples.len() as f64;
            prop_assert!((stats.average_execution_time - mean).abs() < 1e-6);
            prop_assert_eq!(stats.min_execution_time, *samples.iter().min().unwrap());
            prop_assert_eq!(stats.max_execution_time, *samples.iter().max().unwrap());
        }
    }
}
