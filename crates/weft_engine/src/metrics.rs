//! Engine execution counters.

use serde::{Deserialize, Serialize};
use weft_cache::CacheMetrics;
use weft_schema::ValidatorMetrics;

/// Running totals kept by the engine
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Counters {
    pub(crate) total: u64,
    pub(crate) successful: u64,
    pub(crate) failed: u64,
    /// Rolling average over successful calls, milliseconds
    pub(crate) average_ms: f64,
}

impl Counters {
    pub(crate) fn record(&mut self, success: bool, execution_ms: u64) {
        self.total += 1;
        if success {
            self.successful += 1;
            let n = self.successful as f64;
            self.average_ms = (self.average_ms * (n - 1.0) + execution_ms as f64) / n;
        } else {
            self.failed += 1;
        }
    }
}

/// Snapshot returned by `ProtocolEngine::metrics`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineMetrics {
    /// Whether the engine was running at snapshot time
    pub is_running: bool,
    /// Registered protocols
    pub protocol_count: usize,
    /// Calls attempted, including lookup failures
    pub total_operations: u64,
    /// Calls that returned success
    pub successful_operations: u64,
    /// Calls that returned failure
    pub failed_operations: u64,
    /// Milliseconds, over successful calls
    pub average_execution_time: f64,
    /// Milliseconds since the last start, zero while stopped
    pub uptime: u64,
    /// Pass-through validator counters
    pub validator: ValidatorMetrics,
    /// Counters of the attached cache, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheMetrics>,
}
