//! Time types for WEFT.
//!
//! Wall-clock timestamps are metadata only. Durations that drive behaviour
//! (timeouts, TTLs, execution time) are measured on the monotonic clock.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Smallest execution time ever reported, in milliseconds
pub const MIN_EXECUTION_TIME_MS: u64 = 1;

/// Wall clock timestamp, serialized as RFC 3339
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Current wall-clock time
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Wrap an existing chrono value
    #[must_use]
    pub const fn from_datetime(value: DateTime<Utc>) -> Self {
        Self(value)
    }

    /// Underlying chrono value
    #[must_use]
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Milliseconds since the Unix epoch
    #[must_use]
    pub fn as_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

/// Monotonic stopwatch for execution timing
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    started: Instant,
}

impl Stopwatch {
    /// Start timing now
    #[must_use]
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Raw elapsed duration
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Elapsed milliseconds, never below [`MIN_EXECUTION_TIME_MS`]
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        clamp_execution_ms(self.elapsed())
    }
}

/// Convert a duration to whole milliseconds, clamped to the minimum unit
#[must_use]
pub fn clamp_execution_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis())
        .unwrap_or(u64::MAX)
        .max(MIN_EXECUTION_TIME_MS)
}

/// Serde helper: durations as integer milliseconds
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize as milliseconds
    ///
    /// # Errors
    ///
    /// Propagates serializer errors
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    /// Deserialize from milliseconds
    ///
    /// # Errors
    ///
    /// Propagates deserializer errors
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Serde helper: optional durations as integer milliseconds
pub mod option_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize as optional milliseconds
    ///
    /// # Errors
    ///
    /// Propagates serializer errors
    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize from optional milliseconds
    ///
    /// # Errors
    ///
    /// Propagates deserializer errors
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|v| v.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_execution_ms() {
        assert_eq!(clamp_execution_ms(Duration::ZERO), MIN_EXECUTION_TIME_MS);
        assert_eq!(clamp_execution_ms(Duration::from_micros(300)), 1);
        assert_eq!(clamp_execution_ms(Duration::from_millis(42)), 42);
    }

    #[test]
    fn test_stopwatch_never_reports_zero() {
        let sw = Stopwatch::start();
        assert!(sw.elapsed_ms() >= MIN_EXECUTION_TIME_MS);
    }

    #[test]
    fn test_timestamp_display_is_rfc3339() {
        let ts = Timestamp::now();
        let s = ts.to_string();
        assert!(s.ends_with('Z'));
        assert!(DateTime::parse_from_rfc3339(&s).is_ok());
    }

    #[test]
    fn test_timestamp_ordering() {
        let a = Timestamp::now();
        let b = Timestamp::from_datetime(*a.as_datetime() + chrono::Duration::milliseconds(5));
        assert!(a < b);
        assert_eq!(b.as_millis() - a.as_millis(), 5);
    }

    #[test]
    fn test_duration_ms_serde() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            #[serde(with = "duration_ms")]
            timeout: Duration,
            #[serde(with = "option_duration_ms", default)]
            ttl: Option<Duration>,
        }

        let json = serde_json::to_string(&Wrapper {
            timeout: Duration::from_millis(1500),
            ttl: None,
        })
        .unwrap();
        assert_eq!(json, r#"{"timeout":1500,"ttl":null}"#);

        let back: Wrapper = serde_json::from_str(r#"{"timeout":250}"#).unwrap();
        assert_eq!(back.timeout, Duration::from_millis(250));
        assert!(back.ttl.is_none());
    }
}
