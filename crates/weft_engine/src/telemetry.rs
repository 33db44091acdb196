//! Tracing subscriber setup.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Filter used when neither config nor `RUST_LOG` provide one
pub const DEFAULT_FILTER: &str = "weft=info";

/// Log output configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TelemetryConfig {
    /// `EnvFilter` directives, overridden by `RUST_LOG`
    pub filter: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Load from `WEFT_LOG_FILTER` and `WEFT_LOG_JSON`
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            filter: std::env::var("WEFT_LOG_FILTER").unwrap_or(defaults.filter),
            json: std::env::var("WEFT_LOG_JSON")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.json),
        }
    }

    /// Set the filter directives
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Enable or disable JSON output
    #[must_use]
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}

/// Install the global fmt subscriber.
///
/// Returns `false` if a global subscriber was already set; calling this
/// more than once is harmless.
pub fn init_tracing(config: &TelemetryConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.is_ok()
}
