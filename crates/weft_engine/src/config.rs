//! Engine configuration and the aggregated workspace configuration.

use crate::telemetry::TelemetryConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use weft_cache::CacheConfig;
use weft_core::CoreError;
use weft_core::time::duration_ms;
use weft_registry::RegistryConfig;

/// Default handler timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default cap on handler retries
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Document could not be parsed
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is out of range
    #[error("invalid configuration for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl From<ConfigError> for CoreError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Parse(e) => Self::InvalidConfig {
                field: "document".to_string(),
                reason: e.to_string(),
            },
            ConfigError::Invalid { field, reason } => Self::InvalidConfig {
                field: field.to_string(),
                reason,
            },
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name).ok().map(|v| v != "false" && v != "0")
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Check input against `inputSchema` before the handler runs
    pub validate_input: bool,
    /// Check handler output against `outputSchema`
    pub validate_output: bool,
    /// Pre-register schemas with the validator at registration
    pub enable_schema_cache: bool,
    /// Maintain execution counters
    pub enable_metrics: bool,
    /// Timeout for operations that do not declare one
    #[serde(with = "duration_ms")]
    pub default_timeout: Duration,
    /// Upper bound on per-operation retries
    pub max_retries: u32,
    /// Abort the handler task when its timeout fires
    pub cancel_on_timeout: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            validate_input: true,
            validate_output: true,
            enable_schema_cache: true,
            enable_metrics: true,
            default_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            cancel_on_timeout: true,
        }
    }
}

impl EngineConfig {
    /// Preset for local work: no schema cache, longer timeout, no retries
    #[must_use]
    pub fn development() -> Self {
        Self {
            enable_schema_cache: false,
            default_timeout: Duration::from_secs(60),
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Preset for deployments
    #[must_use]
    pub fn production() -> Self {
        Self::default()
    }

    /// Load from `WEFT_ENGINE_*` environment variables.
    ///
    /// Absent or unparsable values fall back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            validate_input: env_flag("WEFT_ENGINE_VALIDATE_INPUT")
                .unwrap_or(defaults.validate_input),
            validate_output: env_flag("WEFT_ENGINE_VALIDATE_OUTPUT")
                .unwrap_or(defaults.validate_output),
            enable_schema_cache: env_flag("WEFT_ENGINE_SCHEMA_CACHE")
                .unwrap_or(defaults.enable_schema_cache),
            enable_metrics: env_flag("WEFT_ENGINE_METRICS").unwrap_or(defaults.enable_metrics),
            default_timeout: std::env::var("WEFT_ENGINE_DEFAULT_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.default_timeout),
            max_retries: std::env::var("WEFT_ENGINE_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_retries),
            cancel_on_timeout: env_flag("WEFT_ENGINE_CANCEL_ON_TIMEOUT")
                .unwrap_or(defaults.cancel_on_timeout),
        }
    }

    /// Enable or disable input validation
    #[must_use]
    pub fn with_input_validation(mut self, enabled: bool) -> Self {
        self.validate_input = enabled;
        self
    }

    /// Enable or disable output validation
    #[must_use]
    pub fn with_output_validation(mut self, enabled: bool) -> Self {
        self.validate_output = enabled;
        self
    }

    /// Enable or disable the schema cache
    #[must_use]
    pub fn with_schema_cache(mut self, enabled: bool) -> Self {
        self.enable_schema_cache = enabled;
        self
    }

    /// Enable or disable metrics
    #[must_use]
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.enable_metrics = enabled;
        self
    }

    /// Set the default timeout
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Set the retry cap
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Choose whether timed-out handlers are aborted
    #[must_use]
    pub fn with_cancel_on_timeout(mut self, cancel: bool) -> Self {
        self.cancel_on_timeout = cancel;
        self
    }
}

/// Configuration of every component
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WeftConfig {
    /// Execution settings
    pub engine: EngineConfig,
    /// Registry settings
    pub registry: RegistryConfig,
    /// Shared cache settings
    pub cache: CacheConfig,
    /// Log output settings
    pub telemetry: TelemetryConfig,
}

impl WeftConfig {
    /// Parse and validate a JSON document; missing sections take defaults
    ///
    /// # Errors
    ///
    /// Returns `Parse` for malformed JSON and `Invalid` for out-of-range values
    pub fn from_json_str(document: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    /// Load every section from the environment
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            engine: EngineConfig::from_env(),
            registry: RegistryConfig::from_env(),
            cache: CacheConfig::from_env(),
            telemetry: TelemetryConfig::from_env(),
        }
    }

    /// Reject values no component can run with
    ///
    /// # Errors
    ///
    /// Returns `Invalid` naming the first offending field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.max_size == 0 {
            return Err(ConfigError::Invalid {
                field: "cache.maxSize",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.engine.default_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "engine.defaultTimeout",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.registry.enable_versioning && self.registry.max_versions_per_protocol == 0 {
            return Err(ConfigError::Invalid {
                field: "registry.maxVersionsPerProtocol",
                reason: "must be at least 1 when versioning is enabled".to_string(),
            });
        }
        Ok(())
    }
}
