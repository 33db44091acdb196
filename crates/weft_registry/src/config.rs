//! Registry configuration.

use serde::{Deserialize, Serialize};

/// Default cap on versions kept per protocol name
pub const DEFAULT_MAX_VERSIONS: usize = 10;

/// Registry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistryConfig {
    /// Allow re-registering an id, replacing the previous definition
    pub enable_versioning: bool,
    /// Maintain per-protocol and per-operation execution stats
    pub enable_stats: bool,
    /// Whether callers should consult `check_compatibility`
    pub enable_compatibility_check: bool,
    /// Versions allowed per protocol name while versioning
    pub max_versions_per_protocol: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            enable_versioning: false,
            enable_stats: true,
            enable_compatibility_check: true,
            max_versions_per_protocol: DEFAULT_MAX_VERSIONS,
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name).ok().map(|v| v != "false" && v != "0")
}

impl RegistryConfig {
    /// Load from `WEFT_REGISTRY_*` environment variables.
    ///
    /// Absent or unparsable values fall back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enable_versioning: env_flag("WEFT_REGISTRY_VERSIONING")
                .unwrap_or(defaults.enable_versioning),
            enable_stats: env_flag("WEFT_REGISTRY_STATS").unwrap_or(defaults.enable_stats),
            enable_compatibility_check: env_flag("WEFT_REGISTRY_COMPATIBILITY_CHECK")
                .unwrap_or(defaults.enable_compatibility_check),
            max_versions_per_protocol: std::env::var("WEFT_REGISTRY_MAX_VERSIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_versions_per_protocol),
        }
    }

    /// Enable or disable versioning
    #[must_use]
    pub fn with_versioning(mut self, enabled: bool) -> Self {
        self.enable_versioning = enabled;
        self
    }

    /// Enable or disable stats
    #[must_use]
    pub fn with_stats(mut self, enabled: bool) -> Self {
        self.enable_stats = enabled;
        self
    }

    /// Enable or disable the compatibility check
    #[must_use]
    pub fn with_compatibility_check(mut self, enabled: bool) -> Self {
        self.enable_compatibility_check = enabled;
        self
    }

    /// Set the per-name version cap
    #[must_use]
    pub fn with_max_versions(mut self, max: usize) -> Self {
        self.max_versions_per_protocol = max;
        self
    }
}
