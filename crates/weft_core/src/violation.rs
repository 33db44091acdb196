//! Structured schema violations shared by the validator, engine and registry.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single schema violation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaViolation {
    /// JSON pointer to the offending value ("" for the root)
    pub path: String,
    /// Schema keyword that rejected the value
    pub keyword: String,
    /// Human-readable message
    pub message: String,
}

impl SchemaViolation {
    /// Create a new violation
    #[must_use]
    pub fn new(
        path: impl Into<String>,
        keyword: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            keyword: keyword.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        write!(f, "{} ({}): {}", path, self.keyword, self.message)
    }
}

/// Which side of an operation was being validated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStage {
    /// Operation input
    Input,
    /// Operation output
    Output,
}

impl ValidationStage {
    /// Capitalised label used in messages
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Input => "Input",
            Self::Output => "Output",
        }
    }
}

/// Result shape returned by every schema validator
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationOutcome {
    /// Whether the value satisfied the schema
    pub valid: bool,
    /// Every violation found (empty when valid)
    pub errors: Vec<SchemaViolation>,
}

impl ValidationOutcome {
    /// A passing outcome
    #[must_use]
    pub fn valid() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    /// Build an outcome from collected violations
    #[must_use]
    pub fn from_violations(errors: Vec<SchemaViolation>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}
