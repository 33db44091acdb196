//! Core error types for WEFT.

use crate::violation::{SchemaViolation, ValidationStage};
use std::fmt;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
///
/// Registration-time failures are returned to the caller as-is. Execution-time
/// failures are folded into a failed execution result by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A protocol with this id is already registered
    DuplicateProtocol {
        /// Id that was registered twice
        protocol_id: String,
    },

    /// A declared dependency is not registered
    MissingDependency {
        /// Protocol being registered
        protocol_id: String,
        /// Dependency that could not be resolved
        dependency: String,
    },

    /// Other protocols still depend on this one
    HasDependents {
        /// Protocol being unregistered
        protocol_id: String,
        /// Registered protocols that depend on it, sorted
        dependents: Vec<String>,
    },

    /// Re-registration would make the dependency graph cyclic
    DependencyCycle {
        /// Protocol being registered
        protocol_id: String,
        /// Dependency that already depends on it
        dependency: String,
    },

    /// The protocol schema document was rejected by the validator
    InvalidSchema {
        /// Protocol being registered
        protocol_id: String,
        /// Problems found in the schema documents
        violations: Vec<SchemaViolation>,
    },

    /// Versioned re-registration exceeded the configured bound
    TooManyVersions {
        /// Protocol name whose version set is full
        name: String,
        /// Configured maximum
        limit: usize,
    },

    /// Protocol lookup miss
    ProtocolNotFound {
        /// Id that was looked up
        protocol_id: String,
    },

    /// Operation lookup miss
    OperationNotFound {
        /// Protocol that was found
        protocol_id: String,
        /// Operation name that was not
        operation: String,
    },

    /// Operation exists but has no handler bound
    NoHandler {
        /// Owning protocol
        protocol_id: String,
        /// Operation without a handler
        operation: String,
    },

    /// Input or output failed schema validation
    ValidationFailed {
        /// Which side of the call was checked
        stage: ValidationStage,
        /// Every violation found
        violations: Vec<SchemaViolation>,
    },

    /// Handler did not finish before its deadline
    OperationTimeout {
        /// Deadline that elapsed, milliseconds
        timeout_ms: u64,
    },

    /// Engine is stopped
    EngineNotRunning,

    /// Handler returned an error or panicked
    HandlerFailed {
        /// Rendered handler error
        message: String,
    },

    /// Cache-only lookup found nothing
    CacheMiss {
        /// Key that was absent
        key: String,
    },

    /// Key pattern did not compile
    InvalidPattern {
        /// Pattern as given
        pattern: String,
        /// Compiler message
        reason: String,
    },

    /// Configuration value rejected
    InvalidConfig {
        /// Offending field, dotted path
        field: String,
        /// Why it was rejected
        reason: String,
    },

    /// Internal error (for unexpected errors)
    Internal {
        /// Error message
        message: String,
    },
}

impl CoreError {
    /// Violations attached to this error, if any
    #[must_use]
    pub fn violations(&self) -> &[SchemaViolation] {
        match self {
            Self::InvalidSchema { violations, .. } | Self::ValidationFailed { violations, .. } => {
                violations
            }
            _ => &[],
        }
    }

    /// Whether the error is a not-found lookup miss
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ProtocolNotFound { .. } | Self::OperationNotFound { .. }
        )
    }
}

fn join_violations(violations: &[SchemaViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateProtocol { protocol_id } => {
                write!(f, "Protocol already registered: {}", protocol_id)
            }
            Self::MissingDependency {
                protocol_id,
                dependency,
            } => write!(
                f,
                "Missing dependency: {} (required by {})",
                dependency, protocol_id
            ),
            Self::DependencyCycle {
                protocol_id,
                dependency,
            } => write!(
                f,
                "Dependency cycle: {} already depends on {}",
                dependency, protocol_id
            ),
            Self::HasDependents {
                protocol_id,
                dependents,
            } => write!(
                f,
                "Cannot unregister protocol {}: it has dependents: {}",
                protocol_id,
                dependents.join(", ")
            ),
            Self::InvalidSchema {
                protocol_id,
                violations,
            } => write!(
                f,
                "Invalid protocol schema for {}: {}",
                protocol_id,
                join_violations(violations)
            ),
            Self::TooManyVersions { name, limit } => write!(
                f,
                "Maximum versions exceeded for protocol: {} (limit {})",
                name, limit
            ),
            Self::ProtocolNotFound { protocol_id } => {
                write!(f, "Protocol not found: {}", protocol_id)
            }
            Self::OperationNotFound {
                protocol_id,
                operation,
            } => write!(f, "Operation not found: {}:{}", protocol_id, operation),
            Self::NoHandler {
                protocol_id,
                operation,
            } => write!(
                f,
                "No handler bound for operation: {}:{}",
                protocol_id, operation
            ),
            Self::ValidationFailed { stage, violations } => write!(
                f,
                "{} validation failed: {}",
                stage.label(),
                join_violations(violations)
            ),
            Self::OperationTimeout { .. } => write!(f, "Operation timeout"),
            Self::EngineNotRunning => write!(f, "Protocol engine is not running"),
            Self::HandlerFailed { message } => write!(f, "{}", message),
            Self::CacheMiss { key } => write!(f, "Cache miss for key: {}", key),
            Self::InvalidPattern { pattern, reason } => {
                write!(f, "Invalid key pattern {}: {}", pattern, reason)
            }
            Self::InvalidConfig { field, reason } => {
                write!(f, "Invalid configuration for {}: {}", field, reason)
            }
            Self::Internal { message } => write!(f, "Internal error: {}", message),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::DuplicateProtocol {
            protocol_id: "math".to_string(),
        };
        assert_eq!(format!("{}", err), "Protocol already registered: math");

        let err = CoreError::ProtocolNotFound {
            protocol_id: "unknown".to_string(),
        };
        assert!(err.to_string().contains("not found"));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_timeout_message_is_stable() {
        let err = CoreError::OperationTimeout { timeout_ms: 1000 };
        assert_eq!(err.to_string(), "Operation timeout");
    }

    #[test]
    fn test_validation_failed_lists_violations() {
        let err = CoreError::ValidationFailed {
            stage: ValidationStage::Input,
            violations: vec![
                SchemaViolation::new("/a", "type", "expected number, got string"),
                SchemaViolation::new("/b", "required", "missing property"),
            ],
        };
        let s = err.to_string();
        assert!(s.starts_with("Input validation failed"));
        assert!(s.contains("/a"));
        assert!(s.contains("/b"));
        assert_eq!(err.violations().len(), 2);
    }

    #[test]
    fn test_has_dependents_display() {
        let err = CoreError::HasDependents {
            protocol_id: "b".to_string(),
            dependents: vec!["a".to_string(), "c".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Cannot unregister protocol b: it has dependents: a, c"
        );
    }

    #[test]
    fn test_error_equality() {
        let err1 = CoreError::EngineNotRunning;
        let err2 = CoreError::EngineNotRunning;
        assert_eq!(err1, err2);
        assert_ne!(err1, CoreError::OperationTimeout { timeout_ms: 1 });
    }
}
