//! Outcome of one operation call.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use weft_core::{CoreError, SchemaViolation, Timestamp};

/// Where and how long a call ran
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetadata {
    /// Milliseconds, never below one
    pub execution_time: u64,
    /// Protocol that was called
    pub protocol_id: String,
    /// Operation that was called
    pub operation_name: String,
    /// When the call finished
    pub timestamp: Timestamp,
}

/// Result of `execute_operation`, for success and failure alike
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// Whether the call succeeded
    pub success: bool,
    /// Handler output on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Human-readable failure message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Structured schema violations when validation failed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<SchemaViolation>,
    /// Timing and addressing of the call
    pub metadata: ExecutionMetadata,
}

impl ExecutionResult {
    pub(crate) fn success(
        protocol_id: &str,
        operation_name: &str,
        data: Value,
        execution_time: u64,
    ) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            violations: Vec::new(),
            metadata: ExecutionMetadata {
                execution_time,
                protocol_id: protocol_id.to_string(),
                operation_name: operation_name.to_string(),
                timestamp: Timestamp::now(),
            },
        }
    }

    pub(crate) fn failure(
        protocol_id: &str,
        operation_name: &str,
        error: &CoreError,
        execution_time: u64,
    ) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            violations: error.violations().to_vec(),
            metadata: ExecutionMetadata {
                execution_time,
                protocol_id: protocol_id.to_string(),
                operation_name: operation_name.to_string(),
                timestamp: Timestamp::now(),
            },
        }
    }

    /// Convert into a plain `Result`, keeping only the message on failure
    ///
    /// # Errors
    ///
    /// Returns the error message of a failed call
    pub fn into_result(self) -> Result<Value, String> {
        match (self.success, self.data, self.error) {
            (true, data, _) => Ok(data.unwrap_or(Value::Null)),
            (false, _, error) => Err(error.unwrap_or_default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use weft_core::ValidationStage;

    #[test]
    fn test_success_shape() {
        let result = ExecutionResult::success("math", "add", json!(8), 3);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["data"], 8);
        assert_eq!(value["metadata"]["executionTime"], 3);
        assert_eq!(value["metadata"]["protocolId"], "math");
        assert!(value.get("error").is_none());
        assert!(value.get("violations").is_none());
    }

    #[test]
    fn test_failure_carries_violations() {
        let err = CoreError::ValidationFailed {
            stage: ValidationStage::Input,
            violations: vec![SchemaViolation::new("/a", "type", "expected number, got string")],
        };
        let result = ExecutionResult::failure("math", "add", &err, 1);
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("validation"));
        assert_eq!(result.violations.len(), 1);
        assert!(result.into_result().unwrap_err().starts_with("Input"));
    }
}
