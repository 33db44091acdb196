//! Schema validator seam and the bundled JSON-Schema implementation.

use crate::check::check_value;
use crate::meta::check_schema;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use weft_core::ValidationOutcome;

/// Counters exposed by a validator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorMetrics {
    /// Values validated
    pub validations: u64,
    /// Validations that found at least one violation
    pub failures: u64,
    /// Schemas currently pre-registered
    pub cached_schemas: usize,
    /// Validations served from a pre-registered schema
    pub cache_hits: u64,
}

/// Validates values against schema documents
///
/// Callers depend only on the [`ValidationOutcome`] shape, never on a
/// particular schema vocabulary.
#[async_trait]
pub trait SchemaValidator: Send + Sync {
    /// Validate `data` against `schema`
    async fn validate(&self, schema: &Value, data: &Value) -> ValidationOutcome;

    /// Check that `schema` is itself a usable schema document
    async fn check_schema(&self, schema: &Value) -> ValidationOutcome;

    /// Pre-register a schema under `id`, replacing any previous one
    async fn add_schema(&self, id: &str, schema: Value);

    /// Drop a pre-registered schema, returning whether it existed
    async fn remove_schema(&self, id: &str) -> bool;

    /// Validate against a pre-registered schema, `None` if `id` is unknown
    async fn validate_by_id(&self, id: &str, data: &Value) -> Option<ValidationOutcome>;

    /// Snapshot of validator counters
    async fn metrics(&self) -> ValidatorMetrics;
}

/// JSON-Schema subset validator with a pre-registration cache
pub struct JsonSchemaValidator {
    schemas: RwLock<IndexMap<String, Value>>,
    validations: AtomicU64,
    failures: AtomicU64,
    cache_hits: AtomicU64,
}

impl JsonSchemaValidator {
    /// Create a validator with an empty schema cache
    #[must_use]
    pub fn new() -> Self {
        Self {
            schemas: RwLock::new(IndexMap::new()),
            validations: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
        }
    }

    /// Ids of the pre-registered schemas
    pub async fn schema_ids(&self) -> Vec<String> {
        self.schemas.read().await.keys().cloned().collect()
    }

    fn record(&self, outcome: ValidationOutcome) -> ValidationOutcome {
        self.validations.fetch_add(1, Ordering::Relaxed);
        if !outcome.valid {
            self.failures.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(violations = outcome.errors.len(), "value rejected by schema");
        }
        outcome
    }
}

impl Default for JsonSchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SchemaValidator for JsonSchemaValidator {
    async fn validate(&self, schema: &Value, data: &Value) -> ValidationOutcome {
        self.record(ValidationOutcome::from_violations(check_value(schema, data)))
    }

    async fn check_schema(&self, schema: &Value) -> ValidationOutcome {
        ValidationOutcome::from_violations(check_schema(schema))
    }

    async fn add_schema(&self, id: &str, schema: Value) {
        self.schemas.write().await.insert(id.to_string(), schema);
        tracing::trace!(schema_id = id, "schema cached");
    }

    async fn remove_schema(&self, id: &str) -> bool {
        self.schemas.write().await.shift_remove(id).is_some()
    }

    async fn validate_by_id(&self, id: &str, data: &Value) -> Option<ValidationOutcome> {
        let schemas = self.schemas.read().await;
        let schema = schemas.get(id)?;
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        Some(self.record(ValidationOutcome::from_violations(check_value(schema, data))))
    }

    async fn metrics(&self) -> ValidatorMetrics {
        ValidatorMetrics {
            validations: self.validations.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            cached_schemas: self.schemas.read().await.len(),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn number_pair() -> Value {
        json!({
            "type": "object",
            "properties": { "a": { "type": "number" }, "b": { "type": "number" } },
            "required": ["a", "b"]
        })
    }

    #[tokio::test]
    async fn test_validate_counts() {
        let validator = JsonSchemaValidator::new();
        assert!(validator.validate(&number_pair(), &json!({ "a": 1, "b": 2 })).await.valid);

        let outcome = validator.validate(&number_pair(), &json!({ "a": "x", "b": 2 })).await;
        assert!(!outcome.valid);
        assert_eq!(outcome.errors[0].path, "/a");

        let metrics = validator.metrics().await;
        assert_eq!(metrics.validations, 2);
        assert_eq!(metrics.failures, 1);
    }

    #[tokio::test]
    async fn test_check_schema_does_not_count_as_validation() {
        let validator = JsonSchemaValidator::new();
        assert!(!validator.check_schema(&json!({ "type": "invalid-type" })).await.valid);
        assert!(validator.check_schema(&number_pair()).await.valid);
        assert_eq!(validator.metrics().await.validations, 0);
    }

    #[tokio::test]
    async fn test_schema_cache() {
        let validator = JsonSchemaValidator::new();
        validator.add_schema("math", number_pair()).await;
        assert_eq!(validator.schema_ids().await, vec!["math"]);

        let outcome = validator
            .validate_by_id("math", &json!({ "a": 1 }))
            .await
            .unwrap();
        assert!(!outcome.valid);
        assert!(validator.validate_by_id("other", &json!({})).await.is_none());

        let metrics = validator.metrics().await;
        assert_eq!(metrics.cached_schemas, 1);
        assert_eq!(metrics.cache_hits, 1);

        assert!(validator.remove_schema("math").await);
        assert!(!validator.remove_schema("math").await);
        assert_eq!(validator.metrics().await.cached_schemas, 0);
    }

    #[tokio::test]
    async fn test_validator_as_trait_object() {
        let validator: std::sync::Arc<dyn SchemaValidator> =
            std::sync::Arc::new(JsonSchemaValidator::default());
        assert!(validator.validate(&json!({ "type": "number" }), &json!(8)).await.valid);
    }
}
