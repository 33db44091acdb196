//! Protocol execution engine.
//!
//! The engine owns its own protocol map and handler index; an attached
//! [`SharedRegistry`] only receives execution stats. Registration and
//! execution require the engine to be running.

use crate::config::{ConfigError, EngineConfig, WeftConfig};
use crate::metrics::{Counters, EngineMetrics};
use crate::result::ExecutionResult;
use indexmap::IndexMap;
use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use weft_cache::CacheStore;
use weft_core::{
    CoreError, CoreResult, OperationContext, OperationDefinition, OperationHandler, OperationKey,
    ProtocolDefinition, SchemaViolation, Stopwatch, Timestamp, ValidationOutcome,
    ValidationStage,
};
use weft_events::{
    EngineLifecycle, Event, EventBus, EventFeed, OperationCompleted, OperationFailed,
    OperationStarted, ProtocolRegistered, ProtocolUnregistered, ValidationFailed,
};
use weft_registry::SharedRegistry;
use weft_schema::{JsonSchemaValidator, SchemaValidator};

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineStatus {
    #[default]
    Stopped,
    Running,
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Running => write!(f, "running"),
        }
    }
}

#[derive(Default)]
struct Lifecycle {
    status: EngineStatus,
    started_at: Option<Instant>,
}

#[derive(Default)]
struct EngineState {
    protocols: IndexMap<String, ProtocolDefinition>,
    handlers: IndexMap<OperationKey, Arc<dyn OperationHandler>>,
}

/// Everything a call needs, copied out of the state lock
struct Target {
    operation: OperationDefinition,
    handler: Option<Arc<dyn OperationHandler>>,
}

fn input_schema_id(key: &OperationKey) -> String {
    format!("{}#input", key)
}

fn output_schema_id(key: &OperationKey) -> String {
    format!("{}#output", key)
}

/// Protocol engine
pub struct ProtocolEngine {
    config: EngineConfig,
    validator: Arc<dyn SchemaValidator>,
    feed: Arc<dyn EventFeed>,
    registry: Option<Arc<SharedRegistry>>,
    cache: Option<Arc<CacheStore>>,
    lifecycle: Mutex<Lifecycle>,
    state: RwLock<EngineState>,
    counters: Mutex<Counters>,
}

impl ProtocolEngine {
    /// Create a stopped engine with the built-in validator and a private bus
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            validator: Arc::new(JsonSchemaValidator::new()),
            feed: Arc::new(EventBus::new()),
            registry: None,
            cache: None,
            lifecycle: Mutex::new(Lifecycle::default()),
            state: RwLock::new(EngineState::default()),
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Engine with the development preset
    #[must_use]
    pub fn development() -> Self {
        Self::new(EngineConfig::development())
    }

    /// Engine with the production preset
    #[must_use]
    pub fn production() -> Self {
        Self::new(EngineConfig::production())
    }

    /// Engine wired to a fresh registry and cache built from `config`
    ///
    /// # Errors
    ///
    /// Returns `Invalid` if the configuration fails validation
    pub fn from_config(config: &WeftConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(config.engine.clone())
            .with_registry(Arc::new(SharedRegistry::new(config.registry.clone())))
            .with_cache(CacheStore::new(config.cache.clone())))
    }

    /// Use a different schema validator
    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Publish events to `feed`
    #[must_use]
    pub fn with_event_feed(mut self, feed: Arc<dyn EventFeed>) -> Self {
        self.feed = feed;
        self
    }

    /// Report execution stats to `registry`
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<SharedRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Include `cache` metrics in snapshots
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Event feed the engine publishes to
    #[must_use]
    pub fn event_feed(&self) -> &Arc<dyn EventFeed> {
        &self.feed
    }

    /// Attached registry, if any
    #[must_use]
    pub fn registry(&self) -> Option<&Arc<SharedRegistry>> {
        self.registry.as_ref()
    }

    /// Attached cache, if any
    #[must_use]
    pub fn cache(&self) -> Option<&Arc<CacheStore>> {
        self.cache.as_ref()
    }

    /// Current lifecycle state
    pub async fn status(&self) -> EngineStatus {
        self.lifecycle.lock().await.status
    }

    /// Check if the engine accepts work
    pub async fn is_running(&self) -> bool {
        self.status().await == EngineStatus::Running
    }

    /// Start the engine. Starting a running engine does nothing.
    pub async fn start(&self) {
        {
            let mut lifecycle = self.lifecycle.lock().await;
            if lifecycle.status == EngineStatus::Running {
                return;
            }
            lifecycle.status = EngineStatus::Running;
            lifecycle.started_at = Some(Instant::now());
        }

        let protocol_count = self.state.read().await.protocols.len();
        tracing::info!(protocol_count, "protocol engine started");
        self.feed.publish(Event::EngineStarted(EngineLifecycle {
            protocol_count,
            timestamp: Timestamp::now(),
        }));
    }

    /// Stop the engine. Stopping a stopped engine does nothing.
    pub async fn stop(&self) {
        {
            let mut lifecycle = self.lifecycle.lock().await;
            if lifecycle.status == EngineStatus::Stopped {
                return;
            }
            lifecycle.status = EngineStatus::Stopped;
            lifecycle.started_at = None;
        }

        let protocol_count = self.state.read().await.protocols.len();
        tracing::info!(protocol_count, "protocol engine stopped");
        self.feed.publish(Event::EngineStopped(EngineLifecycle {
            protocol_count,
            timestamp: Timestamp::now(),
        }));
    }

    async fn ensure_running(&self) -> CoreResult<()> {
        if self.is_running().await {
            Ok(())
        } else {
            Err(CoreError::EngineNotRunning)
        }
    }

    /// Meta-check the protocol schema and every operation schema
    async fn check_schemas(&self, definition: &ProtocolDefinition) -> Vec<SchemaViolation> {
        let mut violations = self.validator.check_schema(&definition.schema).await.errors;

        for (name, operation) in &definition.operations {
            let declared = [
                ("inputSchema", &operation.input_schema),
                ("outputSchema", &operation.output_schema),
            ];
            for (field, schema) in declared {
                let Some(schema) = schema else { continue };
                let prefix = format!("/operations/{}/{}", name, field);
                violations.extend(
                    self.validator
                        .check_schema(schema)
                        .await
                        .errors
                        .into_iter()
                        .map(|v| SchemaViolation::new(format!("{}{}", prefix, v.path), v.keyword, v.message)),
                );
            }
        }
        violations
    }

    /// Register a protocol and index its handlers.
    ///
    /// # Errors
    ///
    /// - `EngineNotRunning` while stopped
    /// - `InvalidSchema` with the validator's violations
    /// - `DuplicateProtocol` if the id is taken
    /// - `MissingDependency` if a dependency is not registered with this engine
    pub async fn register_protocol(&self, definition: ProtocolDefinition) -> CoreResult<()> {
        self.ensure_running().await?;

        let violations = self.check_schemas(&definition).await;
        if !violations.is_empty() {
            return Err(CoreError::InvalidSchema {
                protocol_id: definition.id.clone(),
                violations,
            });
        }

        let protocol_id = definition.id.clone();
        {
            let mut state = self.state.write().await;
            if state.protocols.contains_key(&protocol_id) {
                return Err(CoreError::DuplicateProtocol { protocol_id });
            }
            if let Some(dependency) = definition
                .dependencies
                .iter()
                .find(|dep| !state.protocols.contains_key(*dep))
            {
                return Err(CoreError::MissingDependency {
                    protocol_id,
                    dependency: dependency.clone(),
                });
            }

            for (name, operation) in &definition.operations {
                if let Some(handler) = &operation.handler {
                    state
                        .handlers
                        .insert(OperationKey::new(&protocol_id, name), Arc::clone(handler));
                }
            }
            state.protocols.insert(protocol_id.clone(), definition.clone());
        }

        if self.config.enable_schema_cache {
            self.cache_schemas(&definition).await;
        }

        tracing::info!(
            protocol_id = %protocol_id,
            name = %definition.name,
            version = %definition.version,
            operation_count = definition.operations.len(),
            "protocol registered"
        );
        self.feed
            .publish(Event::ProtocolRegistered(ProtocolRegistered::of(&definition)));
        Ok(())
    }

    async fn cache_schemas(&self, definition: &ProtocolDefinition) {
        self.validator
            .add_schema(&definition.id, definition.schema.clone())
            .await;
        for (name, operation) in &definition.operations {
            let key = OperationKey::new(&definition.id, name);
            if let Some(schema) = &operation.input_schema {
                self.validator
                    .add_schema(&input_schema_id(&key), schema.clone())
                    .await;
            }
            if let Some(schema) = &operation.output_schema {
                self.validator
                    .add_schema(&output_schema_id(&key), schema.clone())
                    .await;
            }
        }
    }

    /// Remove a protocol and its handlers, returning `false` if absent.
    ///
    /// # Errors
    ///
    /// Returns `HasDependents` while other registered protocols depend on it
    pub async fn unregister_protocol(&self, protocol_id: &str) -> CoreResult<bool> {
        let definition = {
            let mut state = self.state.write().await;
            if !state.protocols.contains_key(protocol_id) {
                return Ok(false);
            }

            let mut dependents: Vec<String> = state
                .protocols
                .values()
                .filter(|p| p.dependencies.iter().any(|d| d == protocol_id))
                .map(|p| p.id.clone())
                .collect();
            if !dependents.is_empty() {
                dependents.sort();
                return Err(CoreError::HasDependents {
                    protocol_id: protocol_id.to_string(),
                    dependents,
                });
            }

            let Some(definition) = state.protocols.shift_remove(protocol_id) else {
                return Ok(false);
            };
            for name in definition.operations.keys() {
                state
                    .handlers
                    .shift_remove(&OperationKey::new(protocol_id, name));
            }
            definition
        };

        if self.config.enable_schema_cache {
            self.validator.remove_schema(protocol_id).await;
            for name in definition.operations.keys() {
                let key = OperationKey::new(protocol_id, name);
                self.validator.remove_schema(&input_schema_id(&key)).await;
                self.validator.remove_schema(&output_schema_id(&key)).await;
            }
        }

        tracing::info!(protocol_id, "protocol unregistered");
        self.feed
            .publish(Event::ProtocolUnregistered(ProtocolUnregistered {
                protocol_id: protocol_id.to_string(),
                timestamp: Timestamp::now(),
            }));
        Ok(true)
    }

    /// Bind or replace the handler of a registered operation
    ///
    /// # Errors
    ///
    /// Returns `ProtocolNotFound` or `OperationNotFound`
    pub async fn bind_handler(
        &self,
        protocol_id: &str,
        operation: &str,
        handler: Arc<dyn OperationHandler>,
    ) -> CoreResult<()> {
        let mut state = self.state.write().await;
        let definition = state
            .protocols
            .get_mut(protocol_id)
            .ok_or_else(|| CoreError::ProtocolNotFound {
                protocol_id: protocol_id.to_string(),
            })?;
        let op = definition
            .operations
            .get_mut(operation)
            .ok_or_else(|| CoreError::OperationNotFound {
                protocol_id: protocol_id.to_string(),
                operation: operation.to_string(),
            })?;
        op.handler = Some(Arc::clone(&handler));
        state
            .handlers
            .insert(OperationKey::new(protocol_id, operation), handler);

        tracing::debug!(protocol_id, operation, "handler bound");
        Ok(())
    }

    /// Definition of a registered protocol
    pub async fn get_protocol(&self, protocol_id: &str) -> Option<ProtocolDefinition> {
        self.state.read().await.protocols.get(protocol_id).cloned()
    }

    /// Every registered protocol, in registration order
    pub async fn registered_protocols(&self) -> Vec<ProtocolDefinition> {
        self.state.read().await.protocols.values().cloned().collect()
    }

    /// Validate `data` against a protocol's own schema
    ///
    /// # Errors
    ///
    /// Returns `ProtocolNotFound` for unknown ids
    pub async fn validate_protocol_data(
        &self,
        protocol_id: &str,
        data: &Value,
    ) -> CoreResult<ValidationOutcome> {
        let schema = self
            .state
            .read()
            .await
            .protocols
            .get(protocol_id)
            .map(|p| p.schema.clone())
            .ok_or_else(|| CoreError::ProtocolNotFound {
                protocol_id: protocol_id.to_string(),
            })?;

        if self.config.enable_schema_cache {
            if let Some(outcome) = self.validator.validate_by_id(protocol_id, data).await {
                return Ok(outcome);
            }
        }
        Ok(self.validator.validate(&schema, data).await)
    }

    async fn resolve(&self, protocol_id: &str, operation: &str) -> CoreResult<Target> {
        self.ensure_running().await?;

        let state = self.state.read().await;
        let definition =
            state
                .protocols
                .get(protocol_id)
                .ok_or_else(|| CoreError::ProtocolNotFound {
                    protocol_id: protocol_id.to_string(),
                })?;
        let op = definition
            .operations
            .get(operation)
            .ok_or_else(|| CoreError::OperationNotFound {
                protocol_id: protocol_id.to_string(),
                operation: operation.to_string(),
            })?;

        Ok(Target {
            operation: op.clone(),
            handler: state
                .handlers
                .get(&OperationKey::new(protocol_id, operation))
                .cloned(),
        })
    }

    /// Execute an operation.
    ///
    /// Never fails: lookup misses, validation failures, handler errors,
    /// panics and timeouts all come back as a failed [`ExecutionResult`].
    /// `context` is completed with the protocol id and operation name when
    /// those are empty.
    pub async fn execute_operation(
        &self,
        protocol_id: &str,
        operation: &str,
        input: Value,
        context: Option<OperationContext>,
    ) -> ExecutionResult {
        let stopwatch = Stopwatch::start();

        let target = match self.resolve(protocol_id, operation).await {
            Ok(target) => target,
            Err(err) => {
                let elapsed = stopwatch.elapsed_ms();
                tracing::debug!(protocol_id, operation, error = %err, "operation rejected");
                self.record(false, elapsed).await;
                return ExecutionResult::failure(protocol_id, operation, &err, elapsed);
            }
        };

        let context = context
            .unwrap_or_default()
            .complete(protocol_id, operation);
        self.feed.publish(Event::OperationStarted(OperationStarted {
            protocol_id: protocol_id.to_string(),
            operation_name: operation.to_string(),
            session_id: context.session_id.clone(),
            timestamp: Timestamp::now(),
        }));

        let key = OperationKey::new(protocol_id, operation);
        let outcome = self.run(&key, target, input, context).await;
        let elapsed = stopwatch.elapsed_ms();

        if let Some(registry) = &self.registry {
            registry
                .update_execution_stats(protocol_id, operation, elapsed, outcome.is_ok())
                .await;
        }

        match outcome {
            Ok(data) => {
                self.record(true, elapsed).await;
                tracing::debug!(protocol_id, operation, elapsed_ms = elapsed, "operation completed");
                self.feed.publish(Event::OperationCompleted(OperationCompleted {
                    protocol_id: protocol_id.to_string(),
                    operation_name: operation.to_string(),
                    execution_time: elapsed,
                    timestamp: Timestamp::now(),
                }));
                ExecutionResult::success(protocol_id, operation, data, elapsed)
            }
            Err(err) => {
                if let CoreError::ValidationFailed { stage, violations } = &err {
                    self.feed.publish(Event::ValidationFailed(ValidationFailed {
                        protocol_id: protocol_id.to_string(),
                        operation_name: operation.to_string(),
                        stage: *stage,
                        errors: violations.clone(),
                        timestamp: Timestamp::now(),
                    }));
                }
                self.record(false, elapsed).await;
                tracing::debug!(protocol_id, operation, error = %err, "operation failed");
                self.feed.publish(Event::OperationFailed(OperationFailed {
                    protocol_id: protocol_id.to_string(),
                    operation_name: operation.to_string(),
                    error: err.to_string(),
                    execution_time: elapsed,
                    timestamp: Timestamp::now(),
                }));
                ExecutionResult::failure(protocol_id, operation, &err, elapsed)
            }
        }
    }

    async fn run(
        &self,
        key: &OperationKey,
        target: Target,
        input: Value,
        context: OperationContext,
    ) -> CoreResult<Value> {
        let Target { operation, handler } = target;

        if self.config.validate_input {
            if let Some(schema) = &operation.input_schema {
                self.validate_stage(&input_schema_id(key), schema, &input, ValidationStage::Input)
                    .await?;
            }
        }

        let (protocol_id, operation_name) = key.split();
        let handler = handler.ok_or_else(|| CoreError::NoHandler {
            protocol_id: protocol_id.to_string(),
            operation: operation_name.to_string(),
        })?;

        // A zero deadline could never be met, so it falls back to the default
        let limit = operation
            .timeout
            .filter(|t| !t.is_zero())
            .unwrap_or(self.config.default_timeout);
        let retries = operation.retries.unwrap_or(0).min(self.config.max_retries);
        let data = self.invoke(key, handler, input, context, limit, retries).await?;

        if self.config.validate_output {
            if let Some(schema) = &operation.output_schema {
                self.validate_stage(&output_schema_id(key), schema, &data, ValidationStage::Output)
                    .await?;
            }
        }
        Ok(data)
    }

    async fn validate_stage(
        &self,
        schema_id: &str,
        schema: &Value,
        data: &Value,
        stage: ValidationStage,
    ) -> CoreResult<()> {
        let cached = if self.config.enable_schema_cache {
            self.validator.validate_by_id(schema_id, data).await
        } else {
            None
        };
        let outcome = match cached {
            Some(outcome) => outcome,
            None => self.validator.validate(schema, data).await,
        };

        if outcome.valid {
            Ok(())
        } else {
            Err(CoreError::ValidationFailed {
                stage,
                violations: outcome.errors,
            })
        }
    }

    /// Run the handler on its own task, racing the whole retry loop
    /// against `limit`
    async fn invoke(
        &self,
        key: &OperationKey,
        handler: Arc<dyn OperationHandler>,
        input: Value,
        context: OperationContext,
        limit: Duration,
        retries: u32,
    ) -> CoreResult<Value> {
        let task = tokio::spawn(async move {
            let mut attempt = 0u32;
            loop {
                let ctx = if attempt == 0 {
                    context.clone()
                } else {
                    context.clone().with_metadata("attempt", json!(attempt))
                };
                match handler.handle(input.clone(), ctx).await {
                    Ok(value) => return Ok(value),
                    Err(err) if attempt < retries => {
                        attempt += 1;
                        tracing::debug!(attempt, error = %err, "retrying handler");
                    }
                    Err(err) => return Err(err),
                }
            }
        });
        let abort = task.abort_handle();

        match tokio::time::timeout(limit, task).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(err))) => Err(CoreError::HandlerFailed {
                message: err.to_string(),
            }),
            Ok(Err(join)) => {
                tracing::warn!(operation = %key, panicked = join.is_panic(), "handler task ended abnormally");
                let message = if join.is_panic() {
                    "Handler panicked"
                } else {
                    "Handler cancelled"
                };
                Err(CoreError::HandlerFailed {
                    message: message.to_string(),
                })
            }
            Err(_) => {
                if self.config.cancel_on_timeout {
                    abort.abort();
                }
                let timeout_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(
                    operation = %key,
                    timeout_ms,
                    cancelled = self.config.cancel_on_timeout,
                    "operation timed out"
                );
                Err(CoreError::OperationTimeout { timeout_ms })
            }
        }
    }

    async fn record(&self, success: bool, execution_ms: u64) {
        if self.config.enable_metrics {
            self.counters.lock().await.record(success, execution_ms);
        }
    }

    /// Snapshot of counters plus validator and cache metrics
    pub async fn metrics(&self) -> EngineMetrics {
        let counters = *self.counters.lock().await;
        let (is_running, uptime) = {
            let lifecycle = self.lifecycle.lock().await;
            let uptime = lifecycle.started_at.map_or(0, |t| {
                u64::try_from(t.elapsed().as_millis()).unwrap_or(u64::MAX)
            });
            (lifecycle.status == EngineStatus::Running, uptime)
        };
        let protocol_count = self.state.read().await.protocols.len();
        let cache = match &self.cache {
            Some(cache) => Some(cache.metrics().await),
            None => None,
        };

        EngineMetrics {
            is_running,
            protocol_count,
            total_operations: counters.total,
            successful_operations: counters.successful,
            failed_operations: counters.failed,
            average_execution_time: counters.average_ms,
            uptime,
            validator: self.validator.metrics().await,
            cache,
        }
    }

    /// Zero the execution counters; the protocol count is unaffected
    pub async fn reset_metrics(&self) {
        *self.counters.lock().await = Counters::default();
        tracing::debug!("engine metrics reset");
    }
}
