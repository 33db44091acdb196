//! Operation handler trait.
//!
//! Handlers are the integration point for every business module. They run on
//! the async runtime and may fail with any error type.

use crate::context::OperationContext;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Implementation bound to an operation
#[async_trait]
pub trait OperationHandler: Send + Sync {
    /// Handle one invocation
    async fn handle(&self, input: Value, context: OperationContext) -> anyhow::Result<Value>;
}

/// Adapter turning an async closure into a handler
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> OperationHandler for FnHandler<F>
where
    F: Fn(Value, OperationContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn handle(&self, input: Value, context: OperationContext) -> anyhow::Result<Value> {
        (self.f)(input, context).await
    }
}

/// Wrap an async closure as a shareable handler
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn OperationHandler>
where
    F: Fn(Value, OperationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}
