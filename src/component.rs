//! The invocable unit every compiled flow is built from.

use std::sync::Arc;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::errors::{ComponentInvocationError, InvokeError};

/// The dict flowing between components: string keys, JSON values.
pub type Payload = FxHashMap<String, Value>;

/// An instantiated, invocable unit wrapping a leaf capability or a
/// composed structural shape.
///
/// Components are stateless with respect to invocations: the only
/// run-scoped mutable state in the system is a state machine's state
/// mapping, exclusively owned by that one run. Dropping the returned
/// future cancels the active subtree.
#[async_trait]
pub trait Component: Send + Sync {
    async fn ainvoke(&self, input: Payload) -> Result<Payload, InvokeError>;
}

/// Adapts a plain fallible function into a [`Component`].
///
/// The usual way for embedders and tests to register leaf behavior.
pub struct FnComponent<F> {
    f: F,
}

impl<F> FnComponent<F>
where
    F: Fn(Payload) -> Result<Payload, InvokeError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> Component for FnComponent<F>
where
    F: Fn(Payload) -> Result<Payload, InvokeError> + Send + Sync,
{
    async fn ainvoke(&self, input: Payload) -> Result<Payload, InvokeError> {
        (self.f)(input)
    }
}

/// A blocking leaf implementation.
///
/// External capabilities that only expose synchronous entry points
/// implement this instead of [`Component`].
pub trait BlockingComponent: Send + Sync {
    fn invoke(&self, input: Payload) -> Result<Payload, InvokeError>;
}

/// Explicit adapter exposing a [`BlockingComponent`] through both entry
/// points: the sync path calls straight through, the async path hops to
/// the blocking thread pool. Chosen at construction, not patched in later.
pub struct SyncComponent<T> {
    inner: Arc<T>,
    scope: String,
}

impl<T: BlockingComponent> SyncComponent<T> {
    pub fn new(scope: impl Into<String>, inner: T) -> Self {
        Self {
            inner: Arc::new(inner),
            scope: scope.into(),
        }
    }

    /// Direct synchronous invocation.
    pub fn invoke(&self, input: Payload) -> Result<Payload, InvokeError> {
        self.inner.invoke(input)
    }
}

#[async_trait]
impl<T: BlockingComponent + 'static> Component for SyncComponent<T> {
    async fn ainvoke(&self, input: Payload) -> Result<Payload, InvokeError> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.invoke(input))
            .await
            .map_err(|e| InvokeError::Component(ComponentInvocationError::new(&self.scope, e)))?
    }
}
