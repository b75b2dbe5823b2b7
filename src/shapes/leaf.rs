//! Leaf wrapper: deferred templates plus lifecycle events.

use std::sync::Arc;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::debug;

use crate::component::{Component, Payload};
use crate::context::ExecutionContext;
use crate::errors::InvokeError;
use crate::template::render_value;

/// Wraps an instantiated leaf with the config entries whose values carry
/// template placeholders.
///
/// Those entries could not be bound at compile time; at invocation they are
/// rendered against the live input (and the context environment) and merged
/// into the payload handed to the inner component. The wrapper also emits
/// start/end/error events for its scope.
pub struct LeafComponent {
    inner: Arc<dyn Component>,
    templated: FxHashMap<String, Value>,
    ctx: ExecutionContext,
}

impl LeafComponent {
    pub fn new(
        inner: Arc<dyn Component>,
        templated: FxHashMap<String, Value>,
        ctx: ExecutionContext,
    ) -> Self {
        Self {
            inner,
            templated,
            ctx,
        }
    }
}

#[async_trait]
impl Component for LeafComponent {
    async fn ainvoke(&self, mut input: Payload) -> Result<Payload, InvokeError> {
        self.ctx.emit_start();

        for (key, raw) in &self.templated {
            match render_value(raw, &input, self.ctx.environment(), self.ctx.scope()) {
                Ok(rendered) => {
                    input.insert(key.clone(), rendered);
                }
                Err(err) => {
                    self.ctx.emit_error(err.to_string());
                    return Err(err.into());
                }
            }
        }

        match self.inner.ainvoke(input).await {
            Ok(output) => {
                debug!(scope = %self.ctx.scope(), keys = output.len(), "leaf completed");
                self.ctx.emit_end();
                Ok(output)
            }
            Err(err) => {
                self.ctx.emit_error(err.to_string());
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::FnComponent;
    use crate::event::FlowEventKind;
    use crate::listener::MemoryListener;
    use crate::utils::new_payload;
    use serde_json::json;

    fn echo() -> Arc<dyn Component> {
        Arc::new(FnComponent::new(Ok))
    }

    #[tokio::test]
    async fn renders_deferred_config_into_the_input() {
        let ctx = ExecutionContext::new(Arc::new(crate::listener::NullListener));
        let mut templated = FxHashMap::default();
        templated.insert("query".to_string(), json!("find {topic}"));
        let leaf = LeafComponent::new(echo(), templated, ctx.child("searcher"));

        let mut input = new_payload();
        input.insert("topic".into(), json!("joins"));
        let out = leaf.ainvoke(input).await.unwrap();
        assert_eq!(out["query"], json!("find joins"));
        assert_eq!(out["topic"], json!("joins"));
    }

    #[tokio::test]
    async fn unresolved_template_emits_an_error_event() {
        let listener = Arc::new(MemoryListener::new());
        let ctx = ExecutionContext::new(listener.clone());
        let mut templated = FxHashMap::default();
        templated.insert("query".to_string(), json!("{missing}"));
        let leaf = LeafComponent::new(echo(), templated, ctx.child("searcher"));

        let err = leaf.ainvoke(new_payload()).await.unwrap_err();
        assert!(matches!(err, InvokeError::Template(_)));

        let events = listener.snapshot();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, FlowEventKind::Start);
        assert!(events[1].is_error());
        assert_eq!(events[1].scope, "flow/searcher");
    }
}
