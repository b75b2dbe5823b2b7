//! Sequential folding of a linear chain.

use std::sync::Arc;

use async_trait::async_trait;

use crate::component::{Component, Payload};
use crate::errors::InvokeError;
use crate::utils::merge_into;

/// Runs steps in order, threading an accumulated payload through them.
///
/// Each step receives the full accumulated payload and its output merges
/// back in: later writers win per key, unrelated keys survive the whole
/// chain. A failing step stops the chain.
pub struct SequenceComponent {
    steps: Vec<Arc<dyn Component>>,
}

impl SequenceComponent {
    pub fn new(steps: Vec<Arc<dyn Component>>) -> Self {
        Self { steps }
    }
}

#[async_trait]
impl Component for SequenceComponent {
    async fn ainvoke(&self, input: Payload) -> Result<Payload, InvokeError> {
        let mut acc = input;
        for step in &self.steps {
            let output = step.ainvoke(acc.clone()).await?;
            merge_into(&mut acc, output);
        }
        Ok(acc)
    }
}

/// Passes its input through unchanged. Stands in for an empty chain, e.g.
/// a state-machine branch that loops straight back to the conditional.
pub struct IdentityComponent;

#[async_trait]
impl Component for IdentityComponent {
    async fn ainvoke(&self, input: Payload) -> Result<Payload, InvokeError> {
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::FnComponent;
    use crate::utils::new_payload;
    use serde_json::json;

    fn writer(key: &'static str, value: i64) -> Arc<dyn Component> {
        Arc::new(FnComponent::new(move |mut input: Payload| {
            input.insert(key.to_string(), json!(value));
            Ok(input)
        }))
    }

    #[tokio::test]
    async fn accumulates_keys_across_steps() {
        let chain = SequenceComponent::new(vec![writer("a", 1), writer("b", 2), writer("a", 3)]);
        let mut input = new_payload();
        input.insert("seed".into(), json!(true));
        let out = chain.ainvoke(input).await.unwrap();
        assert_eq!(out["seed"], json!(true));
        assert_eq!(out["a"], json!(3));
        assert_eq!(out["b"], json!(2));
    }

    #[tokio::test]
    async fn failing_step_stops_the_chain() {
        let bomb: Arc<dyn Component> = Arc::new(FnComponent::new(|_| {
            Err(InvokeError::InvalidInput("bad".into()))
        }));
        let chain = SequenceComponent::new(vec![writer("a", 1), bomb, writer("b", 2)]);
        let err = chain.ainvoke(new_payload()).await.unwrap_err();
        assert!(matches!(err, InvokeError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn identity_passes_through() {
        let mut input = new_payload();
        input.insert("x".into(), json!([1, 2]));
        let out = IdentityComponent.ainvoke(input.clone()).await.unwrap();
        assert_eq!(out, input);
    }
}
