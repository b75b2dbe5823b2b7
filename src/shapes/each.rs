//! Per-element application of a workflow over an input list.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::Value;

use crate::component::{Component, Payload};
use crate::errors::InvokeError;
use crate::utils::payload_to_value;

/// Node config key naming which input key holds the list.
pub const ITEM_KEY_CONFIG: &str = "item_key";
/// Input key read when the node config names none.
pub const DEFAULT_ITEM_KEY: &str = "items";
/// Output key carrying the per-element results, in element order.
pub const RESULTS_KEY: &str = "results";

/// Key a non-object element is bound under in its per-element payload.
const ELEMENT_KEY: &str = "item";

/// Applies one workflow to every element of an input list concurrently.
///
/// Object elements merge their entries over a copy of the base input;
/// anything else is bound under `"item"`. All elements run to completion;
/// the first failure in element order is propagated. On success the base
/// input gains a `"results"` array of the per-element outputs.
pub struct EachComponent {
    workflow: Arc<dyn Component>,
    item_key: String,
}

impl EachComponent {
    pub fn new(workflow: Arc<dyn Component>, item_key: impl Into<String>) -> Self {
        Self {
            workflow,
            item_key: item_key.into(),
        }
    }
}

#[async_trait]
impl Component for EachComponent {
    async fn ainvoke(&self, input: Payload) -> Result<Payload, InvokeError> {
        let items = match input.get(&self.item_key) {
            Some(Value::Array(items)) => items.clone(),
            Some(other) => {
                return Err(InvokeError::InvalidInput(format!(
                    "key {:?} holds {} where a list was expected",
                    self.item_key,
                    type_name(other)
                )))
            }
            None => {
                return Err(InvokeError::InvalidInput(format!(
                    "key {:?} missing from the input",
                    self.item_key
                )))
            }
        };

        let runs = items.iter().map(|item| {
            let mut per_item = input.clone();
            per_item.remove(&self.item_key);
            match item {
                Value::Object(fields) => {
                    for (k, v) in fields {
                        per_item.insert(k.clone(), v.clone());
                    }
                }
                other => {
                    per_item.insert(ELEMENT_KEY.to_string(), other.clone());
                }
            }
            self.workflow.ainvoke(per_item)
        });

        let mut results = Vec::with_capacity(items.len());
        for outcome in join_all(runs).await {
            results.push(payload_to_value(&outcome?));
        }

        let mut output = input;
        output.insert(RESULTS_KEY.to_string(), Value::Array(results));
        Ok(output)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::FnComponent;
    use crate::utils::new_payload;
    use serde_json::json;

    fn upper() -> Arc<dyn Component> {
        Arc::new(FnComponent::new(|mut input: Payload| {
            let word = input
                .get(ELEMENT_KEY)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_uppercase();
            input.insert("word".into(), json!(word));
            Ok(input)
        }))
    }

    #[tokio::test]
    async fn maps_the_workflow_over_every_element_in_order() {
        let each = EachComponent::new(upper(), DEFAULT_ITEM_KEY);
        let mut input = new_payload();
        input.insert("items".into(), json!(["ab", "cd"]));
        input.insert("lang".into(), json!("en"));
        let out = each.ainvoke(input).await.unwrap();

        let results = out[RESULTS_KEY].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["word"], json!("AB"));
        assert_eq!(results[1]["word"], json!("CD"));
        // Base keys ride along into each element.
        assert_eq!(results[0]["lang"], json!("en"));
        assert_eq!(out["lang"], json!("en"));
    }

    #[tokio::test]
    async fn object_elements_merge_over_the_base_input() {
        let echo: Arc<dyn Component> = Arc::new(FnComponent::new(Ok));
        let each = EachComponent::new(echo, "rows");
        let mut input = new_payload();
        input.insert("rows".into(), json!([{"id": 1}, {"id": 2}]));
        let out = each.ainvoke(input).await.unwrap();
        let results = out[RESULTS_KEY].as_array().unwrap();
        assert_eq!(results[0]["id"], json!(1));
        assert_eq!(results[1]["id"], json!(2));
    }

    #[tokio::test]
    async fn non_list_input_is_rejected() {
        let each = EachComponent::new(upper(), DEFAULT_ITEM_KEY);
        let mut input = new_payload();
        input.insert("items".into(), json!("not a list"));
        let err = each.ainvoke(input).await.unwrap_err();
        assert!(matches!(err, InvokeError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn first_failing_element_propagates() {
        let picky: Arc<dyn Component> = Arc::new(FnComponent::new(|input: Payload| {
            if input.get(ELEMENT_KEY) == Some(&json!(2)) {
                Err(InvokeError::InvalidInput("two is out".into()))
            } else {
                Ok(input)
            }
        }));
        let each = EachComponent::new(picky, DEFAULT_ITEM_KEY);
        let mut input = new_payload();
        input.insert("items".into(), json!([1, 2, 3]));
        let err = each.ainvoke(input).await.unwrap_err();
        assert!(matches!(err, InvokeError::InvalidInput(ref m) if m == "two is out"));
    }
}
