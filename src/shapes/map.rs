//! Concurrent fan-out into labelled slots, fan-in to one node.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::Value;

use crate::component::{Component, Payload};
use crate::errors::InvokeError;
use crate::utils::{new_payload, payload_to_value};

/// Runs every slot subflow concurrently on a copy of the input, then hands
/// the fan-in node a payload whose keys are exactly the slot labels.
///
/// All slots run to completion before errors are examined; the first
/// failure in declared slot order is the one propagated. A label declared
/// multiple collects its subflow outputs into a JSON array, in declared
/// order.
pub struct MapComponent {
    node: Arc<dyn Component>,
    slots: Vec<(String, Arc<dyn Component>)>,
}

impl MapComponent {
    pub fn new(node: Arc<dyn Component>, slots: Vec<(String, Arc<dyn Component>)>) -> Self {
        Self { node, slots }
    }
}

#[async_trait]
impl Component for MapComponent {
    async fn ainvoke(&self, input: Payload) -> Result<Payload, InvokeError> {
        let runs = self
            .slots
            .iter()
            .map(|(_, subflow)| subflow.ainvoke(input.clone()));
        let outputs = join_all(runs).await;

        let mut fan_in = new_payload();
        let mut first_err = None;
        for ((label, _), result) in self.slots.iter().zip(outputs) {
            match result {
                Ok(output) => {
                    let value = payload_to_value(&output);
                    match fan_in.get_mut(label) {
                        // Repeated label: accumulate into an array.
                        Some(Value::Array(items)) => items.push(value),
                        Some(existing) => {
                            let seeded = std::mem::take(existing);
                            *existing = Value::Array(vec![seeded, value]);
                        }
                        None => {
                            fan_in.insert(label.clone(), value);
                        }
                    }
                }
                Err(err) => {
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
            }
        }
        if let Some(err) = first_err {
            return Err(err);
        }

        self.node.ainvoke(fan_in).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::FnComponent;
    use serde_json::json;

    fn tagger(tag: &'static str) -> Arc<dyn Component> {
        Arc::new(FnComponent::new(move |_input: Payload| {
            let mut out = new_payload();
            out.insert("tag".into(), json!(tag));
            Ok(out)
        }))
    }

    fn collector() -> Arc<dyn Component> {
        Arc::new(FnComponent::new(|mut input: Payload| {
            let mut keys: Vec<String> = input.keys().cloned().collect();
            keys.sort();
            input.insert("seen".into(), json!(keys));
            Ok(input)
        }))
    }

    #[tokio::test]
    async fn fan_in_payload_has_exactly_the_slot_keys() {
        let map = MapComponent::new(
            collector(),
            vec![("left".into(), tagger("l")), ("right".into(), tagger("r"))],
        );
        let mut input = new_payload();
        input.insert("irrelevant".into(), json!(1));
        let out = map.ainvoke(input).await.unwrap();
        assert_eq!(out["seen"], json!(["left", "right"]));
        assert_eq!(out["left"], json!({"tag": "l"}));
    }

    #[tokio::test]
    async fn repeated_label_collects_into_an_array() {
        let map = MapComponent::new(
            collector(),
            vec![
                ("docs".into(), tagger("first")),
                ("docs".into(), tagger("second")),
            ],
        );
        let out = map.ainvoke(new_payload()).await.unwrap();
        assert_eq!(out["docs"], json!([{"tag": "first"}, {"tag": "second"}]));
    }

    #[tokio::test]
    async fn first_declared_failure_wins_after_all_slots_finish() {
        let fail = |msg: &'static str| -> Arc<dyn Component> {
            Arc::new(FnComponent::new(move |_| {
                Err(InvokeError::InvalidInput(msg.into()))
            }))
        };
        let map = MapComponent::new(
            collector(),
            vec![
                ("ok".into(), tagger("x")),
                ("a".into(), fail("a broke")),
                ("b".into(), fail("b broke")),
            ],
        );
        let err = map.ainvoke(new_payload()).await.unwrap_err();
        assert!(matches!(err, InvokeError::InvalidInput(ref m) if m == "a broke"));
    }
}
