//! Conditional selection of exactly one downstream subflow.

use std::sync::Arc;

use async_trait::async_trait;

use crate::component::{Component, Payload};
use crate::errors::InvokeError;
use crate::utils::{is_truthy, merge_into};

/// Runs the conditional node, then exactly one arm.
///
/// The conditional's output is inspected label by label in declared order;
/// the first label whose value is truthy selects its arm. A missing label
/// key counts as falsy. When nothing fires, the default arm runs. The
/// selected arm receives the input merged with the conditional's output.
///
/// Selection deliberately reads the conditional's verdict, not the raw
/// input: a conditional that echoes its input makes the two views
/// identical, while one that computes fresh label values keeps its
/// decision independent of stale input keys.
pub struct BranchComponent {
    node: Arc<dyn Component>,
    arms: Vec<(String, Arc<dyn Component>)>,
    default: Arc<dyn Component>,
}

impl BranchComponent {
    pub fn new(
        node: Arc<dyn Component>,
        arms: Vec<(String, Arc<dyn Component>)>,
        default: Arc<dyn Component>,
    ) -> Self {
        Self {
            node,
            arms,
            default,
        }
    }
}

#[async_trait]
impl Component for BranchComponent {
    async fn ainvoke(&self, input: Payload) -> Result<Payload, InvokeError> {
        let verdict = self.node.ainvoke(input.clone()).await?;

        let selected = self
            .arms
            .iter()
            .find(|(label, _)| verdict.get(label).is_some_and(is_truthy))
            .map(|(_, arm)| arm)
            .unwrap_or(&self.default);

        let mut acc = input;
        merge_into(&mut acc, verdict);
        selected.ainvoke(acc).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::FnComponent;
    use crate::utils::new_payload;
    use serde_json::{json, Value};

    fn verdicts(pairs: Vec<(&'static str, Value)>) -> Arc<dyn Component> {
        Arc::new(FnComponent::new(move |mut input: Payload| {
            for (k, v) in &pairs {
                input.insert((*k).to_string(), v.clone());
            }
            Ok(input)
        }))
    }

    fn marker(name: &'static str) -> Arc<dyn Component> {
        Arc::new(FnComponent::new(move |mut input: Payload| {
            input.insert("took".into(), json!(name));
            Ok(input)
        }))
    }

    fn branch(node: Arc<dyn Component>) -> BranchComponent {
        BranchComponent::new(
            node,
            vec![
                ("urgent".into(), marker("urgent")),
                ("routine".into(), marker("routine")),
            ],
            marker("default"),
        )
    }

    #[tokio::test]
    async fn first_truthy_label_in_declared_order_wins() {
        let b = branch(verdicts(vec![
            ("routine", json!(true)),
            ("urgent", json!("yes")),
        ]));
        let out = b.ainvoke(new_payload()).await.unwrap();
        assert_eq!(out["took"], json!("urgent"));
    }

    #[tokio::test]
    async fn all_falsy_falls_through_to_default() {
        let b = branch(verdicts(vec![("urgent", json!(0)), ("routine", json!(""))]));
        let out = b.ainvoke(new_payload()).await.unwrap();
        assert_eq!(out["took"], json!("default"));
    }

    #[tokio::test]
    async fn arm_sees_input_merged_with_the_verdict() {
        let b = branch(verdicts(vec![("urgent", json!(true)), ("score", json!(9))]));
        let mut input = new_payload();
        input.insert("ticket".into(), json!("T-1"));
        let out = b.ainvoke(input).await.unwrap();
        assert_eq!(out["ticket"], json!("T-1"));
        assert_eq!(out["score"], json!(9));
        assert_eq!(out["took"], json!("urgent"));
    }
}
