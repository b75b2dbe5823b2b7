//! Bounded iterative conditional with mutable run state.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::component::{Component, Payload};
use crate::context::ExecutionContext;
use crate::errors::{InvokeError, StateMachineOverrunError};
use crate::utils::{new_payload, payload_to_value};

/// Key the conditional writes to name the branch that fires next.
pub const NEXT_KEY: &str = "next";
/// Sentinel value of [`NEXT_KEY`] that terminates the machine directly.
pub const END_SENTINEL: &str = "__end__";
/// Output key carrying the final state mapping.
pub const FINAL_STATE_KEY: &str = "final_state";
/// Node config key bounding the iteration count.
pub const MAX_ITERATIONS_CONFIG: &str = "max_iterations";
/// Node config key listing state keys that append instead of overwrite.
pub const STATE_ADD_KEYS_CONFIG: &str = "state_add_keys";
/// Iteration bound applied when the node config names none.
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

/// Where a machine branch leads after its subflow runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MachineExit {
    /// Back to the conditional for another iteration.
    Loop,
    /// Out of the machine.
    End,
}

/// Runs the conditional repeatedly, firing the branch it names each round,
/// until it names [`END_SENTINEL`], a branch exits, or the iteration bound
/// trips.
///
/// The state mapping is the only mutable run state in the system and is
/// exclusively owned by this one invocation. Branch and conditional outputs
/// merge into it overwrite-style, except keys listed under
/// `state_add_keys`, which accumulate into arrays; components inside a
/// machine should therefore emit only the keys they change, not echo the
/// whole state. The final state is returned whole under `"final_state"`.
pub struct StateMachineComponent {
    node_id: String,
    conditional: Arc<dyn Component>,
    branches: Vec<(String, Arc<dyn Component>, MachineExit)>,
    max_iterations: usize,
    add_keys: Vec<String>,
    ctx: ExecutionContext,
}

impl StateMachineComponent {
    pub fn new(
        node_id: impl Into<String>,
        conditional: Arc<dyn Component>,
        branches: Vec<(String, Arc<dyn Component>, MachineExit)>,
        max_iterations: usize,
        add_keys: Vec<String>,
        ctx: ExecutionContext,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            conditional,
            branches,
            max_iterations,
            add_keys,
            ctx,
        }
    }

    fn merge_state(&self, state: &mut Payload, update: Payload) {
        for (key, value) in update {
            if self.add_keys.iter().any(|k| k == &key) {
                match state.get_mut(&key) {
                    Some(Value::Array(items)) => match value {
                        Value::Array(more) => items.extend(more),
                        single => items.push(single),
                    },
                    Some(existing) => {
                        let seeded = std::mem::take(existing);
                        *existing = Value::Array(vec![seeded, value]);
                    }
                    None => {
                        state.insert(key, Value::Array(vec![value]));
                    }
                }
            } else {
                state.insert(key, value);
            }
        }
    }
}

#[async_trait]
impl Component for StateMachineComponent {
    async fn ainvoke(&self, input: Payload) -> Result<Payload, InvokeError> {
        let mut state = input;

        for iteration in 0..self.max_iterations {
            let mut verdict = self.conditional.ainvoke(state.clone()).await?;
            let next = match verdict.remove(NEXT_KEY) {
                Some(Value::String(label)) => label,
                Some(other) => {
                    return Err(InvokeError::InvalidInput(format!(
                        "machine {}: conditional set {NEXT_KEY:?} to non-string {other}",
                        self.node_id
                    )))
                }
                None => {
                    return Err(InvokeError::InvalidInput(format!(
                        "machine {}: conditional output lacks the {NEXT_KEY:?} key",
                        self.node_id
                    )))
                }
            };
            self.merge_state(&mut state, verdict);
            debug!(machine = %self.node_id, iteration, next = %next, "machine step");

            if next == END_SENTINEL {
                return Ok(final_output(&state));
            }

            let (_, subflow, exit) = self
                .branches
                .iter()
                .find(|(label, _, _)| label == &next)
                .ok_or_else(|| {
                    InvokeError::InvalidInput(format!(
                        "machine {}: conditional named unknown branch {next:?}",
                        self.node_id
                    ))
                })?;
            let update = subflow.ainvoke(state.clone()).await?;
            self.merge_state(&mut state, update);

            if *exit == MachineExit::End {
                return Ok(final_output(&state));
            }
        }

        let overrun = StateMachineOverrunError {
            node: self.node_id.clone(),
            bound: self.max_iterations,
        };
        self.ctx.emit_error(overrun.to_string());
        Err(overrun.into())
    }
}

fn final_output(state: &Payload) -> Payload {
    let mut output = new_payload();
    output.insert(FINAL_STATE_KEY.to_string(), payload_to_value(state));
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::FnComponent;
    use crate::listener::{MemoryListener, NullListener};
    use serde_json::json;

    /// Counts up to `stop`, then emits the end sentinel. Emits only the
    /// transition key, never the echoed state.
    fn counter(stop: i64) -> Arc<dyn Component> {
        Arc::new(FnComponent::new(move |input: Payload| {
            let n = input.get("n").and_then(Value::as_i64).unwrap_or(0);
            let next = if n >= stop { END_SENTINEL } else { "again" };
            let mut out = new_payload();
            out.insert(NEXT_KEY.into(), json!(next));
            Ok(out)
        }))
    }

    fn increment() -> Arc<dyn Component> {
        Arc::new(FnComponent::new(|input: Payload| {
            let n = input.get("n").and_then(Value::as_i64).unwrap_or(0);
            let mut out = new_payload();
            out.insert("n".into(), json!(n + 1));
            out.insert("log".into(), json!(format!("step {}", n + 1)));
            Ok(out)
        }))
    }

    fn machine(stop: i64, bound: usize, add_keys: Vec<String>) -> StateMachineComponent {
        StateMachineComponent::new(
            "loop-1",
            counter(stop),
            vec![("again".into(), increment(), MachineExit::Loop)],
            bound,
            add_keys,
            ExecutionContext::new(Arc::new(NullListener)),
        )
    }

    #[tokio::test]
    async fn iterates_until_the_conditional_ends() {
        let out = machine(3, DEFAULT_MAX_ITERATIONS, vec![])
            .ainvoke(new_payload())
            .await
            .unwrap();
        let state = &out[FINAL_STATE_KEY];
        assert_eq!(state["n"], json!(3));
    }

    #[tokio::test]
    async fn add_keys_accumulate_instead_of_overwriting() {
        let out = machine(2, DEFAULT_MAX_ITERATIONS, vec!["log".into()])
            .ainvoke(new_payload())
            .await
            .unwrap();
        let state = &out[FINAL_STATE_KEY];
        assert_eq!(state["log"], json!(["step 1", "step 2"]));
    }

    #[tokio::test]
    async fn overrun_trips_the_bound_and_reports_it() {
        let listener = Arc::new(MemoryListener::new());
        let m = StateMachineComponent::new(
            "loop-1",
            counter(i64::MAX),
            vec![("again".into(), increment(), MachineExit::Loop)],
            4,
            vec![],
            ExecutionContext::new(listener.clone()),
        );
        let err = m.ainvoke(new_payload()).await.unwrap_err();
        assert!(matches!(
            err,
            InvokeError::Overrun(StateMachineOverrunError { ref node, bound: 4 }) if node == "loop-1"
        ));
        let events = listener.snapshot();
        assert_eq!(events.len(), 1);
        assert!(events[0].is_error());
    }

    #[tokio::test]
    async fn end_exit_branch_leaves_after_one_firing() {
        let always_branch: Arc<dyn Component> = Arc::new(FnComponent::new(|mut input: Payload| {
            input.insert(NEXT_KEY.into(), json!("finish"));
            Ok(input)
        }));
        let m = StateMachineComponent::new(
            "loop-2",
            always_branch,
            vec![("finish".into(), increment(), MachineExit::End)],
            DEFAULT_MAX_ITERATIONS,
            vec![],
            ExecutionContext::new(Arc::new(NullListener)),
        );
        let out = m.ainvoke(new_payload()).await.unwrap();
        assert_eq!(out[FINAL_STATE_KEY]["n"], json!(1));
    }

    #[tokio::test]
    async fn missing_next_key_is_rejected() {
        let silent: Arc<dyn Component> = Arc::new(FnComponent::new(Ok));
        let m = StateMachineComponent::new(
            "loop-3",
            silent,
            vec![],
            DEFAULT_MAX_ITERATIONS,
            vec![],
            ExecutionContext::new(Arc::new(NullListener)),
        );
        let err = m.ainvoke(new_payload()).await.unwrap_err();
        assert!(matches!(err, InvokeError::InvalidInput(_)));
    }
}
