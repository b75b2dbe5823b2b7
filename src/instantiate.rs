//! Turns a resolved placeholder tree into a live, invocable pipeline.

use std::sync::Arc;

use serde_json::Value;
use tracing::instrument;

use crate::component::{Component, Payload};
use crate::context::ExecutionContext;
use crate::errors::{CompileError, ComponentInvocationError, InvokeError};
use crate::graph::GraphView;
use crate::registry::ComponentRegistry;
use crate::resolver::{FlowResolver, Placeholder};
use crate::shapes::{
    BranchComponent, EachComponent, IdentityComponent, LeafComponent, MachineExit, MapComponent,
    SequenceComponent, StateMachineComponent, DEFAULT_ITEM_KEY, DEFAULT_MAX_ITERATIONS,
    ITEM_KEY_CONFIG, MAX_ITERATIONS_CONFIG, STATE_ADD_KEYS_CONFIG,
};
use crate::template::has_template;
use crate::utils::new_payload;

/// Walks a placeholder tree bottom-up, instantiating every referenced node
/// through the registry and wrapping the structural shapes around the
/// results.
///
/// Instantiation is the second fail-closed stage: any unknown component
/// class aborts the whole compile, leaving no partially wired pipeline
/// behind.
pub struct FlowInstantiator<'g> {
    graph: &'g GraphView,
    registry: &'g ComponentRegistry,
}

impl<'g> FlowInstantiator<'g> {
    pub fn new(graph: &'g GraphView, registry: &'g ComponentRegistry) -> Self {
        Self { graph, registry }
    }

    /// Instantiates the whole tree under the given root context.
    #[instrument(skip_all, fields(run_id = %ctx.run_id()))]
    pub fn instantiate(
        &self,
        tree: &Placeholder,
        ctx: &ExecutionContext,
    ) -> Result<Arc<dyn Component>, CompileError> {
        self.build(tree, ctx)
    }

    fn build(
        &self,
        tree: &Placeholder,
        ctx: &ExecutionContext,
    ) -> Result<Arc<dyn Component>, CompileError> {
        match tree {
            Placeholder::Node(id) => self.build_leaf(id, ctx),

            Placeholder::Sequence(seq) => {
                if seq.steps.is_empty() {
                    return Ok(Arc::new(IdentityComponent));
                }
                let steps = seq
                    .steps
                    .iter()
                    .map(|step| self.build(step, ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Arc::new(SequenceComponent::new(steps)))
            }

            Placeholder::Map(map) => {
                let map_ctx = ctx.child(&map.node);
                let node = self.build_leaf(&map.node, ctx)?;
                let slots = map
                    .slots
                    .iter()
                    .map(|(label, sub)| {
                        let slot_ctx = map_ctx.child(format!("map:{label}"));
                        Ok((label.clone(), self.build(sub, &slot_ctx)?))
                    })
                    .collect::<Result<Vec<_>, CompileError>>()?;
                Ok(Arc::new(MapComponent::new(node, slots)))
            }

            Placeholder::Branch(branch) => {
                let branch_ctx = ctx.child(&branch.node);
                let node = self.build_leaf(&branch.node, ctx)?;
                let arms = branch
                    .branches
                    .iter()
                    .map(|(label, sub)| {
                        let arm_ctx = branch_ctx.child(format!("branch:{label}"));
                        Ok((label.clone(), self.build(sub, &arm_ctx)?))
                    })
                    .collect::<Result<Vec<_>, CompileError>>()?;
                let default = self.build(&branch.default, &branch_ctx.child("branch:default"))?;
                Ok(Arc::new(BranchComponent::new(node, arms, default)))
            }

            Placeholder::Each(each) => {
                let record = self.graph.require(&each.node)?;
                let item_key = record
                    .config
                    .get(ITEM_KEY_CONFIG)
                    .and_then(Value::as_str)
                    .unwrap_or(DEFAULT_ITEM_KEY);
                let workflow = self.build(&each.workflow, &ctx.child(&each.node).child("each"))?;
                Ok(Arc::new(EachComponent::new(workflow, item_key)))
            }

            Placeholder::StateMachine(machine) => {
                let record = self.graph.require(&machine.node)?;
                let machine_ctx = ctx.child(&machine.node);
                let conditional = self.build_leaf(&machine.node, ctx)?;
                let branches = machine
                    .branches
                    .iter()
                    .map(|(label, sub)| {
                        let exit = if machine.loops.iter().any(|l| l == label) {
                            MachineExit::Loop
                        } else {
                            MachineExit::End
                        };
                        let sub_ctx = machine_ctx.child(format!("machine:{label}"));
                        Ok((label.clone(), self.build(sub, &sub_ctx)?, exit))
                    })
                    .collect::<Result<Vec<_>, CompileError>>()?;

                let max_iterations = record
                    .config
                    .get(MAX_ITERATIONS_CONFIG)
                    .and_then(Value::as_u64)
                    .map(|n| n as usize)
                    .unwrap_or(DEFAULT_MAX_ITERATIONS);
                let add_keys = record
                    .config
                    .get(STATE_ADD_KEYS_CONFIG)
                    .and_then(Value::as_array)
                    .map(|keys| {
                        keys.iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();

                Ok(Arc::new(StateMachineComponent::new(
                    machine.node.clone(),
                    conditional,
                    branches,
                    max_iterations,
                    add_keys,
                    machine_ctx,
                )))
            }

            // A join runs as a fresh instance of the shared node on this
            // path; the map wrapper around it is structural only.
            Placeholder::Join(join) => match join.target.as_ref() {
                Placeholder::Map(target) => self.build_leaf(&target.node, ctx),
                other => self.build(other, ctx),
            },
        }
    }

    /// Instantiates one graph node through the registry, deferring its
    /// templated config entries to invocation time.
    fn build_leaf(
        &self,
        id: &str,
        ctx: &ExecutionContext,
    ) -> Result<Arc<dyn Component>, CompileError> {
        let record = self.graph.require(id)?;
        let leaf_ctx = ctx.child(id);

        let mut fixed = new_payload();
        let mut templated = new_payload();
        for (key, value) in &record.config {
            if value_has_template(value) {
                templated.insert(key.clone(), value.clone());
            } else {
                fixed.insert(key.clone(), value.clone());
            }
        }

        let inner = self
            .registry
            .instantiate(&record.component_class, &fixed, &leaf_ctx)?;
        Ok(Arc::new(LeafComponent::new(inner, templated, leaf_ctx)))
    }
}

fn value_has_template(value: &Value) -> bool {
    match value {
        Value::String(s) => has_template(s),
        Value::Array(items) => items.iter().any(value_has_template),
        Value::Object(map) => map.values().any(value_has_template),
        _ => false,
    }
}

/// A compiled, invocable pipeline bound to one execution context.
pub struct Flow {
    root: Arc<dyn Component>,
    ctx: ExecutionContext,
}

impl std::fmt::Debug for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flow")
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}

impl Flow {
    pub fn run_id(&self) -> uuid::Uuid {
        self.ctx.run_id()
    }

    /// Invokes the pipeline. Emits start/end (or error) at the root scope.
    pub async fn ainvoke(&self, input: Payload) -> Result<Payload, InvokeError> {
        self.ctx.emit_start();
        match self.root.ainvoke(input).await {
            Ok(output) => {
                self.ctx.emit_end();
                Ok(output)
            }
            Err(err) => {
                self.ctx.emit_error(err.to_string());
                Err(err)
            }
        }
    }

    /// Blocking entry point for embedders without an async caller.
    ///
    /// Inside a multi-thread runtime this parks the current worker; outside
    /// any runtime it spins up a single-thread runtime for the call. Inside
    /// a current-thread runtime blocking would deadlock, so the call is
    /// refused with an error; use [`ainvoke`](Flow::ainvoke) there.
    pub fn invoke(&self, input: Payload) -> Result<Payload, InvokeError> {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => match handle.runtime_flavor() {
                tokio::runtime::RuntimeFlavor::MultiThread => {
                    tokio::task::block_in_place(|| handle.block_on(self.ainvoke(input)))
                }
                _ => Err(InvokeError::Component(ComponentInvocationError::msg(
                    self.ctx.scope(),
                    "blocking invoke needs a multi-thread runtime; call ainvoke instead",
                ))),
            },
            Err(_) => {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|e| InvokeError::failure(self.ctx.scope(), e))?;
                runtime.block_on(self.ainvoke(input))
            }
        }
    }
}

/// Resolves and instantiates a graph in one step.
///
/// Compile failures are reported to the context's listener before being
/// returned, so an attached observer sees them without unwinding the call
/// stack itself.
pub fn compile(
    graph: &GraphView,
    registry: &ComponentRegistry,
    ctx: ExecutionContext,
) -> Result<Flow, CompileError> {
    let report = |err: CompileError| {
        ctx.emit_error(err.to_string());
        err
    };
    let tree = FlowResolver::new(graph)
        .resolve_graph()
        .map_err(|e| report(e.into()))?;
    let root = FlowInstantiator::new(graph, registry)
        .instantiate(&tree, &ctx)
        .map_err(report)?;
    Ok(Flow { root, ctx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeRecord, NodeRecord};
    use crate::listener::{MemoryListener, NullListener};
    use serde_json::json;

    fn registry() -> ComponentRegistry {
        let mut registry = ComponentRegistry::new();
        registry.register_fn("Echo", Ok);
        registry.register_fn("Stamp", |mut input: Payload| {
            input.insert("stamped".into(), json!(true));
            Ok(input)
        });
        registry
    }

    fn two_step_graph() -> GraphView {
        let nodes = vec![
            NodeRecord::new("a", "Echo").root(),
            NodeRecord::new("b", "Stamp"),
        ];
        let edges = vec![EdgeRecord::link("e1", "a", "b")];
        GraphView::from_records(nodes, edges).unwrap()
    }

    #[tokio::test]
    async fn compiles_and_invokes_a_linear_graph() {
        let graph = two_step_graph();
        let registry = registry();
        let flow = compile(&graph, &registry, ExecutionContext::new(Arc::new(NullListener)))
            .unwrap();
        let mut input = new_payload();
        input.insert("q".into(), json!("hello"));
        let out = flow.ainvoke(input).await.unwrap();
        assert_eq!(out["q"], json!("hello"));
        assert_eq!(out["stamped"], json!(true));
    }

    #[tokio::test]
    async fn unknown_class_aborts_the_whole_compile() {
        let nodes = vec![NodeRecord::new("a", "Nope").root()];
        let graph = GraphView::from_records(nodes, vec![]).unwrap();
        let registry = registry();
        let listener = Arc::new(MemoryListener::new());
        let err = compile(&graph, &registry, ExecutionContext::new(listener.clone()))
            .unwrap_err();
        assert!(matches!(err, CompileError::UnknownComponent(_)));
        // The failure reaches the listener too.
        assert!(listener.snapshot().iter().any(|e| e.is_error()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn blocking_invoke_works_inside_a_runtime() {
        let graph = two_step_graph();
        let registry = registry();
        let flow = compile(&graph, &registry, ExecutionContext::new(Arc::new(NullListener)))
            .unwrap();
        let out = flow.invoke(new_payload()).unwrap();
        assert_eq!(out["stamped"], json!(true));
    }

    #[tokio::test]
    async fn blocking_invoke_refuses_a_current_thread_runtime() {
        let graph = two_step_graph();
        let registry = registry();
        let flow = compile(&graph, &registry, ExecutionContext::new(Arc::new(NullListener)))
            .unwrap();
        let err = flow.invoke(new_payload()).unwrap_err();
        assert!(matches!(err, InvokeError::Component(_)));
    }

    #[test]
    fn blocking_invoke_works_without_a_runtime() {
        let graph = two_step_graph();
        let registry = registry();
        let flow = compile(&graph, &registry, ExecutionContext::new(Arc::new(NullListener)))
            .unwrap();
        let out = flow.invoke(new_payload()).unwrap();
        assert_eq!(out["stamped"], json!(true));
    }

    #[tokio::test]
    async fn templated_config_defers_to_invocation() {
        let mut registry = ComponentRegistry::new();
        registry.register_fn("Echo", Ok);
        let nodes = vec![NodeRecord::new("s", "Echo")
            .root()
            .with_config_value("query", json!("find {topic}"))];
        let graph = GraphView::from_records(nodes, vec![]).unwrap();
        let flow = compile(&graph, &registry, ExecutionContext::new(Arc::new(NullListener)))
            .unwrap();

        let mut input = new_payload();
        input.insert("topic".into(), json!("maps"));
        let out = flow.ainvoke(input).await.unwrap();
        assert_eq!(out["query"], json!("find maps"));
    }
}
