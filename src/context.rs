//! Per-run execution context: identity, scope path, and the listener tree.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;
use uuid::Uuid;

use crate::event::FlowEvent;
use crate::listener::FlowListener;

/// Carried through every invocation of a run.
///
/// A context is cheap to clone: the listener and environment are shared
/// behind `Arc`s, and [`child`](ExecutionContext::child) derives a nested
/// scope that reports through the same listener. Scope paths join with `/`,
/// so a deeply nested component reports as e.g.
/// `flow/router-1/branch:urgent/notify-4`.
#[derive(Clone)]
pub struct ExecutionContext {
    run_id: Uuid,
    task_id: Option<String>,
    agent_id: Option<String>,
    user_id: Option<String>,
    scope: String,
    listener: Arc<dyn FlowListener>,
    environment: Arc<FxHashMap<String, Value>>,
}

impl ExecutionContext {
    /// Fresh root context with a new run id and scope `flow`.
    pub fn new(listener: Arc<dyn FlowListener>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            task_id: None,
            agent_id: None,
            user_id: None,
            scope: "flow".to_string(),
            listener,
            environment: Arc::new(FxHashMap::default()),
        }
    }

    #[must_use]
    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    #[must_use]
    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Ambient values visible to template rendering alongside the input
    /// payload. Input keys win on collision.
    #[must_use]
    pub fn with_environment(mut self, environment: FxHashMap<String, Value>) -> Self {
        self.environment = Arc::new(environment);
        self
    }

    /// Derives a context one scope level down, sharing run identity,
    /// listener, and environment.
    pub fn child(&self, segment: impl AsRef<str>) -> Self {
        let mut child = self.clone();
        child.scope = format!("{}/{}", self.scope, segment.as_ref());
        child
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    pub fn agent_id(&self) -> Option<&str> {
        self.agent_id.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn environment(&self) -> &FxHashMap<String, Value> {
        &self.environment
    }

    pub fn emit_start(&self) {
        self.listener
            .on_start(&FlowEvent::start(self.run_id, &self.scope));
    }

    pub fn emit_end(&self) {
        self.listener
            .on_end(&FlowEvent::end(self.run_id, &self.scope));
    }

    pub fn emit_error(&self, message: impl Into<String>) {
        self.listener
            .on_error(&FlowEvent::error(self.run_id, &self.scope, message));
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("run_id", &self.run_id)
            .field("task_id", &self.task_id)
            .field("agent_id", &self.agent_id)
            .field("user_id", &self.user_id)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::MemoryListener;

    #[test]
    fn child_scopes_nest_and_share_the_listener() {
        let listener = Arc::new(MemoryListener::new());
        let root = ExecutionContext::new(listener.clone());
        let map = root.child("mapper-1");
        let slot = map.child("map:docs");

        assert_eq!(root.scope(), "flow");
        assert_eq!(slot.scope(), "flow/mapper-1/map:docs");
        assert_eq!(slot.run_id(), root.run_id());

        root.emit_start();
        slot.emit_error("loader unreachable");
        root.emit_end();

        let events = listener.snapshot();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1].scope, "flow/mapper-1/map:docs");
        assert!(events[1].is_error());
        assert!(events.iter().all(|e| e.run_id == root.run_id()));
    }

    #[test]
    fn builder_fields_round_trip() {
        let ctx = ExecutionContext::new(Arc::new(crate::listener::NullListener))
            .with_task_id("t-9")
            .with_agent_id("agent-2")
            .with_user_id("u-1");
        assert_eq!(ctx.task_id(), Some("t-9"));
        assert_eq!(ctx.agent_id(), Some("agent-2"));
        assert_eq!(ctx.user_id(), Some("u-1"));
    }
}
