//! Lifecycle events emitted while a compiled flow runs.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened at a scope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlowEventKind {
    Start,
    End,
    Error { message: String },
}

/// One lifecycle event, correlated to a run and a hierarchical scope path.
///
/// Scope paths nest with `/`: `flow/router-1/map:docs/loader-2` correlates a
/// nested execution to its parents.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlowEvent {
    pub when: DateTime<Utc>,
    pub run_id: Uuid,
    pub scope: String,
    pub kind: FlowEventKind,
}

impl FlowEvent {
    pub fn start(run_id: Uuid, scope: impl Into<String>) -> Self {
        Self {
            when: Utc::now(),
            run_id,
            scope: scope.into(),
            kind: FlowEventKind::Start,
        }
    }

    pub fn end(run_id: Uuid, scope: impl Into<String>) -> Self {
        Self {
            when: Utc::now(),
            run_id,
            scope: scope.into(),
            kind: FlowEventKind::End,
        }
    }

    pub fn error(run_id: Uuid, scope: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            when: Utc::now(),
            run_id,
            scope: scope.into(),
            kind: FlowEventKind::Error {
                message: message.into(),
            },
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, FlowEventKind::Error { .. })
    }
}

impl fmt::Display for FlowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FlowEventKind::Start => write!(f, "[{}] start", self.scope),
            FlowEventKind::End => write!(f, "[{}] end", self.scope),
            FlowEventKind::Error { message } => write!(f, "[{}] error: {message}", self.scope),
        }
    }
}
