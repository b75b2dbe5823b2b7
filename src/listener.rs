//! Listener surface for flow lifecycle events.
//!
//! A single listener is attached to the root [`ExecutionContext`] and every
//! child scope reports through it, so one observer sees the whole run.
//!
//! [`ExecutionContext`]: crate::context::ExecutionContext

use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::event::FlowEvent;

/// Receives lifecycle events for every scope of a run.
///
/// Implementations must be cheap and non-blocking; they are called inline
/// on the invocation path.
pub trait FlowListener: Send + Sync {
    fn on_start(&self, event: &FlowEvent);
    fn on_end(&self, event: &FlowEvent);
    fn on_error(&self, event: &FlowEvent);
}

/// Discards every event. The default when an embedder attaches nothing.
pub struct NullListener;

impl FlowListener for NullListener {
    fn on_start(&self, _event: &FlowEvent) {}
    fn on_end(&self, _event: &FlowEvent) {}
    fn on_error(&self, _event: &FlowEvent) {}
}

/// Collects events into memory for later inspection. Used by tests and
/// short-lived embedders.
#[derive(Default)]
pub struct MemoryListener {
    events: Arc<Mutex<Vec<FlowEvent>>>,
}

impl MemoryListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events received so far, in arrival order.
    pub fn snapshot(&self) -> Vec<FlowEvent> {
        self.events.lock().expect("listener mutex poisoned").clone()
    }

    pub fn clear(&self) {
        self.events.lock().expect("listener mutex poisoned").clear();
    }

    fn push(&self, event: &FlowEvent) {
        self.events
            .lock()
            .expect("listener mutex poisoned")
            .push(event.clone());
    }
}

impl FlowListener for MemoryListener {
    fn on_start(&self, event: &FlowEvent) {
        self.push(event);
    }

    fn on_end(&self, event: &FlowEvent) {
        self.push(event);
    }

    fn on_error(&self, event: &FlowEvent) {
        self.push(event);
    }
}

/// Forwards events over a channel to a consumer running elsewhere.
///
/// A closed receiver is logged and otherwise ignored: observability must
/// never fail an invocation.
pub struct ChannelListener {
    sender: flume::Sender<FlowEvent>,
}

impl ChannelListener {
    pub fn new(sender: flume::Sender<FlowEvent>) -> Self {
        Self { sender }
    }

    fn send(&self, event: &FlowEvent) {
        if self.sender.send(event.clone()).is_err() {
            warn!(scope = %event.scope, "flow event receiver dropped; event discarded");
        }
    }
}

impl FlowListener for ChannelListener {
    fn on_start(&self, event: &FlowEvent) {
        self.send(event);
    }

    fn on_end(&self, event: &FlowEvent) {
        self.send(event);
    }

    fn on_error(&self, event: &FlowEvent) {
        self.send(event);
    }
}
