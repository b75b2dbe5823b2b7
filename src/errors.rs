//! Error taxonomy for the flow graph compiler.
//!
//! Errors split along the compile/run boundary:
//!
//! - [`GraphShapeError`] and [`UnknownComponentError`] are raised while
//!   resolving or instantiating a graph. A shape error blocks instantiation
//!   entirely; the compiler never degrades to a partial pipeline.
//! - [`TemplateBindingError`], [`StateMachineOverrunError`], and
//!   [`ComponentInvocationError`] surface at invocation time.
//!
//! [`CompileError`] and [`InvokeError`] are the umbrella types carried by the
//! public API.

use miette::Diagnostic;
use thiserror::Error;

/// The persisted graph disagrees with a node's declared structure.
///
/// Raised at resolve/join time, before any component is instantiated.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphShapeError {
    /// An edge or root reference points at a node id that does not exist.
    #[error("unknown node: {id}")]
    #[diagnostic(
        code(flowloom::graph::unknown_node),
        help("Check that the authoring layer persisted every node the edges reference.")
    )]
    UnknownNode { id: String },

    /// No node in the graph carries the root flag.
    #[error("graph has no root node")]
    #[diagnostic(code(flowloom::graph::no_root))]
    NoRoot,

    /// Multiple roots were given but they do not converge on one pipeline.
    #[error("root nodes {first} and {second} resolve to different pipelines")]
    #[diagnostic(
        code(flowloom::graph::divergent_roots),
        help("All roots of one flow must reconverge on a shared fan-in node.")
    )]
    DivergentRoots { first: String, second: String },

    /// An edge references a node id missing from the node set.
    #[error("edge {edge} references missing node {node}")]
    #[diagnostic(code(flowloom::graph::dangling_edge))]
    DanglingEdge { edge: String, node: String },

    /// A node's declared label list and edge-key list differ in length.
    #[error("node {node} declares {labels} labels but {keys} edge keys")]
    #[diagnostic(code(flowloom::graph::label_key_mismatch))]
    LabelKeyMismatch {
        node: String,
        labels: usize,
        keys: usize,
    },

    /// A declared branch label has no outgoing edge carrying its key.
    #[error("node {node}: no edge matches key {key:?} for branch {label:?}")]
    #[diagnostic(
        code(flowloom::graph::unmatched_branch_key),
        help("Every declared branch label needs exactly one edge with its correlated key.")
    )]
    UnmatchedBranchKey {
        node: String,
        label: String,
        key: String,
    },

    /// A branch node is missing its `"default"` edge.
    #[error("branch node {node} has no \"default\" edge")]
    #[diagnostic(code(flowloom::graph::missing_default))]
    MissingDefault { node: String },

    /// More than one edge claims a map slot that is not declared multiple.
    #[error("map node {node}: slot {slot:?} claimed by {count} edges")]
    #[diagnostic(code(flowloom::graph::slot_oversubscribed))]
    SlotOversubscribed {
        node: String,
        slot: String,
        count: usize,
    },

    /// A declared map slot has no incoming edge.
    #[error("map node {node}: slot {slot:?} has no incoming edge")]
    #[diagnostic(code(flowloom::graph::slot_unfilled))]
    SlotUnfilled { node: String, slot: String },

    /// An incoming edge targets a slot the map never declared.
    #[error("map node {node}: incoming edge claims undeclared slot {slot:?}")]
    #[diagnostic(code(flowloom::graph::undeclared_slot))]
    UndeclaredSlot { node: String, slot: String },

    /// A LINK cycle exists outside a declared state machine.
    #[error("undeclared cycle through node {node}")]
    #[diagnostic(
        code(flowloom::graph::undeclared_cycle),
        help("Loops are only legal as GRAPH transitions of a state-machine node.")
    )]
    UndeclaredCycle { node: String },

    /// A node has more than one outgoing data-flow edge where one is expected.
    #[error("node {node}: expected at most one outgoing {relation} edge, found {found}")]
    #[diagnostic(code(flowloom::graph::ambiguous_exit))]
    AmbiguousExit {
        node: String,
        relation: String,
        found: usize,
    },

    /// An each-node has no PROP edge attaching its per-item workflow.
    #[error("each node {node} has no PROP edge carrying its per-item workflow")]
    #[diagnostic(code(flowloom::graph::missing_workflow))]
    MissingWorkflow { node: String },

    /// A state-machine branch neither loops back nor reaches an End marker.
    #[error("state machine {node}: branch {label:?} neither loops back nor reaches an End marker")]
    #[diagnostic(code(flowloom::graph::open_ended_branch))]
    OpenEndedBranch { node: String, label: String },
}

/// A component class identifier has no registered constructor.
#[derive(Debug, Error, Diagnostic)]
#[error("unknown component class: {class}")]
#[diagnostic(
    code(flowloom::registry::unknown_component),
    help("Register the class with ComponentRegistry::register before compiling.")
)]
pub struct UnknownComponentError {
    pub class: String,
}

/// A deferred template variable was still unresolved at invocation.
#[derive(Debug, Error, Diagnostic)]
#[error("unresolved template variable {variable:?} in {scope}")]
#[diagnostic(
    code(flowloom::template::unresolved),
    help("The variable must be present in the invocation input or the context environment.")
)]
pub struct TemplateBindingError {
    pub variable: String,
    pub scope: String,
}

/// A state machine exceeded its iteration bound.
#[derive(Debug, Error, Diagnostic)]
#[error("state machine {node} exceeded its iteration bound of {bound}")]
#[diagnostic(
    code(flowloom::machine::overrun),
    help("Raise max_iterations in the node config or fix the conditional so it terminates.")
)]
pub struct StateMachineOverrunError {
    pub node: String,
    pub bound: usize,
}

/// A leaf component failed at invocation; the cause is preserved.
#[derive(Debug, Error, Diagnostic)]
#[error("component {scope} failed")]
#[diagnostic(code(flowloom::component::invocation))]
pub struct ComponentInvocationError {
    pub scope: String,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl ComponentInvocationError {
    pub fn new(
        scope: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            scope: scope.into(),
            source: Box::new(source),
        }
    }

    /// Wrap a bare message when the failing component has no error type.
    pub fn msg(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            source: message.into().into(),
        }
    }
}

/// Errors surfaced while turning a graph into a live pipeline.
#[derive(Debug, Error, Diagnostic)]
pub enum CompileError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Shape(#[from] GraphShapeError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    UnknownComponent(#[from] UnknownComponentError),
}

/// Errors surfaced while invoking a compiled pipeline.
#[derive(Debug, Error, Diagnostic)]
pub enum InvokeError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Template(#[from] TemplateBindingError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Overrun(#[from] StateMachineOverrunError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Component(#[from] ComponentInvocationError),

    /// The invocation input does not satisfy a shape's contract.
    #[error("invalid input: {0}")]
    #[diagnostic(code(flowloom::invoke::invalid_input))]
    InvalidInput(String),
}

impl InvokeError {
    /// Shorthand for wrapping a leaf failure with its scope.
    pub fn failure(
        scope: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        InvokeError::Component(ComponentInvocationError::new(scope, source))
    }
}
