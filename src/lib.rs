//! Compile persisted flow graphs into live, invocable pipelines.
//!
//! An authoring layer stores automations as node and edge records; this
//! crate turns those records into something that runs. Compilation is two
//! fail-closed stages:
//!
//! 1. **Resolution** ([`resolver`]): a pure, synchronous walk of the graph
//!    that classifies every node by its declared shape (plain, map, branch,
//!    state machine, each) and produces an abstract
//!    [`Placeholder`](resolver::Placeholder) tree. Structural disagreements
//!    between a node's declarations and its edges surface here as
//!    [`GraphShapeError`](errors::GraphShapeError)s.
//! 2. **Instantiation** ([`instantiate`]): the tree is wired into live
//!    components through an explicit [`registry`] of component
//!    constructors; unknown classes abort the compile.
//!
//! Invocation flows string-keyed JSON payloads through the result, with
//! lifecycle events reported per scope to a single [`listener`] attached to
//! the run's [`ExecutionContext`](context::ExecutionContext).
//!
//! Resolution alone needs no runtime:
//!
//! ```
//! use flowloom::graph::{EdgeRecord, GraphView, NodeRecord};
//! use flowloom::resolver::FlowResolver;
//!
//! let nodes = vec![
//!     NodeRecord::new("a", "Loader").root(),
//!     NodeRecord::new("b", "Summarizer"),
//! ];
//! let edges = vec![EdgeRecord::link("e1", "a", "b")];
//! let graph = GraphView::from_records(nodes, edges)?;
//!
//! let tree = FlowResolver::new(&graph).resolve_graph()?;
//! assert_eq!(tree.describe(), "a -> b");
//! # Ok::<(), flowloom::errors::GraphShapeError>(())
//! ```

pub mod component;
pub mod context;
pub mod errors;
pub mod event;
pub mod graph;
pub mod instantiate;
pub mod listener;
pub mod registry;
pub mod resolver;
pub mod shapes;
pub mod telemetry;
pub mod template;
pub mod utils;

pub use component::{Component, Payload};
pub use context::ExecutionContext;
pub use errors::{CompileError, InvokeError};
pub use instantiate::{compile, Flow, FlowInstantiator};
pub use registry::ComponentRegistry;
pub use resolver::FlowResolver;
