//! Flow resolution: persisted graph → shape-typed placeholder tree.
//!
//! Resolution is a synchronous, pure function of the [`GraphView`]: it
//! allocates placeholders, never components, and its output may be cached
//! per graph version by the caller. [`FlowResolver`] recognizes the five
//! structural shapes; [`JoinResolver`] post-processes sibling subtrees to
//! mark reconvergence on shared downstream nodes.
//!
//! [`GraphView`]: crate::graph::GraphView

mod flow;
mod join;
mod placeholder;

pub use flow::FlowResolver;
pub use join::JoinResolver;
pub use placeholder::{
    BranchPlaceholder, EachPlaceholder, ImplicitJoin, MapPlaceholder, Placeholder,
    SequencePlaceholder, StateMachinePlaceholder,
};
