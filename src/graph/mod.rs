//! Persisted graph model consumed by the compiler.
//!
//! Nodes and edges are created and mutated exclusively by an external
//! authoring layer; this module only defines their persisted shape and a
//! read-only, indexed [`GraphView`] over them. The compiler re-reads the
//! view on every compile request and performs no mutation.

mod records;
#[cfg(test)]
mod tests;
mod view;

pub use records::{
    EdgeRecord, NodeRecord, RelationKind, ShapeKind, DEFAULT_BRANCH_KEY, END_COMPONENT_CLASS,
};
pub use view::GraphView;
