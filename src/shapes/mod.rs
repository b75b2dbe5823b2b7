//! Runtime behaviors behind each placeholder shape.
//!
//! The instantiator assembles these from a resolved placeholder tree; each
//! one owns its children as live [`Component`](crate::component::Component)
//! trait objects and implements the shape's invocation semantics.

mod branch;
mod each;
mod leaf;
mod machine;
mod map;
mod sequence;

pub use branch::BranchComponent;
pub use each::{EachComponent, DEFAULT_ITEM_KEY, ITEM_KEY_CONFIG, RESULTS_KEY};
pub use leaf::LeafComponent;
pub use machine::{
    MachineExit, StateMachineComponent, DEFAULT_MAX_ITERATIONS, END_SENTINEL, FINAL_STATE_KEY,
    MAX_ITERATIONS_CONFIG, NEXT_KEY, STATE_ADD_KEYS_CONFIG,
};
pub use map::MapComponent;
pub use sequence::{IdentityComponent, SequenceComponent};
