//! Abstract structural description of a flow before instantiation.

use std::fmt::Write as _;

/// One node of the placeholder tree.
///
/// Placeholders reference graph nodes by id only; nothing is instantiated
/// until the tree is handed to the instantiator. Child collections are
/// ordered `Vec`s in declared label order, so re-resolving an unchanged
/// graph yields structurally equal trees.
#[derive(Clone, Debug, PartialEq)]
pub enum Placeholder {
    /// A bare reference to a leaf node.
    Node(String),
    Sequence(SequencePlaceholder),
    Map(MapPlaceholder),
    Branch(BranchPlaceholder),
    StateMachine(StateMachinePlaceholder),
    Each(EachPlaceholder),
    /// Compiler-inserted reconvergence marker.
    Join(ImplicitJoin),
}

/// Strictly ordered chain of steps.
///
/// An empty step list is the identity flow: input passes through unchanged.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SequencePlaceholder {
    pub steps: Vec<Placeholder>,
}

/// Fan-out/fan-in over named slots.
///
/// A slot label may repeat when the map node declared it multiple; repeated
/// slot outputs are collected into a list under the label.
#[derive(Clone, Debug, PartialEq)]
pub struct MapPlaceholder {
    pub node: String,
    pub slots: Vec<(String, Placeholder)>,
}

/// Data-dependent fork: one labeled subflow or the default runs.
#[derive(Clone, Debug, PartialEq)]
pub struct BranchPlaceholder {
    pub node: String,
    pub branches: Vec<(String, Placeholder)>,
    pub default: Box<Placeholder>,
}

/// Cyclic machine with loop and terminal transitions.
#[derive(Clone, Debug, PartialEq)]
pub struct StateMachinePlaceholder {
    pub node: String,
    pub branches: Vec<(String, Placeholder)>,
    /// Labels whose subflow tail transitions back to the machine node.
    pub loops: Vec<String>,
    /// Labels whose subflow tail reaches a terminal End marker.
    pub ends: Vec<String>,
    pub entry_point: String,
}

/// Per-element iteration wrapping one workflow.
#[derive(Clone, Debug, PartialEq)]
pub struct EachPlaceholder {
    pub node: String,
    pub workflow: Box<Placeholder>,
}

/// Reconvergence of sibling paths onto a shared downstream node.
///
/// `target` is always a [`MapPlaceholder`] over the shared node; the map
/// wrapper preserves a uniform structural shape and carries no runtime
/// significance. The recorded predecessor slot is the first candidate in
/// path order, an explicitly documented nondeterminism.
#[derive(Clone, Debug, PartialEq)]
pub struct ImplicitJoin {
    /// Immediate predecessor node ids on this sibling's path.
    pub sources: Vec<String>,
    pub target: Box<Placeholder>,
}

impl Placeholder {
    /// Wraps steps in a sequence, unless a single step suffices.
    pub(crate) fn fold_steps(mut steps: Vec<Placeholder>) -> Placeholder {
        if steps.len() == 1 {
            steps.pop().expect("length checked")
        } else {
            Placeholder::Sequence(SequencePlaceholder { steps })
        }
    }

    /// The identity flow.
    pub(crate) fn identity() -> Placeholder {
        Placeholder::Sequence(SequencePlaceholder::default())
    }

    /// Graph node id of this placeholder, when it references exactly one.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Placeholder::Node(id) => Some(id),
            Placeholder::Map(m) => Some(&m.node),
            Placeholder::Branch(b) => Some(&b.node),
            Placeholder::StateMachine(m) => Some(&m.node),
            Placeholder::Each(e) => Some(&e.node),
            Placeholder::Sequence(_) | Placeholder::Join(_) => None,
        }
    }

    /// Compact structural rendering for logs and test assertions.
    ///
    /// ```
    /// use flowloom::resolver::Placeholder;
    ///
    /// let tree = Placeholder::Sequence(flowloom::resolver::SequencePlaceholder {
    ///     steps: vec![
    ///         Placeholder::Node("a".into()),
    ///         Placeholder::Node("b".into()),
    ///     ],
    /// });
    /// assert_eq!(tree.describe(), "a -> b");
    /// ```
    pub fn describe(&self) -> String {
        let mut out = String::new();
        self.write_into(&mut out);
        out
    }

    fn write_into(&self, out: &mut String) {
        match self {
            Placeholder::Node(id) => out.push_str(id),
            Placeholder::Sequence(seq) => {
                if seq.steps.is_empty() {
                    out.push_str("identity");
                }
                for (i, step) in seq.steps.iter().enumerate() {
                    if i > 0 {
                        out.push_str(" -> ");
                    }
                    step.write_into(out);
                }
            }
            Placeholder::Map(map) => {
                let _ = write!(out, "map[{}](", map.node);
                for (i, (label, sub)) in map.slots.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "{label}: ");
                    sub.write_into(out);
                }
                out.push(')');
            }
            Placeholder::Branch(branch) => {
                let _ = write!(out, "branch[{}](", branch.node);
                for (label, sub) in &branch.branches {
                    let _ = write!(out, "{label}: ");
                    sub.write_into(out);
                    out.push_str(" | ");
                }
                out.push_str("default: ");
                branch.default.write_into(out);
                out.push(')');
            }
            Placeholder::StateMachine(machine) => {
                let _ = write!(out, "machine[{}](", machine.node);
                for (i, (label, sub)) in machine.branches.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let marker = if machine.loops.iter().any(|l| l == label) {
                        "loop "
                    } else {
                        "end "
                    };
                    let _ = write!(out, "{marker}{label}: ");
                    sub.write_into(out);
                }
                out.push(')');
            }
            Placeholder::Each(each) => {
                let _ = write!(out, "each[{}](", each.node);
                each.workflow.write_into(out);
                out.push(')');
            }
            Placeholder::Join(join) => {
                out.push_str("join(");
                join.target.write_into(out);
                out.push(')');
            }
        }
    }
}
