//! Persisted node and edge records.
//!
//! The serde shape here mirrors what the authoring layer stores. Records are
//! plain data: all structural interpretation lives in the resolver.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Reserved component class marking state-machine termination targets.
pub const END_COMPONENT_CLASS: &str = "End";

/// Source key of the fallback edge on a branch node.
pub const DEFAULT_BRANCH_KEY: &str = "default";

/// Structural shape of a node, deciding which resolution rule applies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShapeKind {
    /// Ordinary data-flow step; folded into sequences.
    #[default]
    Plain,
    /// Explicitly authored linear chain; treated like a plain step.
    Sequence,
    /// Fan-out/fan-in: named slots computed independently, merged keyed.
    Map,
    /// Data-dependent fork: exactly one labeled subflow runs per invocation.
    Branch,
    /// Cyclic machine with a conditional, loop labels, and terminal labels.
    StateMachine,
    /// Per-element iteration over an ordered input sequence.
    Each,
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShapeKind::Plain => "plain",
            ShapeKind::Sequence => "sequence",
            ShapeKind::Map => "map",
            ShapeKind::Branch => "branch",
            ShapeKind::StateMachine => "state-machine",
            ShapeKind::Each => "each",
        };
        write!(f, "{name}")
    }
}

/// How an edge relates its endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RelationKind {
    /// Data-flow edge.
    Link,
    /// Attaches the source node as configuration, not data path.
    Prop,
    /// State-machine transition, including loop-backs.
    Graph,
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelationKind::Link => "LINK",
            RelationKind::Prop => "PROP",
            RelationKind::Graph => "GRAPH",
        };
        write!(f, "{name}")
    }
}

/// A persisted flow node.
///
/// For map/branch/state-machine shapes, `branch_labels` is the ordered list
/// of slot/branch labels and `edge_keys` the parallel list of opaque edge
/// discriminators. Labels are what users see; keys are what edges carry,
/// because human labels are not safe edge discriminators.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: String,
    pub component_class: String,
    #[serde(default)]
    pub config: FxHashMap<String, Value>,
    #[serde(default)]
    pub shape: ShapeKind,
    #[serde(default)]
    pub is_root: bool,
    #[serde(default)]
    pub branch_labels: Vec<String>,
    #[serde(default)]
    pub edge_keys: Vec<String>,
    /// Map slots allowed to receive more than one incoming edge.
    #[serde(default)]
    pub multi_slots: Vec<String>,
}

impl NodeRecord {
    pub fn new(id: impl Into<String>, component_class: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            component_class: component_class.into(),
            config: FxHashMap::default(),
            shape: ShapeKind::Plain,
            is_root: false,
            branch_labels: Vec::new(),
            edge_keys: Vec::new(),
            multi_slots: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_shape(mut self, shape: ShapeKind) -> Self {
        self.shape = shape;
        self
    }

    /// Declares the ordered labels and their correlated edge keys.
    #[must_use]
    pub fn with_labels<L, K>(mut self, labels: L, keys: K) -> Self
    where
        L: IntoIterator,
        L::Item: Into<String>,
        K: IntoIterator,
        K::Item: Into<String>,
    {
        self.branch_labels = labels.into_iter().map(Into::into).collect();
        self.edge_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Declares map slots; slot labels double as edge target keys.
    #[must_use]
    pub fn with_slots<S>(mut self, slots: S) -> Self
    where
        S: IntoIterator,
        S::Item: Into<String>,
    {
        self.branch_labels = slots.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_multi_slot(mut self, slot: impl Into<String>) -> Self {
        self.multi_slots.push(slot.into());
        self
    }

    #[must_use]
    pub fn with_config_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn root(mut self) -> Self {
        self.is_root = true;
        self
    }

    /// Whether this node is a reserved terminal End marker.
    #[must_use]
    pub fn is_end_marker(&self) -> bool {
        self.component_class == END_COMPONENT_CLASS
    }

    /// Declared (label, edge-key) pairs in declaration order.
    pub fn label_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.branch_labels
            .iter()
            .zip(self.edge_keys.iter())
            .map(|(l, k)| (l.as_str(), k.as_str()))
    }

    /// Whether a map slot tolerates multiple incoming edges.
    #[must_use]
    pub fn slot_is_multiple(&self, slot: &str) -> bool {
        self.multi_slots.iter().any(|s| s == slot)
    }
}

/// A persisted flow edge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub id: String,
    pub source: String,
    pub target: String,
    pub relation: RelationKind,
    #[serde(default)]
    pub source_key: Option<String>,
    #[serde(default)]
    pub target_key: Option<String>,
    #[serde(default)]
    pub graph_id: Option<String>,
}

impl EdgeRecord {
    fn with_relation(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        relation: RelationKind,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            relation,
            source_key: None,
            target_key: None,
            graph_id: None,
        }
    }

    pub fn link(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self::with_relation(id, source, target, RelationKind::Link)
    }

    pub fn prop(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self::with_relation(id, source, target, RelationKind::Prop)
    }

    /// A state-machine transition edge.
    pub fn transition(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self::with_relation(id, source, target, RelationKind::Graph)
    }

    #[must_use]
    pub fn with_source_key(mut self, key: impl Into<String>) -> Self {
        self.source_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_target_key(mut self, key: impl Into<String>) -> Self {
        self.target_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_graph_id(mut self, graph_id: impl Into<String>) -> Self {
        self.graph_id = Some(graph_id.into());
        self
    }
}
