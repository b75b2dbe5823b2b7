//! Read-only, indexed view over persisted graph records.

use rustc_hash::FxHashMap;

use super::records::{EdgeRecord, NodeRecord, RelationKind};
use crate::errors::GraphShapeError;

/// Immutable graph index the compiler walks.
///
/// Lookup methods return `Option` or explicit errors; "no matching edge" is
/// a value, never a panic or a caught exception. Adjacency lists preserve
/// edge insertion order so repeated resolution is deterministic.
#[derive(Clone, Debug, Default)]
pub struct GraphView {
    nodes: FxHashMap<String, NodeRecord>,
    /// Node ids in insertion order, for deterministic root iteration.
    order: Vec<String>,
    edges: Vec<EdgeRecord>,
    outgoing: FxHashMap<String, Vec<usize>>,
    incoming: FxHashMap<String, Vec<usize>>,
}

impl GraphView {
    /// Builds a view from persisted records, indexing adjacency.
    ///
    /// # Errors
    ///
    /// Returns [`GraphShapeError::DanglingEdge`] when an edge references a
    /// node id missing from the node set.
    pub fn from_records(
        nodes: Vec<NodeRecord>,
        edges: Vec<EdgeRecord>,
    ) -> Result<Self, GraphShapeError> {
        let mut view = GraphView::default();
        for node in nodes {
            view.order.push(node.id.clone());
            view.nodes.insert(node.id.clone(), node);
        }
        for edge in edges {
            for endpoint in [&edge.source, &edge.target] {
                if !view.nodes.contains_key(endpoint) {
                    return Err(GraphShapeError::DanglingEdge {
                        edge: edge.id.clone(),
                        node: endpoint.clone(),
                    });
                }
            }
            let index = view.edges.len();
            view.outgoing
                .entry(edge.source.clone())
                .or_default()
                .push(index);
            view.incoming
                .entry(edge.target.clone())
                .or_default()
                .push(index);
            view.edges.push(edge);
        }
        Ok(view)
    }

    pub fn node(&self, id: &str) -> Option<&NodeRecord> {
        self.nodes.get(id)
    }

    /// Node lookup that fails closed on a missing id.
    pub fn require(&self, id: &str) -> Result<&NodeRecord, GraphShapeError> {
        self.nodes
            .get(id)
            .ok_or_else(|| GraphShapeError::UnknownNode { id: id.to_string() })
    }

    /// Outgoing edges of a node filtered by relation, in insertion order.
    pub fn outgoing(
        &self,
        id: &str,
        relation: RelationKind,
    ) -> impl Iterator<Item = &EdgeRecord> {
        self.outgoing
            .get(id)
            .into_iter()
            .flatten()
            .map(|&i| &self.edges[i])
            .filter(move |e| e.relation == relation)
    }

    /// Incoming edges of a node filtered by relation, in insertion order.
    pub fn incoming(
        &self,
        id: &str,
        relation: RelationKind,
    ) -> impl Iterator<Item = &EdgeRecord> {
        self.incoming
            .get(id)
            .into_iter()
            .flatten()
            .map(|&i| &self.edges[i])
            .filter(move |e| e.relation == relation)
    }

    /// The node's single outgoing edge of the given relation, if any.
    ///
    /// More than one matching edge is a shape error: data-flow exits are
    /// unambiguous by construction (fan-out goes through branch/map shapes).
    pub fn single_outgoing(
        &self,
        id: &str,
        relation: RelationKind,
    ) -> Result<Option<&EdgeRecord>, GraphShapeError> {
        let mut matches = self.outgoing(id, relation);
        let first = matches.next();
        let extra = matches.count();
        if extra > 0 {
            return Err(GraphShapeError::AmbiguousExit {
                node: id.to_string(),
                relation: relation.to_string(),
                found: extra + 1,
            });
        }
        Ok(first)
    }

    /// Root-flagged nodes in insertion order.
    pub fn roots(&self) -> impl Iterator<Item = &NodeRecord> {
        self.order
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .filter(|n| n.is_root)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
