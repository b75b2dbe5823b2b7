use serde_json::json;

use super::records::{EdgeRecord, NodeRecord, RelationKind, ShapeKind};
use super::view::GraphView;
use crate::errors::GraphShapeError;

fn linear_view() -> GraphView {
    let nodes = vec![
        NodeRecord::new("a", "loader").root(),
        NodeRecord::new("b", "summarizer"),
        NodeRecord::new("c", "writer"),
    ];
    let edges = vec![
        EdgeRecord::link("e1", "a", "b"),
        EdgeRecord::link("e2", "b", "c"),
    ];
    GraphView::from_records(nodes, edges).unwrap()
}

#[test]
fn dangling_edge_is_rejected_at_indexing() {
    let nodes = vec![NodeRecord::new("a", "loader")];
    let edges = vec![EdgeRecord::link("e1", "a", "ghost")];
    let err = GraphView::from_records(nodes, edges).unwrap_err();
    assert!(matches!(
        err,
        GraphShapeError::DanglingEdge { ref node, .. } if node == "ghost"
    ));
}

#[test]
fn single_outgoing_distinguishes_none_from_ambiguous() {
    let view = linear_view();
    assert!(view
        .single_outgoing("c", RelationKind::Link)
        .unwrap()
        .is_none());
    let edge = view
        .single_outgoing("a", RelationKind::Link)
        .unwrap()
        .unwrap();
    assert_eq!(edge.target, "b");

    let nodes = vec![
        NodeRecord::new("a", "loader"),
        NodeRecord::new("b", "x"),
        NodeRecord::new("c", "y"),
    ];
    let edges = vec![
        EdgeRecord::link("e1", "a", "b"),
        EdgeRecord::link("e2", "a", "c"),
    ];
    let view = GraphView::from_records(nodes, edges).unwrap();
    let err = view.single_outgoing("a", RelationKind::Link).unwrap_err();
    assert!(matches!(err, GraphShapeError::AmbiguousExit { found: 2, .. }));
}

#[test]
fn relation_filter_separates_edge_kinds() {
    let nodes = vec![
        NodeRecord::new("a", "loader"),
        NodeRecord::new("b", "x"),
        NodeRecord::new("w", "workflow"),
    ];
    let edges = vec![
        EdgeRecord::link("e1", "a", "b"),
        EdgeRecord::prop("e2", "w", "b"),
    ];
    let view = GraphView::from_records(nodes, edges).unwrap();
    assert_eq!(view.incoming("b", RelationKind::Link).count(), 1);
    assert_eq!(view.incoming("b", RelationKind::Prop).count(), 1);
    assert_eq!(view.incoming("b", RelationKind::Graph).count(), 0);
}

#[test]
fn roots_iterate_in_insertion_order() {
    let nodes = vec![
        NodeRecord::new("z", "loader").root(),
        NodeRecord::new("m", "x"),
        NodeRecord::new("a", "loader").root(),
    ];
    let view = GraphView::from_records(nodes, vec![]).unwrap();
    let roots: Vec<&str> = view.roots().map(|n| n.id.as_str()).collect();
    assert_eq!(roots, vec!["z", "a"]);
}

#[test]
fn node_record_serde_shape() {
    let node = NodeRecord::new("branch-1", "router")
        .with_shape(ShapeKind::Branch)
        .with_labels(["yes", "no"], ["k1", "k2"])
        .with_config_value("prompt", json!("{question}"));
    let raw = serde_json::to_value(&node).unwrap();
    assert_eq!(raw["shape"], "branch");
    assert_eq!(raw["branch_labels"], json!(["yes", "no"]));
    let back: NodeRecord = serde_json::from_value(raw).unwrap();
    assert_eq!(back, node);

    // Persisted rows omit defaulted columns; they must still deserialize.
    let sparse: NodeRecord =
        serde_json::from_value(json!({"id": "n", "component_class": "End"})).unwrap();
    assert_eq!(sparse.shape, ShapeKind::Plain);
    assert!(sparse.is_end_marker());
}
