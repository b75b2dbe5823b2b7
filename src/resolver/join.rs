//! Reconvergence detection between sibling subflows.

use rustc_hash::FxHashMap;

use super::placeholder::{ImplicitJoin, MapPlaceholder, Placeholder};
use crate::graph::{GraphView, RelationKind};

/// Post-processes sibling placeholder subtrees (map slots or branch arms)
/// and marks nodes shared between two or more of them.
///
/// The first shared step of each sibling becomes an [`ImplicitJoin`]; the
/// trailing sequence after the shared node stays common to all siblings.
/// The shared node is represented once structurally even though at run time
/// only the firing path supplies its input.
#[derive(Debug, Default)]
pub struct JoinResolver;

impl JoinResolver {
    pub fn new() -> Self {
        Self
    }

    /// Rewrites shared downstream steps in place. Infallible: a sibling set
    /// with no shared node is left untouched.
    pub fn resolve(&self, siblings: &mut [Placeholder], graph: &GraphView) {
        if siblings.len() < 2 {
            return;
        }

        // Count, per node id, how many siblings carry it as a top-level step.
        let chains: Vec<Vec<Option<String>>> = siblings.iter().map(chain_ids).collect();
        let mut sibling_counts: FxHashMap<&str, usize> = FxHashMap::default();
        for chain in &chains {
            let mut counted: Vec<&str> = Vec::new();
            for id in chain.iter().flatten() {
                if !counted.contains(&id.as_str()) {
                    counted.push(id);
                    *sibling_counts.entry(id).or_default() += 1;
                }
            }
        }

        let shared: Vec<String> = sibling_counts
            .into_iter()
            .filter(|(_, count)| *count >= 2)
            .map(|(id, _)| id.to_string())
            .collect();
        if shared.is_empty() {
            return;
        }

        for (sibling, chain) in siblings.iter_mut().zip(&chains) {
            let first_shared = chain
                .iter()
                .position(|id| id.as_ref().is_some_and(|i| shared.iter().any(|s| s == i)));
            if let Some(pos) = first_shared {
                rewrite_step(sibling, pos, graph);
            }
        }
    }
}

/// Top-level step ids of a sibling; only bare node steps participate in
/// join detection.
fn chain_ids(sibling: &Placeholder) -> Vec<Option<String>> {
    match sibling {
        Placeholder::Sequence(seq) => seq.steps.iter().map(step_id).collect(),
        other => vec![step_id(other)],
    }
}

fn step_id(step: &Placeholder) -> Option<String> {
    match step {
        Placeholder::Node(id) => Some(id.clone()),
        _ => None,
    }
}

fn rewrite_step(sibling: &mut Placeholder, pos: usize, graph: &GraphView) {
    match sibling {
        Placeholder::Sequence(seq) => {
            let predecessor = pos.checked_sub(1).and_then(|p| step_id(&seq.steps[p]));
            let joined = make_join(&seq.steps[pos], predecessor, graph);
            seq.steps[pos] = joined;
        }
        other => {
            debug_assert_eq!(pos, 0);
            let joined = make_join(other, None, graph);
            *other = joined;
        }
    }
}

/// Builds the join marker: the shared node wrapped in a single-slot map
/// keyed by the immediate predecessor on this path. The map wrapper carries
/// no runtime significance; the predecessor choice is the first candidate
/// in path order.
fn make_join(shared: &Placeholder, predecessor: Option<String>, graph: &GraphView) -> Placeholder {
    let node = shared
        .node_id()
        .expect("join rewrites only bare node steps")
        .to_string();
    let slots = predecessor
        .as_ref()
        .map(|pred| {
            let slot = graph
                .incoming(&node, RelationKind::Link)
                .find(|e| &e.source == pred)
                .and_then(|e| e.target_key.clone())
                .unwrap_or_else(|| "input".to_string());
            vec![(slot, Placeholder::Node(pred.clone()))]
        })
        .unwrap_or_default();
    Placeholder::Join(ImplicitJoin {
        sources: predecessor.into_iter().collect(),
        target: Box::new(Placeholder::Map(MapPlaceholder { node, slots })),
    })
}
