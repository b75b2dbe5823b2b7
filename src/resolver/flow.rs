//! Walks a root node through the persisted graph and produces a
//! shape-typed placeholder tree.

use tracing::instrument;

use super::join::JoinResolver;
use super::placeholder::{
    BranchPlaceholder, EachPlaceholder, MapPlaceholder, Placeholder, StateMachinePlaceholder,
};
use crate::errors::GraphShapeError;
use crate::graph::{GraphView, NodeRecord, RelationKind, ShapeKind, DEFAULT_BRANCH_KEY};

/// How a resolved state-machine branch terminates.
enum BranchExit {
    /// Tail transitions back to the machine node.
    Loop,
    /// Tail reaches a terminal End marker.
    End,
}

/// Pure, synchronous resolver over a [`GraphView`].
///
/// Classifies each node by its declared shape and folds linear runs of
/// plain nodes into sequences. Any disagreement between a node's declared
/// labels and its actual edges raises a [`GraphShapeError`] immediately;
/// the resolver never guesses and never emits a partial tree.
pub struct FlowResolver<'g> {
    graph: &'g GraphView,
    joins: JoinResolver,
}

impl<'g> FlowResolver<'g> {
    pub fn new(graph: &'g GraphView) -> Self {
        Self {
            graph,
            joins: JoinResolver::new(),
        }
    }

    /// Resolves the flow reachable from one root node.
    #[instrument(skip(self), err)]
    pub fn resolve(&self, root: &str) -> Result<Placeholder, GraphShapeError> {
        let anchor = self.find_anchor(root)?;
        let mut trail = Vec::new();
        let (tree, _tail) = self.resolve_flow(&anchor, &mut trail)?;
        Ok(tree)
    }

    /// Resolves a flow with several declared roots.
    ///
    /// All roots must reconverge on one pipeline; each is resolved
    /// independently and the results must be structurally equal.
    pub fn resolve_roots(&self, roots: &[&str]) -> Result<Placeholder, GraphShapeError> {
        let (first_id, rest) = roots.split_first().ok_or(GraphShapeError::NoRoot)?;
        let first = self.resolve(first_id)?;
        for other_id in rest {
            let other = self.resolve(other_id)?;
            if other != first {
                return Err(GraphShapeError::DivergentRoots {
                    first: (*first_id).to_string(),
                    second: (*other_id).to_string(),
                });
            }
        }
        Ok(first)
    }

    /// Resolves the flow using the graph's root-flagged nodes.
    pub fn resolve_graph(&self) -> Result<Placeholder, GraphShapeError> {
        let roots: Vec<&str> = self.graph.roots().map(|n| n.id.as_str()).collect();
        self.resolve_roots(&roots)
    }

    /// Finds the resolution anchor for a root: the last fan-in (map) node on
    /// its data-flow chain, or the root itself.
    ///
    /// A chain that feeds a map is, by the map invariant, exactly one slot's
    /// input; anchoring at the final map lets slot resolution rediscover the
    /// chain upstream without duplicating it in the top-level tree.
    fn find_anchor(&self, start: &str) -> Result<String, GraphShapeError> {
        let mut seen: Vec<String> = Vec::new();
        let mut cur = start.to_string();
        let mut anchor = start.to_string();
        loop {
            if seen.contains(&cur) {
                // Cycle; the fold reports it with a proper trail.
                break;
            }
            seen.push(cur.clone());
            let node = self.graph.require(&cur)?;
            if node.is_end_marker() || node.shape == ShapeKind::Branch {
                break;
            }
            if node.shape == ShapeKind::Map {
                anchor = cur.clone();
            }
            match self.graph.single_outgoing(&cur, RelationKind::Link)? {
                Some(edge) => cur = edge.target.clone(),
                None => break,
            }
        }
        Ok(anchor)
    }

    /// Folds the data-flow chain starting at `start` into a placeholder,
    /// returning the tree and the id of the last folded node.
    fn resolve_flow(
        &self,
        start: &str,
        trail: &mut Vec<String>,
    ) -> Result<(Placeholder, Option<String>), GraphShapeError> {
        let mut steps = Vec::new();
        let mut tail = None;
        let mut cur = start.to_string();
        loop {
            if trail.contains(&cur) {
                return Err(GraphShapeError::UndeclaredCycle { node: cur });
            }
            trail.push(cur.clone());
            let node = self.graph.require(&cur)?;
            if node.is_end_marker() {
                break;
            }
            steps.push(self.resolve_node(node, trail)?);
            tail = Some(cur.clone());
            if node.shape == ShapeKind::Branch {
                // A branch consumes its outgoing edges; no data-flow exit.
                break;
            }
            match self.graph.single_outgoing(&cur, RelationKind::Link)? {
                Some(edge) => cur = edge.target.clone(),
                None => break,
            }
        }
        Ok((Placeholder::fold_steps(steps), tail))
    }

    /// Classifies one node by shape and applies its resolution rule.
    fn resolve_node(
        &self,
        node: &NodeRecord,
        trail: &mut Vec<String>,
    ) -> Result<Placeholder, GraphShapeError> {
        match node.shape {
            ShapeKind::Plain | ShapeKind::Sequence => Ok(Placeholder::Node(node.id.clone())),
            ShapeKind::Map => self.resolve_map(node, trail),
            ShapeKind::Branch => self.resolve_branch(node, trail),
            ShapeKind::StateMachine => self.resolve_machine(node, trail),
            ShapeKind::Each => self.resolve_each(node, trail),
        }
    }

    /// Groups a map node's incoming LINK edges by target key and resolves
    /// each source as an independent upstream subflow.
    fn resolve_map(
        &self,
        node: &NodeRecord,
        trail: &mut Vec<String>,
    ) -> Result<Placeholder, GraphShapeError> {
        let mut claimed: Vec<(&str, Vec<&crate::graph::EdgeRecord>)> = node
            .branch_labels
            .iter()
            .map(|l| (l.as_str(), Vec::new()))
            .collect();
        for edge in self.graph.incoming(&node.id, RelationKind::Link) {
            let slot = edge.target_key.as_deref().unwrap_or("");
            match claimed.iter_mut().find(|(label, _)| *label == slot) {
                Some((_, edges)) => edges.push(edge),
                None => {
                    return Err(GraphShapeError::UndeclaredSlot {
                        node: node.id.clone(),
                        slot: slot.to_string(),
                    });
                }
            }
        }

        let mut labels = Vec::new();
        let mut subflows = Vec::new();
        for (slot, edges) in &claimed {
            if edges.is_empty() {
                return Err(GraphShapeError::SlotUnfilled {
                    node: node.id.clone(),
                    slot: slot.to_string(),
                });
            }
            if edges.len() > 1 && !node.slot_is_multiple(slot) {
                return Err(GraphShapeError::SlotOversubscribed {
                    node: node.id.clone(),
                    slot: slot.to_string(),
                    count: edges.len(),
                });
            }
            for edge in edges {
                labels.push(slot.to_string());
                subflows.push(self.resolve_upstream(&edge.source, trail)?);
            }
        }

        self.joins.resolve(&mut subflows, self.graph);
        let slots = labels.into_iter().zip(subflows).collect();
        Ok(Placeholder::Map(MapPlaceholder {
            node: node.id.clone(),
            slots,
        }))
    }

    /// Resolves the subflow reachable via each declared label's correlated
    /// edge key, plus the `"default"` edge.
    fn resolve_branch(
        &self,
        node: &NodeRecord,
        trail: &mut Vec<String>,
    ) -> Result<Placeholder, GraphShapeError> {
        self.check_label_keys(node)?;
        self.check_declared_keys(node, RelationKind::Link)?;

        let mut labels = Vec::new();
        let mut subflows = Vec::new();
        for (label, key) in node.label_pairs() {
            let edge = self
                .graph
                .outgoing(&node.id, RelationKind::Link)
                .find(|e| e.source_key.as_deref() == Some(key))
                .ok_or_else(|| GraphShapeError::UnmatchedBranchKey {
                    node: node.id.clone(),
                    label: label.to_string(),
                    key: key.to_string(),
                })?;
            // Anchor each arm like a root: an arm feeding a map resolves at
            // the map, with the arm chain rediscovered as slot input.
            let anchor = self.find_anchor(&edge.target)?;
            let (subflow, _) = self.resolve_flow(&anchor, &mut trail.clone())?;
            labels.push(label.to_string());
            subflows.push(subflow);
        }

        let default_edge = self
            .graph
            .outgoing(&node.id, RelationKind::Link)
            .find(|e| e.source_key.as_deref() == Some(DEFAULT_BRANCH_KEY))
            .ok_or_else(|| GraphShapeError::MissingDefault {
                node: node.id.clone(),
            })?;
        let anchor = self.find_anchor(&default_edge.target)?;
        let (default, _) = self.resolve_flow(&anchor, &mut trail.clone())?;
        subflows.push(default);

        self.joins.resolve(&mut subflows, self.graph);
        let default = Box::new(subflows.pop().expect("default pushed above"));
        let branches = labels.into_iter().zip(subflows).collect();
        Ok(Placeholder::Branch(BranchPlaceholder {
            node: node.id.clone(),
            branches,
            default,
        }))
    }

    /// Resolves a state machine's branches over GRAPH edges and classifies
    /// each as a loop or an end.
    fn resolve_machine(
        &self,
        node: &NodeRecord,
        trail: &mut Vec<String>,
    ) -> Result<Placeholder, GraphShapeError> {
        self.check_label_keys(node)?;
        self.check_declared_keys(node, RelationKind::Graph)?;

        let mut branches = Vec::new();
        let mut loops = Vec::new();
        let mut ends = Vec::new();
        for (label, key) in node.label_pairs() {
            let edge = self
                .graph
                .outgoing(&node.id, RelationKind::Graph)
                .find(|e| e.source_key.as_deref() == Some(key))
                .ok_or_else(|| GraphShapeError::UnmatchedBranchKey {
                    node: node.id.clone(),
                    label: label.to_string(),
                    key: key.to_string(),
                })?;

            // A transition straight back to the machine, or straight to an
            // End marker, carries the identity action.
            if edge.target == node.id {
                loops.push(label.to_string());
                branches.push((label.to_string(), Placeholder::identity()));
                continue;
            }
            if self.graph.require(&edge.target)?.is_end_marker() {
                ends.push(label.to_string());
                branches.push((label.to_string(), Placeholder::identity()));
                continue;
            }

            let (subflow, exit) =
                self.resolve_machine_branch(node, label, &edge.target, &mut trail.clone())?;
            match exit {
                BranchExit::Loop => loops.push(label.to_string()),
                BranchExit::End => ends.push(label.to_string()),
            }
            branches.push((label.to_string(), subflow));
        }

        Ok(Placeholder::StateMachine(StateMachinePlaceholder {
            node: node.id.clone(),
            branches,
            loops,
            ends,
            entry_point: node.id.clone(),
        }))
    }

    /// Walks one machine branch over GRAPH edges until it loops back to the
    /// machine or reaches an End marker.
    fn resolve_machine_branch(
        &self,
        machine: &NodeRecord,
        label: &str,
        start: &str,
        trail: &mut Vec<String>,
    ) -> Result<(Placeholder, BranchExit), GraphShapeError> {
        let mut steps = Vec::new();
        let mut cur = start.to_string();
        loop {
            if trail.contains(&cur) {
                return Err(GraphShapeError::UndeclaredCycle { node: cur });
            }
            trail.push(cur.clone());
            let node = self.graph.require(&cur)?;
            if node.is_end_marker() {
                return Ok((Placeholder::fold_steps(steps), BranchExit::End));
            }
            steps.push(self.resolve_node(node, trail)?);
            match self.graph.single_outgoing(&cur, RelationKind::Graph)? {
                Some(edge) if edge.target == machine.id => {
                    return Ok((Placeholder::fold_steps(steps), BranchExit::Loop));
                }
                Some(edge) => cur = edge.target.clone(),
                None => {
                    return Err(GraphShapeError::OpenEndedBranch {
                        node: machine.id.clone(),
                        label: label.to_string(),
                    });
                }
            }
        }
    }

    /// Resolves an each-node's single PROP edge as the per-item workflow.
    fn resolve_each(
        &self,
        node: &NodeRecord,
        trail: &mut Vec<String>,
    ) -> Result<Placeholder, GraphShapeError> {
        let mut props = self.graph.incoming(&node.id, RelationKind::Prop);
        let edge = props
            .next()
            .ok_or_else(|| GraphShapeError::MissingWorkflow {
                node: node.id.clone(),
            })?;
        let extra = props.count();
        if extra > 0 {
            return Err(GraphShapeError::AmbiguousExit {
                node: node.id.clone(),
                relation: RelationKind::Prop.to_string(),
                found: extra + 1,
            });
        }
        let workflow = self.resolve_upstream(&edge.source, trail)?;
        Ok(Placeholder::Each(EachPlaceholder {
            node: node.id.clone(),
            workflow: Box::new(workflow),
        }))
    }

    /// Resolves the chain that terminates at `tail`, walking incoming LINK
    /// edges upstream to the chain head and folding downstream from there.
    ///
    /// The walk stops extending at fan boundaries (map, branch), at nodes
    /// with zero or multiple predecessors, and at predecessors already on
    /// the current resolution path; those resolve themselves.
    fn resolve_upstream(
        &self,
        tail: &str,
        trail: &mut Vec<String>,
    ) -> Result<Placeholder, GraphShapeError> {
        let mut chain = vec![tail.to_string()];
        let mut cur = tail.to_string();
        loop {
            let node = self.graph.require(&cur)?;
            if matches!(node.shape, ShapeKind::Map | ShapeKind::Branch) {
                break;
            }
            let mut preds = self.graph.incoming(&cur, RelationKind::Link);
            let first = preds.next();
            let ambiguous = preds.next().is_some();
            match first {
                Some(edge) if !ambiguous => {
                    if chain.contains(&edge.source) {
                        return Err(GraphShapeError::UndeclaredCycle {
                            node: edge.source.clone(),
                        });
                    }
                    // A predecessor already on the resolution path was
                    // resolved there; the chain starts below it.
                    if trail.contains(&edge.source) {
                        break;
                    }
                    cur = edge.source.clone();
                    chain.push(cur.clone());
                }
                _ => break,
            }
        }
        chain.reverse();

        let mut sub_trail = trail.clone();
        let mut steps = Vec::with_capacity(chain.len());
        for id in &chain {
            sub_trail.push(id.clone());
            let node = self.graph.require(id)?;
            steps.push(self.resolve_node(node, &mut sub_trail)?);
        }
        Ok(Placeholder::fold_steps(steps))
    }

    /// Declared labels and edge keys must correlate index by index.
    fn check_label_keys(&self, node: &NodeRecord) -> Result<(), GraphShapeError> {
        if node.branch_labels.len() != node.edge_keys.len() {
            return Err(GraphShapeError::LabelKeyMismatch {
                node: node.id.clone(),
                labels: node.branch_labels.len(),
                keys: node.edge_keys.len(),
            });
        }
        Ok(())
    }

    /// Every actual edge key must be declared (or `"default"`), and no key
    /// may be claimed by more than one edge.
    fn check_declared_keys(
        &self,
        node: &NodeRecord,
        relation: RelationKind,
    ) -> Result<(), GraphShapeError> {
        let mut seen: Vec<&str> = Vec::new();
        for edge in self.graph.outgoing(&node.id, relation) {
            let key = edge.source_key.as_deref().unwrap_or("");
            let declared = key == DEFAULT_BRANCH_KEY || node.edge_keys.iter().any(|k| k == key);
            if !declared || seen.contains(&key) {
                return Err(GraphShapeError::UnmatchedBranchKey {
                    node: node.id.clone(),
                    label: "<undeclared>".to_string(),
                    key: key.to_string(),
                });
            }
            seen.push(key);
        }
        Ok(())
    }
}
