//! Per-query exclusion overlay over an immutable [`RoutingGraph`].
//!
//! All leaf-terminal nodes start excluded. A query restores exactly the
//! nodes it owns on its own [`MaskedView`], so the base graph is never
//! touched and views for different leaves can live side by side on
//! different threads.

use super::{Edge, NodeRole, RoutingGraph};
use crate::ids::{EdgeId, NodeId};
use ahash::AHashSet;

#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    excluded: AHashSet<NodeId>,
}

impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every node currently marked leaf-terminal.
    pub fn leaf_terminals(graph: &RoutingGraph) -> Self {
        Self {
            excluded: graph
                .nodes()
                .filter(|n| n.role == NodeRole::LeafTerminal)
                .map(|n| n.id)
                .collect(),
        }
    }

    pub fn mask(&mut self, nodes: impl IntoIterator<Item = NodeId>) {
        self.excluded.extend(nodes);
    }

    pub fn unmask(&mut self, node: NodeId) -> bool {
        self.excluded.remove(&node)
    }

    pub fn is_excluded(&self, node: NodeId) -> bool {
        self.excluded.contains(&node)
    }

    pub fn len(&self) -> usize {
        self.excluded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.excluded.is_empty()
    }

    pub fn view<'a>(&'a self, graph: &'a RoutingGraph) -> MaskedView<'a> {
        MaskedView {
            graph,
            excluded: self,
            restored: Vec::new(),
        }
    }
}

impl RoutingGraph {
    /// Read-only view with `excluded` (and every edge touching it) hidden.
    pub fn mask<'a>(&'a self, excluded: &'a ExclusionSet) -> MaskedView<'a> {
        excluded.view(self)
    }
}

/// A graph as one query sees it. An edge is visible iff both ends are.
#[derive(Debug, Clone)]
pub struct MaskedView<'a> {
    graph: &'a RoutingGraph,
    excluded: &'a ExclusionSet,
    restored: Vec<NodeId>,
}

impl<'a> MaskedView<'a> {
    pub fn graph(&self) -> &'a RoutingGraph {
        self.graph
    }

    /// Restore one node, and with it all of its original incident edges
    /// whose other end is visible. Repeating the call has no further effect.
    pub fn unmask(&mut self, node: NodeId) {
        if self.excluded.is_excluded(node) && !self.restored.contains(&node) {
            self.restored.push(node);
        }
    }

    /// Undo [`Self::unmask`].
    pub fn remask(&mut self, node: NodeId) {
        self.restored.retain(|n| *n != node);
    }

    pub fn contains_node(&self, node: NodeId) -> bool {
        self.graph.contains_node(node)
            && (!self.excluded.is_excluded(node) || self.restored.contains(&node))
    }

    pub fn is_edge_visible(&self, edge: &Edge) -> bool {
        self.contains_node(edge.a) && self.contains_node(edge.b)
    }

    /// Visible edges at `node` paired with the node on the other side.
    pub fn neighbors(&self, node: NodeId) -> impl Iterator<Item = (&'a Edge, NodeId)> + '_ {
        let graph = self.graph;
        let visible = self.contains_node(node);
        graph
            .incident(node)
            .iter()
            .filter(move |_| visible)
            .filter_map(move |e| graph.edge(*e))
            .filter(move |e| self.contains_node(e.other_end(node)))
            .map(move |e| (e, e.other_end(node)))
    }

    pub fn edges(&self) -> impl Iterator<Item = &'a Edge> + '_ {
        self.graph.edges().filter(move |e| self.is_edge_visible(e))
    }

    /// Sorted ids of every visible edge. Equal multisets mean equal views.
    pub fn visible_edge_multiset(&self) -> Vec<EdgeId> {
        let mut ids: Vec<EdgeId> = self.edges().map(|e| e.id).collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::{CostModel, SegmentCategory};
    use crate::graph::EdgeSpec;
    use geo::Coord;

    fn leaf_star() -> RoutingGraph {
        // 1 - 2 - 3 trunk, leaves 10 and 11 hang off 2, leaf 12 off 3
        let coords = [
            (1, 0.0, 0.0),
            (2, 10.0, 0.0),
            (3, 20.0, 0.0),
            (10, 10.0, 5.0),
            (11, 10.0, -5.0),
            (12, 20.0, 5.0),
        ];
        let nodes = coords.iter().map(|&(id, x, y)| {
            let role = if id >= 10 {
                NodeRole::LeafTerminal
            } else {
                NodeRole::Unassigned
            };
            (NodeId(id), Coord { x, y }, role)
        });
        let pairs = [(1, 2), (2, 3), (2, 10), (2, 11), (3, 12), (10, 11)];
        let edges = pairs.iter().map(|&(a, b)| EdgeSpec {
            a: NodeId(a),
            b: NodeId(b),
            category: if a >= 10 || b >= 10 {
                SegmentCategory::BuriedDrop
            } else {
                SegmentCategory::Underground
            },
            length: None,
            geometry: None,
        });
        RoutingGraph::build(CostModel::default(), 0.5, nodes, edges).unwrap()
    }

    #[test]
    fn test_leaf_terminals_hidden_by_default() {
        let graph = leaf_star();
        let exclusions = ExclusionSet::leaf_terminals(&graph);
        assert_eq!(exclusions.len(), 3);

        let view = graph.mask(&exclusions);
        assert!(!view.contains_node(NodeId(10)));
        assert_eq!(view.visible_edge_multiset(), vec![EdgeId(0), EdgeId(1)]);
    }

    #[test]
    fn test_unmask_restores_only_own_edges() {
        let graph = leaf_star();
        let exclusions = ExclusionSet::leaf_terminals(&graph);
        let mut view = graph.mask(&exclusions);

        view.unmask(NodeId(10));
        // 10-11 stays hidden because 11 is still excluded
        assert_eq!(
            view.visible_edge_multiset(),
            vec![EdgeId(0), EdgeId(1), EdgeId(2)]
        );
        let around_two: Vec<NodeId> = view.neighbors(NodeId(2)).map(|(_, n)| n).collect();
        assert_eq!(around_two, vec![NodeId(1), NodeId(3), NodeId(10)]);
    }

    #[test]
    fn test_restore_then_remask_is_idempotent() {
        let graph = leaf_star();
        let exclusions = ExclusionSet::leaf_terminals(&graph);
        let mut view = graph.mask(&exclusions);
        let initial = view.visible_edge_multiset();

        for _ in 0..3 {
            for leaf in [NodeId(10), NodeId(11), NodeId(12)] {
                view.unmask(leaf);
                view.unmask(leaf);
                view.remask(leaf);
                assert_eq!(view.visible_edge_multiset(), initial);
            }
        }

        // Base graph untouched
        assert_eq!(graph.edge_count(), 6);
    }

    #[test]
    fn test_independent_views_do_not_interfere() {
        let graph = leaf_star();
        let exclusions = ExclusionSet::leaf_terminals(&graph);

        let mut first = exclusions.view(&graph);
        let mut second = exclusions.view(&graph);
        first.unmask(NodeId(10));
        second.unmask(NodeId(12));

        assert!(first.contains_node(NodeId(10)));
        assert!(!first.contains_node(NodeId(12)));
        assert!(second.contains_node(NodeId(12)));
        assert!(!second.contains_node(NodeId(10)));
    }
}
