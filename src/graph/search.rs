use super::mask::MaskedView;
use crate::ids::{EdgeId, NodeId};
use ahash::AHashMap;
use ordered_float::OrderedFloat;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Copy, Clone, Eq, PartialEq)]
struct State {
    cost: OrderedFloat<f64>,
    node: NodeId,
}

// Min-heap on cost; ties settle the smaller node id first so results are
// reproducible.
impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Upper bound on settled nodes per search. `None` searches the whole component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchBudget {
    pub max_visits: Option<usize>,
}

impl SearchBudget {
    pub fn unlimited() -> Self {
        Self { max_visits: None }
    }

    pub fn visits(max_visits: usize) -> Self {
        Self {
            max_visits: Some(max_visits),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchExceeded {
    pub visited: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphPath {
    /// From the search origin to the reached node, both included.
    pub nodes: Vec<NodeId>,
    pub edges: Vec<EdgeId>,
    pub cost: f64,
}

impl GraphPath {
    pub fn trivial(node: NodeId) -> Self {
        Self {
            nodes: vec![node],
            edges: Vec::new(),
            cost: 0.0,
        }
    }

    pub fn target(&self) -> NodeId {
        self.nodes[self.nodes.len() - 1]
    }
}

pub type SearchResult = Result<Option<GraphPath>, SearchExceeded>;

/// Least-cost path between two nodes of the view, weighted by edge cost.
pub fn shortest_path(view: &MaskedView<'_>, from: NodeId, to: NodeId, budget: SearchBudget) -> SearchResult {
    if !view.contains_node(to) {
        return Ok(None);
    }
    shortest_path_to_any(view, from, |n| n == to, budget)
}

/// Least-cost path from `from` to whichever target settles first.
pub fn shortest_path_to_any(
    view: &MaskedView<'_>,
    from: NodeId,
    is_target: impl Fn(NodeId) -> bool,
    budget: SearchBudget,
) -> SearchResult {
    if !view.contains_node(from) {
        return Ok(None);
    }
    if is_target(from) {
        return Ok(Some(GraphPath::trivial(from)));
    }

    let mut heap = BinaryHeap::new();
    let mut dist: AHashMap<NodeId, f64> = AHashMap::new();
    let mut prev: AHashMap<NodeId, (NodeId, EdgeId)> = AHashMap::new();
    let mut visited = 0usize;

    dist.insert(from, 0.0);
    heap.push(State {
        cost: OrderedFloat(0.0),
        node: from,
    });

    while let Some(State { cost, node }) = heap.pop() {
        let cost = cost.0;

        // Stale entry
        if dist.get(&node).is_some_and(|d| cost > *d) {
            continue;
        }

        if is_target(node) {
            return Ok(Some(rebuild(&prev, from, node, cost)));
        }

        visited += 1;
        if budget.max_visits.is_some_and(|max| visited > max) {
            return Err(SearchExceeded { visited });
        }

        for (edge, next) in view.neighbors(node) {
            let next_cost = cost + edge.cost;
            let better = dist.get(&next).is_none_or(|d| next_cost < *d);
            if better {
                dist.insert(next, next_cost);
                prev.insert(next, (node, edge.id));
                heap.push(State {
                    cost: OrderedFloat(next_cost),
                    node: next,
                });
            }
        }
    }

    Ok(None)
}

fn rebuild(
    prev: &AHashMap<NodeId, (NodeId, EdgeId)>,
    from: NodeId,
    reached: NodeId,
    cost: f64,
) -> GraphPath {
    let mut nodes = vec![reached];
    let mut edges = Vec::new();
    let mut current = reached;

    while current != from {
        match prev.get(&current) {
            Some(&(p, e)) => {
                edges.push(e);
                nodes.push(p);
                current = p;
            }
            None => break,
        }
    }

    nodes.reverse();
    edges.reverse();
    GraphPath { nodes, edges, cost }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::{CostModel, CostRates, SegmentCategory};
    use crate::graph::mask::ExclusionSet;
    use crate::graph::{EdgeSpec, NodeRole, RoutingGraph};
    use geo::Coord;

    fn unit_rates() -> CostModel {
        CostModel::new(CostRates {
            underground: 1.0,
            aerial: 1.0,
            aerial_drop: 1.0,
            buried_drop: 1.0,
            transition: 1.0,
        })
    }

    fn spec(a: u64, b: u64, length: f64) -> EdgeSpec {
        EdgeSpec {
            a: NodeId(a),
            b: NodeId(b),
            category: SegmentCategory::Underground,
            length: Some(length),
            geometry: None,
        }
    }

    fn triangle() -> RoutingGraph {
        // A=1, B=2, C=3
        let nodes = vec![
            (NodeId(1), Coord { x: 0.0, y: 0.0 }, NodeRole::LeafTerminal),
            (NodeId(2), Coord { x: 5.0, y: 3.0 }, NodeRole::Unassigned),
            (NodeId(3), Coord { x: 10.0, y: 0.0 }, NodeRole::HubAdjacent),
        ];
        let edges = vec![spec(1, 2, 5.0), spec(2, 3, 5.0), spec(1, 3, 20.0)];
        RoutingGraph::build(unit_rates(), 0.1, nodes, edges).unwrap()
    }

    #[test]
    fn test_prefers_cheaper_two_hop_path() {
        let graph = triangle();
        let exclusions = ExclusionSet::leaf_terminals(&graph);
        let mut view = graph.mask(&exclusions);
        view.unmask(NodeId(1));

        let path = shortest_path(&view, NodeId(1), NodeId(3), SearchBudget::unlimited())
            .unwrap()
            .expect("reachable");
        assert_eq!(path.nodes, vec![NodeId(1), NodeId(2), NodeId(3)]);
        assert_eq!(path.edges, vec![EdgeId(0), EdgeId(1)]);
        assert!((path.cost - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_masked_origin_is_unreachable() {
        let graph = triangle();
        let exclusions = ExclusionSet::leaf_terminals(&graph);
        let view = graph.mask(&exclusions);

        let result = shortest_path(&view, NodeId(1), NodeId(3), SearchBudget::unlimited()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_search_never_transits_excluded_nodes() {
        // 1 - 2 - 3 is cheap but 2 is another leaf's terminal; 1 - 4 - 3 is dear
        let nodes = vec![
            (NodeId(1), Coord { x: 0.0, y: 0.0 }, NodeRole::LeafTerminal),
            (NodeId(2), Coord { x: 1.0, y: 0.0 }, NodeRole::LeafTerminal),
            (NodeId(3), Coord { x: 2.0, y: 0.0 }, NodeRole::Unassigned),
            (NodeId(4), Coord { x: 1.0, y: 9.0 }, NodeRole::Unassigned),
        ];
        let edges = vec![spec(1, 2, 1.0), spec(2, 3, 1.0), spec(1, 4, 9.0), spec(4, 3, 9.0)];
        let graph = RoutingGraph::build(unit_rates(), 0.1, nodes, edges).unwrap();
        let exclusions = ExclusionSet::leaf_terminals(&graph);
        let mut view = graph.mask(&exclusions);
        view.unmask(NodeId(1));

        let path = shortest_path(&view, NodeId(1), NodeId(3), SearchBudget::unlimited())
            .unwrap()
            .expect("detour exists");
        assert_eq!(path.nodes, vec![NodeId(1), NodeId(4), NodeId(3)]);
        assert!((path.cost - 18.0).abs() < 1e-9);
    }

    #[test]
    fn test_to_any_returns_first_settled_target() {
        let graph = triangle();
        let exclusions = ExclusionSet::new();
        let view = graph.mask(&exclusions);

        let path = shortest_path_to_any(
            &view,
            NodeId(1),
            |n| n == NodeId(2) || n == NodeId(3),
            SearchBudget::unlimited(),
        )
        .unwrap()
        .expect("reachable");
        assert_eq!(path.target(), NodeId(2));
        assert!((path.cost - 5.0).abs() < 1e-9);

        let same = shortest_path(&view, NodeId(3), NodeId(3), SearchBudget::unlimited())
            .unwrap()
            .expect("trivial");
        assert_eq!(same, GraphPath::trivial(NodeId(3)));
    }

    #[test]
    fn test_budget_exhaustion_is_reported() {
        let nodes = (1..=20).map(|i| (NodeId(i), Coord { x: i as f64, y: 0.0 }, NodeRole::Unassigned));
        let edges: Vec<EdgeSpec> = (1..20).map(|i| spec(i, i + 1, 1.0)).collect();
        let graph = RoutingGraph::build(unit_rates(), 0.1, nodes, edges).unwrap();
        let exclusions = ExclusionSet::new();
        let view = graph.mask(&exclusions);

        let err = shortest_path(&view, NodeId(1), NodeId(20), SearchBudget::visits(5)).unwrap_err();
        assert_eq!(err.visited, 6);

        let ok = shortest_path(&view, NodeId(1), NodeId(20), SearchBudget::visits(50)).unwrap();
        assert!(ok.is_some());
    }
}
