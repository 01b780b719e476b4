use crate::graph::search::GraphPath;
use crate::graph::{Edge, RoutingGraph};
use crate::ids::{EdgeId, HubId, NodeId};
use std::collections::BTreeMap;

/// Union of committed leaf-to-hub paths. Every edge and node belongs to the
/// first hub that claimed it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceNetwork {
    edges: BTreeMap<EdgeId, HubId>,
    nodes: BTreeMap<NodeId, HubId>,
}

impl ServiceNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when another hub already owns the edge.
    pub fn claim_edge(&mut self, edge: EdgeId, hub: HubId) -> bool {
        *self.edges.entry(edge).or_insert(hub) == hub
    }

    pub fn claim_node(&mut self, node: NodeId, hub: HubId) -> bool {
        *self.nodes.entry(node).or_insert(hub) == hub
    }

    pub fn claim_path(&mut self, path: &GraphPath, hub: HubId) {
        for &edge in &path.edges {
            self.claim_edge(edge, hub);
        }
        for &node in &path.nodes {
            self.claim_node(node, hub);
        }
    }

    /// Fold `other` in. Entries already present keep their owner.
    pub fn absorb(&mut self, other: ServiceNetwork) {
        for (edge, hub) in other.edges {
            self.edges.entry(edge).or_insert(hub);
        }
        for (node, hub) in other.nodes {
            self.nodes.entry(node).or_insert(hub);
        }
    }

    pub fn owner(&self, edge: EdgeId) -> Option<HubId> {
        self.edges.get(&edge).copied()
    }

    pub fn contains_edge(&self, edge: EdgeId) -> bool {
        self.edges.contains_key(&edge)
    }

    pub fn touches_node(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty() && self.nodes.is_empty()
    }

    pub fn edges_of(&self, hub: HubId) -> impl Iterator<Item = EdgeId> + '_ {
        self.edges
            .iter()
            .filter(move |(_, h)| **h == hub)
            .map(|(e, _)| *e)
    }

    /// Owned edges resolved against the graph they were routed on.
    pub fn resolve<'g>(&'g self, graph: &'g RoutingGraph) -> impl Iterator<Item = (&'g Edge, HubId)> + 'g {
        self.edges
            .iter()
            .filter_map(move |(e, h)| graph.edge(*e).map(|edge| (edge, *h)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(nodes: &[u64], edges: &[usize]) -> GraphPath {
        GraphPath {
            nodes: nodes.iter().map(|n| NodeId(*n)).collect(),
            edges: edges.iter().map(|e| EdgeId(*e)).collect(),
            cost: 0.0,
        }
    }

    #[test]
    fn test_first_writer_owns_shared_edges() {
        let mut network = ServiceNetwork::new();
        network.claim_path(&path(&[1, 2, 3], &[10, 11]), HubId(1));
        network.claim_path(&path(&[4, 2, 3], &[12, 11]), HubId(2));

        assert_eq!(network.owner(EdgeId(11)), Some(HubId(1)));
        assert_eq!(network.owner(EdgeId(12)), Some(HubId(2)));
        assert_eq!(network.edge_count(), 3);
        assert_eq!(network.edges_of(HubId(1)).count(), 2);
    }

    #[test]
    fn test_absorb_keeps_existing_owner() {
        let mut first = ServiceNetwork::new();
        first.claim_path(&path(&[1, 2], &[5]), HubId(1));
        let mut second = ServiceNetwork::new();
        second.claim_path(&path(&[2, 3], &[5]), HubId(2));

        first.absorb(second);
        assert_eq!(first.owner(EdgeId(5)), Some(HubId(1)));
        assert!(first.touches_node(NodeId(3)));
    }

    #[test]
    fn test_trivial_path_touches_its_node() {
        let mut network = ServiceNetwork::new();
        network.claim_path(&GraphPath::trivial(NodeId(9)), HubId(4));
        assert!(network.touches_node(NodeId(9)));
        assert_eq!(network.edge_count(), 0);
    }
}
