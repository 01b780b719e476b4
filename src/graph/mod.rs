// ===========================================================================
// Routing graph: plant locations joined by priced cable segments
// ===========================================================================
pub mod mask;
pub mod search;

use crate::cost::{CostModel, SegmentCategory};
use crate::error::{GeometryIssue, PlanError, Result};
use crate::geometry::{
    clean_polyline, coord_is_finite, planar_distance, polyline_length, project_onto_polyline,
    split_polyline,
};
use crate::ids::{EdgeId, NodeId};
use crate::spatial::{PointIndex, SegmentIndex};
use ahash::AHashMap;
use geo::{Coord, LineString};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum NodeRole {
    #[default]
    Unassigned,
    HubAdjacent,
    /// Private attachment point of a leaf. Hidden from other leaves' searches.
    LeafTerminal,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub coord: Coord<f64>,
    pub role: NodeRole,
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub id: EdgeId,
    pub a: NodeId,
    pub b: NodeId,
    pub category: SegmentCategory,
    pub length: f64,
    pub cost: f64,
    pub geometry: LineString<f64>,
}

impl Edge {
    pub fn other_end(&self, node: NodeId) -> NodeId {
        if self.a == node { self.b } else { self.a }
    }

    pub fn touches(&self, node: NodeId) -> bool {
        self.a == node || self.b == node
    }
}

/// Edge description used by [`RoutingGraph::build`] when endpoints are
/// already known by id.
#[derive(Debug, Clone)]
pub struct EdgeSpec {
    pub a: NodeId,
    pub b: NodeId,
    pub category: SegmentCategory,
    /// Taken from the geometry (or the straight line between endpoints) when absent.
    pub length: Option<f64>,
    pub geometry: Option<LineString<f64>>,
}

pub struct RoutingGraph {
    nodes: BTreeMap<NodeId, Node>,
    // Split edges leave a `None` behind so ids stay stable
    edges: Vec<Option<Edge>>,
    adjacency: AHashMap<NodeId, Vec<EdgeId>>,
    node_index: PointIndex<NodeId>,
    edge_index: SegmentIndex<EdgeId>,
    cost_model: CostModel,
    epsilon: f64,
    next_node_id: u64,
}

impl std::fmt::Debug for RoutingGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingGraph")
            .field("nodes", &self.node_count())
            .field("edges", &self.edge_count())
            .finish()
    }
}

impl RoutingGraph {
    pub fn new(cost_model: CostModel, coincidence_epsilon: f64) -> Self {
        Self {
            nodes: BTreeMap::new(),
            edges: Vec::new(),
            adjacency: AHashMap::new(),
            node_index: PointIndex::new(),
            edge_index: SegmentIndex::new(),
            cost_model,
            epsilon: coincidence_epsilon,
            next_node_id: 1,
        }
    }

    /// Build from explicit nodes and edges. Any edge naming a node that is not
    /// in `nodes` fails the whole build with `MalformedSegment`.
    pub fn build(
        cost_model: CostModel,
        coincidence_epsilon: f64,
        nodes: impl IntoIterator<Item = (NodeId, Coord<f64>, NodeRole)>,
        edges: impl IntoIterator<Item = EdgeSpec>,
    ) -> Result<Self> {
        let mut graph = Self::new(cost_model, coincidence_epsilon);

        for (id, coord, role) in nodes {
            graph.insert_node(id, coord, role);
        }

        for (segment, spec) in edges.into_iter().enumerate() {
            for endpoint in [spec.a, spec.b] {
                if !graph.nodes.contains_key(&endpoint) {
                    return Err(PlanError::MalformedSegment {
                        segment,
                        node: endpoint,
                    });
                }
            }

            let a_coord = graph.nodes[&spec.a].coord;
            let b_coord = graph.nodes[&spec.b].coord;
            let geometry = match spec.geometry {
                Some(mut g) => {
                    // Stored geometry always runs a -> b; records drawn b -> a are flipped.
                    if let Some(first) = g.0.first().copied() {
                        if planar_distance(first, b_coord) < planar_distance(first, a_coord) {
                            g.0.reverse();
                        }
                    }
                    g
                }
                None => LineString::new(vec![a_coord, b_coord]),
            };
            let length = spec
                .length
                .filter(|l| l.is_finite() && *l >= 0.0)
                .unwrap_or_else(|| polyline_length(&geometry));

            graph.insert_edge(spec.a, spec.b, spec.category, length, geometry);
        }

        Ok(graph)
    }

    fn insert_node(&mut self, id: NodeId, coord: Coord<f64>, role: NodeRole) {
        if let Some(previous) = self.nodes.insert(id, Node { id, coord, role }) {
            self.node_index.remove(previous.coord, id);
        }
        self.node_index.insert(coord, id);
        self.adjacency.entry(id).or_default();
        self.next_node_id = self.next_node_id.max(id.0 + 1);
    }

    /// Node at `coord`, reusing any existing node within the coincidence
    /// epsilon (lowest id wins when several qualify).
    pub fn intern_node(&mut self, coord: Coord<f64>) -> NodeId {
        let existing = self
            .node_index
            .within(coord, self.epsilon)
            .into_iter()
            .map(|(_, id)| *id)
            .min();

        if let Some(id) = existing {
            return id;
        }

        let id = NodeId(self.next_node_id);
        self.insert_node(id, coord, NodeRole::Unassigned);
        id
    }

    /// Fresh node at `coord` that never merges with its neighbours.
    pub fn add_node(&mut self, coord: Coord<f64>, role: NodeRole) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.insert_node(id, coord, role);
        id
    }

    fn insert_edge(
        &mut self,
        a: NodeId,
        b: NodeId,
        category: SegmentCategory,
        length: f64,
        geometry: LineString<f64>,
    ) -> EdgeId {
        let id = EdgeId(self.edges.len());
        let cost = self.cost_model.cost(category, length);

        self.edge_index.insert_line(&geometry, id);
        self.adjacency.entry(a).or_default().push(id);
        if a != b {
            self.adjacency.entry(b).or_default().push(id);
        }
        self.edges.push(Some(Edge {
            id,
            a,
            b,
            category,
            length,
            cost,
            geometry,
        }));
        id
    }

    /// Ingest one polyline as an edge between its first and last vertex.
    pub fn add_segment(
        &mut self,
        line: &LineString<f64>,
        category: SegmentCategory,
    ) -> std::result::Result<EdgeId, GeometryIssue> {
        if !line.0.iter().all(|c| coord_is_finite(*c)) {
            return Err(GeometryIssue::NonFinite);
        }
        let line = clean_polyline(line).ok_or(GeometryIssue::Degenerate)?;

        let first = line.0[0];
        let last = line.0[line.0.len() - 1];
        let a = self.intern_node(first);
        let b = self.intern_node(last);
        if a == b {
            return Err(GeometryIssue::Degenerate);
        }

        let length = polyline_length(&line);
        Ok(self.insert_edge(a, b, category, length, line))
    }

    /// Straight edge between two existing nodes.
    pub fn connect(&mut self, a: NodeId, b: NodeId, category: SegmentCategory) -> Option<EdgeId> {
        if a == b {
            return None;
        }
        let start = self.nodes.get(&a)?.coord;
        let end = self.nodes.get(&b)?.coord;
        let geometry = LineString::new(vec![start, end]);
        let length = planar_distance(start, end);
        Some(self.insert_edge(a, b, category, length, geometry))
    }

    /// Replace `edge` by two edges meeting at the projection of `at`, and
    /// return the node at the cut. A cut within epsilon of an endpoint
    /// returns that endpoint and leaves the edge alone.
    pub fn split_edge(&mut self, edge: EdgeId, at: Coord<f64>) -> Result<NodeId> {
        let (a, b, category, length, geometry) = {
            let e = self.edge(edge).ok_or(PlanError::UnknownEdge(edge))?;
            (e.a, e.b, e.category, e.length, e.geometry.clone())
        };

        let a_coord = self.nodes[&a].coord;
        let b_coord = self.nodes[&b].coord;

        let Some(projection) = project_onto_polyline(&geometry, at) else {
            return Ok(a);
        };
        if planar_distance(projection.point, a_coord) <= self.epsilon {
            return Ok(a);
        }
        if planar_distance(projection.point, b_coord) <= self.epsilon {
            return Ok(b);
        }

        let Some((head, tail)) = split_polyline(&geometry, projection.distance_along) else {
            return Ok(a);
        };

        let cut = self.intern_node(projection.point);
        if cut == a || cut == b {
            return Ok(cut);
        }

        self.retire_edge(edge);

        // Scale so the halves add up to the recorded length even when it came
        // from an attribute rather than the geometry.
        let head_len = polyline_length(&head);
        let tail_len = polyline_length(&tail);
        let scale = if head_len + tail_len > 0.0 {
            length / (head_len + tail_len)
        } else {
            1.0
        };

        self.insert_edge(a, cut, category, head_len * scale, head);
        self.insert_edge(cut, b, category, tail_len * scale, tail);

        Ok(cut)
    }

    fn retire_edge(&mut self, edge: EdgeId) {
        let Some(old) = self.edges.get_mut(edge.0).and_then(Option::take) else {
            return;
        };
        self.edge_index.remove_line(&old.geometry, edge);
        for end in [old.a, old.b] {
            if let Some(list) = self.adjacency.get_mut(&end) {
                list.retain(|e| *e != edge);
            }
        }
    }

    pub fn cost_model(&self) -> &CostModel {
        &self.cost_model
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn set_role(&mut self, id: NodeId, role: NodeRole) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.role = role;
        }
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.0).and_then(Option::as_ref)
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter().flatten()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.iter().flatten().count()
    }

    pub fn incident(&self, node: NodeId) -> &[EdgeId] {
        self.adjacency.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn nearest_node_where(
        &self,
        coord: Coord<f64>,
        eligible: impl Fn(&Node) -> bool,
    ) -> Option<(NodeId, f64)> {
        self.node_index
            .nearest_where(coord, |id| self.nodes.get(id).is_some_and(&eligible))
            .map(|(id, d)| (*id, d))
    }

    /// Nodes within `radius` of `coord`, closest first.
    pub fn nodes_within(&self, coord: Coord<f64>, radius: f64) -> Vec<(NodeId, f64)> {
        let mut hits: Vec<(NodeId, f64)> = self
            .node_index
            .within(coord, radius)
            .into_iter()
            .map(|(c, id)| (*id, planar_distance(c, coord)))
            .collect();
        hits.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        hits
    }

    pub fn nearest_node(&self, coord: Coord<f64>) -> Option<(NodeId, f64)> {
        self.node_index.nearest(coord).map(|(id, d)| (*id, d))
    }

    pub fn nearest_edge_where(
        &self,
        coord: Coord<f64>,
        max_distance: Option<f64>,
        eligible: impl Fn(&Edge) -> bool,
    ) -> Option<(EdgeId, f64)> {
        self.edge_index
            .nearest_where(coord, max_distance, |id| self.edge(*id).is_some_and(&eligible))
            .map(|(id, d)| (*id, d))
    }

    /// Connected components, each sorted, largest first.
    pub fn connected_components(&self) -> Vec<Vec<NodeId>> {
        let mut seen: ahash::AHashSet<NodeId> = ahash::AHashSet::new();
        let mut components = Vec::new();

        for &start in self.nodes.keys() {
            if !seen.insert(start) {
                continue;
            }
            let mut component = vec![start];
            let mut queue = VecDeque::from([start]);

            while let Some(current) = queue.pop_front() {
                for &e in self.incident(current) {
                    if let Some(edge) = self.edge(e) {
                        let next = edge.other_end(current);
                        if seen.insert(next) {
                            component.push(next);
                            queue.push_back(next);
                        }
                    }
                }
            }

            component.sort();
            components.push(component);
        }

        components.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a[0].cmp(&b[0])));
        components
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::CostRates;

    fn ls(points: &[(f64, f64)]) -> LineString<f64> {
        LineString::new(points.iter().map(|&(x, y)| Coord { x, y }).collect())
    }

    fn graph() -> RoutingGraph {
        RoutingGraph::new(CostModel::new(CostRates::default()), 2.0)
    }

    #[test]
    fn test_coincident_endpoints_merge() {
        let mut g = graph();
        g.add_segment(&ls(&[(0.0, 0.0), (100.0, 0.0)]), SegmentCategory::Underground)
            .unwrap();
        assert_eq!(g.node_count(), 2);

        // Starts 1.5 units away from the previous end, inside epsilon 2.0
        g.add_segment(&ls(&[(101.0, 1.0), (200.0, 0.0)]), SegmentCategory::Underground)
            .unwrap();
        assert_eq!(g.node_count(), 3);

        // Outside epsilon: a fresh node
        g.add_segment(&ls(&[(205.0, 0.0), (300.0, 0.0)]), SegmentCategory::Underground)
            .unwrap();
        assert_eq!(g.node_count(), 5);
    }

    #[test]
    fn test_degenerate_segments_are_rejected() {
        let mut g = graph();
        assert_eq!(
            g.add_segment(&ls(&[(0.0, 0.0), (0.0, 0.0)]), SegmentCategory::Aerial),
            Err(GeometryIssue::Degenerate)
        );
        assert_eq!(
            g.add_segment(&ls(&[(0.0, 0.0), (1.0, 0.5)]), SegmentCategory::Aerial),
            Err(GeometryIssue::Degenerate)
        );
        assert_eq!(
            g.add_segment(&ls(&[(0.0, f64::NAN), (10.0, 0.0)]), SegmentCategory::Aerial),
            Err(GeometryIssue::NonFinite)
        );
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn test_build_rejects_missing_endpoint() {
        let nodes = vec![
            (NodeId(1), Coord { x: 0.0, y: 0.0 }, NodeRole::Unassigned),
            (NodeId(2), Coord { x: 10.0, y: 0.0 }, NodeRole::Unassigned),
        ];
        let edges = vec![
            EdgeSpec {
                a: NodeId(1),
                b: NodeId(2),
                category: SegmentCategory::Aerial,
                length: None,
                geometry: None,
            },
            EdgeSpec {
                a: NodeId(2),
                b: NodeId(9),
                category: SegmentCategory::Aerial,
                length: None,
                geometry: None,
            },
        ];

        let err = RoutingGraph::build(CostModel::default(), 2.0, nodes, edges)
            .err()
            .expect("should fail");
        match err {
            PlanError::MalformedSegment { segment, node } => {
                assert_eq!(segment, 1);
                assert_eq!(node, NodeId(9));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_edge_cost_follows_rates() {
        let mut g = graph();
        g.add_segment(&ls(&[(0.0, 0.0), (3.0, 4.0), (3.0, 10.0)]), SegmentCategory::Underground)
            .unwrap();
        g.add_segment(&ls(&[(50.0, 0.0), (60.0, 0.0)]), SegmentCategory::Aerial)
            .unwrap();

        let rates = CostRates::default();
        for edge in g.edges() {
            assert!((edge.cost - rates.rate(edge.category) * edge.length).abs() < 1e-6);
        }
        let first = g.edges().next().unwrap();
        assert!((first.length - 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_split_preserves_length_and_rederives_cost() {
        let mut g = graph();
        let e = g
            .add_segment(&ls(&[(0.0, 0.0), (100.0, 0.0)]), SegmentCategory::Underground)
            .unwrap();
        let original_len = g.edge(e).unwrap().length;

        let cut = g.split_edge(e, Coord { x: 40.0, y: 30.0 }).unwrap();
        assert!(g.edge(e).is_none());
        assert_eq!(g.edge_count(), 2);
        assert_eq!(g.incident(cut).len(), 2);

        let total: f64 = g.edges().map(|e| e.length).sum();
        assert!((total - original_len).abs() < 1e-9);

        let model = g.cost_model().clone();
        for edge in g.edges() {
            assert!((edge.cost - model.cost(edge.category, edge.length)).abs() < 1e-6);
        }
        let cut_coord = g.node(cut).unwrap().coord;
        assert!((cut_coord.x - 40.0).abs() < 1e-9);
        assert!(cut_coord.y.abs() < 1e-9);
    }

    #[test]
    fn test_split_near_endpoint_reuses_it() {
        let mut g = graph();
        let e = g
            .add_segment(&ls(&[(0.0, 0.0), (100.0, 0.0)]), SegmentCategory::Underground)
            .unwrap();
        let far_end = g.edge(e).unwrap().b;

        let cut = g.split_edge(e, Coord { x: 99.0, y: 5.0 }).unwrap();
        assert_eq!(cut, far_end);
        assert!(g.edge(e).is_some());
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn test_split_of_edge_drawn_end_to_start() {
        let nodes = vec![
            (NodeId(1), Coord { x: 0.0, y: 0.0 }, NodeRole::Unassigned),
            (NodeId(2), Coord { x: 100.0, y: 0.0 }, NodeRole::Unassigned),
        ];
        let edges = vec![EdgeSpec {
            a: NodeId(1),
            b: NodeId(2),
            category: SegmentCategory::Underground,
            length: None,
            geometry: Some(ls(&[(100.0, 0.0), (0.0, 0.0)])),
        }];
        let mut g = RoutingGraph::build(CostModel::default(), 2.0, nodes, edges).unwrap();

        let stored = g.edge(EdgeId(0)).unwrap();
        assert_eq!(stored.geometry.0[0], Coord { x: 0.0, y: 0.0 });

        let cut = g.split_edge(EdgeId(0), Coord { x: 10.0, y: 5.0 }).unwrap();
        assert_eq!(g.edge_count(), 2);

        let model = g.cost_model().clone();
        for edge in g.edges() {
            let a = g.node(edge.a).unwrap().coord;
            let b = g.node(edge.b).unwrap().coord;
            assert!((edge.length - planar_distance(a, b)).abs() < 1e-9);
            assert_eq!(edge.geometry.0[0], a);
            assert!((edge.cost - model.cost(edge.category, edge.length)).abs() < 1e-6);
        }
        let head = g.edges().find(|e| e.a == NodeId(1)).unwrap();
        assert_eq!(head.b, cut);
        assert!((head.length - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_connected_components() {
        let mut g = graph();
        g.add_segment(&ls(&[(0.0, 0.0), (10.0, 0.0)]), SegmentCategory::Aerial)
            .unwrap();
        g.add_segment(&ls(&[(10.0, 0.0), (20.0, 0.0)]), SegmentCategory::Aerial)
            .unwrap();
        g.add_segment(&ls(&[(500.0, 0.0), (510.0, 0.0)]), SegmentCategory::Aerial)
            .unwrap();

        let components = g.connected_components();
        assert_eq!(components.len(), 2);
        assert_eq!(components[0].len(), 3);
        assert_eq!(components[1].len(), 2);
    }
}
