use crate::cost::SegmentCategory;
use crate::error::{PlanError, Result};
use crate::geometry::project_onto_polyline;
use crate::graph::{NodeRole, RoutingGraph};
use crate::ids::{HubId, NodeId};
use geo::Coord;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Where a hub center lands on the routing graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HubSnap {
    /// Nearest node that is not a leaf terminal.
    #[default]
    NearestNode,
    /// Nearest point on an underground or aerial run, splitting it if needed.
    NearestRoad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    pub node: NodeId,
    /// A new node joined to the graph by a Transition edge.
    pub synthesized: bool,
}

fn eligible(graph: &RoutingGraph, node: NodeId) -> bool {
    graph
        .node(node)
        .is_some_and(|n| n.role != NodeRole::LeafTerminal)
}

/// Snap a hub center onto the graph and mark the result hub-adjacent.
pub fn snap_anchor(
    graph: &mut RoutingGraph,
    hub: HubId,
    center: Coord<f64>,
    mode: HubSnap,
    tolerance: f64,
) -> Result<Anchor> {
    let anchor = match mode {
        HubSnap::NearestNode => snap_to_node(graph, hub, center, tolerance)?,
        HubSnap::NearestRoad => match snap_to_road(graph, center, tolerance)? {
            Some(anchor) => anchor,
            None => snap_to_node(graph, hub, center, tolerance)?,
        },
    };

    graph.set_role(anchor.node, NodeRole::HubAdjacent);
    Ok(anchor)
}

fn snap_to_node(
    graph: &mut RoutingGraph,
    hub: HubId,
    center: Coord<f64>,
    tolerance: f64,
) -> Result<Anchor> {
    let (nearest, distance) = graph
        .nearest_node_where(center, |n| n.role != NodeRole::LeafTerminal)
        .ok_or(PlanError::NoEligibleAnchor(hub))?;

    if distance <= tolerance {
        return Ok(Anchor {
            node: nearest,
            synthesized: false,
        });
    }

    let node = graph.add_node(center, NodeRole::HubAdjacent);
    graph.connect(node, nearest, SegmentCategory::Transition);
    debug!(hub = %hub, node = %node, joined_to = %nearest, distance, "synthesized hub anchor");

    Ok(Anchor {
        node,
        synthesized: true,
    })
}

fn snap_to_road(
    graph: &mut RoutingGraph,
    center: Coord<f64>,
    tolerance: f64,
) -> Result<Option<Anchor>> {
    let Some((edge_id, _)) = graph.nearest_edge_where(center, None, |e| e.category.is_road()) else {
        return Ok(None);
    };
    let Some(projection) = graph
        .edge(edge_id)
        .and_then(|e| project_onto_polyline(&e.geometry, center))
    else {
        return Ok(None);
    };

    // An existing node close to the landing point is reused as is
    if let Some((existing, _)) = graph
        .nodes_within(projection.point, tolerance)
        .into_iter()
        .find(|(id, _)| eligible(graph, *id))
    {
        return Ok(Some(Anchor {
            node: existing,
            synthesized: false,
        }));
    }

    // The cut would merge into a leaf terminal and run the road through it
    if graph
        .nodes_within(projection.point, graph.epsilon())
        .into_iter()
        .any(|(id, _)| !eligible(graph, id))
    {
        return Ok(None);
    }

    let node = graph.split_edge(edge_id, projection.point)?;
    if !eligible(graph, node) {
        return Ok(None);
    }
    Ok(Some(Anchor {
        node,
        synthesized: false,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::CostModel;
    use geo::LineString;

    fn road_graph() -> RoutingGraph {
        let mut g = RoutingGraph::new(CostModel::default(), 1.0);
        g.add_segment(
            &LineString::new(vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 100.0, y: 0.0 }]),
            SegmentCategory::Underground,
        )
        .unwrap();
        g
    }

    #[test]
    fn test_nearest_node_within_tolerance() {
        let mut g = road_graph();
        let anchor = snap_anchor(&mut g, HubId(1), Coord { x: 95.0, y: 3.0 }, HubSnap::NearestNode, 10.0).unwrap();

        assert!(!anchor.synthesized);
        assert_eq!(g.node(anchor.node).unwrap().coord, Coord { x: 100.0, y: 0.0 });
        assert_eq!(g.node(anchor.node).unwrap().role, NodeRole::HubAdjacent);
        assert_eq!(g.node_count(), 2);
    }

    #[test]
    fn test_far_center_gets_synthesized_anchor() {
        let mut g = road_graph();
        let anchor = snap_anchor(&mut g, HubId(1), Coord { x: 50.0, y: 40.0 }, HubSnap::NearestNode, 10.0).unwrap();

        assert!(anchor.synthesized);
        assert_eq!(g.node_count(), 3);
        let transition = g
            .edges()
            .find(|e| e.category == SegmentCategory::Transition)
            .expect("transition edge");
        assert!(transition.touches(anchor.node));
    }

    #[test]
    fn test_road_mode_splits_run() {
        let mut g = road_graph();
        let anchor = snap_anchor(&mut g, HubId(2), Coord { x: 50.0, y: 40.0 }, HubSnap::NearestRoad, 5.0).unwrap();

        let coord = g.node(anchor.node).unwrap().coord;
        assert!((coord.x - 50.0).abs() < 1e-9);
        assert!(coord.y.abs() < 1e-9);
        assert_eq!(g.edge_count(), 2);
        assert!(g.edges().all(|e| e.category == SegmentCategory::Underground));
    }

    #[test]
    fn test_road_mode_reuses_node_near_landing_point() {
        let mut g = road_graph();
        let anchor = snap_anchor(&mut g, HubId(4), Coord { x: 97.0, y: 3.0 }, HubSnap::NearestRoad, 5.0).unwrap();

        assert!(!anchor.synthesized);
        assert_eq!(g.node(anchor.node).unwrap().coord, Coord { x: 100.0, y: 0.0 });
        assert_eq!(g.node(anchor.node).unwrap().role, NodeRole::HubAdjacent);
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn test_road_mode_never_cuts_through_leaf_terminal() {
        let mut g = road_graph();
        let terminal = g.add_node(Coord { x: 50.0, y: 0.5 }, NodeRole::LeafTerminal);

        let anchor = snap_anchor(&mut g, HubId(5), Coord { x: 50.0, y: 40.0 }, HubSnap::NearestRoad, 5.0).unwrap();

        assert_ne!(anchor.node, terminal);
        assert!(g.incident(terminal).is_empty());
        let roads: Vec<_> = g
            .edges()
            .filter(|e| e.category == SegmentCategory::Underground)
            .collect();
        assert_eq!(roads.len(), 1);
        assert!((roads[0].length - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_only_leaf_terminals_is_an_error() {
        let mut g = road_graph();
        let ids: Vec<NodeId> = g.nodes().map(|n| n.id).collect();
        for id in ids {
            g.set_role(id, NodeRole::LeafTerminal);
        }
        let err = snap_anchor(&mut g, HubId(3), Coord { x: 0.0, y: 0.0 }, HubSnap::NearestNode, 10.0);
        assert!(matches!(err, Err(PlanError::NoEligibleAnchor(HubId(3)))));
    }
}
