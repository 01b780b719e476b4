//! Routing graph synthesis from raw layers: road runs, pole backbone,
//! buried and aerial drops, pole transitions and drop association.

use crate::backbone::BackboneTree;
use crate::cost::SegmentCategory;
use crate::error::{Diagnostics, GeometryIssue, Layer, Result};
use crate::geometry::{Geometry, coord_is_finite, project_onto_polyline};
use crate::graph::{NodeRole, RoutingGraph};
use crate::hub::Leaf;
use crate::ids::{NodeId, PoleId};
use crate::spatial::PointIndex;
use ahash::AHashSet;
use geo::Coord;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pole {
    pub id: PoleId,
    pub coord: Coord<f64>,
}

/// A pole after it has been placed on the graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacedPole {
    pub id: PoleId,
    pub node: NodeId,
    pub coord: Coord<f64>,
}

/// Every line part becomes an Underground edge. Bad features are counted
/// against the road layer and skipped.
pub fn ingest_roads(graph: &mut RoutingGraph, roads: &[Geometry], diagnostics: &mut Diagnostics) -> usize {
    let mut added = 0;

    for (index, road) in roads.iter().enumerate() {
        let parts = match road.validate().and_then(|_| road.line_parts()) {
            Ok(parts) => parts,
            Err(issue) => {
                diagnostics.record_invalid(Layer::Roads, index, issue);
                continue;
            }
        };

        for part in parts {
            match graph.add_segment(part, SegmentCategory::Underground) {
                Ok(_) => added += 1,
                Err(issue) => diagnostics.record_invalid(Layer::Roads, index, issue),
            }
        }
    }

    info!(edges = added, invalid = diagnostics.invalid_count(Layer::Roads), "ingested road runs");
    added
}

/// Place poles on the graph and join them with their Euclidean MST as
/// Aerial edges.
pub fn build_pole_backbone(
    graph: &mut RoutingGraph,
    poles: &[Pole],
    diagnostics: &mut Diagnostics,
) -> (Vec<PlacedPole>, BackboneTree) {
    let mut placed = Vec::with_capacity(poles.len());
    for (index, pole) in poles.iter().enumerate() {
        if !coord_is_finite(pole.coord) {
            diagnostics.record_invalid(Layer::Poles, index, GeometryIssue::NonFinite);
            continue;
        }
        placed.push(PlacedPole {
            id: pole.id,
            node: graph.intern_node(pole.coord),
            coord: pole.coord,
        });
    }

    let coords: Vec<Coord<f64>> = placed.iter().map(|p| p.coord).collect();
    let tree = BackboneTree::build(&coords);

    let mut aerial = 0;
    for edge in &tree.edges {
        if graph
            .connect(placed[edge.a].node, placed[edge.b].node, SegmentCategory::Aerial)
            .is_some()
        {
            aerial += 1;
        }
    }

    info!(poles = placed.len(), aerial_edges = aerial, "built pole backbone");
    (placed, tree)
}

/// Join each home to the nearest point of the nearest Underground run,
/// splitting the run there.
pub fn create_buried_drops(
    graph: &mut RoutingGraph,
    leaves: &[Leaf],
    max_distance: Option<f64>,
    diagnostics: &mut Diagnostics,
) -> Result<usize> {
    let mut created = 0;

    for leaf in leaves {
        let target = graph.nearest_edge_where(leaf.coord, max_distance, |e| {
            e.category == SegmentCategory::Underground
        });
        let Some((edge_id, _)) = target else {
            diagnostics.homes_without_buried_drop += 1;
            continue;
        };
        let Some(landing) = graph
            .edge(edge_id)
            .and_then(|e| project_onto_polyline(&e.geometry, leaf.coord))
        else {
            diagnostics.homes_without_buried_drop += 1;
            continue;
        };

        let home = graph.intern_node(leaf.coord);
        let tap = graph.split_edge(edge_id, landing.point)?;
        if graph.connect(home, tap, SegmentCategory::BuriedDrop).is_some() {
            created += 1;
        }
    }

    info!(drops = created, missing = diagnostics.homes_without_buried_drop, "created buried drops");
    Ok(created)
}

/// Join each home within `radius` of a pole to the nearest one.
pub fn create_aerial_drops(
    graph: &mut RoutingGraph,
    leaves: &[Leaf],
    poles: &[PlacedPole],
    radius: f64,
) -> usize {
    let index = PointIndex::bulk_load(poles.iter().map(|p| (p.coord, p.node)));
    let mut created = 0;

    for leaf in leaves {
        let Some((&pole_node, distance)) = index.nearest(leaf.coord) else {
            break;
        };
        if distance > radius {
            continue;
        }
        let home = graph.intern_node(leaf.coord);
        if graph.connect(home, pole_node, SegmentCategory::AerialDrop).is_some() {
            created += 1;
        }
    }

    info!(drops = created, radius, "created aerial drops");
    created
}

/// Connect each pole to the nearest Underground run within `radius` with a
/// Transition edge, splitting the run at the landing point.
pub fn create_transitions(
    graph: &mut RoutingGraph,
    poles: &[PlacedPole],
    radius: f64,
    diagnostics: &mut Diagnostics,
) -> Result<usize> {
    let mut created = 0;

    for pole in poles {
        let target = graph.nearest_edge_where(pole.coord, Some(radius), |e| {
            e.category == SegmentCategory::Underground && !e.touches(pole.node)
        });
        let landing = target.and_then(|(edge_id, _)| {
            graph
                .edge(edge_id)
                .and_then(|e| project_onto_polyline(&e.geometry, pole.coord))
                .map(|p| (edge_id, p.point))
        });
        let Some((edge_id, point)) = landing else {
            diagnostics.poles_without_transition += 1;
            continue;
        };

        let tap = graph.split_edge(edge_id, point)?;
        if graph.connect(pole.node, tap, SegmentCategory::Transition).is_some() {
            created += 1;
        } else {
            debug!(pole = %pole.id, "pole already sits on the underground run");
        }
    }

    info!(
        transitions = created,
        without = diagnostics.poles_without_transition,
        "created pole transitions"
    );
    Ok(created)
}

/// Give every leaf its nearest node as drop node. Nodes carrying only drop
/// edges become leaf terminals; through nodes keep their role.
pub fn associate_drops(graph: &mut RoutingGraph, leaves: &mut [Leaf]) -> usize {
    let mut drop_nodes: AHashSet<NodeId> = AHashSet::new();

    for leaf in leaves.iter_mut() {
        leaf.drop_node = graph.nearest_node(leaf.coord).map(|(id, _)| id);
        if let Some(node) = leaf.drop_node {
            drop_nodes.insert(node);
        }
    }

    let mut terminals: Vec<NodeId> = drop_nodes
        .into_iter()
        .filter(|&node| {
            let incident = graph.incident(node);
            !incident.is_empty()
                && incident
                    .iter()
                    .filter_map(|e| graph.edge(*e))
                    .all(|e| e.category.is_drop())
        })
        .collect();
    terminals.sort();

    for &node in &terminals {
        graph.set_role(node, NodeRole::LeafTerminal);
    }

    info!(leaves = leaves.len(), terminals = terminals.len(), "associated drop nodes");
    terminals.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::CostModel;
    use crate::ids::LeafId;
    use geo::{LineString, MultiLineString};

    fn c(x: f64, y: f64) -> Coord<f64> {
        Coord { x, y }
    }

    fn road(points: &[(f64, f64)]) -> Geometry {
        Geometry::LineString(LineString::new(points.iter().map(|&(x, y)| c(x, y)).collect()))
    }

    fn base() -> (RoutingGraph, Diagnostics) {
        let mut graph = RoutingGraph::new(CostModel::default(), 0.5);
        let mut diagnostics = Diagnostics::default();
        ingest_roads(
            &mut graph,
            &[road(&[(0.0, 0.0), (100.0, 0.0)])],
            &mut diagnostics,
        );
        (graph, diagnostics)
    }

    #[test]
    fn test_bad_road_features_are_counted() {
        let mut graph = RoutingGraph::new(CostModel::default(), 0.5);
        let mut diagnostics = Diagnostics::default();
        let roads = vec![
            road(&[(0.0, 0.0), (10.0, 0.0)]),
            road(&[(5.0, 5.0)]),
            Geometry::from(c(1.0, 1.0)),
            road(&[(0.0, f64::INFINITY), (1.0, 1.0)]),
            Geometry::MultiLineString(MultiLineString::new(Vec::new())),
        ];
        let added = ingest_roads(&mut graph, &roads, &mut diagnostics);

        assert_eq!(added, 1);
        assert_eq!(diagnostics.invalid_count(Layer::Roads), 4);
        assert!(
            diagnostics
                .invalid_geometry
                .iter()
                .any(|f| f.index == 4 && f.issue == GeometryIssue::Degenerate)
        );
    }

    #[test]
    fn test_buried_drop_splits_run_and_marks_terminal() {
        let (mut graph, mut diagnostics) = base();
        let mut leaves = vec![Leaf::new(LeafId(0), c(40.0, 20.0))];

        let created = create_buried_drops(&mut graph, &leaves, None, &mut diagnostics).unwrap();
        assert_eq!(created, 1);
        assert_eq!(graph.edge_count(), 3);

        let drop = graph
            .edges()
            .find(|e| e.category == SegmentCategory::BuriedDrop)
            .unwrap();
        assert!((drop.length - 20.0).abs() < 1e-9);

        associate_drops(&mut graph, &mut leaves);
        let drop_node = leaves[0].drop_node.unwrap();
        assert_eq!(graph.node(drop_node).unwrap().role, NodeRole::LeafTerminal);
        assert_eq!(graph.node(drop_node).unwrap().coord, c(40.0, 20.0));
    }

    #[test]
    fn test_drop_radius_limits_buried_drops() {
        let (mut graph, mut diagnostics) = base();
        let leaves = vec![Leaf::new(LeafId(0), c(40.0, 300.0))];

        let created = create_buried_drops(&mut graph, &leaves, Some(100.0), &mut diagnostics).unwrap();
        assert_eq!(created, 0);
        assert_eq!(diagnostics.homes_without_buried_drop, 1);
    }

    #[test]
    fn test_poles_get_backbone_drops_and_transitions() {
        let (mut graph, mut diagnostics) = base();
        let poles = vec![
            Pole {
                id: PoleId(1),
                coord: c(20.0, 10.0),
            },
            Pole {
                id: PoleId(2),
                coord: c(60.0, 10.0),
            },
            Pole {
                id: PoleId(3),
                coord: c(60.0, 400.0),
            },
        ];
        let (placed, tree) = build_pole_backbone(&mut graph, &poles, &mut diagnostics);
        assert_eq!(placed.len(), 3);
        assert_eq!(tree.len(), 2);
        assert_eq!(
            graph
                .edges()
                .filter(|e| e.category == SegmentCategory::Aerial)
                .count(),
            2
        );

        let transitions = create_transitions(&mut graph, &placed, 50.0, &mut diagnostics).unwrap();
        assert_eq!(transitions, 2);
        assert_eq!(diagnostics.poles_without_transition, 1);
        // Road split twice
        assert_eq!(
            graph
                .edges()
                .filter(|e| e.category == SegmentCategory::Underground)
                .count(),
            3
        );
        let road_length: f64 = graph
            .edges()
            .filter(|e| e.category == SegmentCategory::Underground)
            .map(|e| e.length)
            .sum();
        assert!((road_length - 100.0).abs() < 1e-9);

        let leaves = vec![
            Leaf::new(LeafId(0), c(61.0, 120.0)),
            Leaf::new(LeafId(1), c(500.0, 500.0)),
        ];
        let drops = create_aerial_drops(&mut graph, &leaves, &placed, 200.0);
        assert_eq!(drops, 1);
    }

    #[test]
    fn test_through_node_is_not_masked() {
        let (mut graph, _) = base();
        // Home sits right on the road end node
        let mut leaves = vec![Leaf::new(LeafId(0), c(100.0, 0.1))];
        associate_drops(&mut graph, &mut leaves);

        let node = leaves[0].drop_node.unwrap();
        assert_eq!(graph.node(node).unwrap().role, NodeRole::Unassigned);
    }
}
