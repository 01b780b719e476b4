//! Closed attribute schemas for exchanged layers. Values are checked and
//! converted here so the core never sees loosely typed attributes.

use crate::cost::{CostModel, SegmentCategory};
use crate::error::{Diagnostics, GeometryIssue, Layer, Result};
use crate::geometry::{clean_polyline, coord_is_finite};
use crate::graph::{Edge, EdgeSpec, Node, NodeRole, RoutingGraph};
use crate::hub::{Hub, Leaf};
use crate::ids::{NodeId, PoleId};
use crate::ingest::{PlacedPole, Pole};
use geo::{Coord, LineString};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: u64,
    pub coordinates: [f64; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub start_node: u64,
    pub end_node: u64,
    pub category: String,
    #[serde(default)]
    pub length: Option<f64>,
    /// Informational only; cost is always re-derived from the rates.
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(skip)]
    pub geometry: Option<LineString<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafRecord {
    pub coordinates: [f64; 2],
    pub drop_node: Option<u64>,
    pub hub_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubRecord {
    pub id: u32,
    pub coordinates: [f64; 2],
    pub anchor_node: u64,
    pub capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoleRecord {
    pub id: u64,
    pub coordinates: [f64; 2],
}

fn pair(c: Coord<f64>) -> [f64; 2] {
    [c.x, c.y]
}

fn coord(p: [f64; 2]) -> Coord<f64> {
    Coord { x: p[0], y: p[1] }
}

pub fn parse_role(raw: Option<&str>) -> std::result::Result<NodeRole, GeometryIssue> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(NodeRole::Unassigned);
    };
    match raw.to_lowercase().replace('_', "-").as_str() {
        "hp" | "leaf-terminal" => Ok(NodeRole::LeafTerminal),
        "hub-adjacent" | "fdh" => Ok(NodeRole::HubAdjacent),
        "unassigned" => Ok(NodeRole::Unassigned),
        _ => Err(GeometryIssue::BadAttribute),
    }
}

pub fn role_label(role: NodeRole) -> Option<&'static str> {
    match role {
        NodeRole::Unassigned => None,
        NodeRole::HubAdjacent => Some("hub-adjacent"),
        NodeRole::LeafTerminal => Some("leaf-terminal"),
    }
}

impl From<&Node> for NodeRecord {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id.0,
            coordinates: pair(node.coord),
            role: role_label(node.role).map(str::to_string),
        }
    }
}

impl From<&Edge> for EdgeRecord {
    fn from(edge: &Edge) -> Self {
        Self {
            start_node: edge.a.0,
            end_node: edge.b.0,
            category: edge.category.as_str().to_string(),
            length: Some(edge.length),
            cost: Some(edge.cost),
            geometry: Some(edge.geometry.clone()),
        }
    }
}

impl From<&Leaf> for LeafRecord {
    fn from(leaf: &Leaf) -> Self {
        Self {
            coordinates: pair(leaf.coord),
            drop_node: leaf.drop_node.map(|n| n.0),
            hub_id: leaf.hub_id.map(|h| h.0),
        }
    }
}

impl From<&Hub> for HubRecord {
    fn from(hub: &Hub) -> Self {
        Self {
            id: hub.id.0,
            coordinates: pair(hub.location),
            anchor_node: hub.anchor_node.0,
            capacity: hub.capacity,
        }
    }
}

impl From<&PlacedPole> for PoleRecord {
    fn from(pole: &PlacedPole) -> Self {
        Self {
            id: pole.id.0,
            coordinates: pair(pole.coord),
        }
    }
}

impl PoleRecord {
    pub fn to_pole(&self) -> Pole {
        Pole {
            id: PoleId(self.id),
            coord: coord(self.coordinates),
        }
    }
}

/// Build a routing graph from exchanged node and edge records.
///
/// Nodes with bad coordinates or roles and edges with unknown categories or
/// broken geometry are counted and skipped. An edge naming a node that is
/// not present aborts with `MalformedSegment`.
pub fn graph_from_records(
    nodes: &[NodeRecord],
    edges: &[EdgeRecord],
    cost_model: CostModel,
    coincidence_epsilon: f64,
    diagnostics: &mut Diagnostics,
) -> Result<RoutingGraph> {
    let mut accepted_nodes = Vec::with_capacity(nodes.len());
    for (index, record) in nodes.iter().enumerate() {
        let c = coord(record.coordinates);
        if !coord_is_finite(c) {
            diagnostics.record_invalid(Layer::Nodes, index, GeometryIssue::NonFinite);
            continue;
        }
        match parse_role(record.role.as_deref()) {
            Ok(role) => accepted_nodes.push((NodeId(record.id), c, role)),
            Err(issue) => diagnostics.record_invalid(Layer::Nodes, index, issue),
        }
    }

    let mut specs = Vec::with_capacity(edges.len());
    for (index, record) in edges.iter().enumerate() {
        let category: SegmentCategory = match record.category.parse() {
            Ok(c) => c,
            Err(_) => {
                diagnostics.record_invalid(Layer::Edges, index, GeometryIssue::BadAttribute);
                continue;
            }
        };
        let geometry = match &record.geometry {
            Some(line) if !line.0.iter().all(|c| coord_is_finite(*c)) => {
                diagnostics.record_invalid(Layer::Edges, index, GeometryIssue::NonFinite);
                continue;
            }
            Some(line) => match clean_polyline(line) {
                Some(clean) => Some(clean),
                None => {
                    diagnostics.record_invalid(Layer::Edges, index, GeometryIssue::Degenerate);
                    continue;
                }
            },
            None => None,
        };
        specs.push(EdgeSpec {
            a: NodeId(record.start_node),
            b: NodeId(record.end_node),
            category,
            length: record.length,
            geometry,
        });
    }

    RoutingGraph::build(cost_model, coincidence_epsilon, accepted_nodes, specs)
}
