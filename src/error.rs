use crate::ids::{EdgeId, HubId, LeafId, NodeId};
use serde::Serialize;
use thiserror::Error;

/// Stage-aborting failures. Per-item problems never end up here; they are
/// collected in [`Diagnostics`] instead.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("segment {segment} references missing node {node}")]
    MalformedSegment { segment: usize, node: NodeId },

    #[error(
        "no distance cutoff keeps hubs within {capacity} leaves (largest cluster {largest} at threshold {last_threshold})"
    )]
    CapacityUnsatisfiable {
        capacity: usize,
        largest: usize,
        last_threshold: f64,
    },

    #[error("hub {0} has no eligible routing graph node to anchor to")]
    NoEligibleAnchor(HubId),

    #[error("edge {0} is not present in the routing graph")]
    UnknownEdge(EdgeId),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, PlanError>;

/// Why a geometry was filtered out at ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GeometryIssue {
    /// NaN or infinite coordinate.
    NonFinite,
    /// Fewer than two distinct vertices, or both ends collapse into one node.
    Degenerate,
    /// Geometry kind not accepted by the layer (e.g. a point in a segment layer).
    WrongKind,
    /// Unknown or missing attribute value in a closed schema.
    BadAttribute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Layer {
    Roads,
    Poles,
    Homes,
    Nodes,
    Edges,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvalidGeometry {
    pub layer: Layer,
    /// Index of the feature within its input collection.
    pub index: usize,
    pub issue: GeometryIssue,
}

/// Per-leaf routing failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RouteFailure {
    /// No path between the drop node and the hub anchor under the leaf's mask.
    Unroutable,
    /// A search hit the visit cap before settling the target.
    PathSearchExceeded { visited: usize },
    /// The leaf never got a drop node.
    NoDropNode,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnroutableLeaf {
    pub leaf: LeafId,
    pub hub: HubId,
    pub failure: RouteFailure,
}

/// Aggregated per-item failures of one planning run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    pub invalid_geometry: Vec<InvalidGeometry>,
    pub unroutable: Vec<UnroutableLeaf>,
    /// Poles that found no underground edge within the transition radius.
    pub poles_without_transition: usize,
    /// Homes that found no road edge to drop onto.
    pub homes_without_buried_drop: usize,
}

impl Diagnostics {
    pub fn record_invalid(&mut self, layer: Layer, index: usize, issue: GeometryIssue) {
        self.invalid_geometry.push(InvalidGeometry {
            layer,
            index,
            issue,
        });
    }

    pub fn invalid_count(&self, layer: Layer) -> usize {
        self.invalid_geometry
            .iter()
            .filter(|g| g.layer == layer)
            .count()
    }

    pub fn is_unroutable(&self, leaf: LeafId) -> bool {
        self.unroutable.iter().any(|u| u.leaf == leaf)
    }
}
