// ===========================================================================
// Hub assignment: capacity-bounded grouping of leaves around distribution hubs
// ===========================================================================
pub mod center;
pub mod linkage;
pub mod snap;

use crate::config::PlannerConfig;
use crate::error::{PlanError, Result};
use crate::graph::RoutingGraph;
use crate::ids::{HubId, LeafId, NodeId};
use center::robust_center;
use geo::Coord;
use linkage::Dendrogram;
use serde::Serialize;
use snap::{HubSnap, snap_anchor};
use tracing::{debug, info};

/// A home or other service point that needs a drop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Leaf {
    pub id: LeafId,
    #[serde(skip)]
    pub coord: Coord<f64>,
    pub drop_node: Option<NodeId>,
    pub hub_id: Option<HubId>,
}

impl Leaf {
    pub fn new(id: LeafId, coord: Coord<f64>) -> Self {
        Self {
            id,
            coord,
            drop_node: None,
            hub_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hub {
    pub id: HubId,
    #[serde(skip)]
    pub location: Coord<f64>,
    pub anchor_node: NodeId,
    pub capacity: usize,
    pub members: Vec<LeafId>,
}

/// Accepted flat clustering, as indices into the input points.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterCut {
    pub threshold: f64,
    pub clusters: Vec<Vec<usize>>,
    pub shrink_iterations: usize,
}

#[derive(Debug, Clone)]
pub struct HubAssignment {
    pub capacity: usize,
    pub shrink_factor: f64,
    pub initial_cutoff_ratio: f64,
    pub max_iterations: usize,
    pub prefer_fewest_hubs: bool,
    pub snap: HubSnap,
    pub snap_tolerance: f64,
}

impl HubAssignment {
    pub fn from_config(config: &PlannerConfig) -> Self {
        Self {
            capacity: config.max_leaves_per_hub,
            shrink_factor: config.shrink_factor,
            initial_cutoff_ratio: config.initial_cutoff_ratio,
            max_iterations: config.max_shrink_iterations,
            prefer_fewest_hubs: config.prefer_fewest_hubs,
            snap: config.hub_snap,
            snap_tolerance: config.snap_tolerance,
        }
    }

    /// Largest flat cut under the capacity bound, found by shrinking the
    /// cutoff from a fraction of the tallest merge.
    pub fn cluster(&self, points: &[Coord<f64>]) -> Result<ClusterCut> {
        if points.is_empty() {
            return Ok(ClusterCut {
                threshold: 0.0,
                clusters: Vec::new(),
                shrink_iterations: 0,
            });
        }

        let dendrogram = Dendrogram::ward(points);
        let floor = dendrogram.min_positive_height();
        let mut threshold = dendrogram.max_height() * self.initial_cutoff_ratio;
        let mut iterations = 0;

        loop {
            let clusters = dendrogram.cut(threshold);
            let largest = clusters.iter().map(Vec::len).max().unwrap_or(0);

            if largest <= self.capacity {
                let leaf_count = dendrogram.point_count();
                debug!(threshold, iterations, clusters = clusters.len(), leaf_count, "cutoff accepted");
                // A first cut that leaves every leaf alone is raised as far as capacity allows
                let all_singletons = leaf_count > 1 && clusters.len() == leaf_count;
                if iterations == 0 && (self.prefer_fewest_hubs || all_singletons) {
                    return Ok(self.coarsest_admissible(&dendrogram, threshold, clusters));
                }
                return Ok(ClusterCut {
                    threshold,
                    clusters,
                    shrink_iterations: iterations,
                });
            }

            // Below the smallest positive height every cut is the finest one
            let exhausted = floor.is_none_or(|f| threshold < f);
            if exhausted || iterations >= self.max_iterations {
                return Err(PlanError::CapacityUnsatisfiable {
                    capacity: self.capacity,
                    largest,
                    last_threshold: threshold,
                });
            }

            threshold *= self.shrink_factor;
            iterations += 1;
        }
    }

    fn coarsest_admissible(
        &self,
        dendrogram: &Dendrogram,
        threshold: f64,
        clusters: Vec<Vec<usize>>,
    ) -> ClusterCut {
        let mut heights: Vec<f64> = dendrogram
            .merges()
            .iter()
            .map(|m| m.height)
            .filter(|h| *h > threshold)
            .collect();
        heights.dedup();

        // Cluster sizes only grow with the cutoff, so the admissible heights are a prefix
        let admissible = heights.partition_point(|h| dendrogram.largest_cluster(*h) <= self.capacity);

        match admissible.checked_sub(1).map(|i| heights[i]) {
            Some(raised) => ClusterCut {
                threshold: raised,
                clusters: dendrogram.cut(raised),
                shrink_iterations: 0,
            },
            None => ClusterCut {
                threshold,
                clusters,
                shrink_iterations: 0,
            },
        }
    }

    /// Cluster the leaves, snap one hub per cluster onto the graph and record
    /// each leaf's hub. Hub ids start at 1 in cluster order.
    pub fn assign(&self, graph: &mut RoutingGraph, leaves: &mut [Leaf]) -> Result<Vec<Hub>> {
        let points: Vec<Coord<f64>> = leaves.iter().map(|l| l.coord).collect();
        let cut = self.cluster(&points)?;

        let mut hubs = Vec::with_capacity(cut.clusters.len());

        for (i, cluster) in cut.clusters.iter().enumerate() {
            let id = HubId(i as u32 + 1);
            let member_points: Vec<Coord<f64>> = cluster.iter().map(|&m| points[m]).collect();
            let Some(location) = robust_center(&member_points) else {
                continue;
            };

            let anchor = snap_anchor(graph, id, location, self.snap, self.snap_tolerance)?;

            let members: Vec<LeafId> = cluster.iter().map(|&m| leaves[m].id).collect();
            for &m in cluster {
                leaves[m].hub_id = Some(id);
            }

            hubs.push(Hub {
                id,
                location,
                anchor_node: anchor.node,
                capacity: self.capacity,
                members,
            });
        }

        info!(
            hubs = hubs.len(),
            leaves = leaves.len(),
            threshold = cut.threshold,
            shrink_iterations = cut.shrink_iterations,
            "assigned leaves to hubs"
        );

        Ok(hubs)
    }
}
