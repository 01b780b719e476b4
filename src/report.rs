use crate::cost::SegmentCategory;
use crate::graph::RoutingGraph;
use crate::hub::{Hub, Leaf};
use crate::ids::{HubId, PoleId};
use crate::ingest::PlacedPole;
use crate::router::ServiceNetwork;
use crate::spatial::SegmentIndex;
use itertools::Itertools;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HubSummary {
    pub hub: HubId,
    pub homes: usize,
    /// Edges owned by this hub in the service network.
    pub network_edges: usize,
    pub aerial_drops: usize,
    pub buried_drops: usize,
    pub aerial_length: f64,
    /// Transition runs are counted here.
    pub underground_length: f64,
    pub percent_aerial: f64,
    pub length_per_home: f64,
}

impl HubSummary {
    fn empty(hub: HubId, homes: usize) -> Self {
        Self {
            hub,
            homes,
            network_edges: 0,
            aerial_drops: 0,
            buried_drops: 0,
            aerial_length: 0.0,
            underground_length: 0.0,
            percent_aerial: 0.0,
            length_per_home: 0.0,
        }
    }
}

/// Per-hub plant totals over the service network, ordered by hub id.
pub fn summarize_hubs(
    graph: &RoutingGraph,
    network: &ServiceNetwork,
    hubs: &[Hub],
    leaves: &[Leaf],
) -> Vec<HubSummary> {
    let homes = leaves.iter().filter_map(|l| l.hub_id).counts();

    let mut summaries: BTreeMap<HubId, HubSummary> = hubs
        .iter()
        .map(|h| (h.id, HubSummary::empty(h.id, homes.get(&h.id).copied().unwrap_or(0))))
        .collect();

    for (edge, hub) in network.resolve(graph) {
        let summary = summaries
            .entry(hub)
            .or_insert_with(|| HubSummary::empty(hub, homes.get(&hub).copied().unwrap_or(0)));

        match edge.category {
            SegmentCategory::AerialDrop => summary.aerial_drops += 1,
            SegmentCategory::BuriedDrop => summary.buried_drops += 1,
            SegmentCategory::Aerial => summary.aerial_length += edge.length,
            SegmentCategory::Underground | SegmentCategory::Transition => {
                summary.underground_length += edge.length
            }
        }
    }

    for summary in summaries.values_mut() {
        summary.network_edges = network.edges_of(summary.hub).count();
        let total = summary.aerial_length + summary.underground_length;
        if total > 0.0 {
            summary.percent_aerial = summary.aerial_length / total * 100.0;
        }
        if summary.homes > 0 {
            summary.length_per_home = total / summary.homes as f64;
        }
    }

    summaries.into_values().collect()
}

/// Poles lying within `tolerance` of any service network edge.
pub fn poles_used(
    graph: &RoutingGraph,
    network: &ServiceNetwork,
    poles: &[PlacedPole],
    tolerance: f64,
) -> Vec<PoleId> {
    let mut index = SegmentIndex::new();
    for (edge, _) in network.resolve(graph) {
        index.insert_line(&edge.geometry, edge.id);
    }

    let mut used: Vec<PoleId> = poles
        .iter()
        .filter(|p| index.nearest_where(p.coord, Some(tolerance), |_| true).is_some())
        .map(|p| p.id)
        .collect();
    used.sort();
    used.dedup();
    used
}
