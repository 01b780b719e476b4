// ===========================================================================
// Path routing: leaf drop nodes to hub anchors over the masked graph
// ===========================================================================
pub mod service_network;

use crate::error::{RouteFailure, UnroutableLeaf};
use crate::graph::RoutingGraph;
use crate::graph::mask::{ExclusionSet, MaskedView};
use crate::graph::search::{
    GraphPath, SearchBudget, SearchExceeded, SearchResult, shortest_path, shortest_path_to_any,
};
use crate::hub::{Hub, Leaf};
use crate::ids::{EdgeId, HubId, LeafId, NodeId};
use ahash::{AHashMap, AHashSet};
use rayon::prelude::*;
use serde::Serialize;
pub use service_network::ServiceNetwork;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default)]
pub struct RouterOptions {
    pub budget: SearchBudget,
    pub parallel: bool,
}

/// Direct-path memo for one routing run, keyed by (drop node, anchor).
///
/// A leaf's view only depends on its own drop node, so leaves sharing a drop
/// node share the entry. Committing paths never changes a direct path; shared
/// candidates are recomputed per leaf and are not cached here.
#[derive(Debug, Default)]
pub struct PathCache {
    direct: AHashMap<(NodeId, NodeId), SearchResult>,
    hits: usize,
}

impl PathCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn direct(
        &mut self,
        view: &MaskedView<'_>,
        from: NodeId,
        to: NodeId,
        budget: SearchBudget,
    ) -> SearchResult {
        if let Some(hit) = self.direct.get(&(from, to)) {
            self.hits += 1;
            return hit.clone();
        }
        let result = shortest_path(view, from, to, budget);
        self.direct.insert((from, to), result.clone());
        result
    }

    pub fn hits(&self) -> usize {
        self.hits
    }
}

/// Committed routes of one hub, as next-hop pointers toward the anchor.
#[derive(Debug, Clone)]
struct HubTrunk {
    anchor: NodeId,
    hops: AHashMap<NodeId, TrunkHop>,
}

#[derive(Debug, Clone, Copy)]
struct TrunkHop {
    cost: f64,
    next: Option<(EdgeId, NodeId)>,
}

impl HubTrunk {
    fn new(anchor: NodeId) -> Self {
        let mut hops = AHashMap::new();
        hops.insert(anchor, TrunkHop { cost: 0.0, next: None });
        Self { anchor, hops }
    }

    fn contains(&self, node: NodeId) -> bool {
        self.hops.contains_key(&node)
    }

    /// Committed route from `node` to the anchor.
    fn route_from(&self, node: NodeId, graph: &RoutingGraph) -> Option<GraphPath> {
        let mut nodes = vec![node];
        let mut edges = Vec::new();
        let mut cost = 0.0;
        let mut seen = AHashSet::new();
        let mut current = node;

        while current != self.anchor {
            if !seen.insert(current) {
                return None;
            }
            let (edge, next) = self.hops.get(&current)?.next?;
            cost += graph.edge(edge)?.cost;
            edges.push(edge);
            nodes.push(next);
            current = next;
        }

        Some(GraphPath { nodes, edges, cost })
    }

    /// Record a path ending at the anchor. A node's pointer only moves when
    /// the new route is strictly cheaper.
    fn absorb(&mut self, path: &GraphPath, graph: &RoutingGraph) {
        if path.target() != self.anchor {
            return;
        }
        for i in (0..path.edges.len()).rev() {
            let (node, next, edge) = (path.nodes[i], path.nodes[i + 1], path.edges[i]);
            let Some(downstream) = self.hops.get(&next).map(|h| h.cost) else {
                continue;
            };
            let Some(edge_cost) = graph.edge(edge).map(|e| e.cost) else {
                continue;
            };
            let candidate = downstream + edge_cost;
            let better = self.hops.get(&node).is_none_or(|h| candidate < h.cost);
            if better {
                self.hops.insert(
                    node,
                    TrunkHop {
                        cost: candidate,
                        next: Some((edge, next)),
                    },
                );
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutedLeaf {
    pub leaf: LeafId,
    pub hub: HubId,
    pub drop_node: NodeId,
    pub nodes: Vec<NodeId>,
    pub edges: Vec<EdgeId>,
    pub cost: f64,
    /// Committed through an earlier leaf's route rather than directly.
    pub shared: bool,
}

#[derive(Debug, Default)]
pub struct HubRouting {
    pub network: ServiceNetwork,
    pub routes: Vec<RoutedLeaf>,
    pub unroutable: Vec<UnroutableLeaf>,
}

#[derive(Debug, Default)]
pub struct RoutingOutcome {
    pub network: ServiceNetwork,
    pub routes: Vec<RoutedLeaf>,
    pub unroutable: Vec<UnroutableLeaf>,
}

pub struct PathRouter<'g> {
    graph: &'g RoutingGraph,
    exclusions: ExclusionSet,
    options: RouterOptions,
}

impl<'g> PathRouter<'g> {
    /// Snapshot the leaf-terminal set; later role changes are not seen.
    pub fn new(graph: &'g RoutingGraph, options: RouterOptions) -> Self {
        Self {
            graph,
            exclusions: ExclusionSet::leaf_terminals(graph),
            options,
        }
    }

    fn view_for(&self, drop_node: NodeId) -> MaskedView<'_> {
        let mut view = self.exclusions.view(self.graph);
        view.unmask(drop_node);
        view
    }

    /// Route every hub group and merge results in ascending hub id.
    pub fn route_all(&self, hubs: &[Hub], leaves: &[Leaf]) -> RoutingOutcome {
        let by_id: AHashMap<LeafId, &Leaf> = leaves.iter().map(|l| (l.id, l)).collect();

        let mut ordered: Vec<&Hub> = hubs.iter().collect();
        ordered.sort_by_key(|h| h.id);

        let group = |hub: &&Hub| -> HubRouting {
            let members: Vec<&Leaf> = hub
                .members
                .iter()
                .filter_map(|id| by_id.get(id).copied())
                .collect();
            self.route_hub(hub, &members)
        };

        let partials: Vec<HubRouting> = if self.options.parallel {
            ordered.par_iter().map(group).collect()
        } else {
            ordered.iter().map(group).collect()
        };

        let mut outcome = RoutingOutcome::default();
        for partial in partials {
            outcome.network.absorb(partial.network);
            outcome.routes.extend(partial.routes);
            outcome.unroutable.extend(partial.unroutable);
        }

        info!(
            routed = outcome.routes.len(),
            unroutable = outcome.unroutable.len(),
            network_edges = outcome.network.edge_count(),
            "routing finished"
        );
        outcome
    }

    /// Route one hub group. Leaves go cheapest preliminary path first, ties
    /// by leaf id, leaves with no preliminary path last.
    pub fn route_hub(&self, hub: &Hub, members: &[&Leaf]) -> HubRouting {
        let mut result = HubRouting::default();
        let mut cache = PathCache::new();
        let mut trunk = HubTrunk::new(hub.anchor_node);
        let budget = self.options.budget;

        let mut queue: Vec<(&Leaf, NodeId, Option<f64>)> = Vec::with_capacity(members.len());
        for leaf in members {
            let Some(drop_node) = leaf.drop_node else {
                result.unroutable.push(UnroutableLeaf {
                    leaf: leaf.id,
                    hub: hub.id,
                    failure: RouteFailure::NoDropNode,
                });
                continue;
            };
            let view = self.view_for(drop_node);
            let preliminary = match cache.direct(&view, drop_node, hub.anchor_node, budget) {
                Ok(Some(path)) => Some(path.cost),
                _ => None,
            };
            queue.push((leaf, drop_node, preliminary));
        }

        queue.sort_by(|a, b| match (a.2, b.2) {
            (Some(x), Some(y)) => x.total_cmp(&y).then_with(|| a.0.id.cmp(&b.0.id)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.0.id.cmp(&b.0.id),
        });

        for (leaf, drop_node, _) in queue {
            let view = self.view_for(drop_node);
            let direct = cache.direct(&view, drop_node, hub.anchor_node, budget);
            let shared = self.shared_candidate(&view, drop_node, &trunk, budget);

            match choose(direct, shared) {
                Ok((path, was_shared)) => {
                    trunk.absorb(&path, self.graph);
                    result.network.claim_path(&path, hub.id);
                    result.routes.push(RoutedLeaf {
                        leaf: leaf.id,
                        hub: hub.id,
                        drop_node,
                        nodes: path.nodes,
                        edges: path.edges,
                        cost: path.cost,
                        shared: was_shared,
                    });
                }
                Err(failure) => {
                    debug!(leaf = %leaf.id, hub = %hub.id, ?failure, "leaf unroutable");
                    result.unroutable.push(UnroutableLeaf {
                        leaf: leaf.id,
                        hub: hub.id,
                        failure,
                    });
                }
            }
        }

        debug!(
            hub = %hub.id,
            routed = result.routes.len(),
            unroutable = result.unroutable.len(),
            cache_hits = cache.hits(),
            "hub routed"
        );
        result
    }

    /// Path to the first committed node of this hub, extended along the
    /// committed route to the anchor.
    fn shared_candidate(
        &self,
        view: &MaskedView<'_>,
        drop_node: NodeId,
        trunk: &HubTrunk,
        budget: SearchBudget,
    ) -> SearchResult {
        // Only the anchor is committed yet: the direct path covers it
        if trunk.hops.len() <= 1 {
            return Ok(None);
        }

        let Some(head) = shortest_path_to_any(view, drop_node, |n| trunk.contains(n), budget)? else {
            return Ok(None);
        };
        let Some(tail) = trunk.route_from(head.target(), self.graph) else {
            return Ok(None);
        };

        let mut nodes = head.nodes;
        nodes.extend(tail.nodes.into_iter().skip(1));
        let mut edges = head.edges;
        edges.extend(tail.edges);

        Ok(Some(GraphPath {
            nodes,
            edges,
            cost: head.cost + tail.cost,
        }))
    }
}

/// Cheaper candidate wins; the shared one on ties. A missing candidate
/// counts as infinitely expensive.
fn choose(direct: SearchResult, shared: SearchResult) -> Result<(GraphPath, bool), RouteFailure> {
    let exceeded = |r: &SearchResult| match r {
        Err(SearchExceeded { visited }) => Some(*visited),
        _ => None,
    };
    let overflow = exceeded(&direct).or(exceeded(&shared));

    let direct = direct.ok().flatten();
    let shared = shared.ok().flatten();

    match (direct, shared) {
        (Some(d), Some(s)) => {
            if s.cost <= d.cost {
                Ok((s, true))
            } else {
                Ok((d, false))
            }
        }
        (Some(d), None) => Ok((d, false)),
        (None, Some(s)) => Ok((s, true)),
        (None, None) => Err(match overflow {
            Some(visited) => RouteFailure::PathSearchExceeded { visited },
            None => RouteFailure::Unroutable,
        }),
    }
}
