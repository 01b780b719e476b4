//! End-to-end planning run over in-memory layers.

use crate::backbone::BackboneTree;
use crate::config::PlannerConfig;
use crate::cost::CostModel;
use crate::error::{Diagnostics, Layer, Result};
use crate::geometry::Geometry;
use crate::graph::RoutingGraph;
use crate::graph::search::SearchBudget;
use crate::hub::{Hub, HubAssignment, Leaf};
use crate::ids::{LeafId, PoleId};
use crate::ingest::{
    PlacedPole, Pole, associate_drops, build_pole_backbone, create_aerial_drops, create_buried_drops,
    create_transitions, ingest_roads,
};
use crate::records::{EdgeRecord, NodeRecord, graph_from_records};
use crate::report::{HubSummary, poles_used, summarize_hubs};
use crate::router::{PathRouter, RoutedLeaf, RouterOptions, ServiceNetwork};
use crate::terminal::{ServiceTerminal, assign_terminals};
use std::time::Instant;
use tracing::{info, warn};

/// Node and edge layers from an earlier run or an external design tool.
#[derive(Debug, Clone, Default)]
pub struct PrebuiltNetwork {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct PlanInputs {
    pub roads: Vec<Geometry>,
    pub poles: Vec<Pole>,
    /// Leaf ids are positions in this list.
    pub homes: Vec<Geometry>,
    pub prebuilt: Option<PrebuiltNetwork>,
    /// Findings carried over from reading the layers.
    pub diagnostics: Diagnostics,
}

#[derive(Debug)]
pub struct Plan {
    pub graph: RoutingGraph,
    pub leaves: Vec<Leaf>,
    pub hubs: Vec<Hub>,
    pub network: ServiceNetwork,
    pub routes: Vec<RoutedLeaf>,
    pub poles: Vec<PlacedPole>,
    pub backbone: BackboneTree,
    pub terminals: Vec<ServiceTerminal>,
    pub report: Vec<HubSummary>,
    pub poles_used: Vec<PoleId>,
    pub diagnostics: Diagnostics,
}

impl Plan {
    /// Cost of every edge in the service network.
    pub fn network_cost(&self) -> f64 {
        self.network.resolve(&self.graph).map(|(e, _)| e.cost).sum()
    }
}

fn collect_leaves(homes: &[Geometry], diagnostics: &mut Diagnostics) -> Vec<Leaf> {
    let mut leaves = Vec::with_capacity(homes.len());
    for (index, home) in homes.iter().enumerate() {
        match home.validate().and_then(|_| home.as_point()) {
            Ok(coord) => leaves.push(Leaf::new(LeafId(index), coord)),
            Err(issue) => diagnostics.record_invalid(Layer::Homes, index, issue),
        }
    }
    leaves
}

pub fn plan(inputs: PlanInputs, config: &PlannerConfig) -> Result<Plan> {
    config.validate()?;
    let start = Instant::now();

    let PlanInputs {
        roads,
        poles,
        homes,
        prebuilt,
        mut diagnostics,
    } = inputs;

    let cost_model = CostModel::new(config.cost_rates.clone());
    let mut graph = match prebuilt {
        Some(prebuilt) => graph_from_records(
            &prebuilt.nodes,
            &prebuilt.edges,
            cost_model,
            config.coincidence_epsilon,
            &mut diagnostics,
        )?,
        None => RoutingGraph::new(cost_model, config.coincidence_epsilon),
    };

    ingest_roads(&mut graph, &roads, &mut diagnostics);
    let mut leaves = collect_leaves(&homes, &mut diagnostics);

    let (placed, backbone) = build_pole_backbone(&mut graph, &poles, &mut diagnostics);
    create_buried_drops(&mut graph, &leaves, config.drop_search_radius, &mut diagnostics)?;
    create_aerial_drops(&mut graph, &leaves, &placed, config.aerial_drop_radius);
    create_transitions(&mut graph, &placed, config.search_radius, &mut diagnostics)?;
    associate_drops(&mut graph, &mut leaves);

    let components = graph.connected_components();
    if components.len() > 1 {
        warn!(
            components = components.len(),
            largest = components[0].len(),
            "routing graph is not connected; some leaves may be unroutable"
        );
    }

    let hubs = if leaves.is_empty() {
        Vec::new()
    } else {
        HubAssignment::from_config(config).assign(&mut graph, &mut leaves)?
    };

    let options = RouterOptions {
        budget: SearchBudget {
            max_visits: config.max_search_visits,
        },
        parallel: config.parallel_routing,
    };
    let outcome = PathRouter::new(&graph, options).route_all(&hubs, &leaves);
    diagnostics.unroutable.extend(outcome.unroutable);

    let terminals = assign_terminals(&leaves, config.terminal_capacity, config.terminal_max_distance);
    let report = summarize_hubs(&graph, &outcome.network, &hubs, &leaves);
    let used = poles_used(&graph, &outcome.network, &placed, config.pole_usage_tolerance);

    info!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        leaves = leaves.len(),
        hubs = hubs.len(),
        network_edges = outcome.network.edge_count(),
        unroutable = diagnostics.unroutable.len(),
        invalid = diagnostics.invalid_geometry.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "plan finished"
    );

    Ok(Plan {
        graph,
        leaves,
        hubs,
        network: outcome.network,
        routes: outcome.routes,
        poles: placed,
        backbone,
        terminals,
        report,
        poles_used: used,
        diagnostics,
    })
}
