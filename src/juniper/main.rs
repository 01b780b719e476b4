// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

use anyhow::Context;
use clap::Parser;
use osp::config::PlannerConfig;
use osp::error::Diagnostics;
use osp::geojson_io::{self, read_collection};
use osp::planner::{PlanInputs, PrebuiltNetwork, plan};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::info;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(Parser, Debug)]
#[command(author, version, about = "Plan an FTTH outside-plant network", long_about = None)]
struct Args {
    /// Road centerlines (GeoJSON FeatureCollection of line strings).
    #[arg(long, env = "JUNIPER_ROADS")]
    roads: Option<PathBuf>,

    /// Utility poles (GeoJSON points).
    #[arg(long, env = "JUNIPER_POLES")]
    poles: Option<PathBuf>,

    /// Home points to serve.
    #[arg(long, env = "JUNIPER_HOMES")]
    homes: PathBuf,

    /// Prebuilt node layer; needs --edges.
    #[arg(long, requires = "edges")]
    nodes: Option<PathBuf>,

    /// Prebuilt edge layer; needs --nodes.
    #[arg(long, requires = "nodes")]
    edges: Option<PathBuf>,

    /// Planner configuration (JSON). Defaults apply for missing keys.
    #[arg(long, env = "JUNIPER_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, default_value = "juniper_out")]
    out_dir: PathBuf,

    #[arg(long)]
    max_leaves_per_hub: Option<usize>,

    /// Route hub groups one after another.
    #[arg(long)]
    serial: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let mut config = match &args.config {
        Some(path) => PlannerConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => PlannerConfig::default(),
    };
    if let Some(max) = args.max_leaves_per_hub {
        config.max_leaves_per_hub = max;
    }
    if args.serial {
        config.parallel_routing = false;
    }

    let mut diagnostics = Diagnostics::default();
    let load = |path: &Path| read_collection(path).with_context(|| format!("reading {}", path.display()));

    let roads = match &args.roads {
        Some(path) => geojson_io::read_roads(&load(path)?, &mut diagnostics),
        None => Vec::new(),
    };
    let poles = match &args.poles {
        Some(path) => geojson_io::read_poles(&load(path)?, &mut diagnostics),
        None => Vec::new(),
    };
    let homes = geojson_io::read_homes(&load(&args.homes)?, &mut diagnostics);
    let prebuilt = match (&args.nodes, &args.edges) {
        (Some(nodes), Some(edges)) => Some(PrebuiltNetwork {
            nodes: geojson_io::read_nodes(&load(nodes)?, &mut diagnostics),
            edges: geojson_io::read_edges(&load(edges)?, &mut diagnostics),
        }),
        _ => None,
    };

    info!(
        roads = roads.len(),
        poles = poles.len(),
        homes = homes.len(),
        prebuilt = prebuilt.is_some(),
        "inputs loaded"
    );

    let plan = plan(
        PlanInputs {
            roads,
            poles,
            homes,
            prebuilt,
            diagnostics,
        },
        &config,
    )?;

    geojson_io::write_plan(&plan, &args.out_dir)
        .with_context(|| format!("writing layers to {}", args.out_dir.display()))?;
    write_json(&args.out_dir.join("report.json"), &plan.report)?;
    write_json(&args.out_dir.join("diagnostics.json"), &plan.diagnostics)?;

    println!(
        "{:>5} {:>6} {:>7} {:>7} {:>12} {:>12} {:>8} {:>10}",
        "hub", "homes", "aerial", "buried", "aerial_len", "ug_len", "%aerial", "len/home"
    );
    for row in &plan.report {
        println!(
            "{:>5} {:>6} {:>7} {:>7} {:>12.1} {:>12.1} {:>8.1} {:>10.1}",
            row.hub.0,
            row.homes,
            row.aerial_drops,
            row.buried_drops,
            row.aerial_length,
            row.underground_length,
            row.percent_aerial,
            row.length_per_home
        );
    }
    println!(
        "{} hubs, {} terminals, {} poles used, {} unroutable, {} invalid features, network cost {:.2}",
        plan.hubs.len(),
        plan.terminals.len(),
        plan.poles_used.len(),
        plan.diagnostics.unroutable.len(),
        plan.diagnostics.invalid_geometry.len(),
        plan.network_cost()
    );

    Ok(())
}
