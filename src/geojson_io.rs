// ===========================================================================
// GeoJSON exchange: raw layers in, planned layers out
// ===========================================================================
use crate::error::{Diagnostics, GeometryIssue, Layer};
use crate::geometry::Geometry;
use crate::ingest::Pole;
use crate::planner::Plan;
use crate::records::{EdgeRecord, HubRecord, LeafRecord, NodeRecord, PoleRecord};
use geo::{Coord, Point};
use geojson::{Feature, FeatureCollection, JsonObject, JsonValue, Value};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("geojson error: {0}")]
    GeoJson(#[from] geojson::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn read_collection(path: &Path) -> Result<FeatureCollection, ExchangeError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(raw.parse::<FeatureCollection>()?)
}

pub fn write_collection(path: &Path, collection: &FeatureCollection) -> Result<(), ExchangeError> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(writer, collection)?;
    Ok(())
}

fn feature_geometry(feature: &Feature) -> Result<Geometry, GeometryIssue> {
    let geometry = feature.geometry.as_ref().ok_or(GeometryIssue::WrongKind)?;
    let value = geo_types::Geometry::<f64>::try_from(&geometry.value).map_err(|_| GeometryIssue::WrongKind)?;
    Geometry::try_from(value)
}

/// Numeric id from the `id` property, then the feature id.
fn feature_number(feature: &Feature, key: &str) -> Option<u64> {
    feature
        .property(key)
        .and_then(JsonValue::as_u64)
        .or_else(|| match &feature.id {
            Some(geojson::feature::Id::Number(n)) if key == "id" => n.as_u64(),
            Some(geojson::feature::Id::String(s)) if key == "id" => s.parse().ok(),
            _ => None,
        })
}

/// Road centerlines and candidate conduit runs. Features whose geometry is
/// missing or not a (multi)line string are counted and left out.
pub fn read_roads(collection: &FeatureCollection, diagnostics: &mut Diagnostics) -> Vec<Geometry> {
    let mut roads = Vec::with_capacity(collection.features.len());
    for (index, feature) in collection.features.iter().enumerate() {
        match feature_geometry(feature) {
            Ok(g @ (Geometry::LineString(_) | Geometry::MultiLineString(_))) => roads.push(g),
            Ok(Geometry::Point(_)) => diagnostics.record_invalid(Layer::Roads, index, GeometryIssue::WrongKind),
            Err(issue) => diagnostics.record_invalid(Layer::Roads, index, issue),
        }
    }
    roads
}

/// Poles keep their `id` when one is given and fall back to their position.
pub fn read_poles(collection: &FeatureCollection, diagnostics: &mut Diagnostics) -> Vec<Pole> {
    let mut poles = Vec::with_capacity(collection.features.len());
    for (index, feature) in collection.features.iter().enumerate() {
        match feature_geometry(feature).and_then(|g| g.as_point()) {
            Ok(coord) => poles.push(
                PoleRecord {
                    id: feature_number(feature, "id").unwrap_or(index as u64),
                    coordinates: [coord.x, coord.y],
                }
                .to_pole(),
            ),
            Err(issue) => diagnostics.record_invalid(Layer::Poles, index, issue),
        }
    }
    poles
}

/// Home points, in feature order.
pub fn read_homes(collection: &FeatureCollection, diagnostics: &mut Diagnostics) -> Vec<Geometry> {
    let mut homes = Vec::with_capacity(collection.features.len());
    for (index, feature) in collection.features.iter().enumerate() {
        match feature_geometry(feature) {
            Ok(g) => homes.push(g),
            Err(issue) => diagnostics.record_invalid(Layer::Homes, index, issue),
        }
    }
    homes
}

/// Prebuilt node layer. Attributes go through [`NodeRecord`]'s schema.
pub fn read_nodes(collection: &FeatureCollection, diagnostics: &mut Diagnostics) -> Vec<NodeRecord> {
    let mut nodes = Vec::with_capacity(collection.features.len());
    for (index, feature) in collection.features.iter().enumerate() {
        let coord = match feature_geometry(feature).and_then(|g| g.as_point()) {
            Ok(c) => c,
            Err(issue) => {
                diagnostics.record_invalid(Layer::Nodes, index, issue);
                continue;
            }
        };
        let mut properties = feature.properties.clone().unwrap_or_default();
        if !properties.contains_key("id") {
            if let Some(id) = feature_number(feature, "id") {
                properties.insert("id".to_string(), id.into());
            }
        }
        properties.insert("coordinates".to_string(), serde_json::json!([coord.x, coord.y]));

        match serde_json::from_value::<NodeRecord>(JsonValue::Object(properties)) {
            Ok(record) => nodes.push(record),
            Err(_) => diagnostics.record_invalid(Layer::Nodes, index, GeometryIssue::BadAttribute),
        }
    }
    nodes
}

/// Prebuilt edge layer. The line geometry is optional; without it the edge
/// is drawn straight between its nodes.
pub fn read_edges(collection: &FeatureCollection, diagnostics: &mut Diagnostics) -> Vec<EdgeRecord> {
    let mut edges = Vec::with_capacity(collection.features.len());
    for (index, feature) in collection.features.iter().enumerate() {
        let geometry = match feature.geometry.as_ref().map(|_| feature_geometry(feature)) {
            None => None,
            Some(Ok(Geometry::LineString(line))) => Some(line),
            Some(Ok(_)) => {
                diagnostics.record_invalid(Layer::Edges, index, GeometryIssue::WrongKind);
                continue;
            }
            Some(Err(issue)) => {
                diagnostics.record_invalid(Layer::Edges, index, issue);
                continue;
            }
        };
        let properties = feature.properties.clone().unwrap_or_default();
        match serde_json::from_value::<EdgeRecord>(JsonValue::Object(properties)) {
            Ok(record) => edges.push(EdgeRecord { geometry, ..record }),
            Err(_) => diagnostics.record_invalid(Layer::Edges, index, GeometryIssue::BadAttribute),
        }
    }
    edges
}

// ===========================================================================
// Output
// ===========================================================================

fn make_feature(value: Value, properties: JsonObject) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(value)),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Record attributes as properties; coordinates live in the geometry.
fn record_properties<T: Serialize>(record: &T) -> Result<JsonObject, ExchangeError> {
    match serde_json::to_value(record)? {
        JsonValue::Object(mut map) => {
            map.remove("coordinates");
            Ok(map)
        }
        _ => Ok(JsonObject::new()),
    }
}

fn point_value(c: Coord<f64>) -> Value {
    Value::from(&Point::from(c))
}

fn collection(features: Vec<Feature>) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

pub fn nodes_collection(plan: &Plan) -> Result<FeatureCollection, ExchangeError> {
    let mut features = Vec::with_capacity(plan.graph.node_count());
    for node in plan.graph.nodes() {
        let properties = record_properties(&NodeRecord::from(node))?;
        features.push(make_feature(point_value(node.coord), properties));
    }
    Ok(collection(features))
}

pub fn edges_collection(plan: &Plan) -> Result<FeatureCollection, ExchangeError> {
    let mut features = Vec::with_capacity(plan.graph.edge_count());
    for edge in plan.graph.edges() {
        let properties = record_properties(&EdgeRecord::from(edge))?;
        features.push(make_feature(Value::from(&edge.geometry), properties));
    }
    Ok(collection(features))
}

pub fn leaves_collection(plan: &Plan) -> Result<FeatureCollection, ExchangeError> {
    let mut features = Vec::with_capacity(plan.leaves.len());
    for leaf in &plan.leaves {
        let mut properties = record_properties(&LeafRecord::from(leaf))?;
        properties.insert("leaf".to_string(), leaf.id.0.into());
        properties.insert("unroutable".to_string(), plan.diagnostics.is_unroutable(leaf.id).into());
        features.push(make_feature(point_value(leaf.coord), properties));
    }
    Ok(collection(features))
}

pub fn hubs_collection(plan: &Plan) -> Result<FeatureCollection, ExchangeError> {
    let mut features = Vec::with_capacity(plan.hubs.len());
    for hub in &plan.hubs {
        let mut properties = record_properties(&HubRecord::from(hub))?;
        properties.insert("members".to_string(), hub.members.len().into());
        features.push(make_feature(point_value(hub.location), properties));
    }
    Ok(collection(features))
}

/// Service network edges tagged with their owning hub.
pub fn network_collection(plan: &Plan) -> FeatureCollection {
    let features = plan
        .network
        .resolve(&plan.graph)
        .map(|(edge, hub)| {
            let mut properties = JsonObject::new();
            properties.insert("edge".to_string(), edge.id.0.into());
            properties.insert("hub_id".to_string(), hub.0.into());
            properties.insert("category".to_string(), edge.category.as_str().into());
            properties.insert("length".to_string(), edge.length.into());
            properties.insert("cost".to_string(), edge.cost.into());
            make_feature(Value::from(&edge.geometry), properties)
        })
        .collect();
    collection(features)
}

pub fn backbone_collection(plan: &Plan) -> FeatureCollection {
    let coords: Vec<Coord<f64>> = plan.poles.iter().map(|p| p.coord).collect();
    let features = plan
        .backbone
        .edges
        .iter()
        .zip(plan.backbone.lines(&coords))
        .map(|(edge, line)| {
            let mut properties = JsonObject::new();
            properties.insert("from_pole".to_string(), plan.poles[edge.a].id.0.into());
            properties.insert("to_pole".to_string(), plan.poles[edge.b].id.0.into());
            properties.insert("weight".to_string(), edge.weight.into());
            make_feature(Value::from(&line), properties)
        })
        .collect();
    collection(features)
}

pub fn terminals_collection(plan: &Plan) -> Result<FeatureCollection, ExchangeError> {
    let mut features = Vec::with_capacity(plan.terminals.len());
    for terminal in &plan.terminals {
        let mut properties = record_properties(terminal)?;
        properties.insert("homes".to_string(), terminal.members.len().into());
        features.push(make_feature(point_value(terminal.location), properties));
    }
    Ok(collection(features))
}

pub fn poles_used_collection(plan: &Plan) -> Result<FeatureCollection, ExchangeError> {
    let mut features = Vec::with_capacity(plan.poles_used.len());
    for pole in plan.poles.iter().filter(|p| plan.poles_used.binary_search(&p.id).is_ok()) {
        let properties = record_properties(&PoleRecord::from(pole))?;
        features.push(make_feature(point_value(pole.coord), properties));
    }
    Ok(collection(features))
}

/// Write every planned layer into `out_dir` as `<layer>.geojson`.
pub fn write_plan(plan: &Plan, out_dir: &Path) -> Result<(), ExchangeError> {
    std::fs::create_dir_all(out_dir)?;

    let layers = [
        ("nodes", nodes_collection(plan)?),
        ("edges", edges_collection(plan)?),
        ("leaves", leaves_collection(plan)?),
        ("hubs", hubs_collection(plan)?),
        ("service_network", network_collection(plan)),
        ("backbone", backbone_collection(plan)),
        ("terminals", terminals_collection(plan)?),
        ("poles_used", poles_used_collection(plan)?),
    ];

    for (name, layer) in &layers {
        let path = out_dir.join(format!("{name}.geojson"));
        write_collection(&path, layer)?;
        info!(layer = *name, features = layer.features.len(), path = %path.display(), "wrote layer");
    }
    Ok(())
}
