//! Flight network export.
//!
//! Walks every segment edge in drawing order and emits the node/edge graph
//! consumed by the GCS. Node and edge ids come from one per-export counter,
//! so re-exporting the same topology yields the same geometry but fresh ids.

use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::altitude::{query_batch, ElevationProvider};
use crate::error::Result;
use crate::geometry::distance_3d;
use crate::linking::{run_link_pass, LineSegment, LinkSet};
use crate::models::{
    Building, FlightNetwork, NetworkEdge, NetworkNode, NodeType, Position, ValidationError,
};
use crate::settings::ProjectSettings;
use crate::topology::Topology;

/// Safety timeout sent with every exported network.
pub const SAFE_UP_LAND_TIMEOUT_SEC: &str = "30";

/// Identity of the exported network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkMeta {
    pub id: u64,
    pub name: String,
}

/// Per-export id counter shared by nodes and edges.
#[derive(Debug, Clone)]
pub struct ExportContext {
    next_id: u64,
}

impl Default for ExportContext {
    fn default() -> Self {
        Self { next_id: 1 }
    }
}

impl ExportContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

fn create_node(id: u64, name: String, node_type: NodeType, position: &Position, flight_altitude_m: f64) -> NetworkNode {
    NetworkNode {
        id,
        name,
        node_type,
        longitude_deg: position.lon.to_string(),
        latitude_deg: position.lat.to_string(),
        flight_altitude_m,
        uuid: Uuid::new_v4().to_string(),
        ground_elevation_m: 0.0,
        network_id: 0,
        address: None,
        is_test_point: None,
    }
}

fn create_waypoint(ctx: &mut ExportContext, node_type: NodeType, position: &Position, flight_altitude_m: f64) -> NetworkNode {
    let id = ctx.next_id();
    create_node(id, format!("WP {}", id), node_type, position, flight_altitude_m)
}

fn create_edge(ctx: &mut ExportContext, from: u64, to: u64) -> NetworkEdge {
    NetworkEdge {
        id: ctx.next_id(),
        from_vertex_id: from,
        to_vertex_id: to,
        network_id: 0,
    }
}

/// Find a non-delivery node at exactly `position`'s longitude and latitude.
pub fn find_node<'a>(nodes: impl IntoIterator<Item = &'a NetworkNode>, position: &Position) -> Option<&'a NetworkNode> {
    nodes
        .into_iter()
        .find(|node| node.node_type != NodeType::Delivery && node.lon() == position.lon && node.lat() == position.lat)
}

/// Order a node chain by ascending 3D distance from its first node.
///
/// The sort is stable, so the first node (distance 0) stays first.
pub fn sort_segment_nodes(nodes: &mut [NetworkNode]) {
    let Some(start) = nodes.first().map(NetworkNode::position) else {
        return;
    };
    nodes.sort_by(|a, b| {
        distance_3d(&start, &a.position()).total_cmp(&distance_3d(&start, &b.position()))
    });
}

/// Build the network graph from resolved lines and links. Ground elevations
/// are left at 0; [`export_network`] fills them in.
pub fn build_network(
    ctx: &mut ExportContext,
    meta: &NetworkMeta,
    lines: &[LineSegment],
    links: &LinkSet,
    buildings: &[Building],
    settings: &ProjectSettings,
) -> (FlightNetwork, ExportIndex) {
    let default_altitude = settings.flight_altitude_m;
    let buildings_by_id: HashMap<&str, &Building> = buildings.iter().map(|b| (b.id.as_str(), b)).collect();

    let mut nodes: Vec<NetworkNode> = Vec::new();
    let mut edges: Vec<NetworkEdge> = Vec::new();
    let mut deliveries: HashMap<u64, String> = HashMap::new();

    for line in lines {
        let start = match find_node(&nodes, &line.start_position) {
            Some(node) => (node.clone(), false),
            None => (
                create_waypoint(
                    ctx,
                    line.start_marker.unwrap_or_default(),
                    &line.start_position,
                    line.flight_altitudes[0],
                ),
                true,
            ),
        };
        let end = match find_node(nodes.iter().chain(std::iter::once(&start.0)), &line.end_position) {
            Some(node) => (node.clone(), false),
            None => (
                create_waypoint(
                    ctx,
                    line.end_marker.unwrap_or_default(),
                    &line.end_position,
                    line.flight_altitudes[1],
                ),
                true,
            ),
        };

        if start.0.id == end.0.id {
            tracing::debug!("Skipping zero-length edge {:?}", line.key);
            continue;
        }

        // Interior nodes of this edge and whether each one is new.
        let mut interior: Vec<(NetworkNode, bool)> = Vec::new();

        for link in links.for_edge(line.key) {
            let Some(building) = buildings_by_id.get(link.building_id.as_str()) else {
                tracing::warn!("Link references unknown building {}", link.building_id);
                continue;
            };
            let building_altitude = building.flight_altitude.unwrap_or(default_altitude);
            let mut delivery = create_node(
                ctx.next_id(),
                building.address.clone().unwrap_or_default(),
                NodeType::Delivery,
                &building.position,
                building_altitude,
            );
            delivery.address = building.address.clone();
            deliveries.insert(delivery.id, building.id.clone());

            let on_line = link.endpoints[1];
            if building.position.same_lon_lat(&on_line) {
                // Building sits on the line: it becomes part of the chain.
                interior.push((delivery, true));
                continue;
            }

            let existing = find_node(
                nodes
                    .iter()
                    .chain([&start.0, &end.0])
                    .chain(interior.iter().map(|(node, _)| node)),
                &on_line,
            )
            .map(|node| node.id);
            let waypoint_id = match existing {
                Some(id) => id,
                None => {
                    let altitude = link.flight_altitude.unwrap_or(building_altitude);
                    let waypoint = create_waypoint(ctx, NodeType::Waypoint, &on_line, altitude);
                    let id = waypoint.id;
                    interior.push((waypoint, true));
                    id
                }
            };
            edges.push(create_edge(ctx, waypoint_id, delivery.id));
            nodes.push(delivery);
        }

        let mut chain: Vec<(NetworkNode, bool)> = Vec::with_capacity(interior.len() + 2);
        chain.push(start);
        chain.extend(interior);
        chain.push(end);

        let mut chain_nodes: Vec<NetworkNode> = chain.iter().map(|(node, _)| node.clone()).collect();
        sort_segment_nodes(&mut chain_nodes);
        for pair in chain_nodes.windows(2) {
            edges.push(create_edge(ctx, pair[0].id, pair[1].id));
        }

        nodes.extend(chain.into_iter().filter(|(_, is_new)| *is_new).map(|(node, _)| node));
    }

    let network = FlightNetwork {
        id: meta.id,
        name: meta.name.clone(),
        safe_up_land_timeout_sec: SAFE_UP_LAND_TIMEOUT_SEC.to_string(),
        nodes,
        edges,
    };
    let index = ExportIndex::new(&network, deliveries);
    (network, index)
}

/// Result of a full export pass.
#[derive(Debug, Clone)]
pub struct Export {
    pub network: FlightNetwork,
    pub index: ExportIndex,
    /// Links resolved during the pass, to be written back onto buildings
    pub links: LinkSet,
}

/// Re-link buildings, build the graph and attach ground elevations.
///
/// Any elevation failure aborts the whole export; no partial graph is
/// returned.
pub async fn export_network<P: ElevationProvider>(
    provider: &P,
    meta: &NetworkMeta,
    topology: &Topology,
    buildings: &[Building],
    settings: &ProjectSettings,
) -> Result<Export> {
    let pass = run_link_pass(provider, topology, buildings, settings).await?;

    let mut ctx = ExportContext::new();
    let (mut network, index) = build_network(&mut ctx, meta, &pass.lines, &pass.links, buildings, settings);

    let positions: Vec<(f64, f64)> = network.nodes.iter().map(|node| (node.lon(), node.lat())).collect();
    let elevations = query_batch(provider, &positions).await?;
    for (node, elevation) in network.nodes.iter_mut().zip(elevations) {
        node.ground_elevation_m = elevation;
    }
    let index = index.with_network(&network);

    tracing::info!(
        "Exported network {} ({} nodes, {} edges, {} linked buildings)",
        meta.id,
        network.nodes.len(),
        network.edges.len(),
        pass.links.len()
    );

    Ok(Export {
        network,
        index,
        links: pass.links,
    })
}

// ========== VALIDATION MAPPING ==========

/// Lookup tables of the last export, used to map validation results back
/// onto nodes and edges.
#[derive(Debug, Clone, Default)]
pub struct ExportIndex {
    nodes: HashMap<u64, NetworkNode>,
    edges: HashMap<u64, NetworkEdge>,
    /// DELIVERY node id -> building id
    deliveries: HashMap<u64, String>,
}

/// A validation error with its node and edge references resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedValidationError {
    pub error: ValidationError,
    pub message: String,
    pub nodes: Vec<NetworkNode>,
    /// `(from, to)` node pairs of the referenced edges
    pub edges: Vec<(NetworkNode, NetworkNode)>,
    /// Buildings behind referenced DELIVERY nodes
    pub buildings: Vec<String>,
}

impl ExportIndex {
    pub fn new(network: &FlightNetwork, deliveries: HashMap<u64, String>) -> Self {
        Self {
            nodes: network.nodes.iter().map(|n| (n.id, n.clone())).collect(),
            edges: network.edges.iter().map(|e| (e.id, e.clone())).collect(),
            deliveries,
        }
    }

    fn with_network(self, network: &FlightNetwork) -> Self {
        Self::new(network, self.deliveries)
    }

    pub fn node(&self, id: u64) -> Option<&NetworkNode> {
        self.nodes.get(&id)
    }

    pub fn edge(&self, id: u64) -> Option<&NetworkEdge> {
        self.edges.get(&id)
    }

    pub fn building_for(&self, node_id: u64) -> Option<&str> {
        self.deliveries.get(&node_id).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Map validation errors onto the exported graph. Ids that are not part
    /// of this export are skipped.
    pub fn resolve(&self, errors: &[ValidationError]) -> Vec<ResolvedValidationError> {
        errors
            .iter()
            .map(|error| {
                let mut nodes = Vec::new();
                let mut buildings = Vec::new();
                for id in &error.node_ids {
                    match self.nodes.get(id) {
                        Some(node) => {
                            if let Some(building) = self.deliveries.get(id) {
                                buildings.push(building.clone());
                            }
                            nodes.push(node.clone());
                        }
                        None => tracing::warn!("Validation error references unknown node {}", id),
                    }
                }

                let mut edges = Vec::new();
                for id in &error.edge_ids {
                    let resolved = self.edges.get(id).and_then(|edge| {
                        Some((
                            self.nodes.get(&edge.from_vertex_id)?.clone(),
                            self.nodes.get(&edge.to_vertex_id)?.clone(),
                        ))
                    });
                    match resolved {
                        Some(pair) => edges.push(pair),
                        None => tracing::warn!("Validation error references unknown edge {}", id),
                    }
                }

                ResolvedValidationError {
                    message: error.formatted_description(),
                    error: error.clone(),
                    nodes,
                    edges,
                    buildings,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::altitude::FlatTerrain;
    use crate::geometry::offset_by_bearing;
    use crate::linking::{line_segments, link_buildings};
    use crate::models::ErrorDescriptionArg;
    use std::collections::HashSet;

    fn meta() -> NetworkMeta {
        NetworkMeta {
            id: 7,
            name: "Test network".into(),
        }
    }

    fn pos(lon: f64, lat: f64) -> Position {
        Position::surface(lon, lat)
    }

    fn building(id: &str, position: Position) -> Building {
        Building {
            id: id.into(),
            survey_id: "s1".into(),
            position,
            locked: true,
            flight_altitude: Some(40.0),
            address: Some(format!("{} Main St", id)),
            link: None,
        }
    }

    async fn export(topology: &Topology, buildings: &[Building]) -> Export {
        export_network(&FlatTerrain::new(12.0), &meta(), topology, buildings, &ProjectSettings::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn disjoint_segments_export_two_nodes_each() {
        let mut topology = Topology::new();
        for i in 0..3 {
            let lat = 32.0 + i as f64 * 0.01;
            topology.add_segment(&[pos(34.0, lat), pos(34.001, lat)]).unwrap();
        }

        let export = export(&topology, &[]).await;
        assert_eq!(export.network.nodes.len(), 6);
        assert_eq!(export.network.edges.len(), 3);
        assert_eq!(export.network.safe_up_land_timeout_sec, "30");
        assert!(export.network.nodes.iter().all(|n| n.ground_elevation_m == 12.0));
    }

    #[tokio::test]
    async fn shared_endpoint_resolves_to_one_node() {
        let mut topology = Topology::new();
        topology.add_segment(&[pos(0.0, 0.0), pos(1.0, 1.0)]).unwrap();
        topology.add_segment(&[pos(1.0, 1.0), pos(2.0, 2.0)]).unwrap();

        let export = export(&topology, &[]).await;
        assert_eq!(export.network.nodes.len(), 3);
        assert_eq!(export.network.edges.len(), 2);

        let ids: HashSet<u64> = export
            .network
            .nodes
            .iter()
            .map(|n| n.id)
            .chain(export.network.edges.iter().map(|e| e.id))
            .collect();
        assert_eq!(ids.len(), 5, "node and edge ids share one counter");
    }

    #[tokio::test]
    async fn node_props_drive_altitude_and_type() {
        let mut topology = Topology::new();
        let segment = topology.add_segment(&[pos(34.0, 32.0), pos(34.001, 32.0)]).unwrap();
        let points = topology.segment(segment).unwrap().points.clone();
        topology.set_altitude(points[0], Some(0.0)).unwrap();
        topology.set_marker(points[1], NodeType::Semaphore).unwrap();

        let export = export(&topology, &[]).await;
        let nodes = &export.network.nodes;
        assert_eq!(nodes[0].flight_altitude_m, 0.0);
        assert_eq!(nodes[0].node_type, NodeType::Waypoint);
        assert_eq!(nodes[0].name, format!("WP {}", nodes[0].id));
        assert_eq!(nodes[1].node_type, NodeType::Semaphore);
        assert_eq!(nodes[1].flight_altitude_m, 70.0);
    }

    #[tokio::test]
    async fn linked_building_adds_connector_and_delivery() {
        let mut topology = Topology::new();
        topology.add_segment(&[pos(34.0, 32.0), pos(34.002, 32.0)]).unwrap();
        let (lat, lon) = offset_by_bearing(32.0, 34.001, 20.0, 0.0);
        let buildings = vec![building("b1", pos(lon, lat))];

        let export = export(&topology, &buildings).await;
        let network = &export.network;

        // start, end, connector waypoint, delivery
        assert_eq!(network.nodes.len(), 4);
        // connector->delivery plus start->connector->end
        assert_eq!(network.edges.len(), 3);

        let delivery = network.nodes.iter().find(|n| n.node_type == NodeType::Delivery).unwrap();
        assert_eq!(delivery.name, "b1 Main St");
        assert_eq!(delivery.flight_altitude_m, 40.0);
        assert_eq!(export.index.building_for(delivery.id), Some("b1"));

        let connector = network
            .edges
            .iter()
            .find(|e| e.to_vertex_id == delivery.id)
            .map(|e| e.from_vertex_id)
            .unwrap();
        // The chain runs through the connector waypoint.
        assert!(network.edges.iter().any(|e| e.to_vertex_id == connector));
        assert!(network.edges.iter().any(|e| e.from_vertex_id == connector && e.to_vertex_id != delivery.id));
        assert!(export.links.get("b1").unwrap().flight_altitude.is_some());
    }

    #[test]
    fn building_on_the_line_is_spliced_into_the_chain() {
        let mut topology = Topology::new();
        topology.add_segment(&[pos(34.0, 32.0), pos(34.002, 32.0)]).unwrap();
        let settings = ProjectSettings::default();
        let lines = line_segments(&topology, &settings);
        let buildings = vec![building("b1", pos(34.001, 32.0))];
        let mut links = link_buildings(&lines, &buildings);
        for link in links.iter_mut() {
            link.endpoints[1] = link.endpoints[0];
        }

        let (network, _) = build_network(&mut ExportContext::new(), &meta(), &lines, &links, &buildings, &settings);

        assert_eq!(network.nodes.len(), 3);
        assert_eq!(network.edges.len(), 2);
        let delivery = network.nodes.iter().find(|n| n.node_type == NodeType::Delivery).unwrap();
        assert!(network.edges.iter().any(|e| e.to_vertex_id == delivery.id));
        assert!(network.edges.iter().any(|e| e.from_vertex_id == delivery.id));
    }

    #[test]
    fn building_close_to_the_line_still_gets_a_connector() {
        let mut topology = Topology::new();
        topology.add_segment(&[pos(34.0, 32.0), pos(34.002, 32.0)]).unwrap();
        let settings = ProjectSettings::default();
        let lines = line_segments(&topology, &settings);
        // Closer than the building radius.
        let (lat, lon) = offset_by_bearing(32.0, 34.001, 1.5, 0.0);
        let buildings = vec![building("b1", pos(lon, lat))];
        let links = link_buildings(&lines, &buildings);

        let (network, _) = build_network(&mut ExportContext::new(), &meta(), &lines, &links, &buildings, &settings);

        assert_eq!(network.nodes.len(), 4);
        assert_eq!(network.edges.len(), 3);
        let delivery = network.nodes.iter().find(|n| n.node_type == NodeType::Delivery).unwrap();
        let into_delivery: Vec<&NetworkEdge> = network.edges.iter().filter(|e| e.to_vertex_id == delivery.id).collect();
        assert_eq!(into_delivery.len(), 1);
        assert!(!network.edges.iter().any(|e| e.from_vertex_id == delivery.id));
        let connector = network.nodes.iter().find(|n| n.id == into_delivery[0].from_vertex_id).unwrap();
        assert_eq!(connector.node_type, NodeType::Waypoint);
        assert_eq!(connector.name, format!("WP {}", connector.id));
    }

    #[test]
    fn sort_is_non_decreasing_from_first() {
        let mut ctx = ExportContext::new();
        let start = pos(34.0, 32.0);
        let mut nodes: Vec<NetworkNode> = [
            start,
            pos(34.003, 32.0),
            pos(34.001, 32.0),
            pos(34.0, 32.002),
            pos(34.0005, 32.0),
        ]
        .iter()
        .map(|p| create_waypoint(&mut ctx, NodeType::Waypoint, p, 70.0))
        .collect();

        sort_segment_nodes(&mut nodes);

        assert_eq!(nodes[0].position(), start);
        let distances: Vec<f64> = nodes.iter().map(|n| distance_3d(&start, &n.position())).collect();
        assert!(distances.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn index_resolves_errors_and_skips_unknown_ids() {
        let mut topology = Topology::new();
        topology.add_segment(&[pos(34.0, 32.0), pos(34.001, 32.0)]).unwrap();
        let export = export(&topology, &[]).await;
        let edge = &export.network.edges[0];

        let errors = vec![ValidationError {
            description: "Edge shorter than {0}".into(),
            description_args: vec![ErrorDescriptionArg {
                value: 150.0,
                units: "m".into(),
                precision: 0,
            }],
            node_ids: vec![edge.from_vertex_id, 9_999],
            edge_ids: vec![edge.id, 8_888],
        }];

        let resolved = export.index.resolve(&errors);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].message, "Edge shorter than 150.00 m");
        assert_eq!(resolved[0].nodes.len(), 1);
        assert_eq!(resolved[0].edges.len(), 1);
        assert_eq!(resolved[0].edges[0].0.id, edge.from_vertex_id);
        assert_eq!(resolved[0].edges[0].1.id, edge.to_vertex_id);
    }

    #[tokio::test]
    async fn elevation_failure_aborts_export() {
        struct Offline;
        impl ElevationProvider for Offline {
            async fn query_elevations(&self, _positions: &[(f64, f64)]) -> Result<Vec<f64>> {
                Err(crate::error::NetworkError::ElevationService("offline".into()))
            }
        }

        let mut topology = Topology::new();
        topology.add_segment(&[pos(34.0, 32.0), pos(34.001, 32.0)]).unwrap();
        let result = export_network(&Offline, &meta(), &topology, &[], &ProjectSettings::default()).await;
        assert!(matches!(result, Err(crate::error::NetworkError::ElevationService(_))));
    }
}
