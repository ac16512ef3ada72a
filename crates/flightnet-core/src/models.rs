//! Core data models for flight network planning.

use serde::{Deserialize, Serialize};

/// Geographic position in decimal degrees with an altitude in meters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub lon: f64,
    pub lat: f64,
    #[serde(default)]
    pub alt: f64,
}

impl Position {
    pub fn new(lon: f64, lat: f64, alt: f64) -> Self {
        Self { lon, lat, alt }
    }

    /// Position on the ellipsoid surface (altitude 0).
    pub fn surface(lon: f64, lat: f64) -> Self {
        Self { lon, lat, alt: 0.0 }
    }

    pub fn with_alt(self, alt: f64) -> Self {
        Self { alt, ..self }
    }

    /// Same longitude and latitude, compared exactly.
    pub fn same_lon_lat(&self, other: &Position) -> bool {
        self.lon == other.lon && self.lat == other.lat
    }

    pub fn is_finite(&self) -> bool {
        self.lon.is_finite() && self.lat.is_finite() && self.alt.is_finite()
    }
}

/// Node type tag controlling export behavior and distance labelling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Plain network vertex
    #[default]
    Waypoint,
    /// Building drop-off point
    Delivery,
    /// Traffic-control point drones hold at
    Semaphore,
    /// Network center
    Center,
}

impl NodeType {
    /// Parse a marker name case-insensitively ("SEMAPHORE", "semaphore", ...).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "waypoint" => Some(Self::Waypoint),
            "delivery" => Some(Self::Delivery),
            "semaphore" => Some(Self::Semaphore),
            "center" => Some(Self::Center),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Waypoint => "waypoint",
            NodeType::Delivery => "delivery",
            NodeType::Semaphore => "semaphore",
            NodeType::Center => "center",
        }
    }

    /// Whether this type is stored as a point marker.
    pub fn is_marker(&self) -> bool {
        matches!(self, NodeType::Semaphore | NodeType::Center)
    }
}

// ========== NETWORK SNAPSHOT ==========

/// Sidecar properties for one waypoint of the persisted network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeProps {
    pub segment_index: usize,
    pub waypoint_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flight_altitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker_type: Option<NodeType>,
}

/// Persisted/exchanged form of the topology.
///
/// Segments are `[lon, lat]` or `[lon, lat, alt]` coordinate arrays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub segments: Vec<Vec<Vec<f64>>>,
    #[serde(default)]
    pub node_props: Vec<NodeProps>,
}

impl NetworkSnapshot {
    /// Find the sidecar entry for a (segment, waypoint) index pair.
    pub fn find_node_props(&self, segment_index: usize, waypoint_index: usize) -> Option<&NodeProps> {
        self.node_props
            .iter()
            .find(|props| props.segment_index == segment_index && props.waypoint_index == waypoint_index)
    }

    /// Decode one coordinate array into a position.
    pub fn coordinate_to_position(coord: &[f64]) -> Option<Position> {
        match coord {
            [lon, lat] => Some(Position::new(*lon, *lat, 0.0)),
            [lon, lat, alt] => Some(Position::new(*lon, *lat, *alt)),
            _ => None,
        }
    }

    /// Segments decoded as positions. Malformed coordinates yield `None`.
    pub fn segment_positions(&self) -> Option<Vec<Vec<Position>>> {
        self.segments
            .iter()
            .map(|segment| {
                segment
                    .iter()
                    .map(|coord| Self::coordinate_to_position(coord))
                    .collect::<Option<Vec<_>>>()
            })
            .collect()
    }
}

// ========== BUILDINGS ==========

/// A connector from a building to the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingLink {
    /// `[building position, nearest position on the network line]`
    pub endpoints: [Position; 2],
    /// Flight altitude interpolated at the on-line endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flight_altitude: Option<f64>,
}

impl BuildingLink {
    pub fn building_position(&self) -> Position {
        self.endpoints[0]
    }

    pub fn on_line_position(&self) -> Position {
        self.endpoints[1]
    }
}

/// A delivery building surveyed for the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Building {
    pub id: String,
    #[serde(default)]
    pub survey_id: String,
    pub position: Position,
    #[serde(default)]
    pub locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flight_altitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<BuildingLink>,
}

// ========== EXPORT ARTIFACT ==========

/// One node of the exported flight network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkNode {
    pub id: u64,
    pub name: String,
    pub node_type: NodeType,
    pub longitude_deg: String,
    pub latitude_deg: String,
    pub flight_altitude_m: f64,
    pub uuid: String,
    pub ground_elevation_m: f64,
    pub network_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_test_point: Option<bool>,
}

impl NetworkNode {
    /// Parsed longitude; the wire format carries coordinates as strings.
    pub fn lon(&self) -> f64 {
        self.longitude_deg.parse().unwrap_or(f64::NAN)
    }

    pub fn lat(&self) -> f64 {
        self.latitude_deg.parse().unwrap_or(f64::NAN)
    }

    pub fn position(&self) -> Position {
        Position::new(self.lon(), self.lat(), 0.0)
    }
}

/// One directed edge of the exported flight network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEdge {
    pub id: u64,
    pub from_vertex_id: u64,
    pub to_vertex_id: u64,
    pub network_id: u64,
}

/// Complete export artifact sent to the GCS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightNetwork {
    pub id: u64,
    pub name: String,
    pub safe_up_land_timeout_sec: String,
    pub nodes: Vec<NetworkNode>,
    pub edges: Vec<NetworkEdge>,
}

// ========== VALIDATION ==========

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDescriptionArg {
    pub value: f64,
    pub units: String,
    #[serde(default)]
    pub precision: u32,
}

/// One structured error returned by the GCS validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub description: String,
    #[serde(default)]
    pub description_args: Vec<ErrorDescriptionArg>,
    #[serde(default)]
    pub node_ids: Vec<u64>,
    #[serde(default)]
    pub edge_ids: Vec<u64>,
}

impl ValidationError {
    /// Description with `{i}` placeholders replaced by `"<value> <units>"`.
    pub fn formatted_description(&self) -> String {
        let mut description = self.description.clone();
        for (index, arg) in self.description_args.iter().enumerate() {
            description = description.replace(
                &format!("{{{}}}", index),
                &format!("{:.2} {}", arg.value, arg.units),
            );
        }
        description
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationErrors {
    #[serde(default)]
    pub validation_errors: Vec<ValidationError>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorExtra {
    #[serde(default)]
    pub message_args: Vec<ErrorDescriptionArg>,
}

/// Body of a rejected GCS upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportError {
    pub message: String,
    #[serde(default)]
    pub extra: Option<ErrorExtra>,
}

impl From<ExportError> for ValidationError {
    fn from(error: ExportError) -> Self {
        Self {
            description: error.message,
            description_args: error.extra.map(|extra| extra.message_args).unwrap_or_default(),
            node_ids: Vec::new(),
            edge_ids: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_type_serializes_lowercase() {
        let json = serde_json::to_string(&NodeType::Semaphore).unwrap();
        assert_eq!(json, "\"semaphore\"");
        assert_eq!(NodeType::parse("CENTER"), Some(NodeType::Center));
        assert_eq!(NodeType::parse("tower"), None);
    }

    #[test]
    fn snapshot_accepts_two_and_three_element_coordinates() {
        let snapshot: NetworkSnapshot = serde_json::from_value(serde_json::json!({
            "id": "n1",
            "segments": [[[34.0, 32.0], [34.001, 32.001, 12.5]]],
            "node_props": [{"segment_index": 0, "waypoint_index": 1, "marker_type": "semaphore"}]
        }))
        .unwrap();

        let segments = snapshot.segment_positions().unwrap();
        assert_eq!(segments[0][0].alt, 0.0);
        assert_eq!(segments[0][1].alt, 12.5);
        assert_eq!(
            snapshot.find_node_props(0, 1).and_then(|p| p.marker_type),
            Some(NodeType::Semaphore)
        );
        assert!(snapshot.find_node_props(0, 0).is_none());
    }

    #[test]
    fn malformed_coordinate_is_rejected() {
        let snapshot = NetworkSnapshot {
            id: String::new(),
            segments: vec![vec![vec![1.0]]],
            node_props: Vec::new(),
        };
        assert!(snapshot.segment_positions().is_none());
    }

    #[test]
    fn validation_description_substitutes_arguments() {
        let error = ValidationError {
            description: "Edge too long: {0} (max {1})".to_string(),
            description_args: vec![
                ErrorDescriptionArg { value: 812.456, units: "m".into(), precision: 2 },
                ErrorDescriptionArg { value: 500.0, units: "m".into(), precision: 0 },
            ],
            node_ids: vec![],
            edge_ids: vec![3],
        };
        assert_eq!(error.formatted_description(), "Edge too long: 812.46 m (max 500.00 m)");
    }

    #[test]
    fn export_error_converts_without_ids() {
        let error: ValidationError = ExportError {
            message: "Network is locked".into(),
            extra: None,
        }
        .into();
        assert!(error.node_ids.is_empty());
        assert!(error.description_args.is_empty());
    }
}
