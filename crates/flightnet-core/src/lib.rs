pub mod altitude;
pub mod drawing;
pub mod error;
pub mod exporter;
pub mod geometry;
pub mod linking;
pub mod models;
pub mod path_finder;
pub mod settings;
pub mod topology;

pub use altitude::{interpolate, query_batch, resolve_link_altitudes, ElevationProvider, FlatTerrain};
pub use drawing::{DrawingSession, DrawingState};
pub use error::{NetworkError, Result};
pub use exporter::{
    build_network, export_network, sort_segment_nodes, Export, ExportContext, ExportIndex,
    NetworkMeta, ResolvedValidationError,
};
pub use geometry::{distance_3d, haversine_distance, is_close_to, surface_distance};
pub use linking::{
    apply_links, clear_links, line_segments, link_buildings, run_link_pass, EdgeKey, LineSegment,
    Link, LinkPass, LinkSet,
};
pub use models::{
    Building, BuildingLink, ErrorDescriptionArg, ExportError, FlightNetwork, NetworkEdge,
    NetworkNode, NetworkSnapshot, NodeProps, NodeType, Position, ValidationError, ValidationErrors,
};
pub use path_finder::PathFinder;
pub use settings::ProjectSettings;
pub use topology::{Point, PointId, Segment, SegmentId, Topology, TopologyEvent};
