//! Building-to-segment linking.
//!
//! Every two-point edge of every segment gets a buffered search polygon of
//! `max_connector_distance`. Locked buildings inside the polygon are linked to
//! the nearest point on the edge. A building that qualifies for several edges
//! stays with the first one unless a later edge is strictly closer.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::geometry::{buffer_line, distance_3d, nearest_point_on_line, polygon_contains};
use crate::models::{Building, BuildingLink, NodeType, Position};
use crate::settings::ProjectSettings;
use crate::topology::{PointId, SegmentId, Topology};

/// Identifies one two-point edge of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EdgeKey {
    pub segment: SegmentId,
    /// Index of the edge's start point within the segment
    pub index: usize,
}

/// One edge of a segment, derived on demand.
#[derive(Debug, Clone, Serialize)]
pub struct LineSegment {
    pub key: EdgeKey,
    /// Position of the segment in drawing order
    pub segment_index: usize,
    pub start: PointId,
    pub end: PointId,
    pub start_position: Position,
    pub end_position: Position,
    /// Flight altitudes at both ends (override or project default)
    pub flight_altitudes: [f64; 2],
    pub start_marker: Option<NodeType>,
    pub end_marker: Option<NodeType>,
    /// Closed `[lon, lat]` ring of the search buffer
    #[serde(skip)]
    pub buffer: Vec<[f64; 2]>,
}

impl LineSegment {
    pub fn contains(&self, position: &Position) -> bool {
        polygon_contains(&self.buffer, position.lon, position.lat)
    }
}

/// Derive the line segments of a topology. Segments with fewer than 2 points
/// contribute nothing.
pub fn line_segments(topology: &Topology, settings: &ProjectSettings) -> Vec<LineSegment> {
    let mut lines = Vec::new();
    for (segment_index, segment) in topology.segments().iter().enumerate() {
        let points = topology.segment_points(segment.id);
        if points.len() < 2 {
            tracing::debug!("Skipping degenerate segment {}", segment.id);
            continue;
        }
        for (index, pair) in points.windows(2).enumerate() {
            let (start, end) = (pair[0], pair[1]);
            let start_position = start.position.with_alt(0.0);
            let end_position = end.position.with_alt(0.0);
            lines.push(LineSegment {
                key: EdgeKey {
                    segment: segment.id,
                    index,
                },
                segment_index,
                start: start.id,
                end: end.id,
                start_position,
                end_position,
                flight_altitudes: [
                    start.altitude.unwrap_or(settings.flight_altitude_m),
                    end.altitude.unwrap_or(settings.flight_altitude_m),
                ],
                start_marker: start.marker,
                end_marker: end.marker,
                buffer: buffer_line(&start_position, &end_position, settings.max_connector_distance),
            });
        }
    }
    lines
}

/// A building assigned to an edge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Link {
    pub building_id: String,
    pub survey_id: String,
    pub edge: EdgeKey,
    /// `[building position, nearest position on the edge]`
    pub endpoints: [Position; 2],
    /// Straight-line connector length in meters
    pub distance_m: f64,
    /// Interpolated flight altitude at the on-line endpoint, once resolved
    pub flight_altitude: Option<f64>,
}

impl Link {
    pub fn to_building_link(&self) -> BuildingLink {
        BuildingLink {
            endpoints: self.endpoints,
            flight_altitude: self.flight_altitude,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkingStats {
    pub lines: usize,
    pub candidates: usize,
    pub reassigned: usize,
}

/// Outcome of one linking pass, keyed by building id.
#[derive(Debug, Default, Clone, Serialize)]
pub struct LinkSet {
    links: BTreeMap<String, Link>,
    /// Building ids in assignment order
    order: Vec<String>,
    pub stats: LinkingStats,
}

impl LinkSet {
    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn get(&self, building_id: &str) -> Option<&Link> {
        self.links.get(building_id)
    }

    /// Links in first-assignment order.
    pub fn iter(&self) -> impl Iterator<Item = &Link> {
        self.order.iter().filter_map(|id| self.links.get(id))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Link> {
        self.links.values_mut()
    }

    /// Links attached to one edge, in assignment order.
    pub fn for_edge(&self, edge: EdgeKey) -> impl Iterator<Item = &Link> {
        self.iter().filter(move |link| link.edge == edge)
    }

    /// Links grouped by the segment their edge belongs to.
    pub fn by_segment(&self) -> BTreeMap<SegmentId, Vec<&Link>> {
        let mut grouped: BTreeMap<SegmentId, Vec<&Link>> = BTreeMap::new();
        for link in self.iter() {
            grouped.entry(link.edge.segment).or_default().push(link);
        }
        grouped
    }

    fn assign(&mut self, link: Link) {
        if !self.links.contains_key(&link.building_id) {
            self.order.push(link.building_id.clone());
        }
        self.links.insert(link.building_id.clone(), link);
    }
}

/// Link locked buildings to their nearest edge.
///
/// `lines` and `buildings` are processed in the given order, which decides
/// the outcome only when two edges are at exactly the same distance.
pub fn link_buildings(lines: &[LineSegment], buildings: &[Building]) -> LinkSet {
    let mut links = LinkSet::default();
    links.stats.lines = lines.len();

    let locked: Vec<&Building> = buildings.iter().filter(|b| b.locked).collect();

    for line in lines {
        for building in locked.iter().filter(|b| line.contains(&b.position)) {
            links.stats.candidates += 1;

            let building_position = building.position.with_alt(0.0);
            let nearest = nearest_point_on_line(&building_position, &line.start_position, &line.end_position);
            let distance_m = distance_3d(&building_position, &nearest.position);

            if let Some((previous_edge, previous_distance)) =
                links.get(&building.id).map(|link| (link.edge, link.distance_m))
            {
                if previous_edge == line.key || distance_m >= previous_distance {
                    continue;
                }
                links.stats.reassigned += 1;
                tracing::debug!(
                    "Reassigning building {} from {:?} to {:?} ({:.1} m < {:.1} m)",
                    building.id,
                    previous_edge,
                    line.key,
                    distance_m,
                    previous_distance
                );
            }

            links.assign(Link {
                building_id: building.id.clone(),
                survey_id: building.survey_id.clone(),
                edge: line.key,
                endpoints: [building_position, nearest.position],
                distance_m,
                flight_altitude: None,
            });
        }
    }

    tracing::debug!(
        "Linking pass: {} lines, {} candidates, {} linked, {} reassigned",
        links.stats.lines,
        links.stats.candidates,
        links.len(),
        links.stats.reassigned
    );
    links
}

/// Drop every previous link from the buildings.
pub fn clear_links(buildings: &mut [Building]) {
    for building in buildings.iter_mut() {
        building.link = None;
    }
}

/// Write resolved links back onto the buildings. Buildings without a link
/// in `links` are left unlinked.
pub fn apply_links(buildings: &mut [Building], links: &LinkSet) {
    for building in buildings.iter_mut() {
        building.link = links.get(&building.id).map(Link::to_building_link);
    }
}

/// Result of a linking pass with resolved altitudes.
#[derive(Debug, Clone, Serialize)]
pub struct LinkPass {
    pub lines: Vec<LineSegment>,
    pub links: LinkSet,
}

/// Full linking pass: derive edges, link buildings and resolve link
/// altitudes with one batched elevation query.
pub async fn run_link_pass<P>(
    provider: &P,
    topology: &Topology,
    buildings: &[Building],
    settings: &ProjectSettings,
) -> Result<LinkPass>
where
    P: crate::altitude::ElevationProvider,
{
    let mut lines = line_segments(topology, settings);
    let mut links = link_buildings(&lines, buildings);
    crate::altitude::resolve_link_altitudes(provider, &mut lines, &mut links, settings).await?;
    Ok(LinkPass { lines, links })
}
