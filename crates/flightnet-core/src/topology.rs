//! Topology model: drawn polylines and the bound-point relation.
//!
//! Points live in an arena keyed by [`PointId`]. A point is owned by exactly
//! one segment but may be *bound* to points of other segments that sit at the
//! same physical location. Bindings are stored as id sets, never references,
//! and every bind operation closes the affected points into a clique.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::error::{NetworkError, Result};
use crate::geometry::is_close_to;
use crate::models::{NetworkSnapshot, NodeProps, NodeType, Position};

/// Stable point identifier, assigned once and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PointId(pub u32);

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(pub u32);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// A vertex of a segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    pub id: PointId,
    pub segment: SegmentId,
    pub position: Position,
    /// Flight altitude override in meters
    pub altitude: Option<f64>,
    /// SEMAPHORE or CENTER marker
    pub marker: Option<NodeType>,
    pub bound: BTreeSet<PointId>,
}

/// One drawn polyline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub id: SegmentId,
    pub points: Vec<PointId>,
}

/// Notifications for collaborators that mirror topology state (renderers,
/// label layers, autosave).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TopologyEvent {
    PointMoved { point: PointId, position: Position },
    AltitudeChanged { point: PointId, altitude: Option<f64> },
    /// A marked point moved or was (re)marked; its marker must be redrawn.
    MarkerRefresh { point: PointId, marker: NodeType },
    MarkerCleared { point: PointId },
    SegmentDisposed { segment: SegmentId },
    /// Topology changed; distance labels and persisted snapshot are stale.
    Changed,
}

#[derive(Debug, Clone, Default)]
pub struct Topology {
    points: HashMap<PointId, Point>,
    segments: Vec<Segment>,
    next_point_id: u32,
    next_segment_id: u32,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    // ========== QUERIES ==========

    pub fn point(&self, id: PointId) -> Option<&Point> {
        self.points.get(&id)
    }

    fn point_mut(&mut self, id: PointId) -> Result<&mut Point> {
        self.points.get_mut(&id).ok_or(NetworkError::UnknownPoint(id))
    }

    pub fn segment(&self, id: SegmentId) -> Option<&Segment> {
        self.segments.iter().find(|segment| segment.id == id)
    }

    /// Segments in drawing order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment_index(&self, id: SegmentId) -> Option<usize> {
        self.segments.iter().position(|segment| segment.id == id)
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Points of a segment in order.
    pub fn segment_points(&self, id: SegmentId) -> Vec<&Point> {
        self.segment(id)
            .map(|segment| segment.points.iter().filter_map(|pid| self.points.get(pid)).collect())
            .unwrap_or_default()
    }

    /// `(segment index, point index)` of a point.
    pub fn locate(&self, id: PointId) -> Option<(usize, usize)> {
        let point = self.points.get(&id)?;
        let segment_index = self.segment_index(point.segment)?;
        let point_index = self.segments[segment_index]
            .points
            .iter()
            .position(|pid| *pid == id)?;
        Some((segment_index, point_index))
    }

    /// Bound neighbours of a point.
    pub fn bound_points(&self, id: PointId) -> impl Iterator<Item = PointId> + '_ {
        self.points
            .get(&id)
            .into_iter()
            .flat_map(|point| point.bound.iter().copied())
    }

    /// Equivalence id of a point: the smallest id among the point and its
    /// direct bound neighbours.
    ///
    /// Resolution is a single hop. Longer chains of coincident points are not
    /// collapsed into one class.
    pub fn resolve_equivalence_id(&self, id: PointId) -> PointId {
        self.bound_points(id).fold(id, |lowest, bound| lowest.min(bound))
    }

    // ========== SEGMENT CONSTRUCTION ==========

    /// Start an empty segment (drawing mode).
    pub fn create_segment(&mut self) -> SegmentId {
        let id = SegmentId(self.next_segment_id);
        self.next_segment_id += 1;
        self.segments.push(Segment { id, points: Vec::new() });
        id
    }

    /// Append a point to a segment.
    pub fn push_point(&mut self, segment: SegmentId, position: Position) -> Result<PointId> {
        let len = self
            .segment(segment)
            .map(|s| s.points.len())
            .ok_or(NetworkError::UnknownSegment(segment))?;
        self.insert_point(segment, len, position)
    }

    /// Insert a point at `index` (clamped to the segment length).
    pub fn insert_point(&mut self, segment: SegmentId, index: usize, position: Position) -> Result<PointId> {
        let seg_index = self
            .segment_index(segment)
            .ok_or(NetworkError::UnknownSegment(segment))?;
        let id = PointId(self.next_point_id);
        self.next_point_id += 1;

        self.points.insert(
            id,
            Point {
                id,
                segment,
                position,
                altitude: None,
                marker: None,
                bound: BTreeSet::new(),
            },
        );
        let points = &mut self.segments[seg_index].points;
        let index = index.min(points.len());
        points.insert(index, id);
        Ok(id)
    }

    /// Add a finished polyline. Its first and last points are bound to every
    /// existing point within 1 m.
    ///
    /// Returns `None` (and adds nothing) when fewer than 2 positions are given.
    pub fn add_segment(&mut self, positions: &[Position]) -> Option<SegmentId> {
        if positions.len() < 2 {
            return None;
        }

        let segment = self.create_segment();
        let mut ids = Vec::with_capacity(positions.len());
        for position in positions {
            // Segment was created above.
            ids.push(self.push_point(segment, *position).ok()?);
        }

        let endpoints = [ids[0], ids[ids.len() - 1]];
        for endpoint in endpoints {
            let Some(position) = self.points.get(&endpoint).map(|p| p.position) else {
                continue;
            };
            let close: Vec<PointId> = self
                .points
                .values()
                .filter(|other| other.segment != segment && is_close_to(&position, &other.position))
                .map(|other| other.id)
                .collect();
            for other in close {
                // Both ids exist; ignore the impossible error.
                let _ = self.hook(endpoint, other);
            }
        }

        Some(segment)
    }

    /// Dispose a segment if it has fewer than 2 points.
    pub fn discard_if_degenerate(&mut self, segment: SegmentId) -> Result<Vec<TopologyEvent>> {
        let len = self
            .segment(segment)
            .map(|s| s.points.len())
            .ok_or(NetworkError::UnknownSegment(segment))?;
        if len < 2 {
            self.remove_segment(segment)
        } else {
            Ok(Vec::new())
        }
    }

    // ========== BINDING ==========

    /// Bind two points (idempotent, symmetric).
    ///
    /// The two points and all their current bound neighbours become one clique.
    pub fn connect(&mut self, a: PointId, b: PointId) -> Result<()> {
        if !self.points.contains_key(&a) {
            return Err(NetworkError::UnknownPoint(a));
        }
        if !self.points.contains_key(&b) {
            return Err(NetworkError::UnknownPoint(b));
        }
        if a == b {
            return Ok(());
        }

        let mut members: BTreeSet<PointId> = BTreeSet::from([a, b]);
        members.extend(self.bound_points(a));
        members.extend(self.bound_points(b));

        for member in &members {
            if let Some(point) = self.points.get_mut(member) {
                point.bound.extend(members.iter().filter(|other| *other != member));
            }
        }
        Ok(())
    }

    /// Bind a newly placed point to a hook point, snapping its position and
    /// inheriting the hook's altitude override.
    pub fn hook(&mut self, point: PointId, hook: PointId) -> Result<()> {
        let (position, altitude) = {
            let hook_point = self.points.get(&hook).ok_or(NetworkError::UnknownPoint(hook))?;
            (hook_point.position, hook_point.altitude)
        };
        self.connect(point, hook)?;
        let target = self.point_mut(point)?;
        target.position = position;
        target.altitude = altitude;
        Ok(())
    }

    /// Remove `id` from every bound neighbour's set and clear its own.
    ///
    /// Must run before a bound point is destroyed.
    pub fn disconnect_all(&mut self, id: PointId) -> Result<()> {
        let bound = std::mem::take(&mut self.point_mut(id)?.bound);
        for neighbour in bound {
            if let Some(point) = self.points.get_mut(&neighbour) {
                point.bound.remove(&id);
            }
        }
        Ok(())
    }

    // ========== EDITING ==========

    /// Move a point and all its bound neighbours to `position`.
    ///
    /// The moved point's altitude override is copied to its neighbours. The
    /// first marked point of the moved set gets a `MarkerRefresh` event.
    pub fn move_point(&mut self, id: PointId, position: Position) -> Result<Vec<TopologyEvent>> {
        let (altitude, marker, bound) = {
            let point = self.point_mut(id)?;
            point.position = position;
            (point.altitude, point.marker, point.bound.clone())
        };

        let mut events = vec![TopologyEvent::PointMoved { point: id, position }];
        let mut marker_refreshed = false;
        if let Some(marker) = marker {
            events.push(TopologyEvent::MarkerRefresh { point: id, marker });
            marker_refreshed = true;
        }

        for neighbour in bound {
            let Some(point) = self.points.get_mut(&neighbour) else {
                continue;
            };
            point.position = position;
            point.altitude = altitude;
            events.push(TopologyEvent::PointMoved { point: neighbour, position });
            if !marker_refreshed {
                if let Some(marker) = point.marker {
                    events.push(TopologyEvent::MarkerRefresh { point: neighbour, marker });
                    marker_refreshed = true;
                }
            }
        }

        events.push(TopologyEvent::Changed);
        Ok(events)
    }

    /// Set (or clear) the flight altitude override of a point and its bound
    /// neighbours.
    pub fn set_altitude(&mut self, id: PointId, altitude: Option<f64>) -> Result<Vec<TopologyEvent>> {
        let bound = {
            let point = self.point_mut(id)?;
            point.altitude = altitude;
            point.bound.clone()
        };
        let mut events = vec![TopologyEvent::AltitudeChanged { point: id, altitude }];
        for neighbour in bound {
            if let Some(point) = self.points.get_mut(&neighbour) {
                point.altitude = altitude;
                events.push(TopologyEvent::AltitudeChanged { point: neighbour, altitude });
            }
        }
        events.push(TopologyEvent::Changed);
        Ok(events)
    }

    /// Mark a point. `Waypoint` clears the marker.
    pub fn set_marker(&mut self, id: PointId, node_type: NodeType) -> Result<Vec<TopologyEvent>> {
        let event = match node_type {
            NodeType::Delivery => return Err(NetworkError::InvalidMarker(node_type)),
            NodeType::Waypoint => {
                self.point_mut(id)?.marker = None;
                TopologyEvent::MarkerCleared { point: id }
            }
            NodeType::Semaphore | NodeType::Center => {
                self.point_mut(id)?.marker = Some(node_type);
                TopologyEvent::MarkerRefresh { point: id, marker: node_type }
            }
        };
        Ok(vec![event, TopologyEvent::Changed])
    }

    /// Remove a point. A segment that would drop below 2 points is disposed
    /// as a whole instead.
    pub fn remove_point(&mut self, id: PointId) -> Result<Vec<TopologyEvent>> {
        let segment = self
            .points
            .get(&id)
            .map(|p| p.segment)
            .ok_or(NetworkError::UnknownPoint(id))?;
        let len = self.segment(segment).map(|s| s.points.len()).unwrap_or(0);
        if len <= 2 {
            return self.remove_segment(segment);
        }

        let mut events = Vec::new();
        self.destroy_point(id, &mut events)?;
        if let Some(index) = self.segment_index(segment) {
            self.segments[index].points.retain(|pid| *pid != id);
        }
        events.push(TopologyEvent::Changed);
        Ok(events)
    }

    /// Dispose a segment and all its points.
    pub fn remove_segment(&mut self, segment: SegmentId) -> Result<Vec<TopologyEvent>> {
        let index = self
            .segment_index(segment)
            .ok_or(NetworkError::UnknownSegment(segment))?;
        let removed = self.segments.remove(index);

        let mut events = Vec::new();
        for id in removed.points {
            self.destroy_point(id, &mut events)?;
        }
        events.push(TopologyEvent::SegmentDisposed { segment });
        events.push(TopologyEvent::Changed);
        Ok(events)
    }

    fn destroy_point(&mut self, id: PointId, events: &mut Vec<TopologyEvent>) -> Result<()> {
        self.disconnect_all(id)?;
        if let Some(point) = self.points.remove(&id) {
            if point.marker.is_some() {
                events.push(TopologyEvent::MarkerCleared { point: id });
            }
        }
        Ok(())
    }

    // ========== SNAPSHOT ==========

    /// Rebuild a topology from its persisted form.
    ///
    /// Coincident segment endpoints are bound on import, then node props are
    /// applied by `(segment_index, waypoint_index)`.
    pub fn from_snapshot(snapshot: &NetworkSnapshot) -> Result<Self> {
        let segments = snapshot
            .segment_positions()
            .ok_or_else(|| NetworkError::InvalidSnapshot("coordinates must have 2 or 3 elements".into()))?;

        let mut topology = Topology::new();
        for (index, positions) in segments.iter().enumerate() {
            if positions.iter().any(|p| !p.is_finite()) {
                return Err(NetworkError::InvalidSnapshot(format!(
                    "segment {} has non-finite coordinates",
                    index
                )));
            }
            if topology.add_segment(positions).is_none() {
                return Err(NetworkError::InvalidSnapshot(format!(
                    "segment {} has fewer than 2 points",
                    index
                )));
            }
        }

        for props in &snapshot.node_props {
            let Some(id) = topology
                .segments
                .get(props.segment_index)
                .and_then(|segment| segment.points.get(props.waypoint_index))
                .copied()
            else {
                tracing::debug!(
                    "Ignoring node props for missing point {}/{}",
                    props.segment_index,
                    props.waypoint_index
                );
                continue;
            };
            if let Some(point) = topology.points.get_mut(&id) {
                point.altitude = props.flight_altitude;
                point.marker = props.marker_type.filter(NodeType::is_marker);
            }
        }

        Ok(topology)
    }

    /// Persisted form of the topology. Segments with fewer than 2 points are
    /// skipped; point ids are not persisted.
    pub fn to_snapshot(&self, id: impl Into<String>) -> NetworkSnapshot {
        let mut segments = Vec::new();
        let mut node_props = Vec::new();

        for segment in self.segments.iter().filter(|s| s.points.len() >= 2) {
            let segment_index = segments.len();
            let mut coords = Vec::with_capacity(segment.points.len());
            for (waypoint_index, pid) in segment.points.iter().enumerate() {
                let Some(point) = self.points.get(pid) else {
                    continue;
                };
                if point.altitude.is_some() || point.marker.is_some() {
                    node_props.push(NodeProps {
                        segment_index,
                        waypoint_index,
                        flight_altitude: point.altitude,
                        marker_type: point.marker,
                    });
                }
                let p = point.position;
                if p.alt == 0.0 {
                    coords.push(vec![p.lon, p.lat]);
                } else {
                    coords.push(vec![p.lon, p.lat, p.alt]);
                }
            }
            segments.push(coords);
        }

        NetworkSnapshot {
            id: id.into(),
            segments,
            node_props,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::offset_by_bearing;

    fn pos(lon: f64, lat: f64) -> Position {
        Position::surface(lon, lat)
    }

    #[test]
    fn connect_is_symmetric_and_idempotent() {
        let mut topology = Topology::new();
        let a = topology.add_segment(&[pos(0.0, 0.0), pos(0.001, 0.0)]).unwrap();
        let b = topology.add_segment(&[pos(0.01, 0.0), pos(0.011, 0.0)]).unwrap();
        let pa = topology.segment(a).unwrap().points[0];
        let pb = topology.segment(b).unwrap().points[0];

        topology.connect(pa, pb).unwrap();
        topology.connect(pb, pa).unwrap();

        assert_eq!(topology.point(pa).unwrap().bound, BTreeSet::from([pb]));
        assert_eq!(topology.point(pb).unwrap().bound, BTreeSet::from([pa]));
    }

    #[test]
    fn binding_forms_a_clique() {
        let mut topology = Topology::new();
        let shared = pos(34.0, 32.0);
        let s1 = topology.add_segment(&[shared, pos(34.001, 32.0)]).unwrap();
        let s2 = topology.add_segment(&[pos(34.0, 32.001), shared]).unwrap();
        let s3 = topology.add_segment(&[shared, pos(33.999, 32.0)]).unwrap();

        let p1 = topology.segment(s1).unwrap().points[0];
        let p2 = topology.segment(s2).unwrap().points[1];
        let p3 = topology.segment(s3).unwrap().points[0];

        assert_eq!(topology.point(p1).unwrap().bound, BTreeSet::from([p2, p3]));
        assert_eq!(topology.point(p2).unwrap().bound, BTreeSet::from([p1, p3]));
        assert_eq!(topology.point(p3).unwrap().bound, BTreeSet::from([p1, p2]));
        assert_eq!(topology.resolve_equivalence_id(p3), p1);
    }

    #[test]
    fn endpoints_within_one_meter_bind() {
        let mut topology = Topology::new();
        let s1 = topology.add_segment(&[pos(34.0, 32.0), pos(34.001, 32.0)]).unwrap();
        let (lat, lon) = offset_by_bearing(32.0, 34.001, 0.6, 0.0);
        let s2 = topology.add_segment(&[pos(lon, lat), pos(34.002, 32.0)]).unwrap();

        let end1 = topology.segment(s1).unwrap().points[1];
        let start2 = topology.segment(s2).unwrap().points[0];
        assert!(topology.point(end1).unwrap().bound.contains(&start2));
        // Snapped onto the existing point.
        assert!(topology.point(start2).unwrap().position.same_lon_lat(&pos(34.001, 32.0)));
    }

    #[test]
    fn equivalence_resolution_is_single_hop() {
        let mut topology = Topology::new();
        let s = topology.add_segment(&[pos(0.0, 0.0), pos(1.0, 0.0), pos(2.0, 0.0)]).unwrap();
        let ids = topology.segment(s).unwrap().points.clone();
        // Build a chain by hand: 0 - 1 - 2 without the 0 - 2 link.
        topology.points.get_mut(&ids[0]).unwrap().bound.insert(ids[1]);
        topology.points.get_mut(&ids[1]).unwrap().bound.extend([ids[0], ids[2]]);
        topology.points.get_mut(&ids[2]).unwrap().bound.insert(ids[1]);

        assert_eq!(topology.resolve_equivalence_id(ids[1]), ids[0]);
        assert_eq!(topology.resolve_equivalence_id(ids[2]), ids[1]);
    }

    #[test]
    fn move_propagates_position_altitude_and_marker_refresh() {
        let mut topology = Topology::new();
        let shared = pos(34.0, 32.0);
        let s1 = topology.add_segment(&[pos(34.001, 32.0), shared]).unwrap();
        let s2 = topology.add_segment(&[shared, pos(34.0, 32.001)]).unwrap();
        let moved = topology.segment(s1).unwrap().points[1];
        let other = topology.segment(s2).unwrap().points[0];

        topology.set_marker(other, NodeType::Semaphore).unwrap();
        topology.point_mut(moved).unwrap().altitude = Some(90.0);

        let target = pos(34.0005, 32.0005);
        let events = topology.move_point(moved, target).unwrap();

        let other_point = topology.point(other).unwrap();
        assert!(other_point.position.same_lon_lat(&target));
        assert_eq!(other_point.altitude, Some(90.0));
        assert!(events.contains(&TopologyEvent::MarkerRefresh {
            point: other,
            marker: NodeType::Semaphore
        }));
        assert_eq!(events.last(), Some(&TopologyEvent::Changed));
    }

    #[test]
    fn removing_from_two_point_segment_disposes_it() {
        let mut topology = Topology::new();
        let shared = pos(34.0, 32.0);
        let s1 = topology.add_segment(&[pos(34.001, 32.0), shared]).unwrap();
        let s2 = topology.add_segment(&[shared, pos(34.0, 32.001)]).unwrap();
        let doomed = topology.segment(s1).unwrap().points[0];
        let bound_in_s1 = topology.segment(s1).unwrap().points[1];
        let survivor = topology.segment(s2).unwrap().points[0];

        let events = topology.remove_point(doomed).unwrap();

        assert!(events.contains(&TopologyEvent::SegmentDisposed { segment: s1 }));
        assert!(topology.segment(s1).is_none());
        assert!(topology.point(bound_in_s1).is_none());
        assert!(topology.point(survivor).unwrap().bound.is_empty());
    }

    #[test]
    fn removing_interior_point_keeps_segment() {
        let mut topology = Topology::new();
        let s = topology
            .add_segment(&[pos(0.0, 0.0), pos(0.001, 0.0), pos(0.002, 0.0)])
            .unwrap();
        let middle = topology.segment(s).unwrap().points[1];
        topology.remove_point(middle).unwrap();
        assert_eq!(topology.segment(s).unwrap().points.len(), 2);
        assert!(topology.point(middle).is_none());
    }

    #[test]
    fn delivery_is_not_a_marker() {
        let mut topology = Topology::new();
        let s = topology.add_segment(&[pos(0.0, 0.0), pos(0.001, 0.0)]).unwrap();
        let p = topology.segment(s).unwrap().points[0];
        assert!(matches!(
            topology.set_marker(p, NodeType::Delivery),
            Err(NetworkError::InvalidMarker(NodeType::Delivery))
        ));
    }

    #[test]
    fn snapshot_round_trip_preserves_coordinates_and_props() {
        let snapshot = NetworkSnapshot {
            id: "net".into(),
            segments: vec![
                vec![vec![34.123456789, 32.0], vec![34.124, 32.001, 15.0]],
                vec![vec![34.124, 32.001, 15.0], vec![34.125, 32.002], vec![34.126, 32.0]],
            ],
            node_props: vec![
                NodeProps {
                    segment_index: 0,
                    waypoint_index: 0,
                    flight_altitude: Some(80.0),
                    marker_type: Some(NodeType::Semaphore),
                },
                NodeProps {
                    segment_index: 1,
                    waypoint_index: 2,
                    flight_altitude: None,
                    marker_type: Some(NodeType::Center),
                },
            ],
        };

        let topology = Topology::from_snapshot(&snapshot).unwrap();
        let round_trip = topology.to_snapshot("net");

        assert_eq!(round_trip.segments.len(), 2);
        for (a, b) in snapshot.segments.iter().flatten().zip(round_trip.segments.iter().flatten()) {
            assert!((a[0] - b[0]).abs() < 1e-6);
            assert!((a[1] - b[1]).abs() < 1e-6);
        }
        assert_eq!(round_trip.node_props, snapshot.node_props);
    }

    #[test]
    fn snapshot_with_degenerate_segment_is_rejected() {
        let snapshot = NetworkSnapshot {
            id: String::new(),
            segments: vec![vec![vec![34.0, 32.0]]],
            node_props: Vec::new(),
        };
        assert!(matches!(
            Topology::from_snapshot(&snapshot),
            Err(NetworkError::InvalidSnapshot(_))
        ));
    }
}
