//! Drawing state machine for creating and editing segments.

use serde::Serialize;

use crate::error::{NetworkError, Result};
use crate::geometry::{distance_3d, BIND_TOLERANCE_M};
use crate::models::Position;
use crate::topology::{PointId, SegmentId, Topology, TopologyEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DrawingState {
    Idle,
    /// Waiting for the first click of a new segment
    CreateSegment,
    /// Segment exists but holds no point yet
    AddFirstPoint,
    AddNewPoint,
}

impl DrawingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DrawingState::Idle => "idle",
            DrawingState::CreateSegment => "creating a segment",
            DrawingState::AddFirstPoint => "adding the first point",
            DrawingState::AddNewPoint => "adding points",
        }
    }
}

/// Drives topology mutations for one operator.
#[derive(Debug)]
pub struct DrawingSession<'a> {
    topology: &'a mut Topology,
    state: DrawingState,
    current: Option<SegmentId>,
    editing: bool,
}

impl<'a> DrawingSession<'a> {
    pub fn new(topology: &'a mut Topology) -> Self {
        Self {
            topology,
            state: DrawingState::Idle,
            current: None,
            editing: false,
        }
    }

    pub fn state(&self) -> DrawingState {
        self.state
    }

    pub fn current_segment(&self) -> Option<SegmentId> {
        self.current
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    pub fn topology(&self) -> &Topology {
        self.topology
    }

    pub fn start(&mut self) {
        self.state = DrawingState::CreateSegment;
        self.editing = true;
    }

    /// Leave drawing mode. An unfinished segment is finished first.
    pub fn stop(&mut self) -> Result<Vec<TopologyEvent>> {
        let events = if self.current.is_some() {
            self.finish_segment()?.1
        } else {
            Vec::new()
        };
        self.state = DrawingState::Idle;
        self.editing = false;
        Ok(events)
    }

    pub fn set_editing(&mut self, editing: bool) {
        self.editing = editing;
    }

    /// Place a point at `position`.
    ///
    /// With a `hook`, or when an existing point of another segment lies
    /// within 1 m, the new point snaps onto it and the two are bound.
    pub fn click(&mut self, position: Position, hook: Option<PointId>) -> Result<PointId> {
        if self.state == DrawingState::Idle {
            return Err(NetworkError::InvalidDrawingState {
                action: "add a point",
                state: self.state.as_str(),
            });
        }
        if let Some(hook) = hook {
            if self.topology.point(hook).is_none() {
                return Err(NetworkError::UnknownPoint(hook));
            }
        }

        let segment = match (self.state, self.current) {
            (DrawingState::CreateSegment, _) | (_, None) => {
                let segment = self.topology.create_segment();
                self.current = Some(segment);
                self.state = DrawingState::AddFirstPoint;
                segment
            }
            (_, Some(segment)) => segment,
        };

        let hook = match hook {
            Some(hook) => Some(hook),
            None => self.find_hook(segment, &position),
        };

        let point = self.topology.push_point(segment, position)?;
        if let Some(hook) = hook {
            self.topology.hook(point, hook)?;
        }
        self.state = DrawingState::AddNewPoint;
        Ok(point)
    }

    fn find_hook(&self, segment: SegmentId, position: &Position) -> Option<PointId> {
        self.topology
            .segments()
            .iter()
            .filter(|s| s.id != segment)
            .flat_map(|s| self.topology.segment_points(s.id))
            .map(|p| (p.id, distance_3d(position, &p.position)))
            .filter(|(_, distance)| *distance <= BIND_TOLERANCE_M)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    /// End the current polyline. Returns the segment if it was kept.
    pub fn finish_segment(&mut self) -> Result<(Option<SegmentId>, Vec<TopologyEvent>)> {
        let Some(segment) = self.current.take() else {
            return Err(NetworkError::InvalidDrawingState {
                action: "finish a segment",
                state: self.state.as_str(),
            });
        };
        self.state = DrawingState::CreateSegment;

        let events = self.topology.discard_if_degenerate(segment)?;
        if events.is_empty() {
            tracing::debug!("Finished segment {}", segment);
            Ok((Some(segment), vec![TopologyEvent::Changed]))
        } else {
            tracing::debug!("Discarded segment {} with fewer than 2 points", segment);
            Ok((None, events))
        }
    }

    /// Drop the polyline being drawn, points included.
    pub fn cancel_segment(&mut self) -> Result<Vec<TopologyEvent>> {
        self.state = match self.state {
            DrawingState::Idle => DrawingState::Idle,
            _ => DrawingState::CreateSegment,
        };
        match self.current.take() {
            Some(segment) => {
                tracing::debug!("Cancelled segment {}", segment);
                self.topology.remove_segment(segment)
            }
            None => Ok(Vec::new()),
        }
    }

    fn ensure_editing(&self, action: &'static str) -> Result<()> {
        if self.editing {
            Ok(())
        } else {
            Err(NetworkError::InvalidDrawingState {
                action,
                state: "not editing",
            })
        }
    }

    pub fn drag_point(&mut self, point: PointId, position: Position) -> Result<Vec<TopologyEvent>> {
        self.ensure_editing("drag a point")?;
        self.topology.move_point(point, position)
    }

    pub fn remove_point(&mut self, point: PointId) -> Result<Vec<TopologyEvent>> {
        self.ensure_editing("remove a point")?;
        let segment = self.topology.point(point).map(|p| p.segment);
        let events = self.topology.remove_point(point)?;
        if let Some(segment) = segment.filter(|s| Some(*s) == self.current) {
            if self.topology.segment(segment).is_none() {
                self.current = None;
                self.state = DrawingState::CreateSegment;
            }
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn click_requires_started_session() {
        let mut topology = Topology::new();
        let mut session = DrawingSession::new(&mut topology);
        assert!(matches!(
            session.click(Position::surface(0.0, 0.0), None),
            Err(NetworkError::InvalidDrawingState { .. })
        ));
    }

    #[test]
    fn draws_segment_through_states() {
        let mut topology = Topology::new();
        let mut session = DrawingSession::new(&mut topology);
        session.start();
        assert_eq!(session.state(), DrawingState::CreateSegment);

        session.click(Position::surface(34.0, 32.0), None).unwrap();
        assert_eq!(session.state(), DrawingState::AddNewPoint);
        session.click(Position::surface(34.001, 32.0), None).unwrap();

        let (kept, _) = session.finish_segment().unwrap();
        assert!(kept.is_some());
        assert_eq!(session.state(), DrawingState::CreateSegment);
        assert_eq!(topology.segments().len(), 1);
    }

    #[test]
    fn single_point_segment_is_discarded() {
        let mut topology = Topology::new();
        let mut session = DrawingSession::new(&mut topology);
        session.start();
        session.click(Position::surface(34.0, 32.0), None).unwrap();

        let (kept, events) = session.finish_segment().unwrap();
        assert!(kept.is_none());
        assert!(events.iter().any(|e| matches!(e, TopologyEvent::SegmentDisposed { .. })));
        assert!(topology.is_empty());
    }

    #[test]
    fn unknown_hook_leaves_topology_untouched() {
        let mut topology = Topology::new();
        let mut session = DrawingSession::new(&mut topology);
        session.start();
        assert!(matches!(
            session.click(Position::surface(35.0, 33.0), Some(PointId(999))),
            Err(NetworkError::UnknownPoint(PointId(999)))
        ));
        assert!(session.current_segment().is_none());
        assert!(topology.is_empty());
    }

    #[test]
    fn cancel_discards_partial_segment() {
        let mut topology = Topology::new();
        let mut session = DrawingSession::new(&mut topology);
        session.start();
        session.click(Position::surface(35.0, 33.0), None).unwrap();
        assert!(session
            .click(Position::surface(35.001, 33.0), Some(PointId(999)))
            .is_err());

        let events = session.cancel_segment().unwrap();
        assert!(events.iter().any(|e| matches!(e, TopologyEvent::SegmentDisposed { .. })));
        assert_eq!(session.state(), DrawingState::CreateSegment);
        assert!(topology.is_empty());
    }

    #[test]
    fn click_near_existing_point_binds() {
        let mut topology = Topology::new();
        topology
            .add_segment(&[Position::surface(34.0, 32.0), Position::surface(34.001, 32.0)])
            .unwrap();
        let existing = topology.segments()[0].points[1];

        let mut session = DrawingSession::new(&mut topology);
        session.start();
        let new_point = session.click(Position::surface(34.001000001, 32.0), None).unwrap();
        session.click(Position::surface(34.002, 32.0), None).unwrap();
        session.finish_segment().unwrap();

        let point = topology.point(new_point).unwrap();
        assert!(point.bound.contains(&existing));
        assert!(point.position.same_lon_lat(&Position::surface(34.001, 32.0)));
    }

    #[test]
    fn editing_must_be_enabled_to_drag() {
        let mut topology = Topology::new();
        topology
            .add_segment(&[Position::surface(34.0, 32.0), Position::surface(34.001, 32.0)])
            .unwrap();
        let point = topology.segments()[0].points[0];

        let mut session = DrawingSession::new(&mut topology);
        assert!(session.drag_point(point, Position::surface(34.0, 32.1)).is_err());
        session.set_editing(true);
        assert!(session.drag_point(point, Position::surface(34.0, 32.1)).is_ok());
    }
}
