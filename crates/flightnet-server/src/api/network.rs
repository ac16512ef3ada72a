//! Network topology endpoints.
//!
//! Load/read the persisted snapshot, draw and delete segments, edit points
//! and read distance labels.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use flightnet_core::{
    DrawingSession, NetworkError, NetworkSnapshot, NodeType, PathFinder, Point, PointId, Position,
    SegmentId, Topology, TopologyEvent,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::api::error::{ApiError, ApiResult};
use crate::state::{AppState, PlanningSession};

pub(crate) fn require_session(state: &AppState, project_id: &str) -> ApiResult<Arc<PlanningSession>> {
    state
        .session(project_id)
        .ok_or_else(|| ApiError::ProjectNotFound(project_id.to_string()))
}

#[derive(Debug, Serialize)]
pub struct SegmentView {
    pub id: SegmentId,
    pub points: Vec<Point>,
}

#[derive(Debug, Serialize)]
pub struct NetworkView {
    pub network: NetworkSnapshot,
    pub segments: Vec<SegmentView>,
}

fn segment_view(topology: &Topology, id: SegmentId) -> SegmentView {
    SegmentView {
        id,
        points: topology.segment_points(id).into_iter().cloned().collect(),
    }
}

fn network_view(network_id: &str, topology: &Topology) -> NetworkView {
    NetworkView {
        network: topology.to_snapshot(network_id),
        segments: topology
            .segments()
            .iter()
            .map(|segment| segment_view(topology, segment.id))
            .collect(),
    }
}

/// Replace the project's network with a snapshot.
pub async fn put_network(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Json(snapshot): Json<NetworkSnapshot>,
) -> ApiResult<Json<NetworkView>> {
    let topology = Topology::from_snapshot(&snapshot)?;
    let session = state.session_or_create(&project_id);
    let mut project = session.lock().await;

    project.network_id = snapshot.id.clone();
    project.topology = topology;
    project.last_export = None;
    project.touch();

    tracing::info!(
        "Loaded network '{}' for project {} ({} segments, {} points)",
        snapshot.id,
        project_id,
        project.topology.segments().len(),
        project.topology.point_count()
    );
    Ok(Json(network_view(&project.network_id, &project.topology)))
}

pub async fn get_network(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<NetworkView>> {
    let session = require_session(&state, &project_id)?;
    let project = session.lock().await;
    Ok(Json(network_view(&project.network_id, &project.topology)))
}

#[derive(Debug, Deserialize)]
pub struct DrawnPoint {
    #[serde(flatten)]
    pub position: Position,
    /// Existing point to snap to and bind with
    #[serde(default)]
    pub hook: Option<PointId>,
}

#[derive(Debug, Deserialize)]
pub struct DrawSegmentRequest {
    pub points: Vec<DrawnPoint>,
}

/// Draw a finished polyline.
pub async fn create_segment(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Json(req): Json<DrawSegmentRequest>,
) -> ApiResult<(StatusCode, Json<SegmentView>)> {
    let session = require_session(&state, &project_id)?;
    let mut project = session.lock().await;

    let mut drawing = DrawingSession::new(&mut project.topology);
    drawing.start();
    for point in &req.points {
        if let Err(err) = drawing.click(point.position, point.hook) {
            drawing.cancel_segment()?;
            return Err(err.into());
        }
    }
    let (segment, _) = drawing.finish_segment()?;
    drawing.stop()?;

    let Some(segment) = segment else {
        return Err(ApiError::BadRequest("a segment needs at least 2 points".to_string()));
    };
    project.touch();
    tracing::info!("Drew segment {} in project {}", segment, project_id);
    Ok((StatusCode::CREATED, Json(segment_view(&project.topology, segment))))
}

pub async fn delete_segment(
    State(state): State<Arc<AppState>>,
    Path((project_id, segment_id)): Path<(String, u32)>,
) -> ApiResult<Json<Vec<TopologyEvent>>> {
    let session = require_session(&state, &project_id)?;
    let mut project = session.lock().await;
    let events = project.topology.remove_segment(SegmentId(segment_id))?;
    project.touch();
    Ok(Json(events))
}

/// `Some(None)` when the field is present but null.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Default, Deserialize)]
pub struct PointUpdate {
    #[serde(default)]
    pub position: Option<Position>,
    /// `null` clears the override
    #[serde(default, deserialize_with = "present")]
    pub flight_altitude: Option<Option<f64>>,
    /// `waypoint` clears the marker
    #[serde(default)]
    pub marker_type: Option<NodeType>,
}

/// Move a point, change its altitude override or its marker.
pub async fn update_point(
    State(state): State<Arc<AppState>>,
    Path((project_id, point_id)): Path<(String, u32)>,
    Json(update): Json<PointUpdate>,
) -> ApiResult<Json<Vec<TopologyEvent>>> {
    let point = PointId(point_id);
    if let Some(Some(altitude)) = update.flight_altitude {
        if !altitude.is_finite() || altitude < 0.0 {
            return Err(ApiError::BadRequest(format!("invalid flight altitude {}", altitude)));
        }
    }

    let session = require_session(&state, &project_id)?;
    let mut project = session.lock().await;

    if project.topology.point(point).is_none() {
        return Err(NetworkError::UnknownPoint(point).into());
    }
    if let Some(marker) = update.marker_type {
        if !marker.is_marker() && marker != NodeType::Waypoint {
            return Err(NetworkError::InvalidMarker(marker).into());
        }
    }

    let mut events = Vec::new();
    {
        let mut drawing = DrawingSession::new(&mut project.topology);
        drawing.set_editing(true);
        if let Some(position) = update.position {
            events.extend(drawing.drag_point(point, position)?);
        }
    }
    if let Some(altitude) = update.flight_altitude {
        events.extend(project.topology.set_altitude(point, altitude)?);
    }
    if let Some(marker) = update.marker_type {
        events.extend(project.topology.set_marker(point, marker)?);
    }
    project.touch();
    Ok(Json(events))
}

pub async fn delete_point(
    State(state): State<Arc<AppState>>,
    Path((project_id, point_id)): Path<(String, u32)>,
) -> ApiResult<Json<Vec<TopologyEvent>>> {
    let session = require_session(&state, &project_id)?;
    let mut project = session.lock().await;

    let mut drawing = DrawingSession::new(&mut project.topology);
    drawing.set_editing(true);
    let events = drawing.remove_point(PointId(point_id))?;
    project.touch();
    Ok(Json(events))
}

/// Distance from every point to the nearest semaphore.
pub async fn get_labels(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<BTreeMap<PointId, String>>> {
    let session = require_session(&state, &project_id)?;
    let project = session.lock().await;
    Ok(Json(PathFinder::new(&project.topology).labels()))
}
