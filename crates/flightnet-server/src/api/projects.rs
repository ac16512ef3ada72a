//! Project listing, settings and buildings.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use flightnet_core::{Building, NetworkError, ProjectSettings};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

use crate::api::error::{ApiError, ApiResult};
use crate::api::network::require_session;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ProjectSummary {
    pub project_id: String,
    pub network_id: String,
    pub segments: usize,
    pub points: usize,
    pub buildings: usize,
    pub linked_buildings: usize,
    pub updated_at: Option<DateTime<Utc>>,
}

pub async fn list_projects(State(state): State<Arc<AppState>>) -> Json<Vec<ProjectSummary>> {
    let mut summaries = Vec::new();
    for project_id in state.project_ids() {
        let Some(session) = state.session(&project_id) else {
            continue;
        };
        let project = session.lock().await;
        summaries.push(ProjectSummary {
            network_id: project.network_id.clone(),
            segments: project.topology.segments().len(),
            points: project.topology.point_count(),
            buildings: project.buildings.len(),
            linked_buildings: project.buildings.iter().filter(|b| b.link.is_some()).count(),
            updated_at: project.updated_at,
            project_id,
        });
    }
    Json(summaries)
}

pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<ProjectSettings>> {
    let session = require_session(&state, &project_id)?;
    let project = session.lock().await;
    Ok(Json(project.settings.clone()))
}

pub async fn put_settings(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Json(settings): Json<ProjectSettings>,
) -> ApiResult<Json<ProjectSettings>> {
    settings.ensure_valid()?;
    let session = state.session_or_create(&project_id);
    let mut project = session.lock().await;
    project.settings = settings.clone();
    project.touch();
    tracing::debug!("Updated settings of project {}", project_id);
    Ok(Json(settings))
}

pub async fn get_buildings(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<Vec<Building>>> {
    let session = require_session(&state, &project_id)?;
    let project = session.lock().await;
    Ok(Json(project.buildings.clone()))
}

/// Replace the project's building set.
pub async fn put_buildings(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Json(buildings): Json<Vec<Building>>,
) -> ApiResult<Json<Vec<Building>>> {
    let mut seen = HashSet::new();
    for building in &buildings {
        if !seen.insert(building.id.as_str()) {
            return Err(ApiError::BadRequest(format!("duplicate building id {}", building.id)));
        }
        if !building.position.is_finite() {
            return Err(ApiError::BadRequest(format!(
                "building {} has a non-finite position",
                building.id
            )));
        }
        if let Some(altitude) = building.flight_altitude {
            if !altitude.is_finite() || altitude < 0.0 {
                return Err(NetworkError::InvalidSettings(vec![format!(
                    "building {} flight altitude must be a non-negative number (got {})",
                    building.id, altitude
                )])
                .into());
            }
        }
    }

    let session = state.session_or_create(&project_id);
    let mut project = session.lock().await;
    project.buildings = buildings.clone();
    project.touch();
    tracing::info!("Loaded {} buildings for project {}", buildings.len(), project_id);
    Ok(Json(buildings))
}
