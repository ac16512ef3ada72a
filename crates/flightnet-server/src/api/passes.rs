//! Linking, export and GCS round-trips.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use flightnet_core::{
    Export, FlightNetwork, LinkPass, NetworkMeta, ResolvedValidationError, ValidationError,
};
use flightnet_gcs::{GcsClient, UploadOutcome};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::error::{ApiError, ApiResult};
use crate::api::network::require_session;
use crate::state::{AppState, PlanningSession};

#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    /// GCS network id; 0 when the network has not been uploaded yet
    #[serde(default)]
    pub network_id: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
}

impl ExportQuery {
    async fn meta(&self, session: &PlanningSession) -> NetworkMeta {
        let name = match &self.name {
            Some(name) => name.clone(),
            None => session.lock().await.network_id.clone(),
        };
        NetworkMeta {
            id: self.network_id.unwrap_or(0),
            name,
        }
    }
}

/// Recompute building links and write them back onto the buildings.
pub async fn link(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<LinkPass>> {
    let session = require_session(&state, &project_id)?;
    let pass = session.link(state.terrain()).await?;
    tracing::info!(
        "Linked {} buildings to {} lines in project {}",
        pass.links.len(),
        pass.lines.len(),
        project_id
    );
    Ok(Json(pass))
}

async fn run_export(state: &AppState, project_id: &str, query: &ExportQuery) -> ApiResult<Export> {
    let session = require_session(state, project_id)?;
    let meta = query.meta(&session).await;
    Ok(session.export(state.terrain(), &meta).await?)
}

pub async fn export(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> ApiResult<Json<FlightNetwork>> {
    let export = run_export(&state, &project_id, &query).await?;
    Ok(Json(export.network))
}

fn require_gcs(state: &AppState) -> ApiResult<&GcsClient> {
    state.gcs().ok_or(ApiError::GcsNotConfigured)
}

#[derive(Debug, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ResolvedValidationError>,
}

fn report(export: &Export, errors: &[ValidationError]) -> ValidationReport {
    ValidationReport {
        valid: errors.is_empty(),
        errors: export.index.resolve(errors),
    }
}

/// Export and ask the GCS to validate the result.
pub async fn validate(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> ApiResult<Json<ValidationReport>> {
    let gcs = require_gcs(&state)?;
    let export = run_export(&state, &project_id, &query).await?;
    let errors = gcs.validate_network(&export.network).await.map_err(ApiError::Gcs)?;
    tracing::info!(
        "Validated network of project {}: {} errors",
        project_id,
        errors.len()
    );
    Ok(Json(report(&export, &errors)))
}

#[derive(Debug, Serialize)]
pub struct UploadReport {
    pub uploaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_id: Option<u64>,
    pub errors: Vec<ResolvedValidationError>,
}

/// Export and upload the result as the GCS's current network.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> ApiResult<Json<UploadReport>> {
    let gcs = require_gcs(&state)?;
    let export = run_export(&state, &project_id, &query).await?;
    let outcome = gcs.upload_network(&export.network).await.map_err(ApiError::Gcs)?;

    let report = match outcome {
        UploadOutcome::Uploaded { network_id } => {
            tracing::info!("Uploaded network of project {} as {}", project_id, network_id);
            UploadReport {
                uploaded: true,
                network_id: Some(network_id),
                errors: Vec::new(),
            }
        }
        UploadOutcome::Rejected(error) => {
            tracing::warn!("GCS rejected network of project {}: {}", project_id, error.message);
            let errors = [ValidationError::from(error)];
            UploadReport {
                uploaded: false,
                network_id: None,
                errors: report(&export, &errors).errors,
            }
        }
    };
    Ok(Json(report))
}
