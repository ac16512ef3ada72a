//! API error type and its HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use flightnet_core::NetworkError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("project {0} not found")]
    ProjectNotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("GCS_URL is not configured")]
    GcsNotConfigured,

    #[error("GCS request failed: {0:#}")]
    Gcs(anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::ProjectNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Network(err) => match err {
                NetworkError::UnknownPoint(_) | NetworkError::UnknownSegment(_) => StatusCode::NOT_FOUND,
                NetworkError::InvalidMarker(_)
                | NetworkError::InvalidDrawingState { .. }
                | NetworkError::InvalidSnapshot(_)
                | NetworkError::InvalidSettings(_) => StatusCode::BAD_REQUEST,
                NetworkError::Superseded => StatusCode::CONFLICT,
                NetworkError::ElevationService(_) | NetworkError::ElevationCountMismatch { .. } => {
                    StatusCode::BAD_GATEWAY
                }
            },
            ApiError::GcsNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Gcs(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!("Request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
