//! API routes for the flight network server.

pub mod error;
pub mod network;
pub mod passes;
pub mod projects;

use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use std::sync::Arc;

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/projects", get(projects::list_projects))
        .route(
            "/v1/projects/:project_id/network",
            get(network::get_network).put(network::put_network),
        )
        .route(
            "/v1/projects/:project_id/settings",
            get(projects::get_settings).put(projects::put_settings),
        )
        .route(
            "/v1/projects/:project_id/buildings",
            get(projects::get_buildings).put(projects::put_buildings),
        )
        // Editing
        .route("/v1/projects/:project_id/segments", post(network::create_segment))
        .route(
            "/v1/projects/:project_id/segments/:segment_id",
            delete(network::delete_segment),
        )
        .route(
            "/v1/projects/:project_id/points/:point_id",
            patch(network::update_point).delete(network::delete_point),
        )
        .route("/v1/projects/:project_id/labels", get(network::get_labels))
        // Passes
        .route("/v1/projects/:project_id/link", post(passes::link))
        .route("/v1/projects/:project_id/export", post(passes::export))
        .route("/v1/projects/:project_id/validate", post(passes::validate))
        .route("/v1/projects/:project_id/upload", post(passes::upload))
}
