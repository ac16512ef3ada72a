//! Flight network server - planning backend for drone delivery networks

use anyhow::Result;
use axum::routing::get;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flightnet_server::api;
use flightnet_server::config::Config;
use flightnet_server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("flightnet_server=debug".parse()?))
        .init();

    tracing::info!("Starting flight network server...");

    let config = Config::from_env();
    let port = config.server_port;
    if config.gcs_url.is_none() {
        tracing::warn!("GCS_URL not set; validate and upload are disabled");
    }
    let state = Arc::new(AppState::new(config)?);

    let app = api::routes()
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
