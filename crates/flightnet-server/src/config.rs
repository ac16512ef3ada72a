//! Server configuration from environment.

use flightnet_gcs::{ElevationConfig, DEFAULT_ELEVATION_URL};
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub elevation_provider_url: String,
    pub elevation_max_points_per_request: usize,
    pub elevation_request_timeout_s: u64,
    /// Answer elevation queries locally with this constant instead of
    /// calling the provider.
    pub flat_terrain_elevation_m: Option<f64>,
    pub gcs_url: Option<String>,
    pub gcs_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            elevation_provider_url: DEFAULT_ELEVATION_URL.to_string(),
            elevation_max_points_per_request: 100,
            elevation_request_timeout_s: 10,
            flat_terrain_elevation_m: None,
            gcs_url: None,
            gcs_token: None,
        }
    }
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_port: env::var("FLIGHTNET_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.server_port),
            elevation_provider_url: non_empty("ELEVATION_PROVIDER_URL")
                .unwrap_or(defaults.elevation_provider_url),
            elevation_max_points_per_request: env::var("ELEVATION_MAX_POINTS_PER_REQUEST")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|value: &usize| *value > 0)
                .unwrap_or(defaults.elevation_max_points_per_request),
            elevation_request_timeout_s: env::var("ELEVATION_REQUEST_TIMEOUT_S")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.elevation_request_timeout_s),
            flat_terrain_elevation_m: env::var("FLAT_TERRAIN_ELEVATION_M")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|value: &f64| value.is_finite()),
            gcs_url: non_empty("GCS_URL"),
            gcs_token: non_empty("GCS_TOKEN"),
        }
    }

    pub fn elevation_config(&self) -> ElevationConfig {
        ElevationConfig {
            provider_url: self.elevation_provider_url.clone(),
            max_points_per_request: self.elevation_max_points_per_request,
            request_timeout_s: self.elevation_request_timeout_s,
        }
    }
}
