//! Batched terrain elevation client (Open-Meteo compatible).

use anyhow::{anyhow, Context, Result};
use flightnet_core::{ElevationProvider, NetworkError};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_ELEVATION_URL: &str = "https://api.open-meteo.com/v1/elevation";

#[derive(Debug, Clone)]
pub struct ElevationConfig {
    pub provider_url: String,
    pub max_points_per_request: usize,
    pub request_timeout_s: u64,
}

impl Default for ElevationConfig {
    fn default() -> Self {
        Self {
            provider_url: DEFAULT_ELEVATION_URL.to_string(),
            max_points_per_request: 100,
            request_timeout_s: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenMeteoElevationResponse {
    elevation: Option<Vec<f64>>,
}

/// HTTP elevation provider.
///
/// One logical query may be split into several requests of at most
/// `max_points_per_request` positions; the caller still sees a single
/// ordered answer or a single failure.
#[derive(Debug, Clone)]
pub struct ElevationClient {
    client: Client,
    config: ElevationConfig,
}

impl ElevationClient {
    pub fn new(config: ElevationConfig) -> Result<Self> {
        if config.provider_url.trim().is_empty() {
            return Err(anyhow!("elevation provider URL is empty"));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_s.max(1)))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ElevationConfig {
        &self.config
    }

    /// Query elevations for `(lon, lat)` positions, preserving order.
    pub async fn query(&self, positions: &[(f64, f64)]) -> Result<Vec<f64>> {
        let max_points = self.config.max_points_per_request.max(1);
        let mut elevations = Vec::with_capacity(positions.len());

        for chunk in positions.chunks(max_points) {
            let longitudes: Vec<f64> = chunk.iter().map(|(lon, _)| *lon).collect();
            let latitudes: Vec<f64> = chunk.iter().map(|(_, lat)| *lat).collect();
            let url = build_provider_url(
                &self.config.provider_url,
                &join_params(&latitudes),
                &join_params(&longitudes),
            );

            let response = self
                .client
                .get(&url)
                .send()
                .await
                .context("Failed to query elevation provider")?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(anyhow!("Elevation provider HTTP {} {}", status, body));
            }

            let payload = response
                .json::<OpenMeteoElevationResponse>()
                .await
                .context("Failed to parse elevation response")?;
            let samples = payload
                .elevation
                .ok_or_else(|| anyhow!("Elevation provider response is missing elevation"))?;

            if samples.len() != chunk.len() {
                return Err(anyhow!(
                    "Elevation provider returned {} samples for {} positions",
                    samples.len(),
                    chunk.len()
                ));
            }
            if samples.iter().any(|value| !value.is_finite()) {
                return Err(anyhow!("Elevation provider returned a non-finite sample"));
            }
            elevations.extend(samples);
        }

        tracing::debug!(
            "Fetched {} elevations in {} request(s)",
            elevations.len(),
            positions.len().div_ceil(max_points)
        );
        Ok(elevations)
    }
}

impl ElevationProvider for ElevationClient {
    async fn query_elevations(&self, positions: &[(f64, f64)]) -> flightnet_core::Result<Vec<f64>> {
        self.query(positions)
            .await
            .map_err(|err| NetworkError::ElevationService(format!("{:#}", err)))
    }
}

fn join_params(values: &[f64]) -> String {
    values
        .iter()
        .map(|value| format!("{:.6}", value))
        .collect::<Vec<_>>()
        .join(",")
}

fn build_provider_url(base: &str, latitudes: &str, longitudes: &str) -> String {
    let separator = if base.contains('?') { "&" } else { "?" };
    format!("{}{}latitude={}&longitude={}", base, separator, latitudes, longitudes)
}
