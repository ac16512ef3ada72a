//! GCS flight-network API client.

use anyhow::{anyhow, Context, Result};
use flightnet_core::{ExportError, FlightNetwork, ValidationError, ValidationErrors};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

/// HTTP client for the downstream GCS validation/upload service.
#[derive(Debug, Clone)]
pub struct GcsClient {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CurrentNetworkResponse {
    id: u64,
}

/// Outcome of an upload attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    /// The network replaced the GCS's current network.
    Uploaded { network_id: u64 },
    /// The GCS refused the network (HTTP 409).
    Rejected(ExportError),
}

impl GcsClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(anyhow!("GCS URL is empty"));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            base_url,
            auth_token: token
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/flightnetworks/{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth_token.as_deref() {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }

    /// Validate a network. An empty list means the network is valid.
    pub async fn validate_network(&self, network: &FlightNetwork) -> Result<Vec<ValidationError>> {
        let response = self
            .authorize(self.client.post(self.url("validate/")).json(network))
            .send()
            .await
            .context("Failed to send network for validation")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Network validation failed: {} {}", status, body));
        }

        let payload = response
            .json::<ValidationErrors>()
            .await
            .context("Failed to parse validation response")?;

        tracing::info!(
            "GCS validation of network {} returned {} error(s)",
            network.id,
            payload.validation_errors.len()
        );
        Ok(payload.validation_errors)
    }

    /// Replace the GCS's current network with `network`.
    pub async fn upload_network(&self, network: &FlightNetwork) -> Result<UploadOutcome> {
        let response = self
            .authorize(self.client.post(self.url("get_current/")).json(&serde_json::json!({})))
            .send()
            .await
            .context("Failed to fetch current GCS network")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Current network request failed: {} {}", status, body));
        }

        let current = response
            .json::<CurrentNetworkResponse>()
            .await
            .context("Failed to parse current network response")?;

        let response = self
            .authorize(
                self.client
                    .patch(self.url(&format!("{}/", current.id)))
                    .json(network),
            )
            .send()
            .await
            .context("Failed to upload network")?;

        let status = response.status();
        if status == StatusCode::CONFLICT {
            let error = response
                .json::<ExportError>()
                .await
                .context("Failed to parse upload rejection")?;
            tracing::warn!("GCS rejected network upload: {}", error.message);
            return Ok(UploadOutcome::Rejected(error));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Network upload failed: {} {}", status, body));
        }

        tracing::info!("Uploaded network {} as GCS network {}", network.id, current.id);
        Ok(UploadOutcome::Uploaded {
            network_id: current.id,
        })
    }
}
