//! Flightnet GCS - clients for the planner's external collaborators
//!
//! Terrain elevation sampling and the downstream GCS flight-network
//! validation/upload API.

pub mod client;
pub mod elevation;

pub use client::{GcsClient, UploadOutcome};
pub use elevation::{ElevationClient, ElevationConfig, DEFAULT_ELEVATION_URL};
