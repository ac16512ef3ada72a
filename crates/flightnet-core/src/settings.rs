//! Per-project planning settings.

use serde::{Deserialize, Serialize};

use crate::error::{NetworkError, Result};

/// Configuration for linking, altitude and export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSettings {
    /// Default flight altitude in meters for points without an override
    pub flight_altitude_m: f64,
    /// Search radius in meters for building-to-segment links
    pub max_connector_distance: f64,
    /// Building footprint radius in meters, kept with the project settings
    pub building_radius: f64,
    /// Visualize links at flight altitude instead of clamped to ground
    pub show_flight_altitude: bool,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            flight_altitude_m: 70.0,
            max_connector_distance: 50.0,
            building_radius: 2.0,
            show_flight_altitude: false,
        }
    }
}

impl ProjectSettings {
    /// Validate settings. Returns list of problems (empty = valid).
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if !self.flight_altitude_m.is_finite() || self.flight_altitude_m < 0.0 {
            errors.push(format!(
                "Flight altitude must be a non-negative number (got {})",
                self.flight_altitude_m
            ));
        }
        if !self.max_connector_distance.is_finite() || self.max_connector_distance <= 0.0 {
            errors.push(format!(
                "Max connector distance must be positive (got {})",
                self.max_connector_distance
            ));
        }
        if !self.building_radius.is_finite() || self.building_radius < 0.0 {
            errors.push(format!(
                "Building radius cannot be negative (got {})",
                self.building_radius
            ));
        }

        errors
    }

    pub fn ensure_valid(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(NetworkError::InvalidSettings(errors))
        }
    }
}
