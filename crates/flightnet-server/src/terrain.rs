//! Elevation source selected from configuration.

use anyhow::Result;
use flightnet_core::{ElevationProvider, FlatTerrain};
use flightnet_gcs::ElevationClient;

use crate::config::Config;

#[derive(Debug, Clone)]
pub enum Terrain {
    Flat(FlatTerrain),
    Remote(ElevationClient),
}

impl Terrain {
    pub fn from_config(config: &Config) -> Result<Self> {
        match config.flat_terrain_elevation_m {
            Some(elevation_m) => {
                tracing::warn!("Using flat terrain at {} m; elevation provider disabled", elevation_m);
                Ok(Terrain::Flat(FlatTerrain::new(elevation_m)))
            }
            None => Ok(Terrain::Remote(ElevationClient::new(config.elevation_config())?)),
        }
    }
}

impl ElevationProvider for Terrain {
    async fn query_elevations(&self, positions: &[(f64, f64)]) -> flightnet_core::Result<Vec<f64>> {
        match self {
            Terrain::Flat(flat) => flat.query_elevations(positions).await,
            Terrain::Remote(client) => client.query_elevations(positions).await,
        }
    }
}
