//! Elevation queries and flight-altitude interpolation along links.

use std::collections::HashMap;
use std::future::Future;

use crate::error::{NetworkError, Result};
use crate::geometry::surface_distance;
use crate::linking::{EdgeKey, LineSegment, LinkSet};
use crate::settings::ProjectSettings;

/// Batched terrain elevation lookup.
///
/// Implementations must return exactly one elevation (meters) per input
/// `(lon, lat)`, in input order. Failures are reported, never retried here.
pub trait ElevationProvider: Send + Sync {
    fn query_elevations(&self, positions: &[(f64, f64)]) -> impl Future<Output = Result<Vec<f64>>> + Send;
}

/// Answers every query with one constant elevation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FlatTerrain {
    pub elevation_m: f64,
}

impl FlatTerrain {
    pub fn new(elevation_m: f64) -> Self {
        Self { elevation_m }
    }
}

impl ElevationProvider for FlatTerrain {
    async fn query_elevations(&self, positions: &[(f64, f64)]) -> Result<Vec<f64>> {
        Ok(vec![self.elevation_m; positions.len()])
    }
}

/// Run one batched query and enforce the order/length contract.
pub async fn query_batch<P: ElevationProvider>(provider: &P, positions: &[(f64, f64)]) -> Result<Vec<f64>> {
    if positions.is_empty() {
        return Ok(Vec::new());
    }
    let elevations = provider.query_elevations(positions).await?;
    if elevations.len() != positions.len() {
        return Err(NetworkError::ElevationCountMismatch {
            expected: positions.len(),
            got: elevations.len(),
        });
    }
    Ok(elevations)
}

/// Linear interpolation between `start` and `end`.
pub fn interpolate(start: f64, end: f64, fraction: f64) -> f64 {
    start + (end - start) * fraction
}

/// Resolve ground elevations of every edge and link endpoint and the flight
/// altitude of every link, issuing a single elevation query.
///
/// The query carries each edge's `[start, end]` followed by each link's
/// `[building, on-line point]`. Nothing is written unless the query succeeds.
pub async fn resolve_link_altitudes<P: ElevationProvider>(
    provider: &P,
    lines: &mut [LineSegment],
    links: &mut LinkSet,
    settings: &ProjectSettings,
) -> Result<()> {
    let mut positions = Vec::with_capacity(lines.len() * 2 + links.len() * 2);
    for line in lines.iter() {
        positions.push((line.start_position.lon, line.start_position.lat));
        positions.push((line.end_position.lon, line.end_position.lat));
    }
    let link_ids: Vec<String> = links.iter().map(|link| link.building_id.clone()).collect();
    for id in &link_ids {
        if let Some(link) = links.get(id) {
            positions.push((link.endpoints[0].lon, link.endpoints[0].lat));
            positions.push((link.endpoints[1].lon, link.endpoints[1].lat));
        }
    }

    let elevations = query_batch(provider, &positions).await.map_err(|e| {
        tracing::warn!("Elevation query for {} positions failed: {}", positions.len(), e);
        e
    })?;

    let (line_elevations, link_elevations) = elevations.split_at(lines.len() * 2);
    let mut edges: HashMap<EdgeKey, usize> = HashMap::with_capacity(lines.len());
    for (i, line) in lines.iter_mut().enumerate() {
        line.start_position.alt = line_elevations[i * 2];
        line.end_position.alt = line_elevations[i * 2 + 1];
        edges.insert(line.key, i);
    }

    let mut samples: HashMap<&str, (f64, f64)> = HashMap::with_capacity(link_ids.len());
    for (i, id) in link_ids.iter().enumerate() {
        samples.insert(id.as_str(), (link_elevations[i * 2], link_elevations[i * 2 + 1]));
    }

    for link in links.iter_mut() {
        let Some(line) = edges.get(&link.edge).map(|i| &lines[*i]) else {
            tracing::warn!("Link for building {} references a missing edge", link.building_id);
            continue;
        };
        let Some((building_ground, on_line_ground)) = samples.get(link.building_id.as_str()).copied() else {
            continue;
        };

        let edge_length = surface_distance(&line.start_position, &line.end_position);
        let fraction = if edge_length > 0.0 {
            surface_distance(&line.start_position, &link.endpoints[1]) / edge_length
        } else {
            0.0
        };

        link.endpoints[0].alt = building_ground;
        link.endpoints[1].alt = if settings.show_flight_altitude {
            interpolate(line.start_position.alt, line.end_position.alt, fraction)
        } else {
            on_line_ground
        };
        link.flight_altitude = Some(interpolate(
            line.flight_altitudes[0],
            line.flight_altitudes[1],
            fraction,
        ));
    }

    Ok(())
}
