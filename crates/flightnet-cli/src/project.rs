//! Project files on disk and the passes run over them.

use anyhow::{Context, Result};
use flightnet_core::{
    apply_links, export_network, run_link_pass, Building, ElevationProvider, Export, LinkPass,
    NetworkMeta, NetworkSnapshot, PathFinder, ProjectSettings, Topology,
};
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::path::Path;

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let raw = serde_json::to_string_pretty(value)?;
    fs::write(path, raw).with_context(|| format!("Failed to write {}", path.display()))
}

/// A network snapshot, its buildings and settings loaded from JSON files.
#[derive(Debug, Clone)]
pub struct ProjectFiles {
    pub network_id: String,
    pub topology: Topology,
    pub buildings: Vec<Building>,
    pub settings: ProjectSettings,
}

impl ProjectFiles {
    pub fn load(network: &Path, buildings: Option<&Path>, settings: Option<&Path>) -> Result<Self> {
        let snapshot: NetworkSnapshot = load_json(network)?;
        let topology = Topology::from_snapshot(&snapshot)
            .with_context(|| format!("Invalid network snapshot {}", network.display()))?;

        let buildings = match buildings {
            Some(path) => load_json(path)?,
            None => Vec::new(),
        };
        let settings: ProjectSettings = match settings {
            Some(path) => load_json(path)?,
            None => ProjectSettings::default(),
        };
        settings.ensure_valid()?;

        tracing::info!(
            "Loaded network '{}' ({} segments, {} points, {} buildings)",
            snapshot.id,
            topology.segments().len(),
            topology.point_count(),
            buildings.len()
        );

        Ok(Self {
            network_id: snapshot.id,
            topology,
            buildings,
            settings,
        })
    }

    /// Link buildings and write the links back onto them.
    pub async fn link<P: ElevationProvider>(&mut self, provider: &P) -> Result<LinkPass> {
        let pass = run_link_pass(provider, &self.topology, &self.buildings, &self.settings)
            .await
            .context("Linking pass failed")?;
        apply_links(&mut self.buildings, &pass.links);
        Ok(pass)
    }

    pub async fn export<P: ElevationProvider>(&mut self, provider: &P, meta: &NetworkMeta) -> Result<Export> {
        let export = export_network(provider, meta, &self.topology, &self.buildings, &self.settings)
            .await
            .context("Export failed")?;
        apply_links(&mut self.buildings, &export.links);
        Ok(export)
    }

    /// One `segment point label` row per point, in drawing order.
    pub fn label_rows(&self) -> Vec<String> {
        let finder = PathFinder::new(&self.topology);
        let mut rows = Vec::new();
        for segment in self.topology.segments() {
            for point in self.topology.segment_points(segment.id) {
                let marker = point.marker.map(|m| m.as_str()).unwrap_or("");
                rows.push(
                    format!("{} {} {} {}", segment.id, point.id, marker, finder.label(point.id))
                        .trim_end()
                        .to_string(),
                );
            }
        }
        rows
    }
}

/// Human-readable summary of a linking pass.
pub fn link_summary(pass: &LinkPass) -> Vec<String> {
    let mut lines = vec![format!("{} lines, {} linked buildings", pass.lines.len(), pass.links.len())];
    for link in pass.links.iter() {
        let altitude = link
            .flight_altitude
            .map(|a| format!("{:.1} m", a))
            .unwrap_or_else(|| "-".to_string());
        lines.push(format!(
            "  {} -> {}/{}  {:.1} m  alt {}",
            link.building_id, link.edge.segment, link.edge.index, link.distance_m, altitude
        ));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use flightnet_core::FlatTerrain;
    use serde_json::json;
    use std::path::PathBuf;

    fn temp_file(name: &str, value: serde_json::Value) -> PathBuf {
        let path = std::env::temp_dir().join(format!("flightnet-{}-{}", uuid::Uuid::new_v4(), name));
        fs::write(&path, value.to_string()).unwrap();
        path
    }

    fn network_file() -> PathBuf {
        temp_file(
            "network.json",
            json!({
                "id": "net",
                "segments": [[[34.0, 32.0], [34.002, 32.0]]],
                "node_props": [{"segment_index": 0, "waypoint_index": 0, "marker_type": "semaphore"}]
            }),
        )
    }

    fn buildings_file() -> PathBuf {
        temp_file(
            "buildings.json",
            json!([{
                "id": "b1",
                "position": {"lon": 34.001, "lat": 32.0001},
                "locked": true
            }]),
        )
    }

    #[test]
    fn load_uses_default_settings() {
        let project = ProjectFiles::load(&network_file(), None, None).unwrap();
        assert_eq!(project.network_id, "net");
        assert_eq!(project.topology.point_count(), 2);
        assert_eq!(project.settings, ProjectSettings::default());
        assert!(project.buildings.is_empty());
    }

    #[test]
    fn load_rejects_invalid_settings() {
        let settings = temp_file("settings.json", json!({"building_radius": -3.0}));
        assert!(ProjectFiles::load(&network_file(), None, Some(&settings)).is_err());
    }

    #[test]
    fn missing_file_names_path() {
        let err = ProjectFiles::load(Path::new("/nonexistent/network.json"), None, None).unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/network.json"));
    }

    #[test]
    fn label_rows_mark_semaphore() {
        let project = ProjectFiles::load(&network_file(), None, None).unwrap();
        let rows = project.label_rows();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].ends_with("semaphore"));
        assert!(rows[1].ends_with(" m"));
    }

    #[tokio::test]
    async fn export_writes_links_back() {
        let mut project = ProjectFiles::load(&network_file(), Some(&buildings_file()), None).unwrap();
        let meta = NetworkMeta { id: 0, name: "net".into() };
        let export = project.export(&FlatTerrain::new(0.0), &meta).await.unwrap();

        assert_eq!(export.network.nodes.len(), 4);
        assert!(project.buildings[0].link.is_some());

        let out = std::env::temp_dir().join(format!("flightnet-{}-out.json", uuid::Uuid::new_v4()));
        write_json(&out, &export.network).unwrap();
        let written: flightnet_core::FlightNetwork = load_json(&out).unwrap();
        assert_eq!(written, export.network);
    }

    #[tokio::test]
    async fn link_summary_lists_buildings() {
        let mut project = ProjectFiles::load(&network_file(), Some(&buildings_file()), None).unwrap();
        let pass = project.link(&FlatTerrain::new(0.0)).await.unwrap();
        let summary = link_summary(&pass);
        assert_eq!(summary[0], "1 lines, 1 linked buildings");
        assert!(summary[1].starts_with("  b1 -> S0/0"));
    }
}
