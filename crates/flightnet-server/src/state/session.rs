//! One project's planning state and its pending-operation guard.

use chrono::{DateTime, Utc};
use flightnet_core::{
    apply_links, export_network, run_link_pass, Building, ElevationProvider, Export, ExportIndex,
    LinkPass, NetworkError, NetworkMeta, ProjectSettings, Topology,
};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, MutexGuard};

/// Everything a project's passes read and write.
#[derive(Debug, Default)]
pub struct ProjectData {
    pub network_id: String,
    pub topology: Topology,
    pub settings: ProjectSettings,
    pub buildings: Vec<Building>,
    /// Id maps of the last export, kept until the next export replaces them
    pub last_export: Option<ExportIndex>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProjectData {
    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}

/// Planning session of one project.
///
/// All state sits behind one async mutex. Linking and export passes hold it
/// across their elevation queries, so edits queue behind an in-flight pass.
/// Each pass draws a ticket first; a pass whose ticket is outdated by the
/// time it finishes is discarded with [`NetworkError::Superseded`].
#[derive(Debug, Default)]
pub struct PlanningSession {
    project: Mutex<ProjectData>,
    generation: AtomicU64,
}

impl PlanningSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self) -> MutexGuard<'_, ProjectData> {
        self.project.lock().await
    }

    fn begin_pass(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn ensure_current(&self, ticket: u64) -> Result<(), NetworkError> {
        if self.generation.load(Ordering::SeqCst) == ticket {
            Ok(())
        } else {
            tracing::debug!("Discarding superseded pass {}", ticket);
            Err(NetworkError::Superseded)
        }
    }

    /// Re-link buildings and write the links back.
    pub async fn link<P: ElevationProvider>(&self, provider: &P) -> Result<LinkPass, NetworkError> {
        let ticket = self.begin_pass();
        let mut project = self.project.lock().await;
        self.ensure_current(ticket)?;

        let pass = run_link_pass(provider, &project.topology, &project.buildings, &project.settings).await?;

        self.ensure_current(ticket)?;
        apply_links(&mut project.buildings, &pass.links);
        project.touch();
        Ok(pass)
    }

    /// Export the network, write links back and retain the export index.
    pub async fn export<P: ElevationProvider>(&self, provider: &P, meta: &NetworkMeta) -> Result<Export, NetworkError> {
        let ticket = self.begin_pass();
        let mut project = self.project.lock().await;
        self.ensure_current(ticket)?;

        let export = export_network(provider, meta, &project.topology, &project.buildings, &project.settings).await?;

        self.ensure_current(ticket)?;
        apply_links(&mut project.buildings, &export.links);
        project.last_export = Some(export.index.clone());
        project.touch();
        Ok(export)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flightnet_core::{FlatTerrain, Position};
    use std::sync::Arc;
    use std::time::Duration;

    /// Flat terrain that takes a while to answer.
    struct SlowTerrain;

    impl ElevationProvider for SlowTerrain {
        async fn query_elevations(&self, positions: &[(f64, f64)]) -> flightnet_core::Result<Vec<f64>> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(vec![0.0; positions.len()])
        }
    }

    async fn session_with_segment() -> Arc<PlanningSession> {
        let session = Arc::new(PlanningSession::new());
        session
            .lock()
            .await
            .topology
            .add_segment(&[Position::surface(34.0, 32.0), Position::surface(34.001, 32.0)]);
        session
    }

    #[tokio::test]
    async fn export_retains_index() {
        let session = session_with_segment().await;
        let meta = NetworkMeta { id: 1, name: "n".into() };
        let export = session.export(&FlatTerrain::new(5.0), &meta).await.unwrap();
        assert_eq!(export.network.nodes.len(), 2);
        assert!(session.lock().await.last_export.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn newer_pass_supersedes_older_one() {
        let session = session_with_segment().await;

        let first = {
            let session = session.clone();
            tokio::spawn(async move { session.link(&SlowTerrain).await })
        };
        // Let the first pass take the guard and start waiting on terrain.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = {
            let session = session.clone();
            tokio::spawn(async move { session.link(&SlowTerrain).await })
        };

        let first = first.await.unwrap();
        let second = second.await.unwrap();
        assert!(matches!(first, Err(NetworkError::Superseded)));
        assert!(second.is_ok());
    }
}
