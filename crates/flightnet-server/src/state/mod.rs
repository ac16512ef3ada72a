//! In-memory application state using DashMap.

pub mod session;

pub use session::{PlanningSession, ProjectData};

use anyhow::Result;
use dashmap::DashMap;
use flightnet_gcs::GcsClient;
use std::sync::Arc;

use crate::config::Config;
use crate::terrain::Terrain;

/// Application state - planning sessions keyed by project id plus the
/// external collaborators they use.
pub struct AppState {
    sessions: DashMap<String, Arc<PlanningSession>>,
    terrain: Terrain,
    gcs: Option<GcsClient>,
    config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let terrain = Terrain::from_config(&config)?;
        let gcs = match config.gcs_url.as_deref() {
            Some(url) => Some(GcsClient::new(url, config.gcs_token.clone())?),
            None => None,
        };
        Ok(Self {
            sessions: DashMap::new(),
            terrain,
            gcs,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn terrain(&self) -> &Terrain {
        &self.terrain
    }

    pub fn gcs(&self) -> Option<&GcsClient> {
        self.gcs.as_ref()
    }

    /// Session of an existing project.
    pub fn session(&self, project_id: &str) -> Option<Arc<PlanningSession>> {
        self.sessions.get(project_id).map(|entry| entry.value().clone())
    }

    /// Session of a project, created empty on first use.
    pub fn session_or_create(&self, project_id: &str) -> Arc<PlanningSession> {
        self.sessions
            .entry(project_id.to_string())
            .or_insert_with(|| {
                tracing::info!("Created planning session for project {}", project_id);
                Arc::new(PlanningSession::new())
            })
            .value()
            .clone()
    }

    pub fn project_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }
}
