use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde::Deserialize;

use crate::assessor::QueueAssessor;
use crate::config::Config;
use crate::gradebook::Gradebook;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// An open workspace. Replaced wholesale by `workspace.select`; requests
/// already running keep the one they started with.
pub struct Workspace {
    pub path: PathBuf,
    pub gradebook: Arc<Gradebook>,
    pub queue: Arc<QueueAssessor>,
}

pub struct AppState {
    pub config: Config,
    workspace: RwLock<Option<Arc<Workspace>>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            workspace: RwLock::new(None),
        }
    }

    pub fn workspace(&self) -> Option<Arc<Workspace>> {
        match self.workspace.read() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set_workspace(&self, ws: Workspace) {
        let mut slot = match self.workspace.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(Arc::new(ws));
    }
}
