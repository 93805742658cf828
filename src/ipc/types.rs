use gradeimportd::config::ImportConfig;
use gradeimportd::service::ImportService;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub config: ImportConfig,
    /// Set by `workspace.select`; every import method needs it.
    pub service: Option<ImportService>,
    /// Services replaced by a later `workspace.select`, still finishing their
    /// queued imports in the background.
    pub draining: Vec<(PathBuf, JoinHandle<()>)>,
}

impl AppState {
    pub fn new(config: ImportConfig) -> Self {
        AppState {
            config,
            service: None,
            draining: Vec::new(),
        }
    }

    /// Wait for a background drain of `workspace`, if one is running. A
    /// workspace is never reopened while its previous worker still owns the
    /// staging table.
    pub fn finish_draining(&mut self, workspace: &Path) {
        let (same, others): (Vec<_>, Vec<_>) = std::mem::take(&mut self.draining)
            .into_iter()
            .partition(|(p, _)| p == workspace);
        self.draining = others;
        join_all(same);
    }

    pub fn finish_all_draining(&mut self) {
        join_all(std::mem::take(&mut self.draining));
    }
}

fn join_all(handles: Vec<(PathBuf, JoinHandle<()>)>) {
    for (p, handle) in handles {
        if handle.join().is_err() {
            tracing::error!(workspace = %p.display(), "workspace drain panicked");
        }
    }
}
