//! Everything a workspace needs to accept uploads and run imports, wired
//! together once at `workspace.select` time.

use crate::artifacts::{ArtifactManager, ArtifactMeta, ScratchStats, SweepReport};
use crate::config::{validate_batch_size, ImportConfig, TaskStoreKind};
use crate::db;
use crate::error::{ImportError, Result};
use crate::pipeline::ImportPipeline;
use crate::prediction::{DetachedPrediction, PredictionAdapter};
use crate::registry::{InMemoryTaskRegistry, SqliteTaskRegistry, TaskRegistry};
use crate::swap::{SqliteSwapCoordinator, SwapCoordinator};
use crate::task::{Task, TaskStatus};
use crate::tracker::{FileRef, TaskTracker};
use crate::worker::ImportWorker;
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub struct ImportService {
    workspace: PathBuf,
    config: ImportConfig,
    tracker: Arc<TaskTracker>,
    artifacts: Arc<ArtifactManager>,
    worker: ImportWorker,
}

impl ImportService {
    pub fn open(
        workspace: &Path,
        config: ImportConfig,
        prediction: Arc<dyn PredictionAdapter>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let conn = db::open_db(workspace, config.busy_timeout)
            .with_context(|| format!("open database in {}", workspace.display()))?;

        let registry: Arc<dyn TaskRegistry> = match config.task_store {
            TaskStoreKind::Sqlite => Arc::new(SqliteTaskRegistry::new(conn)),
            TaskStoreKind::Memory => Arc::new(InMemoryTaskRegistry::new()),
        };
        let tracker = Arc::new(TaskTracker::new(registry));
        let interrupted = tracker.fail_interrupted()?;
        if interrupted > 0 {
            warn!(interrupted, "tasks left unfinished by a previous run were failed");
        }

        let scratch = config.scratch_dir_for(workspace);
        let artifacts = Arc::new(
            ArtifactManager::new(&scratch)
                .with_context(|| format!("create scratch dir {}", scratch.display()))?,
        );
        let swap: Arc<dyn SwapCoordinator> = Arc::new(SqliteSwapCoordinator::new());

        let pipeline = Arc::new(ImportPipeline::new(
            db::db_path(workspace),
            config.clone(),
            Arc::clone(&tracker),
            Arc::clone(&artifacts),
            swap,
            DetachedPrediction::new(prediction),
        ));
        let worker = ImportWorker::spawn(pipeline)?;

        info!(
            workspace = %workspace.display(),
            scratch = %scratch.display(),
            task_store = ?config.task_store,
            "import service ready"
        );
        Ok(ImportService {
            workspace: workspace.to_path_buf(),
            config,
            tracker,
            artifacts,
            worker,
        })
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn artifacts(&self) -> &ArtifactManager {
        &self.artifacts
    }

    pub fn store_upload(&self, bytes: &[u8], original_name: &str) -> Result<ArtifactMeta> {
        self.artifacts.store(bytes, original_name)
    }

    pub fn list_uploads(&self) -> Result<Vec<ArtifactMeta>> {
        self.artifacts.list()
    }

    pub fn delete_upload(&self, id: &str) -> Result<()> {
        self.artifacts.delete(id)
    }

    /// Create a pending task over `artifact_ids`, or over every stored upload
    /// when none are named.
    pub fn create_task(&self, batch_size: Option<usize>, artifact_ids: Option<&[String]>) -> Result<Task> {
        let batch_size = validate_batch_size(batch_size.unwrap_or(self.config.batch_size))?;
        let metas = match artifact_ids {
            Some(ids) => ids
                .iter()
                .map(|id| self.artifacts.meta(id))
                .collect::<Result<Vec<_>>>()?,
            None => self.artifacts.list()?,
        };
        let files = metas
            .into_iter()
            .map(|m| FileRef {
                artifact_id: m.id,
                file_name: m.original_name,
            })
            .collect();
        self.tracker.create(files, batch_size)
    }

    pub fn start_task(&self, task_id: &str) -> Result<Task> {
        let task = self.tracker.get(task_id)?;
        if task.status != TaskStatus::Pending {
            return Err(ImportError::InvalidTransition {
                from: task.status.to_string(),
                to: TaskStatus::StagingCleared.to_string(),
            });
        }
        self.worker.enqueue(task_id)?;
        Ok(task)
    }

    pub fn task(&self, task_id: &str) -> Result<Task> {
        self.tracker.get(task_id)
    }

    pub fn tasks(&self) -> Result<Vec<Task>> {
        self.tracker.list()
    }

    pub fn sweep(&self, max_age_hours: Option<u64>) -> SweepReport {
        self.artifacts
            .sweep(max_age_hours.unwrap_or(self.config.retention_hours))
    }

    pub fn stats(&self) -> Result<ScratchStats> {
        self.artifacts.stats()
    }

    /// Finish queued imports and stop the worker.
    pub fn shutdown(mut self) {
        self.worker.shutdown();
    }
}
