//! One import run end to end: clear staging, load every file, swap, report.

use crate::artifacts::ArtifactManager;
use crate::config::ImportConfig;
use crate::db::{self, MAIN_TABLE};
use crate::error::Result;
use crate::loader::{self, BatchLoader};
use crate::prediction::DetachedPrediction;
use crate::staging;
use crate::swap::SwapCoordinator;
use crate::task::{Task, TaskStatus};
use crate::tracker::TaskTracker;
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

pub struct ImportPipeline {
    db_path: PathBuf,
    config: ImportConfig,
    tracker: Arc<TaskTracker>,
    artifacts: Arc<ArtifactManager>,
    swap: Arc<dyn SwapCoordinator>,
    prediction: DetachedPrediction,
}

impl ImportPipeline {
    pub fn new(
        db_path: PathBuf,
        config: ImportConfig,
        tracker: Arc<TaskTracker>,
        artifacts: Arc<ArtifactManager>,
        swap: Arc<dyn SwapCoordinator>,
        prediction: DetachedPrediction,
    ) -> Self {
        ImportPipeline {
            db_path,
            config,
            tracker,
            artifacts,
            swap,
            prediction,
        }
    }

    pub fn tracker(&self) -> &Arc<TaskTracker> {
        &self.tracker
    }

    /// Drive `task_id` to a terminal state. Returns the final task record;
    /// pipeline failures are recorded on the task rather than returned.
    /// Tasks that are no longer pending are left alone.
    pub fn run(&self, task_id: &str) -> Result<Task> {
        let task = self.tracker.get(task_id)?;
        if task.status != TaskStatus::Pending {
            warn!(task_id, status = %task.status, "task is not pending, skipping");
            return Ok(task);
        }

        let started = Instant::now();
        info!(task_id, files = task.total_files, batch_size = task.batch_size, "import started");

        let mut conn = match db::connect(&self.db_path, self.config.busy_timeout) {
            Ok(c) => c,
            Err(e) => {
                error!(task_id, error = %e, "could not open database");
                return self.tracker.fail(task_id, &e.to_string());
            }
        };

        match self.execute(&mut conn, &task) {
            Ok(done) => {
                info!(
                    task_id,
                    generation = done.generation,
                    imported = done.imported_records,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "import completed"
                );
                self.dispatch_prediction(&conn, task_id);
                Ok(done)
            }
            Err(e) => {
                error!(task_id, code = e.code(), error = %e, "import failed");
                let failed = self.tracker.fail(task_id, &e.to_string())?;
                if let Err(clear) = staging::truncate_staging(&conn) {
                    warn!(task_id, error = %clear, "staging cleanup after failure did not complete");
                }
                Ok(failed)
            }
        }
    }

    fn execute(&self, conn: &mut Connection, task: &Task) -> Result<Task> {
        let id = task.id.as_str();
        staging::ensure_schema_present(conn)?;
        staging::truncate_staging(conn)?;
        self.tracker.mark_staging_cleared(id)?;

        let loader = BatchLoader::new(task.batch_size, self.config.chunk_timeout)?;
        for (idx, file) in task.files.iter().enumerate() {
            self.tracker.begin_file(id, idx)?;
            let loaded = self
                .artifacts
                .resolve(&file.artifact_id)
                .and_then(|path| loader.load_file(conn, &path));
            match loaded {
                Ok(summary) => {
                    info!(task_id = id, file = %file.file_name, rows = summary.imported, "file loaded");
                    self.tracker.finish_file(id, idx, summary)?;
                }
                Err(e) => {
                    self.tracker.fail_file(id, idx, &e.to_string())?;
                    return Err(e);
                }
            }
        }

        self.tracker.mark_loaded(id)?;
        self.tracker.begin_swap(id)?;
        let outcome = self.swap.swap(conn, Some(id))?;
        self.tracker.complete(id, outcome.generation)
    }

    fn dispatch_prediction(&self, conn: &Connection, task_id: &str) {
        let n = self.config.prediction_sample_rows;
        if n == 0 {
            return;
        }
        match loader::read_table_head(conn, MAIN_TABLE, n) {
            Ok(rows) => {
                self.prediction.dispatch(task_id, rows);
            }
            Err(e) => warn!(task_id, error = %e, "could not sample rows for prediction"),
        }
    }
}
