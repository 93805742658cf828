//! Forward-only lifecycle tracking for import tasks.
//!
//! Every mutation is a read-modify-write against the injected registry under
//! one writer lock. Callbacks that arrive after a task reached `completed` or
//! `failed` are ignored and return the task unchanged.

use crate::error::{ImportError, Result};
use crate::loader::LoadSummary;
use crate::registry::TaskRegistry;
use crate::task::{FileStatus, Task, TaskFile, TaskStatus};
use chrono::Utc;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const INTERRUPTED_MESSAGE: &str = "interrupted by process restart";

#[derive(Debug, Clone)]
pub struct FileRef {
    pub artifact_id: String,
    pub file_name: String,
}

pub struct TaskTracker {
    registry: Arc<dyn TaskRegistry>,
    write: Mutex<()>,
}

impl TaskTracker {
    pub fn new(registry: Arc<dyn TaskRegistry>) -> Self {
        TaskTracker {
            registry,
            write: Mutex::new(()),
        }
    }

    pub fn create(&self, files: Vec<FileRef>, batch_size: usize) -> Result<Task> {
        if files.is_empty() {
            return Err(ImportError::NoFiles);
        }
        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4().to_string(),
            status: TaskStatus::Pending,
            batch_size,
            total_files: files.len() as u32,
            processed_files: 0,
            total_records: 0,
            imported_records: 0,
            progress: 0,
            error_message: None,
            generation: None,
            files: files
                .into_iter()
                .map(|f| TaskFile {
                    artifact_id: f.artifact_id,
                    file_name: f.file_name,
                    status: FileStatus::Pending,
                    records_count: 0,
                    imported_count: 0,
                    error_message: None,
                })
                .collect(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        self.registry.create(&task)?;
        info!(task_id = %task.id, files = task.total_files, batch_size, "task created");
        Ok(task)
    }

    pub fn get(&self, id: &str) -> Result<Task> {
        self.registry
            .get(id)?
            .ok_or_else(|| ImportError::TaskNotFound(id.to_string()))
    }

    pub fn list(&self) -> Result<Vec<Task>> {
        self.registry.list()
    }

    pub fn mark_staging_cleared(&self, id: &str) -> Result<Task> {
        self.apply(id, Some(TaskStatus::StagingCleared), |_| {})
    }

    pub fn begin_file(&self, id: &str, idx: usize) -> Result<Task> {
        self.apply(id, Some(TaskStatus::Loading), |t| {
            if let Some(f) = t.files.get_mut(idx) {
                f.status = FileStatus::Loading;
            }
        })
    }

    pub fn finish_file(&self, id: &str, idx: usize, summary: LoadSummary) -> Result<Task> {
        self.apply(id, Some(TaskStatus::Loading), |t| {
            if let Some(f) = t.files.get_mut(idx) {
                f.status = FileStatus::Completed;
                f.records_count = summary.total;
                f.imported_count = summary.imported;
            }
            t.processed_files = (t.processed_files + 1).min(t.total_files);
            t.total_records += summary.total;
            t.imported_records += summary.imported;
        })
    }

    /// Record a per-file error. The task itself is failed separately.
    pub fn fail_file(&self, id: &str, idx: usize, message: &str) -> Result<Task> {
        self.apply(id, None, |t| {
            if let Some(f) = t.files.get_mut(idx) {
                f.status = FileStatus::Failed;
                f.error_message = Some(message.to_string());
            }
        })
    }

    pub fn mark_loaded(&self, id: &str) -> Result<Task> {
        self.apply(id, Some(TaskStatus::Loaded), |_| {})
    }

    pub fn begin_swap(&self, id: &str) -> Result<Task> {
        self.apply(id, Some(TaskStatus::Swapping), |_| {})
    }

    pub fn complete(&self, id: &str, generation: i64) -> Result<Task> {
        self.apply(id, Some(TaskStatus::Completed), |t| {
            t.generation = Some(generation);
        })
    }

    pub fn fail(&self, id: &str, message: &str) -> Result<Task> {
        self.apply(id, Some(TaskStatus::Failed), |t| {
            t.error_message = Some(message.to_string());
        })
    }

    /// Fail every task a previous process left mid-flight.
    pub fn fail_interrupted(&self) -> Result<usize> {
        let mut n = 0;
        for task in self.registry.list()? {
            if !task.status.is_terminal() {
                warn!(task_id = %task.id, status = %task.status, "failing interrupted task");
                self.fail(&task.id, INTERRUPTED_MESSAGE)?;
                n += 1;
            }
        }
        Ok(n)
    }

    fn apply(&self, id: &str, to: Option<TaskStatus>, f: impl FnOnce(&mut Task)) -> Result<Task> {
        let _w = self.write.lock().unwrap_or_else(|p| p.into_inner());
        let mut task = self.get(id)?;
        if task.status.is_terminal() {
            debug!(task_id = id, status = %task.status, "ignoring callback on terminal task");
            return Ok(task);
        }
        if let Some(to) = to {
            if !task.status.can_advance_to(to) {
                return Err(ImportError::InvalidTransition {
                    from: task.status.to_string(),
                    to: to.to_string(),
                });
            }
            if task.status != to {
                info!(task_id = id, from = %task.status, to = %to, "task transition");
            }
            task.status = to;
        }
        f(&mut task);

        let now = Utc::now();
        task.updated_at = now;
        if task.status.is_terminal() {
            task.completed_at = Some(now);
        }
        task.recompute_progress();
        self.registry.update(&task)?;
        Ok(task)
    }
}
