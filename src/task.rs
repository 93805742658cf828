use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    StagingCleared,
    Loading,
    Loaded,
    Swapping,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::StagingCleared => "staging_cleared",
            TaskStatus::Loading => "loading",
            TaskStatus::Loaded => "loaded",
            TaskStatus::Swapping => "swapping",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<TaskStatus> {
        Some(match s {
            "pending" => TaskStatus::Pending,
            "staging_cleared" => TaskStatus::StagingCleared,
            "loading" => TaskStatus::Loading,
            "loaded" => TaskStatus::Loaded,
            "swapping" => TaskStatus::Swapping,
            "completed" => TaskStatus::Completed,
            "failed" => TaskStatus::Failed,
            _ => return None,
        })
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::StagingCleared => 1,
            TaskStatus::Loading => 2,
            TaskStatus::Loaded => 3,
            TaskStatus::Swapping => 4,
            TaskStatus::Completed => 5,
            TaskStatus::Failed => 6,
        }
    }

    /// Forward-only: one step along the happy path, `loading -> loading` for
    /// the next file, or `failed` from anywhere non-terminal.
    pub fn can_advance_to(self, to: TaskStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match to {
            TaskStatus::Failed => true,
            TaskStatus::Loading if self == TaskStatus::Loading => true,
            _ => to.rank() == self.rank() + 1,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    Loading,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFile {
    pub artifact_id: String,
    pub file_name: String,
    pub status: FileStatus,
    pub records_count: u64,
    pub imported_count: u64,
    pub error_message: Option<String>,
}

/// One import run. Mutated only through the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub status: TaskStatus,
    pub batch_size: usize,
    pub total_files: u32,
    pub processed_files: u32,
    pub total_records: u64,
    pub imported_records: u64,
    pub progress: u8,
    pub error_message: Option<String>,
    pub generation: Option<i64>,
    pub files: Vec<TaskFile>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn recompute_progress(&mut self) {
        self.progress = if self.total_files == 0 {
            0
        } else {
            let pct = (self.processed_files as f64 / self.total_files as f64) * 100.0;
            pct.round().clamp(0.0, 100.0) as u8
        };
    }
}
