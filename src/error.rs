//! Error taxonomy for the import/replace pipeline.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("required table {table} does not exist; provision the schema before importing")]
    SchemaMissing { table: String },

    #[error("failed to clear staging table: {0}")]
    StagingClearFailed(String),

    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("unsupported file type: {0} (expected .xlsx, .xls or .csv)")]
    UnsupportedFileType(String),

    #[error("unreadable spreadsheet {path}: {cause}")]
    UnreadableFile { path: String, cause: String },

    #[error("batch insert failed at chunk {chunk_index}: {cause}")]
    BatchInsertFailed { chunk_index: usize, cause: String },

    #[error("swap failed: {0}")]
    SwapFailed(String),

    #[error("another swap is already in progress")]
    SwapAlreadyInProgress,

    #[error("failed to sweep {entry}: {cause}")]
    SweepEntryFailed { entry: String, cause: String },

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("invalid task transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no uploaded files to import")]
    NoFiles,

    #[error("import worker is not running")]
    WorkerStopped,

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ImportError {
    /// Stable snake_case code used in IPC error responses.
    pub fn code(&self) -> &'static str {
        match self {
            ImportError::SchemaMissing { .. } => "schema_missing",
            ImportError::StagingClearFailed(_) => "staging_clear_failed",
            ImportError::ArtifactNotFound(_) => "artifact_not_found",
            ImportError::UnsupportedFileType(_) => "unsupported_file_type",
            ImportError::UnreadableFile { .. } => "unreadable_file",
            ImportError::BatchInsertFailed { .. } => "batch_insert_failed",
            ImportError::SwapFailed(_) => "swap_failed",
            ImportError::SwapAlreadyInProgress => "swap_already_in_progress",
            ImportError::SweepEntryFailed { .. } => "sweep_entry_failed",
            ImportError::TaskNotFound(_) => "task_not_found",
            ImportError::InvalidTransition { .. } => "invalid_transition",
            ImportError::InvalidConfig(_) => "invalid_config",
            ImportError::NoFiles => "no_files",
            ImportError::WorkerStopped => "worker_stopped",
            ImportError::Db(_) => "db_error",
            ImportError::Io(_) => "io_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, ImportError>;
