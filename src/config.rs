use crate::error::{ImportError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BATCH_SIZE: usize = 2000;
pub const MAX_BATCH_SIZE: usize = 50_000;
pub const DEFAULT_RETENTION_HOURS: u64 = 24;
pub const DEFAULT_CHUNK_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStoreKind {
    Memory,
    Sqlite,
}

impl TaskStoreKind {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(TaskStoreKind::Memory),
            "sqlite" => Ok(TaskStoreKind::Sqlite),
            other => Err(ImportError::InvalidConfig(format!(
                "task store must be one of: memory, sqlite (got {other})"
            ))),
        }
    }
}

/// Deployment knobs consumed by the pipeline. How they are sourced (flags,
/// environment) is the binary's business.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Defaults to `<workspace>/temp_imports/grades` when unset.
    pub scratch_dir: Option<PathBuf>,
    pub batch_size: usize,
    pub retention_hours: u64,
    pub chunk_timeout: Duration,
    pub busy_timeout: Duration,
    /// Rows of the new dataset handed to the prediction adapter; 0 disables it.
    pub prediction_sample_rows: usize,
    pub task_store: TaskStoreKind,
}

impl Default for ImportConfig {
    fn default() -> Self {
        ImportConfig {
            scratch_dir: None,
            batch_size: DEFAULT_BATCH_SIZE,
            retention_hours: DEFAULT_RETENTION_HOURS,
            chunk_timeout: Duration::from_millis(DEFAULT_CHUNK_TIMEOUT_MS),
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            prediction_sample_rows: 0,
            task_store: TaskStoreKind::Sqlite,
        }
    }
}

impl ImportConfig {
    pub fn validate(&self) -> Result<()> {
        validate_batch_size(self.batch_size)?;
        if self.chunk_timeout.is_zero() {
            return Err(ImportError::InvalidConfig(
                "chunk timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn scratch_dir_for(&self, workspace: &Path) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(|| workspace.join("temp_imports").join("grades"))
    }
}

pub fn validate_batch_size(n: usize) -> Result<usize> {
    if n == 0 || n > MAX_BATCH_SIZE {
        return Err(ImportError::InvalidConfig(format!(
            "batch size must be between 1 and {MAX_BATCH_SIZE} (got {n})"
        )));
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = ImportConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.batch_size, 2000);
        assert_eq!(cfg.retention_hours, 24);
    }

    #[test]
    fn batch_size_bounds() {
        assert!(validate_batch_size(0).is_err());
        assert!(validate_batch_size(1).is_ok());
        assert!(validate_batch_size(MAX_BATCH_SIZE).is_ok());
        assert!(validate_batch_size(MAX_BATCH_SIZE + 1).is_err());
    }

    #[test]
    fn scratch_dir_defaults_under_workspace() {
        let cfg = ImportConfig::default();
        let p = cfg.scratch_dir_for(Path::new("/srv/ws"));
        assert_eq!(p, PathBuf::from("/srv/ws/temp_imports/grades"));
    }

    #[test]
    fn task_store_kind_parses() {
        assert_eq!(TaskStoreKind::parse("Memory").unwrap(), TaskStoreKind::Memory);
        assert_eq!(TaskStoreKind::parse("sqlite").unwrap(), TaskStoreKind::Sqlite);
        assert!(TaskStoreKind::parse("redis").is_err());
    }
}
