//! Task storage backends. The tracker only sees [`TaskRegistry`].

use crate::error::{ImportError, Result};
use crate::task::{Task, TaskStatus};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

pub trait TaskRegistry: Send + Sync {
    fn create(&self, task: &Task) -> Result<()>;
    fn get(&self, id: &str) -> Result<Option<Task>>;
    fn update(&self, task: &Task) -> Result<()>;
    /// Newest first.
    fn list(&self) -> Result<Vec<Task>>;
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Process-local registry; tasks vanish on restart.
#[derive(Default)]
pub struct InMemoryTaskRegistry {
    tasks: Mutex<HashMap<String, Task>>,
}

impl InMemoryTaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskRegistry for InMemoryTaskRegistry {
    fn create(&self, task: &Task) -> Result<()> {
        lock(&self.tasks).insert(task.id.clone(), task.clone());
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Task>> {
        Ok(lock(&self.tasks).get(id).cloned())
    }

    fn update(&self, task: &Task) -> Result<()> {
        let mut tasks = lock(&self.tasks);
        match tasks.get_mut(&task.id) {
            Some(slot) => {
                *slot = task.clone();
                Ok(())
            }
            None => Err(ImportError::TaskNotFound(task.id.clone())),
        }
    }

    fn list(&self) -> Result<Vec<Task>> {
        let mut out = lock(&self.tasks).values().cloned().collect::<Vec<_>>();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }
}

/// Durable registry backed by the `import_tasks` table.
pub struct SqliteTaskRegistry {
    conn: Mutex<Connection>,
}

impl SqliteTaskRegistry {
    /// `conn` must point at a database bootstrapped by [`crate::db::open_db`].
    pub fn new(conn: Connection) -> Self {
        SqliteTaskRegistry {
            conn: Mutex::new(conn),
        }
    }
}

const TASK_COLUMNS: &str = "id, status, batch_size, total_files, processed_files, total_records,
     imported_records, error_message, generation, files_json, created_at, updated_at, completed_at";

fn row_to_task(r: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let status_text: String = r.get(1)?;
    let files_json: String = r.get(9)?;
    let status = TaskStatus::parse(&status_text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("unknown task status {status_text}").into(),
        )
    })?;
    let files = serde_json::from_str(&files_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let mut task = Task {
        id: r.get(0)?,
        status,
        batch_size: r.get::<_, i64>(2)? as usize,
        total_files: r.get::<_, i64>(3)? as u32,
        processed_files: r.get::<_, i64>(4)? as u32,
        total_records: r.get::<_, i64>(5)? as u64,
        imported_records: r.get::<_, i64>(6)? as u64,
        progress: 0,
        error_message: r.get(7)?,
        generation: r.get(8)?,
        files,
        created_at: parse_ts(r, 10)?,
        updated_at: parse_ts(r, 11)?,
        completed_at: match r.get::<_, Option<String>>(12)? {
            Some(_) => Some(parse_ts(r, 12)?),
            None => None,
        },
    };
    task.recompute_progress();
    Ok(task)
}

fn parse_ts(r: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = r.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn files_json(task: &Task) -> Result<String> {
    serde_json::to_string(&task.files)
        .map_err(|e| ImportError::InvalidConfig(format!("unserializable task files: {e}")))
}

impl TaskRegistry for SqliteTaskRegistry {
    fn create(&self, task: &Task) -> Result<()> {
        let files = files_json(task)?;
        lock(&self.conn).execute(
            &format!(
                "INSERT INTO import_tasks({TASK_COLUMNS})
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            rusqlite::params![
                task.id,
                task.status.as_str(),
                task.batch_size as i64,
                task.total_files as i64,
                task.processed_files as i64,
                task.total_records as i64,
                task.imported_records as i64,
                task.error_message,
                task.generation,
                files,
                task.created_at.to_rfc3339(),
                task.updated_at.to_rfc3339(),
                task.completed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Task>> {
        let conn = lock(&self.conn);
        let task = conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM import_tasks WHERE id = ?"),
                [id],
                row_to_task,
            )
            .optional()?;
        Ok(task)
    }

    fn update(&self, task: &Task) -> Result<()> {
        let files = files_json(task)?;
        let changed = lock(&self.conn).execute(
            "UPDATE import_tasks SET
               status = ?, processed_files = ?, total_records = ?, imported_records = ?,
               error_message = ?, generation = ?, files_json = ?, updated_at = ?, completed_at = ?
             WHERE id = ?",
            rusqlite::params![
                task.status.as_str(),
                task.processed_files as i64,
                task.total_records as i64,
                task.imported_records as i64,
                task.error_message,
                task.generation,
                files,
                task.updated_at.to_rfc3339(),
                task.completed_at.map(|t| t.to_rfc3339()),
                task.id,
            ],
        )?;
        if changed == 0 {
            return Err(ImportError::TaskNotFound(task.id.clone()));
        }
        Ok(())
    }

    fn list(&self) -> Result<Vec<Task>> {
        let conn = lock(&self.conn);
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM import_tasks ORDER BY created_at DESC, rowid DESC"
        ))?;
        let tasks = stmt
            .query_map([], row_to_task)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tasks)
    }
}
