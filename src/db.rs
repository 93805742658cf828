use crate::record::COLUMNS;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DB_FILE: &str = "gradeimport.sqlite3";
pub const MAIN_TABLE: &str = "academic_results";
pub const STAGING_TABLE: &str = "academic_results_staging";
pub const SWAP_TEMP_TABLE: &str = "academic_results_swap_tmp";

pub fn db_path(workspace: &Path) -> PathBuf {
    workspace.join(DB_FILE)
}

/// Open a connection with the pragmas every thread in the process relies on.
/// WAL keeps readers on a consistent snapshot while a swap commits.
pub fn connect(db_path: &Path, busy_timeout: Duration) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(busy_timeout)?;
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    Ok(conn)
}

/// Open the workspace database and create the tables this process owns. The
/// results tables are not created here; see [`provision_results_tables`].
pub fn open_db(workspace: &Path, busy_timeout: Duration) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let conn = connect(&db_path(workspace), busy_timeout)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS import_tasks(
            id TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            batch_size INTEGER NOT NULL,
            total_files INTEGER NOT NULL,
            processed_files INTEGER NOT NULL DEFAULT 0,
            total_records INTEGER NOT NULL DEFAULT 0,
            imported_records INTEGER NOT NULL DEFAULT 0,
            error_message TEXT,
            generation INTEGER,
            files_json TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            completed_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_import_tasks_status ON import_tasks(status)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS dataset_swaps(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id TEXT,
            main_rows INTEGER NOT NULL,
            swapped_at TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

/// Out-of-band provisioning of the main and staging tables. The import
/// pipeline never calls this; operators do, once per deployment.
pub fn provision_results_tables(conn: &Connection) -> rusqlite::Result<()> {
    for table in [MAIN_TABLE, STAGING_TABLE] {
        conn.execute(&results_table_ddl(table), [])?;
    }
    Ok(())
}

fn results_table_ddl(table: &str) -> String {
    let cols = COLUMNS
        .iter()
        .map(|c| {
            let ty = if *c == "year" { "INTEGER" } else { "TEXT" };
            format!("\"{}\" {}", c, ty)
        })
        .collect::<Vec<_>>()
        .join(",\n            ");
    format!(
        "CREATE TABLE IF NOT EXISTS {}(
            id INTEGER PRIMARY KEY,
            {}
        )",
        table, cols
    )
}

pub fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        [table],
        |r| r.get(0),
    )?;
    Ok(n > 0)
}

pub fn table_has_column(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name.eq_ignore_ascii_case(column) {
            return Ok(true);
        }
    }
    Ok(false)
}
