//! Chunked loading of spreadsheet rows into the staging table.

use crate::config::validate_batch_size;
use crate::db::STAGING_TABLE;
use crate::error::{ImportError, Result};
use crate::record::{column_list, Record, COLUMNS};
use crate::sheet;
use rusqlite::{Connection, ToSql};
use serde::Serialize;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadSummary {
    pub imported: u64,
    pub total: u64,
}

pub struct BatchLoader {
    batch_size: usize,
    chunk_timeout: Duration,
}

impl BatchLoader {
    pub fn new(batch_size: usize, chunk_timeout: Duration) -> Result<Self> {
        Ok(BatchLoader {
            batch_size: validate_batch_size(batch_size)?,
            chunk_timeout,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Parse `path` and append its rows to staging. The caller owns truncation;
    /// loading twice without truncating in between duplicates rows.
    pub fn load_file(&self, conn: &mut Connection, path: &Path) -> Result<LoadSummary> {
        let records = sheet::read_records(path)?;
        info!(path = %path.display(), rows = records.len(), "spreadsheet parsed");
        self.load_records(conn, &records)
    }

    /// Insert in sequential chunks, one transaction per chunk. The first failed
    /// chunk aborts the load; earlier chunks stay committed.
    pub fn load_records(&self, conn: &mut Connection, records: &[Record]) -> Result<LoadSummary> {
        let sql = insert_sql(STAGING_TABLE);
        let mut imported = 0u64;
        for (chunk_index, chunk) in records.chunks(self.batch_size).enumerate() {
            self.insert_chunk(conn, &sql, chunk)
                .map_err(|cause| ImportError::BatchInsertFailed { chunk_index, cause })?;
            imported += chunk.len() as u64;
            debug!(chunk = chunk_index, rows = chunk.len(), imported, "chunk committed");
        }
        Ok(LoadSummary {
            imported,
            total: records.len() as u64,
        })
    }

    fn insert_chunk(
        &self,
        conn: &mut Connection,
        sql: &str,
        chunk: &[Record],
    ) -> std::result::Result<(), String> {
        let started = Instant::now();
        let tx = conn.transaction().map_err(|e| e.to_string())?;
        {
            let mut stmt = tx.prepare_cached(sql).map_err(|e| e.to_string())?;
            for r in chunk {
                let text = r.text_values();
                let mut values: Vec<&dyn ToSql> = text.iter().map(|v| v as &dyn ToSql).collect();
                values.push(&r.year);
                stmt.execute(values.as_slice()).map_err(|e| e.to_string())?;
            }
        }
        // Dropping the transaction rolls the chunk back.
        if started.elapsed() > self.chunk_timeout {
            return Err(format!(
                "chunk exceeded timeout of {} ms",
                self.chunk_timeout.as_millis()
            ));
        }
        tx.commit().map_err(|e| e.to_string())
    }
}

fn insert_sql(table: &str) -> String {
    let placeholders = (1..=COLUMNS.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {}({}) VALUES({})",
        table,
        column_list(),
        placeholders
    )
}

/// Read every row of `table` in insertion order.
pub fn read_table(conn: &Connection, table: &str) -> rusqlite::Result<Vec<Record>> {
    let sql = format!("SELECT {} FROM {} ORDER BY id", column_list(), table);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], Record::from_sql_row)?;
    rows.collect()
}

/// First `limit` rows of `table`, for handing a sample downstream.
pub fn read_table_head(conn: &Connection, table: &str, limit: usize) -> rusqlite::Result<Vec<Record>> {
    let sql = format!("SELECT {} FROM {} ORDER BY id LIMIT ?", column_list(), table);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([limit as i64], Record::from_sql_row)?;
    rows.collect()
}
