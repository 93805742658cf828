//! Staging table management: schema presence checks and truncation.

use crate::db::{self, MAIN_TABLE, STAGING_TABLE};
use crate::error::{ImportError, Result};
use crate::record::COLUMNS;
use rusqlite::Connection;
use tracing::{debug, info, warn};

/// Rows removed per statement on the fallback delete path.
const FALLBACK_DELETE_BATCH: i64 = 5000;

/// Fails with `SchemaMissing` when either results table (or one of its
/// columns) is absent. Never creates anything.
pub fn ensure_schema_present(conn: &Connection) -> Result<()> {
    for table in [MAIN_TABLE, STAGING_TABLE] {
        if !db::table_exists(conn, table)? {
            return Err(ImportError::SchemaMissing {
                table: table.to_string(),
            });
        }
        for col in COLUMNS {
            if !db::table_has_column(conn, table, col)? {
                return Err(ImportError::SchemaMissing {
                    table: format!("{table} (column {col})"),
                });
            }
        }
    }
    Ok(())
}

/// Remove every staging row. On success the table is verified empty.
pub fn truncate_staging(conn: &Connection) -> Result<()> {
    let sql = format!("DELETE FROM {}", STAGING_TABLE);
    if let Err(e) = conn.execute(&sql, []) {
        warn!(error = %e, "bulk staging delete failed, falling back to batched delete");
        delete_in_batches(conn).map_err(|e| ImportError::StagingClearFailed(e.to_string()))?;
    }

    let left = count_rows(conn, STAGING_TABLE)
        .map_err(|e| ImportError::StagingClearFailed(e.to_string()))?;
    if left != 0 {
        return Err(ImportError::StagingClearFailed(format!(
            "{left} rows remain in {STAGING_TABLE} after truncation"
        )));
    }
    info!(table = STAGING_TABLE, "staging cleared");
    Ok(())
}

/// Works on any rowid table, whatever its declared key.
fn delete_in_batches(conn: &Connection) -> rusqlite::Result<()> {
    let sql = format!(
        "DELETE FROM {t} WHERE rowid IN (SELECT rowid FROM {t} LIMIT ?)",
        t = STAGING_TABLE
    );
    loop {
        let removed = conn.execute(&sql, [FALLBACK_DELETE_BATCH])?;
        debug!(removed, "fallback delete batch");
        if removed == 0 {
            return Ok(());
        }
    }
}

pub fn count_rows(conn: &Connection, table: &str) -> rusqlite::Result<u64> {
    let sql = format!("SELECT COUNT(*) FROM {}", table);
    let n: i64 = conn.query_row(&sql, [], |r| r.get(0))?;
    Ok(n as u64)
}
