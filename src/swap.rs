//! Atomic exchange of the staging and main tables.
//!
//! The SQLite coordinator renames the two tables inside a single
//! `BEGIN IMMEDIATE` transaction. Readers on other connections see either the
//! pre-swap or the post-swap table under the main name, never a mix, and a
//! failure anywhere before commit rolls every rename back.

use crate::db::{MAIN_TABLE, STAGING_TABLE, SWAP_TEMP_TABLE};
use crate::error::{ImportError, Result};
use crate::staging::count_rows;
use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapOutcome {
    /// Row id in `dataset_swaps`; increases by one per committed swap.
    pub generation: i64,
    pub main_rows: u64,
}

pub trait SwapCoordinator: Send + Sync {
    /// Make staging's contents the main contents in one indivisible step.
    /// A second call while one is running fails with `SwapAlreadyInProgress`.
    fn swap(&self, conn: &mut Connection, task_id: Option<&str>) -> Result<SwapOutcome>;

    fn in_flight(&self) -> bool;
}

#[derive(Debug, Default)]
pub struct SqliteSwapCoordinator {
    in_flight: AtomicBool,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SqliteSwapCoordinator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SwapCoordinator for SqliteSwapCoordinator {
    fn swap(&self, conn: &mut Connection, task_id: Option<&str>) -> Result<SwapOutcome> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(task_id, "swap rejected, another swap is in flight");
            return Err(ImportError::SwapAlreadyInProgress);
        }
        let _guard = InFlight(&self.in_flight);

        // Views and triggers written against the main name must keep
        // resolving by name after the exchange instead of following the
        // renamed table.
        conn.pragma_update(None, "legacy_alter_table", true)?;
        let exchanged = exchange(conn, task_id);
        if let Err(e) = conn.pragma_update(None, "legacy_alter_table", false) {
            warn!(error = %e, "could not restore legacy_alter_table");
        }
        let outcome = exchanged.map_err(ImportError::SwapFailed)?;
        info!(
            task_id,
            generation = outcome.generation,
            main_rows = outcome.main_rows,
            "tables swapped"
        );
        Ok(outcome)
    }

    fn in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

fn exchange(conn: &mut Connection, task_id: Option<&str>) -> std::result::Result<SwapOutcome, String> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| format!("begin: {e}"))?;

    let staged = count_rows(&tx, STAGING_TABLE).map_err(|e| format!("count staging: {e}"))?;
    tx.execute_batch(&format!(
        "ALTER TABLE {main} RENAME TO {tmp};
         ALTER TABLE {staging} RENAME TO {main};
         ALTER TABLE {tmp} RENAME TO {staging};",
        main = MAIN_TABLE,
        staging = STAGING_TABLE,
        tmp = SWAP_TEMP_TABLE,
    ))
    .map_err(|e| format!("rename: {e}"))?;

    let main_rows = count_rows(&tx, MAIN_TABLE).map_err(|e| format!("count main: {e}"))?;
    if main_rows != staged {
        return Err(format!(
            "verification failed: staged {staged} rows but main holds {main_rows}"
        ));
    }

    tx.execute(
        "INSERT INTO dataset_swaps(task_id, main_rows, swapped_at) VALUES(?, ?, ?)",
        (task_id, main_rows as i64, Utc::now().to_rfc3339()),
    )
    .map_err(|e| format!("record swap: {e}"))?;
    let generation = tx.last_insert_rowid();
    tx.commit().map_err(|e| format!("commit: {e}"))?;

    Ok(SwapOutcome {
        generation,
        main_rows,
    })
}

/// Generation of the dataset currently under the main name, if any swap has
/// committed.
pub fn current_generation(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    conn.query_row("SELECT MAX(id) FROM dataset_swaps", [], |r| r.get(0))
}
