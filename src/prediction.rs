//! Hand-off to the external scoring service. Only the interface lives here;
//! the import never waits on or fails because of a prediction run.

use crate::record::Record;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{info, warn};

pub trait PredictionAdapter: Send + Sync {
    fn predict(&self, rows: Vec<Record>) -> anyhow::Result<()>;
}

pub struct NoopPredictionAdapter;

impl PredictionAdapter for NoopPredictionAdapter {
    fn predict(&self, _rows: Vec<Record>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Runs an adapter on its own thread and only logs the outcome.
#[derive(Clone)]
pub struct DetachedPrediction {
    inner: Arc<dyn PredictionAdapter>,
}

impl DetachedPrediction {
    pub fn new(inner: Arc<dyn PredictionAdapter>) -> Self {
        DetachedPrediction { inner }
    }

    pub fn dispatch(&self, task_id: &str, rows: Vec<Record>) -> Option<JoinHandle<()>> {
        if rows.is_empty() {
            return None;
        }
        let inner = Arc::clone(&self.inner);
        let task_id = task_id.to_string();
        let spawned = thread::Builder::new()
            .name(format!("prediction-{}", task_id.chars().take(8).collect::<String>()))
            .spawn(move || {
                let n = rows.len();
                match inner.predict(rows) {
                    Ok(()) => info!(task_id = %task_id, rows = n, "prediction dispatched"),
                    Err(e) => warn!(task_id = %task_id, error = %e, "prediction failed"),
                }
            });
        match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "could not start prediction thread");
                None
            }
        }
    }
}
