//! Single background thread that runs queued imports in FIFO order, so only
//! one pipeline owns the staging table at a time.

use crate::error::{ImportError, Result};
use crate::pipeline::ImportPipeline;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

pub struct ImportWorker {
    tx: Option<Sender<String>>,
    handle: Option<JoinHandle<()>>,
}

impl ImportWorker {
    pub fn spawn(pipeline: Arc<ImportPipeline>) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<String>();
        let handle = thread::Builder::new()
            .name("import-worker".into())
            .spawn(move || {
                for task_id in rx {
                    debug!(task_id = %task_id, "dequeued");
                    if let Err(e) = pipeline.run(&task_id) {
                        error!(task_id = %task_id, error = %e, "import run aborted");
                    }
                }
                info!("import worker stopped");
            })?;
        Ok(ImportWorker {
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    pub fn enqueue(&self, task_id: &str) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(ImportError::WorkerStopped)?;
        tx.send(task_id.to_string())
            .map_err(|_| ImportError::WorkerStopped)?;
        info!(task_id, "import queued");
        Ok(())
    }

    /// Stop accepting work, let queued imports finish, and join the thread.
    pub fn shutdown(&mut self) {
        self.tx.take();
        if let Some(h) = self.handle.take() {
            if h.join().is_err() {
                error!("import worker panicked");
            }
        }
    }
}

impl Drop for ImportWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
