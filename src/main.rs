mod ipc;

use clap::Parser;
use gradeimportd::config::{self, ImportConfig, TaskStoreKind};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Grade import sidecar: newline-delimited JSON requests on stdin, responses
/// on stdout.
#[derive(Debug, Parser)]
#[command(name = "gradeimportd", version)]
struct Args {
    /// Scratch directory for uploads (default: <workspace>/temp_imports/grades)
    #[arg(long, env = "GRADEIMPORT_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// Rows per insert transaction
    #[arg(long, env = "GRADEIMPORT_BATCH_SIZE", default_value_t = config::DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Default age threshold for scratch.sweep
    #[arg(long, env = "GRADEIMPORT_RETENTION_HOURS", default_value_t = config::DEFAULT_RETENTION_HOURS)]
    retention_hours: u64,

    #[arg(long, env = "GRADEIMPORT_CHUNK_TIMEOUT_MS", default_value_t = config::DEFAULT_CHUNK_TIMEOUT_MS)]
    chunk_timeout_ms: u64,

    #[arg(long, env = "GRADEIMPORT_BUSY_TIMEOUT_MS", default_value_t = config::DEFAULT_BUSY_TIMEOUT_MS)]
    busy_timeout_ms: u64,

    /// Rows of each new dataset handed to the prediction adapter (0 = off)
    #[arg(long, env = "GRADEIMPORT_PREDICTION_SAMPLE_ROWS", default_value_t = 0)]
    prediction_sample_rows: usize,

    /// Where task records live: sqlite or memory
    #[arg(long, env = "GRADEIMPORT_TASK_STORE", default_value = "sqlite")]
    task_store: String,
}

impl Args {
    fn into_config(self) -> anyhow::Result<ImportConfig> {
        let cfg = ImportConfig {
            scratch_dir: self.scratch_dir,
            batch_size: self.batch_size,
            retention_hours: self.retention_hours,
            chunk_timeout: Duration::from_millis(self.chunk_timeout_ms),
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
            prediction_sample_rows: self.prediction_sample_rows,
            task_store: TaskStoreKind::parse(&self.task_store)?,
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

fn main() -> anyhow::Result<()> {
    // stdout carries responses; logs must stay on stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gradeimportd=info")),
        )
        .with_writer(io::stderr)
        .init();

    let config = Args::parse().into_config()?;
    tracing::info!(?config, "gradeimportd starting");
    let mut state = ipc::AppState::new(config);

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }

    if let Some(service) = state.service.take() {
        service.shutdown();
    }
    state.finish_all_draining();
    Ok(())
}
