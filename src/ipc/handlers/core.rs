use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use gradeimportd::prediction::NoopPredictionAdapter;
use gradeimportd::service::ImportService;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state
                .service
                .as_ref()
                .map(|s| s.workspace().to_string_lossy().to_string())
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    let key = workspace_key(&path);
    if let Some(current) = state.service.as_ref() {
        if workspace_key(current.workspace()) == key {
            let scratch = current.artifacts().root().to_string_lossy().to_string();
            return ok(
                &req.id,
                json!({ "workspacePath": path.to_string_lossy(), "scratchDir": scratch }),
            );
        }
    }

    // The previous workspace finishes its queued imports on a side thread so
    // status polls keep being answered meanwhile.
    if let Some(previous) = state.service.take() {
        let previous_key = workspace_key(previous.workspace());
        match thread::Builder::new()
            .name("workspace-drain".into())
            .spawn(move || previous.shutdown())
        {
            Ok(handle) => state.draining.push((previous_key, handle)),
            Err(e) => tracing::warn!(error = %e, "could not drain previous workspace in background"),
        }
    }
    state.finish_draining(&key);

    match ImportService::open(&path, state.config.clone(), Arc::new(NoopPredictionAdapter)) {
        Ok(service) => {
            let scratch = service.artifacts().root().to_string_lossy().to_string();
            state.service = Some(service);
            ok(
                &req.id,
                json!({ "workspacePath": path.to_string_lossy(), "scratchDir": scratch }),
            )
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:#}"), None),
    }
}

fn workspace_key(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
