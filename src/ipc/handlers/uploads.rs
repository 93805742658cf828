use super::{get_required_str, service, to_json};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use gradeimportd::ImportError;
use serde_json::json;
use std::path::Path;

fn uploads_store(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let svc = service(&state.service)?;
    let in_path = get_required_str(params, "inPath")?;
    let file_name = match params.get("fileName").and_then(|v| v.as_str()) {
        Some(n) => n.to_string(),
        None => Path::new(&in_path)
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string(),
    };
    let bytes = std::fs::read(&in_path).map_err(|e| HandlerErr {
        code: "io_error",
        message: format!("read {}: {}", in_path, e),
        details: None,
    })?;
    let meta = svc.store_upload(&bytes, &file_name)?;
    to_json(&meta)
}

fn uploads_list(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let uploads = service(&state.service)?.list_uploads()?;
    Ok(json!({ "uploads": to_json(&uploads)? }))
}

fn uploads_delete(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let svc = service(&state.service)?;
    let id = get_required_str(params, "artifactId")?;
    match svc.delete_upload(&id) {
        Ok(()) => Ok(json!({ "deleted": true })),
        Err(ImportError::ArtifactNotFound(_)) => Ok(json!({ "deleted": false })),
        Err(e) => Err(e.into()),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "uploads.store" => Some(respond(&req.id, uploads_store(state, &req.params))),
        "uploads.list" => Some(respond(&req.id, uploads_list(state))),
        "uploads.delete" => Some(respond(&req.id, uploads_delete(state, &req.params))),
        _ => None,
    }
}
