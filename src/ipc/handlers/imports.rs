use super::{get_optional_u64, get_required_str, service, to_json};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn parse_artifact_ids(params: &serde_json::Value) -> Result<Option<Vec<String>>, HandlerErr> {
    let Some(v) = params.get("artifactIds").filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    let Some(arr) = v.as_array() else {
        return Err(HandlerErr::bad_params("artifactIds must be an array"));
    };
    arr.iter()
        .map(|x| {
            x.as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| HandlerErr::bad_params("artifactIds must contain strings"))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn tasks_create(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let svc = service(&state.service)?;
    let batch_size = get_optional_u64(params, "batchSize")?.map(|n| n as usize);
    let artifact_ids = parse_artifact_ids(params)?;
    let task = svc.create_task(batch_size, artifact_ids.as_deref())?;
    to_json(&task)
}

fn tasks_start(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let svc = service(&state.service)?;
    let task_id = get_required_str(params, "taskId")?;
    let task = svc.start_task(&task_id)?;
    Ok(json!({ "taskId": task.id, "queued": true }))
}

fn tasks_status(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let svc = service(&state.service)?;
    let task_id = get_required_str(params, "taskId")?;
    to_json(&svc.task(&task_id)?)
}

fn tasks_list(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let tasks = service(&state.service)?.tasks()?;
    Ok(json!({ "tasks": to_json(&tasks)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "imports.tasks.create" => Some(respond(&req.id, tasks_create(state, &req.params))),
        "imports.tasks.start" => Some(respond(&req.id, tasks_start(state, &req.params))),
        "imports.tasks.status" => Some(respond(&req.id, tasks_status(state, &req.params))),
        "imports.tasks.list" => Some(respond(&req.id, tasks_list(state))),
        _ => None,
    }
}
