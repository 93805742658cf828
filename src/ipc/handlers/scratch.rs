use super::{get_optional_u64, service, to_json};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::types::{AppState, Request};

fn scratch_sweep(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let svc = service(&state.service)?;
    let max_hours = get_optional_u64(params, "maxHours")?;
    to_json(&svc.sweep(max_hours))
}

fn scratch_stats(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    to_json(&service(&state.service)?.stats()?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "scratch.sweep" => Some(respond(&req.id, scratch_sweep(state, &req.params))),
        "scratch.stats" => Some(respond(&req.id, scratch_stats(state))),
        _ => None,
    }
}
