use super::service;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use gradeimportd::db::{self, MAIN_TABLE, STAGING_TABLE};
use gradeimportd::ImportError;
use serde_json::json;

fn schema_provision(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let svc = service(&state.service)?;
    let conn = db::connect(&db::db_path(svc.workspace()), svc.config().busy_timeout)
        .map_err(ImportError::from)?;
    db::provision_results_tables(&conn).map_err(ImportError::from)?;
    tracing::info!(main = MAIN_TABLE, staging = STAGING_TABLE, "results tables provisioned");
    Ok(json!({ "tables": [MAIN_TABLE, STAGING_TABLE] }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "admin.schema.provision" => Some(respond(&req.id, schema_provision(state))),
        _ => None,
    }
}
