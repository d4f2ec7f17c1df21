use crate::config::{ConfigUpdateError, MigrationConfig};
use crate::ipc::error::{err, no_workspace, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};

fn handle_config_get(state: &mut AppState, req: &Request) -> Value {
    let Some((workspace, conn)) = state.session() else {
        return no_workspace(&req.id);
    };
    let cfg = match MigrationConfig::load(conn, workspace) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    match serde_json::to_value(&cfg) {
        Ok(v) => ok(&req.id, v),
        Err(e) => err(&req.id, "internal", e.to_string(), None),
    }
}

fn handle_config_update(state: &mut AppState, req: &Request) -> Value {
    let Some((workspace, conn)) = state.session() else {
        return no_workspace(&req.id);
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    match MigrationConfig::update(conn, workspace, patch) {
        Ok(_) => {}
        Err(ConfigUpdateError::Invalid(e)) => {
            return err(&req.id, "bad_params", e.to_string(), None)
        }
        Err(ConfigUpdateError::Store(e)) => {
            return err(&req.id, "db_update_failed", e.to_string(), None)
        }
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "config.get" => Some(handle_config_get(state, req)),
        "config.update" => Some(handle_config_update(state, req)),
        _ => None,
    }
}
