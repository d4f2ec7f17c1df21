use crate::config::MigrationConfig;
use crate::db;
use crate::ipc::error::{err, migration_err, no_workspace, ok};
use crate::ipc::types::{AppState, Request};
use crate::migration::templates::LegacySuffixMarker;
use crate::migration::Migrator;
use serde_json::{json, Value};
use tracing::error;

fn load_config(state: &AppState, req: &Request) -> Result<MigrationConfig, Value> {
    let Some((workspace, conn)) = state.session() else {
        return Err(no_workspace(&req.id));
    };
    MigrationConfig::load(conn, workspace)
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))
}

fn handle_migrate(state: &mut AppState, req: &Request) -> Value {
    let cfg = match load_config(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let mut marker = LegacySuffixMarker;
    let mut migrator = Migrator::new(conn, &cfg.templates_root, &cfg, &cfg, &mut marker);
    match migrator.run_forward() {
        Ok(report) => ok(&req.id, json!(report)),
        Err(e) => {
            error!(error = %e, "forward migration aborted");
            migration_err(&req.id, &e)
        }
    }
}

fn handle_reverse(state: &mut AppState, req: &Request) -> Value {
    let cfg = match load_config(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let mut marker = LegacySuffixMarker;
    let mut migrator = Migrator::new(conn, &cfg.templates_root, &cfg, &cfg, &mut marker);
    match migrator.run_reverse() {
        Ok(report) => ok(&req.id, json!(report)),
        Err(e) => {
            error!(error = %e, "reverse migration aborted");
            migration_err(&req.id, &e)
        }
    }
}

fn handle_preview(state: &mut AppState, req: &Request) -> Value {
    let cfg = match load_config(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let mut marker = LegacySuffixMarker;
    let migrator = Migrator::new(conn, &cfg.templates_root, &cfg, &cfg, &mut marker);
    match migrator.preview() {
        Ok(integrations) => ok(
            &req.id,
            json!({
                "templatesRoot": cfg.templates_root.to_string_lossy(),
                "integrations": integrations
            }),
        ),
        Err(e) => migration_err(&req.id, &e),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let component = match req.params.get("component") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.as_str()),
        Some(_) => return err(&req.id, "bad_params", "component must be a string", None),
    };

    let rows = match db::list_mappings(conn, component) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let mappings: Vec<Value> = rows
        .into_iter()
        .map(|(m, fields)| {
            json!({
                "id": m.id,
                "component": m.component,
                "source": m.source,
                "destination": m.destination,
                "fields": fields
                    .into_iter()
                    .map(|f| json!({
                        "id": f.id,
                        "mappingId": f.mapping_id,
                        "sourceField": f.source_field,
                        "destinationField": f.destination_field,
                        "content": f.content
                    }))
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    ok(&req.id, json!({ "mappings": mappings }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "mappings.migrate" => Some(handle_migrate(state, req)),
        "mappings.reverse" => Some(handle_reverse(state, req)),
        "mappings.preview" => Some(handle_preview(state, req)),
        "mappings.list" => Some(handle_list(state, req)),
        _ => None,
    }
}
