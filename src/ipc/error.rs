use serde_json::json;

use crate::migration::error::MigrationError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

pub fn no_workspace(id: &str) -> serde_json::Value {
    err(id, "no_workspace", "select a workspace first", None)
}

/// `migration_failed` with the error kind and, when a file is involved, its path.
pub fn migration_err(id: &str, e: &MigrationError) -> serde_json::Value {
    let mut details = json!({ "kind": e.kind() });
    if let Some(p) = e.path() {
        details["path"] = json!(p.to_string_lossy());
    }
    err(id, "migration_failed", e.to_string(), Some(details))
}
