use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
}

impl AppState {
    /// Open workspace folder and its database, or `None` before `workspace.select`.
    pub fn session(&self) -> Option<(&PathBuf, &Connection)> {
        Some((self.workspace.as_ref()?, self.db.as_ref()?))
    }
}
