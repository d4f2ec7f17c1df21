use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use uuid::Uuid;

pub const DB_FILE_NAME: &str = "mappings.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let conn = Connection::open(workspace.join(DB_FILE_NAME))?;
    apply_schema(&conn)?;
    Ok(conn)
}

pub fn apply_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS mappings(
            id TEXT PRIMARY KEY,
            component TEXT NOT NULL,
            source TEXT NOT NULL,
            destination TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    // NULL destinations must still collide, so index the coalesced value.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_mappings_key
         ON mappings(component, source, IFNULL(destination, ''))",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_mappings_component ON mappings(component)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS mapping_fields(
            id TEXT PRIMARY KEY,
            mapping_id TEXT NOT NULL,
            source_field TEXT NOT NULL,
            destination_field TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(mapping_id) REFERENCES mappings(id) ON DELETE CASCADE,
            UNIQUE(mapping_id, source_field, destination_field)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_mapping_fields_mapping ON mapping_fields(mapping_id)",
        [],
    )?;

    Ok(())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |row| row.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

#[derive(Clone, Debug, PartialEq)]
pub struct MappingRow {
    pub id: String,
    pub component: String,
    pub source: String,
    pub destination: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MappingFieldRow {
    pub id: String,
    pub mapping_id: String,
    pub source_field: String,
    pub destination_field: String,
    pub content: String,
}

/// Outcome of a create-or-fetch.
#[derive(Clone, Debug, PartialEq)]
pub enum Found<T> {
    Existing(T),
    Created(T),
}

impl<T> Found<T> {
    pub fn created(&self) -> bool {
        matches!(self, Found::Created(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Found::Existing(v) | Found::Created(v) => v,
        }
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn find_or_create_mapping(
    conn: &Connection,
    component: &str,
    source: &str,
    destination: Option<&str>,
) -> rusqlite::Result<Found<MappingRow>> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM mappings
             WHERE component = ? AND source = ? AND destination IS ?",
            (component, source, destination),
            |row| row.get(0),
        )
        .optional()?;

    let make = |id: String| MappingRow {
        id,
        component: component.to_string(),
        source: source.to_string(),
        destination: destination.map(str::to_string),
    };
    if let Some(id) = existing {
        return Ok(Found::Existing(make(id)));
    }

    let id = Uuid::new_v4().to_string();
    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO mappings(id, component, source, destination, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&id, component, source, destination, &now, &now),
    )?;
    Ok(Found::Created(make(id)))
}

/// Fetches or inserts a field. `Ok(None)` means the key exists with different content.
pub fn find_or_create_mapping_field(
    conn: &Connection,
    mapping_id: &str,
    source_field: &str,
    destination_field: &str,
    content: &str,
) -> rusqlite::Result<Option<Found<MappingFieldRow>>> {
    let existing: Option<(String, String)> = conn
        .query_row(
            "SELECT id, content FROM mapping_fields
             WHERE mapping_id = ? AND source_field = ? AND destination_field = ?",
            (mapping_id, source_field, destination_field),
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let make = |id: String| MappingFieldRow {
        id,
        mapping_id: mapping_id.to_string(),
        source_field: source_field.to_string(),
        destination_field: destination_field.to_string(),
        content: content.to_string(),
    };
    match existing {
        Some((id, stored)) if stored == content => Ok(Some(Found::Existing(make(id)))),
        Some(_) => Ok(None),
        None => {
            let id = Uuid::new_v4().to_string();
            let now = now_rfc3339();
            conn.execute(
                "INSERT INTO mapping_fields(id, mapping_id, source_field, destination_field, content, created_at, updated_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?)",
                (&id, mapping_id, source_field, destination_field, content, &now, &now),
            )?;
            Ok(Some(Found::Created(make(id))))
        }
    }
}

/// Deletes every mapping of `component`; fields go with them. Returns mappings removed.
pub fn delete_mappings_for_component(conn: &Connection, component: &str) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM mappings WHERE component = ?", [component])
}

pub fn list_mappings(
    conn: &Connection,
    component: Option<&str>,
) -> rusqlite::Result<Vec<(MappingRow, Vec<MappingFieldRow>)>> {
    let mut stmt = conn.prepare(
        "SELECT id, component, source, destination FROM mappings
         WHERE ?1 IS NULL OR component = ?1
         ORDER BY component, source, IFNULL(destination, '')",
    )?;
    let mappings = stmt
        .query_map([component], |row| {
            Ok(MappingRow {
                id: row.get(0)?,
                component: row.get(1)?,
                source: row.get(2)?,
                destination: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut field_stmt = conn.prepare(
        "SELECT id, mapping_id, source_field, destination_field, content
         FROM mapping_fields WHERE mapping_id = ? ORDER BY rowid",
    )?;
    let mut out = Vec::with_capacity(mappings.len());
    for m in mappings {
        let fields = field_stmt
            .query_map([&m.id], |row| {
                Ok(MappingFieldRow {
                    id: row.get(0)?,
                    mapping_id: row.get(1)?,
                    source_field: row.get(2)?,
                    destination_field: row.get(3)?,
                    content: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        out.push((m, fields));
    }
    Ok(out)
}
