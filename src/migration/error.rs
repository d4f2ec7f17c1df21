use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// A row with the same key already exists with different attributes.
    #[error("mapping field {destination_field:?} ({source_field:?}) of mapping {mapping_id} already exists with different content")]
    Conflict {
        mapping_id: String,
        source_field: String,
        destination_field: String,
    },

    #[error("failed to rename {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl MigrationError {
    /// Stable tag reported to IPC callers as `details.kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            MigrationError::Read { .. } => "read",
            MigrationError::Parse { .. } => "parse",
            MigrationError::Conflict { .. } => "conflict",
            MigrationError::Rename { .. } => "rename",
            MigrationError::Db(_) => "db",
            MigrationError::Config(_) => "config",
        }
    }

    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            MigrationError::Read { path, .. } | MigrationError::Parse { path, .. } => Some(path.as_path()),
            MigrationError::Rename { from, .. } => Some(from.as_path()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, MigrationError>;
