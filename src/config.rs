use std::path::{Path, PathBuf};

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::db;
use crate::migration::registry::{Integration, PluginRegistry, Variant, VariantSource};

pub const SETTINGS_KEY: &str = "migration";
pub const TEMPLATES_ROOT_ENV: &str = "MAPPINGD_TEMPLATES_ROOT";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LegacyTemplateName {
    pub source: String,
    pub legacy_template: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IntegrationConfig {
    pub name: String,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub uploaders: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_mapping_reference: Option<Vec<LegacyTemplateName>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MigrationConfig {
    pub templates_root: PathBuf,
    #[serde(default)]
    pub integrations: Vec<IntegrationConfig>,
    /// `None` when report template properties are not available.
    #[serde(default)]
    pub report_template_properties: Option<Vec<i64>>,
}

impl MigrationConfig {
    pub fn defaults(workspace: &Path) -> Self {
        let templates_root = std::env::var_os(TEMPLATES_ROOT_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| workspace.join("templates").join("plugins"));
        MigrationConfig {
            templates_root,
            integrations: Vec::new(),
            report_template_properties: None,
        }
    }

    /// Stored settings merged over defaults.
    pub fn load(conn: &Connection, workspace: &Path) -> anyhow::Result<Self> {
        let stored = stored_settings(conn)?;
        Ok(Self::defaults(workspace).merged(&stored)?)
    }

    /// Applies a partial object on top of this config; keys absent from `patch` are kept.
    pub fn merged(&self, patch: &Map<String, Value>) -> Result<Self, serde_json::Error> {
        let mut current = match serde_json::to_value(self)? {
            Value::Object(m) => m,
            _ => Map::new(),
        };
        for (k, v) in patch {
            current.insert(k.clone(), v.clone());
        }
        serde_json::from_value(Value::Object(current))
    }

    /// Folds `patch` into the stored keys and returns the effective config.
    ///
    /// Only keys a caller has set are persisted, so defaults derived from the
    /// workspace or `MAPPINGD_TEMPLATES_ROOT` are recomputed on every load.
    pub fn update(
        conn: &Connection,
        workspace: &Path,
        patch: &Map<String, Value>,
    ) -> Result<Self, ConfigUpdateError> {
        let mut stored = stored_settings(conn).map_err(ConfigUpdateError::Store)?;
        for (k, v) in patch {
            stored.insert(k.clone(), v.clone());
        }
        let effective = Self::defaults(workspace)
            .merged(&stored)
            .map_err(ConfigUpdateError::Invalid)?;
        db::settings_set_json(conn, SETTINGS_KEY, &Value::Object(stored))
            .map_err(ConfigUpdateError::Store)?;
        Ok(effective)
    }
}

#[derive(Debug, Error)]
pub enum ConfigUpdateError {
    #[error("{0}")]
    Invalid(serde_json::Error),
    #[error("{0}")]
    Store(anyhow::Error),
}

fn stored_settings(conn: &Connection) -> anyhow::Result<Map<String, Value>> {
    match db::settings_get_json(conn, SETTINGS_KEY)? {
        Some(Value::Object(saved)) => Ok(saved),
        Some(_) => anyhow::bail!("stored {SETTINGS_KEY} settings must be a JSON object"),
        None => Ok(Map::new()),
    }
}

impl PluginRegistry for MigrationConfig {
    fn with_feature(&self, feature: &str) -> Vec<Integration> {
        self.integrations
            .iter()
            .filter(|i| i.features.iter().any(|f| f == feature))
            .map(|i| Integration {
                name: i.name.clone(),
                uploader_count: i.uploaders.len(),
                legacy_names: i.legacy_mapping_reference.as_ref().map(|refs| {
                    refs.iter()
                        .map(|r| (r.source.clone(), r.legacy_template.clone()))
                        .collect()
                }),
            })
            .collect()
    }
}

impl VariantSource for MigrationConfig {
    fn variants(&self) -> Vec<Variant> {
        match &self.report_template_properties {
            Some(ids) => ids.iter().map(|id| Variant(Some(*id))).collect(),
            None => vec![Variant(None)],
        }
    }
}
