//! Moves legacy `%name%` template files into `mappings`/`mapping_fields` rows and back.
//!
//! Forward migration walks every upload integration's template directory, creates one
//! mapping per (file, variant) with a field per template section, and marks each file
//! once all of its variant passes have committed. Reverse migration wipes the
//! component's mappings and clears every mark it can find.

pub mod error;
pub mod registry;
pub mod templates;

use std::path::{Path, PathBuf};

use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db;
use crate::fields;
use crate::placeholder;
use error::{MigrationError, Result};
use registry::{Integration, PluginRegistry, Variant, VariantSource};
use templates::CompletionMarker;

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigratedFile {
    pub path: String,
    pub source: String,
    pub destinations: Vec<Option<String>>,
    pub mappings_created: usize,
    pub fields_created: usize,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationForward {
    pub name: String,
    pub files: Vec<MigratedFile>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardReport {
    pub integrations: Vec<IntegrationForward>,
    pub files_migrated: usize,
    pub mappings_created: usize,
    pub fields_created: usize,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationReverse {
    pub name: String,
    pub mappings_deleted: usize,
    pub files_restored: Vec<String>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReverseReport {
    pub integrations: Vec<IntegrationReverse>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingFile {
    pub path: String,
    pub source: String,
    pub destinations: Vec<Option<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationPreview {
    pub name: String,
    pub directory: String,
    pub pending: Vec<PendingFile>,
}

pub struct Migrator<'a> {
    conn: &'a Connection,
    templates_root: PathBuf,
    registry: &'a dyn PluginRegistry,
    variants: &'a dyn VariantSource,
    marker: &'a mut dyn CompletionMarker,
}

impl<'a> Migrator<'a> {
    pub fn new(
        conn: &'a Connection,
        templates_root: impl Into<PathBuf>,
        registry: &'a dyn PluginRegistry,
        variants: &'a dyn VariantSource,
        marker: &'a mut dyn CompletionMarker,
    ) -> Self {
        Migrator {
            conn,
            templates_root: templates_root.into(),
            registry,
            variants,
            marker,
        }
    }

    fn integration_dir(&self, integration: &Integration) -> PathBuf {
        self.templates_root.join(&integration.name)
    }

    pub fn run_forward(&mut self) -> Result<ForwardReport> {
        let mut report = ForwardReport::default();
        let integrations = registry::upload_integrations(self.registry);
        info!(count = integrations.len(), root = %self.templates_root.display(), "forward migration started");

        for integration in integrations {
            let dir = self.integration_dir(&integration);
            let mut done = IntegrationForward {
                name: integration.name.clone(),
                files: Vec::new(),
            };

            if integration.has_multiple_uploaders() {
                for (source, legacy_name) in legacy_names(&integration)? {
                    let Some(file) = self.first_unmarked_legacy(&dir, legacy_name)? else {
                        debug!(integration = %integration.name, legacy_name, "no legacy template");
                        continue;
                    };
                    done.files.push(self.migrate(&integration, &file, source)?);
                }
            } else {
                for file in self.unmarked_templates(&dir)? {
                    let source = templates::mapping_source(&file);
                    done.files.push(self.migrate(&integration, &file, &source)?);
                }
            }

            if done.files.is_empty() {
                debug!(integration = %integration.name, dir = %dir.display(), "nothing to migrate");
            }
            for f in &done.files {
                report.files_migrated += 1;
                report.mappings_created += f.mappings_created;
                report.fields_created += f.fields_created;
            }
            report.integrations.push(done);
        }

        info!(
            files = report.files_migrated,
            mappings = report.mappings_created,
            fields = report.fields_created,
            "forward migration finished"
        );
        Ok(report)
    }

    pub fn run_reverse(&mut self) -> Result<ReverseReport> {
        let mut report = ReverseReport::default();
        for integration in registry::upload_integrations(self.registry) {
            let dir = self.integration_dir(&integration);

            let tx = self.conn.unchecked_transaction()?;
            let mappings_deleted = db::delete_mappings_for_component(&tx, &integration.name)?;
            tx.commit()?;

            let mut files_restored = Vec::new();
            for file in self.marker.marked_files(&dir)? {
                let restored = self.marker.unmark(&file)?;
                files_restored.push(restored.to_string_lossy().to_string());
            }

            info!(
                integration = %integration.name,
                mappings_deleted,
                files_restored = files_restored.len(),
                "reverse migration applied"
            );
            report.integrations.push(IntegrationReverse {
                name: integration.name,
                mappings_deleted,
                files_restored,
            });
        }
        Ok(report)
    }

    /// What `run_forward` would migrate right now, without touching the store or the files.
    pub fn preview(&self) -> Result<Vec<IntegrationPreview>> {
        let destinations: Vec<Option<String>> =
            self.variants.variants().into_iter().map(Variant::destination).collect();
        let mut out = Vec::new();
        for integration in registry::upload_integrations(self.registry) {
            let dir = self.integration_dir(&integration);
            let mut pending = Vec::new();
            let mut push = |file: &Path, source: &str| {
                pending.push(PendingFile {
                    path: file.to_string_lossy().to_string(),
                    source: source.to_string(),
                    destinations: destinations.clone(),
                })
            };
            if integration.has_multiple_uploaders() {
                for (source, legacy_name) in legacy_names(&integration)? {
                    if let Some(file) = self.first_unmarked_legacy(&dir, legacy_name)? {
                        push(&file, source);
                    }
                }
            } else {
                for file in self.unmarked_templates(&dir)? {
                    push(&file, &templates::mapping_source(&file));
                }
            }
            out.push(IntegrationPreview {
                name: integration.name,
                directory: dir.to_string_lossy().to_string(),
                pending,
            });
        }
        Ok(out)
    }

    fn unmarked_templates(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        Ok(templates::list_templates(dir)?
            .into_iter()
            .filter(|p| !self.marker.is_marked(p))
            .collect())
    }

    fn first_unmarked_legacy(&self, dir: &Path, legacy_name: &str) -> Result<Option<PathBuf>> {
        Ok(templates::find_legacy_templates(dir, legacy_name)?
            .into_iter()
            .find(|p| !self.marker.is_marked(p)))
    }

    /// One transaction per variant; the file is marked only after every variant commits.
    fn migrate(&mut self, integration: &Integration, file: &Path, source: &str) -> Result<MigratedFile> {
        let parsed = fields::source_to_fields(&templates::read_template(file)?);
        let variants = self.variants.variants();
        if variants.is_empty() {
            warn!(file = %file.display(), "no report template properties; file will be marked without mappings");
        }

        let mut out = MigratedFile {
            path: file.to_string_lossy().to_string(),
            source: source.to_string(),
            ..MigratedFile::default()
        };
        for variant in variants {
            let destination = variant.destination();
            debug!(file = %file.display(), destination = ?destination, "variant pass");

            let tx = self.conn.unchecked_transaction()?;
            let mapping = db::find_or_create_mapping(&tx, &integration.name, source, destination.as_deref())?;
            if mapping.created() {
                out.mappings_created += 1;
            }
            let mapping = mapping.into_inner();

            for (title, content) in &parsed {
                let source_field = placeholder::first_placeholder(content).source_field();
                let rewritten = placeholder::rewrite_content(&integration.name, content);
                let found = db::find_or_create_mapping_field(&tx, &mapping.id, source_field, title, &rewritten)?
                    .ok_or_else(|| MigrationError::Conflict {
                        mapping_id: mapping.id.clone(),
                        source_field: source_field.to_string(),
                        destination_field: title.clone(),
                    })?;
                if found.created() {
                    out.fields_created += 1;
                }
            }
            tx.commit()?;
            out.destinations.push(destination);
        }

        self.marker.mark(file)?;
        info!(
            integration = %integration.name,
            file = %file.display(),
            source,
            mappings = out.mappings_created,
            fields = out.fields_created,
            "template migrated"
        );
        Ok(out)
    }
}

fn legacy_names(integration: &Integration) -> Result<impl Iterator<Item = (&str, &str)>> {
    let table = integration.legacy_names.as_ref().ok_or_else(|| {
        MigrationError::Config(format!(
            "integration {} has {} uploaders but no legacy mapping reference",
            integration.name, integration.uploader_count
        ))
    })?;
    Ok(table.iter().map(|(s, l)| (s.as_str(), l.as_str())))
}
