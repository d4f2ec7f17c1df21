/// Built-in integrations that advertise upload but are not migration targets.
pub const EXCLUDED_INTEGRATIONS: [&str; 2] = ["projects", "csv"];

pub const UPLOAD_FEATURE: &str = "upload";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Integration {
    pub name: String,
    pub uploader_count: usize,
    /// Canonical mapping source -> legacy template base name, in table order.
    /// Only consulted when `uploader_count > 1`.
    pub legacy_names: Option<Vec<(String, String)>>,
}

impl Integration {
    pub fn has_multiple_uploaders(&self) -> bool {
        self.uploader_count > 1
    }
}

pub trait PluginRegistry {
    fn with_feature(&self, feature: &str) -> Vec<Integration>;
}

/// Upload-capable integrations minus the built-in exclusions, in registry order.
pub fn upload_integrations(registry: &dyn PluginRegistry) -> Vec<Integration> {
    registry
        .with_feature(UPLOAD_FEATURE)
        .into_iter()
        .filter(|i| !EXCLUDED_INTEGRATIONS.contains(&i.name.as_str()))
        .collect()
}

/// One report-template-property id, or `None` when variants are not in use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Variant(pub Option<i64>);

impl Variant {
    pub fn destination(self) -> Option<String> {
        self.0.map(|id| format!("rtp_{id}"))
    }
}

pub trait VariantSource {
    fn variants(&self) -> Vec<Variant>;
}
