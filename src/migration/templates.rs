use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::error::{MigrationError, Result};

pub const TEMPLATE_EXT: &str = ".template";
pub const LEGACY_SUFFIX: &str = ".legacy";

/// Records which template files have already been migrated.
pub trait CompletionMarker {
    fn is_marked(&self, path: &Path) -> bool;
    fn mark(&mut self, path: &Path) -> Result<()>;
    /// Marked template files in `dir`, sorted.
    fn marked_files(&self, dir: &Path) -> Result<Vec<PathBuf>>;
    /// Clears the mark and returns the restored path.
    fn unmark(&mut self, path: &Path) -> Result<PathBuf>;
}

/// Marks a file by renaming `x.template` to `x.template.legacy`.
#[derive(Default)]
pub struct LegacySuffixMarker;

impl CompletionMarker for LegacySuffixMarker {
    fn is_marked(&self, path: &Path) -> bool {
        file_name(path).ends_with(LEGACY_SUFFIX)
    }

    fn mark(&mut self, path: &Path) -> Result<()> {
        let mut to = path.as_os_str().to_owned();
        to.push(LEGACY_SUFFIX);
        rename(path, Path::new(&to))
    }

    fn marked_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let suffix = format!("{TEMPLATE_EXT}{LEGACY_SUFFIX}");
        scan_dir(dir, |name| name.ends_with(&suffix))
    }

    fn unmark(&mut self, path: &Path) -> Result<PathBuf> {
        let name = file_name(path);
        let Some(restored) = name.strip_suffix(LEGACY_SUFFIX) else {
            return Ok(path.to_path_buf());
        };
        let to = path.with_file_name(restored);
        rename(path, &to)?;
        Ok(to)
    }
}

/// Keeps marks in memory; files on disk are never renamed.
#[cfg(test)]
#[derive(Default)]
pub struct InMemoryMarker {
    marked: std::collections::BTreeSet<PathBuf>,
}

#[cfg(test)]
impl CompletionMarker for InMemoryMarker {
    fn is_marked(&self, path: &Path) -> bool {
        self.marked.contains(path)
    }

    fn mark(&mut self, path: &Path) -> Result<()> {
        self.marked.insert(path.to_path_buf());
        Ok(())
    }

    fn marked_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        Ok(self
            .marked
            .iter()
            .filter(|p| p.parent() == Some(dir))
            .cloned()
            .collect())
    }

    fn unmark(&mut self, path: &Path) -> Result<PathBuf> {
        self.marked.remove(path);
        Ok(path.to_path_buf())
    }
}

/// Every `*.template` file directly inside `dir`, sorted. A missing directory is empty.
pub fn list_templates(dir: &Path) -> Result<Vec<PathBuf>> {
    scan_dir(dir, |name| {
        name.len() > TEMPLATE_EXT.len() && name.ends_with(TEMPLATE_EXT)
    })
}

/// Files named `<legacy_name>.template`, optionally with a further suffix, sorted.
pub fn find_legacy_templates(dir: &Path, legacy_name: &str) -> Result<Vec<PathBuf>> {
    let prefix = format!("{legacy_name}{TEMPLATE_EXT}");
    scan_dir(dir, |name| name.starts_with(&prefix))
}

/// Mapping source for a single-uploader template: the file name without `.template`.
pub fn mapping_source(path: &Path) -> String {
    let name = file_name(path);
    name.strip_suffix(TEMPLATE_EXT).unwrap_or(&name).to_string()
}

pub fn read_template(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|source| MigrationError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    String::from_utf8(bytes).map_err(|e| MigrationError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn scan_dir(dir: &Path, keep: impl Fn(&str) -> bool) -> Result<Vec<PathBuf>> {
    let read_err = |source: std::io::Error| MigrationError::Read {
        path: dir.to_path_buf(),
        source,
    };
    let entries = match std::fs::read_dir(dir) {
        Ok(v) => v,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(read_err(e)),
    };
    let mut out: Vec<PathBuf> = Vec::new();
    for ent in entries {
        let p = ent.map_err(read_err)?.path();
        if !p.is_file() {
            continue;
        }
        let Some(name) = p.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        if keep(name) {
            out.push(p);
        }
    }
    out.sort();
    Ok(out)
}

fn rename(from: &Path, to: &Path) -> Result<()> {
    std::fs::rename(from, to).map_err(|source| MigrationError::Rename {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}
