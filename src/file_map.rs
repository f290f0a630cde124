//! Query → variant → file path lookup.
//!
//! Built once per run from the manifest and the files directory, then only
//! read. Chart preparation resolves every configured pair through it.

use crate::collector::ManifestRow;
use crate::error::{Result, TrendsError};
use crate::query::Requirement;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Two-level lookup of downloaded export files
#[derive(Debug, Clone, Default, Serialize)]
pub struct FileMap {
    files_dir: PathBuf,
    entries: BTreeMap<String, BTreeMap<String, PathBuf>>,
}

impl FileMap {
    /// Map every manifest row to `files_dir/output_file`.
    ///
    /// A requirement listed twice must compute the same path both times.
    pub fn build(rows: &[ManifestRow], files_dir: impl AsRef<Path>) -> Result<Self> {
        let files_dir = files_dir.as_ref().to_path_buf();
        let mut entries: BTreeMap<String, BTreeMap<String, PathBuf>> = BTreeMap::new();

        for row in rows {
            let path = files_dir.join(&row.output_file);
            let variants = entries.entry(row.query_name.clone()).or_default();

            match variants.get(&row.vars) {
                Some(existing) if *existing != path => {
                    return Err(TrendsError::PathConflict {
                        requirement: row.requirement().to_string(),
                        first: existing.clone(),
                        second: path,
                    });
                }
                Some(_) => {}
                None => {
                    debug!(query = %row.query_name, vars = %row.vars, path = %path.display(), "Mapped requirement");
                    variants.insert(row.vars.clone(), path);
                }
            }
        }

        Ok(Self { files_dir, entries })
    }

    pub fn files_dir(&self) -> &Path {
        &self.files_dir
    }

    /// Path mapped for a pair; an unmapped pair is a configuration error
    pub fn resolve(&self, query_name: &str, variant: &str) -> Result<&Path> {
        self.entries
            .get(query_name)
            .and_then(|variants| variants.get(variant))
            .map(PathBuf::as_path)
            .ok_or_else(|| TrendsError::Unmapped(Requirement::new(query_name, variant).to_string()))
    }

    /// Like [`FileMap::resolve`], but also requires the file to exist
    pub fn resolve_existing(&self, query_name: &str, variant: &str) -> Result<&Path> {
        let path = self.resolve(query_name, variant)?;
        if !path.is_file() {
            return Err(TrendsError::MissingFile {
                requirement: Requirement::new(query_name, variant).to_string(),
                path: path.to_path_buf(),
            });
        }
        Ok(path)
    }

    /// Resolve a requirement, requiring the file to exist
    pub fn resolve_requirement(&self, req: &Requirement) -> Result<&Path> {
        self.resolve_existing(&req.query_name, &req.variant)
    }

    /// Number of mapped requirements
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All (query, variant, path) entries in sorted order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &Path)> {
        self.entries.iter().flat_map(|(query, variants)| {
            variants
                .iter()
                .map(move |(variant, path)| (query.as_str(), variant.as_str(), path.as_path()))
        })
    }
}
