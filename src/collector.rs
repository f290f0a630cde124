//! Requirement collection and the download manifest.
//!
//! Collection scans every chart table, checks each referenced pair against
//! the query and variant definitions, and deduplicates them. The manifest
//! is the expanded form: one row per unique requirement with the query
//! string to run and the file the export must be saved as.

use crate::charts::ChartTable;
use crate::error::{Result, TrendsError};
use crate::query::{validate_name, QueryBook, Requirement, VariantPolicy, VariantTable};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, info};

/// Default manifest file name
pub const MANIFEST_FILE: &str = "to_download_queries.csv";

/// Manifest CSV column order
pub const MANIFEST_COLUMNS: &[&str] = &["query_name", "vars", "query_string", "output_file"];

/// Collect the deduplicated requirements of all chart tables.
///
/// Fails on the first reference to an undefined query, or to an undefined
/// variant when the variant table is strict. Nothing is returned for a
/// partially valid configuration.
pub fn collect(
    tables: &[ChartTable],
    queries: &QueryBook,
    variants: &VariantTable,
) -> Result<BTreeSet<Requirement>> {
    let mut pairs = BTreeSet::new();
    let mut referenced = 0usize;

    for table in tables {
        let sheet = table.kind().sheet_name();
        for req in table.requirements() {
            referenced += 1;
            if !queries.contains(&req.query_name) {
                return Err(TrendsError::UnknownQuery {
                    query: req.query_name,
                    sheet: sheet.to_string(),
                });
            }
            if !variants.contains(&req.variant) {
                if variants.policy() == VariantPolicy::Strict {
                    return Err(TrendsError::UnknownVariant {
                        variant: req.variant,
                        context: format!(
                            "sheet '{}' (known variants: {})",
                            sheet,
                            variants.names().collect::<Vec<_>>().join(", ")
                        ),
                    });
                }
                // Lenient variants still end up in a file name
                validate_name(&req.variant)?;
            }
            pairs.insert(req);
        }
    }

    info!(
        referenced,
        unique = pairs.len(),
        "Collected requirements from {} chart sheets",
        tables.len()
    );
    Ok(pairs)
}

/// One unique requirement, expanded for the fetch stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRow {
    pub query_name: String,
    pub vars: String,
    pub query_string: String,
    pub output_file: String,
}

impl ManifestRow {
    pub fn requirement(&self) -> Requirement {
        Requirement::new(&self.query_name, &self.vars)
    }
}

/// Work list handed to the external fetcher
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Manifest {
    rows: Vec<ManifestRow>,
}

impl Manifest {
    /// Expand a requirement set into manifest rows.
    ///
    /// Two different requirements that compute the same output file are a
    /// naming collision: the second fetch would overwrite the first.
    pub fn build(
        requirements: &BTreeSet<Requirement>,
        queries: &QueryBook,
        variants: &VariantTable,
    ) -> Result<Self> {
        let mut rows = Vec::with_capacity(requirements.len());
        let mut owners: HashMap<String, &Requirement> = HashMap::new();

        for req in requirements {
            let base = queries.get(&req.query_name).ok_or_else(|| TrendsError::UnknownQuery {
                query: req.query_name.clone(),
                sheet: "the requirement set".to_string(),
            })?;
            let expansion = variants.expand(&req.query_name, base, &req.variant)?;

            if let Some(owner) = owners.get(&expansion.output_file) {
                return Err(TrendsError::FileNameCollision {
                    file: expansion.output_file,
                    first: owner.to_string(),
                    second: req.to_string(),
                });
            }
            owners.insert(expansion.output_file.clone(), req);

            debug!(query = %req.query_name, vars = %req.variant, file = %expansion.output_file, "Expanded requirement");
            rows.push(ManifestRow {
                query_name: req.query_name.clone(),
                vars: req.variant.clone(),
                query_string: expansion.query_string,
                output_file: expansion.output_file,
            });
        }

        Ok(Self { rows })
    }

    /// Collect and expand in one step
    pub fn from_tables(
        tables: &[ChartTable],
        queries: &QueryBook,
        variants: &VariantTable,
    ) -> Result<Self> {
        let requirements = collect(tables, queries, variants)?;
        Self::build(&requirements, queries, variants)
    }

    pub fn rows(&self) -> &[ManifestRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Write the manifest as CSV (header included even when empty)
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)?;

        wtr.write_record(MANIFEST_COLUMNS)?;
        for row in &self.rows {
            wtr.serialize(row)?;
        }
        wtr.flush()?;

        info!(path = %path.display(), rows = self.rows.len(), "Saved manifest");
        Ok(())
    }

    /// Read a manifest written by [`Manifest::write_csv`]
    pub fn read_csv(path: impl AsRef<Path>) -> Result<Self> {
        let mut rdr = csv::Reader::from_path(path)?;
        let rows = rdr
            .deserialize()
            .collect::<std::result::Result<Vec<ManifestRow>, csv::Error>>()?;
        Ok(Self { rows })
    }
}
