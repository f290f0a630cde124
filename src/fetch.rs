//! Download plan for the external Scopus exporter.
//!
//! The exporter itself drives a browser and lives outside this crate. The
//! plan tells it, per manifest row, which search to open and where to save
//! the "Export filter counts" file. Rows whose file already exists are
//! marked present, so re-running the exporter over pending rows only is
//! idempotent.

use crate::collector::Manifest;
use crate::error::{Result, TrendsError};
use crate::query::Requirement;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

/// Scopus basic-search results page
pub const SCOPUS_RESULTS_URL: &str = "https://www.scopus.com/results/results.uri";

/// Default plan file name
pub const PLAN_FILE: &str = "download_plan.csv";

/// Results-page URL for a query string
pub fn search_url(query_string: &str) -> Result<Url> {
    let mut url = Url::parse(SCOPUS_RESULTS_URL)
        .map_err(|e| TrendsError::Config(format!("Invalid Scopus URL: {}", e)))?;
    url.query_pairs_mut()
        .append_pair("src", "s")
        .append_pair("origin", "searchbasic")
        .append_pair("zone", "resultslist")
        .append_pair("s", query_string);
    Ok(url)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Export already on disk
    Present,
    /// Export still to be fetched
    Pending,
}

/// One row of the download plan
#[derive(Debug, Clone, Serialize)]
pub struct DownloadTask {
    pub query_name: String,
    pub vars: String,
    pub status: TaskStatus,
    pub target: PathBuf,
    pub search_url: String,
}

impl DownloadTask {
    pub fn requirement(&self) -> Requirement {
        Requirement::new(&self.query_name, &self.vars)
    }
}

/// Plan every manifest row against the files directory
pub fn plan(manifest: &Manifest, files_dir: impl AsRef<Path>) -> Result<Vec<DownloadTask>> {
    let files_dir = files_dir.as_ref();
    let tasks = manifest
        .rows()
        .iter()
        .map(|row| {
            let target = files_dir.join(&row.output_file);
            let status = if target.is_file() {
                TaskStatus::Present
            } else {
                TaskStatus::Pending
            };
            debug!(query = %row.query_name, vars = %row.vars, ?status, "Planned download");
            Ok(DownloadTask {
                query_name: row.query_name.clone(),
                vars: row.vars.clone(),
                status,
                target,
                search_url: search_url(&row.query_string)?.to_string(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let pending = tasks.iter().filter(|t| t.status == TaskStatus::Pending).count();
    info!(total = tasks.len(), pending, "Download plan ready");
    Ok(tasks)
}

/// Write the plan as CSV
pub fn write_plan(tasks: &[DownloadTask], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let mut wtr = csv::WriterBuilder::new().has_headers(true).from_path(path)?;
    for task in tasks {
        wtr.serialize(task)?;
    }
    wtr.flush()?;
    info!(path = %path.display(), rows = tasks.len(), "Saved download plan");
    Ok(())
}
