//! # scopus-trends
//!
//! Bibliometric trend charts from Scopus filter-count exports.
//!
//! ## Modules
//!
//! - [`workbook`] - Configuration sheets (one CSV per sheet)
//! - [`query`] - Query definitions, filter variants and expansion
//! - [`charts`] - Chart-configuration sheets and their references
//! - [`collector`] - Requirement deduplication and the download manifest
//! - [`file_map`] - Query/variant → export file lookup
//! - [`fetch`] - Download plan for the external exporter
//! - [`scopus`] - Export file reader
//! - [`figures`] - Chart data preparation and figure documents
//! - [`render`] - Chart runners and the run report
//! - [`config`] - Settings and project loading
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use scopus_trends::config::{Overrides, Project};
//!
//! fn main() -> anyhow::Result<()> {
//!     let project = Project::load("config", &Overrides::default())?;
//!     project.manifest.write_csv("to_download_queries.csv")?;
//!     let files = project.file_map("files")?;
//!     println!("{:?}", files.resolve("immuno", "iran_ar")?);
//!     Ok(())
//! }
//! ```

pub mod charts;
pub mod collector;
pub mod config;
pub mod error;
pub mod fetch;
pub mod figures;
pub mod file_map;
pub mod query;
pub mod render;
pub mod scopus;
pub mod workbook;

pub use error::{Result, TrendsError};
