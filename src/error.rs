//! Custom error types for scopus-trends.
//!
//! Every failure names the offending identifiers (sheet, query, variant,
//! path) so a broken configuration can be fixed without guesswork.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for scopus-trends operations.
#[derive(Debug, Error)]
pub enum TrendsError {
    /// A chart sheet references a query absent from `query_list`
    #[error("Unknown query '{query}' referenced by sheet '{sheet}'")]
    UnknownQuery {
        /// Query name as written in the sheet
        query: String,
        /// Sheet holding the reference
        sheet: String,
    },

    /// A variant name outside the configured variant table
    #[error("Unknown variant '{variant}' referenced by {context}")]
    UnknownVariant {
        /// Variant name as written in the configuration
        variant: String,
        /// Where the reference came from
        context: String,
    },

    /// Two different requirements compute the same output file
    #[error("Naming collision: {first} and {second} both map to '{file}'")]
    FileNameCollision {
        file: String,
        first: String,
        second: String,
    },

    /// One requirement computes two different paths
    #[error("Conflicting paths for {requirement}: {} vs {}", .first.display(), .second.display())]
    PathConflict {
        requirement: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// No file is mapped for the requirement
    #[error("No file mapped for {0}")]
    Unmapped(String),

    /// The mapped file does not exist on disk
    #[error("Required file missing for {requirement}: {}", .path.display())]
    MissingFile { requirement: String, path: PathBuf },

    /// Identifier that cannot be used as part of a file name
    #[error("Invalid name '{0}': use letters, digits, '_', '-' or '.', not starting with '.'")]
    InvalidName(String),

    /// Required sheet is not present in the workbook
    #[error("Missing sheet '{0}'")]
    MissingSheet(String),

    /// Required column is not present in a sheet or export
    #[error("'{table}' is missing column '{column}'")]
    MissingColumn { table: String, column: String },

    /// A row could not be decoded
    #[error("Sheet '{sheet}' row {row}: {message}")]
    Row {
        sheet: String,
        /// 1-based data row number
        row: usize,
        message: String,
    },

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed export data
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias using `TrendsError`
pub type Result<T> = std::result::Result<T, TrendsError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a parse error message
    fn ok_or_parse(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_parse(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| TrendsError::Parse(msg.to_string()))
    }
}
