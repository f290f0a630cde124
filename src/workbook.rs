//! Configuration workbook loader.
//!
//! A workbook is a directory holding one CSV file per sheet; the sheet name
//! is the file stem (`query_list.csv` → `query_list`). Cells are trimmed and
//! empty cells decode as absent values.

use crate::error::{Result, TrendsError};
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

/// Sheet holding the query definitions
pub const QUERY_SHEET: &str = "query_list";

/// Optional sheet replacing the built-in variant table
pub const VARIANT_SHEET: &str = "variants";

/// Optional sheet with `setting`/`value` rows
pub const SETTINGS_SHEET: &str = "global_settings";

/// One table of the configuration workbook
#[derive(Debug, Clone)]
pub struct Sheet {
    name: String,
    headers: StringRecord,
    records: Vec<StringRecord>,
}

impl Sheet {
    /// Read a sheet from CSV data with a header row
    pub fn from_reader<R: Read>(name: &str, reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        let mut records = Vec::new();
        for record in rdr.records() {
            let record = record?;
            // Blank spreadsheet rows come through as all-empty records
            if record.iter().all(str::is_empty) {
                continue;
            }
            records.push(record);
        }

        Ok(Self {
            name: name.to_string(),
            headers,
            records,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of data rows
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether the header row contains `column`
    pub fn has_column(&self, column: &str) -> bool {
        self.headers.iter().any(|h| h == column)
    }

    /// Fail unless every listed column is present
    pub fn require_columns(&self, columns: &[&str]) -> Result<()> {
        for column in columns {
            if !self.has_column(column) {
                return Err(TrendsError::MissingColumn {
                    table: self.name.clone(),
                    column: (*column).to_string(),
                });
            }
        }
        Ok(())
    }

    /// Decode every row into `T` using the header row as field names
    pub fn rows<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.records
            .iter()
            .enumerate()
            .map(|(idx, record)| {
                record
                    .deserialize(Some(&self.headers))
                    .map_err(|e| TrendsError::Row {
                        sheet: self.name.clone(),
                        row: idx + 1,
                        message: e.to_string(),
                    })
            })
            .collect()
    }
}

/// All sheets of a configuration directory, keyed by sheet name
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    sheets: BTreeMap<String, Sheet>,
}

impl Workbook {
    /// Load every `*.csv` file in `dir` as a sheet
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut workbook = Self::default();

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_csv = path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("csv"))
                .unwrap_or(false);
            if !is_csv {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                debug!(path = %path.display(), "Skipping file with non UTF-8 name");
                continue;
            };

            let file = std::fs::File::open(&path)?;
            let sheet = Sheet::from_reader(name, file)?;
            debug!(sheet = name, rows = sheet.len(), "Loaded sheet");
            workbook.insert(sheet);
        }

        info!(dir = %dir.display(), sheets = workbook.sheets.len(), "Loaded workbook");
        Ok(workbook)
    }

    /// Add or replace a sheet
    pub fn insert(&mut self, sheet: Sheet) {
        self.sheets.insert(sheet.name.clone(), sheet);
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.get(name)
    }

    /// Get a sheet that must be present
    pub fn require(&self, name: &str) -> Result<&Sheet> {
        self.sheet(name)
            .ok_or_else(|| TrendsError::MissingSheet(name.to_string()))
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Row {
        name: String,
        note: Option<String>,
        k: usize,
    }

    #[test]
    fn test_rows_trim_and_empty_cells() {
        let data = "name,note,k\n  alpha , hello ,3\nbeta,,5\n,,\n";
        let sheet = Sheet::from_reader("demo", data.as_bytes()).expect("Failed to read sheet");
        assert_eq!(sheet.len(), 2);

        let rows: Vec<Row> = sheet.rows().expect("Failed to decode rows");
        assert_eq!(rows[0].name, "alpha");
        assert_eq!(rows[0].note.as_deref(), Some("hello"));
        assert_eq!(rows[0].k, 3);
        assert!(rows[1].note.is_none());
    }

    #[test]
    fn test_row_error_names_sheet_and_row() {
        let data = "name,note,k\nalpha,,three\n";
        let sheet = Sheet::from_reader("demo", data.as_bytes()).expect("Failed to read sheet");
        let err = sheet.rows::<Row>().expect_err("Expected decode failure");
        match err {
            TrendsError::Row { sheet, row, .. } => {
                assert_eq!(sheet, "demo");
                assert_eq!(row, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_require_columns() {
        let sheet = Sheet::from_reader("demo", "a,b\n1,2\n".as_bytes()).expect("Failed to read sheet");
        assert!(sheet.require_columns(&["a", "b"]).is_ok());
        assert!(matches!(
            sheet.require_columns(&["c"]),
            Err(TrendsError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_load_dir_uses_file_stems() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("query_list.csv"), "query_name,query_string\nq1,A\n")?;
        std::fs::write(dir.path().join("notes.txt"), "ignored")?;

        let workbook = Workbook::load_dir(dir.path())?;
        assert_eq!(workbook.sheet_names().collect::<Vec<_>>(), vec!["query_list"]);
        assert_eq!(workbook.require(QUERY_SHEET)?.len(), 1);
        assert!(matches!(
            workbook.require("count_plotter"),
            Err(TrendsError::MissingSheet(_))
        ));
        Ok(())
    }
}
