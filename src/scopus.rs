//! Reader for Scopus "Export filter counts" CSV files.
//!
//! Layout of an export:
//!
//! ```text
//! line 1-2   preamble
//! line 3     the query, wrapped as e.g. `QUERY("...")`
//! line 4-7   preamble
//! line 8     facet header: YEAR,,AFFILIATION,,COUNTRY,,...
//! line 9..   facet rows, one value/count pair per facet
//! ```
//!
//! Blank header cells name the count column of the facet to their left, so
//! `YEAR,,` becomes `YEAR`, `YEAR_COUNTS`.

use crate::error::{OptionExt, Result, TrendsError};
use csv::{ReaderBuilder, Trim};
use serde::Serialize;
use std::path::Path;
use tracing::debug;

/// Lines before the facet header
const PREAMBLE_LINES: usize = 7;

/// Suffix of the count column following each facet column
pub const COUNTS_SUFFIX: &str = "_COUNTS";

/// Publications per year
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct YearCount {
    pub year: i32,
    pub count: u64,
}

/// Publications per value of a facet such as AFFILIATION
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacetCount {
    pub label: String,
    pub count: f64,
}

/// A parsed export file
#[derive(Debug, Clone)]
pub struct ScopusExport {
    source: String,
    query: String,
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

/// Non-empty cell at `idx`; ragged rows are shorter than the header
fn cell(row: &[String], idx: usize) -> Option<&str> {
    row.get(idx).map(String::as_str).filter(|v| !v.is_empty())
}

impl ScopusExport {
    /// Read and parse an export file
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let export = Self::parse(&path.display().to_string(), &content)?;
        debug!(path = %path.display(), rows = export.rows.len(), "Read Scopus export");
        Ok(export)
    }

    /// Parse export text; `source` names the data in error messages
    pub fn parse(source: &str, content: &str) -> Result<Self> {
        let query_line = content
            .lines()
            .nth(2)
            .ok_or_parse(&format!("{}: export has no query line", source))?;
        let query = unwrap_query(query_line.trim_end_matches('\r'));

        let table: String = content.split_inclusive('\n').skip(PREAMBLE_LINES).collect();
        let mut rdr = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(table.as_bytes());

        let mut records = rdr.records();
        let header = records
            .next()
            .transpose()?
            .ok_or_parse(&format!("{}: export has no facet header", source))?;
        let columns = name_columns(header.iter());

        let mut rows = Vec::new();
        for record in records {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self {
            source: source.to_string(),
            query,
            columns,
            rows,
        })
    }

    /// The query text recorded in the export
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    fn require_column(&self, name: &str) -> Result<usize> {
        self.column(name).ok_or_else(|| TrendsError::MissingColumn {
            table: self.source.clone(),
            column: name.to_string(),
        })
    }

    /// Yearly publication counts, sorted by year.
    ///
    /// Rows missing either cell are skipped (the year facet is usually
    /// shorter than the others).
    pub fn year_counts(&self) -> Result<Vec<YearCount>> {
        let year_idx = self.require_column("YEAR")?;
        let count_idx = self.require_column(&format!("YEAR{}", COUNTS_SUFFIX))?;

        let mut counts = Vec::new();
        for row in &self.rows {
            let (Some(year), Some(count)) = (cell(row, year_idx), cell(row, count_idx)) else {
                continue;
            };
            counts.push(YearCount {
                year: parse_whole(year)
                    .and_then(|y| i32::try_from(y).ok())
                    .ok_or_else(|| TrendsError::Parse(format!("{}: invalid year '{}'", self.source, year)))?,
                count: parse_whole(count)
                    .and_then(|c| u64::try_from(c).ok())
                    .ok_or_else(|| TrendsError::Parse(format!("{}: invalid count '{}'", self.source, count)))?,
            });
        }

        counts.sort_by_key(|c| c.year);
        Ok(counts)
    }

    /// Value/count pairs of a facet column; non-numeric counts are dropped
    pub fn facet_counts(&self, facet: &str) -> Result<Vec<FacetCount>> {
        let label_idx = self.require_column(facet)?;
        let count_idx = self.require_column(&format!("{}{}", facet, COUNTS_SUFFIX))?;

        Ok(self
            .rows
            .iter()
            .filter_map(|row| {
                let label = cell(row, label_idx)?;
                let count = cell(row, count_idx)?.replace(',', "").parse::<f64>().ok()?;
                Some(FacetCount {
                    label: label.to_string(),
                    count,
                })
            })
            .collect())
    }
}

/// Strip the `QUERY("` style wrapper from the query line
fn unwrap_query(line: &str) -> String {
    let chars: Vec<char> = line.chars().collect();
    if chars.len() <= 7 {
        return String::new();
    }
    chars[6..chars.len() - 1].iter().collect()
}

/// Name header cells; a blank cell is the count column of its left neighbour
fn name_columns<'a>(header: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for cell in header {
        let name = if !cell.is_empty() {
            cell.to_string()
        } else {
            match columns.last() {
                Some(prev) => format!("{}{}", prev, COUNTS_SUFFIX),
                None => "UNKNOWN".to_string(),
            }
        };
        columns.push(name);
    }
    columns
}

/// Parse an integer cell, accepting whole-number floats such as `2021.0`
fn parse_whole(value: &str) -> Option<i64> {
    if let Ok(v) = value.parse::<i64>() {
        return Some(v);
    }
    let v = value.parse::<f64>().ok()?;
    if v.fract() == 0.0 && v.is_finite() {
        Some(v as i64)
    } else {
        None
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build export text with the given facet header and rows
    pub(crate) fn export_text(query: &str, header: &str, rows: &[&str]) -> String {
        let mut text = String::from("Scopus\nExported filter counts\n");
        text.push_str(&format!("QUERY(\"{}\")\n", query));
        text.push_str("\n\n\n\n");
        text.push_str(header);
        text.push('\n');
        for row in rows {
            text.push_str(row);
            text.push('\n');
        }
        text
    }

    #[test]
    fn test_parse_query_and_columns() -> Result<()> {
        let text = export_text(
            "TITLE-ABS-KEY(x)",
            "YEAR,,AFFILIATION,,",
            &["2024,10,Tehran University,7", "2023,12,Shiraz University,3"],
        );
        let export = ScopusExport::parse("demo", &text)?;
        assert_eq!(export.query(), "\"TITLE-ABS-KEY(x)\"");
        assert_eq!(
            export.columns(),
            &["YEAR", "YEAR_COUNTS", "AFFILIATION", "AFFILIATION_COUNTS", "AFFILIATION_COUNTS_COUNTS"]
        );
        Ok(())
    }

    #[test]
    fn test_year_counts_sorted_and_ragged() -> Result<()> {
        let text = export_text(
            "Q",
            "YEAR,,COUNTRY,",
            &["2024,10,Iran,30", "2022,8,Germany,20", ",,France,5", "2023,9"],
        );
        let counts = ScopusExport::parse("demo", &text)?.year_counts()?;
        assert_eq!(
            counts,
            vec![
                YearCount { year: 2022, count: 8 },
                YearCount { year: 2023, count: 9 },
                YearCount { year: 2024, count: 10 },
            ]
        );
        Ok(())
    }

    #[test]
    fn test_year_counts_rejects_garbage() {
        let text = export_text("Q", "YEAR,", &["2024,many"]);
        let export = ScopusExport::parse("demo", &text).expect("Parse failed");
        assert!(matches!(export.year_counts(), Err(TrendsError::Parse(_))));
    }

    #[test]
    fn test_facet_counts_drop_non_numeric() -> Result<()> {
        let text = export_text(
            "Q",
            "YEAR,,AFFILIATION,",
            &["2024,1,Tehran University,7.0", "2023,1,Undefined,n/a"],
        );
        let facets = ScopusExport::parse("demo", &text)?.facet_counts("AFFILIATION")?;
        assert_eq!(facets.len(), 1);
        assert_eq!(facets[0].label, "Tehran University");
        assert_eq!(facets[0].count, 7.0);
        Ok(())
    }

    #[test]
    fn test_missing_facet_column() {
        let text = export_text("Q", "YEAR,", &["2024,1"]);
        let export = ScopusExport::parse("demo", &text).expect("Parse failed");
        assert!(matches!(
            export.facet_counts("SUBJAREA"),
            Err(TrendsError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_truncated_export() {
        assert!(ScopusExport::parse("demo", "only\none line\n").is_err());
    }
}
