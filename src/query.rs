//! Query definitions, filter variants and query expansion.
//!
//! A requirement is a (query, variant) pair. Expanding it appends the
//! variant's filter suffix to the base query and derives the output file
//! name `{query}_{variant}.csv`; the fetch plan and the file map both use
//! [`output_file_name`], so they always agree on where a requirement lives.

use crate::error::{Result, TrendsError};
use crate::workbook::Sheet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

/// Built-in filter variants: (name, suffix appended to the base query)
pub const DEFAULT_VARIANTS: &[(&str, &str)] = &[
    ("global_ar_re", ""),
    ("iran_ar_re", " AND AFFILCOUNTRY(Iran)"),
    ("global_ar", " AND DOCTYPE(ar)"),
    ("global_re", " AND DOCTYPE(re)"),
    ("iran_ar", " AND AFFILCOUNTRY(Iran) AND DOCTYPE(ar)"),
    ("iran_re", " AND AFFILCOUNTRY(Iran) AND DOCTYPE(re)"),
];

/// Canonical file name for a requirement's export
pub fn output_file_name(query_name: &str, variant: &str) -> String {
    format!("{}_{}.csv", query_name, variant)
}

/// Check that a query or variant name cannot leave the files directory.
///
/// Spaces, parentheses and non-ASCII letters are fine; empty names, path
/// separators, a leading dot and control characters are not.
pub fn validate_name(name: &str) -> Result<()> {
    let unsafe_name = name.is_empty()
        || name.starts_with('.')
        || name.chars().any(|c| c == '/' || c == '\\' || c.is_control());
    if unsafe_name {
        Err(TrendsError::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}

/// A (query, variant) pair that must be fetched before charts can use it
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Requirement {
    pub query_name: String,
    pub variant: String,
}

impl Requirement {
    pub fn new(query_name: impl Into<String>, variant: impl Into<String>) -> Self {
        Self {
            query_name: query_name.into(),
            variant: variant.into(),
        }
    }

    pub fn output_file(&self) -> String {
        output_file_name(&self.query_name, &self.variant)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.query_name, self.variant)
    }
}

/// Named base search expressions from the `query_list` sheet
#[derive(Debug, Clone, Default)]
pub struct QueryBook {
    queries: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct QueryRow {
    query_name: String,
    query_string: String,
}

impl QueryBook {
    /// Build from (name, query string) pairs.
    ///
    /// Repeating a name with the same string is accepted; repeating it with
    /// a different string is a configuration error.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut queries = BTreeMap::new();
        for (name, query) in pairs {
            let name = name.into();
            let query = query.into();
            validate_name(&name)?;
            if query.trim().is_empty() {
                return Err(TrendsError::Config(format!("Query '{}' has an empty query string", name)));
            }
            if let Some(prev) = queries.get(&name) {
                if *prev != query {
                    return Err(TrendsError::Config(format!(
                        "Query '{}' is defined twice with different query strings",
                        name
                    )));
                }
                continue;
            }
            queries.insert(name, query);
        }
        Ok(Self { queries })
    }

    /// Read the `query_list` sheet (`query_name`, `query_string`)
    pub fn from_sheet(sheet: &Sheet) -> Result<Self> {
        sheet.require_columns(&["query_name", "query_string"])?;
        let rows: Vec<QueryRow> = sheet.rows()?;
        let book = Self::from_pairs(rows.into_iter().map(|r| (r.query_name, r.query_string)))?;
        debug!(count = book.len(), "Loaded query definitions");
        Ok(book)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.queries.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.queries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

/// What to do with a variant name missing from the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantPolicy {
    /// Unknown variants are configuration errors
    #[default]
    Strict,
    /// Unknown variants expand with an empty suffix
    Lenient,
}

impl std::str::FromStr for VariantPolicy {
    type Err = TrendsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "lenient" => Ok(Self::Lenient),
            other => Err(TrendsError::Config(format!(
                "Invalid unknown_variants policy '{}': expected 'strict' or 'lenient'",
                other
            ))),
        }
    }
}

/// Expanded query string and output file name for one requirement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    pub query_string: String,
    pub output_file: String,
}

/// Variant name → filter suffix
#[derive(Debug, Clone)]
pub struct VariantTable {
    suffixes: BTreeMap<String, String>,
    policy: VariantPolicy,
}

#[derive(Debug, Deserialize)]
struct VariantRow {
    vars: String,
    suffix: Option<String>,
}

impl Default for VariantTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl VariantTable {
    /// The built-in variant set with the strict policy
    pub fn builtin() -> Self {
        Self {
            suffixes: DEFAULT_VARIANTS
                .iter()
                .map(|(name, suffix)| (name.to_string(), suffix.to_string()))
                .collect(),
            policy: VariantPolicy::Strict,
        }
    }

    /// Build a custom table from (name, suffix) pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut suffixes = BTreeMap::new();
        for (name, suffix) in pairs {
            let name = name.into();
            validate_name(&name)?;
            let suffix = suffix.into();
            if let Some(prev) = suffixes.insert(name.clone(), suffix.clone()) {
                if prev != suffix {
                    return Err(TrendsError::Config(format!(
                        "Variant '{}' is defined twice with different suffixes",
                        name
                    )));
                }
            }
        }
        Ok(Self {
            suffixes,
            policy: VariantPolicy::Strict,
        })
    }

    /// Read the `variants` sheet (`vars`, `suffix`).
    ///
    /// Cells are trimmed by the workbook reader, so a suffix cell is stored
    /// without its separating space; one is added back here.
    pub fn from_sheet(sheet: &Sheet) -> Result<Self> {
        sheet.require_columns(&["vars"])?;
        let rows: Vec<VariantRow> = sheet.rows()?;
        Self::from_pairs(rows.into_iter().map(|r| {
            let suffix = r.suffix.map(|s| format!(" {}", s)).unwrap_or_default();
            (r.vars, suffix)
        }))
    }

    pub fn with_policy(mut self, policy: VariantPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> VariantPolicy {
        self.policy
    }

    pub fn contains(&self, name: &str) -> bool {
        self.suffixes.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.suffixes.keys().map(String::as_str)
    }

    /// Filter suffix for a variant, honouring the policy for unknown names
    pub fn suffix(&self, variant: &str) -> Result<&str> {
        match self.suffixes.get(variant) {
            Some(suffix) => Ok(suffix.as_str()),
            None => match self.policy {
                VariantPolicy::Strict => Err(TrendsError::UnknownVariant {
                    variant: variant.to_string(),
                    context: "the variant table".to_string(),
                }),
                VariantPolicy::Lenient => {
                    warn!(variant, "Unknown variant, expanding without a filter suffix");
                    Ok("")
                }
            },
        }
    }

    /// Expand a base query with a variant's suffix
    pub fn expand(&self, query_name: &str, query_string: &str, variant: &str) -> Result<Expansion> {
        let suffix = self.suffix(variant)?;
        Ok(Expansion {
            query_string: format!("{}{}", query_string, suffix),
            output_file: output_file_name(query_name, variant),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_builtin_variant() -> Result<()> {
        let variants = VariantTable::builtin();
        let exp = variants.expand("immuno", "TITLE-ABS-KEY(x)", "iran_ar")?;
        assert_eq!(exp.output_file, "immuno_iran_ar.csv");
        assert_eq!(
            exp.query_string,
            "TITLE-ABS-KEY(x) AND AFFILCOUNTRY(Iran) AND DOCTYPE(ar)"
        );
        Ok(())
    }

    #[test]
    fn test_expand_is_deterministic() -> Result<()> {
        let variants = VariantTable::builtin();
        for (name, _) in DEFAULT_VARIANTS {
            let a = variants.expand("q", "BASE", name)?;
            let b = variants.expand("q", "BASE", name)?;
            assert_eq!(a, b);
        }
        let plain = variants.expand("q", "BASE", "global_ar_re")?;
        assert_eq!(plain.query_string, "BASE");
        Ok(())
    }

    #[test]
    fn test_unknown_variant_policy() {
        let strict = VariantTable::builtin();
        assert!(matches!(
            strict.expand("q", "BASE", "mars_ar"),
            Err(TrendsError::UnknownVariant { .. })
        ));

        let lenient = VariantTable::builtin().with_policy(VariantPolicy::Lenient);
        let exp = lenient.expand("q", "BASE", "mars_ar").expect("Lenient expand failed");
        assert_eq!(exp.query_string, "BASE");
        assert_eq!(exp.output_file, "q_mars_ar.csv");
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("Strict".parse::<VariantPolicy>().ok(), Some(VariantPolicy::Strict));
        assert_eq!(" lenient ".parse::<VariantPolicy>().ok(), Some(VariantPolicy::Lenient));
        assert!("sometimes".parse::<VariantPolicy>().is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("car_t_cell").is_ok());
        assert!(validate_name("nk-cell.v2").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("../etc").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name(".hidden").is_err());
        assert!(validate_name("all articles").is_ok());
        assert!(validate_name("immuno(2)").is_ok());
        assert!(validate_name("ایمنی").is_ok());
        assert!(validate_name("a\\b").is_err());
        assert!(validate_name("tab\there").is_err());
    }

    #[test]
    fn test_spreadsheet_names_expand() -> Result<()> {
        let queries = QueryBook::from_pairs([("nk cell", "TITLE(x)"), ("immuno(2)", "TITLE(y)")])?;
        assert!(queries.contains("nk cell"));
        let exp = VariantTable::builtin().expand("nk cell", "TITLE(x)", "iran_ar")?;
        assert_eq!(exp.output_file, "nk cell_iran_ar.csv");

        assert!(matches!(
            QueryBook::from_pairs([("../x", "TITLE(z)")]),
            Err(TrendsError::InvalidName(name)) if name == "../x"
        ));
        assert!(VariantTable::from_pairs([("../x", "")]).is_err());
        Ok(())
    }

    #[test]
    fn test_query_book_duplicates() {
        assert!(QueryBook::from_pairs([("q1", "A"), ("q1", "A")]).is_ok());
        assert!(matches!(
            QueryBook::from_pairs([("q1", "A"), ("q1", "B")]),
            Err(TrendsError::Config(_))
        ));
        assert!(QueryBook::from_pairs([("q1", "  ")]).is_err());
    }

    #[test]
    fn test_variants_from_sheet_restores_separator() -> Result<()> {
        let sheet = Sheet::from_reader(
            "variants",
            "vars,suffix\nall,\nar,AND DOCTYPE(ar)\n".as_bytes(),
        )?;
        let variants = VariantTable::from_sheet(&sheet)?;
        assert_eq!(variants.suffix("all")?, "");
        assert_eq!(variants.expand("q", "X", "ar")?.query_string, "X AND DOCTYPE(ar)");
        Ok(())
    }
}
