//! Chart-configuration sheets.
//!
//! Each chart kind has its own sheet and column layout. Rows implement
//! [`References`], which declares the (query, variant) pairs a row needs.

use crate::error::Result;
use crate::query::Requirement;
use crate::workbook::{Sheet, Workbook};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The chart kinds a workbook can configure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    ScatterArea,
    CountPlotter,
    TopK,
    Ratio,
    StackedTopK,
}

impl ChartKind {
    /// All kinds, in rendering order
    pub const ALL: [ChartKind; 5] = [
        ChartKind::ScatterArea,
        ChartKind::CountPlotter,
        ChartKind::TopK,
        ChartKind::Ratio,
        ChartKind::StackedTopK,
    ];

    /// Sheet configuring this kind
    pub fn sheet_name(self) -> &'static str {
        match self {
            ChartKind::ScatterArea => "scatter_area",
            ChartKind::CountPlotter => "count_plotter",
            ChartKind::TopK => "top_k_what_plotter",
            ChartKind::Ratio => "ratio_plotter",
            ChartKind::StackedTopK => "stacked_top_k_plotter",
        }
    }

    /// Sub-directory of the output directory for this kind's figures
    pub fn output_dir_name(self) -> &'static str {
        match self {
            ChartKind::ScatterArea => "scatter_area",
            ChartKind::CountPlotter => "count_plotter",
            ChartKind::TopK => "top_k",
            ChartKind::Ratio => "ratio",
            ChartKind::StackedTopK => "stacked_top_k",
        }
    }

    /// Columns holding the pair references
    fn required_columns(self) -> &'static [&'static str] {
        match self {
            ChartKind::ScatterArea | ChartKind::CountPlotter => &["plot_title", "query_name", "vars"],
            ChartKind::TopK => &["query_name", "vars", "what", "k"],
            ChartKind::Ratio => &[
                "plot_title",
                "numerator_query",
                "numerator_vars",
                "denominator_query",
                "denominator_vars",
            ],
            ChartKind::StackedTopK => &["query1", "var1", "query2", "var2", "x_col", "k"],
        }
    }
}

/// Extraction rule: the requirements one configuration row depends on
pub trait References {
    fn references(&self) -> Vec<Requirement>;
}

/// Row of `scatter_area` and `count_plotter`: one series of a grouped chart
#[derive(Debug, Clone, Deserialize)]
pub struct SeriesRow {
    pub plot_title: String,
    pub query_name: String,
    pub vars: String,
    pub name_in_legend: Option<String>,
    pub ylabel: Option<String>,
}

impl References for SeriesRow {
    fn references(&self) -> Vec<Requirement> {
        vec![Requirement::new(&self.query_name, &self.vars)]
    }
}

/// Row of `top_k_what_plotter`: one bar chart of a facet column
#[derive(Debug, Clone, Deserialize)]
pub struct TopKRow {
    pub query_name: String,
    pub vars: String,
    /// Facet column of the export, e.g. `AFFILIATION`
    pub what: String,
    pub k: usize,
    pub plot_title: Option<String>,
}

impl References for TopKRow {
    fn references(&self) -> Vec<Requirement> {
        vec![Requirement::new(&self.query_name, &self.vars)]
    }
}

/// How the two datasets of a stacked top-k chart share a category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BarMode {
    #[default]
    Stack,
    Group,
}

impl BarMode {
    pub fn as_str(self) -> &'static str {
        match self {
            BarMode::Stack => "stack",
            BarMode::Group => "group",
        }
    }
}

/// Row of `stacked_top_k_plotter`: two datasets compared on one facet
#[derive(Debug, Clone, Deserialize)]
pub struct StackedTopKRow {
    pub query1: String,
    pub var1: String,
    pub query2: String,
    pub var2: String,
    pub x_col: String,
    pub k: usize,
    pub name1: Option<String>,
    pub name2: Option<String>,
    pub stack_or_group: Option<BarMode>,
    pub plot_title: Option<String>,
}

impl StackedTopKRow {
    pub fn bar_mode(&self) -> BarMode {
        self.stack_or_group.unwrap_or_default()
    }

    pub fn first(&self) -> Requirement {
        Requirement::new(&self.query1, &self.var1)
    }

    pub fn second(&self) -> Requirement {
        Requirement::new(&self.query2, &self.var2)
    }
}

impl References for StackedTopKRow {
    fn references(&self) -> Vec<Requirement> {
        vec![self.first(), self.second()]
    }
}

/// Row of `ratio_plotter`: one numerator/denominator line of a grouped chart
#[derive(Debug, Clone, Deserialize)]
pub struct RatioRow {
    pub plot_title: String,
    #[serde(alias = "title")]
    pub name_in_legend: Option<String>,
    pub numerator_query: String,
    pub numerator_vars: String,
    pub denominator_query: String,
    pub denominator_vars: String,
    pub color: Option<String>,
    pub line_style: Option<String>,
}

impl RatioRow {
    pub fn numerator(&self) -> Requirement {
        Requirement::new(&self.numerator_query, &self.numerator_vars)
    }

    pub fn denominator(&self) -> Requirement {
        Requirement::new(&self.denominator_query, &self.denominator_vars)
    }
}

impl References for RatioRow {
    fn references(&self) -> Vec<Requirement> {
        vec![self.numerator(), self.denominator()]
    }
}

/// One chart-configuration sheet, decoded into its kind's row type
#[derive(Debug, Clone)]
pub enum ChartTable {
    ScatterArea(Vec<SeriesRow>),
    CountPlotter(Vec<SeriesRow>),
    TopK(Vec<TopKRow>),
    Ratio(Vec<RatioRow>),
    StackedTopK(Vec<StackedTopKRow>),
}

impl ChartTable {
    pub fn kind(&self) -> ChartKind {
        match self {
            ChartTable::ScatterArea(_) => ChartKind::ScatterArea,
            ChartTable::CountPlotter(_) => ChartKind::CountPlotter,
            ChartTable::TopK(_) => ChartKind::TopK,
            ChartTable::Ratio(_) => ChartKind::Ratio,
            ChartTable::StackedTopK(_) => ChartKind::StackedTopK,
        }
    }

    /// Decode a sheet as the given chart kind
    pub fn from_sheet(kind: ChartKind, sheet: &Sheet) -> Result<Self> {
        sheet.require_columns(kind.required_columns())?;
        let table = match kind {
            ChartKind::ScatterArea => ChartTable::ScatterArea(sheet.rows()?),
            ChartKind::CountPlotter => ChartTable::CountPlotter(sheet.rows()?),
            ChartKind::TopK => ChartTable::TopK(sheet.rows()?),
            ChartKind::Ratio => ChartTable::Ratio(sheet.rows()?),
            ChartKind::StackedTopK => ChartTable::StackedTopK(sheet.rows()?),
        };
        Ok(table)
    }

    pub fn len(&self) -> usize {
        match self {
            ChartTable::ScatterArea(rows) | ChartTable::CountPlotter(rows) => rows.len(),
            ChartTable::TopK(rows) => rows.len(),
            ChartTable::Ratio(rows) => rows.len(),
            ChartTable::StackedTopK(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every requirement referenced by the table, duplicates included
    pub fn requirements(&self) -> Vec<Requirement> {
        fn flatten<R: References>(rows: &[R]) -> Vec<Requirement> {
            rows.iter().flat_map(References::references).collect()
        }

        match self {
            ChartTable::ScatterArea(rows) | ChartTable::CountPlotter(rows) => flatten(rows),
            ChartTable::TopK(rows) => flatten(rows),
            ChartTable::Ratio(rows) => flatten(rows),
            ChartTable::StackedTopK(rows) => flatten(rows),
        }
    }
}

/// Decode every chart sheet present in the workbook, in rendering order
pub fn load_chart_tables(workbook: &Workbook) -> Result<Vec<ChartTable>> {
    let mut tables = Vec::new();
    for kind in ChartKind::ALL {
        if let Some(sheet) = workbook.sheet(kind.sheet_name()) {
            let table = ChartTable::from_sheet(kind, sheet)?;
            debug!(sheet = kind.sheet_name(), rows = table.len(), "Loaded chart sheet");
            tables.push(table);
        }
    }
    Ok(tables)
}
