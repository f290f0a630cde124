//! Chart runners.
//!
//! Every chart unit (a `plot_title` group, or a single row for the top-k
//! kinds) resolves its files through the [`FileMap`], prepares its series
//! and hands the figure to a [`FigureSink`]. A unit that fails is logged
//! and recorded in the [`RunReport`]; the remaining units still run.

use crate::charts::{ChartKind, ChartTable, RatioRow, SeriesRow, StackedTopKRow, TopKRow};
use crate::error::{Result, TrendsError};
use crate::figures::{self, Figure, Theme, Trace};
use crate::file_map::FileMap;
use crate::query::Requirement;
use crate::scopus::ScopusExport;
use chrono::Local;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Report file written next to the figures
pub const REPORT_FILE: &str = "run_report.json";

/// Knobs shared by all chart runners
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub theme: Theme,
    /// Most recent years left out of time series
    pub ignore_current_year: u32,
    /// Span of the scatter-area window
    pub past_what_years: u32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            ignore_current_year: 1,
            past_what_years: 30,
        }
    }
}

/// Destination for finished figures
pub trait FigureSink {
    /// Store a figure and return where it went
    fn emit(&mut self, kind: ChartKind, title: &str, figure: &Figure) -> Result<PathBuf>;
}

/// Writes each figure as `<root>/<kind dir>/<title slug>.json`
pub struct JsonFigureWriter {
    root: PathBuf,
    used: HashSet<PathBuf>,
    slug: Regex,
}

impl JsonFigureWriter {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let slug = Regex::new(r"[^A-Za-z0-9_\-]+")
            .map_err(|e| TrendsError::Config(format!("Invalid slug pattern: {}", e)))?;
        Ok(Self {
            root: root.into(),
            used: HashSet::new(),
            slug,
        })
    }

    fn file_stem(&self, title: &str) -> String {
        let stem = self.slug.replace_all(title.trim(), "_");
        let stem = stem.trim_matches('_');
        if stem.is_empty() {
            "chart".to_string()
        } else {
            stem.to_string()
        }
    }

    /// First free path for a title; repeated titles get a numeric suffix
    fn target(&mut self, dir: &Path, title: &str) -> PathBuf {
        let stem = self.file_stem(title);
        let mut path = dir.join(format!("{}.json", stem));
        let mut n = 2;
        while self.used.contains(&path) {
            path = dir.join(format!("{}_{}.json", stem, n));
            n += 1;
        }
        self.used.insert(path.clone());
        path
    }
}

impl FigureSink for JsonFigureWriter {
    fn emit(&mut self, kind: ChartKind, title: &str, figure: &Figure) -> Result<PathBuf> {
        let dir = self.root.join(kind.output_dir_name());
        std::fs::create_dir_all(&dir)?;
        let path = self.target(&dir, title);
        std::fs::write(&path, serde_json::to_string_pretty(figure)?)?;
        info!(kind = kind.sheet_name(), path = %path.display(), "Saved figure");
        Ok(path)
    }
}

/// Result of one chart unit
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnitStatus {
    Rendered { path: PathBuf },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ChartOutcome {
    pub kind: ChartKind,
    pub title: String,
    #[serde(flatten)]
    pub status: UnitStatus,
}

/// Outcome of every chart unit of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub generated_at: String,
    pub theme: Theme,
    pub outcomes: Vec<ChartOutcome>,
}

impl RunReport {
    pub fn rendered(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, UnitStatus::Rendered { .. }))
            .count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &ChartOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, UnitStatus::Failed { .. }))
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Run every chart unit of every table
pub fn render_all(
    tables: &[ChartTable],
    files: &FileMap,
    options: &RenderOptions,
    sink: &mut dyn FigureSink,
) -> RunReport {
    let mut outcomes = Vec::new();

    for table in tables {
        let kind = table.kind();
        info!(kind = kind.sheet_name(), rows = table.len(), "Running charts");

        let units: Vec<(String, Result<Figure>)> = match table {
            ChartTable::ScatterArea(rows) => group_by_title(rows, |r| &r.plot_title)
                .into_iter()
                .map(|(title, group)| {
                    let fig = scatter_area(&title, &group, files, options);
                    (title, fig)
                })
                .collect(),
            ChartTable::CountPlotter(rows) => group_by_title(rows, |r| &r.plot_title)
                .into_iter()
                .map(|(title, group)| {
                    let fig = count_plot(&title, &group, files, options);
                    (title, fig)
                })
                .collect(),
            ChartTable::Ratio(rows) => group_by_title(rows, |r| &r.plot_title)
                .into_iter()
                .map(|(title, group)| {
                    let fig = ratio_plot(&title, &group, files, options);
                    (title, fig)
                })
                .collect(),
            ChartTable::TopK(rows) => rows
                .iter()
                .map(|row| {
                    let title = row
                        .plot_title
                        .clone()
                        .unwrap_or_else(|| format!("Top {} by {} Count", row.k, row.what));
                    let fig = top_k_plot(&title, row, files, options);
                    (title, fig)
                })
                .collect(),
            ChartTable::StackedTopK(rows) => rows
                .iter()
                .map(|row| {
                    let title = row
                        .plot_title
                        .clone()
                        .unwrap_or_else(|| format!("Top {} {}", row.k, row.x_col));
                    let fig = stacked_top_k_plot(&title, row, files, options);
                    (title, fig)
                })
                .collect(),
        };

        for (title, fig) in units {
            let status = match fig.and_then(|fig| sink.emit(kind, &title, &fig)) {
                Ok(path) => UnitStatus::Rendered { path },
                Err(e) => {
                    error!(kind = kind.sheet_name(), title = %title, error = %e, "Chart failed");
                    UnitStatus::Failed { error: e.to_string() }
                }
            };
            outcomes.push(ChartOutcome { kind, title, status });
        }
    }

    let report = RunReport {
        generated_at: Local::now().to_rfc3339(),
        theme: options.theme.clone(),
        outcomes,
    };
    info!(
        rendered = report.rendered(),
        failed = report.failed().count(),
        "Charts complete"
    );
    report
}

/// Group rows by plot title, titles in sorted order
fn group_by_title<'a, R>(rows: &'a [R], title: impl Fn(&R) -> &String) -> BTreeMap<String, Vec<&'a R>> {
    let mut groups: BTreeMap<String, Vec<&R>> = BTreeMap::new();
    for row in rows {
        groups.entry(title(row).clone()).or_default().push(row);
    }
    groups
}

fn read_export(files: &FileMap, req: &Requirement) -> Result<ScopusExport> {
    let path = files.resolve_requirement(req)?;
    ScopusExport::read(path)
}

fn legend_name(explicit: Option<&String>, req: &Requirement) -> String {
    explicit
        .cloned()
        .unwrap_or_else(|| format!("{}_{}", req.query_name, req.variant))
}

/// Y-axis label: the last row of the group that sets one
fn group_ylabel(group: &[&SeriesRow], default: &str) -> String {
    group
        .iter()
        .rev()
        .find_map(|r| r.ylabel.clone())
        .unwrap_or_else(|| default.to_string())
}

fn scatter_area(title: &str, group: &[&SeriesRow], files: &FileMap, options: &RenderOptions) -> Result<Figure> {
    let mut fig = Figure::new(title, "Year", &group_ylabel(group, "Counts"), &options.theme);
    for row in group {
        let req = Requirement::new(&row.query_name, &row.vars);
        let counts = read_export(files, &req)?.year_counts()?;
        let window = figures::year_window(&counts, options.ignore_current_year, Some(options.past_what_years));
        fig.push(Trace::area(&legend_name(row.name_in_legend.as_ref(), &req), &window));
    }
    Ok(fig)
}

fn count_plot(title: &str, group: &[&SeriesRow], files: &FileMap, options: &RenderOptions) -> Result<Figure> {
    let mut fig = Figure::new(title, "Year", &group_ylabel(group, "Counts"), &options.theme);
    fig.layout.xaxis.dtick = Some(4);
    for row in group {
        let req = Requirement::new(&row.query_name, &row.vars);
        let counts = read_export(files, &req)?.year_counts()?;
        let window = figures::year_window(&counts, options.ignore_current_year, None);
        fig.push(Trace::lines(&legend_name(row.name_in_legend.as_ref(), &req), &window));
    }
    Ok(fig)
}

fn ratio_plot(title: &str, group: &[&RatioRow], files: &FileMap, options: &RenderOptions) -> Result<Figure> {
    let mut fig = Figure::new(title, "Year", "Counts Ratio", &options.theme);
    for row in group {
        let num_req = row.numerator();
        let den_req = row.denominator();
        let numerator = read_export(files, &num_req)?.year_counts()?;
        let denominator = read_export(files, &den_req)?.year_counts()?;
        let points = figures::ratio_series(&numerator, &denominator);

        let name = row
            .name_in_legend
            .clone()
            .unwrap_or_else(|| format!("{} / {}", num_req, den_req));
        fig.push(Trace::ratio(&name, &points, row.color.as_deref(), row.line_style.as_deref()));
    }
    Ok(fig)
}

fn top_k_plot(title: &str, row: &TopKRow, files: &FileMap, options: &RenderOptions) -> Result<Figure> {
    let req = Requirement::new(&row.query_name, &row.vars);
    let export = read_export(files, &req)?;
    let top = figures::top_k(&export.facet_counts(&row.what)?, row.k);
    info!(query = %req, what = %row.what, recorded_query = export.query(), "Top-k prepared");

    let name = format!("Top {} {}", row.k, row.what);
    Ok(Figure::new(title, "Count", &row.what, &options.theme).with_trace(Trace::horizontal_bar(&name, &top)))
}

fn stacked_top_k_plot(
    title: &str,
    row: &StackedTopKRow,
    files: &FileMap,
    options: &RenderOptions,
) -> Result<Figure> {
    let first_req = row.first();
    let second_req = row.second();
    let first = read_export(files, &first_req)?.facet_counts(&row.x_col)?;
    let second = read_export(files, &second_req)?.facet_counts(&row.x_col)?;
    let (labels, a, b) = figures::stacked_top_k(&first, &second, row.k);

    Ok(Figure::new(title, &row.x_col, "Count", &options.theme)
        .with_trace(Trace::bar(&legend_name(row.name1.as_ref(), &first_req), &labels, &a))
        .with_trace(Trace::bar(&legend_name(row.name2.as_ref(), &second_req), &labels, &b))
        .with_barmode(row.bar_mode()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::ManifestRow;
    use crate::scopus::tests::export_text;
    use crate::workbook::Sheet;

    /// Collects figures in memory
    #[derive(Default)]
    struct MemorySink {
        figures: Vec<(ChartKind, String, Figure)>,
    }

    impl FigureSink for MemorySink {
        fn emit(&mut self, kind: ChartKind, title: &str, figure: &Figure) -> Result<PathBuf> {
            self.figures.push((kind, title.to_string(), figure.clone()));
            Ok(PathBuf::from(format!("{}.json", title)))
        }
    }

    fn manifest_row(query: &str, vars: &str) -> ManifestRow {
        ManifestRow {
            query_name: query.to_string(),
            vars: vars.to_string(),
            query_string: "Q".to_string(),
            output_file: format!("{}_{}.csv", query, vars),
        }
    }

    fn table(kind: ChartKind, data: &str) -> ChartTable {
        let sheet = Sheet::from_reader(kind.sheet_name(), data.as_bytes()).expect("Failed to read sheet");
        ChartTable::from_sheet(kind, &sheet).expect("Failed to decode chart sheet")
    }

    fn write_export(dir: &Path, file: &str, rows: &[&str]) {
        let text = export_text("Q", "YEAR,,AFFILIATION,", rows);
        std::fs::write(dir.join(file), text).expect("Failed to write export");
    }

    #[test]
    fn test_missing_file_fails_only_its_unit() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_export(dir.path(), "a_v0.csv", &["2024,4,Tehran,3", "2023,3,Shiraz,2", "2022,2,Tabriz,1"]);

        let files = FileMap::build(&[manifest_row("a", "v0"), manifest_row("b", "v0")], dir.path())?;
        let tables = vec![table(
            ChartKind::CountPlotter,
            "plot_title,query_name,vars\nGood,a,v0\nBad,a,v0\nBad,b,v0\n",
        )];

        let mut sink = MemorySink::default();
        let report = render_all(&tables, &files, &RenderOptions::default(), &mut sink);

        assert_eq!(report.rendered(), 1);
        let failed: Vec<_> = report.failed().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].title, "Bad");
        match &failed[0].status {
            UnitStatus::Failed { error } => {
                assert!(error.contains("b/v0"));
                assert!(error.contains("b_v0.csv"));
            }
            other => panic!("unexpected status: {:?}", other),
        }

        let (_, _, fig) = &sink.figures[0];
        assert_eq!(fig.data.len(), 1);
        // Latest year dropped
        assert_eq!(fig.data[0].x.len(), 2);
        Ok(())
    }

    #[test]
    fn test_scatter_area_ylabel() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_export(dir.path(), "a_v0.csv", &["2024,4,Tehran,3", "2023,3,Shiraz,2"]);

        let files = FileMap::build(&[manifest_row("a", "v0")], dir.path())?;
        let tables = vec![table(
            ChartKind::ScatterArea,
            "plot_title,query_name,vars,ylabel\nPlain,a,v0,\nLabelled,a,v0,Articles\n",
        )];

        let mut sink = MemorySink::default();
        let report = render_all(&tables, &files, &RenderOptions::default(), &mut sink);
        assert_eq!(report.rendered(), 2);

        let ylabels: Vec<_> = sink
            .figures
            .iter()
            .map(|(_, title, fig)| (title.as_str(), fig.layout.yaxis.title.text.as_str()))
            .collect();
        assert_eq!(ylabels, vec![("Labelled", "Articles"), ("Plain", "Counts")]);
        Ok(())
    }

    #[test]
    fn test_top_k_and_stacked_units() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_export(dir.path(), "a_v0.csv", &["2024,4,Tehran,3", "2023,3,Shiraz,9", "2022,2,Tabriz,1"]);
        write_export(dir.path(), "a_v1.csv", &["2024,1,Tabriz,20"]);

        let files = FileMap::build(&[manifest_row("a", "v0"), manifest_row("a", "v1")], dir.path())?;
        let tables = vec![
            table(ChartKind::TopK, "query_name,vars,what,k\na,v0,AFFILIATION,2\n"),
            table(
                ChartKind::StackedTopK,
                "query1,var1,query2,var2,x_col,k,name2,stack_or_group\na,v0,a,v1,AFFILIATION,2,Articles,group\n",
            ),
        ];

        let mut sink = MemorySink::default();
        let report = render_all(&tables, &files, &RenderOptions::default(), &mut sink);
        assert_eq!(report.rendered(), 2);

        let (kind, title, top) = &sink.figures[0];
        assert_eq!(*kind, ChartKind::TopK);
        assert_eq!(title, "Top 2 by AFFILIATION Count");
        assert_eq!(top.data[0].y, vec![serde_json::json!("Shiraz"), serde_json::json!("Tehran")]);

        let (_, _, stacked) = &sink.figures[1];
        assert_eq!(stacked.layout.barmode, Some("group"));
        assert_eq!(stacked.data[0].name, "a_v0");
        assert_eq!(stacked.data[1].name, "Articles");
        assert_eq!(stacked.data[0].x, vec![serde_json::json!("Tabriz"), serde_json::json!("Shiraz")]);
        Ok(())
    }

    #[test]
    fn test_ratio_group_uses_theme() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_export(dir.path(), "a_v0.csv", &["2023,5,x,1", "2022,2,y,1"]);
        write_export(dir.path(), "a_v1.csv", &["2023,10,x,1", "2022,8,y,1"]);

        let files = FileMap::build(&[manifest_row("a", "v0"), manifest_row("a", "v1")], dir.path())?;
        let tables = vec![table(
            ChartKind::Ratio,
            "plot_title,numerator_query,numerator_vars,denominator_query,denominator_vars,color\n\
             Share,a,v0,a,v1,red\n",
        )];
        let options = RenderOptions {
            theme: Theme::new("plotly_dark"),
            ..Default::default()
        };

        let mut sink = MemorySink::default();
        let report = render_all(&tables, &files, &options, &mut sink);
        assert_eq!(report.rendered(), 1);

        let (_, _, fig) = &sink.figures[0];
        assert_eq!(fig.layout.template.as_str(), "plotly_dark");
        assert_eq!(fig.data[0].name, "a/v0 / a/v1");
        assert_eq!(fig.data[0].y, vec![serde_json::json!(0.25), serde_json::json!(0.5)]);
        Ok(())
    }

    #[test]
    fn test_json_writer_dedups_titles() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut writer = JsonFigureWriter::new(dir.path())?;
        let fig = Figure::new("T", "x", "y", &Theme::default());

        let first = writer.emit(ChartKind::Ratio, "Iran / World", &fig)?;
        let second = writer.emit(ChartKind::Ratio, "Iran / World", &fig)?;
        assert_eq!(first, dir.path().join("ratio").join("Iran_World.json"));
        assert_eq!(second, dir.path().join("ratio").join("Iran_World_2.json"));
        assert!(second.is_file());
        Ok(())
    }
}
