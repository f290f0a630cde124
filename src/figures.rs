//! Chart data preparation and figure documents.
//!
//! Figures are emitted as Plotly-compatible JSON (`{"data": [...],
//! "layout": {...}}`); drawing them is left to whatever renders that format.

use crate::charts::BarMode;
use crate::scopus::{FacetCount, YearCount};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Plot template name carried into every figure layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Theme(String);

impl Theme {
    pub const DEFAULT: &'static str = "ggplot2";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::new(Self::DEFAULT)
    }
}

/// Keep the years `[latest - max_years + 1, latest - ignore_recent]`.
///
/// `latest` is the most recent year present in the series; the current
/// year is usually incomplete, hence `ignore_recent`.
pub fn year_window(counts: &[YearCount], ignore_recent: u32, max_years: Option<u32>) -> Vec<YearCount> {
    let Some(latest) = counts.iter().map(|c| c.year).max() else {
        return Vec::new();
    };
    let span = |n: u32| i32::try_from(n).unwrap_or(i32::MAX);
    let upper = latest.saturating_sub(span(ignore_recent));
    let lower = max_years
        .map(|n| latest.saturating_sub(span(n)).saturating_add(1))
        .unwrap_or(i32::MIN);

    let mut kept: Vec<YearCount> = counts
        .iter()
        .copied()
        .filter(|c| c.year <= upper && c.year >= lower)
        .collect();
    kept.sort_by_key(|c| c.year);
    kept
}

/// Largest `k` facet values by count; ties keep export order
pub fn top_k(facets: &[FacetCount], k: usize) -> Vec<FacetCount> {
    let mut sorted = facets.to_vec();
    sorted.sort_by(|a, b| b.count.total_cmp(&a.count));
    sorted.truncate(k);
    sorted
}

/// Numerator / denominator per year present in both series.
///
/// Years with a zero denominator are left out.
pub fn ratio_series(numerator: &[YearCount], denominator: &[YearCount]) -> Vec<(i32, f64)> {
    let den: HashMap<i32, u64> = denominator.iter().map(|c| (c.year, c.count)).collect();
    let mut points: Vec<(i32, f64)> = numerator
        .iter()
        .filter_map(|n| {
            let d = *den.get(&n.year)?;
            (d != 0).then(|| (n.year, n.count as f64 / d as f64))
        })
        .collect();
    points.sort_by_key(|(year, _)| *year);
    points
}

/// Categories and per-dataset counts for a two-dataset top-k chart.
///
/// The categories are the `k` labels with the largest combined count.
pub fn stacked_top_k(first: &[FacetCount], second: &[FacetCount], k: usize) -> (Vec<String>, Vec<f64>, Vec<f64>) {
    fn totals(facets: &[FacetCount]) -> BTreeMap<&str, f64> {
        let mut map = BTreeMap::new();
        for f in facets {
            *map.entry(f.label.as_str()).or_insert(0.0) += f.count;
        }
        map
    }

    let a = totals(first);
    let b = totals(second);

    let mut combined: Vec<(&str, f64)> = a
        .keys()
        .chain(b.keys())
        .copied()
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .map(|label| {
            let total = a.get(label).copied().unwrap_or(0.0) + b.get(label).copied().unwrap_or(0.0);
            (label, total)
        })
        .collect();
    combined.sort_by(|x, y| y.1.total_cmp(&x.1).then_with(|| x.0.cmp(y.0)));
    combined.truncate(k);

    let labels: Vec<String> = combined.iter().map(|(l, _)| l.to_string()).collect();
    let first_counts = combined.iter().map(|(l, _)| a.get(l).copied().unwrap_or(0.0)).collect();
    let second_counts = combined.iter().map(|(l, _)| b.get(l).copied().unwrap_or(0.0)).collect();
    (labels, first_counts, second_counts)
}

#[derive(Debug, Clone, Serialize)]
pub struct Text {
    pub text: String,
}

impl From<&str> for Text {
    fn from(s: &str) -> Self {
        Self { text: s.to_string() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Axis {
    pub title: Text,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dtick: Option<u32>,
}

impl Axis {
    pub fn titled(title: &str) -> Self {
        Self {
            title: title.into(),
            dtick: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Line {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub dash: String,
}

/// One trace of a figure
#[derive(Debug, Clone, Serialize)]
pub struct Trace {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: String,
    pub x: Vec<Value>,
    pub y: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orientation: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<Line>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hovertemplate: Option<String>,
}

impl Trace {
    fn new(kind: &'static str, name: &str, x: Vec<Value>, y: Vec<Value>) -> Self {
        Self {
            kind,
            name: name.to_string(),
            x,
            y,
            mode: None,
            fill: None,
            opacity: None,
            orientation: None,
            line: None,
            hovertemplate: None,
        }
    }

    /// Filled area under a yearly series
    pub fn area(name: &str, counts: &[YearCount]) -> Self {
        let (x, y) = year_axes(counts);
        Self {
            mode: Some("lines"),
            fill: Some("tozeroy"),
            opacity: Some(0.1),
            ..Self::new("scatter", name, x, y)
        }
    }

    /// Line with markers over a yearly series
    pub fn lines(name: &str, counts: &[YearCount]) -> Self {
        let (x, y) = year_axes(counts);
        Self {
            mode: Some("lines+markers"),
            hovertemplate: Some(format!(
                "<b>{}</b><br>Year: %{{x}}<br>Count: %{{y}}<extra></extra>",
                name
            )),
            ..Self::new("scatter", name, x, y)
        }
    }

    /// Ratio line with optional styling
    pub fn ratio(name: &str, points: &[(i32, f64)], color: Option<&str>, dash: Option<&str>) -> Self {
        let x = points.iter().map(|(year, _)| Value::from(*year)).collect();
        let y = points.iter().map(|(_, r)| Value::from(*r)).collect();
        Self {
            mode: Some("lines+markers"),
            line: Some(Line {
                color: color.map(str::to_string),
                dash: dash.unwrap_or("solid").to_string(),
            }),
            ..Self::new("scatter", name, x, y)
        }
    }

    /// Horizontal bar of facet counts
    pub fn horizontal_bar(name: &str, facets: &[FacetCount]) -> Self {
        let x = facets.iter().map(|f| Value::from(f.count)).collect();
        let y = facets.iter().map(|f| Value::from(f.label.as_str())).collect();
        Self {
            orientation: Some("h"),
            ..Self::new("bar", name, x, y)
        }
    }

    /// Vertical bar over named categories
    pub fn bar(name: &str, labels: &[String], counts: &[f64]) -> Self {
        let x = labels.iter().map(|l| Value::from(l.as_str())).collect();
        let y = counts.iter().map(|c| Value::from(*c)).collect();
        Self::new("bar", name, x, y)
    }
}

fn year_axes(counts: &[YearCount]) -> (Vec<Value>, Vec<Value>) {
    let x = counts.iter().map(|c| Value::from(c.year)).collect();
    let y = counts.iter().map(|c| Value::from(c.count)).collect();
    (x, y)
}

#[derive(Debug, Clone, Serialize)]
pub struct Layout {
    pub title: Text,
    pub xaxis: Axis,
    pub yaxis: Axis,
    pub template: Theme,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barmode: Option<&'static str>,
}

/// A complete figure document
#[derive(Debug, Clone, Serialize)]
pub struct Figure {
    pub data: Vec<Trace>,
    pub layout: Layout,
}

impl Figure {
    pub fn new(title: &str, xaxis: &str, yaxis: &str, theme: &Theme) -> Self {
        Self {
            data: Vec::new(),
            layout: Layout {
                title: title.into(),
                xaxis: Axis::titled(xaxis),
                yaxis: Axis::titled(yaxis),
                template: theme.clone(),
                barmode: None,
            },
        }
    }

    pub fn with_trace(mut self, trace: Trace) -> Self {
        self.data.push(trace);
        self
    }

    pub fn with_barmode(mut self, mode: BarMode) -> Self {
        self.layout.barmode = Some(mode.as_str());
        self
    }

    pub fn push(&mut self, trace: Trace) {
        self.data.push(trace);
    }
}
