//! Run configuration.
//!
//! [`Settings`] come from the optional `global_settings` sheet; command-line
//! [`Overrides`] win over them. [`Project`] ties a loaded workbook to its
//! queries, variants, chart tables and manifest.

use crate::charts::{load_chart_tables, ChartTable};
use crate::collector::Manifest;
use crate::error::{Result, TrendsError};
use crate::figures::Theme;
use crate::file_map::FileMap;
use crate::query::{QueryBook, VariantPolicy, VariantTable};
use crate::render::RenderOptions;
use crate::workbook::{Workbook, QUERY_SHEET, SETTINGS_SHEET, VARIANT_SHEET};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

/// Values of the `global_settings` sheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Plot template (`template` row)
    pub theme: Option<String>,
    pub ignore_current_year: u32,
    pub past_what_years: u32,
    pub unknown_variants: VariantPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: None,
            ignore_current_year: 1,
            past_what_years: 30,
            unknown_variants: VariantPolicy::Strict,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SettingRow {
    setting: String,
    value: Option<String>,
}

fn parse_count(setting: &str, value: &str) -> Result<u32> {
    value
        .parse()
        .map_err(|_| TrendsError::Config(format!("Setting '{}' must be a whole number, got '{}'", setting, value)))
}

impl Settings {
    /// Read `global_settings` if present, defaults otherwise
    pub fn from_workbook(workbook: &Workbook) -> Result<Self> {
        let mut settings = Self::default();
        let Some(sheet) = workbook.sheet(SETTINGS_SHEET) else {
            return Ok(settings);
        };
        sheet.require_columns(&["setting", "value"])?;

        for row in sheet.rows::<SettingRow>()? {
            let Some(value) = row.value else {
                continue;
            };
            match row.setting.as_str() {
                "template" => settings.theme = Some(value),
                "ignore_current_year" => settings.ignore_current_year = parse_count(&row.setting, &value)?,
                "past_what_years" => settings.past_what_years = parse_count(&row.setting, &value)?,
                "unknown_variants" => settings.unknown_variants = value.parse()?,
                other => debug!(setting = other, "Ignoring unknown setting"),
            }
        }
        Ok(settings)
    }
}

/// Command-line values that take precedence over the workbook
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub theme: Option<String>,
    pub lenient_variants: bool,
}

/// A loaded configuration workbook and everything derived from it
#[derive(Debug, Clone)]
pub struct Project {
    pub settings: Settings,
    pub queries: QueryBook,
    pub variants: VariantTable,
    pub tables: Vec<ChartTable>,
    pub manifest: Manifest,
    theme: Theme,
}

impl Project {
    /// Load a configuration directory
    pub fn load(config_dir: impl AsRef<Path>, overrides: &Overrides) -> Result<Self> {
        let workbook = Workbook::load_dir(config_dir)?;
        Self::from_workbook(&workbook, overrides)
    }

    /// Decode a workbook, collect requirements and build the manifest
    pub fn from_workbook(workbook: &Workbook, overrides: &Overrides) -> Result<Self> {
        let settings = Settings::from_workbook(workbook)?;
        let queries = QueryBook::from_sheet(workbook.require(QUERY_SHEET)?)?;

        let policy = if overrides.lenient_variants {
            VariantPolicy::Lenient
        } else {
            settings.unknown_variants
        };
        let variants = match workbook.sheet(VARIANT_SHEET) {
            Some(sheet) => VariantTable::from_sheet(sheet)?,
            None => VariantTable::builtin(),
        }
        .with_policy(policy);

        let tables = load_chart_tables(workbook)?;
        let manifest = Manifest::from_tables(&tables, &queries, &variants)?;

        let theme = overrides
            .theme
            .clone()
            .or_else(|| settings.theme.clone())
            .map(Theme::new)
            .unwrap_or_default();

        info!(
            queries = queries.len(),
            chart_sheets = tables.len(),
            requirements = manifest.len(),
            theme = theme.as_str(),
            "Project loaded"
        );

        Ok(Self {
            settings,
            queries,
            variants,
            tables,
            manifest,
            theme,
        })
    }

    /// File map over `files_dir` for this project's manifest
    pub fn file_map(&self, files_dir: impl AsRef<Path>) -> Result<FileMap> {
        FileMap::build(self.manifest.rows(), files_dir)
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            theme: self.theme.clone(),
            ignore_current_year: self.settings.ignore_current_year,
            past_what_years: self.settings.past_what_years,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workbook::Sheet;

    fn workbook(sheets: &[(&str, &str)]) -> Workbook {
        let mut wb = Workbook::default();
        for (name, data) in sheets {
            wb.insert(Sheet::from_reader(name, data.as_bytes()).expect("Failed to read sheet"));
        }
        wb
    }

    #[test]
    fn test_settings_defaults_without_sheet() -> Result<()> {
        assert_eq!(Settings::from_workbook(&Workbook::default())?, Settings::default());
        Ok(())
    }

    #[test]
    fn test_settings_from_sheet() -> Result<()> {
        let wb = workbook(&[(
            "global_settings",
            "setting,value\ntemplate,plotly_white\npast_what_years,10\nunknown_variants,lenient\ncolor,blue\n",
        )]);
        let settings = Settings::from_workbook(&wb)?;
        assert_eq!(settings.theme.as_deref(), Some("plotly_white"));
        assert_eq!(settings.past_what_years, 10);
        assert_eq!(settings.ignore_current_year, 1);
        assert_eq!(settings.unknown_variants, VariantPolicy::Lenient);
        Ok(())
    }

    #[test]
    fn test_settings_reject_bad_number() {
        let wb = workbook(&[("global_settings", "setting,value\npast_what_years,ten\n")]);
        assert!(matches!(Settings::from_workbook(&wb), Err(TrendsError::Config(_))));
    }

    #[test]
    fn test_project_theme_precedence() -> Result<()> {
        let wb = workbook(&[
            ("query_list", "query_name,query_string\nimmuno,TITLE-ABS-KEY(immuno*)\n"),
            ("count_plotter", "plot_title,query_name,vars\nT,immuno,iran_ar\n"),
            ("global_settings", "setting,value\ntemplate,seaborn\n"),
        ]);

        let from_sheet = Project::from_workbook(&wb, &Overrides::default())?;
        assert_eq!(from_sheet.render_options().theme.as_str(), "seaborn");
        assert_eq!(from_sheet.manifest.len(), 1);

        let overridden = Project::from_workbook(
            &wb,
            &Overrides {
                theme: Some("plotly_dark".to_string()),
                lenient_variants: false,
            },
        )?;
        assert_eq!(overridden.render_options().theme.as_str(), "plotly_dark");
        Ok(())
    }

    #[test]
    fn test_project_requires_query_list() {
        let wb = workbook(&[("count_plotter", "plot_title,query_name,vars\nT,immuno,iran_ar\n")]);
        assert!(matches!(
            Project::from_workbook(&wb, &Overrides::default()),
            Err(TrendsError::MissingSheet(_))
        ));
    }

    #[test]
    fn test_project_lenient_override() -> Result<()> {
        let wb = workbook(&[
            ("query_list", "query_name,query_string\nq,A\n"),
            ("count_plotter", "plot_title,query_name,vars\nT,q,mars_ar\n"),
        ]);
        assert!(Project::from_workbook(&wb, &Overrides::default()).is_err());

        let project = Project::from_workbook(
            &wb,
            &Overrides {
                theme: None,
                lenient_variants: true,
            },
        )?;
        assert_eq!(project.manifest.rows()[0].output_file, "q_mars_ar.csv");
        Ok(())
    }
}
