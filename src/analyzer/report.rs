use crate::analyzer::discover_tables;
use crate::analyzer::metrics::{
    MetricUnit, Summary, WeeklyPoint, grouped_ratio, summarize, weekly_series,
};
use crate::store::TableStore;
use crate::store::sheet::table_from_sheet;
use crate::store::table::Table;
use crate::store::value::{Record, Value};
use crate::store::workbook::{raw_table, read_workbook};
use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub date: String,
    pub generated_at: String,
    pub data_dir: String,
    pub sections: Vec<TableSection>,
}

/// One sheet of one discovered file. `sheet` is `None` when the file itself
/// could not be read.
#[derive(Debug, Clone, Serialize)]
pub struct TableSection {
    pub file: String,
    pub sheet: Option<String>,
    pub table_id: Option<String>,
    #[serde(flatten)]
    pub outcome: SectionOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SectionOutcome {
    Ready(SectionReport),
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionReport {
    pub row_count: usize,
    pub summary: Summary,
    pub weekly: Option<Vec<WeeklyPoint>>,
    pub project_ratio: Option<BTreeMap<String, f64>>,
    pub preview: Preview,
    pub maintenance: Option<Preview>,
    pub visits: Option<Preview>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preview {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Preview {
    fn of(columns: &[String], rows: &[Record]) -> Self {
        Self {
            columns: columns.to_vec(),
            rows: rows.iter().map(|row| row.values().to_vec()).collect(),
        }
    }
}

#[derive(Debug)]
pub struct SavedReport {
    pub markdown_path: PathBuf,
    pub json_path: PathBuf,
}

/// Reads every sheet of every spreadsheet under the store root. A file or
/// sheet that fails only marks its own section as failed.
pub fn build_dashboard(store: &TableStore, preview_rows: usize) -> Result<Dashboard> {
    let now = Local::now();
    let files = discover_tables(store.root())?;
    let mut sections = Vec::new();

    for path in files {
        let file = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let sheets = match read_workbook(&path) {
            Ok(sheets) => sheets,
            Err(error) => {
                warn!(file = %file, error = %error, "skipping unreadable workbook");
                sections.push(TableSection {
                    file,
                    sheet: None,
                    table_id: None,
                    outcome: SectionOutcome::Failed {
                        error: error.to_string(),
                    },
                });
                continue;
            }
        };

        for sheet in sheets {
            let schema = store.catalog().find_location(&file, &sheet.name);
            let loaded = match schema {
                Some(schema) => table_from_sheet(schema, &sheet).map_err(|error| error.to_string()),
                None => Ok(raw_table(&sheet)),
            };

            let outcome = match loaded {
                Ok(table) => SectionOutcome::Ready(section_report(&table, preview_rows)),
                Err(error) => {
                    warn!(file = %file, sheet = %sheet.name, error = %error, "skipping malformed sheet");
                    SectionOutcome::Failed { error }
                }
            };

            sections.push(TableSection {
                file: file.clone(),
                sheet: Some(sheet.name.clone()),
                table_id: schema.map(|schema| schema.id.clone()),
                outcome,
            });
        }
    }

    Ok(Dashboard {
        date: now.format("%Y-%m-%d").to_string(),
        generated_at: now.to_rfc3339(),
        data_dir: store.root().display().to_string(),
        sections,
    })
}

pub fn section_report(table: &Table, preview_rows: usize) -> SectionReport {
    let maintenance = prefixed_projection(table, "Maintenance_", preview_rows);
    let visits = prefixed_projection(table, "Visite_", preview_rows);

    SectionReport {
        row_count: table.len(),
        summary: summarize(table),
        weekly: weekly_series(table),
        project_ratio: grouped_ratio(table, "Project", "Réaliser", "Objecti Semaine"),
        preview: Preview::of(table.columns(), table.head(preview_rows)),
        maintenance,
        visits,
    }
}

/// The columns starting with `prefix`, without rows that are empty across all
/// of them.
fn prefixed_projection(table: &Table, prefix: &str, limit: usize) -> Option<Preview> {
    let columns = table
        .columns()
        .iter()
        .filter(|column| column.starts_with(prefix))
        .cloned()
        .collect::<Vec<_>>();
    if columns.is_empty() {
        return None;
    }

    let projected = table.project(&columns);
    let rows = projected
        .rows()
        .iter()
        .filter(|row| !row.is_blank())
        .take(limit)
        .cloned()
        .collect::<Vec<_>>();
    Some(Preview::of(projected.columns(), &rows))
}

pub fn render_markdown(dashboard: &Dashboard) -> String {
    if dashboard.sections.is_empty() {
        return format!(
            "# Plant Dashboard - {}\n\nData directory: `{}`\n\n- No data: no spreadsheet files were found.\n",
            dashboard.date, dashboard.data_dir
        );
    }

    let sections = dashboard
        .sections
        .iter()
        .map(render_section)
        .collect::<Vec<_>>()
        .join("\n");

    let failed = dashboard
        .sections
        .iter()
        .filter(|section| matches!(section.outcome, SectionOutcome::Failed { .. }))
        .count();

    format!(
        "# Plant Dashboard - {}\n\nData directory: `{}`\n\n- Tables read: {}\n- Tables failed: {}\n\n{}",
        dashboard.date,
        dashboard.data_dir,
        dashboard.sections.len() - failed,
        failed,
        sections
    )
}

fn render_section(section: &TableSection) -> String {
    let title = match &section.sheet {
        Some(sheet) => format!("## {} / {}", section.file, sheet),
        None => format!("## {}", section.file),
    };

    let report = match &section.outcome {
        SectionOutcome::Failed { error } => return format!("{title}\n\n- Error: {error}\n"),
        SectionOutcome::Ready(report) => report,
    };

    let mut parts = vec![title, format!("- Rows: {}", report.row_count)];

    if !report.summary.is_empty() {
        let metrics = report
            .summary
            .metrics()
            .iter()
            .map(|metric| match metric.unit {
                MetricUnit::Percent => {
                    format!("- {}: {:.2}%", metric.label, metric.value)
                }
                _ => format!("- {}: {}", metric.label, metric.value),
            })
            .collect::<Vec<_>>()
            .join("\n");
        parts.push(format!("### Summary\n{metrics}"));
    }

    if let Some(weekly) = &report.weekly {
        let header = weekly.iter().map(|point| point.day.as_str()).collect::<Vec<_>>();
        let totals = weekly
            .iter()
            .map(|point| point.total.to_string())
            .collect::<Vec<_>>();
        parts.push(format!(
            "### Weekly production\n{}",
            markdown_table(&header, &[totals])
        ));
    }

    if let Some(ratios) = report.project_ratio.as_ref().filter(|ratios| !ratios.is_empty()) {
        let rows = ratios
            .iter()
            .map(|(project, ratio)| vec![project.clone(), format!("{ratio:.2}%")])
            .collect::<Vec<_>>();
        parts.push(format!(
            "### Realisation by project\n{}",
            markdown_table(&["Project", "%"], &rows)
        ));
    }

    parts.push(format!("### Preview\n{}", render_preview(&report.preview)));
    if let Some(maintenance) = &report.maintenance {
        parts.push(format!("### Maintenance\n{}", render_preview(maintenance)));
    }
    if let Some(visits) = &report.visits {
        parts.push(format!("### Visits\n{}", render_preview(visits)));
    }

    parts.join("\n\n") + "\n"
}

fn render_preview(preview: &Preview) -> String {
    if preview.rows.is_empty() {
        return "- No rows".to_string();
    }
    let header = preview.columns.iter().map(String::as_str).collect::<Vec<_>>();
    let rows = preview
        .rows
        .iter()
        .map(|row| row.iter().map(Value::to_string).collect())
        .collect::<Vec<_>>();
    markdown_table(&header, &rows)
}

fn markdown_table(header: &[&str], rows: &[Vec<String>]) -> String {
    let line = |cells: Vec<String>| format!("| {} |", cells.join(" | "));

    std::iter::once(line(header.iter().map(|cell| escape_cell(cell)).collect()))
        .chain(std::iter::once(line(vec!["---".to_string(); header.len()])))
        .chain(
            rows.iter()
                .map(|row| line(row.iter().map(|cell| escape_cell(cell)).collect())),
        )
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape_cell(cell: &str) -> String {
    cell.replace('|', "\\|").replace('\n', " ")
}

pub fn save_report_files(dashboard: &Dashboard, report_dir: &Path) -> Result<SavedReport> {
    fs::create_dir_all(report_dir).with_context(|| {
        format!(
            "Failed to create report directory: {}",
            report_dir.display()
        )
    })?;

    let markdown_path = report_dir.join(format!("dashboard-{}.md", dashboard.date));
    let json_path = report_dir.join(format!("dashboard-{}.json", dashboard.date));

    fs::write(&markdown_path, render_markdown(dashboard)).with_context(|| {
        format!(
            "Failed to write Markdown report: {}",
            markdown_path.display()
        )
    })?;

    let json_content =
        serde_json::to_string_pretty(dashboard).context("Failed to serialize dashboard JSON")?;
    fs::write(&json_path, json_content)
        .with_context(|| format!("Failed to write JSON report: {}", json_path.display()))?;

    Ok(SavedReport {
        markdown_path,
        json_path,
    })
}
