//! Fleet report output: the console table and the JSON audit file.

use crate::health::FleetReport;

use chrono::{DateTime, Local};
use comfy_table::{modifiers, presets, CellAlignment, Table};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Report writer errors.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// `health_report_YYYYMMDD_HHMMSS.json`
pub fn report_file_name(time: DateTime<Local>) -> String {
    format!("health_report_{}.json", time.format("%Y%m%d_%H%M%S"))
}

/// Writes fleet reports into a directory. Files are never read back.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write(&self, report: &FleetReport) -> Result<PathBuf, ReportError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(report_file_name(Local::now()));
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(&path, json)?;
        tracing::info!("Saved fleet report to {}", path.display());
        Ok(path)
    }
}

// new_table builds a comfy_table with UTF8 styling.
fn new_table(headers: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .apply_modifier(modifiers::UTF8_ROUND_CORNERS)
        .apply_modifier(modifiers::UTF8_SOLID_INNER_BORDERS);

    table.set_header(headers);
    table
}

/// Console rendering of a fleet report: totals, then one row per account.
pub fn render_console(report: &FleetReport) -> String {
    let mut table = new_table(vec![
        "Account", "Status", "Critical", "Active", "Total", "Services", "Regions", "Error",
    ]);
    for index in 2..7 {
        if let Some(column) = table.column_mut(index) {
            column.set_cell_alignment(CellAlignment::Right);
        }
    }

    for entry in &report.account_summary {
        let status = entry.status.as_str().to_string();
        match &entry.error {
            Some(error) => table.add_row(vec![
                entry.account.clone(),
                status,
                "-".to_string(),
                "-".to_string(),
                "-".to_string(),
                "-".to_string(),
                "-".to_string(),
                error.clone(),
            ]),
            None => table.add_row(vec![
                entry.account.clone(),
                status,
                entry.critical_events.to_string(),
                entry.active_events.to_string(),
                entry.total_events.to_string(),
                entry.services_affected.to_string(),
                entry.regions_affected.to_string(),
                String::new(),
            ]),
        };
    }

    format!(
        "Multi-account health report\n\
         Accounts: {} ({} healthy, {} warning, {} critical, {} error)\n\
         Events:   {} total, {} active, {} critical\n\
         Overall:  {} {}\n\
         {}\n\
         Checked at {}\n",
        report.total_accounts,
        report.healthy_accounts,
        report.warning_accounts,
        report.critical_accounts,
        report.error_accounts,
        report.total_events,
        report.total_active_events,
        report.total_critical_events,
        report.overall_status.emoji(),
        report.overall_status,
        table,
        report.check_time.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
    )
}
