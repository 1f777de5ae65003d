//! Fleet-wide consolidation of per-account summaries.

use super::summary::{AccountStatus, Summary};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Overall status of the fleet. Account errors escalate to `Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FleetStatus {
    Healthy,
    Warning,
    Critical,
}

impl FleetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "HEALTHY",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Healthy => "✅",
            Self::Warning => "⚠️",
            Self::Critical => "🚨",
        }
    }
}

impl fmt::Display for FleetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the fleet report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountEntry {
    pub account: String,
    pub status: AccountStatus,
    pub critical_events: usize,
    pub active_events: usize,
    pub total_events: usize,
    pub services_affected: usize,
    pub regions_affected: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Consolidated view over every monitored account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FleetReport {
    pub check_time: DateTime<Utc>,
    pub total_accounts: usize,
    pub healthy_accounts: usize,
    pub warning_accounts: usize,
    pub critical_accounts: usize,
    pub error_accounts: usize,
    /// Sums over non-error accounts only.
    pub total_events: usize,
    pub total_critical_events: usize,
    pub total_active_events: usize,
    /// In input order.
    pub account_summary: Vec<AccountEntry>,
    pub overall_status: FleetStatus,
}

impl FleetReport {
    /// Consolidate summaries given in configured account order.
    pub fn consolidate<'a, I>(accounts: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a Summary)>,
    {
        let mut report = Self {
            check_time: Utc::now(),
            total_accounts: 0,
            healthy_accounts: 0,
            warning_accounts: 0,
            critical_accounts: 0,
            error_accounts: 0,
            total_events: 0,
            total_critical_events: 0,
            total_active_events: 0,
            account_summary: Vec::new(),
            overall_status: FleetStatus::Healthy,
        };

        for (name, summary) in accounts {
            report.total_accounts += 1;
            let status = AccountStatus::classify(summary);

            match status {
                AccountStatus::Healthy => report.healthy_accounts += 1,
                AccountStatus::Warning => report.warning_accounts += 1,
                AccountStatus::Critical => report.critical_accounts += 1,
                AccountStatus::Error => report.error_accounts += 1,
            }

            if status != AccountStatus::Error {
                report.total_events += summary.total_events;
                report.total_critical_events += summary.critical_events;
                report.total_active_events += summary.active_events;
            }

            report.account_summary.push(AccountEntry {
                account: name.to_string(),
                status,
                critical_events: summary.critical_events,
                active_events: summary.active_events,
                total_events: summary.total_events,
                services_affected: summary.services_affected,
                regions_affected: summary.regions_affected,
                error: summary.error_status.as_ref().map(|e| e.to_string()),
            });
        }

        report.overall_status = overall_status(
            report.critical_accounts,
            report.warning_accounts,
            report.error_accounts,
        );
        report
    }
}

/// Any error or critical account makes the fleet critical.
pub fn overall_status(critical: usize, warning: usize, error: usize) -> FleetStatus {
    if error > 0 || critical > 0 {
        FleetStatus::Critical
    } else if warning > 0 {
        FleetStatus::Warning
    } else {
        FleetStatus::Healthy
    }
}
