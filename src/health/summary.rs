//! Per-account aggregation: summary counters, grouping tables and the
//! account classifier.

use super::error::PollError;
use super::models::EventRecord;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Outcome of polling one account.
pub type PollResult = Result<Vec<EventRecord>, PollError>;

/// Counters derived from one poll of one account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_events: usize,
    pub active_events: usize,
    pub resolved_events: usize,
    pub services_affected: usize,
    pub regions_affected: usize,
    pub critical_events: usize,
    /// Set only when the poll failed; all counters are then zero.
    pub error_status: Option<PollError>,
    pub last_updated: DateTime<Utc>,
}

impl Summary {
    /// Summarize a poll result.
    pub fn from_poll(poll: &PollResult) -> Self {
        match poll {
            Ok(events) => Self::from_events(events),
            Err(e) => Self::failed(e.clone()),
        }
    }

    /// Summary of a successful poll. An empty slice is the all-clear state.
    pub fn from_events(events: &[EventRecord]) -> Self {
        let active_events = events.iter().filter(|e| e.is_active()).count();
        let services: HashSet<&str> = events.iter().map(|e| e.service.as_str()).collect();
        let regions: HashSet<&str> = events
            .iter()
            .filter(|e| !e.is_global())
            .map(|e| e.region.as_str())
            .collect();

        Self {
            total_events: events.len(),
            active_events,
            resolved_events: events.len() - active_events,
            services_affected: services.len(),
            regions_affected: regions.len(),
            critical_events: events.iter().filter(|e| e.is_critical()).count(),
            error_status: None,
            last_updated: Utc::now(),
        }
    }

    /// Summary of a failed poll.
    pub fn failed(error: PollError) -> Self {
        Self {
            total_events: 0,
            active_events: 0,
            resolved_events: 0,
            services_affected: 0,
            regions_affected: 0,
            critical_events: 0,
            error_status: Some(error),
            last_updated: Utc::now(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error_status.is_some()
    }

    /// True for a successful poll that found nothing.
    pub fn is_all_clear(&self) -> bool {
        self.error_status.is_none() && self.total_events == 0
    }
}

/// Total and critical counts for one group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GroupCounts {
    pub total_events: usize,
    pub critical_events: usize,
}

/// Events counted by service and by region.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventGroups {
    pub by_service: BTreeMap<String, GroupCounts>,
    pub by_region: BTreeMap<String, GroupCounts>,
}

impl EventGroups {
    pub fn from_events(events: &[EventRecord]) -> Self {
        let mut groups = Self::default();
        for event in events {
            bump(groups.by_service.entry(event.service.clone()).or_default(), event);
            bump(groups.by_region.entry(event.region.clone()).or_default(), event);
        }
        groups
    }

    /// Grouping of a poll result; a failed poll groups nothing.
    pub fn from_poll(poll: &PollResult) -> Self {
        match poll {
            Ok(events) => Self::from_events(events),
            Err(_) => Self::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_service.is_empty() && self.by_region.is_empty()
    }
}

fn bump(counts: &mut GroupCounts, event: &EventRecord) {
    counts.total_events += 1;
    if event.is_critical() {
        counts.critical_events += 1;
    }
}

/// Health classification of a single account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountStatus {
    Healthy,
    Warning,
    Critical,
    Error,
}

impl AccountStatus {
    pub const ALL: [AccountStatus; 4] = [
        AccountStatus::Healthy,
        AccountStatus::Warning,
        AccountStatus::Critical,
        AccountStatus::Error,
    ];

    /// Case-insensitive parse of a status name.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
    }

    /// Classify a summary. An error overrides everything; critical wins
    /// over warning.
    pub fn classify(summary: &Summary) -> Self {
        if summary.is_error() {
            Self::Error
        } else if summary.critical_events > 0 {
            Self::Critical
        } else if summary.active_events > 0 {
            Self::Warning
        } else {
            Self::Healthy
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "HEALTHY",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
            Self::Error => "ERROR",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Healthy => "✅",
            Self::Warning => "⚠️",
            Self::Critical => "🚨",
            Self::Error => "❌",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
