//! HTTP request handlers.

use super::AppState;
use crate::config::LookbackWindow;
use crate::health::{
    AccountStatus, EventCategory, EventGroups, EventRecord, FleetReport, GroupCounts, Summary,
};
use crate::html::{escape, format_time, truncate};
use crate::provider::AccountHealth;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Templates (simple string replacement)
// ============================================================================

const LAYOUT_TEMPLATE: &str = include_str!("templates/layout.html");
const DASHBOARD_TEMPLATE: &str = include_str!("templates/dashboard.html");
const ACCOUNT_TEMPLATE: &str = include_str!("templates/account.html");
const SETUP_TEMPLATE: &str = include_str!("templates/setup.html");

const LIST_DESCRIPTION_CHARS: usize = 120;

/// Period used by the auto-refresh toggle.
const AUTO_REFRESH_SECS: u32 = 60;
const MIN_REFRESH_SECS: u32 = 10;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub days: Option<u32>,
    /// Include resolved events in the account event list.
    #[serde(default)]
    pub resolved: Option<bool>,
    /// Include scheduled changes in the account event list.
    #[serde(default)]
    pub scheduled: Option<bool>,
    /// Comma-separated account statuses shown on the fleet page.
    #[serde(default)]
    pub status: Option<String>,
    /// Auto-refresh period in seconds; 0 turns it off.
    #[serde(default)]
    pub refresh: Option<u32>,
}

/// Validated page options. Filters only change what is listed; summaries
/// and metrics always cover every event and account.
#[derive(Debug, Clone, PartialEq)]
pub struct PageOptions {
    pub days: LookbackWindow,
    pub include_resolved: bool,
    pub include_scheduled: bool,
    pub statuses: Vec<AccountStatus>,
    pub refresh: Option<u32>,
}

impl PageOptions {
    pub fn from_query(default_days: LookbackWindow, query: &PageQuery) -> Result<Self, String> {
        let days = match query.days {
            None => default_days,
            Some(days) => LookbackWindow::try_from(days).map_err(|e| e.to_string())?,
        };

        let statuses = match query.status.as_deref() {
            None => AccountStatus::ALL.to_vec(),
            Some(list) => {
                let mut statuses = Vec::new();
                for name in list.split(',').filter(|n| !n.trim().is_empty()) {
                    let status = AccountStatus::parse(name)
                        .ok_or_else(|| format!("unknown account status {:?}", name))?;
                    if !statuses.contains(&status) {
                        statuses.push(status);
                    }
                }
                statuses
            }
        };

        Ok(Self {
            days,
            include_resolved: query.resolved.unwrap_or(false),
            include_scheduled: query.scheduled.unwrap_or(true),
            statuses,
            refresh: query
                .refresh
                .filter(|secs| *secs > 0)
                .map(|secs| secs.max(MIN_REFRESH_SECS)),
        })
    }

    pub fn shows_event(&self, event: &EventRecord) -> bool {
        (self.include_resolved || event.is_active())
            && (self.include_scheduled || event.category != EventCategory::ScheduledChange)
    }

    pub fn shows_status(&self, status: AccountStatus) -> bool {
        self.statuses.contains(&status)
    }

    /// Query string reproducing these options; defaults are left out.
    pub fn query_string(&self) -> String {
        let mut params = vec![format!("days={}", self.days.days())];
        if self.include_resolved {
            params.push("resolved=true".to_string());
        }
        if !self.include_scheduled {
            params.push("scheduled=false".to_string());
        }
        if let Some(status) = self.status_param() {
            params.push(format!("status={}", status));
        }
        if let Some(secs) = self.refresh {
            params.push(format!("refresh={}", secs));
        }
        params.join("&")
    }

    /// Hidden inputs carrying every option except `days`.
    fn hidden_inputs(&self) -> String {
        let mut inputs = String::new();
        if self.include_resolved {
            inputs.push_str("<input type=\"hidden\" name=\"resolved\" value=\"true\">");
        }
        if !self.include_scheduled {
            inputs.push_str("<input type=\"hidden\" name=\"scheduled\" value=\"false\">");
        }
        if let Some(status) = self.status_param() {
            inputs.push_str(&format!(
                "<input type=\"hidden\" name=\"status\" value=\"{}\">",
                status
            ));
        }
        if let Some(secs) = self.refresh {
            inputs.push_str(&format!(
                "<input type=\"hidden\" name=\"refresh\" value=\"{}\">",
                secs
            ));
        }
        inputs
    }

    fn status_param(&self) -> Option<String> {
        if AccountStatus::ALL.iter().all(|s| self.statuses.contains(s)) {
            return None;
        }
        Some(
            AccountStatus::ALL
                .iter()
                .filter(|s| self.statuses.contains(s))
                .map(AccountStatus::as_str)
                .collect::<Vec<_>>()
                .join(","),
        )
    }

    fn with(&self, change: impl FnOnce(&mut Self)) -> Self {
        let mut options = self.clone();
        change(&mut options);
        options
    }
}

fn page_options(state: &AppState, query: &PageQuery) -> Result<PageOptions, Response> {
    PageOptions::from_query(state.default_lookback, query)
        .map_err(|e| (StatusCode::BAD_REQUEST, e).into_response())
}

fn lookback(state: &AppState, query: &PageQuery) -> Result<LookbackWindow, Response> {
    page_options(state, query).map(|o| o.days)
}

fn toggle_link(path: &str, label: &str, on: bool, target: &PageOptions) -> String {
    format!(
        "<a class=\"toggle{}\" href=\"{}?{}\">{}: {}</a>",
        if on { " on" } else { "" },
        path,
        target.query_string(),
        label,
        if on { "on" } else { "off" }
    )
}

fn render_page(title: &str, content: &str, path: &str, options: &PageOptions) -> Html<String> {
    let day_options: String = LookbackWindow::ALLOWED
        .iter()
        .map(|d| {
            let selected = if *d == options.days.days() { " selected" } else { "" };
            format!("<option value=\"{}\"{}>{} days</option>", d, selected, d)
        })
        .collect();

    let refresh_meta = options
        .refresh
        .map(|secs| format!("<meta http-equiv=\"refresh\" content=\"{}\">", secs))
        .unwrap_or_default();
    let refresh_toggle = toggle_link(
        path,
        "Auto refresh",
        options.refresh.is_some(),
        &options.with(|o| {
            o.refresh = match o.refresh {
                Some(_) => None,
                None => Some(AUTO_REFRESH_SECS),
            }
        }),
    );

    Html(
        LAYOUT_TEMPLATE
            .replace("{{title}}", &escape(title))
            .replace("{{refresh_meta}}", &refresh_meta)
            .replace("{{day_options}}", &day_options)
            .replace("{{hidden_inputs}}", &options.hidden_inputs())
            .replace("{{refresh_toggle}}", &refresh_toggle)
            .replace("{{content}}", content),
    )
}

// ============================================================================
// Pages
// ============================================================================

pub async fn handle_dashboard(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Response {
    let options = match page_options(&state, &query) {
        Ok(o) => o,
        Err(resp) => return resp,
    };
    let days = options.days;

    if state.poller.registry().is_empty() {
        let content = SETUP_TEMPLATE.replace(
            "{{config_path}}",
            &escape(&state.config.config_path.display().to_string()),
        );
        return render_page("Configuration needed", &content, "/", &options).into_response();
    }

    let fleet = state.fleet(days).await;
    let report = &fleet.report;

    let status_filters: String = AccountStatus::ALL
        .iter()
        .map(|status| {
            let shown = options.shows_status(*status);
            let target = options.with(|o| {
                if shown {
                    o.statuses.retain(|s| s != status);
                } else {
                    o.statuses.push(*status);
                }
            });
            toggle_link("/", status.as_str(), shown, &target)
        })
        .collect::<Vec<_>>()
        .join(" ");

    let shown: Vec<_> = report
        .account_summary
        .iter()
        .filter(|entry| options.shows_status(entry.status))
        .collect();

    let account_rows: String = shown
        .iter()
        .map(|entry| {
            let link = format!(
                "<a href=\"/account/{}?days={}\">{}</a>",
                escape(&entry.account),
                days.days(),
                escape(&entry.account)
            );
            let status = format!(
                "<td class=\"status-{}\">{} {}</td>",
                entry.status,
                entry.status.emoji(),
                entry.status
            );
            match &entry.error {
                Some(error) => format!(
                    "<tr><td>{}</td>{}<td colspan=\"5\" class=\"muted\">{}</td></tr>",
                    link,
                    status,
                    escape(error)
                ),
                None => format!(
                    "<tr><td>{}</td>{}<td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                    link,
                    status,
                    entry.critical_events,
                    entry.active_events,
                    entry.total_events,
                    entry.services_affected,
                    entry.regions_affected
                ),
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    let content = DASHBOARD_TEMPLATE
        .replace("{{overall_status}}", report.overall_status.as_str())
        .replace("{{overall_emoji}}", report.overall_status.emoji())
        .replace("{{check_time}}", &format_time(Some(report.check_time)))
        .replace("{{days}}", &days.days().to_string())
        .replace("{{total_accounts}}", &report.total_accounts.to_string())
        .replace("{{healthy_accounts}}", &report.healthy_accounts.to_string())
        .replace("{{warning_accounts}}", &report.warning_accounts.to_string())
        .replace("{{critical_accounts}}", &report.critical_accounts.to_string())
        .replace("{{error_accounts}}", &report.error_accounts.to_string())
        .replace("{{total_events}}", &report.total_events.to_string())
        .replace("{{total_active_events}}", &report.total_active_events.to_string())
        .replace("{{total_critical_events}}", &report.total_critical_events.to_string())
        .replace("{{status_filters}}", &status_filters)
        .replace("{{shown_accounts}}", &shown.len().to_string())
        .replace("{{account_rows}}", &account_rows);

    render_page("Fleet health", &content, "/", &options).into_response()
}

pub async fn handle_account_page(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    let options = match page_options(&state, &query) {
        Ok(o) => o,
        Err(resp) => return resp,
    };
    let days = options.days;

    let health = match state.account(&name, days).await {
        Some(h) => h,
        None => {
            return (
                StatusCode::NOT_FOUND,
                Html("<h1>Account not found</h1>".to_string()),
            )
                .into_response()
        }
    };

    let summary = &health.summary;
    let status = AccountStatus::classify(summary);
    let error = summary
        .error_status
        .as_ref()
        .map(|e| format!("<div class=\"banner banner-ERROR\">{}</div>", escape(&e.to_string())))
        .unwrap_or_default();

    let group_rows = |groups: &BTreeMap<String, GroupCounts>| {
        groups
            .iter()
            .map(|(key, counts)| {
                format!(
                    "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                    escape(key),
                    counts.total_events,
                    counts.critical_events
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let path = format!("/account/{}", escape(&health.name));
    let event_filters = format!(
        "{} {}",
        toggle_link(
            &path,
            "Resolved",
            options.include_resolved,
            &options.with(|o| o.include_resolved = !o.include_resolved),
        ),
        toggle_link(
            &path,
            "Scheduled changes",
            options.include_scheduled,
            &options.with(|o| o.include_scheduled = !o.include_scheduled),
        ),
    );

    let event_rows = health
        .poll
        .as_deref()
        .unwrap_or_default()
        .iter()
        .filter(|e| options.shows_event(e))
        .map(|e| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape(&e.service),
                escape(&e.event_type_code),
                e.category,
                e.status,
                escape(&e.region),
                format_time(e.start_time),
                e.affected_entity_count,
                escape(&truncate(&e.description, LIST_DESCRIPTION_CHARS))
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let content = ACCOUNT_TEMPLATE
        .replace("{{name}}", &escape(&health.name))
        .replace("{{description}}", &escape(&health.description))
        .replace("{{status}}", status.as_str())
        .replace("{{status_emoji}}", status.emoji())
        .replace("{{last_updated}}", &format_time(Some(summary.last_updated)))
        .replace("{{days}}", &days.days().to_string())
        .replace("{{error}}", &error)
        .replace("{{total_events}}", &summary.total_events.to_string())
        .replace("{{active_events}}", &summary.active_events.to_string())
        .replace("{{resolved_events}}", &summary.resolved_events.to_string())
        .replace("{{critical_events}}", &summary.critical_events.to_string())
        .replace("{{services_affected}}", &summary.services_affected.to_string())
        .replace("{{regions_affected}}", &summary.regions_affected.to_string())
        .replace("{{service_rows}}", &group_rows(&health.groups.by_service))
        .replace("{{region_rows}}", &group_rows(&health.groups.by_region))
        .replace("{{event_filters}}", &event_filters)
        .replace("{{event_rows}}", &event_rows);

    render_page(&format!("Health - {}", health.name), &content, &path, &options).into_response()
}

// ============================================================================
// API
// ============================================================================

#[derive(Debug, Serialize)]
pub struct FleetResponse<'a> {
    pub days: u32,
    pub report: &'a FleetReport,
    pub accounts: &'a [AccountHealth],
}

pub async fn handle_get_fleet(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Response {
    let days = match lookback(&state, &query) {
        Ok(d) => d,
        Err(resp) => return resp,
    };

    let fleet = state.fleet(days).await;
    Json(FleetResponse {
        days: days.days(),
        report: &fleet.report,
        accounts: &fleet.accounts,
    })
    .into_response()
}

#[derive(Debug, Serialize)]
pub struct AccountInfo<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub region: &'a str,
    pub is_default: bool,
}

pub async fn handle_get_accounts(State(state): State<AppState>) -> Response {
    let registry = state.poller.registry();
    let default = registry.default_account().ok().map(|a| a.name.as_str());

    let accounts: Vec<AccountInfo> = registry
        .accounts()
        .iter()
        .map(|a| AccountInfo {
            name: &a.name,
            description: &a.description,
            region: &a.region,
            is_default: Some(a.name.as_str()) == default,
        })
        .collect();

    Json(accounts).into_response()
}

#[derive(Debug, Serialize)]
pub struct AccountDetail<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub status: AccountStatus,
    pub summary: &'a Summary,
    pub groups: &'a EventGroups,
    pub events: &'a [EventRecord],
}

pub async fn handle_get_account(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    let days = match lookback(&state, &query) {
        Ok(d) => d,
        Err(resp) => return resp,
    };

    match state.account(&name, days).await {
        Some(health) => Json(AccountDetail {
            name: &health.name,
            description: &health.description,
            status: AccountStatus::classify(&health.summary),
            summary: &health.summary,
            groups: &health.groups,
            events: health.poll.as_deref().unwrap_or_default(),
        })
        .into_response(),
        None => (StatusCode::NOT_FOUND, "Account not found").into_response(),
    }
}

pub async fn handle_refresh(State(state): State<AppState>) -> impl IntoResponse {
    state.clear_cache().await;
    tracing::info!("Dashboard cache cleared");
    Json(serde_json::json!({ "status": "cleared" }))
}

// ============================================================================
// Static Assets
// ============================================================================

pub async fn handle_favicon() -> impl IntoResponse {
    let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 100 100">
        <circle cx="50" cy="50" r="45" fill="#ff9900"/>
        <path d="M20 55 L38 55 L46 35 L56 72 L64 50 L80 50" stroke="white" stroke-width="6" fill="none"/>
    </svg>"##;

    (
        [(axum::http::header::CONTENT_TYPE, "image/svg+xml")],
        svg
    )
}
