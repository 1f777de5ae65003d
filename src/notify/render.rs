//! Message bodies for the daily, urgent and error alerts.

use super::{Notification, NotifyLevel};
use crate::health::{EventCategory, EventRecord, FleetStatus, PollError};
use crate::html::{escape, format_time, truncate};
use crate::provider::FleetPoll;

use chrono::Local;
use std::fmt::Write;

pub const SUBJECT_ATTENTION: &str = "Health daily check - attention needed";
pub const SUBJECT_ALL_CLEAR: &str = "Health daily check - all clear";
pub const SUBJECT_URGENT: &str = "URGENT: new critical health events";
pub const SUBJECT_ERROR: &str = "Health check error";

const RECENT_EVENTS: usize = 10;
const DESCRIPTION_CHARS: usize = 200;

const STYLE: &str = "<style>\
body { font-family: Arial, sans-serif; line-height: 1.6; }\
.header { background-color: #f8f9fa; padding: 20px; border-radius: 8px; }\
.urgent { background-color: #f8d7da; padding: 20px; border-radius: 8px; border-left: 4px solid #dc3545; }\
table { border-collapse: collapse; }\
td, th { padding: 6px 12px; border-bottom: 1px solid #dee2e6; text-align: left; }\
.critical { background-color: #f8d7da; border-left: 4px solid #dc3545; }\
.warning { background-color: #fff3cd; border-left: 4px solid #ffc107; }\
.event { margin: 10px 0; padding: 10px; border-radius: 4px; }\
</style>";

const RECOMMENDED_ACTIONS: [&str; 4] = [
    "Review the event details in the provider console",
    "Check the affected resources",
    "Notify the owning teams if needed",
    "Execute the recovery plan",
];

fn now() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn page(body: &str) -> String {
    format!("<html><head>{}</head><body>{}</body></html>", STYLE, body)
}

/// Daily check result for the whole fleet.
pub fn daily_report(fleet: &FleetPoll, attention: bool) -> Notification {
    let report = &fleet.report;
    let mut html = String::new();
    let mut text = String::new();

    let _ = write!(
        html,
        "<div class=\"header\"><h1>{} Daily health check</h1>\
         <p><strong>Checked:</strong> {}</p>\
         <p><strong>Fleet status:</strong> {}</p></div>",
        report.overall_status.emoji(),
        now(),
        report.overall_status
    );
    let _ = writeln!(
        text,
        "Fleet status: {} ({} accounts, {} critical events, {} active events)",
        report.overall_status,
        report.total_accounts,
        report.total_critical_events,
        report.total_active_events
    );

    html.push_str(
        "<h2>Accounts</h2><table><tr><th>Account</th><th>Status</th><th>Critical</th>\
         <th>Active</th><th>Total</th><th>Services</th></tr>",
    );
    for entry in &report.account_summary {
        match &entry.error {
            Some(error) => {
                let _ = write!(
                    html,
                    "<tr><td>{}</td><td>{} {}</td><td colspan=\"4\">{}</td></tr>",
                    escape(&entry.account),
                    entry.status.emoji(),
                    entry.status,
                    escape(error)
                );
                let _ = writeln!(text, "- {}: {} ({})", entry.account, entry.status, error);
            }
            None => {
                let _ = write!(
                    html,
                    "<tr><td>{}</td><td>{} {}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                    escape(&entry.account),
                    entry.status.emoji(),
                    entry.status,
                    entry.critical_events,
                    entry.active_events,
                    entry.total_events,
                    entry.services_affected
                );
                let _ = writeln!(
                    text,
                    "- {}: {} ({} critical, {} active, {} total)",
                    entry.account,
                    entry.status,
                    entry.critical_events,
                    entry.active_events,
                    entry.total_events
                );
            }
        }
    }
    html.push_str("</table>");

    if report.total_critical_events > 0 {
        html.push_str(
            "<div class=\"critical\"><h3>Critical issues</h3>\
             <p>Open issues need immediate attention.</p></div>",
        );
    }

    let mut recent: Vec<(&str, &EventRecord)> = fleet
        .accounts
        .iter()
        .filter_map(|a| a.poll.as_ref().ok().map(|events| (a.name.as_str(), events)))
        .flat_map(|(name, events)| events.iter().map(move |e| (name, e)))
        .collect();
    recent.sort_by(|a, b| b.1.start_time.cmp(&a.1.start_time));

    if !recent.is_empty() {
        html.push_str("<h2>Recent events</h2>");
        for (account, event) in recent.into_iter().take(RECENT_EVENTS) {
            let class = if event.category == EventCategory::Issue {
                "critical"
            } else {
                "warning"
            };
            let _ = write!(
                html,
                "<div class=\"event {}\"><strong>{}</strong> - {} ({})<br>\
                 <em>{}</em><br><small>{}</small></div>",
                class,
                escape(&event.service),
                escape(&event.region),
                escape(account),
                escape(&event.event_type_code),
                format_time(event.start_time)
            );
        }
    }

    html.push_str(
        "<hr><p><small>This report was generated automatically. \
         Check the provider console directly if anything looks wrong.</small></p>",
    );

    let (subject, level) = if attention {
        let level = if report.overall_status == FleetStatus::Critical {
            NotifyLevel::Critical
        } else {
            NotifyLevel::Warning
        };
        (SUBJECT_ATTENTION, level)
    } else {
        (SUBJECT_ALL_CLEAR, NotifyLevel::Info)
    };

    Notification::new(subject, page(&html), text, level)
}

/// Open issues that appeared since the previous poll, per account.
pub fn urgent_report(new_events: &[(String, Vec<EventRecord>)]) -> Notification {
    let count: usize = new_events.iter().map(|(_, events)| events.len()).sum();
    let mut html = String::new();
    let mut text = String::new();

    let _ = write!(
        html,
        "<div class=\"urgent\"><h1>&#128680; Urgent health alert</h1>\
         <p><strong>Detected:</strong> {}</p>\
         <p><strong>New critical events:</strong> {}</p></div>\
         <h2>Events needing immediate attention</h2>",
        now(),
        count
    );
    let _ = writeln!(text, "{} new critical events", count);

    for (account, events) in new_events {
        for event in events {
            let description = truncate(&event.description, DESCRIPTION_CHARS);
            let _ = write!(
                html,
                "<div class=\"event critical\"><h3>{} - {} ({})</h3>\
                 <p><strong>Event type:</strong> {}</p>\
                 <p><strong>Status:</strong> {}</p>\
                 <p><strong>Started:</strong> {}</p>\
                 <p><strong>Description:</strong> {}</p></div>",
                escape(&event.service),
                escape(&event.region),
                escape(account),
                escape(&event.event_type_code),
                event.status,
                format_time(event.start_time),
                escape(&description)
            );
            let _ = writeln!(
                text,
                "- [{}] {} {} {}: {}",
                account, event.service, event.region, event.event_type_code, description
            );
        }
    }

    html.push_str("<hr><p><strong>Recommended actions:</strong></p><ul>");
    for action in RECOMMENDED_ACTIONS {
        let _ = write!(html, "<li>{}</li>", action);
    }
    html.push_str("</ul>");

    Notification::new(SUBJECT_URGENT, page(&html), text, NotifyLevel::Critical)
}

/// Accounts whose poll failed.
pub fn error_report(failures: &[(String, PollError)]) -> Notification {
    let mut html = String::new();
    let mut text = String::new();

    let _ = write!(
        html,
        "<h1>&#128293; Health check error</h1><p><strong>Time:</strong> {}</p><ul>",
        now()
    );
    for (account, error) in failures {
        let _ = write!(
            html,
            "<li><strong>{}</strong>: {}</li>",
            escape(account),
            escape(&error.to_string())
        );
        let _ = writeln!(text, "- {}: {}", account, error);
    }
    html.push_str(
        "</ul><p>The health check could not complete. \
         Check the provider's health dashboard manually.</p>",
    );

    Notification::new(SUBJECT_ERROR, page(&html), text, NotifyLevel::Error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccountConfig;
    use crate::health::summary::tests::event;
    use crate::provider::AccountHealth;

    fn account(name: &str) -> AccountConfig {
        AccountConfig {
            name: name.to_string(),
            description: String::new(),
            region: "us-east-1".to_string(),
            credentials: Default::default(),
            endpoint: None,
        }
    }

    #[test]
    fn test_daily_report_lists_accounts_and_caps_events() {
        let events: Vec<EventRecord> = (0..15)
            .map(|i| event(&format!("e{}", i), "EC2", "us-east-1", EventCategory::Issue))
            .collect();
        let fleet = FleetPoll::from_accounts(vec![
            AccountHealth::new(&account("prod"), Ok(events)),
            AccountHealth::new(&account("<dev>"), Err(PollError::AccessDenied)),
        ]);

        let n = daily_report(&fleet, true);
        assert_eq!(n.subject, SUBJECT_ATTENTION);
        assert_eq!(n.level, NotifyLevel::Critical);
        assert_eq!(n.html.matches("class=\"event critical\"").count(), RECENT_EVENTS);
        assert!(n.html.contains("&lt;dev&gt;"));
        assert!(n.html.contains("access to the Health API denied"));
        assert!(n.text.contains("prod: CRITICAL"));
    }

    #[test]
    fn test_all_clear_report() {
        let fleet = FleetPoll::from_accounts(vec![AccountHealth::new(&account("prod"), Ok(vec![]))]);
        let n = daily_report(&fleet, false);
        assert_eq!(n.subject, SUBJECT_ALL_CLEAR);
        assert_eq!(n.level, NotifyLevel::Info);
        assert!(!n.html.contains("Recent events"));
    }

    #[test]
    fn test_urgent_report_truncates_descriptions() {
        let mut e = event("a", "RDS", "eu-west-1", EventCategory::Issue);
        e.description = "x".repeat(300);
        let n = urgent_report(&[("prod".to_string(), vec![e])]);

        assert_eq!(n.subject, SUBJECT_URGENT);
        assert!(n.html.contains(&format!("{}...", "x".repeat(200))));
        assert!(!n.html.contains(&"x".repeat(201)));
        assert!(n.html.contains("Recommended actions"));
        assert!(n.text.starts_with("1 new critical events"));
    }

    #[test]
    fn test_error_report() {
        let n = error_report(&[("prod".to_string(), PollError::SubscriptionRequired)]);
        assert_eq!(n.subject, SUBJECT_ERROR);
        assert_eq!(n.level, NotifyLevel::Error);
        assert!(n.text.contains("prod"));
    }
}
