//! Canonical health event types and the normalizer for raw provider events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Region sentinel for events that are not scoped to a region.
pub const GLOBAL_REGION: &str = "Global";

/// Placeholder for missing service names and event type codes.
pub const UNKNOWN: &str = "Unknown";

/// Event type category reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventCategory {
    Issue,
    AccountNotification,
    ScheduledChange,
    Other,
}

impl EventCategory {
    /// Categories requested on every poll.
    pub const POLLED: [EventCategory; 3] = [
        EventCategory::Issue,
        EventCategory::AccountNotification,
        EventCategory::ScheduledChange,
    ];

    pub fn parse(s: &str) -> Self {
        match s {
            "issue" => Self::Issue,
            "accountNotification" => Self::AccountNotification,
            "scheduledChange" => Self::ScheduledChange,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Issue => "issue",
            Self::AccountNotification => "accountNotification",
            Self::ScheduledChange => "scheduledChange",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Open,
    Closed,
    Upcoming,
    Unknown,
}

impl EventStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "open" => Self::Open,
            "closed" => Self::Closed,
            "upcoming" => Self::Upcoming,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Upcoming => "upcoming",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single normalized health event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Provider identifier (the event ARN).
    pub id: String,
    pub service: String,
    pub event_type_code: String,
    pub category: EventCategory,
    pub status: EventStatus,
    pub region: String,
    pub start_time: Option<DateTime<Utc>>,
    /// `None` while the event is still active.
    pub end_time: Option<DateTime<Utc>>,
    pub last_updated_time: Option<DateTime<Utc>>,
    pub description: String,
    pub affected_entity_count: u64,
}

impl EventRecord {
    pub fn is_active(&self) -> bool {
        self.end_time.is_none()
    }

    pub fn is_critical(&self) -> bool {
        self.category == EventCategory::Issue
    }

    pub fn is_global(&self) -> bool {
        self.region == GLOBAL_REGION
    }
}

/// An event entry as returned by the provider's event listing.
///
/// Every field is optional; [`normalize`] fills in defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEvent {
    pub arn: Option<String>,
    pub service: Option<String>,
    pub event_type_code: Option<String>,
    pub event_type_category: Option<String>,
    pub region: Option<String>,
    pub status_code: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub last_updated_time: Option<DateTime<Utc>>,
}

/// Build an [`EventRecord`] from a raw event and the results of the
/// independent detail and entity-count lookups.
///
/// A failed lookup is passed as `None` and only defaults its own field.
pub fn normalize(
    raw: RawEvent,
    description: Option<String>,
    affected_entities: Option<u64>,
) -> EventRecord {
    EventRecord {
        id: raw.arn.unwrap_or_default(),
        service: non_empty_or(raw.service, UNKNOWN),
        event_type_code: non_empty_or(raw.event_type_code, UNKNOWN),
        category: raw
            .event_type_category
            .as_deref()
            .map(EventCategory::parse)
            .unwrap_or(EventCategory::Other),
        status: raw
            .status_code
            .as_deref()
            .map(EventStatus::parse)
            .unwrap_or(EventStatus::Unknown),
        region: non_empty_or(raw.region, GLOBAL_REGION),
        start_time: raw.start_time,
        end_time: raw.end_time,
        last_updated_time: raw.last_updated_time,
        description: description.unwrap_or_default(),
        affected_entity_count: affected_entities.unwrap_or(0),
    }
}

fn non_empty_or(value: Option<String>, default: &str) -> String {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => default.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_normalize_defaults() {
        let record = normalize(RawEvent::default(), None, None);
        assert_eq!(record.service, "Unknown");
        assert_eq!(record.event_type_code, "Unknown");
        assert_eq!(record.region, "Global");
        assert_eq!(record.category, EventCategory::Other);
        assert_eq!(record.status, EventStatus::Unknown);
        assert_eq!(record.description, "");
        assert_eq!(record.affected_entity_count, 0);
        assert!(record.is_active());
        assert!(!record.is_critical());
    }

    #[test]
    fn test_normalize_full_event() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let raw = RawEvent {
            arn: Some("arn:aws:health:us-east-1::event/EC2/AWS_EC2_OPERATIONAL_ISSUE/abc".to_string()),
            service: Some("EC2".to_string()),
            event_type_code: Some("AWS_EC2_OPERATIONAL_ISSUE".to_string()),
            event_type_category: Some("issue".to_string()),
            region: Some("us-east-1".to_string()),
            status_code: Some("closed".to_string()),
            start_time: Some(start),
            end_time: Some(start + chrono::Duration::minutes(90)),
            last_updated_time: Some(Utc.with_ymd_and_hms(2024, 1, 1, 2, 0, 0).unwrap()),
        };

        let record = normalize(raw, Some("Elevated error rates".to_string()), Some(3));
        assert_eq!(record.service, "EC2");
        assert_eq!(record.category, EventCategory::Issue);
        assert_eq!(record.status, EventStatus::Closed);
        assert_eq!(
            record.start_time,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        assert!(record.end_time.is_some());
        assert!(!record.is_active());
        assert_eq!(
            record.last_updated_time,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 2, 0, 0).unwrap())
        );
        assert_eq!(record.description, "Elevated error rates");
        assert_eq!(record.affected_entity_count, 3);
    }

    #[test]
    fn test_lookup_failures_only_default_their_field() {
        let raw = RawEvent {
            arn: Some("a".to_string()),
            service: Some("S3".to_string()),
            ..Default::default()
        };
        let record = normalize(raw, None, Some(7));
        assert_eq!(record.id, "a");
        assert_eq!(record.description, "");
        assert_eq!(record.affected_entity_count, 7);
    }

    #[test]
    fn test_empty_strings_use_defaults() {
        let raw = RawEvent {
            service: Some(String::new()),
            region: Some(String::new()),
            ..Default::default()
        };
        let record = normalize(raw, Some(String::new()), None);
        assert_eq!(record.service, UNKNOWN);
        assert_eq!(record.region, GLOBAL_REGION);
        assert!(record.is_global());
    }

    #[test]
    fn test_category_round_trip_names() {
        for cat in EventCategory::POLLED {
            assert_eq!(EventCategory::parse(cat.as_str()), cat);
        }
        assert_eq!(EventCategory::parse("investigation"), EventCategory::Other);
        assert_eq!(EventStatus::parse("upcoming"), EventStatus::Upcoming);
    }
}
