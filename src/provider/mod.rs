//! Health provider module.
//!
//! Defines the provider seam, the AWS Health implementation and the fleet
//! poller that drives it account by account.

mod aws;
pub(crate) mod poller;

pub use aws::*;
pub use poller::*;

use crate::config::AccountConfig;
use crate::health::{normalize, EventCategory, EventRecord, PollError, RawEvent};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Inclusive time window for event listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    /// The window ending now and reaching `days` back.
    pub fn last_days(days: u32) -> Self {
        let to = Utc::now();
        Self {
            from: to - chrono::Duration::days(i64::from(days)),
            to,
        }
    }
}

/// Source of health events for one account.
#[async_trait]
pub trait HealthProvider: Send + Sync {
    /// List events that started within `range` in the given categories.
    async fn list_events(
        &self,
        range: TimeRange,
        categories: &[EventCategory],
    ) -> Result<Vec<RawEvent>, PollError>;

    /// Latest description text of an event.
    async fn event_description(&self, id: &str) -> Result<String, PollError>;

    /// Number of entities affected by an event.
    async fn count_affected_entities(&self, id: &str) -> Result<u64, PollError>;
}

/// Builds a provider for an account.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    async fn connect(&self, account: &AccountConfig)
        -> Result<Box<dyn HealthProvider>, PollError>;
}

/// List and normalize the events of one account.
///
/// Detail and entity lookups are best effort: a failure logs and defaults
/// that field only.
pub async fn collect_events(
    provider: &dyn HealthProvider,
    range: TimeRange,
) -> Result<Vec<EventRecord>, PollError> {
    let raw_events = provider.list_events(range, &EventCategory::POLLED).await?;
    let mut records = Vec::with_capacity(raw_events.len());

    for raw in raw_events {
        let (description, entities) = match raw.arn.as_deref() {
            Some(id) => {
                let description = match provider.event_description(id).await {
                    Ok(d) => Some(d),
                    Err(e) => {
                        tracing::warn!("Event detail lookup failed for {}: {}", id, e);
                        None
                    }
                };
                let entities = match provider.count_affected_entities(id).await {
                    Ok(n) => Some(n),
                    Err(e) => {
                        tracing::warn!("Affected entity lookup failed for {}: {}", id, e);
                        None
                    }
                };
                (description, entities)
            }
            None => (None, None),
        };

        records.push(normalize(raw, description, entities));
    }

    Ok(records)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;

    /// In-memory provider with scripted responses.
    pub(crate) struct FakeProvider {
        pub events: Result<Vec<RawEvent>, PollError>,
        pub descriptions: HashMap<String, String>,
        pub entity_counts: HashMap<String, u64>,
    }

    impl FakeProvider {
        pub(crate) fn with_events(events: Vec<RawEvent>) -> Self {
            Self {
                events: Ok(events),
                descriptions: HashMap::new(),
                entity_counts: HashMap::new(),
            }
        }

        pub(crate) fn failing(error: PollError) -> Self {
            Self {
                events: Err(error),
                descriptions: HashMap::new(),
                entity_counts: HashMap::new(),
            }
        }
    }

    #[async_trait]
    impl HealthProvider for FakeProvider {
        async fn list_events(
            &self,
            _range: TimeRange,
            _categories: &[EventCategory],
        ) -> Result<Vec<RawEvent>, PollError> {
            self.events.clone()
        }

        async fn event_description(&self, id: &str) -> Result<String, PollError> {
            self.descriptions
                .get(id)
                .cloned()
                .ok_or_else(|| PollError::Api("no detail".to_string()))
        }

        async fn count_affected_entities(&self, id: &str) -> Result<u64, PollError> {
            self.entity_counts
                .get(id)
                .copied()
                .ok_or(PollError::AccessDenied)
        }
    }

    pub(crate) fn raw(arn: &str, category: &str, status: &str) -> RawEvent {
        RawEvent {
            arn: Some(arn.to_string()),
            service: Some("EC2".to_string()),
            event_type_code: Some("AWS_EC2_OPERATIONAL_ISSUE".to_string()),
            event_type_category: Some(category.to_string()),
            region: Some("us-east-1".to_string()),
            status_code: Some(status.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_collect_events_defaults_failed_lookups() {
        let mut provider = FakeProvider::with_events(vec![
            raw("a", "issue", "open"),
            raw("b", "scheduledChange", "upcoming"),
        ]);
        provider
            .descriptions
            .insert("a".to_string(), "Degraded".to_string());
        provider.entity_counts.insert("b".to_string(), 4);

        let records =
            tokio_test::block_on(collect_events(&provider, TimeRange::last_days(1))).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].description, "Degraded");
        assert_eq!(records[0].affected_entity_count, 0);
        assert_eq!(records[1].description, "");
        assert_eq!(records[1].affected_entity_count, 4);
    }

    #[test]
    fn test_collect_events_propagates_listing_failure() {
        let provider = FakeProvider::failing(PollError::SubscriptionRequired);
        let result = tokio_test::block_on(collect_events(&provider, TimeRange::last_days(7)));
        assert_eq!(result.unwrap_err(), PollError::SubscriptionRequired);
    }

    #[test]
    fn test_time_range() {
        let range = TimeRange::last_days(3);
        assert_eq!((range.to - range.from).num_days(), 3);
    }
}
