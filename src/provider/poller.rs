//! Sequential fleet polling.

use super::{collect_events, ProviderFactory, TimeRange};
use crate::config::{AccountConfig, AccountRegistry, LookbackWindow};
use crate::health::{EventGroups, FleetReport, PollResult, Summary};

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// One account's poll together with everything derived from it.
#[derive(Debug, Clone, Serialize)]
pub struct AccountHealth {
    pub name: String,
    pub description: String,
    #[serde(skip)]
    pub poll: PollResult,
    pub summary: Summary,
    pub groups: EventGroups,
}

impl AccountHealth {
    pub fn new(account: &AccountConfig, poll: PollResult) -> Self {
        Self {
            name: account.name.clone(),
            description: account.description.clone(),
            summary: Summary::from_poll(&poll),
            groups: EventGroups::from_poll(&poll),
            poll,
        }
    }
}

/// Result of polling every configured account.
#[derive(Debug, Clone)]
pub struct FleetPoll {
    pub accounts: Vec<AccountHealth>,
    pub report: FleetReport,
}

impl FleetPoll {
    pub fn from_accounts(accounts: Vec<AccountHealth>) -> Self {
        let report =
            FleetReport::consolidate(accounts.iter().map(|a| (a.name.as_str(), &a.summary)));
        Self { accounts, report }
    }
}

/// Polls accounts one at a time with a pause between them.
pub struct FleetPoller {
    registry: Arc<AccountRegistry>,
    factory: Arc<dyn ProviderFactory>,
    account_delay: Duration,
}

impl FleetPoller {
    pub fn new(
        registry: Arc<AccountRegistry>,
        factory: Arc<dyn ProviderFactory>,
        account_delay: Duration,
    ) -> Self {
        Self {
            registry,
            factory,
            account_delay,
        }
    }

    pub fn registry(&self) -> &AccountRegistry {
        &self.registry
    }

    /// Poll one account. Client construction failures become the poll error.
    pub async fn poll(&self, account: &AccountConfig, days: LookbackWindow) -> PollResult {
        let provider = self.factory.connect(account).await?;
        let range = TimeRange::last_days(days.days());
        collect_events(provider.as_ref(), range).await
    }

    pub async fn poll_account(&self, account: &AccountConfig, days: LookbackWindow) -> AccountHealth {
        tracing::debug!("Polling account {} ({} days)", account.name, days);
        let poll = self.poll(account, days).await;
        match &poll {
            Ok(events) => tracing::info!("Account {}: {} events", account.name, events.len()),
            Err(e) => tracing::warn!("Account {}: {}", account.name, e),
        }
        AccountHealth::new(account, poll)
    }

    /// Poll every account in configured order.
    pub async fn poll_fleet(&self, days: LookbackWindow) -> FleetPoll {
        let mut accounts = Vec::with_capacity(self.registry.len());

        for (i, account) in self.registry.accounts().iter().enumerate() {
            if i > 0 && !self.account_delay.is_zero() {
                tokio::time::sleep(self.account_delay).await;
            }
            accounts.push(self.poll_account(account, days).await);
        }

        FleetPoll::from_accounts(accounts)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::CredentialSource;
    use crate::health::{AccountStatus, FleetStatus, PollError, RawEvent};
    use crate::provider::tests::{raw, FakeProvider};
    use crate::provider::HealthProvider;
    use std::collections::HashMap;

    /// Factory handing out scripted providers by account name.
    pub(crate) struct FakeFactory {
        pub events: HashMap<String, Result<Vec<RawEvent>, PollError>>,
    }

    #[async_trait::async_trait]
    impl ProviderFactory for FakeFactory {
        async fn connect(
            &self,
            account: &AccountConfig,
        ) -> Result<Box<dyn HealthProvider>, PollError> {
            match self.events.get(&account.name) {
                Some(Ok(events)) => Ok(Box::new(FakeProvider::with_events(events.clone()))),
                Some(Err(e)) => Ok(Box::new(FakeProvider::failing(e.clone()))),
                None => Err(PollError::ClientInit("no such fake".to_string())),
            }
        }
    }

    pub(crate) fn account(name: &str) -> AccountConfig {
        AccountConfig {
            name: name.to_string(),
            description: format!("{} account", name),
            region: "us-east-1".to_string(),
            credentials: CredentialSource::default(),
            endpoint: None,
        }
    }

    pub(crate) fn poller(
        names: &[&str],
        events: HashMap<String, Result<Vec<RawEvent>, PollError>>,
    ) -> FleetPoller {
        let registry = AccountRegistry::new(names.iter().map(|n| account(n)).collect(), None)
            .unwrap();
        FleetPoller::new(
            Arc::new(registry),
            Arc::new(FakeFactory { events }),
            Duration::ZERO,
        )
    }

    #[test]
    fn test_poll_fleet_keeps_account_order_and_errors() {
        let mut events = HashMap::new();
        events.insert(
            "prod".to_string(),
            Ok(vec![raw("a", "issue", "open"), raw("b", "issue", "closed")]),
        );
        events.insert("dev".to_string(), Ok(vec![]));
        events.insert("legacy".to_string(), Err(PollError::SubscriptionRequired));

        let poller = poller(&["prod", "dev", "legacy", "missing"], events);
        let fleet = tokio_test::block_on(poller.poll_fleet(LookbackWindow::default()));

        let names: Vec<_> = fleet.accounts.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["prod", "dev", "legacy", "missing"]);

        assert_eq!(fleet.accounts[0].summary.total_events, 2);
        assert_eq!(fleet.accounts[0].summary.critical_events, 2);
        assert_eq!(fleet.accounts[0].summary.active_events, 2);
        assert_eq!(fleet.accounts[0].groups.by_service["EC2"].total_events, 2);
        assert!(fleet.accounts[1].summary.is_all_clear());
        assert_eq!(
            fleet.accounts[2].summary.error_status,
            Some(PollError::SubscriptionRequired)
        );
        assert!(matches!(
            fleet.accounts[3].summary.error_status,
            Some(PollError::ClientInit(_))
        ));

        assert_eq!(fleet.report.total_accounts, 4);
        assert_eq!(fleet.report.error_accounts, 2);
        assert_eq!(fleet.report.critical_accounts, 1);
        assert_eq!(fleet.report.overall_status, FleetStatus::Critical);
        assert_eq!(fleet.report.account_summary[1].status, AccountStatus::Healthy);
    }

    #[test]
    fn test_poll_account_failure_has_empty_groups() {
        let mut events = HashMap::new();
        events.insert("prod".to_string(), Err(PollError::AccessDenied));
        let poller = poller(&["prod"], events);

        let account = poller.registry().default_account().unwrap().clone();
        let health = tokio_test::block_on(poller.poll_account(&account, LookbackWindow::default()));
        assert!(health.summary.is_error());
        assert!(health.groups.is_empty());
        assert_eq!(health.description, "prod account");
    }
}
