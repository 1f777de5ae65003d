//! Scheduler module for the daily and urgent health checks.

mod report;

pub use report::*;

use crate::config::{LookbackWindow, MonitorConfig};
use crate::health::{AlertPolicy, ChangeDetector, CheckOutcome, PollSnapshot};
use crate::notify::{daily_report, error_report, urgent_report, Notification, NotifyManager};
use crate::provider::{FleetPoll, FleetPoller};

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime};
use std::sync::Arc;
use std::time::Duration;

/// Fires once per local day at a fixed time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailySchedule {
    at: NaiveTime,
    last_run: Option<NaiveDate>,
}

impl DailySchedule {
    /// A schedule whose first run is the next occurrence of `at` after `now`.
    pub fn new(at: NaiveTime, now: NaiveDateTime) -> Self {
        let last_run = (now.time() >= at).then(|| now.date());
        Self { at, last_run }
    }

    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        now.time() >= self.at && self.last_run != Some(now.date())
    }

    pub fn mark_run(&mut self, now: NaiveDateTime) {
        self.last_run = Some(now.date());
    }
}

/// Fires every fixed interval, starting one interval after creation.
///
/// A next run past the representable calendar never fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalSchedule {
    every: chrono::Duration,
    next: Option<DateTime<Local>>,
}

impl IntervalSchedule {
    pub fn new(every: chrono::Duration, now: DateTime<Local>) -> Self {
        Self {
            every,
            next: now.checked_add_signed(every),
        }
    }

    pub fn is_due(&self, now: DateTime<Local>) -> bool {
        self.next.is_some_and(|next| now >= next)
    }

    pub fn mark_run(&mut self, now: DateTime<Local>) {
        self.next = now.checked_add_signed(self.every);
    }
}

const DEFAULT_URGENT_MINUTES: i64 = 30;

/// Urgent check period, at least one minute. Values chrono cannot
/// represent fall back to the default.
pub fn urgent_interval(minutes: u64) -> chrono::Duration {
    i64::try_from(minutes.max(1))
        .ok()
        .and_then(chrono::Duration::try_minutes)
        .unwrap_or_else(|| {
            tracing::warn!(
                "Urgent check interval of {} minutes is out of range; using {}",
                minutes,
                DEFAULT_URGENT_MINUTES
            );
            chrono::Duration::minutes(DEFAULT_URGENT_MINUTES)
        })
}

/// Runs the daily and urgent checks on one task, one job at a time.
///
/// The scheduler owns the poll snapshot; nothing else reads or writes it.
pub struct Scheduler {
    poller: Arc<FleetPoller>,
    notifier: NotifyManager,
    reports: Option<ReportWriter>,
    detector: ChangeDetector,
    policy: AlertPolicy,
    lookback: LookbackWindow,
    tick: Duration,
    daily: DailySchedule,
    urgent: IntervalSchedule,
    snapshot: PollSnapshot,
}

impl Scheduler {
    pub fn new(
        cfg: &MonitorConfig,
        poller: Arc<FleetPoller>,
        notifier: NotifyManager,
        reports: Option<ReportWriter>,
    ) -> Self {
        let now = Local::now();
        let daily_at = cfg.schedule.daily_time().unwrap_or_else(|e| {
            tracing::warn!("{}; falling back to 09:00", e);
            NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default()
        });

        Self {
            poller,
            notifier,
            reports,
            detector: ChangeDetector::new(cfg.thresholds),
            policy: cfg.alerts,
            lookback: cfg.schedule.check_lookback_days,
            tick: Duration::from_secs(cfg.schedule.tick_seconds.max(1)),
            daily: DailySchedule::new(daily_at, now.naive_local()),
            urgent: IntervalSchedule::new(urgent_interval(cfg.schedule.urgent_check_interval), now),
            snapshot: PollSnapshot::new(),
        }
    }

    /// Start the scheduler loop on its own task.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run the initial daily check, then check the schedules every tick.
    pub async fn run(mut self) {
        tracing::info!(
            "Scheduler started: daily check at {}, urgent check every {} minutes",
            self.daily.at.format("%H:%M"),
            self.urgent.every.num_minutes()
        );

        self.run_daily().await;

        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            interval.tick().await;
            let now = Local::now();

            if self.daily.is_due(now.naive_local()) {
                self.daily.mark_run(now.naive_local());
                self.run_daily().await;
            }

            let now = Local::now();
            if self.urgent.is_due(now) {
                self.urgent.mark_run(now);
                self.run_urgent().await;
            }
        }
    }

    async fn run_daily(&mut self) {
        tracing::info!("Daily health check started");
        let (fleet, notifications) = self.daily_check().await;

        for notification in &notifications {
            self.notifier.broadcast(notification).await;
        }

        if let Some(writer) = &self.reports {
            if let Err(e) = writer.write(&fleet.report) {
                tracing::error!("Failed to save fleet report: {}", e);
            }
        }

        tracing::info!(
            "Daily health check finished: fleet {}",
            fleet.report.overall_status
        );
    }

    async fn run_urgent(&mut self) {
        tracing::debug!("Urgent health check started");
        let notifications = self.urgent_check().await;
        for notification in &notifications {
            self.notifier.broadcast(notification).await;
        }
    }

    /// Poll the fleet and decide which daily notifications to send.
    pub async fn daily_check(&mut self) -> (FleetPoll, Vec<Notification>) {
        let fleet = self.poller.poll_fleet(self.lookback).await;

        let mut attention = false;
        let mut failures = Vec::new();
        for account in &fleet.accounts {
            match self
                .detector
                .threshold_check(&mut self.snapshot, &account.name, &account.poll)
            {
                CheckOutcome::NeedsAttention(_) => attention = true,
                CheckOutcome::PollFailed(e) => failures.push((account.name.clone(), e)),
                _ => {}
            }
        }

        let mut notifications = Vec::new();
        let any_polled = failures.len() < fleet.accounts.len();
        if attention {
            tracing::warn!("Daily check: thresholds exceeded");
            notifications.push(daily_report(&fleet, true));
        } else if any_polled && self.policy.daily_heartbeat {
            notifications.push(daily_report(&fleet, false));
        }
        if !failures.is_empty() {
            tracing::error!("Daily check: {} account(s) failed to poll", failures.len());
            notifications.push(error_report(&failures));
        }

        (fleet, notifications)
    }

    /// Poll the fleet and alert on open issues missing from the baseline.
    pub async fn urgent_check(&mut self) -> Vec<Notification> {
        let fleet = self.poller.poll_fleet(self.lookback).await;

        let mut new_events = Vec::new();
        let mut failures = Vec::new();
        for account in &fleet.accounts {
            match self
                .detector
                .delta_check(&mut self.snapshot, &account.name, &account.poll)
            {
                CheckOutcome::NewCritical(events) => {
                    tracing::warn!(
                        "Account {}: {} new critical event(s)",
                        account.name,
                        events.len()
                    );
                    new_events.push((account.name.clone(), events));
                }
                CheckOutcome::PollFailed(e) => failures.push((account.name.clone(), e)),
                _ => {}
            }
        }

        let mut notifications = Vec::new();
        if !new_events.is_empty() {
            notifications.push(urgent_report(&new_events));
        } else if failures.is_empty() && self.policy.urgent_heartbeat {
            notifications.push(daily_report(&fleet, false));
        }
        if !failures.is_empty() {
            notifications.push(error_report(&failures));
        }
        notifications
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{PollError, RawEvent};
    use crate::notify::{SUBJECT_ALL_CLEAR, SUBJECT_ATTENTION, SUBJECT_ERROR, SUBJECT_URGENT};
    use crate::provider::poller::tests::{account, FakeFactory};
    use crate::provider::tests::raw;
    use crate::config::AccountRegistry;
    use std::collections::HashMap;

    fn naive(h: u32, m: u32, day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn scheduler(
        cfg: &MonitorConfig,
        events: HashMap<String, Result<Vec<RawEvent>, PollError>>,
    ) -> Scheduler {
        let names: Vec<String> = events.keys().cloned().collect();
        let registry =
            AccountRegistry::new(names.iter().map(|n| account(n)).collect(), None).unwrap();
        let poller = FleetPoller::new(
            Arc::new(registry),
            Arc::new(FakeFactory { events }),
            Duration::ZERO,
        );
        Scheduler::new(cfg, Arc::new(poller), NotifyManager::new(), None)
    }

    fn subjects(notifications: &[Notification]) -> Vec<&str> {
        notifications.iter().map(|n| n.subject.as_str()).collect()
    }

    #[test]
    fn test_daily_schedule() {
        let at = NaiveTime::from_hms_opt(9, 0, 0).unwrap();

        let mut before = DailySchedule::new(at, naive(8, 0, 1));
        assert!(!before.is_due(naive(8, 59, 1)));
        assert!(before.is_due(naive(9, 0, 1)));
        before.mark_run(naive(9, 0, 1));
        assert!(!before.is_due(naive(23, 0, 1)));
        assert!(before.is_due(naive(9, 1, 2)));

        let after = DailySchedule::new(at, naive(10, 0, 1));
        assert!(!after.is_due(naive(11, 0, 1)));
        assert!(after.is_due(naive(9, 0, 2)));
    }

    #[test]
    fn test_interval_schedule() {
        let start = Local::now();
        let mut s = IntervalSchedule::new(chrono::Duration::minutes(30), start);
        assert!(!s.is_due(start + chrono::Duration::minutes(29)));
        assert!(s.is_due(start + chrono::Duration::minutes(30)));
        s.mark_run(start + chrono::Duration::minutes(31));
        assert!(!s.is_due(start + chrono::Duration::minutes(60)));

        let far = IntervalSchedule::new(chrono::Duration::MAX, start);
        assert!(!far.is_due(start + chrono::Duration::days(365)));
    }

    #[test]
    fn test_urgent_interval_bounds() {
        assert_eq!(urgent_interval(0), chrono::Duration::minutes(1));
        assert_eq!(urgent_interval(45), chrono::Duration::minutes(45));
        assert_eq!(urgent_interval(u64::MAX), chrono::Duration::minutes(30));
        assert_eq!(
            urgent_interval(i64::MAX as u64),
            chrono::Duration::minutes(30)
        );
    }

    #[tokio::test]
    async fn test_daily_check_heartbeat_and_attention() {
        let mut events = HashMap::new();
        events.insert("prod".to_string(), Ok(vec![]));
        let mut s = scheduler(&MonitorConfig::default(), events);
        let (fleet, notifications) = s.daily_check().await;
        assert_eq!(fleet.report.total_accounts, 1);
        assert_eq!(subjects(&notifications), [SUBJECT_ALL_CLEAR]);

        let mut cfg = MonitorConfig::default();
        cfg.alerts.daily_heartbeat = false;
        let mut events = HashMap::new();
        events.insert("prod".to_string(), Ok(vec![]));
        let mut s = scheduler(&cfg, events);
        assert!(s.daily_check().await.1.is_empty());

        let mut events = HashMap::new();
        events.insert("prod".to_string(), Ok(vec![raw("a", "issue", "open")]));
        let mut s = scheduler(&MonitorConfig::default(), events);
        assert_eq!(subjects(&s.daily_check().await.1), [SUBJECT_ATTENTION]);
    }

    #[tokio::test]
    async fn test_daily_check_routes_failures_to_error_alert() {
        let mut events = HashMap::new();
        events.insert("prod".to_string(), Err(PollError::CredentialsMissing));
        let mut s = scheduler(&MonitorConfig::default(), events);

        let (fleet, notifications) = s.daily_check().await;
        assert_eq!(fleet.report.error_accounts, 1);
        assert_eq!(subjects(&notifications), [SUBJECT_ERROR]);
        assert!(s.snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_urgent_check_needs_baseline() {
        let mut events = HashMap::new();
        events.insert("prod".to_string(), Ok(vec![raw("a", "issue", "open")]));
        let mut s = scheduler(&MonitorConfig::default(), events);

        // No baseline yet: nothing is new.
        assert!(s.urgent_check().await.is_empty());
        assert!(s.urgent_check().await.is_empty());
    }

    #[tokio::test]
    async fn test_urgent_check_after_quiet_poll() {
        let mut events = HashMap::new();
        events.insert("prod".to_string(), Ok(vec![raw("a", "issue", "open")]));
        let mut s = scheduler(&MonitorConfig::default(), events);

        // The previous poll succeeded with no events.
        s.snapshot.replace("prod", vec![]);
        assert_eq!(subjects(&s.urgent_check().await), [SUBJECT_URGENT]);
    }

    #[tokio::test]
    async fn test_urgent_check_alerts_on_new_issue() {
        let mut events = HashMap::new();
        events.insert(
            "prod".to_string(),
            Ok(vec![raw("a", "issue", "open"), raw("b", "issue", "open")]),
        );
        let mut s = scheduler(&MonitorConfig::default(), events);

        let baseline = crate::provider::collect_events(
            &crate::provider::tests::FakeProvider::with_events(vec![raw("a", "issue", "open")]),
            crate::provider::TimeRange::last_days(1),
        )
        .await
        .unwrap();
        s.snapshot.replace("prod", baseline);

        let notifications = s.urgent_check().await;
        assert_eq!(subjects(&notifications), [SUBJECT_URGENT]);
        assert!(notifications[0].text.starts_with("1 new critical events"));

        // The baseline now holds both events.
        assert!(s.urgent_check().await.is_empty());
    }

    #[tokio::test]
    async fn test_urgent_failure_keeps_baseline() {
        let mut events = HashMap::new();
        events.insert("prod".to_string(), Err(PollError::Api("boom".to_string())));
        let mut s = scheduler(&MonitorConfig::default(), events);
        s.snapshot.replace("prod", vec![]);

        let notifications = s.urgent_check().await;
        assert_eq!(subjects(&notifications), [SUBJECT_ERROR]);
        assert_eq!(s.snapshot.baseline("prod"), Some(&[][..]));
    }
}
