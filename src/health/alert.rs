//! Alert decisions: the daily threshold trigger and the delta trigger that
//! looks for newly-appeared critical events.

use super::error::PollError;
use super::models::{EventCategory, EventRecord, EventStatus};
use super::summary::{PollResult, Summary};

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Limits above which the daily check asks for attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    pub max_critical_events: usize,
    pub max_active_events: usize,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            max_critical_events: 0,
            max_active_events: 5,
        }
    }
}

impl AlertThresholds {
    /// Strictly greater-than on either counter.
    pub fn is_breached(&self, summary: &Summary) -> bool {
        summary.critical_events > self.max_critical_events
            || summary.active_events > self.max_active_events
    }
}

/// Which quiet outcomes still produce a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertPolicy {
    /// Send an all-clear notice when the daily check finds nothing.
    pub daily_heartbeat: bool,
    /// Send an all-clear notice when the urgent check finds nothing new.
    pub urgent_heartbeat: bool,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            daily_heartbeat: true,
            urgent_heartbeat: false,
        }
    }
}

/// Last successful event set per account, used as the delta baseline.
#[derive(Debug, Default)]
pub struct PollSnapshot {
    accounts: HashMap<String, Vec<EventRecord>>,
}

impl PollSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Baseline for `account`, or `None` when no poll has been recorded.
    ///
    /// A recorded poll with zero events is `Some(&[])`.
    pub fn baseline(&self, account: &str) -> Option<&[EventRecord]> {
        self.accounts.get(account).map(Vec::as_slice)
    }

    /// Replace the account's baseline wholesale.
    pub fn replace(&mut self, account: &str, events: Vec<EventRecord>) {
        self.accounts.insert(account.to_string(), events);
    }

    /// True until the first successful poll is recorded.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

/// Open issues in `current` whose ids are absent from `baseline`.
///
/// Without a baseline nothing counts as new. A recorded quiet poll is a
/// baseline like any other.
pub fn detect_new_critical(
    baseline: Option<&[EventRecord]>,
    current: &[EventRecord],
) -> Vec<EventRecord> {
    let Some(baseline) = baseline else {
        return Vec::new();
    };

    let known: HashSet<&str> = baseline.iter().map(|e| e.id.as_str()).collect();
    current
        .iter()
        .filter(|e| {
            !known.contains(e.id.as_str())
                && e.category == EventCategory::Issue
                && e.status == EventStatus::Open
        })
        .cloned()
        .collect()
}

/// Result of running a trigger against one account's poll.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    /// Daily thresholds exceeded.
    NeedsAttention(Summary),
    /// Daily thresholds respected.
    AllClear(Summary),
    /// Delta trigger found open issues missing from the baseline.
    NewCritical(Vec<EventRecord>),
    /// Delta trigger found nothing new.
    NoChange,
    /// The poll itself failed; the baseline was left untouched.
    PollFailed(PollError),
}

/// Runs both triggers against an explicitly passed snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector {
    thresholds: AlertThresholds,
}

impl ChangeDetector {
    pub fn new(thresholds: AlertThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &AlertThresholds {
        &self.thresholds
    }

    /// Threshold trigger. Updates the baseline on success.
    pub fn threshold_check(
        &self,
        snapshot: &mut PollSnapshot,
        account: &str,
        poll: &PollResult,
    ) -> CheckOutcome {
        let events = match poll {
            Ok(events) => events,
            Err(e) => return CheckOutcome::PollFailed(e.clone()),
        };

        let summary = Summary::from_events(events);
        let outcome = if self.thresholds.is_breached(&summary) {
            CheckOutcome::NeedsAttention(summary)
        } else {
            CheckOutcome::AllClear(summary)
        };

        snapshot.replace(account, events.clone());
        outcome
    }

    /// Delta trigger. Updates the baseline on success whether or not
    /// anything new was found.
    pub fn delta_check(
        &self,
        snapshot: &mut PollSnapshot,
        account: &str,
        poll: &PollResult,
    ) -> CheckOutcome {
        let events = match poll {
            Ok(events) => events,
            Err(e) => return CheckOutcome::PollFailed(e.clone()),
        };

        let new_critical = detect_new_critical(snapshot.baseline(account), events);
        snapshot.replace(account, events.clone());

        if new_critical.is_empty() {
            CheckOutcome::NoChange
        } else {
            CheckOutcome::NewCritical(new_critical)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::summary::tests::{event, resolved};

    fn issue(id: &str) -> EventRecord {
        event(id, "EC2", "us-east-1", EventCategory::Issue)
    }

    fn summary(critical: usize, active: usize) -> Summary {
        let mut s = Summary::from_events(&[]);
        s.critical_events = critical;
        s.active_events = active;
        s
    }

    #[test]
    fn test_threshold_boundary_is_exclusive() {
        let t = AlertThresholds::default();
        assert!(t.is_breached(&summary(0, 6)));
        assert!(!t.is_breached(&summary(0, 5)));
        assert!(t.is_breached(&summary(1, 0)));
    }

    #[test]
    fn test_empty_baseline_reports_nothing() {
        let current: Vec<_> = (0..10).map(|i| issue(&i.to_string())).collect();
        assert!(detect_new_critical(None, &current).is_empty());

        let detector = ChangeDetector::default();
        let mut snapshot = PollSnapshot::new();
        let outcome = detector.delta_check(&mut snapshot, "prod", &Ok(current.clone()));
        assert_eq!(outcome, CheckOutcome::NoChange);
        assert_eq!(snapshot.baseline("prod").map(<[_]>::len), Some(10));
    }

    #[test]
    fn test_new_issue_detected() {
        let a = issue("A");
        let b = issue("B");
        let new = detect_new_critical(Some(&[a.clone()]), &[a, b.clone()]);
        assert_eq!(new, vec![b]);
    }

    #[test]
    fn test_only_open_issues_count_as_new() {
        let baseline = [issue("A")];
        let notice = event("N", "IAM", "Global", EventCategory::AccountNotification);
        let closed = resolved(issue("C"));
        assert!(detect_new_critical(Some(&baseline), &[notice, closed]).is_empty());
    }

    #[test]
    fn test_resolved_event_disappearing_fires_nothing() {
        let detector = ChangeDetector::default();
        let mut snapshot = PollSnapshot::new();
        snapshot.replace("prod", vec![issue("A")]);

        let outcome = detector.delta_check(&mut snapshot, "prod", &Ok(vec![]));
        assert_eq!(outcome, CheckOutcome::NoChange);
        assert_eq!(snapshot.baseline("prod"), Some(&[][..]));
    }

    #[test]
    fn test_quiet_poll_is_a_baseline() {
        let detector = ChangeDetector::default();
        let mut snapshot = PollSnapshot::new();

        // First poll: nothing open, but the account now has a baseline.
        assert_eq!(
            detector.delta_check(&mut snapshot, "prod", &Ok(vec![])),
            CheckOutcome::NoChange
        );
        assert!(!snapshot.is_empty());

        assert_eq!(
            detector.delta_check(&mut snapshot, "prod", &Ok(vec![issue("A")])),
            CheckOutcome::NewCritical(vec![issue("A")])
        );
    }

    #[test]
    fn test_delta_compares_against_previous_poll() {
        let detector = ChangeDetector::default();
        let mut snapshot = PollSnapshot::new();
        snapshot.replace("prod", vec![issue("A")]);

        let second = Ok(vec![issue("A"), issue("B")]);
        assert_eq!(
            detector.delta_check(&mut snapshot, "prod", &second),
            CheckOutcome::NewCritical(vec![issue("B")])
        );
        // Same set again: B is now part of the baseline.
        assert_eq!(
            detector.delta_check(&mut snapshot, "prod", &second),
            CheckOutcome::NoChange
        );
    }

    #[test]
    fn test_failed_poll_keeps_baseline() {
        let detector = ChangeDetector::default();
        let mut snapshot = PollSnapshot::new();
        snapshot.replace("prod", vec![issue("A")]);

        let failed: PollResult = Err(PollError::AccessDenied);
        assert_eq!(
            detector.delta_check(&mut snapshot, "prod", &failed),
            CheckOutcome::PollFailed(PollError::AccessDenied)
        );
        assert_eq!(
            detector.threshold_check(&mut snapshot, "prod", &failed),
            CheckOutcome::PollFailed(PollError::AccessDenied)
        );
        assert_eq!(snapshot.baseline("prod"), Some(&[issue("A")][..]));

        // The next good poll is compared against the preserved baseline.
        let outcome = detector.delta_check(&mut snapshot, "prod", &Ok(vec![issue("A"), issue("B")]));
        assert_eq!(outcome, CheckOutcome::NewCritical(vec![issue("B")]));
    }

    #[test]
    fn test_threshold_check_updates_baseline() {
        let detector = ChangeDetector::new(AlertThresholds {
            max_critical_events: 0,
            max_active_events: 5,
        });
        let mut snapshot = PollSnapshot::new();
        assert!(snapshot.is_empty());

        match detector.threshold_check(&mut snapshot, "prod", &Ok(vec![issue("A")])) {
            CheckOutcome::NeedsAttention(s) => assert_eq!(s.critical_events, 1),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(snapshot.baseline("prod").map(<[_]>::len), Some(1));

        let quiet = vec![resolved(event("S", "EC2", "us-east-1", EventCategory::ScheduledChange))];
        assert!(matches!(
            detector.threshold_check(&mut snapshot, "prod", &Ok(quiet)),
            CheckOutcome::AllClear(_)
        ));
    }

    #[test]
    fn test_snapshot_accounts_are_independent() {
        let detector = ChangeDetector::default();
        let mut snapshot = PollSnapshot::new();
        snapshot.replace("prod", vec![issue("A")]);

        // staging has no baseline yet, so its issues are not new.
        let outcome = detector.delta_check(&mut snapshot, "staging", &Ok(vec![issue("B")]));
        assert_eq!(outcome, CheckOutcome::NoChange);
        assert_eq!(snapshot.baseline("prod"), Some(&[issue("A")][..]));
        assert!(snapshot.baseline("dev").is_none());
    }
}
