//! Run statistics tracking.
//!
//! Tracks and aggregates counts while a run is planned and reconciled.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;

use crate::types::{Classification, CorrectiveAction};

/// Statistics for a reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Objects returned by the query.
    #[serde(default)]
    pub objects_scanned: u32,
    /// Objects per classification.
    #[serde(default)]
    pub classified: BTreeMap<String, u32>,
    /// Objects skipped because they are on the exclusion list.
    #[serde(default)]
    pub excluded: u32,
    /// Objects that needed no action.
    #[serde(default)]
    pub compliant: u32,
    /// Actions computed by the differ.
    #[serde(default)]
    pub actions_planned: u32,
    /// Actions sent to the directory.
    #[serde(default)]
    pub actions_attempted: u32,
    /// Actions the directory accepted.
    #[serde(default)]
    pub actions_succeeded: u32,
    /// Actions the directory rejected.
    #[serde(default)]
    pub actions_failed: u32,
    /// Planned actions broken down by verb.
    #[serde(default)]
    pub actions_by_type: BTreeMap<String, u32>,
    /// Records whose every action succeeded.
    #[serde(default)]
    pub records_succeeded: u32,
    /// Records stopped by a failed action.
    #[serde(default)]
    pub records_failed: u32,
    /// Records not started before the run deadline.
    #[serde(default)]
    pub records_not_started: u32,
}

impl RunStatistics {
    /// Create new empty statistics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get count for a specific classification.
    #[must_use]
    pub fn classified_count(&self, classification: Classification) -> u32 {
        self.classified
            .get(classification.as_str())
            .copied()
            .unwrap_or(0)
    }

    /// Get planned count for a specific action verb.
    #[must_use]
    pub fn action_count(&self, action: &str) -> u32 {
        self.actions_by_type.get(action).copied().unwrap_or(0)
    }

    /// Merge with another statistics instance.
    pub fn merge(&mut self, other: &RunStatistics) {
        self.objects_scanned += other.objects_scanned;
        self.excluded += other.excluded;
        self.compliant += other.compliant;
        self.actions_planned += other.actions_planned;
        self.actions_attempted += other.actions_attempted;
        self.actions_succeeded += other.actions_succeeded;
        self.actions_failed += other.actions_failed;
        self.records_succeeded += other.records_succeeded;
        self.records_failed += other.records_failed;
        self.records_not_started += other.records_not_started;

        for (key, value) in &other.classified {
            *self.classified.entry(key.clone()).or_insert(0) += value;
        }
        for (key, value) in &other.actions_by_type {
            *self.actions_by_type.entry(key.clone()).or_insert(0) += value;
        }
    }
}

/// Thread-safe tracker for accumulating statistics during a run.
#[derive(Debug, Default)]
pub struct StatisticsTracker {
    objects_scanned: AtomicU32,
    excluded: AtomicU32,
    compliant: AtomicU32,
    actions_planned: AtomicU32,
    actions_attempted: AtomicU32,
    actions_succeeded: AtomicU32,
    actions_failed: AtomicU32,
    records_succeeded: AtomicU32,
    records_failed: AtomicU32,
    records_not_started: AtomicU32,
    classified: RwLock<HashMap<Classification, u32>>,
    actions_by_type: RwLock<HashMap<&'static str, u32>>,
}

impl StatisticsTracker {
    /// Create a new tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one classified object.
    pub fn record_classified(&self, classification: Classification) {
        self.objects_scanned.fetch_add(1, Ordering::SeqCst);
        if classification == Classification::Excluded {
            self.excluded.fetch_add(1, Ordering::SeqCst);
        }
        if let Ok(mut map) = self.classified.write() {
            *map.entry(classification).or_insert(0) += 1;
        }
    }

    /// Record the planned actions for one non-excluded object.
    pub fn record_planned<'a>(&self, actions: impl IntoIterator<Item = &'a CorrectiveAction>) {
        let mut planned = 0;
        if let Ok(mut map) = self.actions_by_type.write() {
            for action in actions {
                planned += 1;
                *map.entry(action.name()).or_insert(0) += 1;
            }
        }
        if planned == 0 {
            self.compliant.fetch_add(1, Ordering::SeqCst);
        } else {
            self.actions_planned.fetch_add(planned, Ordering::SeqCst);
        }
    }

    /// Record an action sent to the directory.
    pub fn record_attempt(&self, succeeded: bool) {
        self.actions_attempted.fetch_add(1, Ordering::SeqCst);
        if succeeded {
            self.actions_succeeded.fetch_add(1, Ordering::SeqCst);
        } else {
            self.actions_failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn record_succeeded(&self) {
        self.records_succeeded.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_failed(&self) {
        self.records_failed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_not_started(&self) {
        self.records_not_started.fetch_add(1, Ordering::SeqCst);
    }

    /// Get the number of successful actions so far.
    pub fn succeeded_count(&self) -> u32 {
        self.actions_succeeded.load(Ordering::SeqCst)
    }

    /// Snapshot current statistics.
    pub fn snapshot(&self) -> RunStatistics {
        let classified = self
            .classified
            .read()
            .map(|map| map.iter().map(|(k, v)| (k.to_string(), *v)).collect())
            .unwrap_or_default();

        let actions_by_type = self
            .actions_by_type
            .read()
            .map(|map| map.iter().map(|(k, v)| ((*k).to_string(), *v)).collect())
            .unwrap_or_default();

        RunStatistics {
            objects_scanned: self.objects_scanned.load(Ordering::SeqCst),
            classified,
            excluded: self.excluded.load(Ordering::SeqCst),
            compliant: self.compliant.load(Ordering::SeqCst),
            actions_planned: self.actions_planned.load(Ordering::SeqCst),
            actions_attempted: self.actions_attempted.load(Ordering::SeqCst),
            actions_succeeded: self.actions_succeeded.load(Ordering::SeqCst),
            actions_failed: self.actions_failed.load(Ordering::SeqCst),
            actions_by_type,
            records_succeeded: self.records_succeeded.load(Ordering::SeqCst),
            records_failed: self.records_failed.load(Ordering::SeqCst),
            records_not_started: self.records_not_started.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActionSet;

    #[test]
    fn test_tracker_snapshot() {
        let tracker = StatisticsTracker::new();
        tracker.record_classified(Classification::Tier1);
        tracker.record_classified(Classification::Tier1);
        tracker.record_classified(Classification::Excluded);

        tracker.record_planned(&[
            CorrectiveAction::AddToGroup("GroupA".to_string()),
            CorrectiveAction::Disable,
        ]);
        tracker.record_planned(ActionSet::new().iter());

        tracker.record_attempt(true);
        tracker.record_attempt(false);
        tracker.record_failed();

        let stats = tracker.snapshot();
        assert_eq!(stats.objects_scanned, 3);
        assert_eq!(stats.excluded, 1);
        assert_eq!(stats.classified_count(Classification::Tier1), 2);
        assert_eq!(stats.classified_count(Classification::Tier0), 0);
        assert_eq!(stats.compliant, 1);
        assert_eq!(stats.actions_planned, 2);
        assert_eq!(stats.action_count("add_to_group"), 1);
        assert_eq!(stats.actions_attempted, 2);
        assert_eq!(stats.actions_succeeded, 1);
        assert_eq!(stats.actions_failed, 1);
        assert_eq!(stats.records_failed, 1);
    }

    #[test]
    fn test_statistics_serialization() {
        let tracker = StatisticsTracker::new();
        tracker.record_classified(Classification::NonCompliant);
        let json = serde_json::to_value(tracker.snapshot()).unwrap();
        assert_eq!(json["classified"]["non_compliant"], 1);

        let parsed: RunStatistics = serde_json::from_str(r#"{"objects_scanned": 4}"#).unwrap();
        assert_eq!(parsed.objects_scanned, 4);
        assert!(parsed.classified.is_empty());
    }
}
