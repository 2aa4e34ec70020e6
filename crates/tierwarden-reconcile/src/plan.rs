//! Run plan: the classified, diffed view of a directory before any change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::statistics::RunStatistics;
use crate::types::{ActionSet, Classification};

/// Planned work for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordPlan {
    pub identifier: String,
    pub distinguished_path: String,
    pub classification: Classification,
    /// Rule that decided the classification, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<String>,
    pub actions: ActionSet,
}

impl RecordPlan {
    /// Create a plan entry with no actions.
    pub fn new(identifier: impl Into<String>, classification: Classification) -> Self {
        Self {
            identifier: identifier.into(),
            distinguished_path: String::new(),
            classification,
            matched_rule: None,
            actions: ActionSet::new(),
        }
    }

    /// Set the planned actions.
    #[must_use]
    pub fn with_actions(mut self, actions: impl Into<ActionSet>) -> Self {
        self.actions = actions.into();
        self
    }

    pub fn is_excluded(&self) -> bool {
        self.classification == Classification::Excluded
    }

    /// Whether the record is already in its desired state.
    pub fn is_compliant(&self) -> bool {
        !self.is_excluded() && self.actions.is_empty()
    }
}

/// Every record of one run, in query order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunPlan {
    /// Display name of the directory the plan was computed against.
    pub directory: String,
    /// Reference time used for age thresholds.
    pub as_of: DateTime<Utc>,
    pub records: Vec<RecordPlan>,
    pub statistics: RunStatistics,
}

impl RunPlan {
    /// Build a plan from records, without classification statistics.
    pub fn new(directory: impl Into<String>, records: Vec<RecordPlan>) -> Self {
        Self {
            directory: directory.into(),
            as_of: Utc::now(),
            records,
            statistics: RunStatistics::default(),
        }
    }

    /// Records that need at least one action.
    pub fn actionable(&self) -> impl Iterator<Item = &RecordPlan> {
        self.records.iter().filter(|r| !r.actions.is_empty())
    }

    /// Total number of planned actions.
    pub fn action_count(&self) -> usize {
        self.records.iter().map(|r| r.actions.len()).sum()
    }

    /// Find a record by identifier (case-insensitive).
    pub fn record(&self, identifier: &str) -> Option<&RecordPlan> {
        self.records
            .iter()
            .find(|r| r.identifier.eq_ignore_ascii_case(identifier))
    }
}
