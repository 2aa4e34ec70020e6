//! Run results.
//!
//! Built by the reconciler while it works through a plan; immutable once
//! returned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tierwarden_directory::{DirectoryError, ErrorKind};

use crate::statistics::RunStatistics;
use crate::types::{ActionSet, Classification, CorrectiveAction, RecordState};

/// Final state of one record that had actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordOutcome {
    pub identifier: String,
    pub classification: Classification,
    pub state: RecordState,
    /// Actions planned for the record, applied or not.
    pub actions: ActionSet,
    /// Number of actions the directory accepted.
    #[serde(default)]
    pub applied: usize,
}

/// A failed action on one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordError {
    pub identifier: String,
    pub action: CorrectiveAction,
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
}

impl RecordError {
    /// Create from a directory error.
    pub fn new(identifier: &str, action: &CorrectiveAction, error: &DirectoryError) -> Self {
        Self {
            identifier: identifier.to_string(),
            action: action.clone(),
            kind: error.kind(),
            code: error.error_code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Aggregate outcome of a reconciliation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub directory: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub statistics: RunStatistics,
    /// One entry per record that had actions.
    pub outcomes: Vec<RecordOutcome>,
    pub errors: Vec<RecordError>,
}

impl RunResult {
    /// True when no record reported an error.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of actions the directory accepted.
    pub fn operations_succeeded(&self) -> u32 {
        self.statistics.actions_succeeded
    }

    /// Find the outcome for a record (case-insensitive).
    pub fn outcome(&self, identifier: &str) -> Option<&RecordOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.identifier.eq_ignore_ascii_case(identifier))
    }

    /// Errors grouped by kind, in first-seen order.
    pub fn errors_by_kind(&self) -> Vec<(ErrorKind, usize)> {
        let mut counts: Vec<(ErrorKind, usize)> = Vec::new();
        for error in &self.errors {
            match counts.iter_mut().find(|(kind, _)| *kind == error.kind) {
                Some((_, count)) => *count += 1,
                None => counts.push((error.kind, 1)),
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(errors: Vec<RecordError>) -> RunResult {
        RunResult {
            run_id: Uuid::new_v4(),
            directory: "corp.local".to_string(),
            dry_run: false,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            duration_ms: 0,
            statistics: RunStatistics {
                actions_succeeded: 2,
                ..Default::default()
            },
            outcomes: vec![],
            errors,
        }
    }

    #[test]
    fn test_success_depends_on_errors() {
        assert!(result(vec![]).is_success());

        let error = RecordError::new(
            "bob",
            &CorrectiveAction::Disable,
            &DirectoryError::access_denied("bob", "disable"),
        );
        assert_eq!(error.kind, ErrorKind::AccessDenied);
        assert_eq!(error.code, "ACCESS_DENIED");

        let failed = result(vec![error.clone(), error]);
        assert!(!failed.is_success());
        assert_eq!(failed.operations_succeeded(), 2);
        assert_eq!(failed.errors_by_kind(), vec![(ErrorKind::AccessDenied, 2)]);
    }

    #[test]
    fn test_result_serializes_to_json() {
        let error = RecordError::new(
            "bob",
            &CorrectiveAction::RemoveFromGroup("GroupA".to_string()),
            &DirectoryError::not_found("bob"),
        );
        let json = serde_json::to_value(result(vec![error])).unwrap();
        assert_eq!(json["errors"][0]["kind"], "object_not_found");
        assert_eq!(json["errors"][0]["action"]["action"], "remove_from_group");
        assert_eq!(json["statistics"]["actions_succeeded"], 2);
    }
}
