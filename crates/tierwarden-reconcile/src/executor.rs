//! Reconciler: applies planned actions through the mutation adapter.
//!
//! Records are processed one at a time, in plan order. Each record moves
//! `Pending → Applying → Succeeded | Failed`; the first failed action ends
//! that record, and processing continues with the next one. Once the run
//! deadline passes, no new record is started and the rest end as
//! `NotStarted`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use tierwarden_directory::{DirectoryResult, MutationOp, RetryExecutor};

use crate::plan::{RecordPlan, RunPlan};
use crate::result::{RecordError, RecordOutcome, RunResult};
use crate::statistics::StatisticsTracker;
use crate::types::{CorrectiveAction, RecordState};

/// Applies run plans to a directory.
pub struct Reconciler<M: MutationOp + ?Sized> {
    directory: Arc<M>,
    retry: RetryExecutor,
    run_deadline: Option<Duration>,
}

impl<M: MutationOp + ?Sized> Reconciler<M> {
    /// Create a reconciler with default timeout and retry settings.
    pub fn new(directory: Arc<M>) -> Self {
        Self {
            directory,
            retry: RetryExecutor::with_defaults(),
            run_deadline: None,
        }
    }

    /// Use the given retry executor for every directory call.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryExecutor) -> Self {
        self.retry = retry;
        self
    }

    /// Stop starting new records once `deadline` has elapsed.
    #[must_use]
    pub fn with_run_deadline(mut self, deadline: Duration) -> Self {
        self.run_deadline = Some(deadline);
        self
    }

    /// Reconcile every record in the plan.
    ///
    /// Never fails: per-record errors are collected in the result. With
    /// `dry_run`, actions are logged and nothing reaches the directory.
    pub async fn reconcile(&self, plan: &RunPlan, dry_run: bool) -> RunResult {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();
        let tracker = StatisticsTracker::new();
        let mut outcomes = Vec::new();
        let mut errors = Vec::new();

        info!(
            %run_id,
            directory = %plan.directory,
            dry_run,
            records = plan.actionable().count(),
            actions = plan.action_count(),
            "Starting reconciliation"
        );

        for record in plan.actionable() {
            let outcome = if dry_run {
                Self::preview(record)
            } else if self.deadline_passed(clock) {
                debug!(identifier = %record.identifier, "Run deadline passed, not starting record");
                tracker.record_not_started();
                Self::outcome(record, RecordState::NotStarted, 0)
            } else {
                let span = info_span!("record", identifier = %record.identifier);
                self.apply_record(record, &tracker, &mut errors)
                    .instrument(span)
                    .await
            };
            outcomes.push(outcome);
        }

        let mut statistics = plan.statistics.clone();
        statistics.merge(&tracker.snapshot());

        let finished_at = Utc::now();
        let duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);

        info!(
            %run_id,
            dry_run,
            actions_succeeded = statistics.actions_succeeded,
            records_failed = statistics.records_failed,
            records_not_started = statistics.records_not_started,
            errors = errors.len(),
            duration_ms,
            "Reconciliation complete"
        );

        RunResult {
            run_id,
            directory: plan.directory.clone(),
            dry_run,
            started_at,
            finished_at,
            duration_ms,
            statistics,
            outcomes,
            errors,
        }
    }

    fn deadline_passed(&self, clock: Instant) -> bool {
        self.run_deadline
            .is_some_and(|deadline| clock.elapsed() >= deadline)
    }

    fn preview(record: &RecordPlan) -> RecordOutcome {
        for action in &record.actions {
            info!(
                identifier = %record.identifier,
                classification = %record.classification,
                action = %action,
                "Would apply"
            );
        }
        Self::outcome(record, RecordState::Pending, 0)
    }

    async fn apply_record(
        &self,
        record: &RecordPlan,
        tracker: &StatisticsTracker,
        errors: &mut Vec<RecordError>,
    ) -> RecordOutcome {
        debug!(state = %RecordState::Applying, actions = record.actions.len(), "Applying record");

        let mut applied = 0;
        for action in &record.actions {
            match self.apply(&record.identifier, action).await {
                Ok(()) => {
                    tracker.record_attempt(true);
                    applied += 1;
                    debug!(action = %action, "Applied");
                }
                Err(e) => {
                    tracker.record_attempt(false);
                    tracker.record_failed();
                    warn!(
                        action = %action,
                        error_kind = %e.kind(),
                        error = %e,
                        "Action failed, skipping rest of record"
                    );
                    errors.push(RecordError::new(&record.identifier, action, &e));
                    return Self::outcome(record, RecordState::Failed, applied);
                }
            }
        }

        tracker.record_succeeded();
        Self::outcome(record, RecordState::Succeeded, applied)
    }

    async fn apply(&self, target: &str, action: &CorrectiveAction) -> DirectoryResult<()> {
        let directory = &self.directory;
        self.retry
            .execute(action.name(), || async move {
                match action {
                    CorrectiveAction::AddToGroup(group) => directory.add_to_group(target, group).await,
                    CorrectiveAction::RemoveFromGroup(group) => {
                        directory.remove_from_group(target, group).await
                    }
                    CorrectiveAction::ClearAttribute(attribute) => {
                        directory.clear_attribute(target, attribute).await
                    }
                    CorrectiveAction::Disable => directory.disable(target).await,
                    CorrectiveAction::Delete => directory.delete(target).await,
                }
            })
            .await
    }

    fn outcome(record: &RecordPlan, state: RecordState, applied: usize) -> RecordOutcome {
        RecordOutcome {
            identifier: record.identifier.clone(),
            classification: record.classification,
            state,
            actions: record.actions.clone(),
            applied,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tierwarden_directory::{Directory, DirectoryError, ErrorKind, RetryConfig};

    use crate::types::Classification;

    /// Counts calls and fails every call for one target.
    struct CountingDirectory {
        calls: AtomicUsize,
        fail_target: Option<(String, ErrorKind)>,
        seen: Mutex<Vec<String>>,
    }

    impl CountingDirectory {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_target: None,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing(target: &str, kind: ErrorKind) -> Self {
            Self {
                fail_target: Some((target.to_string(), kind)),
                ..Self::new()
            }
        }

        fn call(&self, target: &str, verb: &str) -> DirectoryResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(format!("{verb}:{target}"));
            match &self.fail_target {
                Some((t, ErrorKind::AccessDenied)) if t == target => {
                    Err(DirectoryError::access_denied(target, verb))
                }
                Some((t, ErrorKind::Unavailable)) if t == target => {
                    Err(DirectoryError::unavailable("server busy"))
                }
                Some((t, _)) if t == target => Err(DirectoryError::not_found(target)),
                _ => Ok(()),
            }
        }
    }

    #[async_trait]
    impl Directory for CountingDirectory {
        fn display_name(&self) -> &str {
            "counting"
        }

        async fn test_connection(&self) -> DirectoryResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl MutationOp for CountingDirectory {
        async fn add_to_group(&self, target: &str, _group: &str) -> DirectoryResult<()> {
            self.call(target, "add")
        }
        async fn remove_from_group(&self, target: &str, _group: &str) -> DirectoryResult<()> {
            self.call(target, "remove")
        }
        async fn clear_attribute(&self, target: &str, _attribute: &str) -> DirectoryResult<()> {
            self.call(target, "clear")
        }
        async fn disable(&self, target: &str) -> DirectoryResult<()> {
            self.call(target, "disable")
        }
        async fn delete(&self, target: &str) -> DirectoryResult<()> {
            self.call(target, "delete")
        }
    }

    fn fast_retry() -> RetryExecutor {
        RetryExecutor::new(RetryConfig {
            operation_timeout: Duration::from_secs(5),
            max_retries: 1,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            jitter: false,
        })
    }

    fn plan() -> RunPlan {
        RunPlan::new(
            "test",
            vec![
                RecordPlan::new("alice", Classification::Tier1).with_actions(vec![
                    CorrectiveAction::AddToGroup("GroupA".to_string()),
                    CorrectiveAction::ClearAttribute("adminCount".to_string()),
                ]),
                RecordPlan::new("compliant", Classification::Tier1),
                RecordPlan::new("bob", Classification::Unclassified)
                    .with_actions(vec![CorrectiveAction::Disable, CorrectiveAction::Delete]),
                RecordPlan::new("carol", Classification::Tier2)
                    .with_actions(vec![CorrectiveAction::AddToGroup("GroupB".to_string())]),
            ],
        )
    }

    #[tokio::test]
    async fn test_all_actions_applied_in_order() {
        let directory = Arc::new(CountingDirectory::new());
        let reconciler = Reconciler::new(directory.clone()).with_retry(fast_retry());

        let result = reconciler.reconcile(&plan(), false).await;

        assert!(result.is_success());
        assert_eq!(result.operations_succeeded(), 5);
        assert_eq!(result.outcomes.len(), 3);
        assert!(result.outcomes.iter().all(|o| o.state == RecordState::Succeeded));
        assert_eq!(
            *directory.seen.lock().unwrap(),
            vec!["add:alice", "clear:alice", "disable:bob", "delete:bob", "add:carol"]
        );
    }

    #[tokio::test]
    async fn test_failure_ends_record_but_not_run() {
        let directory = Arc::new(CountingDirectory::failing("bob", ErrorKind::AccessDenied));
        let reconciler = Reconciler::new(directory.clone()).with_retry(fast_retry());

        let result = reconciler.reconcile(&plan(), false).await;

        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].identifier, "bob");
        assert_eq!(result.errors[0].action, CorrectiveAction::Disable);
        assert_eq!(result.errors[0].kind, ErrorKind::AccessDenied);

        let bob = result.outcome("bob").unwrap();
        assert_eq!(bob.state, RecordState::Failed);
        assert_eq!(bob.applied, 0);
        assert_eq!(result.outcome("carol").unwrap().state, RecordState::Succeeded);

        // bob's delete is never attempted
        assert_eq!(directory.calls.load(Ordering::SeqCst), 4);
        assert_eq!(result.statistics.records_failed, 1);
        assert_eq!(result.statistics.records_succeeded, 2);
        assert_eq!(result.operations_succeeded(), 3);
    }

    #[tokio::test]
    async fn test_transient_failure_retried_once() {
        let directory = Arc::new(CountingDirectory::failing("carol", ErrorKind::Unavailable));
        let reconciler = Reconciler::new(directory.clone()).with_retry(fast_retry());

        let result = reconciler.reconcile(&plan(), false).await;

        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, ErrorKind::Unavailable);
        // 4 for alice and bob, 2 attempts for carol
        assert_eq!(directory.calls.load(Ordering::SeqCst), 6);
        assert_eq!(result.statistics.actions_attempted, 5);
    }

    #[tokio::test]
    async fn test_dry_run_makes_no_calls() {
        let directory = Arc::new(CountingDirectory::new());
        let reconciler = Reconciler::new(directory.clone());

        let result = reconciler.reconcile(&plan(), true).await;

        assert_eq!(directory.calls.load(Ordering::SeqCst), 0);
        assert!(result.dry_run);
        assert!(result.is_success());
        assert_eq!(result.operations_succeeded(), 0);
        assert_eq!(result.outcomes.len(), 3);
        assert!(result.outcomes.iter().all(|o| o.state == RecordState::Pending));
        assert_eq!(result.outcome("bob").unwrap().actions.len(), 2);
    }

    #[tokio::test]
    async fn test_expired_deadline_starts_nothing() {
        let directory = Arc::new(CountingDirectory::new());
        let reconciler = Reconciler::new(directory.clone()).with_run_deadline(Duration::ZERO);

        let result = reconciler.reconcile(&plan(), false).await;

        assert_eq!(directory.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.statistics.records_not_started, 3);
        assert!(result
            .outcomes
            .iter()
            .all(|o| o.state == RecordState::NotStarted));
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn test_works_with_trait_object() {
        let directory: Arc<dyn MutationOp> = Arc::new(CountingDirectory::new());
        let result = Reconciler::new(directory).reconcile(&plan(), false).await;
        assert_eq!(result.operations_succeeded(), 5);
    }
}
