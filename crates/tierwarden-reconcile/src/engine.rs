//! Reconciliation engine.
//!
//! Drives one run end to end: validate → build exclusions → query →
//! classify → diff → reconcile. Every fatal condition surfaces before the
//! first mutation; after that, errors are per record. Directory reads are
//! bounded by the per-operation timeout.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use tierwarden_directory::{DirectoryError, ReconcileDirectory, RetryExecutor};

use crate::classify::RuleSet;
use crate::config::ReconcileConfig;
use crate::diff::diff;
use crate::error::ReconcileResult;
use crate::exclusion::ExclusionList;
use crate::executor::Reconciler;
use crate::plan::{RecordPlan, RunPlan};
use crate::result::RunResult;
use crate::statistics::StatisticsTracker;
use crate::types::Classification;

/// Classify-diff-reconcile engine over one directory.
pub struct ReconciliationEngine<D: ReconcileDirectory + ?Sized> {
    directory: Arc<D>,
}

impl<D: ReconcileDirectory + ?Sized> ReconciliationEngine<D> {
    pub fn new(directory: Arc<D>) -> Self {
        Self { directory }
    }

    pub fn directory(&self) -> &Arc<D> {
        &self.directory
    }

    /// Compute the plan for the current directory state without changing it.
    pub async fn plan(&self, config: &ReconcileConfig) -> ReconcileResult<RunPlan> {
        self.plan_as_of(config, Utc::now()).await
    }

    /// Like [`plan`](Self::plan), with an explicit reference time for age
    /// thresholds.
    #[instrument(skip_all, fields(directory = %self.directory.display_name()))]
    pub async fn plan_as_of(
        &self,
        config: &ReconcileConfig,
        as_of: DateTime<Utc>,
    ) -> ReconcileResult<RunPlan> {
        config.validate()?;
        let rules = RuleSet::compile(&config.rules, as_of)?;

        let timeout = config.execution.retry_config().operation_timeout;
        let exclusions =
            ExclusionList::resolve(&config.exclusions, self.directory.as_ref(), timeout).await?;

        let query = config.search.to_query();
        let objects = tokio::time::timeout(timeout, self.directory.query(&query))
            .await
            .map_err(|_| {
                DirectoryError::query_failed(format!(
                    "directory query timed out after {}s",
                    timeout.as_secs()
                ))
            })??;
        info!(
            count = objects.len(),
            kind = %query.kind,
            scope = %query.scope,
            "Queried directory"
        );

        let tracker = StatisticsTracker::new();
        let mut records = Vec::with_capacity(objects.len());
        for object in &objects {
            let (classification, matched_rule) = if exclusions.contains(object.identifier()) {
                (Classification::Excluded, None)
            } else {
                match rules.evaluate(object) {
                    Some(rule) => (rule.tag(), Some(rule.name().to_string())),
                    None => (Classification::Unclassified, None),
                }
            };
            tracker.record_classified(classification);

            let actions = diff(
                object,
                classification,
                &config.desired_state,
                &exclusions,
                &config.policy,
            );
            if classification != Classification::Excluded {
                tracker.record_planned(&actions);
            }

            debug!(
                identifier = object.identifier(),
                %classification,
                rule = matched_rule.as_deref().unwrap_or("-"),
                actions = actions.len(),
                "Planned record"
            );

            records.push(RecordPlan {
                identifier: object.identifier().to_string(),
                distinguished_path: object.distinguished_path().to_string(),
                classification,
                matched_rule,
                actions,
            });
        }

        let plan = RunPlan {
            directory: self.directory.display_name().to_string(),
            as_of,
            records,
            statistics: tracker.snapshot(),
        };
        info!(
            scanned = plan.statistics.objects_scanned,
            excluded = plan.statistics.excluded,
            compliant = plan.statistics.compliant,
            actions = plan.statistics.actions_planned,
            "Plan ready"
        );
        Ok(plan)
    }

    /// Run a full reconciliation using the configured dry-run policy.
    pub async fn run(&self, config: &ReconcileConfig) -> ReconcileResult<RunResult> {
        self.run_as_of(config, Utc::now()).await
    }

    /// Like [`run`](Self::run), with an explicit reference time.
    pub async fn run_as_of(
        &self,
        config: &ReconcileConfig,
        as_of: DateTime<Utc>,
    ) -> ReconcileResult<RunResult> {
        let started_at = Utc::now();
        let plan = self.plan_as_of(config, as_of).await?;

        let mut reconciler = Reconciler::new(Arc::clone(&self.directory))
            .with_retry(RetryExecutor::new(config.execution.retry_config()));
        if let Some(deadline) = config.execution.run_deadline() {
            reconciler = reconciler.with_run_deadline(deadline);
        }

        let mut result = reconciler.reconcile(&plan, config.policy.dry_run).await;
        result.started_at = started_at;
        result.duration_ms = u64::try_from((result.finished_at - started_at).num_milliseconds())
            .unwrap_or(result.duration_ms);
        Ok(result)
    }
}
