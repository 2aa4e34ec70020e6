//! Text reports for plans and run results.

use std::fmt::Write as _;

use crate::plan::RunPlan;
use crate::result::RunResult;
use crate::statistics::RunStatistics;
use crate::types::Classification;

/// Report generator.
pub struct ReportGenerator;

impl ReportGenerator {
    /// Human-readable summary of a run.
    #[must_use]
    pub fn summary(result: &RunResult) -> String {
        let stats = &result.statistics;
        let mut out = String::new();

        let mode = if result.dry_run { " (dry run)" } else { "" };
        let _ = writeln!(out, "Reconciliation {}{}", result.run_id, mode);
        let _ = writeln!(out, "  Directory:   {}", result.directory);
        let _ = writeln!(
            out,
            "  Started:     {}",
            result.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        let _ = writeln!(out, "  Duration:    {} ms", result.duration_ms);
        out.push('\n');

        Self::write_classification(&mut out, stats);

        out.push('\n');
        let _ = writeln!(out, "Actions");
        let _ = writeln!(out, "  Planned:     {}", stats.actions_planned);
        if result.dry_run {
            let _ = writeln!(out, "  Applied:     0 (dry run)");
        } else {
            let _ = writeln!(out, "  Attempted:   {}", stats.actions_attempted);
            let _ = writeln!(out, "  Succeeded:   {}", stats.actions_succeeded);
            let _ = writeln!(out, "  Failed:      {}", stats.actions_failed);
            if stats.records_not_started > 0 {
                let _ = writeln!(
                    out,
                    "  Not started: {} record(s), run deadline reached",
                    stats.records_not_started
                );
            }
        }

        if !result.errors.is_empty() {
            out.push('\n');
            let _ = writeln!(out, "Errors ({})", result.errors.len());
            for error in &result.errors {
                let _ = writeln!(
                    out,
                    "  {} {}: [{}] {}",
                    error.identifier, error.action, error.code, error.message
                );
            }
        }
        out
    }

    /// Human-readable listing of planned actions.
    #[must_use]
    pub fn plan(plan: &RunPlan) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Plan for {}", plan.directory);
        out.push('\n');
        Self::write_classification(&mut out, &plan.statistics);
        out.push('\n');

        let actionable: Vec<_> = plan.actionable().collect();
        if actionable.is_empty() {
            let _ = writeln!(out, "No changes needed.");
            return out;
        }

        let _ = writeln!(
            out,
            "{} action(s) on {} record(s)",
            plan.action_count(),
            actionable.len()
        );
        for record in actionable {
            let _ = writeln!(out, "  {} [{}]", record.identifier, record.classification);
            for action in &record.actions {
                let _ = writeln!(out, "    - {action}");
            }
        }
        out
    }

    /// CSV export of per-record errors.
    #[must_use]
    pub fn errors_csv(result: &RunResult) -> String {
        let mut csv = String::from("identifier,action,kind,code,message\n");
        for e in &result.errors {
            let _ = writeln!(
                csv,
                "{},{},{},{},{}",
                csv_field(&e.identifier),
                csv_field(&e.action.to_string()),
                e.kind,
                e.code,
                csv_field(&e.message)
            );
        }
        csv
    }

    fn write_classification(out: &mut String, stats: &RunStatistics) {
        let _ = writeln!(out, "Objects scanned: {}", stats.objects_scanned);
        for classification in Classification::ALL {
            let count = stats.classified_count(classification);
            if count > 0 {
                let _ = writeln!(out, "  {:<14} {}", classification.as_str(), count);
            }
        }
        let _ = writeln!(out, "  {:<14} {}", "compliant", stats.compliant);
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tierwarden_directory::DirectoryError;
    use uuid::Uuid;

    use crate::plan::RecordPlan;
    use crate::result::RecordError;
    use crate::types::CorrectiveAction;

    fn result(dry_run: bool) -> RunResult {
        RunResult {
            run_id: Uuid::new_v4(),
            directory: "corp.local".to_string(),
            dry_run,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            duration_ms: 12,
            statistics: RunStatistics {
                objects_scanned: 3,
                classified: [("tier1".to_string(), 2), ("excluded".to_string(), 1)].into(),
                actions_planned: 2,
                actions_attempted: 2,
                actions_succeeded: 1,
                actions_failed: 1,
                ..Default::default()
            },
            outcomes: vec![],
            errors: vec![RecordError::new(
                "bob",
                &CorrectiveAction::AddToGroup("Group, A".to_string()),
                &DirectoryError::access_denied("bob", "add_to_group"),
            )],
        }
    }

    #[test]
    fn test_summary() {
        let text = ReportGenerator::summary(&result(false));
        assert!(text.contains("Directory:   corp.local"));
        assert!(text.contains("tier1"));
        assert!(text.contains("Succeeded:   1"));
        assert!(text.contains("Errors (1)"));
        assert!(text.contains("ACCESS_DENIED"));

        let dry = ReportGenerator::summary(&result(true));
        assert!(dry.contains("(dry run)"));
        assert!(!dry.contains("Succeeded:"));
    }

    #[test]
    fn test_plan_listing() {
        let plan = RunPlan::new(
            "corp.local",
            vec![RecordPlan::new("alice_T1", Classification::Tier1)
                .with_actions(vec![CorrectiveAction::AddToGroup("GroupA".to_string())])],
        );
        let text = ReportGenerator::plan(&plan);
        assert!(text.contains("1 action(s) on 1 record(s)"));
        assert!(text.contains("alice_T1 [tier1]"));
        assert!(text.contains("- add_to_group(GroupA)"));

        let empty = RunPlan::new("corp.local", vec![]);
        assert!(ReportGenerator::plan(&empty).contains("No changes needed."));
    }

    #[test]
    fn test_errors_csv_quotes_fields() {
        let csv = ReportGenerator::errors_csv(&result(false));
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines[0], "identifier,action,kind,code,message");
        assert!(lines[1].starts_with("bob,\"add_to_group(Group, A)\",access_denied,ACCESS_DENIED,"));
    }
}
