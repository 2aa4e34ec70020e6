//! Run a reconciliation

use std::path::PathBuf;

use clap::Args;

use tierwarden_reconcile::{ReconciliationEngine, ReportGenerator, RunResult};

use super::{open_directory, ConfigArgs};
use crate::error::{CliError, CliResult};
use crate::output::{print_header, print_json, print_success, print_warning};

/// Classify, diff and reconcile every object in scope
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Preview changes without applying (overrides policy.dry_run)
    #[arg(long, conflicts_with = "apply")]
    pub dry_run: bool,

    /// Apply changes (overrides policy.dry_run)
    #[arg(long)]
    pub apply: bool,

    /// Run against a directory snapshot file instead of LDAP
    #[arg(long, value_name = "PATH")]
    pub snapshot: Option<PathBuf>,

    /// Write per-record errors as CSV to this file
    #[arg(long, value_name = "PATH")]
    pub errors_csv: Option<PathBuf>,

    /// Output the run result as JSON
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    /// Dry-run setting after command-line overrides.
    fn dry_run(&self, configured: bool) -> bool {
        if self.dry_run {
            true
        } else if self.apply {
            false
        } else {
            configured
        }
    }
}

/// Execute the run command
pub async fn execute(args: RunArgs) -> CliResult<()> {
    let mut config = args.config.load()?;
    config.reconcile.policy.dry_run = args.dry_run(config.reconcile.policy.dry_run);

    let directory = open_directory(&config, args.snapshot.as_deref()).await?;
    let engine = ReconciliationEngine::new(directory);
    let result = engine.run(&config.reconcile).await?;

    if let Some(path) = &args.errors_csv {
        std::fs::write(path, ReportGenerator::errors_csv(&result))
            .map_err(|e| CliError::Output(format!("cannot write {}: {e}", path.display())))?;
    }

    if args.json {
        print_json(&result)?;
    } else {
        print_report(&result);
    }

    if result.is_success() {
        Ok(())
    } else {
        Err(CliError::RecordsFailed {
            failed: result.errors.len(),
        })
    }
}

fn print_report(result: &RunResult) {
    print_header("Reconciliation");
    print!("{}", ReportGenerator::summary(result));
    println!();

    if result.dry_run {
        if result.statistics.actions_planned > 0 {
            print_warning("Dry run: no changes were made. Pass --apply to apply them.");
        } else {
            print_success("Directory already matches the desired state");
        }
    } else if result.is_success() {
        print_success(&format!(
            "Applied {} action(s)",
            result.operations_succeeded()
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        run: RunArgs,
    }

    #[test]
    fn test_dry_run_overrides() {
        let args = TestCli::parse_from(["tierwarden", "--apply"]).run;
        assert!(!args.dry_run(true));

        let args = TestCli::parse_from(["tierwarden", "--dry-run"]).run;
        assert!(args.dry_run(false));

        let args = TestCli::parse_from(["tierwarden"]).run;
        assert!(args.dry_run(true));
        assert!(!args.dry_run(false));
    }

    #[test]
    fn test_dry_run_conflicts_with_apply() {
        assert!(TestCli::try_parse_from(["tierwarden", "--dry-run", "--apply"]).is_err());
    }
}
