//! Preview the corrective actions a run would take

use std::path::PathBuf;

use clap::Args;

use tierwarden_reconcile::{ReconciliationEngine, ReportGenerator};

use super::{open_directory, ConfigArgs};
use crate::error::CliResult;
use crate::output::{print_header, print_json};

/// Show what a run would change, without changing anything
#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Plan against a directory snapshot file instead of LDAP
    #[arg(long, value_name = "PATH")]
    pub snapshot: Option<PathBuf>,

    /// Output the plan as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute the plan command
pub async fn execute(args: PlanArgs) -> CliResult<()> {
    let config = args.config.load()?;
    let directory = open_directory(&config, args.snapshot.as_deref()).await?;
    let plan = ReconciliationEngine::new(directory)
        .plan(&config.reconcile)
        .await?;

    if args.json {
        print_json(&plan)?;
    } else {
        print_header("Reconciliation Plan");
        print!("{}", ReportGenerator::plan(&plan));
    }
    Ok(())
}
