//! Validate a configuration file offline

use clap::Args;

use super::ConfigArgs;
use crate::error::CliResult;
use crate::output::{print_key_value, print_success};

/// Check the configuration file without contacting the directory
#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
}

/// Execute the validate command
pub fn execute(args: ValidateArgs) -> CliResult<()> {
    let config = args.config.load()?;
    let reconcile = &config.reconcile;

    print_success(&format!("{} is valid", args.config.config.display()));
    match &config.directory {
        Some(ldap) => print_key_value("Directory", &ldap.url()),
        None => print_key_value("Directory", "(none, snapshot runs only)"),
    }
    let search = &reconcile.search;
    print_key_value(
        "Search",
        &format!(
            "{} objects in {} ({})",
            search.kind,
            search.base.as_deref().unwrap_or("the naming context"),
            search.scope
        ),
    );
    print_key_value("Rules", &reconcile.rules.len().to_string());
    print_key_value(
        "Exclusions",
        &format!(
            "{} identifier(s), {} well-known principal(s)",
            reconcile.exclusions.identifiers.len(),
            reconcile.exclusions.well_known.len()
        ),
    );
    print_key_value(
        "Mode",
        if reconcile.policy.dry_run {
            "dry run"
        } else {
            "apply"
        },
    );
    Ok(())
}
