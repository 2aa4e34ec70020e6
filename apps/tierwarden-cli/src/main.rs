//! tierwarden - desired-state reconciliation for directory objects
//!
//! This CLI enables administrators to:
//! - Validate a reconciliation configuration offline
//! - Preview the corrective actions a run would take
//! - Run reconciliation against Active Directory or a snapshot file

use clap::{Parser, Subcommand};

mod commands;
mod config;
mod error;
mod logging;
mod output;

use error::CliResult;
use logging::{LogFormat, LogLevel};

/// tierwarden - Directory tier reconciliation
#[derive(Parser)]
#[command(name = "tierwarden")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Log every planned and applied action
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log everything, including directory traffic
    #[arg(long, global = true)]
    debug: bool,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify, diff and reconcile directory objects
    Run(commands::run::RunArgs),

    /// Show the corrective actions a run would take
    Plan(commands::plan::PlanArgs),

    /// Check a configuration file without contacting the directory
    Validate(commands::validate::ValidateArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    logging::init_logging(LogLevel::from_flags(cli.verbose, cli.debug), cli.log_format);

    let result = run(cli).await;

    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            e.print();
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    match cli.command {
        Commands::Run(args) => commands::run::execute(args).await,
        Commands::Plan(args) => commands::plan::execute(args).await,
        Commands::Validate(args) => commands::validate::execute(args),
    }
}
