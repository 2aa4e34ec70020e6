//! CLI error types and exit codes

use thiserror::Error;

use tierwarden_directory::{DirectoryError, ErrorKind};
use tierwarden_reconcile::ReconcileError;

/// Exit codes for the CLI
/// - 0: Success
/// - 1: One or more records failed
/// - 2: Configuration or validation error
/// - 3: Directory query or connection error
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {0}")]
    Validation(String),

    #[error("Directory query failed: {0}")]
    Query(String),

    #[error("Cannot connect to directory: {0}")]
    Connection(String),

    #[error("{failed} record(s) failed, see the error list above")]
    RecordsFailed { failed: usize },

    #[error("Output error: {0}")]
    Output(String),
}

impl CliError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::RecordsFailed { .. } | CliError::Output(_) => 1,
            CliError::Config(_) | CliError::Validation(_) => 2,
            CliError::Query(_) | CliError::Connection(_) => 3,
        }
    }

    /// Print the error, and a suggestion when one applies, to stderr
    pub fn print(&self) {
        let use_color = std::env::var("NO_COLOR").is_err();

        if use_color {
            eprintln!("\x1b[31mError:\x1b[0m {}", self);
        } else {
            eprintln!("Error: {}", self);
        }

        if let Some(suggestion) = self.suggestion() {
            if use_color {
                eprintln!("\n\x1b[33mSuggestion:\x1b[0m {}", suggestion);
            } else {
                eprintln!("\nSuggestion: {}", suggestion);
            }
        }
    }

    fn suggestion(&self) -> Option<&'static str> {
        match self {
            CliError::Config(_) => {
                Some("Pass --config or set TIERWARDEN_CONFIG to a readable YAML file.")
            }
            CliError::Validation(_) => Some("Run 'tierwarden validate' to check the configuration."),
            CliError::Connection(_) => Some(
                "Check the directory host, port and bind credentials, or use --snapshot to run offline.",
            ),
            CliError::RecordsFailed { .. } => {
                Some("Fix the reported records and run again; completed actions are not repeated.")
            }
            CliError::Query(_) | CliError::Output(_) => None,
        }
    }
}

impl From<DirectoryError> for CliError {
    fn from(err: DirectoryError) -> Self {
        match err.kind() {
            ErrorKind::ValidationFailed => CliError::Validation(err.to_string()),
            ErrorKind::Unavailable | ErrorKind::Timeout => CliError::Connection(err.to_string()),
            _ => CliError::Query(err.to_string()),
        }
    }
}

impl From<ReconcileError> for CliError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::Config { message, source } => match source {
                Some(source) => CliError::Config(format!("{message}: {}", error_chain(source.as_ref()))),
                None => CliError::Config(message),
            },
            ReconcileError::Directory(e) => e.into(),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Output(err.to_string())
    }
}

/// Render an error followed by its sources, separated by ": ".
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
